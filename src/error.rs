//! Engine-wide error types
//!
//! Frame-path operations never return these across the frame boundary;
//! they absorb failures locally and report through `Option`/`bool` plus
//! metrics. The error values exist for setup paths (renderer and backend
//! construction, config loading) and for logging the reason a frame-path
//! request was dropped.

use thiserror::Error;

use crate::config::ConfigError;
use crate::gpu::GpuError;

/// Result alias for engine operations
pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Creation denied after garbage collection could not free headroom
    #[error("resource exhaustion creating '{resource}': {requested} bytes requested, {available} bytes available")]
    ResourceExhaustion {
        resource: String,
        requested: u64,
        available: u64,
    },

    /// Shader compile/link or device setup failure; the component stays disabled
    #[error("{component} failed to initialize: {reason}")]
    InitializationFailure { component: String, reason: String },

    /// Malformed request rejected at the component boundary
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RenderError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RenderError::InvalidInput(message.into())
    }

    pub fn init_failure(component: &str, reason: impl std::fmt::Display) -> Self {
        RenderError::InitializationFailure {
            component: component.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_resource() {
        let err = RenderError::ResourceExhaustion {
            resource: "texture/organism/a".to_string(),
            requested: 4096,
            available: 1024,
        };
        let message = err.to_string();
        assert!(message.contains("texture/organism/a"));
        assert!(message.contains("4096"));
    }

    #[test]
    fn test_init_failure_helper() {
        let err = RenderError::init_failure("mutation", "link error");
        assert_eq!(err.to_string(), "mutation failed to initialize: link error");
    }
}
