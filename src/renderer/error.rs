//! Renderer subsystem error handling
//!
//! Maps lower-level failures onto `RenderError` with the component that
//! raised them.

use crate::error::{RenderError, RenderResult};

/// Helper trait for renderer error contexts
pub trait RenderErrorContext<T> {
    /// Treat the failure as fatal initialization of `component`
    fn init_context(self, component: &str) -> RenderResult<T>;
}

impl<T, E> RenderErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn init_context(self, component: &str) -> RenderResult<T> {
        self.map_err(|e| RenderError::init_failure(component, e))
    }
}

impl<T> RenderErrorContext<T> for Option<T> {
    fn init_context(self, component: &str) -> RenderResult<T> {
        self.ok_or_else(|| RenderError::init_failure(component, "resource allocation denied"))
    }
}

/// Error for a draw request rejected at the batcher boundary
pub fn rejected_draw(reason: impl std::fmt::Display) -> RenderError {
    RenderError::InvalidInput(format!("draw call rejected: {}", reason))
}
