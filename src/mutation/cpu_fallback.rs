use super::data::MutationData;
use super::kernel;
use super::processor::{check_population, tick_uniforms, MutationProcessor};
use crate::config::MutationConfig;
use crate::memory::ResourceManager;

/// Host-side processor used when the feedback pass is unavailable.
/// Same array-shape contract and tick sequence as the GPU processor.
pub struct CpuMutationProcessor {
    config: MutationConfig,
    tick: u32,
    disposed: bool,
}

impl CpuMutationProcessor {
    pub fn new(config: &MutationConfig) -> Self {
        Self {
            config: config.clone(),
            tick: 0,
            disposed: false,
        }
    }
}

impl MutationProcessor for CpuMutationProcessor {
    fn process_mutations(
        &mut self,
        _resources: &mut ResourceManager,
        data: &MutationData,
        delta_time: f32,
    ) -> Option<MutationData> {
        if self.disposed {
            return None;
        }
        let count = match check_population(data, self.config.max_organisms) {
            Ok(count) => count,
            Err(err) => {
                log::warn!("[CpuMutationProcessor::process_mutations] {}", err);
                return None;
            }
        };

        let mut next = data.clone();
        kernel::step(&mut next, &tick_uniforms(&self.config, delta_time, self.tick, count));
        self.tick = self.tick.wrapping_add(1);
        Some(next)
    }

    fn max_organisms(&self) -> usize {
        self.config.max_organisms
    }

    fn is_available(&self) -> bool {
        !self.disposed
    }

    fn dispose(&mut self, _resources: &mut ResourceManager) {
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::gpu::HeadlessBackend;

    #[test]
    fn test_cpu_processor_advances_and_validates() {
        let mut resources =
            ResourceManager::new(Box::new(HeadlessBackend::new()), &ResourceConfig::default(), Some(16));
        let config = MutationConfig {
            max_organisms: 2,
            ..MutationConfig::default()
        };
        let mut processor = CpuMutationProcessor::new(&config);

        let mut data = MutationData::default();
        data.push([0.0, 0.0], [2.0, 0.0], [0.5; 4], 11, 1.0, 0.0);
        let next = processor.process_mutations(&mut resources, &data, 1.0).unwrap();
        assert_eq!(next.positions[0], [2.0, 0.0]);

        data.push([0.0, 0.0], [0.0, 0.0], [0.5; 4], 12, 1.0, 0.0);
        data.push([0.0, 0.0], [0.0, 0.0], [0.5; 4], 13, 1.0, 0.0);
        assert!(processor.process_mutations(&mut resources, &data, 1.0).is_none());

        processor.dispose(&mut resources);
        assert!(!processor.is_available());
    }
}
