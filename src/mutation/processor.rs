//! GPU mutation processor
//!
//! Uploads a population into the input buffer set, runs one feedback pass
//! over every slot, reads the output set back and swaps the roles. Any
//! initialization failure disables the processor for good; subsequent calls
//! return `None`.

use super::buffers::MutationBufferPair;
use super::data::{MutationData, MutationUniforms, ARRAY_COUNT, ELEMENT_SIZES};
use crate::config::MutationConfig;
use crate::error::{RenderError, RenderResult};
use crate::gpu::{FeedbackKernel, FeedbackPass, ProgramDesc};
use crate::memory::ResourceManager;

pub const MUTATION_PROGRAM_ID: &str = "program/mutation";

const MUTATION_SHADER: &str = include_str!("../shaders/mutation.wgsl");

/// Anything that can advance an organism population by one tick
pub trait MutationProcessor {
    /// Advance `data` by `delta_time`. `None` when the tick could not run.
    fn process_mutations(
        &mut self,
        resources: &mut ResourceManager,
        data: &MutationData,
        delta_time: f32,
    ) -> Option<MutationData>;

    fn max_organisms(&self) -> usize;

    fn is_available(&self) -> bool;

    fn dispose(&mut self, resources: &mut ResourceManager);
}

/// Uniform block for one tick
pub(crate) fn tick_uniforms(config: &MutationConfig, delta_time: f32, tick: u32, count: usize) -> MutationUniforms {
    MutationUniforms {
        delta_time,
        mutation_rate: config.mutation_rate,
        energy_decay: config.energy_decay,
        world_bounds: config.world_bounds,
        tick,
        count: count as u32,
        _padding: [0; 2],
    }
}

/// Shared precondition check for both processors
pub(crate) fn check_population(data: &MutationData, max_organisms: usize) -> RenderResult<usize> {
    let count = data.validate()?;
    if count > max_organisms {
        return Err(RenderError::invalid(format!(
            "population of {} exceeds capacity {}",
            count, max_organisms
        )));
    }
    Ok(count)
}

pub struct GpuMutationProcessor {
    config: MutationConfig,
    buffers: Option<MutationBufferPair>,
    /// Contents of the current input set, as of the last readback
    shadow: Option<MutationData>,
    tick: u32,
    disabled_reason: Option<String>,
}

impl GpuMutationProcessor {
    /// Never fails; check `is_available` afterwards
    pub fn new(resources: &mut ResourceManager, config: &MutationConfig) -> Self {
        let mut processor = Self {
            config: config.clone(),
            buffers: None,
            shadow: None,
            tick: 0,
            disabled_reason: None,
        };

        if !config.enabled {
            log::info!("[GpuMutationProcessor::new] Disabled by configuration");
            processor.disabled_reason = Some("disabled by configuration".to_string());
            return processor;
        }

        match Self::initialize(resources, config) {
            Ok(buffers) => {
                log::info!(
                    "[GpuMutationProcessor::new] Ready for {} organisms",
                    config.max_organisms
                );
                processor.buffers = Some(buffers);
            }
            Err(err) => {
                log::error!("[GpuMutationProcessor::new] {}", err);
                processor.disabled_reason = Some(err.to_string());
            }
        }
        processor
    }

    fn initialize(resources: &mut ResourceManager, config: &MutationConfig) -> RenderResult<MutationBufferPair> {
        if !resources.capabilities().supports_feedback {
            return Err(RenderError::init_failure(
                "mutation",
                "device lacks storage bindings for the feedback pass",
            ));
        }

        let desc = ProgramDesc::feedback(
            "mutation",
            MUTATION_SHADER,
            FeedbackKernel::Mutation,
            ARRAY_COUNT as u32,
            ARRAY_COUNT as u32,
        );
        resources
            .create_program(MUTATION_PROGRAM_ID, &desc)
            .map_err(|err| RenderError::init_failure("mutation", err))?;
        resources.retain_resource(MUTATION_PROGRAM_ID);

        MutationBufferPair::create(resources, config.max_organisms).map_err(|err| {
            resources.release_now(MUTATION_PROGRAM_ID);
            err
        })
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled_reason.as_deref()
    }

    pub fn buffers(&self) -> Option<&MutationBufferPair> {
        self.buffers.as_ref()
    }

    fn disable(&mut self, resources: &mut ResourceManager, reason: &str) {
        log::error!("[GpuMutationProcessor] Disabling: {}", reason);
        self.disabled_reason = Some(reason.to_string());
        self.dispose(resources);
    }

    fn run_tick(&mut self, resources: &mut ResourceManager, data: &MutationData, count: usize, delta_time: f32) -> Option<MutationData> {
        let buffers = self.buffers.as_ref()?;
        let program = resources.handle(MUTATION_PROGRAM_ID)?;
        let inputs = buffers.input().handles(resources)?;
        let outputs = buffers.output().handles(resources)?;

        let mut context = resources.context();

        // Arrays unchanged since the last readback are already on the device
        for (index, handle) in inputs.iter().enumerate() {
            let unchanged = self
                .shadow
                .as_ref()
                .is_some_and(|shadow| shadow.array_matches(data, index));
            if unchanged {
                continue;
            }
            if !context.write_buffer(*handle, 0, data.array_bytes(index)) {
                log::warn!("[GpuMutationProcessor::process_mutations] Upload of array {} failed", index);
                self.shadow = None;
                return None;
            }
        }

        let uniforms = tick_uniforms(&self.config, delta_time, self.tick, count);
        let pass = FeedbackPass {
            program,
            inputs: &inputs,
            outputs: &outputs,
            uniforms: bytemuck::bytes_of(&uniforms),
            invocations: buffers.capacity() as u32,
        };
        if !context.dispatch_feedback(&pass) {
            log::warn!("[GpuMutationProcessor::process_mutations] Feedback pass rejected");
            return None;
        }

        let mut packed = Vec::with_capacity(ARRAY_COUNT);
        for (handle, size) in outputs.iter().zip(ELEMENT_SIZES) {
            let mut bytes = vec![0u8; count * size];
            if !context.read_buffer(*handle, &mut bytes) {
                log::warn!("[GpuMutationProcessor::process_mutations] Readback failed");
                return None;
            }
            packed.push(bytes);
        }
        let result = MutationData::from_packed(&packed, count)?;

        if let Some(buffers) = self.buffers.as_mut() {
            buffers.swap();
            buffers.touch(resources);
        }
        resources.touch(MUTATION_PROGRAM_ID);
        self.shadow = Some(result.clone());
        self.tick = self.tick.wrapping_add(1);
        Some(result)
    }
}

impl MutationProcessor for GpuMutationProcessor {
    fn process_mutations(
        &mut self,
        resources: &mut ResourceManager,
        data: &MutationData,
        delta_time: f32,
    ) -> Option<MutationData> {
        if !self.is_available() {
            return None;
        }
        let count = match check_population(data, self.config.max_organisms) {
            Ok(count) => count,
            Err(err) => {
                log::warn!("[GpuMutationProcessor::process_mutations] {}", err);
                return None;
            }
        };
        if count == 0 {
            return Some(MutationData::default());
        }

        let result = self.run_tick(resources, data, count, delta_time);
        if result.is_none() && resources.handle(MUTATION_PROGRAM_ID).is_none() {
            self.disable(resources, "mutation program was evicted");
        }
        result
    }

    fn max_organisms(&self) -> usize {
        self.config.max_organisms
    }

    fn is_available(&self) -> bool {
        self.disabled_reason.is_none() && self.buffers.is_some()
    }

    fn dispose(&mut self, resources: &mut ResourceManager) {
        if let Some(buffers) = self.buffers.take() {
            buffers.release(resources);
            resources.release_now(MUTATION_PROGRAM_ID);
        }
        self.shadow = None;
        if self.disabled_reason.is_none() {
            self.disabled_reason = Some("disposed".to_string());
        }
    }
}
