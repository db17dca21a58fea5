//! Organism render demo
//!
//! Runs a synthetic population through the renderer for a fixed number of
//! frames and logs per-frame statistics. Uses the wgpu backend when an
//! adapter is available and the headless backend otherwise.
//!
//! Usage: organism-render-demo [config.toml] [frames]

use anyhow::{Context, Result};
use glam::Vec2;
use organism_render::{
    init_logging, FrameInput, GpuBackend, HeadlessBackend, MutationData, MutationEvent, MutationEventKind,
    OrganismRenderer, RenderConfig, RenderRequest, WgpuBackend, WgpuBackendConfig,
};

const DEFAULT_FRAMES: u64 = 120;
const ORGANISMS: usize = 48;
const BASES: [char; 4] = ['A', 'T', 'C', 'G'];

fn pick_backend() -> Box<dyn GpuBackend> {
    match WgpuBackend::new(WgpuBackendConfig::default()) {
        Ok(backend) => Box::new(backend),
        Err(err) => {
            log::warn!("[main] GPU unavailable ({}), using headless backend", err);
            Box::new(HeadlessBackend::new())
        }
    }
}

fn synthetic_dna(index: usize) -> String {
    (0..16).map(|i| BASES[(index * 7 + i * i) % BASES.len()]).collect()
}

fn main() -> Result<()> {
    init_logging();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => RenderConfig::from_toml_file(&path).with_context(|| format!("loading {}", path))?,
        None => RenderConfig::default(),
    };
    let frames = match args.next() {
        Some(raw) => raw.parse::<u64>().context("frame count must be an integer")?,
        None => DEFAULT_FRAMES,
    };

    let mut renderer = OrganismRenderer::new(pick_backend(), config).context("creating renderer")?;

    let mut population = MutationData::with_capacity(ORGANISMS);
    for i in 0..ORGANISMS {
        let angle = i as f32 / ORGANISMS as f32 * std::f32::consts::TAU;
        let position = Vec2::from_angle(angle) * 250.0;
        let velocity = Vec2::from_angle(angle + 1.5) * 20.0;
        population.push(
            position.to_array(),
            velocity.to_array(),
            [0.5, (i % 5) as f32 / 4.0, 0.3, 0.7],
            (i as u32).wrapping_mul(2_654_435_761),
            1.0,
            0.0,
        );
    }
    renderer.set_population(population);

    let frame_ms = 1000.0 / renderer.config().target_fps() as f64;
    for frame in 0..frames {
        let now = frame as f64 * frame_ms;

        if let Some(population) = renderer.population().cloned() {
            for i in 0..population.len() {
                let request = RenderRequest {
                    organism_id: format!("organism-{}", i),
                    position: Vec2::from_array(population.positions[i]),
                    traits: population.traits[i].to_vec(),
                    energy: population.energy[i],
                    generation: population.generation[i] as u32,
                    dna: synthetic_dna(i),
                };
                renderer.submit_render_request(request, now);
            }
        }

        if frame % 30 == 0 {
            let event = MutationEvent {
                kind: if frame % 60 == 0 {
                    MutationEventKind::Mutation
                } else {
                    MutationEventKind::Consciousness
                },
                magnitude: 0.8,
                timestamp: now,
                position: None,
                traits: Vec::new(),
            };
            renderer.handle_mutation_event(event, now);
        }

        let stats = renderer.render_frame(FrameInput::at(now, renderer.config().target_fps()));
        log::debug!("[main] {}", serde_json::to_string(&stats)?);
    }

    renderer.flush();
    let stats = renderer.stats();
    log::info!(
        "[main] {} frames, {} batches ({:.1}x compression), {} mutation ticks, peak {:.2} MB",
        stats.frames,
        stats.batcher.batches,
        stats.batcher.compression_ratio,
        stats.mutation_ticks,
        stats.resources.peak_bytes as f64 / (1024.0 * 1024.0)
    );
    renderer.dispose();
    Ok(())
}
