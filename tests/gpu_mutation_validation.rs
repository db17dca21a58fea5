/// GPU Mutation Validation Tests
///
/// Runs the mutation pass on a real adapter and compares it against the CPU
/// processor. Skips when no GPU is available.

use organism_render::config::{MutationConfig, ResourceConfig};
use organism_render::mutation::{CpuMutationProcessor, GpuMutationProcessor, MutationData, MutationProcessor};
use organism_render::{ResourceManager, WgpuBackend, WgpuBackendConfig};

/// Tolerance for floating point comparisons
const FLOAT_TOLERANCE: f32 = 0.001;

fn init_gpu() -> Option<ResourceManager> {
    let backend = WgpuBackend::new(WgpuBackendConfig::default()).ok()?;
    Some(ResourceManager::new(Box::new(backend), &ResourceConfig::default(), Some(64)))
}

fn population(count: usize) -> MutationData {
    let mut data = MutationData::with_capacity(count);
    for i in 0..count {
        let f = i as f32;
        data.push(
            [f * 3.0 - 100.0, 50.0 - f],
            [1.5, -0.5 + f * 0.01],
            [0.2, 0.4, 0.6, 0.8],
            (i as u32).wrapping_mul(0x9E37_79B9) | 1,
            0.9,
            f,
        );
    }
    data
}

fn assert_close(a: &[f32], b: &[f32]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() < FLOAT_TOLERANCE, "{} vs {}", x, y);
    }
}

#[test]
fn test_gpu_mutation_matches_cpu() {
    let Some(mut resources) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };

    let config = MutationConfig {
        max_organisms: 256,
        ..MutationConfig::default()
    };
    let mut gpu = GpuMutationProcessor::new(&mut resources, &config);
    if !gpu.is_available() {
        println!("Skipping GPU test - mutation pass unavailable: {:?}", gpu.disabled_reason());
        return;
    }
    let mut cpu = CpuMutationProcessor::new(&config);

    let mut gpu_state = population(200);
    let mut cpu_state = gpu_state.clone();
    for _ in 0..5 {
        gpu_state = gpu.process_mutations(&mut resources, &gpu_state, 0.016).unwrap();
        cpu_state = cpu.process_mutations(&mut resources, &cpu_state, 0.016).unwrap();
    }

    assert_eq!(gpu_state.dna, cpu_state.dna);
    let flatten = |v: &[[f32; 2]]| v.iter().flatten().copied().collect::<Vec<_>>();
    assert_close(&flatten(&gpu_state.positions), &flatten(&cpu_state.positions));
    assert_close(&gpu_state.energy, &cpu_state.energy);
    assert_close(&gpu_state.generation, &cpu_state.generation);

    gpu.dispose(&mut resources);
    gpu.dispose(&mut resources);
    assert!(gpu.process_mutations(&mut resources, &gpu_state, 0.016).is_none());
}

#[test]
fn test_gpu_pass_preserves_population_size() {
    let Some(mut resources) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let mut gpu = GpuMutationProcessor::new(&mut resources, &MutationConfig::default());
    if !gpu.is_available() {
        return;
    }
    let next = gpu.process_mutations(&mut resources, &population(37), 0.016).unwrap();
    assert_eq!(next.len(), 37);
    assert!(next.energy.iter().all(|e| e.is_finite()));
}
