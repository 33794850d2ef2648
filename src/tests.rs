//! End-to-end scenarios through the public simulator and the C ABI.

use std::ffi::CString;

use approx::assert_abs_diff_eq;

use crate::chunk::FieldKind;
use crate::config::{AdvectionScheme, SimulationConfig, SolverConfig};
use crate::dispatch::DispatchOverride;
use crate::ffi::*;
use crate::grid::{interior_sum, DIM};
use crate::simulator::FluidSimulator;
use crate::solver::KernelBackend;

fn world(config: SimulationConfig, size: i32) -> FluidSimulator {
    let mut sim = FluidSimulator::new(config).unwrap();
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                sim.add_chunk([x, y, z]).unwrap();
            }
        }
    }
    sim.link_neighbors();
    sim
}

fn total_density(sim: &FluidSimulator) -> f64 {
    sim.store()
        .chunks()
        .iter()
        .map(|c| interior_sum(c.field(FieldKind::Density), DIM))
        .sum()
}

/// Cheap settings for long runs: no viscosity or diffusion, one projection.
fn light_config() -> SimulationConfig {
    SimulationConfig {
        diffusion: 0.0,
        viscosity: 0.0,
        reproject_after_advection: false,
        solver: SolverConfig {
            diffuse_max_iterations: 1,
            project_max_iterations: 2,
            ..SolverConfig::default()
        },
        ..SimulationConfig::default()
    }
}

#[test]
fn test_mass_conservation_single_cell() {
    for scheme in [AdvectionScheme::SemiLagrangian, AdvectionScheme::MacCormack] {
        let config = SimulationConfig {
            advection: scheme,
            ..SimulationConfig::default()
        };
        let mut sim = world(config, 2);
        let max = sim.config().max_fluid_value;
        sim.store_mut().get_mut(0).unwrap().set(FieldKind::Density, 8, 8, 8, max);

        let before = total_density(&sim);
        let report = sim.tick(0.02, 0.0);
        let after = total_density(&sim);

        assert_abs_diff_eq!(after, before, epsilon = 1e-3);
        assert_eq!(report.buckets.grid2, 8, "{:?}", scheme);
    }
}

#[test]
fn test_mass_is_conserved_under_gravity() {
    let mut sim = world(SimulationConfig::default(), 2);
    {
        let chunk = sim.store_mut().get_mut(6).unwrap();
        for k in 4..12 {
            for i in 4..12 {
                chunk.set(FieldKind::Density, i, 8, k, 0.5);
            }
        }
    }
    let before = total_density(&sim);
    for _ in 0..3 {
        sim.tick(0.02, -9.81);
    }
    assert_abs_diff_eq!(total_density(&sim), before, epsilon = 1e-3);
}

#[test]
fn test_puddle_stays_on_the_floor() {
    let mut sim = world(light_config(), 4);
    let source = sim.store().index_of([0, 0, 0]).unwrap();
    {
        let chunk = sim.store_mut().get_mut(source).unwrap();
        for k in 1..17 {
            for i in 1..17 {
                chunk.set(FieldKind::Density, i, 1, k, 0.5);
            }
        }
    }
    let start = total_density(&sim);

    for _ in 0..50 {
        sim.tick(0.02, -9.81);
    }

    let mut raised = 0.0;
    let mut floor_layer = 0.0;
    for chunk in sim.store().chunks() {
        let d = chunk.field(FieldKind::Density);
        if chunk.world_pos[1] >= 1 {
            raised += interior_sum(d, DIM);
        } else {
            for k in 1..17 {
                for i in 1..17 {
                    floor_layer += chunk.get(FieldKind::Density, i, 1, k) as f64;
                }
            }
        }
        assert!(d.iter().all(|x| x.is_finite()), "chunk {:?} blew up", chunk.world_pos);
    }
    let total = total_density(&sim);

    assert!(raised < 1e-3, "density above the floor chunks: {}", raised);
    assert!(floor_layer > 0.5 * total, "floor layer holds {} of {}", floor_layer, total);
    assert_abs_diff_eq!(total, start, epsilon = 1e-2);
    assert_eq!(sim.frame(), 50);
}

#[test]
fn test_sleep_and_wake() {
    let mut sim = world(light_config(), 3);
    let report = sim.tick(0.02, -9.81);
    assert_eq!(report.buckets.grid2, 27, "new chunks start awake");
    assert!(sim.store().chunks().iter().all(|c| c.metadata.asleep && c.metadata.homogeneous));

    let report = sim.tick(0.02, -9.81);
    assert_eq!(report.buckets.asleep, 27);

    // Wet the middle chunk: it and every neighbor wake up
    let center = sim.store().index_of([1, 1, 1]).unwrap();
    sim.store_mut().get_mut(center).unwrap().set(FieldKind::Density, 8, 8, 8, 1.0);
    sim.tick(0.02, -9.81);
    for chunk in sim.store().chunks() {
        assert!(!chunk.metadata.asleep, "chunk {:?} should be awake", chunk.world_pos);
    }
    assert!(!sim.store().get(center).unwrap().metadata.homogeneous);

    let report = sim.tick(0.02, -9.81);
    assert_eq!(report.buckets.grid2, 27);
}

#[test]
fn test_far_chunks_stay_asleep() {
    let mut sim = world(light_config(), 3);
    sim.tick(0.02, -9.81);
    let corner = sim.store().index_of([0, 0, 0]).unwrap();
    sim.store_mut().get_mut(corner).unwrap().set(FieldKind::Density, 4, 4, 4, 1.0);
    sim.tick(0.02, -9.81);

    let report = sim.tick(0.02, -9.81);
    assert_eq!(report.buckets.grid2, 8, "the corner and its seven neighbors");
    assert_eq!(report.buckets.asleep, 19);
    let far = sim.store().index_of([2, 2, 2]).unwrap();
    assert!(sim.store().get(far).unwrap().metadata.asleep);
}

#[test]
fn test_halos_match_across_seams_after_tick() {
    let mut sim = world(SimulationConfig::default(), 2);
    let left = sim.store().index_of([0, 0, 0]).unwrap();
    let right = sim.store().index_of([1, 0, 0]).unwrap();
    sim.store_mut().get_mut(left).unwrap().set(FieldKind::Density, 16, 5, 5, 1.0);
    sim.store_mut().get_mut(right).unwrap().set(FieldKind::U, 1, 9, 9, -2.0);
    sim.tick(0.02, -9.81);

    let l = sim.store().get(left).unwrap();
    let r = sim.store().get(right).unwrap();
    for k in 1..17 {
        for j in 1..17 {
            for kind in [FieldKind::Density, FieldKind::U, FieldKind::V, FieldKind::Pressure] {
                assert_eq!(l.get(kind, 17, j, k), r.get(kind, 1, j, k), "{:?} at ({}, {})", kind, j, k);
                assert_eq!(r.get(kind, 0, j, k), l.get(kind, 16, j, k), "{:?} at ({}, {})", kind, j, k);
            }
        }
    }
}

#[test]
fn test_backends_agree_end_to_end() {
    let run = |backend| {
        let mut config = SimulationConfig::default();
        config.solver.backend = backend;
        let mut sim = world(config, 2);
        sim.store_mut().get_mut(0).unwrap().set(FieldKind::Density, 10, 10, 10, 1.0);
        sim.store_mut().get_mut(1).unwrap().set(FieldKind::W, 3, 6, 9, 1.5);
        for _ in 0..3 {
            sim.tick(0.02, -9.81);
        }
        sim
    };
    let simd = run(KernelBackend::Simd);
    let scalar = run(KernelBackend::Scalar);

    for (a, b) in simd.store().chunks().iter().zip(scalar.store().chunks()) {
        for kind in [FieldKind::Density, FieldKind::U, FieldKind::V, FieldKind::W] {
            for (x, y) in a.field(kind).iter().zip(b.field(kind)) {
                assert_abs_diff_eq!(*x, *y, epsilon = 1e-4);
            }
        }
    }
}

#[test]
fn test_dispatch_override_bypasses_grid2() {
    let mut sim = world(light_config(), 2);
    sim.store_mut().get_mut(0).unwrap().set(FieldKind::Density, 8, 8, 8, 1.0);
    sim.set_dispatch_override(DispatchOverride::Cellular);
    let report = sim.tick(0.02, -9.81);

    // No cellular solver is registered, so nothing moves
    assert_eq!(report.buckets.cellular, 8);
    assert_eq!(report.buckets.grid2, 0);
    assert_eq!(sim.store().get(0).unwrap().get(FieldKind::Density, 8, 8, 8), 1.0);
    assert_eq!(sim.store().get(0).unwrap().get(FieldKind::V, 8, 8, 8), 0.0);

    sim.set_dispatch_override(DispatchOverride::None);
    let report = sim.tick(0.02, -9.81);
    assert_eq!(report.buckets.grid2, 8);
    assert!(sim.store().get(0).unwrap().get(FieldKind::V, 8, 8, 8) < 0.0, "gravity applied");
}

#[test]
fn test_ffi_session() {
    let json = CString::new(r#"{ "diffusion": 0.0, "solver": { "project_max_iterations": 4 } }"#).unwrap();
    unsafe {
        let sim = vf_create_with_config(json.as_ptr());
        assert!(!sim.is_null());

        for x in 0..2 {
            assert!(vf_add_chunk(sim, x, 0, 0) >= 0);
        }
        vf_link_neighbors(sim);
        assert_eq!(vf_chunk_count(sim), 2);

        let len = vf_field_len();
        let chunk = vf_chunk_index(sim, 1, 0, 0) as u64;
        let mut density = vec![0.0f32; len as usize];
        density[crate::grid::index(4, 4, 4, DIM)] = 0.75;
        assert_eq!(vf_copy_field_in(sim, chunk, FieldKind::Density as u8, density.as_ptr(), len), len);

        assert_eq!(vf_tick(sim, 0.02, -9.81), 1);

        let mut meta = VfChunkMetadata::default();
        assert_eq!(vf_chunk_metadata(sim, chunk, &mut meta), 0);
        assert_eq!(meta.homogeneous, 0);
        assert_eq!(meta.asleep, 0);
        assert_abs_diff_eq!(meta.total_density, 0.75, epsilon = 1e-4);
        assert!(meta.projection_iterations >= 1);

        let mut out = vec![0.0f32; len as usize];
        assert_eq!(vf_copy_field_out(sim, chunk, FieldKind::Density as u8, out.as_mut_ptr(), len), len);
        let sum: f32 = out
            .iter()
            .zip(crate::grid::border_mask(DIM))
            .map(|(d, m)| d * m)
            .sum();
        assert_abs_diff_eq!(sum, 0.75, epsilon = 1e-4);
        assert!(vf_get_normalization_ratio(sim) > 0.0);

        vf_destroy(sim);
    }
}
