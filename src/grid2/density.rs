//! Density half of the pipeline and mass renormalization.

use super::advect::{advect, AdvectScratch, Flow};
use super::{diffuse_field, refresh_members};
use crate::bounds::BoundKind;
use crate::chunk::{ChunkStore, FieldKind};
use crate::config::SimulationConfig;
use crate::environment::Environment;
use crate::grid::{interior_sum, DIM};
use crate::solver::{kernels, MultigridArena};

/// `d := clamp(d + dt·d0, min, max)`, then swap so the result is the source term.
/// Records pre-existing and newly added mass in the environment.
pub fn add_sources(store: &mut ChunkStore, members: &[usize], env: &mut Environment, config: &SimulationConfig) {
    let (lo, hi) = (config.min_fluid_value, config.max_fluid_value);
    for &idx in members {
        let Some(chunk) = store.get_mut(idx) else {
            continue;
        };
        let f = &mut chunk.fields;
        let before = interior_sum(&f.d, DIM);
        for (d, &s) in f.d.iter_mut().zip(&f.d0) {
            *d = (*d + env.dt * s).clamp(lo, hi);
        }
        let after = interior_sum(&f.d, DIM);
        env.density.existing += before;
        env.density.new += after - before;
        f.swap_scratch(FieldKind::Density);
    }
}

pub fn diffuse(
    store: &mut ChunkStore,
    members: &[usize],
    env: &Environment,
    config: &SimulationConfig,
    arena: &mut MultigridArena,
) {
    let a = env.dt * config.diffusion / (env.h * env.h);
    let c = 1.0 + 6.0 * a;
    diffuse_field(
        store,
        members,
        FieldKind::Density,
        FieldKind::DensityScratch,
        BoundKind::Scalar,
        a,
        c,
        arena,
        config.solver.diffuse_limits(),
    );
}

/// Move the diffused density along the projected velocity.
pub fn advect_density(
    store: &mut ChunkStore,
    members: &[usize],
    env: &Environment,
    config: &SimulationConfig,
    scratch: &mut AdvectScratch,
) {
    for &idx in members {
        let Some(chunk) = store.get_mut(idx) else {
            continue;
        };
        let f = &mut chunk.fields;
        f.swap_scratch(FieldKind::Density);
        let flow = Flow {
            u: &f.u,
            v: &f.v,
            w: &f.w,
            dt0: env.dt / env.h,
            dim: DIM,
        };
        advect(config.advection, &mut f.d, &f.d0, &flow, scratch);
    }
    refresh_members(store, members, FieldKind::Density, BoundKind::Scalar);
}

/// Scale every member's density so the frame ends with the mass it started
/// with plus what was added. Returns the ratio applied.
pub fn normalize(store: &mut ChunkStore, members: &[usize], env: &mut Environment, config: &SimulationConfig) -> f32 {
    let post: f64 = members
        .iter()
        .filter_map(|&idx| store.get(idx))
        .map(|chunk| interior_sum(&chunk.fields.d, DIM))
        .sum();

    let ratio = if post != 0.0 {
        ((env.density.existing + env.density.new) / post) as f32
    } else {
        1.0
    };

    if ratio != 1.0 && ratio.is_finite() {
        for &idx in members {
            if let Some(chunk) = store.get_mut(idx) {
                kernels::scale(config.solver.backend, &mut chunk.fields.d, ratio);
            }
        }
    }
    env.density.normalization_ratio = ratio;
    ratio
}

/// Full density step for one frame.
pub fn step(
    store: &mut ChunkStore,
    members: &[usize],
    env: &mut Environment,
    config: &SimulationConfig,
    arena: &mut MultigridArena,
    scratch: &mut AdvectScratch,
) {
    add_sources(store, members, env, config);
    diffuse(store, members, env, config, arena);
    advect_density(store, members, env, config, scratch);
    normalize(store, members, env, config);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use approx::assert_relative_eq;

    fn two_chunks() -> ChunkStore {
        let mut store = ChunkStore::new();
        store.insert(Chunk::new([0, 0, 0])).unwrap();
        store.insert(Chunk::new([1, 0, 0])).unwrap();
        store.link_neighbors();
        store
    }

    #[test]
    fn test_add_sources_clamps_and_accounts() {
        let mut store = two_chunks();
        let config = SimulationConfig::default();
        let mut env = Environment::new(&config);
        env.begin_frame(0.5, 0.0);
        {
            let chunk = store.get_mut(0).unwrap();
            chunk.set(FieldKind::Density, 3, 3, 3, 0.5);
            chunk.set(FieldKind::DensityScratch, 3, 3, 3, 4.0);
            chunk.set(FieldKind::Density, 4, 4, 4, 0.25);
            chunk.set(FieldKind::DensityScratch, 4, 4, 4, -2.0);
        }
        add_sources(&mut store, &[0, 1], &mut env, &config);

        // After the swap the summed values are the scratch buffer
        let chunk = store.get(0).unwrap();
        assert_eq!(chunk.get(FieldKind::DensityScratch, 3, 3, 3), 1.0, "clamped to max");
        assert_eq!(chunk.get(FieldKind::DensityScratch, 4, 4, 4), 0.0, "clamped to min");
        assert_relative_eq!(env.density.existing, 0.75);
        assert_relative_eq!(env.density.new, 0.25);
    }

    #[test]
    fn test_normalize_restores_mass() {
        let mut store = two_chunks();
        let config = SimulationConfig::default();
        let mut env = Environment::new(&config);
        env.density.existing = 2.0;
        env.density.new = 1.0;
        store.get_mut(0).unwrap().set(FieldKind::Density, 2, 2, 2, 1.0);
        store.get_mut(1).unwrap().set(FieldKind::Density, 2, 2, 2, 0.5);

        let ratio = normalize(&mut store, &[0, 1], &mut env, &config);
        assert_relative_eq!(ratio, 2.0);
        assert_relative_eq!(store.get(0).unwrap().get(FieldKind::Density, 2, 2, 2), 2.0);
        assert_relative_eq!(store.get(1).unwrap().get(FieldKind::Density, 2, 2, 2), 1.0);
        assert_eq!(env.density.normalization_ratio, 2.0);
    }

    #[test]
    fn test_normalize_skips_empty_world() {
        let mut store = two_chunks();
        let config = SimulationConfig::default();
        let mut env = Environment::new(&config);
        env.density.existing = 1.0;
        let ratio = normalize(&mut store, &[0, 1], &mut env, &config);
        assert_eq!(ratio, 1.0);
        assert!(store.get(0).unwrap().field(FieldKind::Density).iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_diffuse_leaves_seam_consistent_for_advection() {
        let mut store = two_chunks();
        let mut config = SimulationConfig::default();
        config.diffusion = 1.0;
        let mut env = Environment::new(&config);
        env.begin_frame(1.0, 0.0);
        store.get_mut(0).unwrap().set(FieldKind::DensityScratch, 16, 8, 8, 1.0);

        let mut arena = MultigridArena::from_config(&config.solver);
        diffuse(&mut store, &[0, 1], &env, &config, &mut arena);

        let right = store.get(1).unwrap();
        assert!(right.get(FieldKind::Density, 1, 8, 8) > 0.0, "density spreads into the neighbor");
        // Advection traces into these halos next
        super::super::assert_x_seam(&store, 0, 1, FieldKind::Density);
    }

    #[test]
    fn test_density_crosses_seam_under_flow() {
        let mut store = two_chunks();
        let mut config = SimulationConfig::default();
        config.diffusion = 0.0;
        let mut env = Environment::new(&config);
        env.begin_frame(1.0, 0.0);
        {
            let chunk = store.get_mut(0).unwrap();
            for k in 1..17 {
                for j in 1..17 {
                    chunk.set(FieldKind::Density, 16, j, k, 1.0);
                }
            }
        }
        for idx in 0..2 {
            let chunk = store.get_mut(idx).unwrap();
            for v in chunk.fields.u.iter_mut() {
                *v = 1.0;
            }
        }
        crate::bounds::exchange_halos(&mut store);

        let mut arena = MultigridArena::from_config(&config.solver);
        let mut scratch = AdvectScratch::default();
        step(&mut store, &[0, 1], &mut env, &config, &mut arena, &mut scratch);

        // The clamped trace lands halfway into the halo, so half the layer
        // arrives and normalization scales it back up
        let right = store.get(1).unwrap();
        assert_relative_eq!(env.density.normalization_ratio, 2.0, epsilon = 1e-5);
        assert_relative_eq!(right.get(FieldKind::Density, 1, 8, 8), 1.0, epsilon = 1e-5);
        assert_eq!(store.get(0).unwrap().get(FieldKind::Density, 16, 8, 8), 0.0);
    }
}
