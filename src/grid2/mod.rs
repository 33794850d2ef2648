//! The grid2 bucket: an incompressible Navier-Stokes step across chunks.
//!
//! Order of one frame for the members of the bucket:
//!
//! 1. forces, viscosity, projection, velocity self-advection, optional
//!    second projection ([`velocity::step`])
//! 2. density sources, diffusion, advection, mass renormalization
//!    ([`density::step`])
//! 3. scratch buffers cleared so next frame's sources start from zero
//!
//! Every stage finishes for all members before the next begins, and halos
//! are refreshed between stages so each chunk reads its neighbors' results.

pub mod advect;
pub mod density;
pub mod velocity;

use advect::AdvectScratch;

use crate::bounds::{self, BoundKind};
use crate::chunk::{ChunkStore, FieldKind};
use crate::config::SimulationConfig;
use crate::dispatch::BucketSolver;
use crate::environment::Environment;
use crate::grid::DIM;
use crate::solver::{solve, MultigridArena, SolveLimits, SolveStats, SOLVER_ERROR_RESIDUAL};

/// Owns the scratch state the grid2 pipeline reuses every frame.
pub struct Grid2Solver {
    config: SimulationConfig,
    arena: MultigridArena,
    scratch: AdvectScratch,
}

impl Grid2Solver {
    pub fn new(config: &SimulationConfig) -> Self {
        Grid2Solver {
            config: config.clone(),
            arena: MultigridArena::from_config(&config.solver),
            scratch: AdvectScratch::default(),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn arena(&self) -> &MultigridArena {
        &self.arena
    }
}

impl BucketSolver for Grid2Solver {
    fn simulate(&mut self, store: &mut ChunkStore, members: &[usize], env: &mut Environment) {
        if members.is_empty() {
            return;
        }
        for &idx in members {
            if let Some(chunk) = store.get_mut(idx) {
                chunk.stats = Default::default();
            }
        }

        velocity::step(store, members, env, &self.config, &mut self.arena, &mut self.scratch);
        density::step(store, members, env, &self.config, &mut self.arena, &mut self.scratch);

        for &idx in members {
            if let Some(chunk) = store.get_mut(idx) {
                chunk.fields.clear_scratch();
            }
        }
        log::trace!(
            "grid2 stepped {} chunks, normalization ratio {}",
            members.len(),
            env.density.normalization_ratio
        );
    }
}

/// Solve `c·x − a·Σneighbors(x) = scratch` for `field` on every member.
///
/// All members are seeded with their source term and get fresh halos
/// before any chunk is solved, so early chunks never read stale neighbor
/// values. Each chunk's halo is re-resolved after every V-cycle, and once
/// more for every member after the last solve so chunks solved early see
/// their neighbors' final interiors.
#[allow(clippy::too_many_arguments)]
pub(crate) fn diffuse_field(
    store: &mut ChunkStore,
    members: &[usize],
    field: FieldKind,
    scratch: FieldKind,
    kind: BoundKind,
    a: f32,
    c: f32,
    arena: &mut MultigridArena,
    limits: SolveLimits,
) {
    for &idx in members {
        if let Some(chunk) = store.get_mut(idx) {
            chunk.fields.copy_from_scratch(field);
        }
    }
    refresh_members(store, members, field, kind);

    for &idx in members {
        if store.get(idx).is_none() {
            continue;
        }
        let mut phi = store.take_field(idx, field);
        let phi0 = store.take_field(idx, scratch);

        let stats = {
            let view: &ChunkStore = store;
            solve(arena, &mut phi, &phi0, DIM, a, c, limits, |phi| {
                bounds::refresh_from(view, idx, phi, field, kind)
            })
        };

        store.restore_field(idx, field, phi);
        store.restore_field(idx, scratch, phi0);
        if let Some(chunk) = store.get_mut(idx) {
            record(&mut chunk.stats.diffuse_iterations, &mut chunk.stats.diffuse_residual, stats);
        }
    }
    refresh_members(store, members, field, kind);
}

/// Fold one solve into a chunk's per-frame totals: iterations add up, the
/// residual keeps the worst seen. A failed solve pins the error sentinel.
pub(crate) fn record(iterations: &mut u32, residual: &mut f32, stats: SolveStats) {
    *iterations += stats.iterations;
    if stats.residual == SOLVER_ERROR_RESIDUAL || *residual == SOLVER_ERROR_RESIDUAL {
        *residual = SOLVER_ERROR_RESIDUAL;
    } else {
        *residual = residual.max(stats.residual);
    }
}

pub(crate) fn refresh_members(store: &mut ChunkStore, members: &[usize], field: FieldKind, kind: BoundKind) {
    for &idx in members {
        bounds::refresh_field(store, idx, field, kind);
    }
}

/// Zero anything non-finite or larger in magnitude than `limit`.
pub(crate) fn sanitize(values: &mut [f32], limit: f32) {
    for v in values.iter_mut() {
        if !v.is_finite() || v.abs() > limit {
            *v = 0.0;
        }
    }
}

/// Assert that `kind` agrees across the x seam between `left` and `right`:
/// each face halo holds the other chunk's adjacent interior layer.
#[cfg(test)]
pub(crate) fn assert_x_seam(store: &ChunkStore, left: usize, right: usize, kind: FieldKind) {
    let (Some(l), Some(r)) = (store.get(left), store.get(right)) else {
        panic!("seam chunks {} and {} missing", left, right);
    };
    let hi = (DIM - 1) as i32;
    for k in 1..hi {
        for j in 1..hi {
            assert_eq!(l.get(kind, hi, j, k), r.get(kind, 1, j, k), "{:?} left halo at ({}, {})", kind, j, k);
            assert_eq!(r.get(kind, 0, j, k), l.get(kind, hi - 1, j, k), "{:?} right halo at ({}, {})", kind, j, k);
        }
    }
}
