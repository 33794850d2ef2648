//! Recursive V-cycle over the level arena.
//!
//! Solves `c·φ − a·Σ(6 face neighbors of φ) = φ0` on the interior of a
//! `dim³` grid whose halo is held fixed. Diffusion uses `c = 1 + 6a`, the
//! pressure projection uses `a = 1, c = 6`. Coarse levels solve the error
//! equation with the same `a` and `c`.

use super::arena::{Level, MultigridArena, Sweeps};
use super::kernels::{self, KernelBackend};
use crate::error::{FluidError, Result};
use crate::grid::{cell_count, is_valid_dim, COARSEST_DIM};

/// Sanity bound on recursion depth. A 2^16 + 2 grid would need 16 levels.
pub const MAX_LEVELS: usize = 16;

/// Residual reported to the host when a solve could not run.
pub const SOLVER_ERROR_RESIDUAL: f32 = -1.0;

/// Stopping rule for a solve loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveLimits {
    pub tolerance: f32,
    pub max_iterations: u32,
    /// Log a warning when the cap is hit before the tolerance.
    pub warn_unconverged: bool,
}

/// Outcome of a bounded solve loop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolveStats {
    pub iterations: u32,
    pub residual: f32,
    pub converged: bool,
}

#[derive(Clone, Copy)]
struct Cycle {
    backend: KernelBackend,
    sweeps: Sweeps,
    a: f32,
    c: f32,
}

/// Run exactly one V-cycle at `dim` and return the L2 norm of the
/// resulting top-level residual.
pub fn iterate(
    arena: &mut MultigridArena,
    phi: &mut [f32],
    phi0: &[f32],
    dim: usize,
    a: f32,
    c: f32,
) -> Result<f32> {
    if !is_valid_dim(dim) {
        return Err(FluidError::InvalidDimension(dim));
    }
    let expected = cell_count(dim);
    for actual in [phi.len(), phi0.len()] {
        if actual != expected {
            return Err(FluidError::DimensionMismatch { expected, actual });
        }
    }

    let start = arena.prepare(dim);
    let MultigridArena {
        backend,
        sweeps,
        levels,
        top_residual,
        row,
    } = arena;
    let cycle = Cycle {
        backend: *backend,
        sweeps: *sweeps,
        a,
        c,
    };

    v_cycle(cycle, phi, phi0, dim, top_residual, &mut levels[start..], row, 0)?;

    kernels::residual(cycle.backend, phi, phi0, dim, a, c, top_residual);
    Ok(kernels::norm_squared(cycle.backend, top_residual, dim).sqrt())
}

#[allow(clippy::too_many_arguments)]
fn v_cycle(
    cycle: Cycle,
    phi: &mut [f32],
    phi0: &[f32],
    dim: usize,
    residual: &mut [f32],
    levels: &mut [Level],
    row: &mut [f32],
    depth: usize,
) -> Result<()> {
    if depth >= MAX_LEVELS {
        return Err(FluidError::LevelOverrun(MAX_LEVELS));
    }

    let Cycle { backend, sweeps, a, c } = cycle;

    let coarse = if dim > COARSEST_DIM { levels.split_first_mut() } else { None };
    let Some((coarse, rest)) = coarse else {
        // Coarsest level: relax directly
        for _ in 0..sweeps.coarsest {
            kernels::relax(backend, phi, phi0, dim, a, c, row);
        }
        return Ok(());
    };
    debug_assert_eq!(coarse.dim, crate::grid::coarsen(dim));

    for _ in 0..sweeps.pre {
        kernels::relax(backend, phi, phi0, dim, a, c, row);
    }

    kernels::residual(backend, phi, phi0, dim, a, c, residual);

    let Level {
        dim: coarse_dim,
        phi: coarse_phi,
        phi0: coarse_phi0,
        residual: coarse_residual,
    } = coarse;
    kernels::restrict(backend, residual, dim, coarse_phi0, *coarse_dim, row);
    coarse_phi.fill(0.0);

    v_cycle(
        cycle,
        coarse_phi,
        coarse_phi0,
        *coarse_dim,
        coarse_residual,
        rest,
        row,
        depth + 1,
    )?;

    kernels::prolongate(backend, coarse_phi, *coarse_dim, phi, dim, row);

    for _ in 0..sweeps.post {
        kernels::relax(backend, phi, phi0, dim, a, c, row);
    }
    Ok(())
}

/// Call [`iterate`] until the residual drops to `limits.tolerance` or the
/// iteration cap is reached. `after_iteration` runs after every V-cycle and
/// is where callers refresh the halo of `phi`.
///
/// Errors end the loop early; `phi` keeps the best approximation so far.
#[allow(clippy::too_many_arguments)]
pub fn solve<F>(
    arena: &mut MultigridArena,
    phi: &mut [f32],
    phi0: &[f32],
    dim: usize,
    a: f32,
    c: f32,
    limits: SolveLimits,
    mut after_iteration: F,
) -> SolveStats
where
    F: FnMut(&mut [f32]),
{
    let mut stats = SolveStats::default();
    while stats.iterations < limits.max_iterations {
        match iterate(arena, phi, phi0, dim, a, c) {
            Ok(residual) => {
                stats.iterations += 1;
                stats.residual = residual;
                after_iteration(phi);
                if residual <= limits.tolerance {
                    stats.converged = true;
                    break;
                }
            }
            Err(err) => {
                log::error!("multigrid iteration failed: {}", err);
                stats.residual = SOLVER_ERROR_RESIDUAL;
                return stats;
            }
        }
    }
    if !stats.converged && limits.warn_unconverged {
        log::warn!(
            "multigrid stopped at the cap of {} iterations with residual {}",
            limits.max_iterations,
            stats.residual
        );
    }
    stats
}
