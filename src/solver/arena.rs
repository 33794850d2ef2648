//! Caller-owned scratch storage for the multigrid levels.

use super::kernels::KernelBackend;
use crate::config::SolverConfig;
use crate::grid::{cell_count, coarsen, create_grid, COARSEST_DIM};

/// Scratch grids for one coarse level.
pub(crate) struct Level {
    pub dim: usize,
    /// Correction being solved for on this level.
    pub phi: Vec<f32>,
    /// Restricted residual of the finer level.
    pub phi0: Vec<f32>,
    pub residual: Vec<f32>,
}

impl Level {
    fn new(dim: usize) -> Self {
        Level {
            dim,
            phi: create_grid(dim),
            phi0: create_grid(dim),
            residual: create_grid(dim),
        }
    }
}

/// Relaxation sweeps per V-cycle stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sweeps {
    pub pre: u32,
    pub post: u32,
    pub coarsest: u32,
}

impl Default for Sweeps {
    fn default() -> Self {
        Sweeps {
            pre: 2,
            post: 2,
            coarsest: 8,
        }
    }
}

/// Level cache reused across solves. Levels are kept sorted by descending
/// dimension and allocated the first time a solve needs them; since every
/// valid dimension coarsens along the same sequence, the levels below any
/// top dimension form a contiguous tail.
///
/// One arena serves one caller at a time: `iterate` takes it by `&mut`.
pub struct MultigridArena {
    pub(crate) backend: KernelBackend,
    pub(crate) sweeps: Sweeps,
    pub(crate) levels: Vec<Level>,
    pub(crate) top_residual: Vec<f32>,
    pub(crate) row: Vec<f32>,
}

impl MultigridArena {
    pub fn new(backend: KernelBackend, sweeps: Sweeps) -> Self {
        MultigridArena {
            backend,
            sweeps,
            levels: Vec::new(),
            top_residual: Vec::new(),
            row: Vec::new(),
        }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(
            config.backend,
            Sweeps {
                pre: config.pre_sweeps,
                post: config.post_sweeps,
                coarsest: config.coarsest_sweeps,
            },
        )
    }

    pub fn backend(&self) -> KernelBackend {
        self.backend
    }

    pub fn set_backend(&mut self, backend: KernelBackend) {
        self.backend = backend;
    }

    /// Number of coarse levels allocated so far.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Make sure every level below `top_dim` exists and the top-level
    /// buffers are large enough. Returns the position of the first coarse
    /// level for `top_dim`.
    pub(crate) fn prepare(&mut self, top_dim: usize) -> usize {
        if self.top_residual.len() != cell_count(top_dim) {
            self.top_residual = create_grid(top_dim);
        }
        if self.row.len() < top_dim {
            self.row = vec![0.0; top_dim];
        }

        let mut dim = top_dim;
        while dim > COARSEST_DIM {
            dim = coarsen(dim);
            if !self.levels.iter().any(|level| level.dim == dim) {
                let at = self
                    .levels
                    .iter()
                    .position(|level| level.dim < dim)
                    .unwrap_or(self.levels.len());
                log::debug!("allocating multigrid level of dimension {}", dim);
                self.levels.insert(at, Level::new(dim));
            }
        }

        if top_dim <= COARSEST_DIM {
            return self.levels.len();
        }
        let first = coarsen(top_dim);
        self.levels
            .iter()
            .position(|level| level.dim == first)
            .unwrap_or(self.levels.len())
    }
}

impl Default for MultigridArena {
    fn default() -> Self {
        Self::new(KernelBackend::default(), Sweeps::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_allocated_lazily() {
        let mut arena = MultigridArena::default();
        assert_eq!(arena.level_count(), 0);

        let start = arena.prepare(18);
        assert_eq!(start, 0);
        let dims: Vec<usize> = arena.levels.iter().map(|l| l.dim).collect();
        assert_eq!(dims, vec![10, 6, 4, 3]);
        assert_eq!(arena.top_residual.len(), 18 * 18 * 18);
    }

    #[test]
    fn test_smaller_top_reuses_tail() {
        let mut arena = MultigridArena::default();
        arena.prepare(18);
        let start = arena.prepare(6);
        assert_eq!(arena.level_count(), 4, "no new levels for a dimension already covered");
        assert_eq!(arena.levels[start].dim, 4);

        let start = arena.prepare(3);
        assert_eq!(start, arena.level_count(), "coarsest dimension has no coarser level");
    }

    #[test]
    fn test_larger_top_inserts_in_order() {
        let mut arena = MultigridArena::default();
        arena.prepare(6);
        arena.prepare(34);
        let dims: Vec<usize> = arena.levels.iter().map(|l| l.dim).collect();
        assert_eq!(dims, vec![18, 10, 6, 4, 3]);
    }
}
