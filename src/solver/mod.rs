//! Geometric multigrid for the implicit diffusion and pressure systems.
//!
//! The grid2 pipeline calls [`solve`] per chunk. Coarse-level storage lives
//! in a caller-owned [`MultigridArena`] that is reused across solves.

pub mod arena;
pub mod kernels;
pub mod multigrid;

pub use arena::{MultigridArena, Sweeps};
pub use kernels::KernelBackend;
pub use multigrid::{iterate, solve, SolveLimits, SolveStats, MAX_LEVELS, SOLVER_ERROR_RESIDUAL};
