//! Voxel Fluid - chunked stable-fluids simulation
//!
//! Density and velocity live in fixed-size chunks with a one-cell halo. Each
//! tick the halos are exchanged, awake chunks are dispatched to a solver
//! bucket, and the grid2 bucket runs an implicit multigrid diffusion and
//! projection step followed by semi-Lagrangian advection.
//!
//! This library provides a C ABI (`vf_*`, see [`ffi`]) for host runtimes
//! and a Rust API centered on [`FluidSimulator`].

pub mod bounds;
pub mod chunk;
pub mod config;
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod ffi;
pub mod grid;
pub mod grid2;
pub mod metadata;
pub mod simulator;
pub mod solver;

pub use chunk::{Chunk, ChunkMetadata, ChunkStore, FieldKind};
pub use config::{AdvectionScheme, SimulationConfig, SolverConfig};
pub use dispatch::{BucketSolver, ClassificationPolicy, DispatchOverride, SimulationBucket, UniformPolicy};
pub use environment::Environment;
pub use error::{FluidError, Result};
pub use grid::{index, DIM};
pub use grid2::Grid2Solver;
pub use simulator::{FluidSimulator, TickReport};
pub use solver::{KernelBackend, MultigridArena};

#[cfg(test)]
mod tests;
