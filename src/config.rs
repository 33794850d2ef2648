//! Simulation configuration, loadable from JSON.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FluidError, Result};
use crate::solver::{KernelBackend, SolveLimits};

/// Advection scheme for density and velocity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvectionScheme {
    /// Single backward trace with trilinear sampling.
    #[default]
    SemiLagrangian,
    /// Backward trace, forward re-trace, and a limited error correction.
    MacCormack,
}

/// Multigrid settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Stop once the residual norm is at or below this.
    pub tolerance: f32,
    /// V-cycle cap for each diffusion solve.
    pub diffuse_max_iterations: u32,
    /// V-cycle cap for each pressure solve.
    pub project_max_iterations: u32,
    pub pre_sweeps: u32,
    pub post_sweeps: u32,
    pub coarsest_sweeps: u32,
    pub backend: KernelBackend,
    /// Warn when a solve stops at its cap instead of the tolerance.
    pub warn_unconverged: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            tolerance: 1e-4,
            diffuse_max_iterations: 4,
            project_max_iterations: 8,
            pre_sweeps: 2,
            post_sweeps: 2,
            coarsest_sweeps: 8,
            backend: KernelBackend::Simd,
            warn_unconverged: false,
        }
    }
}

impl SolverConfig {
    pub fn diffuse_limits(&self) -> SolveLimits {
        SolveLimits {
            tolerance: self.tolerance,
            max_iterations: self.diffuse_max_iterations,
            warn_unconverged: self.warn_unconverged,
        }
    }

    pub fn project_limits(&self) -> SolveLimits {
        SolveLimits {
            tolerance: self.tolerance,
            max_iterations: self.project_max_iterations,
            warn_unconverged: self.warn_unconverged,
        }
    }
}

/// Everything the simulator needs besides the chunks themselves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Default timestep, used until the host supplies one per tick.
    pub dt: f32,
    /// Default gravity along y.
    pub gravity: f32,
    /// Cell spacing.
    pub spacing: f32,
    /// Density diffusion constant.
    pub diffusion: f32,
    /// Velocity viscosity.
    pub viscosity: f32,
    pub min_fluid_value: f32,
    pub max_fluid_value: f32,
    /// Velocity components beyond this are treated as invalid and zeroed.
    pub max_velocity: f32,
    /// Chunks with a density sum at or below this are homogeneous.
    pub homogeneous_threshold: f32,
    /// Run a second projection after velocity advection.
    pub reproject_after_advection: bool,
    pub advection: AdvectionScheme,
    /// Worker threads for per-chunk bookkeeping.
    pub threads: usize,
    pub solver: SolverConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            dt: 0.02,
            gravity: -9.81,
            spacing: 1.0,
            diffusion: 1e-4,
            viscosity: 1e-4,
            min_fluid_value: 0.0,
            max_fluid_value: 1.0,
            max_velocity: 1000.0,
            homogeneous_threshold: 1e-6,
            reproject_after_advection: true,
            advection: AdvectionScheme::SemiLagrangian,
            threads: 1,
            solver: SolverConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Parse and validate a JSON document. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config: SimulationConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: &str) -> Result<()> {
            Err(FluidError::InvalidConfig(msg.to_string()))
        }

        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return invalid("dt must be positive");
        }
        if !(self.spacing > 0.0 && self.spacing.is_finite()) {
            return invalid("spacing must be positive");
        }
        if !(self.diffusion >= 0.0) || !(self.viscosity >= 0.0) {
            return invalid("diffusion and viscosity must not be negative");
        }
        if !(self.min_fluid_value < self.max_fluid_value) {
            return invalid("min_fluid_value must be below max_fluid_value");
        }
        if !(self.max_velocity > 0.0) {
            return invalid("max_velocity must be positive");
        }
        if !(self.homogeneous_threshold >= 0.0) {
            return invalid("homogeneous_threshold must not be negative");
        }
        if self.solver.diffuse_max_iterations == 0 || self.solver.project_max_iterations == 0 {
            return invalid("iteration caps must be at least 1");
        }
        if !(self.solver.tolerance >= 0.0) {
            return invalid("tolerance must not be negative");
        }
        Ok(())
    }
}
