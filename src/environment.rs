//! Per-simulation constants, frame counter and global mass accounting.

use crate::config::SimulationConfig;
use crate::grid::{border_mask, DIM};

/// Mass bookkeeping for the current frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DensityAccounting {
    /// Density present before this frame's sources were added.
    pub existing: f64,
    /// Density added by this frame's sources (after clamping).
    pub new: f64,
    /// Scale applied to every density cell at the end of the frame.
    pub normalization_ratio: f32,
}

impl Default for DensityAccounting {
    fn default() -> Self {
        DensityAccounting {
            existing: 0.0,
            new: 0.0,
            normalization_ratio: 1.0,
        }
    }
}

pub struct Environment {
    pub dt: f32,
    pub gravity: f32,
    /// Cell spacing.
    pub h: f32,
    pub frame: u64,
    pub density: DensityAccounting,
    /// 1.0 on interior cells, 0.0 on the halo. Built once.
    pub border_mask: Vec<f32>,
}

impl Environment {
    pub fn new(config: &SimulationConfig) -> Self {
        Environment {
            dt: config.dt,
            gravity: config.gravity,
            h: config.spacing,
            frame: 0,
            density: DensityAccounting::default(),
            border_mask: border_mask(DIM),
        }
    }

    /// Take the host's constants for this tick and reset the accounting.
    pub fn begin_frame(&mut self, dt: f32, gravity: f32) {
        self.dt = dt;
        self.gravity = gravity;
        self.density = DensityAccounting::default();
    }

    pub fn end_frame(&mut self) {
        self.frame += 1;
    }
}
