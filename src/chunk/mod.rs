//! Chunk storage: field buffers, neighbor links, and per-chunk bookkeeping.
//!
//! A chunk owns one `DIM³` buffer per [`FieldKind`]. Neighbor links are
//! plain indices into the [`ChunkStore`] guarded by a [`ChunkMask`]; data from
//! a neighbor is only ever borrowed read-only through a [`Neighborhood`].

pub mod mask;
pub mod neighborhood;
pub mod store;

pub use mask::{offset_of, slot_of, ChunkMask, CENTER_SLOT, SLOT_COUNT};
pub use neighborhood::Neighborhood;
pub use store::ChunkStore;

use crate::grid::{create_grid, in_bounds, index, DIM};

/// Named fields carried by every chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldKind {
    Density = 0,
    DensityScratch = 1,
    U = 2,
    V = 3,
    W = 4,
    U0 = 5,
    V0 = 6,
    W0 = 7,
    /// Solid mask, written by the host. The world edge reads as solid.
    Bounds = 8,
    Pressure = 9,
    Divergence = 10,
}

impl FieldKind {
    pub const ALL: [FieldKind; 11] = [
        FieldKind::Density,
        FieldKind::DensityScratch,
        FieldKind::U,
        FieldKind::V,
        FieldKind::W,
        FieldKind::U0,
        FieldKind::V0,
        FieldKind::W0,
        FieldKind::Bounds,
        FieldKind::Pressure,
        FieldKind::Divergence,
    ];

    /// Decode a host-side field id.
    pub fn from_id(id: u8) -> Option<FieldKind> {
        FieldKind::ALL.get(id as usize).copied()
    }

    /// The scratch partner swapped with this field every frame.
    pub fn scratch(self) -> Option<FieldKind> {
        match self {
            FieldKind::Density => Some(FieldKind::DensityScratch),
            FieldKind::U => Some(FieldKind::U0),
            FieldKind::V => Some(FieldKind::V0),
            FieldKind::W => Some(FieldKind::W0),
            _ => None,
        }
    }
}

/// One buffer per field kind.
#[derive(Clone, Debug)]
pub struct ChunkFields {
    pub d: Vec<f32>,
    pub d0: Vec<f32>,
    pub u: Vec<f32>,
    pub v: Vec<f32>,
    pub w: Vec<f32>,
    pub u0: Vec<f32>,
    pub v0: Vec<f32>,
    pub w0: Vec<f32>,
    pub bounds: Vec<f32>,
    pub pressure: Vec<f32>,
    pub divergence: Vec<f32>,
}

impl ChunkFields {
    pub fn new(dim: usize) -> Self {
        ChunkFields {
            d: create_grid(dim),
            d0: create_grid(dim),
            u: create_grid(dim),
            v: create_grid(dim),
            w: create_grid(dim),
            u0: create_grid(dim),
            v0: create_grid(dim),
            w0: create_grid(dim),
            bounds: create_grid(dim),
            pressure: create_grid(dim),
            divergence: create_grid(dim),
        }
    }

    pub fn get(&self, kind: FieldKind) -> &Vec<f32> {
        match kind {
            FieldKind::Density => &self.d,
            FieldKind::DensityScratch => &self.d0,
            FieldKind::U => &self.u,
            FieldKind::V => &self.v,
            FieldKind::W => &self.w,
            FieldKind::U0 => &self.u0,
            FieldKind::V0 => &self.v0,
            FieldKind::W0 => &self.w0,
            FieldKind::Bounds => &self.bounds,
            FieldKind::Pressure => &self.pressure,
            FieldKind::Divergence => &self.divergence,
        }
    }

    pub fn get_mut(&mut self, kind: FieldKind) -> &mut Vec<f32> {
        match kind {
            FieldKind::Density => &mut self.d,
            FieldKind::DensityScratch => &mut self.d0,
            FieldKind::U => &mut self.u,
            FieldKind::V => &mut self.v,
            FieldKind::W => &mut self.w,
            FieldKind::U0 => &mut self.u0,
            FieldKind::V0 => &mut self.v0,
            FieldKind::W0 => &mut self.w0,
            FieldKind::Bounds => &mut self.bounds,
            FieldKind::Pressure => &mut self.pressure,
            FieldKind::Divergence => &mut self.divergence,
        }
    }

    /// Ping-pong a field with its scratch partner.
    pub fn swap_scratch(&mut self, kind: FieldKind) {
        match kind {
            FieldKind::Density | FieldKind::DensityScratch => std::mem::swap(&mut self.d, &mut self.d0),
            FieldKind::U | FieldKind::U0 => std::mem::swap(&mut self.u, &mut self.u0),
            FieldKind::V | FieldKind::V0 => std::mem::swap(&mut self.v, &mut self.v0),
            FieldKind::W | FieldKind::W0 => std::mem::swap(&mut self.w, &mut self.w0),
            _ => {}
        }
    }

    /// Overwrite a field with the contents of its scratch partner.
    pub fn copy_from_scratch(&mut self, kind: FieldKind) {
        match kind {
            FieldKind::Density => self.d.copy_from_slice(&self.d0),
            FieldKind::U => self.u.copy_from_slice(&self.u0),
            FieldKind::V => self.v.copy_from_slice(&self.v0),
            FieldKind::W => self.w.copy_from_slice(&self.w0),
            _ => {}
        }
    }

    /// Zero the density and velocity scratch buffers.
    pub fn clear_scratch(&mut self) {
        self.d0.fill(0.0);
        self.u0.fill(0.0);
        self.v0.fill(0.0);
        self.w0.fill(0.0);
    }
}

/// Iteration count and final residual of the most recent solves.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolverStats {
    pub diffuse_iterations: u32,
    pub diffuse_residual: f32,
    pub projection_iterations: u32,
    pub projection_residual: f32,
}

/// Activity flags and diagnostic totals exported to the host.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChunkMetadata {
    pub homogeneous: bool,
    pub asleep: bool,
    pub total_density: f32,
    pub total_pressure: f32,
    pub total_velocity: f32,
}

/// A fixed-size cube of the simulated world.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub world_pos: [i32; 3],
    pub fields: ChunkFields,
    pub(crate) neighbors: [Option<usize>; SLOT_COUNT],
    pub(crate) mask: ChunkMask,
    pub stats: SolverStats,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(world_pos: [i32; 3]) -> Self {
        Chunk {
            world_pos,
            fields: ChunkFields::new(DIM),
            neighbors: [None; SLOT_COUNT],
            mask: ChunkMask::EMPTY,
            stats: SolverStats::default(),
            metadata: ChunkMetadata::default(),
        }
    }

    pub fn mask(&self) -> ChunkMask {
        self.mask
    }

    /// Store index of the neighbor in `slot`, only if its mask bit is set.
    pub fn neighbor(&self, slot: usize) -> Option<usize> {
        if self.mask.contains(slot) {
            self.neighbors[slot]
        } else {
            None
        }
    }

    pub fn field(&self, kind: FieldKind) -> &[f32] {
        self.fields.get(kind)
    }

    pub fn field_mut(&mut self, kind: FieldKind) -> &mut [f32] {
        self.fields.get_mut(kind)
    }

    /// Set a cell value. Out-of-bounds coordinates are silently ignored.
    pub fn set(&mut self, kind: FieldKind, x: i32, y: i32, z: i32, value: f32) {
        if in_bounds(x, y, z, DIM) {
            let idx = index(x as usize, y as usize, z as usize, DIM);
            self.fields.get_mut(kind)[idx] = value;
        }
    }

    /// Get a cell value. Returns 0.0 for out-of-bounds coordinates.
    pub fn get(&self, kind: FieldKind, x: i32, y: i32, z: i32) -> f32 {
        if in_bounds(x, y, z, DIM) {
            self.fields.get(kind)[index(x as usize, y as usize, z as usize, DIM)]
        } else {
            0.0
        }
    }
}
