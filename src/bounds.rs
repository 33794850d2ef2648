//! Halo resolution.
//!
//! Rewrites the one-cell halo of a chunk field. Where a neighbor chunk is
//! linked, the halo copies the neighbor's adjacent interior layer. Where the
//! world ends, the halo reflects the interior: scalars copy it, the velocity
//! component normal to the wall flips sign, tangential components copy.
//! The solid mask instead reads the world edge as fully solid.
//!
//! Faces are resolved first, then edges, then corners. An edge or corner
//! without a diagonal neighbor averages the already-resolved halo cells next
//! to it, so a second pass over an unchanged field reproduces the first.

use crate::chunk::{slot_of, ChunkStore, FieldKind, Neighborhood};
use crate::grid::{cell_count, index};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Field semantics for the reflect rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundKind {
    /// Density, pressure, divergence: copied on reflection.
    Scalar,
    /// Velocity component along an axis: negated at walls normal to that axis.
    Vector(Axis),
    /// Solid mask: the world edge is a wall of value [`SOLID`].
    Solid,
}

/// Mask value of a fully solid cell.
pub const SOLID: f32 = 1.0;

impl BoundKind {
    /// The reflect rule for a chunk field, if the field has a halo.
    pub fn for_field(kind: FieldKind) -> Option<BoundKind> {
        match kind {
            FieldKind::Density | FieldKind::Pressure | FieldKind::Divergence => Some(BoundKind::Scalar),
            FieldKind::U => Some(BoundKind::Vector(Axis::X)),
            FieldKind::V => Some(BoundKind::Vector(Axis::Y)),
            FieldKind::W => Some(BoundKind::Vector(Axis::Z)),
            FieldKind::Bounds => Some(BoundKind::Solid),
            _ => None,
        }
    }

    fn flips(self, axis: Axis) -> bool {
        self == BoundKind::Vector(axis)
    }
}

/// Fields kept consistent by [`exchange_halos`].
const EXCHANGED: [FieldKind; 7] = [
    FieldKind::Density,
    FieldKind::U,
    FieldKind::V,
    FieldKind::W,
    FieldKind::Pressure,
    FieldKind::Divergence,
    FieldKind::Bounds,
];

/// -1 for the low halo, +1 for the high halo, 0 for interior coordinates.
#[inline]
fn halo_offset(c: usize, dim: usize) -> i32 {
    if c == 0 {
        -1
    } else if c == dim - 1 {
        1
    } else {
        0
    }
}

/// Coordinate in the neighbor chunk that lines up with halo coordinate `c`.
#[inline]
fn neighbor_coord(c: usize, dim: usize) -> usize {
    if c == 0 {
        dim - 2
    } else if c == dim - 1 {
        1
    } else {
        c
    }
}

/// One step from a halo coordinate toward the interior.
#[inline]
fn inward(c: usize, dim: usize) -> usize {
    if c == 0 {
        1
    } else if c == dim - 1 {
        dim - 2
    } else {
        c
    }
}

/// Rewrite the halo of `target` for one chunk.
pub fn set_bounds(target: &mut [f32], neighbors: &Neighborhood<'_>, kind: BoundKind) {
    let dim = neighbors.dim();
    debug_assert_eq!(target.len(), cell_count(dim));

    // Pass 1: faces, pass 2: edges, pass 3: corners
    for halo_axes in 1..=3 {
        for z in 0..dim {
            let oz = halo_offset(z, dim);
            for y in 0..dim {
                let oy = halo_offset(y, dim);
                for x in 0..dim {
                    let ox = halo_offset(x, dim);
                    let count = (ox != 0) as u32 + (oy != 0) as u32 + (oz != 0) as u32;
                    if count != halo_axes {
                        continue;
                    }

                    let i = index(x, y, z, dim);
                    if let Some(nb) = neighbors.get(slot_of(ox, oy, oz)) {
                        target[i] = nb[index(
                            neighbor_coord(x, dim),
                            neighbor_coord(y, dim),
                            neighbor_coord(z, dim),
                            dim,
                        )];
                        continue;
                    }

                    target[i] = match halo_axes {
                        1 if kind == BoundKind::Solid => SOLID,
                        1 => {
                            let src = target[index(inward(x, dim), inward(y, dim), inward(z, dim), dim)];
                            let axis = if ox != 0 {
                                Axis::X
                            } else if oy != 0 {
                                Axis::Y
                            } else {
                                Axis::Z
                            };
                            if kind.flips(axis) {
                                -src
                            } else {
                                src
                            }
                        }
                        _ => {
                            let mut sum = 0.0;
                            if ox != 0 {
                                sum += target[index(inward(x, dim), y, z, dim)];
                            }
                            if oy != 0 {
                                sum += target[index(x, inward(y, dim), z, dim)];
                            }
                            if oz != 0 {
                                sum += target[index(x, y, inward(z, dim), dim)];
                            }
                            sum / halo_axes as f32
                        }
                    };
                }
            }
        }
    }
}

/// Resolve the halo of `target` for chunk `idx`, reading neighbor data from
/// field `source` of the linked chunks.
pub fn refresh_from(store: &ChunkStore, idx: usize, target: &mut [f32], source: FieldKind, kind: BoundKind) {
    let hood = store.neighborhood(idx, source);
    set_bounds(target, &hood, kind);
}

/// Resolve the halo of one field of one chunk in place.
pub fn refresh_field(store: &mut ChunkStore, idx: usize, field: FieldKind, kind: BoundKind) {
    let mut target = store.take_field(idx, field);
    if target.len() == cell_count(crate::grid::DIM) {
        refresh_from(store, idx, &mut target, field, kind);
    }
    store.restore_field(idx, field, target);
}

/// Bring the halos of density, velocity, pressure, divergence and the solid
/// mask up to date for every chunk in the store.
pub fn exchange_halos(store: &mut ChunkStore) {
    for idx in 0..store.len() {
        for field in EXCHANGED {
            if let Some(kind) = BoundKind::for_field(field) {
                refresh_field(store, idx, field, kind);
            }
        }
    }
}
