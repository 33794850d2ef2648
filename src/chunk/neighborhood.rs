//! Borrowed, validity-checked views of one field across the 27 neighbor slots.

use super::mask::{ChunkMask, CENTER_SLOT, SLOT_COUNT};
use crate::grid::cell_count;

/// Read-only neighbor data for one field of one chunk.
///
/// The center slot is never populated: the chunk's own buffer is the
/// mutable target of whatever operation uses the neighborhood.
pub struct Neighborhood<'a> {
    dim: usize,
    mask: ChunkMask,
    slots: [Option<&'a [f32]>; SLOT_COUNT],
}

impl<'a> Neighborhood<'a> {
    /// A neighborhood with no neighbors, i.e. a chunk surrounded by world edges.
    pub fn isolated(dim: usize) -> Self {
        Neighborhood {
            dim,
            mask: ChunkMask::EMPTY,
            slots: [None; SLOT_COUNT],
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn mask(&self) -> ChunkMask {
        self.mask
    }

    /// Attach a neighbor buffer. Buffers of the wrong size and the center
    /// slot are ignored.
    pub fn insert(&mut self, slot: usize, data: &'a [f32]) {
        if slot >= SLOT_COUNT || slot == CENTER_SLOT || data.len() != cell_count(self.dim) {
            return;
        }
        self.mask.set(slot);
        self.slots[slot] = Some(data);
    }

    /// Builder form of [`Neighborhood::insert`].
    pub fn with(mut self, slot: usize, data: &'a [f32]) -> Self {
        self.insert(slot, data);
        self
    }

    /// Neighbor data for a slot, only if its mask bit is set.
    #[inline]
    pub fn get(&self, slot: usize) -> Option<&'a [f32]> {
        if self.mask.contains(slot) {
            self.slots[slot]
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::mask::slot_of;
    use crate::grid::create_grid;

    #[test]
    fn test_isolated_has_no_slots() {
        let hood = Neighborhood::isolated(4);
        for slot in 0..SLOT_COUNT {
            assert!(hood.get(slot).is_none());
        }
        assert_eq!(hood.mask(), ChunkMask::EMPTY);
    }

    #[test]
    fn test_insert_checks_size_and_center() {
        let good = create_grid(4);
        let bad = vec![0.0; 10];

        let hood = Neighborhood::isolated(4)
            .with(slot_of(1, 0, 0), &good)
            .with(slot_of(-1, 0, 0), &bad)
            .with(CENTER_SLOT, &good);

        assert!(hood.get(slot_of(1, 0, 0)).is_some());
        assert!(hood.get(slot_of(-1, 0, 0)).is_none(), "wrong-size buffer must be rejected");
        assert!(hood.get(CENTER_SLOT).is_none(), "center is never borrowed");
        assert_eq!(hood.mask().neighbor_count(), 1);
    }
}
