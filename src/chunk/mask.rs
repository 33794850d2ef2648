//! Neighbor slot numbering and the validity bitmask.

/// Number of neighbor slots, the chunk itself included.
pub const SLOT_COUNT: usize = 27;

/// Slot of the chunk itself.
pub const CENTER_SLOT: usize = 13;

/// Slot for a relative chunk offset with components in `-1..=1`.
#[inline]
pub fn slot_of(dx: i32, dy: i32, dz: i32) -> usize {
    debug_assert!((-1..=1).contains(&dx) && (-1..=1).contains(&dy) && (-1..=1).contains(&dz));
    ((dx + 1) + 3 * (dy + 1) + 9 * (dz + 1)) as usize
}

/// Relative chunk offset for a slot.
#[inline]
pub fn offset_of(slot: usize) -> [i32; 3] {
    let s = slot as i32;
    [s % 3 - 1, (s / 3) % 3 - 1, s / 9 - 1]
}

/// Which of the 27 neighbor slots hold valid data this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkMask(u32);

impl ChunkMask {
    pub const EMPTY: ChunkMask = ChunkMask(0);

    pub fn from_bits(bits: u32) -> Self {
        ChunkMask(bits & ((1 << SLOT_COUNT) - 1))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn set(&mut self, slot: usize) {
        if slot < SLOT_COUNT {
            self.0 |= 1 << slot;
        }
    }

    pub fn clear(&mut self, slot: usize) {
        if slot < SLOT_COUNT {
            self.0 &= !(1 << slot);
        }
    }

    pub fn contains(self, slot: usize) -> bool {
        slot < SLOT_COUNT && self.0 & (1 << slot) != 0
    }

    /// Number of valid slots other than the center.
    pub fn neighbor_count(self) -> u32 {
        (self.0 & !(1 << CENTER_SLOT)).count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_numbering() {
        assert_eq!(slot_of(0, 0, 0), CENTER_SLOT);
        assert_eq!(slot_of(-1, -1, -1), 0);
        assert_eq!(slot_of(1, 1, 1), 26);
        assert_eq!(slot_of(1, 0, 0), 14);
        assert_eq!(slot_of(0, 1, 0), 16);
        assert_eq!(slot_of(0, 0, 1), 22);
    }

    #[test]
    fn test_offset_round_trip() {
        for slot in 0..SLOT_COUNT {
            let [dx, dy, dz] = offset_of(slot);
            assert_eq!(slot_of(dx, dy, dz), slot);
        }
    }

    #[test]
    fn test_mask_bits() {
        let mut mask = ChunkMask::EMPTY;
        assert!(!mask.contains(CENTER_SLOT));

        mask.set(CENTER_SLOT);
        mask.set(0);
        mask.set(26);
        assert!(mask.contains(0));
        assert!(mask.contains(26));
        assert!(!mask.contains(14));
        assert_eq!(mask.neighbor_count(), 2);

        mask.clear(0);
        assert!(!mask.contains(0));

        // Out of range slots are never valid
        mask.set(40);
        assert!(!mask.contains(40));
        assert_eq!(ChunkMask::from_bits(u32::MAX).bits(), (1 << 27) - 1);
    }
}
