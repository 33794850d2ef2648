//! The host-supplied chunk list and its neighbor linking.

use std::collections::HashMap;

use super::mask::{offset_of, ChunkMask, CENTER_SLOT, SLOT_COUNT};
use super::neighborhood::Neighborhood;
use super::{Chunk, FieldKind};
use crate::error::{FluidError, Result};
use crate::grid::DIM;

/// Ordered collection of chunks, addressable by index or world position.
#[derive(Default)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
    by_pos: HashMap<[i32; 3], usize>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Add a chunk. Neighbor links are not updated until [`ChunkStore::link_neighbors`].
    pub fn insert(&mut self, chunk: Chunk) -> Result<usize> {
        if self.by_pos.contains_key(&chunk.world_pos) {
            return Err(FluidError::DuplicateChunk(chunk.world_pos));
        }
        let idx = self.chunks.len();
        self.by_pos.insert(chunk.world_pos, idx);
        self.chunks.push(chunk);
        Ok(idx)
    }

    /// Remove the chunk at a world position. The last chunk takes its index.
    pub fn remove(&mut self, world_pos: [i32; 3]) -> Option<Chunk> {
        let idx = self.by_pos.remove(&world_pos)?;
        let chunk = self.chunks.swap_remove(idx);
        if let Some(moved) = self.chunks.get(idx) {
            self.by_pos.insert(moved.world_pos, idx);
        }
        Some(chunk)
    }

    pub fn index_of(&self, world_pos: [i32; 3]) -> Option<usize> {
        self.by_pos.get(&world_pos).copied()
    }

    pub fn get(&self, idx: usize) -> Option<&Chunk> {
        self.chunks.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Chunk> {
        self.chunks.get_mut(idx)
    }

    pub fn chunk(&self, idx: usize) -> Result<&Chunk> {
        self.chunks.get(idx).ok_or(FluidError::UnknownChunk(idx))
    }

    pub fn chunk_mut(&mut self, idx: usize) -> Result<&mut Chunk> {
        self.chunks.get_mut(idx).ok_or(FluidError::UnknownChunk(idx))
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    /// Rebuild every chunk's neighbor slots and mask from world positions.
    pub fn link_neighbors(&mut self) {
        for idx in 0..self.chunks.len() {
            let pos = self.chunks[idx].world_pos;
            let mut neighbors = [None; SLOT_COUNT];
            let mut mask = ChunkMask::EMPTY;
            for (slot, entry) in neighbors.iter_mut().enumerate() {
                if slot == CENTER_SLOT {
                    *entry = Some(idx);
                    mask.set(slot);
                    continue;
                }
                let [dx, dy, dz] = offset_of(slot);
                if let Some(&n) = self.by_pos.get(&[pos[0] + dx, pos[1] + dy, pos[2] + dz]) {
                    *entry = Some(n);
                    mask.set(slot);
                }
            }
            let chunk = &mut self.chunks[idx];
            chunk.neighbors = neighbors;
            chunk.mask = mask;
        }
    }

    /// Borrow one field of every valid neighbor of chunk `idx`.
    pub fn neighborhood(&self, idx: usize, kind: FieldKind) -> Neighborhood<'_> {
        let mut hood = Neighborhood::isolated(DIM);
        let Some(chunk) = self.chunks.get(idx) else {
            return hood;
        };
        for slot in 0..SLOT_COUNT {
            if slot == CENTER_SLOT {
                continue;
            }
            if let Some(n) = chunk.neighbor(slot) {
                if let Some(other) = self.chunks.get(n) {
                    hood.insert(slot, other.field(kind));
                }
            }
        }
        hood
    }

    /// Move a field buffer out of a chunk so it can be mutated while the
    /// neighbors are borrowed. Pair with [`ChunkStore::restore_field`].
    pub fn take_field(&mut self, idx: usize, kind: FieldKind) -> Vec<f32> {
        match self.chunks.get_mut(idx) {
            Some(chunk) => std::mem::take(chunk.fields.get_mut(kind)),
            None => Vec::new(),
        }
    }

    pub fn restore_field(&mut self, idx: usize, kind: FieldKind, data: Vec<f32>) {
        if let Some(chunk) = self.chunks.get_mut(idx) {
            *chunk.fields.get_mut(kind) = data;
        }
    }
}
