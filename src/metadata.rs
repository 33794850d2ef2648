//! Per-chunk diagnostic totals and sleep tracking.
//!
//! Totals are independent per chunk and computed on the simulator's rayon
//! pool. Sleep flags need every chunk's homogeneity first, so they are
//! assigned in a second, serial pass.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::chunk::{Chunk, ChunkStore, FieldKind, CENTER_SLOT, SLOT_COUNT};
use crate::grid::{index, DIM};
use crate::solver::{kernels, KernelBackend};

/// Interior sums for one chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChunkTotals {
    pub density: f32,
    pub pressure: f32,
    pub velocity: f32,
}

/// Build the bookkeeping pool. Falls back to a single thread if the
/// requested size cannot be built, and to `None` if even that fails, in
/// which case totals are computed on the calling thread.
pub fn build_pool(threads: usize) -> Option<ThreadPool> {
    let threads = threads.max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .or_else(|err| {
            log::warn!("could not build a {}-thread pool ({}), using one thread", threads, err);
            rayon::ThreadPoolBuilder::new().num_threads(1).build()
        })
        .map_err(|err| log::error!("could not build a metadata pool: {}", err))
        .ok()
}

pub fn chunk_totals(chunk: &Chunk, border_mask: &[f32], backend: KernelBackend) -> ChunkTotals {
    let density = kernels::masked_sum(backend, chunk.field(FieldKind::Density), border_mask);

    let p = chunk.field(FieldKind::Pressure);
    let (u, v, w) = (chunk.field(FieldKind::U), chunk.field(FieldKind::V), chunk.field(FieldKind::W));
    let mut pressure = 0.0;
    let mut velocity = 0.0;
    for k in 1..DIM - 1 {
        for j in 1..DIM - 1 {
            for i in 1..DIM - 1 {
                let idx = index(i, j, k, DIM);
                pressure += p[idx].abs();
                velocity += (u[idx] * u[idx] + v[idx] * v[idx] + w[idx] * w[idx]).sqrt();
            }
        }
    }

    ChunkTotals {
        density,
        pressure,
        velocity,
    }
}

/// Recompute totals, homogeneity and sleep flags for every chunk.
///
/// A chunk is homogeneous when its density sum is at or below `threshold`,
/// and asleep when it and every linked neighbor are homogeneous.
pub fn update_metadata(
    store: &mut ChunkStore,
    border_mask: &[f32],
    threshold: f32,
    backend: KernelBackend,
    pool: Option<&ThreadPool>,
) {
    let totals: Vec<ChunkTotals> = {
        let chunks = store.chunks();
        let compute = || {
            chunks
                .par_iter()
                .map(|chunk| chunk_totals(chunk, border_mask, backend))
                .collect::<Vec<_>>()
        };
        match pool {
            Some(pool) => pool.install(compute),
            None => chunks.iter().map(|chunk| chunk_totals(chunk, border_mask, backend)).collect(),
        }
    };

    for (chunk, t) in store.chunks_mut().iter_mut().zip(&totals) {
        let meta = &mut chunk.metadata;
        meta.total_density = t.density;
        meta.total_pressure = t.pressure;
        meta.total_velocity = t.velocity;
        meta.homogeneous = t.density <= threshold;
    }

    let asleep: Vec<bool> = store
        .chunks()
        .iter()
        .map(|chunk| {
            chunk.metadata.homogeneous
                && (0..SLOT_COUNT)
                    .filter(|&slot| slot != CENTER_SLOT)
                    .filter_map(|slot| chunk.neighbor(slot))
                    .filter_map(|n| store.get(n))
                    .all(|n| n.metadata.homogeneous)
        })
        .collect();

    for (chunk, asleep) in store.chunks_mut().iter_mut().zip(asleep) {
        chunk.metadata.asleep = asleep;
    }
}
