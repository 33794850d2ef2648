//! Chunk management and field access FFI functions.
//!
//! Chunks are addressed by the index `vf_add_chunk` returns. Removing a
//! chunk moves the last chunk into the freed index; hosts that remove
//! chunks should look indices up again with `vf_chunk_index`.

use crate::chunk::{Chunk, FieldKind};
use crate::grid::{cell_count, DIM};
use crate::simulator::FluidSimulator;

/// Per-chunk state exported to the host.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VfChunkMetadata {
    pub homogeneous: u8,
    pub asleep: u8,
    pub total_density: f32,
    pub total_pressure: f32,
    pub total_velocity: f32,
    pub diffuse_iterations: u32,
    pub diffuse_residual: f32,
    pub projection_iterations: u32,
    pub projection_residual: f32,
}

impl From<&Chunk> for VfChunkMetadata {
    fn from(chunk: &Chunk) -> Self {
        let meta = chunk.metadata;
        let stats = chunk.stats;
        VfChunkMetadata {
            homogeneous: meta.homogeneous as u8,
            asleep: meta.asleep as u8,
            total_density: meta.total_density,
            total_pressure: meta.total_pressure,
            total_velocity: meta.total_velocity,
            diffuse_iterations: stats.diffuse_iterations,
            diffuse_residual: stats.diffuse_residual,
            projection_iterations: stats.projection_iterations,
            projection_residual: stats.projection_residual,
        }
    }
}

fn field_of(id: u8) -> Option<FieldKind> {
    let kind = FieldKind::from_id(id);
    if kind.is_none() {
        log::error!("unknown field id {}", id);
    }
    kind
}

/// Number of `f32` values in one chunk field.
#[no_mangle]
pub extern "C" fn vf_field_len() -> u64 {
    cell_count(DIM) as u64
}

/// Adds an empty chunk at a world chunk coordinate.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
///
/// # Returns
/// The chunk's index, or -1 if ptr is null or the position is taken.
#[no_mangle]
pub unsafe extern "C" fn vf_add_chunk(ptr: *mut FluidSimulator, x: i32, y: i32, z: i32) -> i64 {
    if ptr.is_null() {
        return -1;
    }
    match (*ptr).add_chunk([x, y, z]) {
        Ok(idx) => idx as i64,
        Err(err) => {
            log::error!("vf_add_chunk: {}", err);
            -1
        }
    }
}

/// Removes the chunk at a world chunk coordinate.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
///
/// # Returns
/// 1 if a chunk was removed, 0 otherwise.
#[no_mangle]
pub unsafe extern "C" fn vf_remove_chunk(ptr: *mut FluidSimulator, x: i32, y: i32, z: i32) -> i32 {
    if ptr.is_null() {
        return 0;
    }
    (*ptr).remove_chunk([x, y, z]).is_some() as i32
}

/// Looks up the index of the chunk at a world chunk coordinate.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
///
/// # Returns
/// The chunk's index, or -1 if there is none.
#[no_mangle]
pub unsafe extern "C" fn vf_chunk_index(ptr: *const FluidSimulator, x: i32, y: i32, z: i32) -> i64 {
    if ptr.is_null() {
        return -1;
    }
    (*ptr).store().index_of([x, y, z]).map_or(-1, |idx| idx as i64)
}

/// Rebuilds every chunk's neighbor links. Ticks do this on their own after
/// chunks were added or removed.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
#[no_mangle]
pub unsafe extern "C" fn vf_link_neighbors(ptr: *mut FluidSimulator) {
    if !ptr.is_null() {
        (*ptr).link_neighbors();
    }
}

/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
///
/// # Returns
/// The number of chunks, or 0 if ptr is null.
#[no_mangle]
pub unsafe extern "C" fn vf_chunk_count(ptr: *const FluidSimulator) -> u64 {
    if ptr.is_null() {
        return 0;
    }
    (*ptr).store().len() as u64
}

/// Sets one cell of one field. Coordinates include the halo, so interior
/// cells are `1..=16` on each axis.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
///
/// # Returns
/// 0 on success (out-of-bounds coordinates are ignored), -1 if ptr is null
/// or the chunk or field does not exist.
#[no_mangle]
pub unsafe extern "C" fn vf_set_cell(
    ptr: *mut FluidSimulator,
    chunk: u64,
    field: u8,
    x: i32,
    y: i32,
    z: i32,
    value: f32,
) -> i32 {
    if ptr.is_null() {
        return -1;
    }
    let Some(kind) = field_of(field) else {
        return -1;
    };
    match (*ptr).store_mut().get_mut(chunk as usize) {
        Some(c) => {
            c.set(kind, x, y, z, value);
            0
        }
        None => -1,
    }
}

/// Gets one cell of one field.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
///
/// # Returns
/// The value, or 0.0 if anything is out of range or ptr is null.
#[no_mangle]
pub unsafe extern "C" fn vf_get_cell(ptr: *const FluidSimulator, chunk: u64, field: u8, x: i32, y: i32, z: i32) -> f32 {
    if ptr.is_null() {
        return 0.0;
    }
    let Some(kind) = field_of(field) else {
        return 0.0;
    };
    (*ptr)
        .store()
        .get(chunk as usize)
        .map_or(0.0, |c| c.get(kind, x, y, z))
}

/// Copies a whole field into a chunk.
///
/// # Layout
/// `index = x + 18·y + 18²·z`, halo included.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
/// - `in_buf` must point to at least `len` floats
///
/// # Returns
/// Number of floats copied, or 0 on error (including `len != vf_field_len()`).
#[no_mangle]
pub unsafe extern "C" fn vf_copy_field_in(
    ptr: *mut FluidSimulator,
    chunk: u64,
    field: u8,
    in_buf: *const f32,
    len: u64,
) -> u64 {
    if ptr.is_null() || in_buf.is_null() || len != vf_field_len() {
        return 0;
    }
    let Some(kind) = field_of(field) else {
        return 0;
    };
    let Some(c) = (*ptr).store_mut().get_mut(chunk as usize) else {
        return 0;
    };
    let src = std::slice::from_raw_parts(in_buf, len as usize);
    c.field_mut(kind).copy_from_slice(src);
    len
}

/// Copies a whole field out of a chunk, in the layout of `vf_copy_field_in`.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
/// - `out_buf` must point to at least `len` writable floats
///
/// # Returns
/// Number of floats copied, or 0 on error (including `len != vf_field_len()`).
#[no_mangle]
pub unsafe extern "C" fn vf_copy_field_out(
    ptr: *const FluidSimulator,
    chunk: u64,
    field: u8,
    out_buf: *mut f32,
    len: u64,
) -> u64 {
    if ptr.is_null() || out_buf.is_null() || len != vf_field_len() {
        return 0;
    }
    let Some(kind) = field_of(field) else {
        return 0;
    };
    let Some(c) = (*ptr).store().get(chunk as usize) else {
        return 0;
    };
    let dst = std::slice::from_raw_parts_mut(out_buf, len as usize);
    dst.copy_from_slice(c.field(kind));
    len
}

/// Fills `out` with a chunk's flags, totals and solver statistics.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
/// - `out` must point to a writable `VfChunkMetadata`, or be null
///
/// # Returns
/// 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn vf_chunk_metadata(ptr: *const FluidSimulator, chunk: u64, out: *mut VfChunkMetadata) -> i32 {
    if ptr.is_null() || out.is_null() {
        return -1;
    }
    match (*ptr).store().get(chunk as usize) {
        Some(c) => {
            *out = VfChunkMetadata::from(c);
            0
        }
        None => -1,
    }
}
