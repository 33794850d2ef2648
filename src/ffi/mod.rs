//! C FFI layer for host integration.
//!
//! This module exports C ABI functions for the host runtime's FFI.
//! All functions are marked with `#[no_mangle]` and use `extern "C"`.
//!
//! The simulation itself lives in the rest of the crate. These functions are
//! thin wrappers that handle null checks, pointer safety, and C-to-Rust
//! conversions. Errors become sentinels: null handles, -1, or 0.

pub mod chunk;
pub mod lifecycle;
pub mod simulate;

pub use chunk::{
    vf_add_chunk, vf_chunk_count, vf_chunk_index, vf_chunk_metadata, vf_copy_field_in, vf_copy_field_out,
    vf_field_len, vf_get_cell, vf_link_neighbors, vf_remove_chunk, vf_set_cell, VfChunkMetadata,
};
pub use lifecycle::{vf_create, vf_create_with_config, vf_destroy, vf_get_frame};
pub use simulate::{vf_get_normalization_ratio, vf_set_dispatch_override, vf_tick};
