//! Flat-array grid layout and index helpers.
//!
//! Every field is a contiguous `dim³` buffer of `f32` in x-fastest order.
//! Index 0 and `dim - 1` along each axis form the halo; everything in
//! between is interior.

/// Cells per chunk axis, including the two halo layers.
pub const DIM: usize = 18;

/// Smallest grid dimension that still uses the vectorized kernels.
pub const SIMD_MIN_DIM: usize = 10;

/// Coarsest multigrid level. One interior cell, relaxed directly.
pub const COARSEST_DIM: usize = 3;

/// Calculate the linear index for a 3D coordinate.
#[inline]
pub fn index(x: usize, y: usize, z: usize, dim: usize) -> usize {
    x + dim * y + dim * dim * z
}

/// Number of cells in a `dim³` grid.
#[inline]
pub fn cell_count(dim: usize) -> usize {
    dim * dim * dim
}

/// Dimension of the next coarser multigrid level.
#[inline]
pub fn coarsen(dim: usize) -> usize {
    ((dim - 2) / 2) + 2
}

/// Whether `dim` belongs to the multigrid dimension sequence (`2^k + 2`).
pub fn is_valid_dim(dim: usize) -> bool {
    dim >= COARSEST_DIM && (dim - 2).is_power_of_two()
}

/// Check if coordinates are within the grid, halo included.
#[inline]
pub fn in_bounds(x: i32, y: i32, z: i32, dim: usize) -> bool {
    let d = dim as i32;
    x >= 0 && x < d && y >= 0 && y < d && z >= 0 && z < d
}

/// Check if coordinates are interior cells.
#[inline]
pub fn is_interior(x: usize, y: usize, z: usize, dim: usize) -> bool {
    let hi = dim - 1;
    x > 0 && x < hi && y > 0 && y < hi && z > 0 && z < hi
}

/// Allocate a zeroed `dim³` grid.
pub fn create_grid(dim: usize) -> Vec<f32> {
    vec![0.0; cell_count(dim)]
}

/// Precompute the border mask: 1.0 on interior cells, 0.0 on the halo.
pub fn border_mask(dim: usize) -> Vec<f32> {
    let mut mask = create_grid(dim);
    for z in 1..dim - 1 {
        for y in 1..dim - 1 {
            for x in 1..dim - 1 {
                mask[index(x, y, z, dim)] = 1.0;
            }
        }
    }
    mask
}

/// Sum of the interior cells, accumulated in f64.
pub fn interior_sum(values: &[f32], dim: usize) -> f64 {
    let mut sum = 0.0f64;
    for z in 1..dim - 1 {
        for y in 1..dim - 1 {
            let base = index(0, y, z, dim);
            sum += values[base + 1..base + dim - 1]
                .iter()
                .map(|&v| v as f64)
                .sum::<f64>();
        }
    }
    sum
}
