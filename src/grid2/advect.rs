//! Semi-Lagrangian transport with trilinear sampling.

use crate::config::AdvectionScheme;
use crate::grid::{create_grid, index};

/// Scratch grids for the MacCormack correction.
#[derive(Default)]
pub struct AdvectScratch {
    hat: Vec<f32>,
    tilde: Vec<f32>,
}

/// Sample `field` at a fractional position by blending the eight
/// surrounding cells. The position must lie in `[0, dim - 1)` on each axis.
#[inline]
pub fn sample_trilinear(field: &[f32], x: f32, y: f32, z: f32, dim: usize) -> f32 {
    let i0 = x.floor() as usize;
    let j0 = y.floor() as usize;
    let k0 = z.floor() as usize;
    let i1 = (i0 + 1).min(dim - 1);
    let j1 = (j0 + 1).min(dim - 1);
    let k1 = (k0 + 1).min(dim - 1);

    let s1 = x - i0 as f32;
    let s0 = 1.0 - s1;
    let t1 = y - j0 as f32;
    let t0 = 1.0 - t1;
    let u1 = z - k0 as f32;
    let u0 = 1.0 - u1;

    s0 * (t0 * (u0 * field[index(i0, j0, k0, dim)] + u1 * field[index(i0, j0, k1, dim)])
        + t1 * (u0 * field[index(i0, j1, k0, dim)] + u1 * field[index(i0, j1, k1, dim)]))
        + s1 * (t0 * (u0 * field[index(i1, j0, k0, dim)] + u1 * field[index(i1, j0, k1, dim)])
            + t1 * (u0 * field[index(i1, j1, k0, dim)] + u1 * field[index(i1, j1, k1, dim)]))
}

/// Smallest and largest of the eight cells `sample_trilinear` would blend.
fn sample_range(field: &[f32], x: f32, y: f32, z: f32, dim: usize) -> (f32, f32) {
    let i0 = x.floor() as usize;
    let j0 = y.floor() as usize;
    let k0 = z.floor() as usize;
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for k in [k0, (k0 + 1).min(dim - 1)] {
        for j in [j0, (j0 + 1).min(dim - 1)] {
            for i in [i0, (i0 + 1).min(dim - 1)] {
                let v = field[index(i, j, k, dim)];
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
    }
    (lo, hi)
}

/// Velocity field and step used to trace cells.
pub struct Flow<'a> {
    pub u: &'a [f32],
    pub v: &'a [f32],
    pub w: &'a [f32],
    /// Timestep divided by cell spacing.
    pub dt0: f32,
    pub dim: usize,
}

impl Flow<'_> {
    /// Position reached from cell `(i, j, k)` after `sign·dt` along the
    /// velocity, clamped to the sampleable range `[0.5, dim − 1.5]`.
    #[inline]
    fn trace(&self, i: usize, j: usize, k: usize, sign: f32) -> (f32, f32, f32) {
        let idx = index(i, j, k, self.dim);
        let hi = self.dim as f32 - 1.5;
        let x = (i as f32 + sign * self.dt0 * self.u[idx]).clamp(0.5, hi);
        let y = (j as f32 + sign * self.dt0 * self.v[idx]).clamp(0.5, hi);
        let z = (k as f32 + sign * self.dt0 * self.w[idx]).clamp(0.5, hi);
        (x, y, z)
    }
}

/// Backward trace every interior cell of `target` into `source`.
/// The halo of `target` is left for the boundary resolver.
pub fn advect_semi_lagrangian(target: &mut [f32], source: &[f32], flow: &Flow<'_>) {
    trace_into(target, source, flow, -1.0);
}

fn trace_into(target: &mut [f32], source: &[f32], flow: &Flow<'_>, sign: f32) {
    let dim = flow.dim;
    for k in 1..dim - 1 {
        for j in 1..dim - 1 {
            for i in 1..dim - 1 {
                let (x, y, z) = flow.trace(i, j, k, sign);
                target[index(i, j, k, dim)] = sample_trilinear(source, x, y, z, dim);
            }
        }
    }
}

/// MacCormack: backward trace, forward re-trace of the result, then correct
/// by half the round-trip error. The corrected value is limited to the
/// range of the source cells it was traced from.
pub fn advect_maccormack(target: &mut [f32], source: &[f32], flow: &Flow<'_>, scratch: &mut AdvectScratch) {
    let dim = flow.dim;
    if scratch.hat.len() != source.len() {
        scratch.hat = create_grid(dim);
        scratch.tilde = create_grid(dim);
    }
    // Halo of the intermediate result mirrors the source
    scratch.hat.copy_from_slice(source);
    trace_into(&mut scratch.hat, source, flow, -1.0);
    scratch.tilde.copy_from_slice(source);
    trace_into(&mut scratch.tilde, &scratch.hat, flow, 1.0);

    for k in 1..dim - 1 {
        for j in 1..dim - 1 {
            for i in 1..dim - 1 {
                let idx = index(i, j, k, dim);
                let corrected = scratch.hat[idx] + 0.5 * (source[idx] - scratch.tilde[idx]);
                let (x, y, z) = flow.trace(i, j, k, -1.0);
                let (lo, hi) = sample_range(source, x, y, z, dim);
                target[idx] = corrected.clamp(lo, hi);
            }
        }
    }
}

/// Advect with the configured scheme.
pub fn advect(
    scheme: AdvectionScheme,
    target: &mut [f32],
    source: &[f32],
    flow: &Flow<'_>,
    scratch: &mut AdvectScratch,
) {
    match scheme {
        AdvectionScheme::SemiLagrangian => advect_semi_lagrangian(target, source, flow),
        AdvectionScheme::MacCormack => advect_maccormack(target, source, flow, scratch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{cell_count, interior_sum, DIM};
    use approx::assert_relative_eq;

    fn ramp(dim: usize) -> Vec<f32> {
        let mut grid = create_grid(dim);
        for k in 0..dim {
            for j in 0..dim {
                for i in 0..dim {
                    grid[index(i, j, k, dim)] = (i * 3 + j * 5 + k * 7) as f32 * 0.01;
                }
            }
        }
        grid
    }

    #[test]
    fn test_trilinear_exact_at_grid_points() {
        let dim = DIM;
        let field = ramp(dim);
        for &(i, j, k) in &[(1, 1, 1), (5, 9, 3), (16, 16, 16), (8, 2, 11)] {
            let value = sample_trilinear(&field, i as f32, j as f32, k as f32, dim);
            assert_eq!(value, field[index(i, j, k, dim)], "cell ({},{},{})", i, j, k);
        }
    }

    #[test]
    fn test_trilinear_midpoint_blends() {
        let dim = 6;
        let mut field = create_grid(dim);
        field[index(2, 2, 2, dim)] = 8.0;
        // Midpoint of the cube spanned by (2,2,2)..(3,3,3) gets 1/8 of the corner
        let value = sample_trilinear(&field, 2.5, 2.5, 2.5, dim);
        assert_relative_eq!(value, 1.0);
    }

    #[test]
    fn test_zero_velocity_is_identity() {
        let dim = DIM;
        let source = ramp(dim);
        let zeros = create_grid(dim);
        let flow = Flow {
            u: &zeros,
            v: &zeros,
            w: &zeros,
            dt0: 0.02,
            dim,
        };
        let mut target = create_grid(dim);
        advect_semi_lagrangian(&mut target, &source, &flow);
        assert_eq!(interior_sum(&target, dim), interior_sum(&source, dim));

        let mut scratch = AdvectScratch::default();
        let mut corrected = create_grid(dim);
        advect_maccormack(&mut corrected, &source, &flow, &mut scratch);
        assert_eq!(interior_sum(&corrected, dim), interior_sum(&source, dim));
    }

    #[test]
    fn test_uniform_flow_shifts_by_one_cell() {
        let dim = DIM;
        let mut source = create_grid(dim);
        source[index(8, 8, 8, dim)] = 1.0;
        let u = vec![1.0; cell_count(dim)];
        let zeros = create_grid(dim);
        let flow = Flow {
            u: &u,
            v: &zeros,
            w: &zeros,
            dt0: 1.0,
            dim,
        };
        let mut target = create_grid(dim);
        advect_semi_lagrangian(&mut target, &source, &flow);
        assert_eq!(target[index(9, 8, 8, dim)], 1.0);
        assert_eq!(target[index(8, 8, 8, dim)], 0.0);
    }

    #[test]
    fn test_trace_is_clamped_to_interior() {
        let dim = 6;
        let mut source = create_grid(dim);
        for v in source.iter_mut() {
            *v = 2.0;
        }
        // Huge velocity would trace far outside the grid
        let u = vec![1.0e6; cell_count(dim)];
        let zeros = create_grid(dim);
        let flow = Flow {
            u: &u,
            v: &zeros,
            w: &zeros,
            dt0: 1.0,
            dim,
        };
        let mut target = create_grid(dim);
        advect_semi_lagrangian(&mut target, &source, &flow);
        assert_eq!(target[index(3, 3, 3, dim)], 2.0);
    }

    #[test]
    fn test_maccormack_stays_within_source_range() {
        let dim = DIM;
        let mut source = create_grid(dim);
        for k in 6..10 {
            for j in 6..10 {
                for i in 6..10 {
                    source[index(i, j, k, dim)] = 1.0;
                }
            }
        }
        let u = vec![0.7; cell_count(dim)];
        let v = vec![-0.3; cell_count(dim)];
        let w = vec![0.2; cell_count(dim)];
        let flow = Flow {
            u: &u,
            v: &v,
            w: &w,
            dt0: 1.0,
            dim,
        };
        let mut scratch = AdvectScratch::default();
        let mut target = create_grid(dim);
        advect(AdvectionScheme::MacCormack, &mut target, &source, &flow, &mut scratch);
        assert!(target.iter().all(|&x| (0.0..=1.0).contains(&x)), "limiter must prevent overshoot");
        assert!(interior_sum(&target, dim) > 0.0);
    }

    #[test]
    fn test_maccormack_sharper_than_semi_lagrangian() {
        // Quadratic profile along x shifted by half a cell: linear sampling
        // smears it by s''/8, the correction removes that error
        let dim = DIM;
        let profile = |x: f32| 0.01 * x * x;
        let mut source = create_grid(dim);
        for k in 0..dim {
            for j in 0..dim {
                for i in 0..dim {
                    source[index(i, j, k, dim)] = profile(i as f32);
                }
            }
        }
        let u = vec![0.5; cell_count(dim)];
        let zeros = create_grid(dim);
        let flow = Flow {
            u: &u,
            v: &zeros,
            w: &zeros,
            dt0: 1.0,
            dim,
        };

        let mut plain = create_grid(dim);
        advect_semi_lagrangian(&mut plain, &source, &flow);
        let mut scratch = AdvectScratch::default();
        let mut corrected = create_grid(dim);
        advect_maccormack(&mut corrected, &source, &flow, &mut scratch);

        let (mut plain_err, mut corrected_err) = (0.0f32, 0.0f32);
        for k in 2..dim - 2 {
            for j in 2..dim - 2 {
                for i in 2..dim - 3 {
                    let idx = index(i, j, k, dim);
                    let exact = profile(i as f32 - 0.5);
                    plain_err += (plain[idx] - exact).abs();
                    corrected_err += (corrected[idx] - exact).abs();
                }
            }
        }
        assert!(plain_err > 0.0);
        assert!(
            corrected_err < 0.1 * plain_err,
            "correction error {} vs semi-Lagrangian {}",
            corrected_err,
            plain_err
        );
        assert_relative_eq!(plain[index(8, 8, 8, dim)], profile(7.5) + 0.01 / 4.0, max_relative = 1e-4);
    }
}
