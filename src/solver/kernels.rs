//! Stencil kernels for the multigrid solver.
//!
//! Every kernel comes in a scalar form and a `pulp`-vectorized form. The
//! vectorized forms process the interior of one x-row at a time, lane-wise,
//! with a scalar tail for rows that do not fill a whole vector.
//!
//! The Gauss-Seidel sweep has a loop-carried dependency on `x - 1`. Both
//! backends split it the same way: the five independent neighbor terms are
//! summed for the whole row first, then the `x - 1` term is folded in
//! serially. The floating point operations and their order are identical,
//! so relax, residual, restrict and prolongate give bit-identical results on
//! either backend and at any vector width. Only the norm reduction differs.

use serde::{Deserialize, Serialize};

use crate::grid::{index, SIMD_MIN_DIM};

/// Which kernel family to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelBackend {
    /// Vectorized kernels on levels of at least `SIMD_MIN_DIM`, scalar below.
    #[default]
    Simd,
    /// Scalar kernels on every level.
    Scalar,
}

impl KernelBackend {
    /// Whether a level of this dimension takes the vectorized path.
    #[inline]
    pub fn vectorizes(self, dim: usize) -> bool {
        cfg!(feature = "simd") && self == KernelBackend::Simd && dim >= SIMD_MIN_DIM
    }

    #[inline]
    fn vectorizes_flat(self) -> bool {
        cfg!(feature = "simd") && self == KernelBackend::Simd
    }
}

// ============================================================================
// Scalar reference implementations
// ============================================================================

#[inline(always)]
fn five_sum(xp: f32, ym: f32, yp: f32, zm: f32, zp: f32) -> f32 {
    (((xp + ym) + yp) + zm) + zp
}

/// Fill `row[..dim-2]` with the partial neighbor sums of one interior row,
/// everything except the `x - 1` term.
fn partial_sums_scalar(phi: &[f32], i0: usize, n: usize, dim: usize, row: &mut [f32]) {
    let plane = dim * dim;
    for (k, out) in row[..n].iter_mut().enumerate() {
        let i = i0 + k;
        *out = five_sum(phi[i + 1], phi[i - dim], phi[i + dim], phi[i - plane], phi[i + plane]);
    }
}

/// Serial part of the sweep: fold in the freshly updated `x - 1` value.
#[inline]
fn carry_row(phi: &mut [f32], phi0: &[f32], i0: usize, n: usize, a: f32, c: f32, row: &[f32]) {
    let mut prev = phi[i0 - 1];
    for k in 0..n {
        let i = i0 + k;
        let value = (phi0[i] + a * (prev + row[k])) / c;
        phi[i] = value;
        prev = value;
    }
}

/// One in-place Gauss-Seidel sweep of `c·φ − a·Σφ = φ0` over the interior.
pub fn relax_scalar(phi: &mut [f32], phi0: &[f32], dim: usize, a: f32, c: f32, row: &mut [f32]) {
    let n = dim - 2;
    for z in 1..dim - 1 {
        for y in 1..dim - 1 {
            let i0 = index(1, y, z, dim);
            partial_sums_scalar(phi, i0, n, dim, row);
            carry_row(phi, phi0, i0, n, a, c, row);
        }
    }
}

/// `r = φ0 − (c·φ − a·Σφ)` over the interior. The halo of `out` is untouched.
pub fn residual_scalar(phi: &[f32], phi0: &[f32], dim: usize, a: f32, c: f32, out: &mut [f32]) {
    let plane = dim * dim;
    for z in 1..dim - 1 {
        for y in 1..dim - 1 {
            let i0 = index(1, y, z, dim);
            for i in i0..i0 + dim - 2 {
                let s = ((((phi[i - 1] + phi[i + 1]) + phi[i - dim]) + phi[i + dim]) + phi[i - plane])
                    + phi[i + plane];
                out[i] = phi0[i] - (c * phi[i] - a * s);
            }
        }
    }
}

/// Sum of squares over the interior.
pub fn norm_squared_scalar(values: &[f32], dim: usize) -> f32 {
    let mut sum = 0.0f32;
    for z in 1..dim - 1 {
        for y in 1..dim - 1 {
            let i0 = index(1, y, z, dim);
            for &r in &values[i0..i0 + dim - 2] {
                sum += r * r;
            }
        }
    }
    sum
}

/// Gather the even fine samples under one coarse interior row.
fn inject_row(fine: &[f32], fine_dim: usize, y: usize, z: usize, n: usize, row: &mut [f32]) {
    let f0 = index(0, 2 * y, 2 * z, fine_dim);
    for (k, out) in row[..n].iter_mut().enumerate() {
        *out = fine[f0 + 2 * (k + 1)];
    }
}

/// Injection: coarse interior cell `X` takes fine cell `2X`. Halo zeroed.
pub fn restrict_scalar(fine: &[f32], fine_dim: usize, coarse: &mut [f32], coarse_dim: usize, row: &mut [f32]) {
    coarse.fill(0.0);
    let n = coarse_dim - 2;
    for z in 1..coarse_dim - 1 {
        for y in 1..coarse_dim - 1 {
            inject_row(fine, fine_dim, y, z, n, row);
            let c0 = index(1, y, z, coarse_dim);
            coarse[c0..c0 + n].copy_from_slice(&row[..n]);
        }
    }
}

/// Gather the nearest coarse correction for one fine interior row.
fn expand_row(coarse: &[f32], coarse_dim: usize, y: usize, z: usize, n: usize, row: &mut [f32]) {
    let cy = (y + 1) / 2;
    let cz = (z + 1) / 2;
    for (k, out) in row[..n].iter_mut().enumerate() {
        *out = coarse[index((k + 2) / 2, cy, cz, coarse_dim)];
    }
}

/// Nearest-neighbor upsample: every fine interior cell `x` gains coarse `(x+1)/2`.
pub fn prolongate_scalar(
    coarse: &[f32],
    coarse_dim: usize,
    fine: &mut [f32],
    fine_dim: usize,
    row: &mut [f32],
) {
    let n = fine_dim - 2;
    for z in 1..fine_dim - 1 {
        for y in 1..fine_dim - 1 {
            expand_row(coarse, coarse_dim, y, z, n, row);
            let i0 = index(1, y, z, fine_dim);
            for (f, &corr) in fine[i0..i0 + n].iter_mut().zip(&row[..n]) {
                *f += corr;
            }
        }
    }
}

/// `dst += k·src` over whole buffers.
pub fn add_scaled_scalar(dst: &mut [f32], src: &[f32], k: f32) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d += k * s;
    }
}

/// `dst *= k` over a whole buffer.
pub fn scale_scalar(dst: &mut [f32], k: f32) {
    for d in dst.iter_mut() {
        *d *= k;
    }
}

/// Σ values·mask.
pub fn masked_sum_scalar(values: &[f32], mask: &[f32]) -> f32 {
    values.iter().zip(mask).map(|(&v, &m)| v * m).sum()
}

// ============================================================================
// SIMD implementations
// ============================================================================

#[cfg(feature = "simd")]
mod simd_impl {
    use pulp::{Arch, Simd, WithSimd};

    use super::{carry_row, five_sum, inject_row};
    use crate::grid::index;

    /// Vectorized version of `partial_sums_scalar`.
    #[inline(always)]
    fn partial_sums<S: Simd>(simd: S, phi: &[f32], i0: usize, n: usize, dim: usize, row: &mut [f32]) {
        let plane = dim * dim;
        let xp = &phi[i0 + 1..i0 + 1 + n];
        let ym = &phi[i0 - dim..i0 - dim + n];
        let yp = &phi[i0 + dim..i0 + dim + n];
        let zm = &phi[i0 - plane..i0 - plane + n];
        let zp = &phi[i0 + plane..i0 + plane + n];

        let (xp_head, xp_tail) = S::f32s_as_simd(xp);
        let (ym_head, ym_tail) = S::f32s_as_simd(ym);
        let (yp_head, yp_tail) = S::f32s_as_simd(yp);
        let (zm_head, zm_tail) = S::f32s_as_simd(zm);
        let (zp_head, zp_tail) = S::f32s_as_simd(zp);
        let (out_head, out_tail) = S::f32s_as_mut_simd(&mut row[..n]);

        for (k, out) in out_head.iter_mut().enumerate() {
            let mut s = simd.f32s_add(xp_head[k], ym_head[k]);
            s = simd.f32s_add(s, yp_head[k]);
            s = simd.f32s_add(s, zm_head[k]);
            *out = simd.f32s_add(s, zp_head[k]);
        }

        // Scalar tail
        for (k, out) in out_tail.iter_mut().enumerate() {
            *out = five_sum(xp_tail[k], ym_tail[k], yp_tail[k], zm_tail[k], zp_tail[k]);
        }
    }

    pub fn relax(phi: &mut [f32], phi0: &[f32], dim: usize, a: f32, c: f32, row: &mut [f32]) {
        struct Impl<'a> {
            phi: &'a mut [f32],
            phi0: &'a [f32],
            dim: usize,
            a: f32,
            c: f32,
            row: &'a mut [f32],
        }

        impl WithSimd for Impl<'_> {
            type Output = ();

            #[inline(always)]
            fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
                let Impl { phi, phi0, dim, a, c, row } = self;
                let n = dim - 2;
                for z in 1..dim - 1 {
                    for y in 1..dim - 1 {
                        let i0 = index(1, y, z, dim);
                        partial_sums(simd, phi, i0, n, dim, row);
                        carry_row(phi, phi0, i0, n, a, c, row);
                    }
                }
            }
        }

        Arch::new().dispatch(Impl { phi, phi0, dim, a, c, row });
    }

    pub fn residual(phi: &[f32], phi0: &[f32], dim: usize, a: f32, c: f32, out: &mut [f32]) {
        struct Impl<'a> {
            phi: &'a [f32],
            phi0: &'a [f32],
            dim: usize,
            a: f32,
            c: f32,
            out: &'a mut [f32],
        }

        impl WithSimd for Impl<'_> {
            type Output = ();

            #[inline(always)]
            fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
                let Impl { phi, phi0, dim, a, c, out } = self;
                let n = dim - 2;
                let plane = dim * dim;
                let a_v = simd.f32s_splat(a);
                let c_v = simd.f32s_splat(c);

                for z in 1..dim - 1 {
                    for y in 1..dim - 1 {
                        let i0 = index(1, y, z, dim);
                        let center = &phi[i0..i0 + n];
                        let rhs = &phi0[i0..i0 + n];
                        let xm = &phi[i0 - 1..i0 - 1 + n];
                        let xp = &phi[i0 + 1..i0 + 1 + n];
                        let ym = &phi[i0 - dim..i0 - dim + n];
                        let yp = &phi[i0 + dim..i0 + dim + n];
                        let zm = &phi[i0 - plane..i0 - plane + n];
                        let zp = &phi[i0 + plane..i0 + plane + n];

                        let (center_head, center_tail) = S::f32s_as_simd(center);
                        let (rhs_head, rhs_tail) = S::f32s_as_simd(rhs);
                        let (xm_head, xm_tail) = S::f32s_as_simd(xm);
                        let (xp_head, xp_tail) = S::f32s_as_simd(xp);
                        let (ym_head, ym_tail) = S::f32s_as_simd(ym);
                        let (yp_head, yp_tail) = S::f32s_as_simd(yp);
                        let (zm_head, zm_tail) = S::f32s_as_simd(zm);
                        let (zp_head, zp_tail) = S::f32s_as_simd(zp);
                        let (out_head, out_tail) = S::f32s_as_mut_simd(&mut out[i0..i0 + n]);

                        for (k, r) in out_head.iter_mut().enumerate() {
                            let mut s = simd.f32s_add(xm_head[k], xp_head[k]);
                            s = simd.f32s_add(s, ym_head[k]);
                            s = simd.f32s_add(s, yp_head[k]);
                            s = simd.f32s_add(s, zm_head[k]);
                            s = simd.f32s_add(s, zp_head[k]);
                            let lhs = simd.f32s_sub(
                                simd.f32s_mul(c_v, center_head[k]),
                                simd.f32s_mul(a_v, s),
                            );
                            *r = simd.f32s_sub(rhs_head[k], lhs);
                        }

                        for (k, r) in out_tail.iter_mut().enumerate() {
                            let s = ((((xm_tail[k] + xp_tail[k]) + ym_tail[k]) + yp_tail[k])
                                + zm_tail[k])
                                + zp_tail[k];
                            *r = rhs_tail[k] - (c * center_tail[k] - a * s);
                        }
                    }
                }
            }
        }

        Arch::new().dispatch(Impl { phi, phi0, dim, a, c, out });
    }

    /// The fine samples are strided, so each row is gathered first and
    /// stored into the coarse level lane-wise.
    pub fn restrict(fine: &[f32], fine_dim: usize, coarse: &mut [f32], coarse_dim: usize, row: &mut [f32]) {
        struct Impl<'a> {
            fine: &'a [f32],
            fine_dim: usize,
            coarse: &'a mut [f32],
            coarse_dim: usize,
            row: &'a mut [f32],
        }

        impl WithSimd for Impl<'_> {
            type Output = ();

            #[inline(always)]
            fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
                let Impl { fine, fine_dim, coarse, coarse_dim, row } = self;
                let n = coarse_dim - 2;
                let zero = simd.f32s_splat(0.0);
                {
                    let (head, tail) = S::f32s_as_mut_simd(&mut *coarse);
                    for c in head.iter_mut() {
                        *c = zero;
                    }
                    tail.fill(0.0);
                }
                for z in 1..coarse_dim - 1 {
                    for y in 1..coarse_dim - 1 {
                        inject_row(fine, fine_dim, y, z, n, row);
                        let c0 = index(1, y, z, coarse_dim);
                        let (src_head, src_tail) = S::f32s_as_simd(&row[..n]);
                        let (dst_head, dst_tail) = S::f32s_as_mut_simd(&mut coarse[c0..c0 + n]);
                        for (d, s) in dst_head.iter_mut().zip(src_head) {
                            *d = *s;
                        }
                        dst_tail.copy_from_slice(src_tail);
                    }
                }
            }
        }

        Arch::new().dispatch(Impl { fine, fine_dim, coarse, coarse_dim, row });
    }

    pub fn norm_squared(values: &[f32], dim: usize) -> f32 {
        struct Impl<'a> {
            values: &'a [f32],
            dim: usize,
        }

        impl WithSimd for Impl<'_> {
            type Output = f32;

            #[inline(always)]
            fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
                let Impl { values, dim } = self;
                let n = dim - 2;
                let mut acc = simd.f32s_splat(0.0);
                let mut tail_sum = 0.0f32;
                for z in 1..dim - 1 {
                    for y in 1..dim - 1 {
                        let i0 = index(1, y, z, dim);
                        let (head, tail) = S::f32s_as_simd(&values[i0..i0 + n]);
                        for &r in head {
                            acc = simd.f32s_add(acc, simd.f32s_mul(r, r));
                        }
                        for &r in tail {
                            tail_sum += r * r;
                        }
                    }
                }
                simd.f32s_reduce_sum(acc) + tail_sum
            }
        }

        Arch::new().dispatch(Impl { values, dim })
    }

    /// `dst += src` lane-wise over equal-length slices.
    pub fn add_assign(dst: &mut [f32], src: &[f32]) {
        struct Impl<'a> {
            dst: &'a mut [f32],
            src: &'a [f32],
        }

        impl WithSimd for Impl<'_> {
            type Output = ();

            #[inline(always)]
            fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
                let (dst_head, dst_tail) = S::f32s_as_mut_simd(self.dst);
                let (src_head, src_tail) = S::f32s_as_simd(self.src);
                for (d, s) in dst_head.iter_mut().zip(src_head) {
                    *d = simd.f32s_add(*d, *s);
                }
                for (d, s) in dst_tail.iter_mut().zip(src_tail) {
                    *d += s;
                }
            }
        }

        Arch::new().dispatch(Impl { dst, src });
    }

    pub fn add_scaled(dst: &mut [f32], src: &[f32], k: f32) {
        struct Impl<'a> {
            dst: &'a mut [f32],
            src: &'a [f32],
            k: f32,
        }

        impl WithSimd for Impl<'_> {
            type Output = ();

            #[inline(always)]
            fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
                let k_v = simd.f32s_splat(self.k);
                let (dst_head, dst_tail) = S::f32s_as_mut_simd(self.dst);
                let (src_head, src_tail) = S::f32s_as_simd(self.src);
                for (d, s) in dst_head.iter_mut().zip(src_head) {
                    *d = simd.f32s_add(*d, simd.f32s_mul(k_v, *s));
                }
                for (d, s) in dst_tail.iter_mut().zip(src_tail) {
                    *d += self.k * s;
                }
            }
        }

        Arch::new().dispatch(Impl { dst, src, k });
    }

    pub fn scale(dst: &mut [f32], k: f32) {
        struct Impl<'a> {
            dst: &'a mut [f32],
            k: f32,
        }

        impl WithSimd for Impl<'_> {
            type Output = ();

            #[inline(always)]
            fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
                let k_v = simd.f32s_splat(self.k);
                let (head, tail) = S::f32s_as_mut_simd(self.dst);
                for d in head.iter_mut() {
                    *d = simd.f32s_mul(*d, k_v);
                }
                for d in tail.iter_mut() {
                    *d *= self.k;
                }
            }
        }

        Arch::new().dispatch(Impl { dst, k });
    }

    pub fn masked_sum(values: &[f32], mask: &[f32]) -> f32 {
        struct Impl<'a> {
            values: &'a [f32],
            mask: &'a [f32],
        }

        impl WithSimd for Impl<'_> {
            type Output = f32;

            #[inline(always)]
            fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
                let (v_head, v_tail) = S::f32s_as_simd(self.values);
                let (m_head, m_tail) = S::f32s_as_simd(self.mask);
                let mut acc = simd.f32s_splat(0.0);
                for (v, m) in v_head.iter().zip(m_head) {
                    acc = simd.f32s_add(acc, simd.f32s_mul(*v, *m));
                }
                let tail: f32 = v_tail.iter().zip(m_tail).map(|(v, m)| v * m).sum();
                simd.f32s_reduce_sum(acc) + tail
            }
        }

        Arch::new().dispatch(Impl { values, mask })
    }
}

// ============================================================================
// Public API with backend selection
// ============================================================================

/// Gauss-Seidel sweep. `row` must hold at least `dim - 2` values.
pub fn relax(
    backend: KernelBackend,
    phi: &mut [f32],
    phi0: &[f32],
    dim: usize,
    a: f32,
    c: f32,
    row: &mut [f32],
) {
    #[cfg(feature = "simd")]
    {
        if backend.vectorizes(dim) {
            simd_impl::relax(phi, phi0, dim, a, c, row);
            return;
        }
    }
    let _ = backend;
    relax_scalar(phi, phi0, dim, a, c, row);
}

pub fn residual(
    backend: KernelBackend,
    phi: &[f32],
    phi0: &[f32],
    dim: usize,
    a: f32,
    c: f32,
    out: &mut [f32],
) {
    #[cfg(feature = "simd")]
    {
        if backend.vectorizes(dim) {
            simd_impl::residual(phi, phi0, dim, a, c, out);
            return;
        }
    }
    let _ = backend;
    residual_scalar(phi, phi0, dim, a, c, out);
}

pub fn norm_squared(backend: KernelBackend, values: &[f32], dim: usize) -> f32 {
    #[cfg(feature = "simd")]
    {
        if backend.vectorizes(dim) {
            return simd_impl::norm_squared(values, dim);
        }
    }
    let _ = backend;
    norm_squared_scalar(values, dim)
}

/// Injection restriction. `row` must hold at least `coarse_dim - 2` values.
pub fn restrict(
    backend: KernelBackend,
    fine: &[f32],
    fine_dim: usize,
    coarse: &mut [f32],
    coarse_dim: usize,
    row: &mut [f32],
) {
    #[cfg(feature = "simd")]
    {
        if backend.vectorizes(fine_dim) {
            simd_impl::restrict(fine, fine_dim, coarse, coarse_dim, row);
            return;
        }
    }
    let _ = backend;
    restrict_scalar(fine, fine_dim, coarse, coarse_dim, row);
}

pub fn prolongate(
    backend: KernelBackend,
    coarse: &[f32],
    coarse_dim: usize,
    fine: &mut [f32],
    fine_dim: usize,
    row: &mut [f32],
) {
    #[cfg(feature = "simd")]
    {
        if backend.vectorizes(fine_dim) {
            let n = fine_dim - 2;
            for z in 1..fine_dim - 1 {
                for y in 1..fine_dim - 1 {
                    expand_row(coarse, coarse_dim, y, z, n, row);
                    let i0 = index(1, y, z, fine_dim);
                    simd_impl::add_assign(&mut fine[i0..i0 + n], &row[..n]);
                }
            }
            return;
        }
    }
    let _ = backend;
    prolongate_scalar(coarse, coarse_dim, fine, fine_dim, row);
}

pub fn add_scaled(backend: KernelBackend, dst: &mut [f32], src: &[f32], k: f32) {
    debug_assert_eq!(dst.len(), src.len());
    #[cfg(feature = "simd")]
    {
        if backend.vectorizes_flat() {
            simd_impl::add_scaled(dst, src, k);
            return;
        }
    }
    let _ = backend;
    add_scaled_scalar(dst, src, k);
}

pub fn scale(backend: KernelBackend, dst: &mut [f32], k: f32) {
    #[cfg(feature = "simd")]
    {
        if backend.vectorizes_flat() {
            simd_impl::scale(dst, k);
            return;
        }
    }
    let _ = backend;
    scale_scalar(dst, k);
}

pub fn masked_sum(backend: KernelBackend, values: &[f32], mask: &[f32]) -> f32 {
    debug_assert_eq!(values.len(), mask.len());
    #[cfg(feature = "simd")]
    {
        if backend.vectorizes_flat() {
            return simd_impl::masked_sum(values, mask);
        }
    }
    let _ = backend;
    masked_sum_scalar(values, mask)
}
