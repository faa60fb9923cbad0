// wavefront_core - numerical core for aspheric ray intersection and PSF synthesis
// Copyright (C) 2024 Wavefront Core Contributors

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! In-place radix-2 FFT engine with a cached twiddle table, and the
//! cache-aware 2D transform built on top of it.
//!
//! The twiddle table is addressed directly by the butterfly stages (never
//! the oversampled trig table in [`crate::cache`], which exists only for the
//! complex-pupil step and would cost the FFT its precision).

use num_complex::Complex64;

use crate::cache;

/// Runs the in-place iterative radix-2 Cooley-Tukey FFT on `data`.
///
/// `n = data.len()` must be a power of two (checked with `debug_assert!`,
/// matching the teacher crate's convention of asserting on caller
/// programming errors rather than returning `Result`). `inverse` selects the
/// inverse transform, which is additionally scaled by `1/n`.
pub fn fft_1d(data: &mut [Complex64], inverse: bool) {
    let n = data.len();
    if n <= 1 {
        return;
    }
    debug_assert!(n.is_power_of_two(), "FFT length must be a power of two");
    fft_1d_unnormalized(data, inverse);
    normalize(data, inverse);
}

/// Bit-reversal + butterfly stages only, without the inverse-transform
/// `1/n` scaling. Shared by [`fft_1d`] and the divide-and-conquer base case
/// so that the latter only scales once, at the outermost recursion level.
fn fft_1d_unnormalized(data: &mut [Complex64], inverse: bool) {
    let n = data.len();
    if n <= 1 {
        return;
    }
    bit_reverse_permute(data);

    cache::with_twiddle_table(n, |twiddles| {
        let mut len = 2;
        while len <= n {
            let step = n / len;
            let half = len / 2;
            let mut i = 0;
            while i < n {
                for j in 0..half {
                    let mut idx = j * step;
                    if inverse {
                        idx = (n - idx) % n;
                    }
                    let w = twiddles[idx];
                    let u = data[i + j];
                    let v = data[i + j + half] * w;
                    data[i + j] = u + v;
                    data[i + j + half] = u - v;
                }
                i += len;
            }
            len <<= 1;
        }
    });
}

fn normalize(data: &mut [Complex64], inverse: bool) {
    if inverse {
        let inv_n = 1.0 / data.len() as f64;
        for x in data.iter_mut() {
            *x *= inv_n;
        }
    }
}

/// Divide-and-conquer variant of [`fft_1d`], equivalent in result. Falls back
/// to the iterative kernel for `n <= 64`, matching the threshold in the
/// original C implementation this is grounded on.
pub fn fft_1d_divide_conquer(data: &mut [Complex64], inverse: bool) {
    let n = data.len();
    if n <= 1 {
        return;
    }
    debug_assert!(n.is_power_of_two(), "FFT length must be a power of two");
    fft_dc_unnormalized(data, inverse);
    normalize(data, inverse);
}

fn fft_dc_unnormalized(data: &mut [Complex64], inverse: bool) {
    let n = data.len();
    if n <= 1 {
        return;
    }
    if n <= 64 {
        fft_1d_unnormalized(data, inverse);
        return;
    }

    let half = n / 2;
    let mut even: Vec<Complex64> = (0..half).map(|i| data[2 * i]).collect();
    let mut odd: Vec<Complex64> = (0..half).map(|i| data[2 * i + 1]).collect();

    fft_dc_unnormalized(&mut even, inverse);
    fft_dc_unnormalized(&mut odd, inverse);

    let sign = if inverse { 1.0 } else { -1.0 };
    for k in 0..half {
        let angle = sign * 2.0 * std::f64::consts::PI * (k as f64) / (n as f64);
        let w = Complex64::new(angle.cos(), angle.sin());
        let t = w * odd[k];
        data[k] = even[k] + t;
        data[k + half] = even[k] - t;
    }
}

fn bit_reverse_permute(data: &mut [Complex64]) {
    let n = data.len();
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            data.swap(i, j);
        }
    }
}

/// Transposes an `n x n` row-major complex matrix `src` into `dst`, using
/// blocked tiling for cache locality (block size 64 for `n >= 256`, else
/// 32 — see Section 4.C of the spec).
fn transpose_blocked(src: &[Complex64], dst: &mut [Complex64], n: usize) {
    let block = if n >= 256 { 64 } else { 32 };
    let mut ii = 0;
    while ii < n {
        let i_max = (ii + block).min(n);
        let mut jj = 0;
        while jj < n {
            let j_max = (jj + block).min(n);
            for i in ii..i_max {
                for j in jj..j_max {
                    dst[j * n + i] = src[i * n + j];
                }
            }
            jj += block;
        }
        ii += block;
    }
}

/// Runs the forward/inverse 2D FFT on an `n x n` row-major complex buffer in
/// place: row FFT, blocked transpose into scratch, row FFT again (these were
/// the original columns), blocked transpose back.
///
/// Returns `false` without modifying `data` if the process-wide scratch
/// buffer could not be grown to `n*n` elements (allocation failure) — per
/// the crate's error model this is silent; callers in sensitive contexts
/// should verify via an inverse round-trip.
pub fn fft_2d(data: &mut [Complex64], n: usize, inverse: bool) -> bool {
    debug_assert_eq!(data.len(), n * n);
    if n <= 1 {
        return true;
    }

    let transformed = cache::with_scratch(n * n, |scratch| {
        for row in data.chunks_mut(n) {
            fft_1d(row, inverse);
        }
        transpose_blocked(data, scratch, n);
        for row in scratch.chunks_mut(n) {
            fft_1d(row, inverse);
        }
        transpose_blocked(scratch, data, n);
    });

    transformed.is_some()
}

/// Quadrant-swaps an `n x n` row-major real array so that the DC bin moves
/// from the corner to the array center (`n` must be even).
pub fn fftshift(data: &mut [f64], n: usize) {
    debug_assert_eq!(data.len(), n * n);
    let half = n / 2;
    for i in 0..half {
        for j in 0..half {
            data.swap(i * n + j, (i + half) * n + (j + half));
            data.swap(i * n + (j + half), (i + half) * n + j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signal(n: usize) -> Vec<Complex64> {
        (0..n)
            .map(|i| Complex64::new((i as f64 * 0.37).sin(), (i as f64 * 0.11).cos()))
            .collect()
    }

    #[test]
    fn ifft_of_fft_is_identity() {
        for &n in &[2usize, 4, 8, 16, 64, 256, 1024] {
            let original = sample_signal(n);
            let mut data = original.clone();
            fft_1d(&mut data, false);
            fft_1d(&mut data, true);
            let max_err = original
                .iter()
                .zip(data.iter())
                .map(|(a, b)| (a - b).norm())
                .fold(0.0, f64::max);
            let norm_inf = original.iter().map(|c| c.norm()).fold(0.0, f64::max);
            assert!(max_err <= 1e-9 * norm_inf.max(1.0), "n={n} max_err={max_err}");
        }
    }

    #[test]
    fn divide_conquer_matches_iterative() {
        for &n in &[2usize, 8, 64, 128, 512] {
            let original = sample_signal(n);
            let mut a = original.clone();
            let mut b = original.clone();
            fft_1d(&mut a, false);
            fft_1d_divide_conquer(&mut b, false);
            for (x, y) in a.iter().zip(b.iter()) {
                assert!((x - y).norm() < 1e-8, "n={n}");
            }
        }
    }

    #[test]
    fn impulse_has_flat_spectrum() {
        // S5: 8x8 input with a single 1 at the origin.
        let n = 8;
        let mut data = vec![Complex64::new(0.0, 0.0); n * n];
        data[0] = Complex64::new(1.0, 0.0);
        assert!(fft_2d(&mut data, n, false));
        for c in &data {
            assert!((c.norm() - 1.0).abs() < 1e-9);
        }
        let mut intensity: Vec<f64> = data.iter().map(|c| c.norm_sqr()).collect();
        fftshift(&mut intensity, n);
        for v in &intensity {
            assert!((v - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn fftshift_is_involutive() {
        let n = 16;
        let original: Vec<f64> = (0..n * n).map(|i| i as f64).collect();
        let mut data = original.clone();
        fftshift(&mut data, n);
        fftshift(&mut data, n);
        assert_eq!(data, original);
    }

    #[test]
    fn fft_2d_ifft_round_trip() {
        let n = 32;
        let original: Vec<Complex64> = (0..n * n)
            .map(|i| Complex64::new((i as f64 * 0.013).sin(), (i as f64 * 0.029).cos()))
            .collect();
        let mut data = original.clone();
        assert!(fft_2d(&mut data, n, false));
        assert!(fft_2d(&mut data, n, true));
        let norm_inf = original.iter().map(|c| c.norm()).fold(0.0, f64::max);
        for (a, b) in original.iter().zip(data.iter()) {
            assert!((a - b).norm() <= 1e-9 * norm_inf.max(1.0));
        }
    }
}
