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

//! Wavefront-to-PSF pipeline: grid interpolation, complex-pupil construction,
//! 2D FFT, intensity extraction, quadrant swap, and the Strehl/encircled
//! energy metrics.
//!
//! The two entry points, [`calculate_psf`] (ray-sample form) and
//! [`calculate_psf_grid`] (pre-gridded form), use opposite phase signs. This
//! is a known inconsistency in the system this crate is grounded on and is
//! preserved rather than "fixed" — see `DESIGN.md`.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::cache;
use crate::fft;

/// `N x N` row-major grid of `(opd, amplitude, mask)`, as produced by the
/// ray-sample gridding step or supplied directly by the pre-gridded entry
/// point.
pub struct PupilGrid {
    pub n: usize,
    pub opd: Vec<f64>,
    pub amplitude: Vec<f64>,
    pub mask: Vec<i32>,
}

/// `N x N` row-major intensity map, DC-shifted to the array center.
pub type PsfResult = Vec<f64>;

/// Grids `ray_count` `(ray_x[i], ray_y[i], ray_opd[i])` samples onto an
/// `n x n` cell grid spanning `(min_x, max_x) x (min_y, max_y)`, assigning
/// each cell the OPD of its nearest ray (squared-distance scan, early-exit
/// below `1e-8`) and masking out cells beyond `max_radius = max(|max_x|,
/// |max_y|)`.
fn interpolate_opd_grid(
    ray_x: &[f64],
    ray_y: &[f64],
    ray_opd: &[f64],
    n: usize,
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
) -> PupilGrid {
    debug_assert_eq!(ray_x.len(), ray_y.len());
    debug_assert_eq!(ray_x.len(), ray_opd.len());

    let max_radius = max_x.abs().max(max_y.abs());
    let max_radius2 = max_radius * max_radius;

    let mut opd = vec![0.0; n * n];
    let mut mask = vec![0i32; n * n];
    let amplitude = vec![1.0; n * n];

    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };

    for i in 0..n {
        let gx = min_x + (max_x - min_x) * (i as f64) / denom;
        for j in 0..n {
            let gy = min_y + (max_y - min_y) * (j as f64) / denom;
            let idx = i * n + j;

            if gx * gx + gy * gy > max_radius2 {
                mask[idx] = 0;
                opd[idx] = 0.0;
                continue;
            }

            mask[idx] = 1;
            let mut best_d2 = f64::INFINITY;
            let mut best_opd = 0.0;
            for k in 0..ray_x.len() {
                let dx = ray_x[k] - gx;
                let dy = ray_y[k] - gy;
                let d2 = dx * dx + dy * dy;
                if d2 < best_d2 {
                    best_d2 = d2;
                    best_opd = ray_opd[k];
                    if d2 < 1e-8 {
                        break;
                    }
                }
            }
            opd[idx] = best_opd;
        }
    }

    PupilGrid { n, opd, amplitude, mask }
}

/// Builds the complex pupil field from a grid, with phase constant `k`
/// (positive for the ray-sample form, negative for the pre-gridded form —
/// see the module docs).
fn build_complex_field(grid: &PupilGrid, k: f64) -> Vec<Complex64> {
    let mut field = vec![Complex64::new(0.0, 0.0); grid.n * grid.n];
    for idx in 0..field.len() {
        if grid.mask[idx] == 0 {
            continue;
        }
        let phase = k * grid.opd[idx];
        let re = cache::fast_cos(grid.n * grid.n, phase);
        let im = cache::fast_sin(grid.n * grid.n, phase);
        field[idx] = Complex64::new(grid.amplitude[idx] * re, grid.amplitude[idx] * im);
    }
    field
}

fn run_psf_pipeline(mut field: Vec<Complex64>, n: usize) -> Option<PsfResult> {
    if !fft::fft_2d(&mut field, n, false) {
        return None;
    }
    let mut intensity: Vec<f64> = field.iter().map(|c| c.re * c.re + c.im * c.im).collect();
    fft::fftshift(&mut intensity, n);
    Some(intensity)
}

/// Ray-sample form: grids `ray_count` wavefront samples, builds the complex
/// pupil with phase constant `k = 2*pi/lambda` (positive sign — see module
/// docs), and runs it through the 2D FFT pipeline.
///
/// Returns `None` if the FFT scratch buffer could not be grown (allocation
/// failure).
#[allow(clippy::too_many_arguments)]
pub fn calculate_psf(
    ray_x: &[f64],
    ray_y: &[f64],
    ray_opd: &[f64],
    n: usize,
    wavelength: f64,
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
) -> Option<PsfResult> {
    debug_assert!(n.is_power_of_two());
    let grid = interpolate_opd_grid(ray_x, ray_y, ray_opd, n, min_x, max_x, min_y, max_y);
    let k = 2.0 * PI / wavelength;
    let field = build_complex_field(&grid, k);
    run_psf_pipeline(field, n)
}

/// Pre-gridded form: takes caller-supplied `grid_opd`/`amplitude`/`mask`
/// directly (`grid_opd = None` is treated as all-zero, `amplitude = None`
/// as uniform `1.0`), builds the complex pupil with phase constant
/// `k = -2*pi/lambda` (negated sign — this is the authoritative path; see
/// module docs), and runs the 2D FFT pipeline.
pub fn calculate_psf_grid(
    grid_opd: Option<&[f64]>,
    amplitude: Option<&[f64]>,
    mask: &[i32],
    n: usize,
    wavelength: f64,
) -> Option<PsfResult> {
    debug_assert!(n.is_power_of_two());
    debug_assert_eq!(mask.len(), n * n);

    let grid = PupilGrid {
        n,
        opd: grid_opd.map(|s| s.to_vec()).unwrap_or_else(|| vec![0.0; n * n]),
        amplitude: amplitude.map(|s| s.to_vec()).unwrap_or_else(|| vec![1.0; n * n]),
        mask: mask.to_vec(),
    };
    let k = -2.0 * PI / wavelength;
    let field = build_complex_field(&grid, k);
    run_psf_pipeline(field, n)
}

/// Strehl ratio: the center pixel of a PSF already shifted so DC sits at
/// `(N/2, N/2)`. Normalization against a diffraction-limited reference peak
/// is the caller's responsibility.
pub fn calculate_strehl(psf: &PsfResult, n: usize) -> f64 {
    debug_assert_eq!(psf.len(), n * n);
    let center = n / 2;
    psf[center * n + center]
}

/// Encircled energy for each radius in `radii` (ascending pixel distance
/// from `(N/2, N/2)`), writing `out[k] = energy within radii[k] / total
/// energy`.
pub fn calculate_encircled_energy(psf: &PsfResult, n: usize, radii: &[f64], out: &mut [f64]) {
    debug_assert_eq!(psf.len(), n * n);
    debug_assert_eq!(radii.len(), out.len());

    let total: f64 = psf.iter().sum();
    if total == 0.0 {
        out.iter_mut().for_each(|o| *o = 0.0);
        return;
    }

    let cx = (n / 2) as f64;
    let cy = (n / 2) as f64;

    for (r, o) in radii.iter().zip(out.iter_mut()) {
        let r2 = r * r;
        let mut acc = 0.0;
        for i in 0..n {
            let di = i as f64 - cx;
            for j in 0..n {
                let dj = j as f64 - cy;
                if di * di + dj * dj <= r2 {
                    acc += psf[i * n + j];
                }
            }
        }
        *o = acc / total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_pupil_psf_peaks_at_center_and_is_four_fold_symmetric() {
        // S6
        let n = 64usize;
        let mut mask = vec![0i32; n * n];
        let radius = (n / 4) as f64;
        for i in 0..n {
            for j in 0..n {
                let di = i as f64 - (n as f64) / 2.0;
                let dj = j as f64 - (n as f64) / 2.0;
                if di * di + dj * dj <= radius * radius {
                    mask[i * n + j] = 1;
                }
            }
        }
        let psf = calculate_psf_grid(None, None, &mask, n, 500e-9).expect("fft should not fail");
        let center = n / 2;
        let peak = psf[center * n + center];
        for i in 0..n {
            for j in 0..n {
                assert!(psf[i * n + j] <= peak + 1e-6, "peak should be at center");
            }
        }

        // Four-fold symmetry about the center.
        for i in 0..n {
            for j in 0..n {
                let (di, dj) = (i as i64 - center as i64, j as i64 - center as i64);
                let mirrored = ((center as i64 - di) as usize, (center as i64 - dj) as usize);
                if mirrored.0 < n && mirrored.1 < n {
                    let a = psf[i * n + j];
                    let b = psf[mirrored.0 * n + mirrored.1];
                    assert!((a - b).abs() < 1e-6 * peak.max(1.0));
                }
            }
        }
    }

    #[test]
    fn masked_out_cells_contribute_nothing_to_the_field() {
        // Invariant (mask semantics)
        let n = 8;
        let mask = vec![0i32; n * n];
        let psf = calculate_psf_grid(None, None, &mask, n, 500e-9).expect("fft should not fail");
        assert!(psf.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn encircled_energy_is_monotonic_and_saturates() {
        // Invariant 6
        let n = 32usize;
        let mut mask = vec![0i32; n * n];
        for i in 0..n {
            for j in 0..n {
                let di = i as f64 - (n as f64) / 2.0;
                let dj = j as f64 - (n as f64) / 2.0;
                if di * di + dj * dj <= 64.0 {
                    mask[i * n + j] = 1;
                }
            }
        }
        let psf = calculate_psf_grid(None, None, &mask, n, 500e-9).expect("fft should not fail");
        let radii = [1.0, 2.0, 4.0, 8.0, 16.0, (n as f64) * std::f64::consts::SQRT_2 / 2.0 + 1.0];
        let mut out = [0.0; 6];
        calculate_encircled_energy(&psf, n, &radii, &mut out);
        for w in out.windows(2) {
            assert!(w[1] + 1e-9 >= w[0], "{:?}", out);
        }
        for v in &out {
            assert!(*v >= 0.0 && *v <= 1.0 + 1e-9);
        }
        assert!((out[out.len() - 1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ray_sample_and_grid_forms_use_opposite_phase_sign() {
        // Moderate phase constant, well inside the oversampled trig table's
        // resolution, so the cos(-x)=cos(x)/sin(-x)=-sin(x) symmetry is only
        // subject to one quantization step of error, not the error a
        // multi-million-radian reduction would introduce.
        let n = 4usize;
        let grid = PupilGrid {
            n,
            opd: vec![0.3; n * n],
            amplitude: vec![1.0; n * n],
            mask: vec![1i32; n * n],
        };
        let k = 3.0;
        let pos = build_complex_field(&grid, k);
        let neg = build_complex_field(&grid, -k);
        let table_step = 2.0 * PI / (4.0 * (n * n) as f64);
        for (a, b) in pos.iter().zip(neg.iter()) {
            assert!((a.re - b.re).abs() < 2.0 * table_step);
            assert!((a.im + b.im).abs() < 2.0 * table_step);
        }
    }
}
