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

//! Flat `extern "C"` surface over the safe API in [`crate::aspheric`],
//! [`crate::solver`], [`crate::vector`] and [`crate::psf`].
//!
//! This is purely a marshalling layer: every function here unpacks raw
//! pointers into slices, calls into the safe API, and repacks the result.
//! No numeric logic lives here. Every array is length-prefixed by a
//! separate parameter and no struct crosses the boundary, per the
//! distilled spec's Section 6.

use std::collections::HashMap;
use std::slice;
use std::sync::Mutex;

use crate::aspheric::{self, AsphericProfile, PolyMode};
use crate::cache;
use crate::psf;
use crate::solver::{self, Ray};
use crate::vector;

fn poly_mode(mode_odd: i32) -> PolyMode {
    if mode_odd != 0 {
        PolyMode::Odd
    } else {
        PolyMode::Even
    }
}

#[no_mangle]
pub extern "C" fn aspheric_sag(r: f64, c: f64, k: f64, a4: f64, a6: f64, a8: f64, a10: f64) -> f64 {
    aspheric::aspheric_sag(r, c, k, a4, a6, a8, a10)
}

#[allow(clippy::too_many_arguments)]
#[no_mangle]
pub extern "C" fn aspheric_sag10(
    r: f64,
    c: f64,
    k: f64,
    a4: f64,
    a6: f64,
    a8: f64,
    a10: f64,
    a12: f64,
    a14: f64,
    a16: f64,
    a18: f64,
    a20: f64,
    a22: f64,
) -> f64 {
    aspheric::aspheric_sag10(r, c, k, a4, a6, a8, a10, a12, a14, a16, a18, a20, a22)
}

#[allow(clippy::too_many_arguments)]
#[no_mangle]
pub extern "C" fn aspheric_sag_rt10(
    r: f64,
    r_curv: f64,
    k: f64,
    coef1: f64,
    coef2: f64,
    coef3: f64,
    coef4: f64,
    coef5: f64,
    coef6: f64,
    coef7: f64,
    coef8: f64,
    coef9: f64,
    coef10: f64,
    mode_odd: i32,
) -> f64 {
    let coef = [coef1, coef2, coef3, coef4, coef5, coef6, coef7, coef8, coef9, coef10];
    aspheric::aspheric_sag_rt10(r, r_curv, k, &coef, poly_mode(mode_odd))
}

/// # Safety
/// `r` and `out` must each point to `count` valid, non-overlapping `f64`s.
#[no_mangle]
pub unsafe extern "C" fn batch_aspheric_sag(
    r: *const f64,
    count: usize,
    c: f64,
    k: f64,
    a4: f64,
    a6: f64,
    a8: f64,
    a10: f64,
    out: *mut f64,
) {
    let r = slice::from_raw_parts(r, count);
    let out = slice::from_raw_parts_mut(out, count);
    aspheric::batch_aspheric_sag(r, c, k, a4, a6, a8, a10, out);
}

/// # Safety
/// `r` and `out` must each point to `count` valid, non-overlapping `f64`s.
#[allow(clippy::too_many_arguments)]
#[no_mangle]
pub unsafe extern "C" fn batch_aspheric_sag10(
    r: *const f64,
    count: usize,
    c: f64,
    k: f64,
    a4: f64,
    a6: f64,
    a8: f64,
    a10: f64,
    a12: f64,
    a14: f64,
    a16: f64,
    a18: f64,
    a20: f64,
    a22: f64,
    out: *mut f64,
) {
    let r = slice::from_raw_parts(r, count);
    let out = slice::from_raw_parts_mut(out, count);
    aspheric::batch_aspheric_sag10(r, c, k, a4, a6, a8, a10, a12, a14, a16, a18, a20, a22, out);
}

#[no_mangle]
pub extern "C" fn vector_dot(ax: f64, ay: f64, az: f64, bx: f64, by: f64, bz: f64) -> f64 {
    vector::vector_dot((ax, ay, az), (bx, by, bz))
}

/// # Safety
/// `out` must point to 3 valid `f64`s.
#[no_mangle]
pub unsafe extern "C" fn vector_cross(ax: f64, ay: f64, az: f64, bx: f64, by: f64, bz: f64, out: *mut f64) {
    let (x, y, z) = vector::vector_cross((ax, ay, az), (bx, by, bz));
    let out = slice::from_raw_parts_mut(out, 3);
    out[0] = x;
    out[1] = y;
    out[2] = z;
}

/// # Safety
/// `out` must point to 3 valid `f64`s.
#[no_mangle]
pub unsafe extern "C" fn vector_normalize(vx: f64, vy: f64, vz: f64, out: *mut f64) {
    let (x, y, z) = vector::vector_normalize((vx, vy, vz));
    let out = slice::from_raw_parts_mut(out, 3);
    out[0] = x;
    out[1] = y;
    out[2] = z;
}

/// # Safety
/// `v` must point to `3*count` valid `f64`s and `out` to `3*count` valid,
/// non-overlapping `f64`s.
#[no_mangle]
pub unsafe extern "C" fn batch_vector_normalize(v: *const f64, count: usize, out: *mut f64) {
    let v = slice::from_raw_parts(v, count * 3);
    let out = slice::from_raw_parts_mut(out, count * 3);
    let input: Vec<vector::Vec3> = v.chunks_exact(3).map(|c| (c[0], c[1], c[2])).collect();
    let mut output = vec![(0.0, 0.0, 0.0); count];
    vector::batch_vector_normalize(&input, &mut output);
    for (dst, (x, y, z)) in out.chunks_exact_mut(3).zip(output.into_iter()) {
        dst[0] = x;
        dst[1] = y;
        dst[2] = z;
    }
}

#[no_mangle]
pub extern "C" fn ray_sphere_intersect(
    ox: f64,
    oy: f64,
    oz: f64,
    dx: f64,
    dy: f64,
    dz: f64,
    cx: f64,
    cy: f64,
    cz: f64,
    radius: f64,
) -> f64 {
    vector::ray_sphere_intersect((ox, oy, oz), (dx, dy, dz), (cx, cy, cz), radius)
}

#[allow(clippy::too_many_arguments)]
#[no_mangle]
pub extern "C" fn intersect_aspheric_rt10(
    ox: f64,
    oy: f64,
    oz: f64,
    dx: f64,
    dy: f64,
    dz: f64,
    semidia: f64,
    r_curv: f64,
    k: f64,
    coef1: f64,
    coef2: f64,
    coef3: f64,
    coef4: f64,
    coef5: f64,
    coef6: f64,
    coef7: f64,
    coef8: f64,
    coef9: f64,
    coef10: f64,
    mode_odd: i32,
    max_iter: i64,
    tol: f64,
) -> f64 {
    let coef = [coef1, coef2, coef3, coef4, coef5, coef6, coef7, coef8, coef9, coef10];
    let profile = AsphericProfile::Rt10 {
        r_curv,
        k,
        coef,
        mode: poly_mode(mode_odd),
        semidia,
    };
    let ray = Ray::new((ox, oy, oz), (dx, dy, dz));
    solver::intersect_aspheric(&ray, &profile, max_iter, tol).unwrap_or(-1.0)
}

/// # Safety
/// `ray_x`, `ray_y`, `ray_opd` must each point to `ray_count` valid `f64`s.
/// The returned pointer is either null (allocation failure) or owns
/// `n*n` `f64`s and must be released with [`free_psf_result`].
#[allow(clippy::too_many_arguments)]
#[no_mangle]
pub unsafe extern "C" fn calculate_psf(
    ray_x: *const f64,
    ray_y: *const f64,
    ray_opd: *const f64,
    ray_count: usize,
    n: usize,
    wavelength: f64,
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
) -> *mut f64 {
    let ray_x = slice::from_raw_parts(ray_x, ray_count);
    let ray_y = slice::from_raw_parts(ray_y, ray_count);
    let ray_opd = slice::from_raw_parts(ray_opd, ray_count);
    match psf::calculate_psf(ray_x, ray_y, ray_opd, n, wavelength, min_x, max_x, min_y, max_y) {
        Some(result) => into_owned_ptr(result),
        None => std::ptr::null_mut(),
    }
}

/// # Safety
/// `mask` must point to `n*n` valid `i32`s. `grid_opd`/`amplitude` are
/// either null (treated per the distilled spec: zero OPD / uniform
/// amplitude) or point to `n*n` valid `f64`s. The returned pointer follows
/// the same ownership contract as [`calculate_psf`].
#[no_mangle]
pub unsafe extern "C" fn calculate_psf_grid(
    grid_opd: *const f64,
    amplitude: *const f64,
    mask: *const i32,
    n: usize,
    wavelength: f64,
) -> *mut f64 {
    let grid_opd = if grid_opd.is_null() {
        None
    } else {
        Some(slice::from_raw_parts(grid_opd, n * n))
    };
    let amplitude = if amplitude.is_null() {
        None
    } else {
        Some(slice::from_raw_parts(amplitude, n * n))
    };
    let mask = slice::from_raw_parts(mask, n * n);
    match psf::calculate_psf_grid(grid_opd, amplitude, mask, n, wavelength) {
        Some(result) => into_owned_ptr(result),
        None => std::ptr::null_mut(),
    }
}

/// Tracks the element count each [`into_owned_ptr`]-returned pointer owns,
/// keyed by the pointer's address, so [`free_psf_result`] can take a bare
/// pointer the way `free_psf_result(ptr)` is specified — mirroring how a
/// real `malloc` tracks an allocation's size ahead of the pointer it hands
/// back, since this crate has no allocator hook to stash it there directly.
static ALLOC_LENGTHS: Mutex<Option<HashMap<usize, usize>>> = Mutex::new(None);

fn into_owned_ptr(mut v: Vec<f64>) -> *mut f64 {
    v.shrink_to_fit();
    let len = v.len();
    let ptr = v.as_mut_ptr();
    std::mem::forget(v);
    ALLOC_LENGTHS
        .lock()
        .unwrap()
        .get_or_insert_with(HashMap::new)
        .insert(ptr as usize, len);
    ptr
}

/// # Safety
/// `psf` must point to `n*n` valid `f64`s, as returned by [`calculate_psf`]
/// or [`calculate_psf_grid`].
#[no_mangle]
pub unsafe extern "C" fn calculate_strehl(psf_ptr: *const f64, n: usize) -> f64 {
    let data = slice::from_raw_parts(psf_ptr, n * n).to_vec();
    psf::calculate_strehl(&data, n)
}

/// # Safety
/// `psf` must point to `n*n` valid `f64`s. `radii` and `out_energies` must
/// each point to `radii_count` valid `f64`s, non-overlapping for `out_energies`.
#[no_mangle]
pub unsafe extern "C" fn calculate_encircled_energy(
    psf_ptr: *const f64,
    n: usize,
    radii: *const f64,
    out_energies: *mut f64,
    radii_count: usize,
) {
    let data = slice::from_raw_parts(psf_ptr, n * n).to_vec();
    let radii = slice::from_raw_parts(radii, radii_count);
    let out = slice::from_raw_parts_mut(out_energies, radii_count);
    psf::calculate_encircled_energy(&data, n, radii, out);
}

/// Releases a PSF result returned by [`calculate_psf`]/[`calculate_psf_grid`].
/// Idempotent on null.
///
/// # Safety
/// `ptr` must either be null or have been returned by `calculate_psf`/
/// `calculate_psf_grid`, and must not have been freed already.
#[no_mangle]
pub unsafe extern "C" fn free_psf_result(ptr: *mut f64) {
    if ptr.is_null() {
        return;
    }
    let len = ALLOC_LENGTHS
        .lock()
        .unwrap()
        .get_or_insert_with(HashMap::new)
        .remove(&(ptr as usize))
        .expect("free_psf_result called on a pointer not owned by this crate");
    drop(Vec::from_raw_parts(ptr, len, len));
}

/// Releases all process-wide caches (twiddle table, trig table, FFT scratch).
/// See [`crate::cache::cleanup`] for the in-flight-call caveat.
#[no_mangle]
pub extern "C" fn cleanup() {
    cache::cleanup();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspheric_sag_ffi_matches_safe_api() {
        assert_eq!(aspheric_sag(1.0, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0), aspheric::aspheric_sag(1.0, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn intersect_and_free_psf_round_trip_through_raw_pointers() {
        let t = intersect_aspheric_rt10(
            0.0, 0.0, -5.0, 0.0, 0.0, 1.0, 3.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0, 20,
            1e-9,
        );
        assert!((t - 5.0).abs() < 1e-6);

        let n = 8usize;
        let mask = vec![1i32; n * n];
        let ptr = unsafe { calculate_psf_grid(std::ptr::null(), std::ptr::null(), mask.as_ptr(), n, 500e-9) };
        assert!(!ptr.is_null());
        let strehl = unsafe { calculate_strehl(ptr, n) };
        assert!(strehl.is_finite());
        unsafe { free_psf_result(ptr) };
    }

    #[test]
    fn free_psf_result_is_idempotent_on_null() {
        unsafe { free_psf_result(std::ptr::null_mut()) };
    }
}
