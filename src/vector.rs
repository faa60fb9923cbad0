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

//! Free-standing 3-vector helpers and the ray/sphere closed-form
//! intersection, kept separate from [`crate::solver`] since the PSF
//! pipeline never needs them and the ray-surface solver only needs
//! [`vector_dot`] implicitly through its own scalar arithmetic.

pub type Vec3 = (f64, f64, f64);

#[inline]
pub fn vector_dot(a: Vec3, b: Vec3) -> f64 {
    a.0 * b.0 + a.1 * b.1 + a.2 * b.2
}

#[inline]
pub fn vector_cross(a: Vec3, b: Vec3) -> Vec3 {
    (
        a.1 * b.2 - a.2 * b.1,
        a.2 * b.0 - a.0 * b.2,
        a.0 * b.1 - a.1 * b.0,
    )
}

/// Normalizes `v`, returning `(0.0, 0.0, 0.0)` for a zero-length (or
/// non-finite) input rather than dividing by zero.
pub fn vector_normalize(v: Vec3) -> Vec3 {
    let len2 = vector_dot(v, v);
    if !(len2 > 0.0) || !len2.is_finite() {
        return (0.0, 0.0, 0.0);
    }
    let inv_len = 1.0 / len2.sqrt();
    (v.0 * inv_len, v.1 * inv_len, v.2 * inv_len)
}

/// Normalizes every vector in `input` into `output` (see [`vector_normalize`]).
pub fn batch_vector_normalize(input: &[Vec3], output: &mut [Vec3]) {
    debug_assert_eq!(input.len(), output.len());
    for (v, o) in itertools::izip!(input, output) {
        *o = vector_normalize(*v);
    }
}

/// Closed-form intersection of a ray (`origin`, unit `direction`) with a
/// sphere of `radius` centered at `center`.
///
/// Returns the smaller strictly positive root, or `-1.0` if the ray misses
/// the sphere or both roots are non-positive (the sphere is behind, or
/// exactly at, the ray's origin).
pub fn ray_sphere_intersect(origin: Vec3, direction: Vec3, center: Vec3, radius: f64) -> f64 {
    let oc = (origin.0 - center.0, origin.1 - center.1, origin.2 - center.2);
    let a = vector_dot(direction, direction);
    if a == 0.0 {
        return -1.0;
    }
    let b = 2.0 * vector_dot(oc, direction);
    let c = vector_dot(oc, oc) - radius * radius;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return -1.0;
    }
    let sd = discriminant.sqrt();
    let t1 = (-b - sd) / (2.0 * a);
    let t2 = (-b + sd) / (2.0 * a);

    if t1 > 0.0 {
        t1
    } else if t2 > 0.0 {
        t2
    } else {
        -1.0
    }
}
