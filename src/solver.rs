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

//! Seeded-Newton ray/aspheric-surface intersection.
//!
//! The surface is expected in `rt10` form (radius-parameterized, see
//! [`crate::aspheric::AsphericProfile::Rt10`]) since that is the only
//! convention [`crate::aspheric::AsphericProfile::dsag_dr`] implements a
//! derivative for.
//!
//! Refraction/reflection is out of scope: the caller gets back a parametric
//! distance `t` and is responsible for whatever happens to the ray
//! afterwards.

use crate::aspheric::AsphericProfile;

const EPS_T: f64 = 1e-10;
const EPS_DIRZ: f64 = 1e-14;
const EPS_R: f64 = 1e-14;
const EPS_DFDT: f64 = 1e-14;

/// A ray in the surface-local frame, where the surface vertex lies at z=0.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: (f64, f64, f64),
    pub direction: (f64, f64, f64),
}

impl Ray {
    pub fn new(origin: (f64, f64, f64), direction: (f64, f64, f64)) -> Self {
        Ray { origin, direction }
    }

    #[inline]
    fn point_at(&self, t: f64) -> (f64, f64, f64) {
        (
            self.origin.0 + self.direction.0 * t,
            self.origin.1 + self.direction.1 * t,
            self.origin.2 + self.direction.2 * t,
        )
    }
}

/// Finds the ray-vs-sphere approximation roots for a sphere of radius `r_curv`
/// centered at `(0,0,r_curv)`, returning up to two positive, finite roots
/// ordered smallest-first.
fn sphere_seed_guesses(ray: &Ray, r_curv: f64) -> Vec<f64> {
    let mut guesses = Vec::with_capacity(2);
    if !r_curv.is_finite() || r_curv == 0.0 {
        return guesses;
    }
    let (ox, oy, oz) = ray.origin;
    let (dx, dy, dz) = ray.direction;
    let cz = r_curv;
    let a = dx * dx + dy * dy + dz * dz;
    if a == 0.0 {
        return guesses;
    }
    let b = 2.0 * (ox * dx + oy * dy + (oz - cz) * dz);
    let c = ox * ox + oy * oy + (oz - cz) * (oz - cz) - r_curv * r_curv;
    let d = b * b - 4.0 * a * c;
    if d < 0.0 {
        return guesses;
    }
    let sd = d.sqrt();
    let t1 = (-b - sd) / (2.0 * a);
    let t2 = (-b + sd) / (2.0 * a);
    if t1 > EPS_T {
        guesses.push(t1);
    }
    if t2 > EPS_T {
        guesses.push(t2);
    }
    if guesses.len() == 2 && guesses[0] > guesses[1] {
        guesses.swap(0, 1);
    }
    guesses
}

/// Assembles up to 10 initial Newton guesses in priority order, as described
/// in Section 4.B of the spec.
fn assemble_guesses(ray: &Ray, r_curv: f64, semidia: f64) -> Vec<f64> {
    let mut guesses = sphere_seed_guesses(ray, r_curv);

    let (ox, oy, oz) = ray.origin;
    let (dx, dy, dz) = ray.direction;

    if dz.abs() > EPS_DIRZ && guesses.len() < 10 {
        let tp = -oz / dz;
        if tp > EPS_T {
            guesses.push(tp);
        }
    }

    if semidia.is_finite() && semidia > 0.0 && guesses.len() < 10 {
        let cur_r = (ox * ox + oy * oy).sqrt();
        let dir_r = (dx * dx + dy * dy).sqrt();
        if dir_r > EPS_R {
            for target_r in [semidia * 0.8, semidia * 1.0] {
                if target_r > cur_r && guesses.len() < 10 {
                    let ts = (target_r - cur_r) / dir_r;
                    if ts > EPS_T {
                        guesses.push(ts);
                    }
                }
            }
        }
    }

    if guesses.is_empty() {
        guesses.extend_from_slice(&[1e-6, 1e-4, 1e-2]);
    }

    guesses
}

/// Runs Newton iteration for `ray` against `profile` starting from `t0`.
/// Returns `Some(t)` on convergence inside the semidiameter, `None`
/// otherwise (the caller tries the next seed).
fn newton_from_seed(ray: &Ray, profile: &AsphericProfile, mut t: f64, max_iter: usize, tol: f64) -> Option<f64> {
    if !(t > 0.0) || !t.is_finite() {
        return None;
    }
    let semidia = profile.semidia();

    for _ in 0..max_iter {
        let (x, y, z) = ray.point_at(t);
        let r2 = x * x + y * y;
        let r = r2.sqrt();

        let sag = profile.sag(r);
        let f = z - sag;
        if f.abs() < tol {
            if semidia > 0.0 && r > semidia {
                return None;
            }
            return if t > 0.0 { Some(t) } else { None };
        }

        let dzdr = profile.dsag_dr(r);
        let drdt = if r > EPS_R {
            (x * ray.direction.0 + y * ray.direction.1) / r
        } else {
            0.0
        };
        let dfdt = ray.direction.2 - dzdr * drdt;
        if !dfdt.is_finite() || dfdt.abs() < EPS_DFDT {
            return None;
        }

        let step = f / dfdt;
        if !step.is_finite() {
            return None;
        }
        t -= step;
        if !(t > 0.0) {
            return None;
        }
    }
    None
}

/// Locates the intersection of `ray` (in surface-local coordinates) with the
/// aspheric surface described by `profile` (must be the `Rt10` form), trying
/// up to 10 seeded Newton iterations and returning the first seed that
/// converges inside the semidiameter.
///
/// `max_iter` defaults to 20 and `tol` to `1e-7` when the caller supplies a
/// non-positive value, matching the distilled spec's contract.
pub fn intersect_aspheric(ray: &Ray, profile: &AsphericProfile, max_iter: i64, tol: f64) -> Option<f64> {
    let (ox, oy, oz) = ray.origin;
    let (dx, dy, dz) = ray.direction;
    if ![ox, oy, oz, dx, dy, dz].iter().all(|v| v.is_finite()) {
        return None;
    }

    let max_iter = if max_iter > 0 { max_iter as usize } else { 20 };
    let tol = if tol > 0.0 { tol } else { 1e-7 };

    let r_curv = match profile {
        AsphericProfile::Rt10 { r_curv, .. } => *r_curv,
        _ => panic!("intersect_aspheric requires an AsphericProfile::Rt10 profile"),
    };
    let semidia = profile.semidia();

    for t0 in assemble_guesses(ray, r_curv, semidia) {
        if let Some(t) = newton_from_seed(ray, profile, t0, max_iter, tol) {
            return Some(t);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspheric::PolyMode;

    fn sphere_profile(r_curv: f64, semidia: f64) -> AsphericProfile {
        AsphericProfile::Rt10 {
            r_curv,
            k: 0.0,
            coef: [0.0; 10],
            mode: PolyMode::Even,
            semidia,
        }
    }

    #[test]
    fn axial_ray_hits_vertex() {
        // S3
        let ray = Ray::new((0.0, 0.0, -5.0), (0.0, 0.0, 1.0));
        let profile = sphere_profile(10.0, 3.0);
        let t = intersect_aspheric(&ray, &profile, 20, 1e-9).expect("should hit");
        assert!((t - 5.0).abs() < 1e-7);
    }

    #[test]
    fn paraxial_ray_hits_sphere() {
        // S4
        let ray = Ray::new((0.5, 0.0, -5.0), (0.0, 0.0, 1.0));
        let profile = sphere_profile(10.0, 3.0);
        let t = intersect_aspheric(&ray, &profile, 20, 1e-9).expect("should hit");
        let expected_sag = 1.0 / (10.0 * (1.0 + (1.0 - 0.25f64 / 100.0).sqrt()));
        assert!((t - (5.0 + expected_sag)).abs() < 1e-6);
    }

    #[test]
    fn hit_point_satisfies_surface_equation_and_aperture() {
        // Invariant 5
        let ray = Ray::new((1.2, -0.4, -8.0), (0.02, 0.01, 1.0));
        let profile = sphere_profile(15.0, 5.0);
        if let Some(t) = intersect_aspheric(&ray, &profile, 20, 1e-9) {
            let (x, y, z) = ray.point_at(t);
            let r = (x * x + y * y).sqrt();
            let sag = profile.sag(r);
            assert!((z - sag).abs() <= 1e-7);
            assert!(r <= profile.semidia() + 1e-9);
        }
    }

    #[test]
    fn non_finite_inputs_fail_immediately() {
        let ray = Ray::new((0.0, 0.0, f64::NAN), (0.0, 0.0, 1.0));
        let profile = sphere_profile(10.0, 3.0);
        assert!(intersect_aspheric(&ray, &profile, 20, 1e-9).is_none());
    }

    #[test]
    fn grazing_ray_outside_semidia_fails() {
        let ray = Ray::new((100.0, 0.0, -5.0), (0.0, 0.0, 1.0));
        let profile = sphere_profile(10.0, 3.0);
        assert!(intersect_aspheric(&ray, &profile, 20, 1e-7).is_none());
    }

    #[test]
    fn nonpositive_max_iter_and_tol_use_defaults() {
        let ray = Ray::new((0.0, 0.0, -5.0), (0.0, 0.0, 1.0));
        let profile = sphere_profile(10.0, 3.0);
        let t = intersect_aspheric(&ray, &profile, 0, 0.0).expect("defaults should still converge");
        assert!((t - 5.0).abs() < 1e-6);
    }
}
