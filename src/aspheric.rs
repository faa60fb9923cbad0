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

//! Closed-form sag and `dz/dr` for a conic + even/odd polynomial aspheric
//! surface.
//!
//! Two coefficient conventions coexist here on purpose (see the distilled
//! spec's Design Notes): a curvature-parameterized "explicit" form and a
//! radius-parameterized "rt10" form. They are not unified into one code path
//! because the upstream optical-prescription formats that motivate them
//! don't agree on exponents or sign conventions either.

/// Which odd/even exponent ladder the ten `coef` entries of the rt10 form
/// index into: `2,4,...,20` for [`PolyMode::Even`] or `3,5,...,21` for
/// [`PolyMode::Odd`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PolyMode {
    Even,
    Odd,
}

/// Tagged description of an aspheric surface's coefficient convention, for
/// callers that want to carry a profile around rather than pass each
/// evaluator its own flat argument list.
///
/// Non-goal reminder: off-axis / non-rotationally-symmetric surfaces are out
/// of scope, so a profile is fully described by its sag law plus
/// `semidia`.
#[derive(Clone, Debug)]
pub enum AsphericProfile {
    /// `sag(r) = c*r^2/(1+sqrt(1-(1+k)*c^2*r^2)) + a4*r^4 + a6*r^6 + a8*r^8 + a10*r^10`
    ExplicitShort {
        c: f64,
        k: f64,
        a4: f64,
        a6: f64,
        a8: f64,
        a10: f64,
        semidia: f64,
    },
    /// Same base conic term, extended polynomial up to `r^22`.
    ExplicitLong {
        c: f64,
        k: f64,
        coeffs: [f64; 10], // a4, a6, a8, a10, a12, a14, a16, a18, a20, a22
        semidia: f64,
    },
    /// Radius-parameterized ("rt10") form used by the ray-surface solver.
    Rt10 {
        r_curv: f64,
        k: f64,
        coef: [f64; 10],
        mode: PolyMode,
        semidia: f64,
    },
}

impl AsphericProfile {
    pub fn semidia(&self) -> f64 {
        match self {
            AsphericProfile::ExplicitShort { semidia, .. } => *semidia,
            AsphericProfile::ExplicitLong { semidia, .. } => *semidia,
            AsphericProfile::Rt10 { semidia, .. } => *semidia,
        }
    }

    /// Sag at radial distance `r`. Degenerate regions (negative conic
    /// discriminant, non-finite result) return `0.0` rather than signaling,
    /// per the crate's total-function error policy.
    pub fn sag(&self, r: f64) -> f64 {
        match self {
            AsphericProfile::ExplicitShort { c, k, a4, a6, a8, a10, .. } => {
                aspheric_sag(r, *c, *k, *a4, *a6, *a8, *a10)
            }
            AsphericProfile::ExplicitLong { c, k, coeffs, .. } => aspheric_sag10(
                r, *c, *k, coeffs[0], coeffs[1], coeffs[2], coeffs[3], coeffs[4], coeffs[5],
                coeffs[6], coeffs[7], coeffs[8], coeffs[9],
            ),
            AsphericProfile::Rt10 { r_curv, k, coef, mode, .. } => {
                aspheric_sag_rt10(r, *r_curv, *k, coef, *mode)
            }
        }
    }

    /// `dz/dr` at radial distance `r`, used by the Newton solver. Only
    /// defined (and only needed) for the rt10 form, since that is the only
    /// convention the ray-surface solver accepts.
    pub(crate) fn dsag_dr(&self, r: f64) -> f64 {
        match self {
            AsphericProfile::Rt10 { r_curv, k, coef, mode, .. } => {
                rt10_dsag_dr(r, *r_curv, *k, coef, *mode)
            }
            _ => unimplemented!("dz/dr is only defined for the rt10 profile form"),
        }
    }
}

/// Form 1 — curvature-parameterized sag, 4 even polynomial coefficients
/// (`a4..a10`).
pub fn aspheric_sag(r: f64, c: f64, k: f64, a4: f64, a6: f64, a8: f64, a10: f64) -> f64 {
    if r == 0.0 {
        return 0.0;
    }
    let r2 = r * r;
    let discriminant = 1.0 - (1.0 + k) * c * c * r2;
    if discriminant <= 0.0 {
        return 0.0;
    }
    let basic_sag = (c * r2) / (1.0 + discriminant.sqrt());

    let r4 = r2 * r2;
    let r6 = r4 * r2;
    let r8 = r4 * r4;
    let r10 = r8 * r2;
    basic_sag + a4 * r4 + a6 * r6 + a8 * r8 + a10 * r10
}

/// Form 1 extended — curvature-parameterized sag, 10 even polynomial
/// coefficients (`a4..a22`).
#[allow(clippy::too_many_arguments)]
pub fn aspheric_sag10(
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
    if r == 0.0 {
        return 0.0;
    }
    let r2 = r * r;
    let discriminant = 1.0 - (1.0 + k) * c * c * r2;
    if discriminant <= 0.0 {
        return 0.0;
    }
    let basic_sag = (c * r2) / (1.0 + discriminant.sqrt());

    let r4 = r2 * r2;
    let r6 = r4 * r2;
    let r8 = r4 * r4;
    let r10 = r8 * r2;
    let r12 = r6 * r6;
    let r14 = r12 * r2;
    let r16 = r8 * r8;
    let r18 = r16 * r2;
    let r20 = r10 * r10;
    let r22 = r20 * r2;

    basic_sag
        + a4 * r4
        + a6 * r6
        + a8 * r8
        + a10 * r10
        + a12 * r12
        + a14 * r14
        + a16 * r16
        + a18 * r18
        + a20 * r20
        + a22 * r22
}

fn rt10_poly(r: f64, r2: f64, coef: &[f64; 10], mode: PolyMode) -> f64 {
    let mut asphere = 0.0;
    let mut r_power = match mode {
        PolyMode::Even => r2,     // r^2
        PolyMode::Odd => r2 * r,  // r^3
    };
    for &c in coef {
        if c != 0.0 {
            asphere += c * r_power;
        }
        r_power *= r2;
    }
    asphere
}

/// Form 2 — radius-parameterized ("rt10") sag. `R=0` denotes a flat surface
/// (sag identically `0.0`).
pub fn aspheric_sag_rt10(r: f64, r_curv: f64, k: f64, coef: &[f64; 10], mode: PolyMode) -> f64 {
    if r_curv == 0.0 {
        return 0.0;
    }
    let r2 = r * r;
    let sqrt_term = 1.0 - (1.0 + k) * r2 / (r_curv * r_curv);
    if !sqrt_term.is_finite() || sqrt_term < 0.0 {
        return 0.0;
    }
    let base = r2 / (r_curv * (1.0 + sqrt_term.sqrt()));
    let asphere = rt10_poly(r, r2, coef, mode);
    let out = base + asphere;
    if out.is_finite() {
        out
    } else {
        0.0
    }
}

/// `d(poly)/dr` for the rt10 polynomial term.
fn rt10_dpoly_dr(r: f64, r2: f64, coef: &[f64; 10], mode: PolyMode) -> f64 {
    if r == 0.0 {
        return 0.0;
    }
    let mut dz = 0.0;
    match mode {
        PolyMode::Odd => {
            // sag term i: coef_i * r^(2i+1) for i=1..10 => r^3..r^21
            let mut r_pow = r2; // r^2
            for (i, &c) in coef.iter().enumerate() {
                if c != 0.0 {
                    let p = (2 * (i + 1) + 1) as f64; // 3,5,...,21
                    dz += c * p * r_pow;
                }
                r_pow *= r2;
            }
        }
        PolyMode::Even => {
            // sag term i: coef_i * r^(2i) for i=1..10 => r^2..r^20
            let mut r_pow = r; // r^1
            for (i, &c) in coef.iter().enumerate() {
                if c != 0.0 {
                    let p = (2 * (i + 1)) as f64; // 2,4,...,20
                    dz += c * p * r_pow;
                }
                r_pow *= r2;
            }
        }
    }
    dz
}

/// `dz/dr` for the full rt10 sag (conic base term plus polynomial term).
pub(crate) fn rt10_dsag_dr(r: f64, r_curv: f64, k: f64, coef: &[f64; 10], mode: PolyMode) -> f64 {
    if r == 0.0 {
        return 0.0;
    }
    let r2 = r * r;
    let mut dzdr_base = 0.0;
    if r_curv.is_finite() && r_curv != 0.0 {
        let term = (1.0 + k) * r2 / (r_curv * r_curv);
        if term < 1.0 {
            let sqrt_term = (1.0 - term).sqrt();
            if sqrt_term > 0.0 {
                let denom = r_curv * (1.0 + sqrt_term);
                let sqrt_der = (1.0 + k) * r / (r_curv * r_curv * sqrt_term);
                dzdr_base = (2.0 * r * denom - r2 * r_curv * sqrt_der) / (denom * denom);
            }
        } else {
            // Spherical-cap regime: fall back to 1/R.
            dzdr_base = 1.0 / r_curv;
        }
    }
    dzdr_base + rt10_dpoly_dr(r, r2, coef, mode)
}

/// Evaluates `r` for a batch of radii using the 4-coefficient explicit form.
pub fn batch_aspheric_sag(r: &[f64], c: f64, k: f64, a4: f64, a6: f64, a8: f64, a10: f64, out: &mut [f64]) {
    debug_assert_eq!(r.len(), out.len());
    for (ri, oi) in itertools::izip!(r, out) {
        *oi = aspheric_sag(*ri, c, k, a4, a6, a8, a10);
    }
}

/// Evaluates `r` for a batch of radii using the 10-coefficient explicit
/// form.
#[allow(clippy::too_many_arguments)]
pub fn batch_aspheric_sag10(
    r: &[f64],
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
    out: &mut [f64],
) {
    debug_assert_eq!(r.len(), out.len());
    for (ri, oi) in itertools::izip!(r, out) {
        *oi = aspheric_sag10(*ri, c, k, a4, a6, a8, a10, a12, a14, a16, a18, a20, a22);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_surface_sag_is_zero() {
        // S1
        assert_eq!(aspheric_sag_rt10(2.5, 0.0, 0.0, &[0.0; 10], PolyMode::Even), 0.0);
    }

    #[test]
    fn sphere_sag_matches_closed_form() {
        // S2
        let sag = aspheric_sag_rt10(1.0, 10.0, 0.0, &[0.0; 10], PolyMode::Even);
        let expected = 1.0 / (10.0 * (1.0 + 0.99f64.sqrt()));
        assert!((sag - expected).abs() < 1e-12);
    }

    #[test]
    fn rt10_matches_pure_conic_formula_within_aperture() {
        // Invariant 1: k=0, zero coefficients.
        for &(r, rc) in &[(0.2, 5.0), (1.5, 8.0), (-3.0, 12.0), (7.9, 8.0)] {
            let sag = aspheric_sag_rt10(r, rc, 0.0, &[0.0; 10], PolyMode::Even);
            if r.abs() <= rc.abs() {
                let expected = r * r / (rc * (1.0 + (1.0 - r * r / (rc * rc)).sqrt()));
                assert!((sag - expected).abs() < 1e-9, "r={r} rc={rc}");
            } else {
                assert_eq!(sag, 0.0, "r={r} rc={rc} should be out of aperture");
            }
        }
    }

    #[test]
    fn degenerate_discriminant_returns_zero() {
        // Far outside the aperture for a strongly hyperbolic conic.
        assert_eq!(aspheric_sag(100.0, 1.0, -5.0, 0.0, 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn dsag_dr_matches_finite_difference() {
        let coef = [0.001, -0.0002, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let r_curv = 20.0;
        let k = -0.5;
        let h = 1e-6;
        for &r in &[0.3, 1.0, 3.5, 6.0] {
            let analytic = rt10_dsag_dr(r, r_curv, k, &coef, PolyMode::Even);
            let f_plus = aspheric_sag_rt10(r + h, r_curv, k, &coef, PolyMode::Even);
            let f_minus = aspheric_sag_rt10(r - h, r_curv, k, &coef, PolyMode::Even);
            let numeric = (f_plus - f_minus) / (2.0 * h);
            assert!((analytic - numeric).abs() < 1e-4, "r={r} analytic={analytic} numeric={numeric}");
        }
    }

    #[test]
    fn batch_matches_scalar() {
        let radii = [0.1, 0.5, 1.0, 1.5, 2.0];
        let mut out = [0.0; 5];
        batch_aspheric_sag(&radii, 0.02, -1.0, 1e-5, 0.0, 0.0, 0.0, &mut out);
        for (r, o) in radii.iter().zip(out.iter()) {
            assert_eq!(*o, aspheric_sag(*r, 0.02, -1.0, 1e-5, 0.0, 0.0, 0.0));
        }
    }
}
