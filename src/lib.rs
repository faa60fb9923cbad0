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

//! Numerical core for aspheric ray-surface intersection and PSF synthesis.
//!
//! This crate covers two largely independent pieces of an optical design
//! pipeline:
//!
//! - **Ray tracing** ([`aspheric`], [`solver`], [`vector`]): closed-form sag
//!   for rotationally symmetric aspheric surfaces and a seeded-Newton
//!   ray/surface intersection built on top of it.
//! - **PSF synthesis** ([`psf`], backed by [`fft`] and [`cache`]): gridding
//!   wavefront samples into a complex pupil, a from-scratch radix-2 2D FFT,
//!   and the Strehl ratio / encircled energy metrics read off the result.
//!
//! [`ffi`] exposes both as a flat `extern "C"` surface for host bindings;
//! everything else here is plain, allocation-free (aside from the PSF
//! pipeline's grid buffers) safe Rust.
//!
//! Usage
//! -----
//! ```
//! use wavefront_core::aspheric::{AsphericProfile, PolyMode};
//! use wavefront_core::solver::{intersect_aspheric, Ray};
//!
//! let profile = AsphericProfile::Rt10 {
//!     r_curv: 10.0,
//!     k: 0.0,
//!     coef: [0.0; 10],
//!     mode: PolyMode::Even,
//!     semidia: 3.0,
//! };
//! let ray = Ray::new((0.0, 0.0, -5.0), (0.0, 0.0, 1.0));
//! let t = intersect_aspheric(&ray, &profile, 20, 1e-9).expect("ray should hit");
//! assert!((t - 5.0).abs() < 1e-6);
//! ```

pub mod aspheric;
pub mod cache;
pub mod ffi;
pub mod fft;
pub mod psf;
pub mod solver;
pub mod vector;

pub use cache::cleanup;
