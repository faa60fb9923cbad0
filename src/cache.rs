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

//! Process-wide lookup tables and scratch space shared by the FFT engine and
//! the PSF pipeline.
//!
//! These are the only pieces of shared mutable state in the crate (see the
//! crate-level docs). They are lazily built on first use, grown in powers of
//! two as larger sizes are requested, and released by [`cleanup`]. Growth
//! uses `try_reserve` so that an allocation failure leaves the previous,
//! smaller buffer in place rather than aborting the process; callers of the
//! FFT engine observe this as "the transform silently did nothing" (see
//! [`crate::fft::fft_2d`]) and are expected to detect it via a round-trip
//! check in sensitive contexts, exactly as the distilled spec requires.

use std::f64::consts::PI;
use std::sync::Mutex;

use num_complex::Complex64;

struct TwiddleTable {
    size: usize,
    table: Vec<Complex64>,
}

impl TwiddleTable {
    fn rebuild(&mut self, n: usize) -> bool {
        if self.table.try_reserve_exact(n.saturating_sub(self.table.len())).is_err() {
            return false;
        }
        self.table.clear();
        self.table.extend((0..n).map(|i| {
            let angle = -2.0 * PI * (i as f64) / (n as f64);
            Complex64::new(angle.cos(), angle.sin())
        }));
        self.size = n;
        true
    }
}

struct TrigTable {
    size: usize,
    sin: Vec<f64>,
    cos: Vec<f64>,
}

impl TrigTable {
    fn rebuild(&mut self, size: usize) -> bool {
        if self.sin.try_reserve_exact(size.saturating_sub(self.sin.len())).is_err() {
            return false;
        }
        if self.cos.try_reserve_exact(size.saturating_sub(self.cos.len())).is_err() {
            return false;
        }
        self.sin.clear();
        self.cos.clear();
        self.sin.extend((0..size).map(|i| (2.0 * PI * i as f64 / size as f64).sin()));
        self.cos.extend((0..size).map(|i| (2.0 * PI * i as f64 / size as f64).cos()));
        self.size = size;
        true
    }

    /// Fast sine lookup. Non-finite input normalizes to `0.0` (see
    /// [`fast_sin`]).
    fn sin_of(&self, x: f64) -> f64 {
        sample_table(&self.sin, self.size, x)
    }

    /// Fast cosine lookup. Non-finite input normalizes to `1.0` (see
    /// [`fast_cos`]).
    fn cos_of(&self, x: f64) -> f64 {
        sample_table(&self.cos, self.size, x)
    }
}

fn sample_table(table: &[f64], size: usize, x: f64) -> f64 {
    let mut reduced = x % (2.0 * PI);
    if reduced < 0.0 {
        reduced += 2.0 * PI;
    }
    let mut index = ((reduced / (2.0 * PI)) * size as f64) as usize;
    if index >= size {
        index = size - 1;
    }
    table[index]
}

static TWIDDLE: Mutex<Option<TwiddleTable>> = Mutex::new(None);
static TRIG: Mutex<Option<TrigTable>> = Mutex::new(None);
static SCRATCH: Mutex<Option<Vec<Complex64>>> = Mutex::new(None);

/// Ensures the twiddle table covers size `n`, growing it (in place, keeping
/// the larger of the existing and requested size) if necessary. Returns the
/// table's current size; this can be smaller than `n` if growth failed.
fn ensure_twiddle(n: usize) -> usize {
    let mut guard = TWIDDLE.lock().unwrap();
    match guard.as_mut() {
        Some(t) if t.size >= n => t.size,
        Some(t) => {
            t.rebuild(n);
            t.size
        }
        None => {
            let mut t = TwiddleTable { size: 0, table: Vec::new() };
            t.rebuild(n);
            let size = t.size;
            *guard = Some(t);
            size
        }
    }
}

/// Runs `f` with a twiddle table of at least size `n`. If the table could not
/// be grown to `n` (allocation failure), `f` still runs against whatever
/// table is resident; callers that address indices beyond the resident size
/// must treat that as "the table did not grow" per the crate's resource
/// model.
pub(crate) fn with_twiddle_table<R>(n: usize, f: impl FnOnce(&[Complex64]) -> R) -> R {
    ensure_twiddle(n);
    let guard = TWIDDLE.lock().unwrap();
    f(&guard.as_ref().unwrap().table)
}

fn ensure_trig(size: usize) {
    let mut guard = TRIG.lock().unwrap();
    match guard.as_mut() {
        Some(t) if t.size >= size => {}
        Some(t) => {
            t.rebuild(size);
        }
        None => {
            let mut t = TrigTable { size: 0, sin: Vec::new(), cos: Vec::new() };
            t.rebuild(size);
            *guard = Some(t);
        }
    }
}

/// Fast sine via the oversampled trig table (see Section 4.C of the spec).
/// Never used inside FFT butterflies, only by the complex-pupil step.
pub(crate) fn fast_sin(max_size: usize, x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    ensure_trig(4 * max_size.max(1));
    let guard = TRIG.lock().unwrap();
    guard.as_ref().unwrap().sin_of(x)
}

/// Fast cosine via the oversampled trig table. See [`fast_sin`].
pub(crate) fn fast_cos(max_size: usize, x: f64) -> f64 {
    if !x.is_finite() {
        return 1.0;
    }
    ensure_trig(4 * max_size.max(1));
    let guard = TRIG.lock().unwrap();
    guard.as_ref().unwrap().cos_of(x)
}

/// Ensures the FFT scratch buffer holds at least `n_elems` complex entries.
/// Returns `false` if the buffer could not be grown (allocation failure);
/// the previous, smaller buffer is left untouched in that case.
fn ensure_scratch(n_elems: usize) -> bool {
    let mut guard = SCRATCH.lock().unwrap();
    let buf = guard.get_or_insert_with(Vec::new);
    if buf.len() >= n_elems {
        return true;
    }
    let additional = n_elems - buf.len();
    if buf.try_reserve_exact(additional).is_err() {
        return false;
    }
    buf.resize(n_elems, Complex64::new(0.0, 0.0));
    true
}

/// Runs `f` with a scratch slice of exactly `n_elems` complex entries, or
/// returns `None` if the scratch buffer could not be grown to that size.
pub(crate) fn with_scratch<R>(
    n_elems: usize,
    f: impl FnOnce(&mut [Complex64]) -> R,
) -> Option<R> {
    if !ensure_scratch(n_elems) {
        return None;
    }
    let mut guard = SCRATCH.lock().unwrap();
    let buf = guard.as_mut().unwrap();
    Some(f(&mut buf[..n_elems]))
}

/// Releases all process-wide caches (twiddle table, trig table, FFT scratch).
///
/// Per the crate's resource model this must not be called while another call
/// into the crate is in flight on another thread; doing so is undefined
/// behavior as far as the contract is concerned (the `Mutex`es prevent a data
/// race, but a concurrent FFT call can still observe a table disappear out
/// from under it and rebuild it from scratch, which is wasteful but not
/// unsound).
pub fn cleanup() {
    *TWIDDLE.lock().unwrap() = None;
    *TRIG.lock().unwrap() = None;
    *SCRATCH.lock().unwrap() = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twiddle_table_matches_invariant() {
        cleanup();
        let m = 16;
        with_twiddle_table(m, |table| {
            for i in 0..m {
                let angle = -2.0 * PI * (i as f64) / (m as f64);
                assert!((table[i].re - angle.cos()).abs() < 1e-12);
                assert!((table[i].im - angle.sin()).abs() < 1e-12);
            }
        });
        cleanup();
    }

    #[test]
    fn twiddle_table_grows_monotonically() {
        cleanup();
        with_twiddle_table(8, |t| assert!(t.len() >= 8));
        with_twiddle_table(32, |t| assert!(t.len() >= 32));
        // Shrinking request keeps the larger table resident.
        with_twiddle_table(4, |t| assert!(t.len() >= 32));
        cleanup();
    }

    #[test]
    fn fast_trig_normalizes_non_finite_input() {
        assert_eq!(fast_sin(64, f64::NAN), 0.0);
        assert_eq!(fast_cos(64, f64::INFINITY), 1.0);
    }

    #[test]
    fn fast_trig_matches_real_trig_closely() {
        cleanup();
        for i in 0..100 {
            let x = i as f64 * 0.0617;
            assert!((fast_sin(1024, x) - x.sin()).abs() < 1e-2);
            assert!((fast_cos(1024, x) - x.cos()).abs() < 1e-2);
        }
        cleanup();
    }

    #[test]
    fn scratch_buffer_reused_and_grown() {
        cleanup();
        with_scratch(4, |s| s[0] = Complex64::new(1.0, 0.0));
        with_scratch(16, |s| {
            assert_eq!(s.len(), 16);
        });
        cleanup();
    }
}
