//! Per-segment resampling onto a uniform distance grid.
//!
//! Each segment is interpolated on its own; the caller concatenates the
//! results in path order. Eigenvalues use a not-a-knot cubic spline, weights
//! use piecewise-linear interpolation followed by clamping at zero.

use log::debug;
use ndarray::{Array, ArrayView, ArrayView1, ArrayViewMut1, Axis, Dimension};
use serde::{Deserialize, Serialize};

use crate::error::DataIntegrityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationKind {
    Cubic,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interpolator {
    new_n: usize,
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_POINTS)
    }
}

impl Interpolator {
    pub const DEFAULT_POINTS: usize = 200;

    /// `new_n` is the number of resampled points per segment (at least 2).
    pub fn new(new_n: usize) -> Self {
        Self {
            new_n: new_n.max(2),
        }
    }

    pub fn new_n(&self) -> usize {
        self.new_n
    }

    /// Uniform grid spanning `distances`.
    pub fn grid(&self, distances: &[f64]) -> Vec<f64> {
        let (Some(&lo), Some(&hi)) = (distances.first(), distances.last()) else {
            return Vec::new();
        };
        let step = (hi - lo) / (self.new_n - 1) as f64;
        (0..self.new_n)
            .map(|i| {
                if i + 1 == self.new_n {
                    hi
                } else {
                    lo + step * i as f64
                }
            })
            .collect()
    }

    /// Resample `values` along `axis`, which must match `distances`.
    /// Returns the new grid and the resampled array.
    pub fn resample<D: Dimension>(
        &self,
        segment: usize,
        distances: &[f64],
        values: ArrayView<'_, f64, D>,
        axis: Axis,
        kind: InterpolationKind,
    ) -> Result<(Vec<f64>, Array<f64, D>), DataIntegrityError> {
        check_axis(segment, distances)?;
        let len = values.len_of(axis);
        if len != distances.len() {
            return Err(DataIntegrityError::ShapeMismatch(format!(
                "segment {}: {} distances for {} values along axis {}",
                segment + 1,
                distances.len(),
                len,
                axis.index()
            )));
        }

        let grid = self.grid(distances);
        let mut dim = values.raw_dim();
        dim[axis.index()] = grid.len();
        let mut out = Array::<f64, D>::zeros(dim);
        let intervals: Vec<usize> = grid.iter().map(|&t| locate(distances, t)).collect();

        for (lane, out_lane) in values.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
            match kind {
                InterpolationKind::Linear => {
                    linear_lane(distances, lane, &grid, &intervals, out_lane)
                }
                InterpolationKind::Cubic => cubic_lane(distances, lane, &grid, &intervals, out_lane),
            }
        }
        Ok((grid, out))
    }

    /// Cubic resampling of eigenvalues shaped `[.., kpoints]` along `axis`.
    pub fn eigenvalues<D: Dimension>(
        &self,
        segment: usize,
        distances: &[f64],
        values: ArrayView<'_, f64, D>,
        axis: Axis,
    ) -> Result<(Vec<f64>, Array<f64, D>), DataIntegrityError> {
        self.resample(segment, distances, values, axis, InterpolationKind::Cubic)
    }

    /// Linear resampling of non-negative weights, clamped at zero.
    pub fn weights<D: Dimension>(
        &self,
        segment: usize,
        distances: &[f64],
        values: ArrayView<'_, f64, D>,
        axis: Axis,
    ) -> Result<(Vec<f64>, Array<f64, D>), DataIntegrityError> {
        let (grid, mut out) =
            self.resample(segment, distances, values, axis, InterpolationKind::Linear)?;
        let clamped = clamp_non_negative(&mut out);
        if clamped > 0 {
            debug!(
                "segment {}: clamped {} negative interpolated weights to zero",
                segment + 1,
                clamped
            );
        }
        Ok((grid, out))
    }
}

/// Zero out negative entries, returning how many were changed.
pub fn clamp_non_negative<D: Dimension>(values: &mut Array<f64, D>) -> usize {
    let mut clamped = 0;
    values.map_inplace(|v| {
        if *v < 0.0 {
            *v = 0.0;
            clamped += 1;
        }
    });
    clamped
}

fn check_axis(segment: usize, x: &[f64]) -> Result<(), DataIntegrityError> {
    if x.len() < 2 {
        return Err(DataIntegrityError::SegmentTooShort {
            segment: segment + 1,
            len: x.len(),
        });
    }
    if x.windows(2).any(|w| !(w[1] > w[0])) {
        return Err(DataIntegrityError::NonMonotonicDistance {
            segment: segment + 1,
        });
    }
    Ok(())
}

/// Interval `i` with `x[i] <= t <= x[i + 1]`, clamped to the valid range.
fn locate(x: &[f64], t: f64) -> usize {
    x.partition_point(|&v| v <= t)
        .saturating_sub(1)
        .min(x.len() - 2)
}

fn linear_lane(
    x: &[f64],
    y: ArrayView1<'_, f64>,
    grid: &[f64],
    intervals: &[usize],
    mut out: ArrayViewMut1<'_, f64>,
) {
    for ((slot, &t), &i) in out.iter_mut().zip(grid).zip(intervals) {
        let h = x[i + 1] - x[i];
        let s = (t - x[i]) / h;
        *slot = (1.0 - s) * y[i] + s * y[i + 1];
    }
}

fn cubic_lane(
    x: &[f64],
    y: ArrayView1<'_, f64>,
    grid: &[f64],
    intervals: &[usize],
    mut out: ArrayViewMut1<'_, f64>,
) {
    match x.len() {
        2 => return linear_lane(x, y, grid, intervals, out),
        3 => {
            for (slot, &t) in out.iter_mut().zip(grid) {
                *slot = parabola(x, y, t);
            }
            return;
        }
        _ => {}
    }

    let m = not_a_knot_moments(x, y);
    for ((slot, &t), &i) in out.iter_mut().zip(grid).zip(intervals) {
        let h = x[i + 1] - x[i];
        let a = x[i + 1] - t;
        let b = t - x[i];
        *slot = m[i] * a.powi(3) / (6.0 * h)
            + m[i + 1] * b.powi(3) / (6.0 * h)
            + (y[i] / h - m[i] * h / 6.0) * a
            + (y[i + 1] / h - m[i + 1] * h / 6.0) * b;
    }
}

fn parabola(x: &[f64], y: ArrayView1<'_, f64>, t: f64) -> f64 {
    let l0 = (t - x[1]) * (t - x[2]) / ((x[0] - x[1]) * (x[0] - x[2]));
    let l1 = (t - x[0]) * (t - x[2]) / ((x[1] - x[0]) * (x[1] - x[2]));
    let l2 = (t - x[0]) * (t - x[1]) / ((x[2] - x[0]) * (x[2] - x[1]));
    l0 * y[0] + l1 * y[1] + l2 * y[2]
}

/// Second derivatives at the knots for a not-a-knot spline (`x.len() >= 4`).
///
/// The end conditions (continuous third derivative at the second and
/// penultimate knots) are eliminated into the first and last rows so the
/// system for the interior moments stays tridiagonal.
fn not_a_knot_moments(x: &[f64], y: ArrayView1<'_, f64>) -> Vec<f64> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let slope: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();

    // Unknowns M_1 ..= M_{n-2}.
    let size = n - 2;
    let mut sub = vec![0.0; size];
    let mut diag = vec![0.0; size];
    let mut sup = vec![0.0; size];
    let mut rhs = vec![0.0; size];
    for row in 0..size {
        let i = row + 1;
        sub[row] = h[i - 1];
        diag[row] = 2.0 * (h[i - 1] + h[i]);
        sup[row] = h[i];
        rhs[row] = 6.0 * (slope[i] - slope[i - 1]);
    }
    let (h0, h1) = (h[0], h[1]);
    diag[0] = (h0 + h1) * (h0 + 2.0 * h1) / h1;
    sup[0] = (h1 * h1 - h0 * h0) / h1;
    let (a, b) = (h[n - 3], h[n - 2]);
    sub[size - 1] = (a * a - b * b) / a;
    diag[size - 1] = (a + b) * (2.0 * a + b) / a;

    let interior = thomas(&sub, &diag, &sup, &rhs);

    let mut moments = Vec::with_capacity(n);
    moments.push(((h0 + h1) * interior[0] - h0 * interior[1]) / h1);
    moments.extend_from_slice(&interior);
    moments.push(((a + b) * interior[size - 1] - b * interior[size - 2]) / a);
    moments
}

/// Tridiagonal solve; `sub[0]` and `sup[last]` are ignored.
fn thomas(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];
    c[0] = sup[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..n {
        let denom = diag[i] - sub[i] * c[i - 1];
        c[i] = if i + 1 < n { sup[i] / denom } else { 0.0 };
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / denom;
    }
    let mut out = vec![0.0; n];
    out[n - 1] = d[n - 1];
    for i in (0..n - 1).rev() {
        out[i] = d[i] - c[i] * out[i + 1];
    }
    out
}
