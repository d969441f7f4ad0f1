//! Real-space lattice and the reciprocal metric used for k-path distances.

use serde::{Deserialize, Serialize};

use crate::error::DataIntegrityError;

/// Real-space lattice, one primitive vector per row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    pub fn new(matrix: [[f64; 3]; 3]) -> Self {
        Self { matrix }
    }

    pub fn cubic(a: f64) -> Self {
        Self::orthorhombic(a, a, a)
    }

    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Self {
        Self {
            matrix: [[a, 0.0, 0.0], [0.0, b, 0.0], [0.0, 0.0, c]],
        }
    }

    pub fn hexagonal(a: f64, c: f64) -> Self {
        let h = (3.0f64).sqrt() * 0.5 * a;
        Self {
            matrix: [[a, 0.0, 0.0], [-0.5 * a, h, 0.0], [0.0, 0.0, c]],
        }
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.matrix;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Matrix inverse of the lattice rows.
    pub fn inverse(&self) -> Result<[[f64; 3]; 3], DataIntegrityError> {
        let det = self.determinant();
        if det.abs() <= f64::EPSILON {
            return Err(DataIntegrityError::SingularLattice);
        }
        let m = &self.matrix;
        let inv_det = 1.0 / det;
        let mut inv = [[0.0; 3]; 3];
        for (i, row) in inv.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                // cofactor of m[j][i]
                let (r0, r1) = others(j);
                let (c0, c1) = others(i);
                let minor = m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0];
                let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
                *value = sign * minor * inv_det;
            }
        }
        Ok(inv)
    }

    /// Inverse lattice scaled so its shortest row has unit length.
    ///
    /// Distances measured with this metric stay comparable between cells of
    /// different absolute size but identical shape.
    pub fn normalized_inverse(&self) -> Result<[[f64; 3]; 3], DataIntegrityError> {
        let mut inv = self.inverse()?;
        let min_norm = inv
            .iter()
            .map(|row| norm(*row))
            .fold(f64::INFINITY, f64::min);
        if !min_norm.is_finite() || min_norm <= 0.0 {
            return Err(DataIntegrityError::SingularLattice);
        }
        for row in inv.iter_mut() {
            for value in row.iter_mut() {
                *value /= min_norm;
            }
        }
        Ok(inv)
    }
}

/// Apply `metric` to a fractional k-point: `k · metricᵀ`.
pub fn to_metric_space(metric: &[[f64; 3]; 3], k: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (j, value) in out.iter_mut().enumerate() {
        *value = metric[j][0] * k[0] + metric[j][1] * k[1] + metric[j][2] * k[2];
    }
    out
}

pub fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn others(idx: usize) -> (usize, usize) {
    match idx {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    }
}
