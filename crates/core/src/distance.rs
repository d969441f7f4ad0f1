//! Cumulative path distance along a resolved k-path.

use crate::error::DataIntegrityError;
use crate::kpath::ResolvedPath;
use crate::lattice::{norm, to_metric_space, Lattice};

/// Maps fractional k-points into a metric space built from the inverse
/// lattice scaled by its shortest row, then measures path length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceCalculator {
    metric: [[f64; 3]; 3],
}

impl DistanceCalculator {
    pub fn new(lattice: &Lattice) -> Result<Self, DataIntegrityError> {
        Ok(Self {
            metric: lattice.normalized_inverse()?,
        })
    }

    pub fn metric(&self) -> &[[f64; 3]; 3] {
        &self.metric
    }

    /// Cumulative distance along `kpoints`, starting at `offset`.
    pub fn segment_distances(&self, kpoints: &[[f64; 3]], offset: f64) -> Vec<f64> {
        let mut distances = Vec::with_capacity(kpoints.len());
        let mut total = offset;
        let mut previous: Option<[f64; 3]> = None;
        for &k in kpoints {
            let current = to_metric_space(&self.metric, k);
            if let Some(prev) = previous {
                total += norm([
                    current[0] - prev[0],
                    current[1] - prev[1],
                    current[2] - prev[2],
                ]);
            }
            distances.push(total);
            previous = Some(current);
        }
        distances
    }

    /// One distance array per segment of `path`, chained so each segment
    /// starts where the previous one ended.
    pub fn path_distances(
        &self,
        path: &ResolvedPath,
        kpoints: &[[f64; 3]],
    ) -> Result<Vec<Vec<f64>>, DataIntegrityError> {
        let mut offset = 0.0;
        let mut out = Vec::with_capacity(path.len());
        for segment in path.segments() {
            if segment.range.end > kpoints.len() {
                return Err(DataIntegrityError::ShapeMismatch(format!(
                    "segment {} spans k-points {:?} but the dataset has {}",
                    segment.segment_id + 1,
                    segment.range,
                    kpoints.len()
                )));
            }
            let oriented: Vec<[f64; 3]> = segment
                .kpoint_indices()
                .into_iter()
                .map(|idx| kpoints[idx])
                .collect();
            let distances = self.segment_distances(&oriented, offset);
            if let Some(&last) = distances.last() {
                offset = last;
            }
            out.push(distances);
        }
        Ok(out)
    }
}

/// Concatenate per-segment arrays in path order.
pub fn concatenate(segments: &[Vec<f64>]) -> Vec<f64> {
    segments.iter().flatten().copied().collect()
}

/// Total path length covered by `segments`.
pub fn total_length(segments: &[Vec<f64>]) -> f64 {
    segments
        .iter()
        .filter_map(|d| Some(d.last()? - d.first()?))
        .sum()
}
