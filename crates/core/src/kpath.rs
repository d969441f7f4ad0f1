//! Path segmentation for the three k-point sampling schemes, and resolution
//! of a user-chosen segment order.
//!
//! A dataset's k-points are split into *natural* segments, each running
//! between two high-symmetry points. A [`CustomPathSpec`] then picks and
//! reorders those segments (negative entries traverse a segment backwards),
//! yielding a [`ResolvedPath`] of index ranges into the dataset arrays.

use std::ops::Range;

use log::warn;
use ndarray::{ArrayView, Axis, Dimension, Slice};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DataIntegrityError};
use crate::reader::{LabeledPoint, LineModeKPoints};

/// Label used for the Brillouin-zone centre in tick labels.
pub const GAMMA: &str = "\\Gamma";

/// How the k-points of a dataset were sampled.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingScheme {
    /// Line-mode band structure with a fixed number of points per segment.
    Regular(LineModeKPoints),
    /// Hybrid-functional run; path corners are located by coordinate.
    Hybrid(Vec<LabeledPoint>),
    /// Unfolded supercell; one uniform-length segment per declared leg.
    Unfolded(Vec<(String, String)>),
}

/// Layout of a regular line-mode k-point list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegularLayout {
    /// High-symmetry points come in (start, end) pairs and every segment
    /// carries its own copy of both endpoints.
    LineMode,
    /// High-symmetry points form one chain and neighbouring segments share
    /// their common endpoint.
    Contiguous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NaturalSegment {
    pub range: Range<usize>,
    pub start_label: String,
    pub end_label: String,
}

/// One segment of a resolved path; a view description, not a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    /// Zero-based id of the natural segment this was taken from.
    pub segment_id: usize,
    pub range: Range<usize>,
    /// Label at the first point in traversal order.
    pub start_label: String,
    /// Label at the last point in traversal order.
    pub end_label: String,
    pub reversed: bool,
}

impl PathSegment {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Parent-array indices in traversal order.
    pub fn kpoint_indices(&self) -> Vec<usize> {
        if self.reversed {
            self.range.clone().rev().collect()
        } else {
            self.range.clone().collect()
        }
    }

    pub fn first_index(&self) -> usize {
        if self.reversed {
            self.range.end.saturating_sub(1)
        } else {
            self.range.start
        }
    }

    pub fn last_index(&self) -> usize {
        if self.reversed {
            self.range.start
        } else {
            self.range.end.saturating_sub(1)
        }
    }

    /// Borrow this segment out of `array` along `axis`, in traversal order.
    pub fn view<'a, A, D: Dimension>(
        &self,
        array: ArrayView<'a, A, D>,
        axis: Axis,
    ) -> ArrayView<'a, A, D> {
        let mut view = array;
        view.slice_axis_inplace(axis, Slice::from(self.range.clone()));
        if self.reversed {
            view.invert_axis(axis);
        }
        view
    }
}

/// Ordered, signed, 1-based segment selection. `-3` means "segment 3,
/// traversed backwards".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomPathSpec(Vec<i32>);

impl CustomPathSpec {
    pub fn new(indices: Vec<i32>) -> Self {
        Self(indices)
    }

    pub fn indices(&self) -> &[i32] {
        &self.0
    }

    /// Map every entry to `(segment_id, reversed)`.
    pub fn resolve(&self, segment_count: usize) -> Result<Vec<(usize, bool)>, ConfigError> {
        self.0
            .iter()
            .map(|&index| {
                if index == 0 {
                    return Err(ConfigError::ZeroSegmentIndex);
                }
                let id = index.unsigned_abs() as usize - 1;
                if id >= segment_count {
                    return Err(ConfigError::SegmentIndexOutOfRange {
                        index,
                        segments: segment_count,
                    });
                }
                Ok((id, index < 0))
            })
            .collect()
    }
}

/// Tick mark at a segment boundary (or path end).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    pub label: String,
    /// Cumulative path distance of the tick.
    pub distance: f64,
    /// Parent-array index of the k-point on the left of the boundary.
    pub kpoint_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    segments: Vec<PathSegment>,
}

impl ResolvedPath {
    /// The natural segments in their natural order.
    pub fn natural(natural: &[NaturalSegment]) -> Self {
        let segments = natural
            .iter()
            .enumerate()
            .map(|(id, seg)| PathSegment {
                segment_id: id,
                range: seg.range.clone(),
                start_label: seg.start_label.clone(),
                end_label: seg.end_label.clone(),
                reversed: false,
            })
            .collect();
        Self { segments }
    }

    pub fn custom(natural: &[NaturalSegment], spec: &CustomPathSpec) -> Result<Self, ConfigError> {
        let segments = spec
            .resolve(natural.len())?
            .into_iter()
            .map(|(id, reversed)| {
                let seg = &natural[id];
                let (start_label, end_label) = if reversed {
                    (seg.end_label.clone(), seg.start_label.clone())
                } else {
                    (seg.start_label.clone(), seg.end_label.clone())
                };
                PathSegment {
                    segment_id: id,
                    range: seg.range.clone(),
                    start_label,
                    end_label,
                    reversed,
                }
            })
            .collect();
        Ok(Self { segments })
    }

    pub fn resolve(
        natural: &[NaturalSegment],
        spec: Option<&CustomPathSpec>,
    ) -> Result<Self, ConfigError> {
        match spec {
            Some(spec) => Self::custom(natural, spec),
            None => Ok(Self::natural(natural)),
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn flips(&self) -> Vec<bool> {
        self.segments.iter().map(|s| s.reversed).collect()
    }

    pub fn segment_ids(&self) -> Vec<usize> {
        self.segments.iter().map(|s| s.segment_id).collect()
    }

    /// Tick marks for the path, given per-segment distances from
    /// [`crate::distance::DistanceCalculator`].
    pub fn ticks(&self, distances: &[Vec<f64>]) -> Vec<Tick> {
        let (Some(first), Some(last)) = (self.segments.first(), self.segments.last()) else {
            return Vec::new();
        };
        let segment_start = |idx: usize| distances.get(idx).and_then(|d| d.first()).copied();
        let segment_end = |idx: usize| distances.get(idx).and_then(|d| d.last()).copied();

        let mut ticks = Vec::with_capacity(self.segments.len() + 1);
        ticks.push(Tick {
            label: display_label(&first.start_label),
            distance: segment_start(0).unwrap_or(0.0),
            kpoint_index: first.first_index(),
        });
        for (idx, pair) in self.segments.windows(2).enumerate() {
            ticks.push(Tick {
                label: merge_labels(
                    &display_label(&pair[0].end_label),
                    &display_label(&pair[1].start_label),
                ),
                distance: segment_end(idx).unwrap_or(0.0),
                kpoint_index: pair[0].last_index(),
            });
        }
        ticks.push(Tick {
            label: display_label(&last.end_label),
            distance: segment_end(self.segments.len() - 1).unwrap_or(0.0),
            kpoint_index: last.last_index(),
        });
        ticks
    }
}

/// Tick label for a raw high-symmetry label; `G` becomes Γ.
pub fn display_label(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "G" {
        GAMMA.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Label for a boundary between two segments.
pub fn merge_labels(left: &str, right: &str) -> String {
    if left == right {
        left.to_string()
    } else {
        format!("{left}|{right}")
    }
}

/// Natural segmentation of `kpoints` under `scheme`.
pub fn natural_segments(
    scheme: &SamplingScheme,
    kpoints: &[[f64; 3]],
) -> Result<Vec<NaturalSegment>, DataIntegrityError> {
    match scheme {
        SamplingScheme::Regular(line_mode) => regular_segments(line_mode, kpoints.len()),
        SamplingScheme::Hybrid(symmetry_points) => hybrid_segments(symmetry_points, kpoints),
        SamplingScheme::Unfolded(legs) => unfolded_segments(legs, kpoints.len()),
    }
}

pub fn detect_regular_layout(
    line_mode: &LineModeKPoints,
    num_kpoints: usize,
) -> Result<RegularLayout, DataIntegrityError> {
    let nodes = line_mode.labels.len();
    let n = line_mode.points_per_segment;
    if nodes < 2 || n == 0 {
        return Err(DataIntegrityError::KPointLayout(format!(
            "line-mode path needs at least 2 labelled points and a positive point count (got {nodes} labels, n={n})"
        )));
    }
    if nodes % 2 == 0 && num_kpoints == nodes / 2 * n {
        Ok(RegularLayout::LineMode)
    } else if num_kpoints == (nodes - 1) * n + 1 {
        Ok(RegularLayout::Contiguous)
    } else {
        Err(DataIntegrityError::KPointLayout(format!(
            "{num_kpoints} k-points do not match {nodes} high-symmetry points with n={n}"
        )))
    }
}

fn regular_segments(
    line_mode: &LineModeKPoints,
    num_kpoints: usize,
) -> Result<Vec<NaturalSegment>, DataIntegrityError> {
    let n = line_mode.points_per_segment;
    let labels = &line_mode.labels;
    let segments = match detect_regular_layout(line_mode, num_kpoints)? {
        RegularLayout::LineMode => (0..labels.len() / 2)
            .map(|i| NaturalSegment {
                range: i * n..(i + 1) * n,
                start_label: labels[2 * i].clone(),
                end_label: labels[2 * i + 1].clone(),
            })
            .collect(),
        RegularLayout::Contiguous => (0..labels.len() - 1)
            .map(|i| NaturalSegment {
                range: i * n..(i + 1) * n + 1,
                start_label: labels[i].clone(),
                end_label: labels[i + 1].clone(),
            })
            .collect(),
    };
    Ok(segments)
}

fn hybrid_segments(
    symmetry_points: &[LabeledPoint],
    kpoints: &[[f64; 3]],
) -> Result<Vec<NaturalSegment>, DataIntegrityError> {
    let label_of = |k: &[f64; 3]| {
        symmetry_points
            .iter()
            .find(|p| same_point(&p.coords, k))
            .map(|p| p.label.clone())
    };
    let corners: Vec<(usize, String)> = kpoints
        .iter()
        .enumerate()
        .filter_map(|(idx, k)| label_of(k).map(|label| (idx, label)))
        .collect();
    if corners.len() < 2 {
        return Err(DataIntegrityError::KPointLayout(format!(
            "only {} k-points match the symmetry path; at least 2 are required",
            corners.len()
        )));
    }
    if corners.len() % 2 == 1 {
        let (idx, label) = &corners[corners.len() - 1];
        warn!(
            "odd number of symmetry-path corners ({}); k-points from index {idx} ({label}) are not on any segment",
            corners.len()
        );
    }
    Ok(corners
        .chunks_exact(2)
        .map(|pair| NaturalSegment {
            range: pair[0].0..pair[1].0 + 1,
            start_label: pair[0].1.clone(),
            end_label: pair[1].1.clone(),
        })
        .collect())
}

fn unfolded_segments(
    legs: &[(String, String)],
    num_kpoints: usize,
) -> Result<Vec<NaturalSegment>, DataIntegrityError> {
    if legs.is_empty() || num_kpoints % legs.len() != 0 {
        return Err(DataIntegrityError::KPointLayout(format!(
            "{num_kpoints} unfolded k-points cannot be split evenly over {} legs",
            legs.len()
        )));
    }
    let n = num_kpoints / legs.len();
    Ok(legs
        .iter()
        .enumerate()
        .map(|(i, (start, end))| NaturalSegment {
            range: i * n..(i + 1) * n,
            start_label: start.clone(),
            end_label: end.clone(),
        })
        .collect())
}

/// Coordinates agree after rounding to five decimals.
pub fn same_point(a: &[f64; 3], b: &[f64; 3]) -> bool {
    let round = |x: f64| (x * 1e5).round();
    a.iter().zip(b).all(|(x, y)| round(*x) == round(*y))
}

/// Densify high-symmetry corners into the path handed to the unfolder:
/// `points_per_leg` points per leg starting at each leg's first corner, then
/// the closing corner.
pub fn densify_legs(corners: &[[f64; 3]], points_per_leg: usize) -> Vec<[f64; 3]> {
    if corners.len() <= 1 {
        return corners.to_vec();
    }
    let n = points_per_leg.max(1);
    let mut path = Vec::with_capacity((corners.len() - 1) * n + 1);
    for window in corners.windows(2) {
        let (start, end) = (window[0], window[1]);
        for step in 0..n {
            let t = step as f64 / n as f64;
            path.push([
                (1.0 - t) * start[0] + t * end[0],
                (1.0 - t) * start[1] + t * end[1],
                (1.0 - t) * start[2] + t * end[2],
            ]);
        }
    }
    if let Some(&last) = corners.last() {
        path.push(last);
    }
    path
}

/// Column order that repeats every interior corner so each leg carries both
/// of its endpoints (`points_per_leg + 1` points per leg).
pub fn leg_columns(legs: usize, points_per_leg: usize) -> Vec<usize> {
    let n = points_per_leg;
    (0..legs).flat_map(|i| i * n..=(i + 1) * n).collect()
}
