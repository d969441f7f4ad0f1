//! Plot assembly: slice a [`Dataset`] along its resolved path, optionally
//! resample every segment, and hand the arrays to a renderer.

use ndarray::{Array, Array2, Array3, ArrayView, ArrayView2, Axis, Dimension};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{DataIntegrityError, Result};
use crate::interpolate::Interpolator;
use crate::kpath::Tick;
use crate::projection::{OrbitalGroup, OrbitalTable, ProjectionAggregator};
use crate::reader::Structure;

/// What a projected plot colours its bands by. Empty lists mean "all".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlotSelection {
    #[default]
    Plain,
    Orbitals {
        #[serde(default)]
        orbitals: Vec<usize>,
    },
    Spd {
        #[serde(default)]
        groups: Vec<OrbitalGroup>,
    },
    Atoms {
        #[serde(default)]
        atoms: Vec<usize>,
    },
    AtomOrbitals {
        pairs: Vec<(usize, usize)>,
    },
    AtomSpd {
        #[serde(default)]
        atoms: Vec<usize>,
        #[serde(default)]
        groups: Vec<OrbitalGroup>,
    },
    Elements {
        #[serde(default)]
        elements: Vec<String>,
    },
    ElementOrbitals {
        pairs: Vec<(String, usize)>,
    },
    ElementSpd {
        #[serde(default)]
        elements: Vec<String>,
        #[serde(default)]
        groups: Vec<OrbitalGroup>,
    },
}

impl PlotSelection {
    pub fn is_projected(&self) -> bool {
        !matches!(self, PlotSelection::Plain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotOptions {
    /// Energy window relative to the Fermi level.
    pub erange: [f64; 2],
    /// `None` keeps the raw k-point sampling.
    pub interpolation: Option<Interpolator>,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            erange: [-6.0, 6.0],
            interpolation: Some(Interpolator::default()),
        }
    }
}

/// One path segment, ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentData {
    pub segment_id: usize,
    pub reversed: bool,
    pub distances: Vec<f64>,
    /// `[bands, points]`
    pub eigenvalues: Array2<f64>,
    /// `[bands, points]`, unfolded datasets only.
    pub spectral_weights: Option<Array2<f64>>,
    /// `[bands, points]`, datasets with a spin axis only.
    pub spin_weights: Option<Array2<f64>>,
    /// `[bands, points, columns]`, projected selections only.
    pub projections: Option<Array3<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BandPlot {
    /// Indices (into the dataset) of the bands inside the energy window.
    pub bands: Vec<usize>,
    pub segments: Vec<SegmentData>,
    pub ticks: Vec<Tick>,
    pub x_limits: (f64, f64),
    /// One label per projection column, in request order.
    pub legend: Vec<String>,
    pub interpolated: bool,
}

impl BandPlot {
    /// Concatenated distance axis across all segments.
    pub fn distances(&self) -> Vec<f64> {
        self.segments
            .iter()
            .flat_map(|s| s.distances.iter().copied())
            .collect()
    }
}

/// Bands reaching into `[min(erange) - 1, max(erange) + 1]`.
pub fn bands_in_window(eigenvalues: ArrayView2<'_, f64>, erange: [f64; 2]) -> Vec<usize> {
    let lo = erange[0].min(erange[1]) - 1.0;
    let hi = erange[0].max(erange[1]) + 1.0;
    eigenvalues
        .outer_iter()
        .enumerate()
        .filter(|(_, band)| band.iter().any(|&e| e >= lo && e <= hi))
        .map(|(idx, _)| idx)
        .collect()
}

pub fn build_plot(
    dataset: &Dataset,
    selection: &PlotSelection,
    options: &PlotOptions,
) -> Result<BandPlot> {
    let bands = bands_in_window(dataset.eigenvalues().view(), options.erange);
    let eigenvalues = dataset.eigenvalues().select(Axis(0), &bands);
    let spectral = dataset
        .spectral_weights()
        .map(|w| w.select(Axis(0), &bands));
    let spin = dataset
        .spin_projections()
        .map(|w| w.select(Axis(0), &bands));
    let (projections, legend) = if selection.is_projected() {
        let aggregator = dataset.aggregator()?;
        let (columns, legend) = projection_columns(&aggregator, dataset.structure(), selection)?;
        (Some(columns.select(Axis(0), &bands)), legend)
    } else {
        (None, Vec::new())
    };

    let mut segments = Vec::with_capacity(dataset.path().len());
    for (idx, (segment, distances)) in dataset
        .path()
        .segments()
        .iter()
        .zip(dataset.distances())
        .enumerate()
    {
        let eig = segment.view(eigenvalues.view(), Axis(1));
        let spectral_view = spectral.as_ref().map(|w| segment.view(w.view(), Axis(1)));
        let spin_view = spin.as_ref().map(|w| segment.view(w.view(), Axis(1)));
        let proj_view = projections
            .as_ref()
            .map(|p| segment.view(p.view(), Axis(1)));

        let data = match &options.interpolation {
            Some(interp) => {
                let (grid, eigenvalues) = interp.eigenvalues(idx, distances, eig, Axis(1))?;
                SegmentData {
                    segment_id: segment.segment_id,
                    reversed: segment.reversed,
                    distances: grid,
                    eigenvalues,
                    spectral_weights: resample_weights(interp, idx, distances, spectral_view)?,
                    spin_weights: resample_weights(interp, idx, distances, spin_view)?,
                    projections: resample_weights(interp, idx, distances, proj_view)?,
                }
            }
            None => SegmentData {
                segment_id: segment.segment_id,
                reversed: segment.reversed,
                distances: distances.clone(),
                eigenvalues: eig.to_owned(),
                spectral_weights: spectral_view.map(|v| v.to_owned()),
                spin_weights: spin_view.map(|v| v.to_owned()),
                projections: proj_view.map(|v| v.to_owned()),
            },
        };
        segments.push(data);
    }

    let ticks = dataset.ticks();
    let x_limits = match (ticks.first(), ticks.last()) {
        (Some(first), Some(last)) => (first.distance, last.distance),
        _ => (0.0, 0.0),
    };
    Ok(BandPlot {
        bands,
        segments,
        ticks,
        x_limits,
        legend,
        interpolated: options.interpolation.is_some(),
    })
}

/// `[bands, kpoints, columns]` for `selection` plus one legend label per column.
pub fn projection_columns(
    aggregator: &ProjectionAggregator<'_>,
    structure: &Structure,
    selection: &PlotSelection,
) -> Result<(Array3<f64>, Vec<String>)> {
    let table = aggregator.table();
    let columns = match selection {
        PlotSelection::Plain => {
            return Err(DataIntegrityError::MissingData(
                "a plain plot has no projection columns".to_string(),
            )
            .into())
        }
        PlotSelection::Orbitals { orbitals } => {
            let orbitals = or_all(orbitals, 0..table.width());
            let labels = orbitals.iter().map(|&o| orbital_label(table, o)).collect();
            (aggregator.orbitals(&orbitals)?, labels)
        }
        PlotSelection::Spd { groups } => {
            let groups = groups_or_all(groups, table);
            let labels = groups.iter().map(|g| g.to_string()).collect();
            (aggregator.spd(&groups)?, labels)
        }
        PlotSelection::Atoms { atoms } => {
            let atoms = or_all(atoms, 0..structure.num_atoms());
            let labels = atoms.iter().map(|&a| atom_label(structure, a)).collect();
            (aggregator.atoms(&atoms)?, labels)
        }
        PlotSelection::AtomOrbitals { pairs } => {
            let labels = pairs
                .iter()
                .map(|&(a, o)| format!("{} {}", atom_label(structure, a), orbital_label(table, o)))
                .collect();
            (aggregator.atom_orbitals(pairs)?, labels)
        }
        PlotSelection::AtomSpd { atoms, groups } => {
            let atoms = or_all(atoms, 0..structure.num_atoms());
            let groups = groups_or_all(groups, table);
            let pairs: Vec<(usize, OrbitalGroup)> = atoms
                .iter()
                .flat_map(|&a| groups.iter().map(move |&g| (a, g)))
                .collect();
            let labels = pairs
                .iter()
                .map(|&(a, g)| format!("{} {g}", atom_label(structure, a)))
                .collect();
            (aggregator.atom_groups(&pairs)?, labels)
        }
        PlotSelection::Elements { elements } => {
            let elements = elements_or_all(elements, structure);
            let labels = elements.clone();
            (aggregator.elements(elements.as_slice())?, labels)
        }
        PlotSelection::ElementOrbitals { pairs } => {
            let labels = pairs
                .iter()
                .map(|(e, o)| format!("{e} {}", orbital_label(table, *o)))
                .collect();
            (aggregator.element_orbitals(pairs.as_slice())?, labels)
        }
        PlotSelection::ElementSpd { elements, groups } => {
            let elements = elements_or_all(elements, structure);
            let groups = groups_or_all(groups, table);
            let pairs: Vec<(&str, OrbitalGroup)> = elements
                .iter()
                .flat_map(|e| groups.iter().map(move |&g| (e.as_str(), g)))
                .collect();
            let labels = pairs.iter().map(|(e, g)| format!("{e} {g}")).collect();
            (aggregator.element_groups(pairs.as_slice())?, labels)
        }
    };
    Ok(columns)
}

fn resample_weights<D: Dimension>(
    interp: &Interpolator,
    segment: usize,
    distances: &[f64],
    view: Option<ArrayView<'_, f64, D>>,
) -> Result<Option<Array<f64, D>>, DataIntegrityError> {
    view.map(|v| interp.weights(segment, distances, v, Axis(1)).map(|(_, w)| w))
        .transpose()
}

fn or_all(requested: &[usize], all: std::ops::Range<usize>) -> Vec<usize> {
    if requested.is_empty() {
        all.collect()
    } else {
        requested.to_vec()
    }
}

fn groups_or_all(requested: &[OrbitalGroup], table: OrbitalTable) -> Vec<OrbitalGroup> {
    if requested.is_empty() {
        table.groups().to_vec()
    } else {
        requested.to_vec()
    }
}

fn elements_or_all(requested: &[String], structure: &Structure) -> Vec<String> {
    if requested.is_empty() {
        structure.site_symbols.clone()
    } else {
        requested.to_vec()
    }
}

fn orbital_label(table: OrbitalTable, orbital: usize) -> String {
    table
        .label(orbital)
        .map(str::to_string)
        .unwrap_or_else(|| format!("orbital {orbital}"))
}

/// `Ga1`, `As2`, ... numbered from one within the whole structure.
fn atom_label(structure: &Structure, atom: usize) -> String {
    match structure.atom_symbols().get(atom) {
        Some(symbol) => format!("{symbol}{}", atom + 1),
        None => format!("atom {atom}"),
    }
}
