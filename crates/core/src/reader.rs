//! Seams to the external collaborators that parse simulation output.
//!
//! Nothing in this crate parses raw simulation formats. A [`Reader`] hands
//! over numeric arrays and structure metadata; an [`Unfolder`] turns a
//! supercell calculation into primitive-cell spectral weights.

use std::path::Path;

use ndarray::{Array3, Array4, Array5};
use serde::{Deserialize, Serialize};

use crate::error::DataIntegrityError;
use crate::lattice::Lattice;

/// Element symbols whose atoms carry an f block in the projection tensor.
pub const F_BLOCK_ELEMENTS: [&str; 22] = [
    "La", "Ac", "Ce", "Tb", "Th", "Pr", "Dy", "Pa", "Nd", "Ho", "U", "Pm", "Er", "Np", "Sm", "Tm",
    "Pu", "Eu", "Yb", "Am", "Gd", "Lu",
];

/// Eigenvalue records as produced by the simulation, before any shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEigenvalues {
    /// One array per spin channel, shaped `[kpoints, bands, 2]` holding
    /// (energy, occupation).
    pub channels: Vec<Array3<f64>>,
    /// Fractional reciprocal coordinates, one per k-point.
    pub kpoints: Vec<[f64; 3]>,
    /// Integration weight of each k-point; zero marks band-structure-only
    /// points in hybrid-functional runs.
    pub kpoint_weights: Vec<f64>,
}

impl RawEigenvalues {
    pub fn num_kpoints(&self) -> usize {
        self.kpoints.len()
    }

    pub fn num_bands(&self) -> usize {
        self.channels.first().map(|c| c.shape()[1]).unwrap_or(0)
    }
}

/// Atoms are ordered by element block, in the order of `site_symbols`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub site_symbols: Vec<String>,
    pub atom_counts: Vec<usize>,
    pub lattice: Lattice,
}

impl Structure {
    pub fn num_atoms(&self) -> usize {
        self.atom_counts.iter().sum()
    }

    /// Element symbol of every atom, in atom-index order.
    pub fn atom_symbols(&self) -> Vec<&str> {
        self.site_symbols
            .iter()
            .zip(&self.atom_counts)
            .flat_map(|(symbol, &count)| std::iter::repeat(symbol.as_str()).take(count))
            .collect()
    }

    /// Atom indices belonging to `symbol`; empty when the element is absent.
    pub fn atom_indices_of(&self, symbol: &str) -> Vec<usize> {
        self.atom_symbols()
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s == symbol)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn has_f_orbitals(&self) -> bool {
        self.site_symbols
            .iter()
            .any(|symbol| F_BLOCK_ELEMENTS.contains(&symbol.as_str()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationFlags {
    pub spin_polarized: bool,
    pub spin_orbit: bool,
    pub hybrid_functional: bool,
}

impl CalculationFlags {
    /// Number of collinear spin channels carried by the eigenvalue records.
    pub fn eigenvalue_channels(&self) -> usize {
        if self.spin_polarized && !self.spin_orbit {
            2
        } else {
            1
        }
    }

    /// Number of channels on the projection tensor's spin axis.
    pub fn projection_channels(&self) -> usize {
        if self.spin_orbit {
            4
        } else if self.spin_polarized {
            2
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoint {
    pub label: String,
    pub coords: [f64; 3],
}

/// High-symmetry points of a line-mode k-point file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineModeKPoints {
    pub labels: Vec<String>,
    pub points: Vec<[f64; 3]>,
    /// Number of k-points between two adjacent high-symmetry points.
    pub points_per_segment: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KPointLayout {
    /// Present for regular band-structure runs.
    #[serde(default)]
    pub line_mode: Option<LineModeKPoints>,
    /// Standard high-symmetry coordinates of the structure's Brillouin zone,
    /// used to locate path corners in hybrid-functional runs.
    #[serde(default)]
    pub symmetry_points: Vec<LabeledPoint>,
}

pub trait Reader: Send + Sync {
    fn read_eigenvalues(&self, folder: &Path) -> Result<RawEigenvalues, DataIntegrityError>;

    fn read_structure(&self, folder: &Path) -> Result<Structure, DataIntegrityError>;

    fn read_flags(&self, folder: &Path) -> Result<CalculationFlags, DataIntegrityError>;

    /// `None` when the reference calculation does not report a Fermi level.
    fn read_fermi_energy(&self, folder: &Path) -> Result<Option<f64>, DataIntegrityError>;

    fn read_kpoint_layout(&self, folder: &Path) -> Result<KPointLayout, DataIntegrityError>;

    /// Raw projections shaped `[bands, kpoints, channels, atoms, orbitals]`.
    fn read_projections(&self, folder: &Path) -> Result<Array5<f64>, DataIntegrityError>;

    /// Total magnetization per state shaped `[bands, kpoints, 4]`.
    fn read_spin_axis_projections(&self, folder: &Path)
        -> Result<Array3<f64>, DataIntegrityError>;
    /// Drop anything held for `folder`. Called once no pending work needs it.
    fn release(&self, _folder: &Path) {}
}

/// Input handed to an [`Unfolder`].
#[derive(Debug, Clone, PartialEq)]
pub struct UnfoldRequest {
    /// Supercell-to-primitive transformation matrix.
    pub transform: [[f64; 3]; 3],
    /// Primitive-cell k-path, densified.
    pub kpath: Vec<[f64; 3]>,
    pub spin_orbit: bool,
}

pub trait Unfolder: Send + Sync {
    /// Spectral data shaped `(spin_channels, 3, bands, kpoints)`; the middle
    /// axis holds (eigenvalue, spectral weight, origin k index).
    fn spectral_weight(
        &self,
        folder: &Path,
        request: &UnfoldRequest,
    ) -> Result<Array4<f64>, DataIntegrityError>;
}
