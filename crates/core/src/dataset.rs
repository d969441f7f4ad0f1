//! Dataset assembly: one normalized band structure per
//! (folder, spin, unfold, soc_axis) combination.

use std::path::{Path, PathBuf};

use log::{info, warn};
use ndarray::{Array, Array2, Array4, Axis, RemoveAxis};
use serde::{Deserialize, Serialize};

use crate::adapter::{EnergyScale, RawDataAdapter};
use crate::cache::DerivedDataCache;
use crate::distance::DistanceCalculator;
use crate::error::{ConfigError, DataIntegrityError, Result};
use crate::kpath::{
    natural_segments, CustomPathSpec, NaturalSegment, ResolvedPath, SamplingScheme, Tick,
};
use crate::projection::{OrbitalTable, ProjectionAggregator};
use crate::reader::{CalculationFlags, Reader, Structure, Unfolder};
use crate::spin::{SocAxis, Spin};

/// Supercell unfolding request: legs of the primitive-cell path and how
/// densely each is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnfoldOptions {
    /// `(start, end)` label of each leg.
    pub legs: Vec<(String, String)>,
    pub points_per_leg: usize,
    /// Supercell-to-primitive transformation matrix.
    pub transform: [[f64; 3]; 3],
    /// Leg corners in primitive fractional coordinates, `legs.len() + 1` of them.
    pub high_symmetry_points: Vec<[f64; 3]>,
}

impl UnfoldOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.legs.is_empty() {
            return Err(ConfigError::InvalidOption(
                "unfold.legs must name at least one leg".to_string(),
            ));
        }
        if self.points_per_leg == 0 {
            return Err(ConfigError::InvalidOption(
                "unfold.points_per_leg must be at least 1".to_string(),
            ));
        }
        if self.high_symmetry_points.len() != self.legs.len() + 1 {
            return Err(ConfigError::InvalidOption(format!(
                "unfold.high_symmetry_points has {} entries, {} legs need {}",
                self.high_symmetry_points.len(),
                self.legs.len(),
                self.legs.len() + 1
            )));
        }
        Ok(())
    }
}

/// Everything that selects what a [`Dataset`] contains.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetOptions {
    pub folder: PathBuf,
    /// Folder of the calculation whose Fermi level is the reference.
    pub efermi_folder: Option<PathBuf>,
    pub spin: Spin,
    pub projected: bool,
    pub soc_axis: Option<SocAxis>,
    pub custom_kpath: Option<CustomPathSpec>,
    pub shift_efermi: f64,
    pub stretch_factor: f64,
    pub unfold: Option<UnfoldOptions>,
}

impl DatasetOptions {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            efermi_folder: None,
            spin: Spin::Up,
            projected: false,
            soc_axis: None,
            custom_kpath: None,
            shift_efermi: 0.0,
            stretch_factor: 1.0,
            unfold: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.stretch_factor.is_finite() || self.stretch_factor <= 0.0 {
            return Err(ConfigError::InvalidOption(format!(
                "stretch_factor must be positive (got {})",
                self.stretch_factor
            )));
        }
        if !self.shift_efermi.is_finite() {
            return Err(ConfigError::InvalidOption(
                "shift_efermi must be finite".to_string(),
            ));
        }
        if let Some(unfold) = &self.unfold {
            unfold.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    folder: PathBuf,
    spin: Spin,
    soc_axis: Option<SocAxis>,
    flags: CalculationFlags,
    fermi_energy: f64,
    eigenvalues: Array2<f64>,
    kpoints: Vec<[f64; 3]>,
    spectral_weights: Option<Array2<f64>>,
    origin_k: Option<Array2<usize>>,
    structure: Structure,
    table: OrbitalTable,
    natural: Vec<NaturalSegment>,
    path: ResolvedPath,
    distances: Vec<Vec<f64>>,
    projections: Option<Array4<f64>>,
    spin_projections: Option<Array2<f64>>,
}

impl Dataset {
    pub fn load(
        reader: &dyn Reader,
        unfolder: Option<&dyn Unfolder>,
        cache: &DerivedDataCache,
        options: &DatasetOptions,
    ) -> Result<Self> {
        options.validate()?;
        let folder = options.folder.as_path();
        let mut flags = reader.read_flags(folder)?;
        if let Some(axis) = options.soc_axis {
            if !flags.spin_orbit {
                return Err(ConfigError::SpinAxisWithoutSpinOrbit(axis).into());
            }
        }
        if options.unfold.is_some() && flags.hybrid_functional {
            warn!(
                "{}: unfolding a hybrid-functional run; zero-weight filtering is skipped",
                folder.display()
            );
            flags.hybrid_functional = false;
        }
        let structure = reader.read_structure(folder)?;
        let adapter = RawDataAdapter::new(reader, cache);
        let energy = EnergyScale {
            fermi: adapter.fermi_energy(
                folder,
                options.efermi_folder.as_deref(),
                options.shift_efermi,
            )?,
            stretch: options.stretch_factor,
        };

        let (eigenvalues, kpoints, spectral_weights, origin_k, scheme) = match &options.unfold {
            Some(unfold) => {
                let bands =
                    adapter.unfolded(folder, unfolder, unfold, energy, &flags, options.spin)?;
                (
                    bands.eigenvalues,
                    bands.kpoints,
                    Some(bands.spectral_weights),
                    Some(bands.origin_k),
                    SamplingScheme::Unfolded(unfold.legs.clone()),
                )
            }
            None => {
                let bands = adapter.eigenvalues(folder, energy, &flags, options.spin)?;
                let layout = reader.read_kpoint_layout(folder)?;
                let scheme = if flags.hybrid_functional {
                    SamplingScheme::Hybrid(layout.symmetry_points)
                } else {
                    let line_mode = layout.line_mode.ok_or_else(|| {
                        DataIntegrityError::MissingData(
                            "line-mode k-point layout for a regular band structure".to_string(),
                        )
                    })?;
                    SamplingScheme::Regular(line_mode)
                };
                (bands.eigenvalues, bands.kpoints, None, None, scheme)
            }
        };

        let natural = natural_segments(&scheme, &kpoints)?;
        let path = ResolvedPath::resolve(&natural, options.custom_kpath.as_ref())?;
        let distances =
            DistanceCalculator::new(&structure.lattice)?.path_distances(&path, &kpoints)?;
        let table = OrbitalTable::for_structure(&structure);

        let mut dataset = Self {
            folder: options.folder.clone(),
            spin: options.spin,
            soc_axis: options.soc_axis,
            flags,
            fermi_energy: energy.fermi,
            eigenvalues,
            kpoints,
            spectral_weights,
            origin_k,
            structure,
            table,
            natural,
            path,
            distances,
            projections: None,
            spin_projections: None,
        };
        if options.projected {
            dataset.attach_projections(reader, cache)?;
        }
        if let Some(axis) = options.soc_axis {
            dataset.attach_spin_axis(reader, cache, axis)?;
        }
        info!(
            "dataset {}: {} bands, {} k-points, {} path segment(s)",
            dataset.folder.display(),
            dataset.num_bands(),
            dataset.kpoints.len(),
            dataset.path.len()
        );
        Ok(dataset)
    }

    /// Load projection weights aligned with this dataset's k-points.
    pub fn attach_projections(
        &mut self,
        reader: &dyn Reader,
        cache: &DerivedDataCache,
    ) -> Result<()> {
        let adapter = RawDataAdapter::new(reader, cache);
        let weights = adapter.projections(
            &self.folder,
            &self.flags,
            self.spin,
            self.soc_axis,
            self.structure.num_atoms(),
            self.table.width(),
        )?;
        self.check_bands(weights.shape()[0])?;
        let weights = self.align_kpoints(weights, Axis(1))?;
        self.projections = Some(weights);
        Ok(())
    }

    /// Load normalized pseudo-spin weights along `axis`.
    pub fn attach_spin_axis(
        &mut self,
        reader: &dyn Reader,
        cache: &DerivedDataCache,
        axis: SocAxis,
    ) -> Result<()> {
        let adapter = RawDataAdapter::new(reader, cache);
        let weights = adapter.spin_axis_projections(&self.folder, &self.flags, self.spin, axis)?;
        self.check_bands(weights.shape()[0])?;
        let weights = self.align_kpoints(weights, Axis(1))?;
        self.soc_axis = Some(axis);
        self.spin_projections = Some(weights);
        Ok(())
    }

    fn check_bands(&self, bands: usize) -> Result<(), DataIntegrityError> {
        if bands != self.num_bands() {
            return Err(DataIntegrityError::ShapeMismatch(format!(
                "projection data has {bands} bands, eigenvalues have {}",
                self.num_bands()
            )));
        }
        Ok(())
    }

    /// Put `array`'s k axis on this dataset's k-points. Unfolded datasets
    /// remap through the origin-k indices of the first band.
    fn align_kpoints<D: RemoveAxis>(
        &self,
        array: Array<f64, D>,
        axis: Axis,
    ) -> Result<Array<f64, D>, DataIntegrityError> {
        let available = array.len_of(axis);
        match &self.origin_k {
            Some(origin_k) => {
                if origin_k.nrows() == 0 {
                    return Err(DataIntegrityError::ShapeMismatch(
                        "unfolded dataset has no bands to take origin k indices from".to_string(),
                    ));
                }
                let columns: Vec<usize> = origin_k.row(0).to_vec();
                if let Some(&bad) = columns.iter().find(|&&k| k >= available) {
                    return Err(DataIntegrityError::ShapeMismatch(format!(
                        "origin k index {bad} exceeds the {available} supercell k-points"
                    )));
                }
                Ok(array.select(axis, &columns))
            }
            None if available == self.kpoints.len() => Ok(array),
            None => Err(DataIntegrityError::ShapeMismatch(format!(
                "projection data has {available} k-points, eigenvalues have {}",
                self.kpoints.len()
            ))),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn spin(&self) -> Spin {
        self.spin
    }

    pub fn soc_axis(&self) -> Option<SocAxis> {
        self.soc_axis
    }

    pub fn flags(&self) -> &CalculationFlags {
        &self.flags
    }

    pub fn is_unfolded(&self) -> bool {
        self.spectral_weights.is_some()
    }

    /// Reference energy, including any user shift.
    pub fn fermi_energy(&self) -> f64 {
        self.fermi_energy
    }

    /// `[bands, kpoints]`, Fermi-shifted.
    pub fn eigenvalues(&self) -> &Array2<f64> {
        &self.eigenvalues
    }

    pub fn num_bands(&self) -> usize {
        self.eigenvalues.shape()[0]
    }

    pub fn kpoints(&self) -> &[[f64; 3]] {
        &self.kpoints
    }

    pub fn spectral_weights(&self) -> Option<&Array2<f64>> {
        self.spectral_weights.as_ref()
    }

    pub fn origin_k(&self) -> Option<&Array2<usize>> {
        self.origin_k.as_ref()
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn orbital_table(&self) -> OrbitalTable {
        self.table
    }

    pub fn natural_segments(&self) -> &[NaturalSegment] {
        &self.natural
    }

    pub fn path(&self) -> &ResolvedPath {
        &self.path
    }

    /// Per-segment cumulative distances, in path order.
    pub fn distances(&self) -> &[Vec<f64>] {
        &self.distances
    }

    pub fn ticks(&self) -> Vec<Tick> {
        self.path.ticks(&self.distances)
    }

    /// `[bands, kpoints, atoms, orbitals]` when projections were attached.
    pub fn projections(&self) -> Option<&Array4<f64>> {
        self.projections.as_ref()
    }

    /// `[bands, kpoints]` pseudo-spin weights when a spin axis was attached.
    pub fn spin_projections(&self) -> Option<&Array2<f64>> {
        self.spin_projections.as_ref()
    }

    pub fn aggregator(&self) -> Result<ProjectionAggregator<'_>> {
        let weights = self
            .projections
            .as_ref()
            .ok_or(ConfigError::ProjectionsNotLoaded)?;
        Ok(ProjectionAggregator::new(
            weights.view(),
            self.table,
            &self.structure,
        )?)
    }
}
