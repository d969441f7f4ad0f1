//! Job configuration files and the JSON dump reader.
//!
//! A band job is described by a TOML file. The main type is
//! [`BandJobConfig`], which converts into [`DatasetOptions`] and
//! [`PlotOptions`].
//!
//! # File Format
//!
//! ```toml
//! folder = "runs/GaAs"
//! spin = "up"
//! projected = true
//! custom_kpath = [2, -1]
//! erange = [-4.0, 4.0]
//!
//! [interpolation]
//! enabled = true
//! new_n = 200
//!
//! [plot]
//! kind = "element_spd"
//! elements = ["Ga", "As"]
//! groups = ["s", "p"]
//! ```
//!
//! Simulation output is handed over as a serialized [`RawDump`] named
//! `bands.json` inside each dataset folder; [`JsonReader`] serves it through
//! the [`Reader`] trait.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use ndarray::{Array3, Array5};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bandstructure::{PlotOptions, PlotSelection};
use crate::dataset::{DatasetOptions, UnfoldOptions};
use crate::error::{ConfigError, DataIntegrityError};
use crate::interpolate::Interpolator;
use crate::kpath::CustomPathSpec;
use crate::reader::{CalculationFlags, KPointLayout, RawEigenvalues, Reader, Structure};
use crate::spin::{SocAxis, Spin};

// ============================================================================
// Job Configuration
// ============================================================================

/// Resampling settings for plotted segments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterpolationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Points per segment after resampling.
    #[serde(default = "default_new_n")]
    pub new_n: usize,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            new_n: default_new_n(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_new_n() -> usize {
    Interpolator::DEFAULT_POINTS
}

fn default_stretch() -> f64 {
    1.0
}

fn default_erange() -> [f64; 2] {
    [-6.0, 6.0]
}

/// Configuration for one band dataset and the plot built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandJobConfig {
    /// Dataset folder (holds `bands.json` and the derived-data cache).
    pub folder: PathBuf,
    /// Name used for output files; defaults to the folder name.
    #[serde(default)]
    pub name: Option<String>,
    /// Folder whose Fermi energy is the reference (e.g. an SCF run).
    #[serde(default)]
    pub efermi_folder: Option<PathBuf>,
    #[serde(default)]
    pub spin: Spin,
    /// Load projection weights. Implied by any projected `plot` kind.
    #[serde(default)]
    pub projected: bool,
    /// Spin-orbit magnetization axis for pseudo-spin separation.
    #[serde(default)]
    pub soc_axis: Option<SocAxis>,
    /// Signed, 1-based segment order; negative entries run backwards.
    #[serde(default)]
    pub custom_kpath: Option<Vec<i32>>,
    /// Added to the reference Fermi energy.
    #[serde(default)]
    pub shift_efermi: f64,
    /// Multiplies every Fermi-shifted eigenvalue.
    #[serde(default = "default_stretch")]
    pub stretch_factor: f64,
    #[serde(default)]
    pub interpolation: InterpolationConfig,
    #[serde(default)]
    pub unfold: Option<UnfoldOptions>,
    /// Plotted energy window around the Fermi level.
    #[serde(default = "default_erange")]
    pub erange: [f64; 2],
    #[serde(default)]
    pub plot: PlotSelection,
}

impl BandJobConfig {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            name: None,
            efermi_folder: None,
            spin: Spin::Up,
            projected: false,
            soc_axis: None,
            custom_kpath: None,
            shift_efermi: 0.0,
            stretch_factor: default_stretch(),
            interpolation: InterpolationConfig::default(),
            unfold: None,
            erange: default_erange(),
            plot: PlotSelection::Plain,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interpolation.new_n < 2 {
            return Err(ConfigError::InvalidOption(format!(
                "interpolation.new_n must be at least 2 (got {})",
                self.interpolation.new_n
            )));
        }
        if let Some(path) = &self.custom_kpath {
            if path.iter().any(|&idx| idx == 0) {
                return Err(ConfigError::ZeroSegmentIndex);
            }
        }
        if self.erange.iter().any(|e| !e.is_finite()) {
            return Err(ConfigError::InvalidOption(
                "erange bounds must be finite".to_string(),
            ));
        }
        self.dataset_options().validate()
    }

    /// Label for output files.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bands".to_string())
    }

    pub fn dataset_options(&self) -> DatasetOptions {
        DatasetOptions {
            folder: self.folder.clone(),
            efermi_folder: self.efermi_folder.clone(),
            spin: self.spin,
            projected: self.projected || self.plot.is_projected(),
            soc_axis: self.soc_axis,
            custom_kpath: self.custom_kpath.clone().map(CustomPathSpec::new),
            shift_efermi: self.shift_efermi,
            stretch_factor: self.stretch_factor,
            unfold: self.unfold.clone(),
        }
    }

    pub fn plot_options(&self) -> PlotOptions {
        PlotOptions {
            erange: self.erange,
            interpolation: self
                .interpolation
                .enabled
                .then(|| Interpolator::new(self.interpolation.new_n)),
        }
    }
}

impl From<&BandJobConfig> for DatasetOptions {
    fn from(value: &BandJobConfig) -> Self {
        value.dataset_options()
    }
}

// ============================================================================
// JSON Reader
// ============================================================================

/// File name of the serialized reader output inside a dataset folder.
pub const DUMP_FILE: &str = "bands.json";

/// Everything a [`Reader`] hands over for one folder, in one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDump {
    pub eigenvalues: RawEigenvalues,
    pub structure: Structure,
    #[serde(default)]
    pub flags: CalculationFlags,
    #[serde(default)]
    pub fermi_energy: Option<f64>,
    #[serde(default)]
    pub kpoint_layout: KPointLayout,
    #[serde(default)]
    pub projections: Option<Array5<f64>>,
    #[serde(default)]
    pub spin_axis_projections: Option<Array3<f64>>,
}

impl RawDump {
    pub fn write(&self, folder: &Path) -> Result<(), DataIntegrityError> {
        let content = serde_json::to_string(self)?;
        fs::write(folder.join(DUMP_FILE), content)?;
        Ok(())
    }
}

type DumpSlot = Arc<Mutex<Option<Arc<RawDump>>>>;

/// [`Reader`] over `bands.json` dumps. Each folder is parsed once until
/// [`Reader::release`] drops it.
///
/// The map lock only hands out per-folder slots; parsing happens under the
/// slot's own lock, so different folders parse concurrently.
#[derive(Default)]
pub struct JsonReader {
    dumps: Mutex<HashMap<PathBuf, DumpSlot>>,
}

impl JsonReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dump(&self, folder: &Path) -> Result<Arc<RawDump>, DataIntegrityError> {
        let slot = Arc::clone(self.dumps.lock().entry(folder.to_path_buf()).or_default());
        let mut slot = slot.lock();
        if let Some(dump) = slot.as_ref() {
            return Ok(Arc::clone(dump));
        }
        let path = folder.join(DUMP_FILE);
        if !path.is_file() {
            return Err(DataIntegrityError::MissingFile(path));
        }
        let content = fs::read_to_string(&path)?;
        let dump: Arc<RawDump> = Arc::new(serde_json::from_str(&content)?);
        debug!("parsed {}", path.display());
        *slot = Some(Arc::clone(&dump));
        Ok(dump)
    }

    /// Number of folders currently held in memory.
    pub fn resident(&self) -> usize {
        self.dumps
            .lock()
            .values()
            .filter(|slot| slot.lock().is_some())
            .count()
    }
}

impl Reader for JsonReader {
    fn read_eigenvalues(&self, folder: &Path) -> Result<RawEigenvalues, DataIntegrityError> {
        Ok(self.dump(folder)?.eigenvalues.clone())
    }

    fn read_structure(&self, folder: &Path) -> Result<Structure, DataIntegrityError> {
        Ok(self.dump(folder)?.structure.clone())
    }

    fn read_flags(&self, folder: &Path) -> Result<CalculationFlags, DataIntegrityError> {
        Ok(self.dump(folder)?.flags)
    }

    fn read_fermi_energy(&self, folder: &Path) -> Result<Option<f64>, DataIntegrityError> {
        Ok(self.dump(folder)?.fermi_energy)
    }

    fn read_kpoint_layout(&self, folder: &Path) -> Result<KPointLayout, DataIntegrityError> {
        Ok(self.dump(folder)?.kpoint_layout.clone())
    }

    fn read_projections(&self, folder: &Path) -> Result<Array5<f64>, DataIntegrityError> {
        self.dump(folder)?
            .projections
            .clone()
            .ok_or_else(|| DataIntegrityError::MissingData(format!("projections in {DUMP_FILE}")))
    }

    fn read_spin_axis_projections(
        &self,
        folder: &Path,
    ) -> Result<Array3<f64>, DataIntegrityError> {
        self.dump(folder)?
            .spin_axis_projections
            .clone()
            .ok_or_else(|| {
                DataIntegrityError::MissingData(format!("spin-axis projections in {DUMP_FILE}"))
            })
    }
    fn release(&self, folder: &Path) {
        if self.dumps.lock().remove(folder).is_some() {
            debug!("released {}", folder.display());
        }
    }
}
