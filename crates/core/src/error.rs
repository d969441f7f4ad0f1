//! Error taxonomy shared by every stage of the pipeline.
//!
//! Configuration errors come from what the caller asked for (bad path
//! indices, unknown selectors, incompatible options). Integrity errors come
//! from the data itself (missing files, cache shape drift, unusable k-point
//! layouts). Both are fatal; nothing here is retried.

use std::path::PathBuf;

use crate::cache::CacheKind;
use crate::projection::OrbitalGroup;
use crate::spin::SocAxis;

/// Invalid selector or option supplied by the caller.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("custom k-path index 0 is invalid (indices are signed and 1-based)")]
    ZeroSegmentIndex,

    #[error("custom k-path index {index} is out of range for a path of {segments} segments")]
    SegmentIndexOutOfRange { index: i32, segments: usize },

    #[error("orbital index {index} is out of range ({available} orbitals available)")]
    OrbitalOutOfRange { index: usize, available: usize },

    #[error("orbital group '{0}' requires f orbitals, which this structure does not have")]
    OrbitalGroupUnavailable(OrbitalGroup),

    #[error("atom index {index} is out of range ({available} atoms in the structure)")]
    AtomOutOfRange { index: usize, available: usize },

    #[error("element '{0}' is not present in the structure")]
    UnknownElement(String),

    #[error("soc_axis='{0}' was requested for a calculation without spin-orbit coupling")]
    SpinAxisWithoutSpinOrbit(SocAxis),

    #[error("projections were not loaded for this dataset (set projected = true)")]
    ProjectionsNotLoaded,

    #[error("unfolded dataset requested without unfold options")]
    MissingUnfoldOptions,

    #[error("no unfolder available and no cached unfolded data in {0:?}")]
    UnfolderUnavailable(PathBuf),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// The data on disk (or handed over by a collaborator) cannot be trusted.
#[derive(Debug, thiserror::Error)]
pub enum DataIntegrityError {
    #[error("no Fermi energy available for {0:?}")]
    MissingFermiEnergy(PathBuf),

    #[error("Fermi energy {0} is not a finite number")]
    InvalidFermiEnergy(f64),

    #[error("cached {kind} has shape {found:?}, expected {expected}")]
    CacheShape {
        kind: CacheKind,
        expected: String,
        found: Vec<usize>,
    },

    #[error("failed to read cached {kind} from {path:?}: {source}")]
    CacheRead {
        kind: CacheKind,
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },

    #[error("failed to write cached {kind} to {path:?}: {message}")]
    CacheWrite {
        kind: CacheKind,
        path: PathBuf,
        message: String,
    },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("required file is missing: {0:?}")]
    MissingFile(PathBuf),

    #[error("required data is missing: {0}")]
    MissingData(String),

    #[error("lattice matrix is singular")]
    SingularLattice,

    #[error("k-point layout: {0}")]
    KPointLayout(String),

    #[error("distances in segment {segment} are not strictly increasing")]
    NonMonotonicDistance { segment: usize },

    #[error("segment {segment} has {len} points; at least 2 are required")]
    SegmentTooShort { segment: usize, len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error for dataset construction and plot assembly.
#[derive(Debug, thiserror::Error)]
pub enum BandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),
}

pub type Result<T, E = BandError> = std::result::Result<T, E>;
