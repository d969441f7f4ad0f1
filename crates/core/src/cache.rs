//! Persistence of expensive derived arrays next to the dataset.
//!
//! Every entry is stored before any spin or axis selection so the same file
//! serves every later load of the folder, whatever `spin`/`soc_axis` the
//! caller asks for. A hit is authoritative; a corrupt file is an error,
//! never a silent recompute.

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use ndarray::{Array, ArrayBase, Data, Dimension};
use ndarray_npy::{read_npy, WriteNpyExt};
use parking_lot::Mutex;

use crate::error::DataIntegrityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Fermi-shifted eigenvalues with k-point coordinates appended on the
    /// trailing axis: `[bands, kpoints, 2 * channels + 3]`.
    MergedRaw,
    /// Unfolder output: `(spin_channels, 3, bands, kpoints)`.
    UnfoldedRaw,
    /// Raw projections: `[bands, kpoints, channels, atoms, orbitals]`.
    ProjectedRaw,
    /// Spin-axis projections: `[bands, kpoints, 4]`.
    SpinAxisRaw,
}

impl CacheKind {
    pub const ALL: [CacheKind; 4] = [
        CacheKind::MergedRaw,
        CacheKind::UnfoldedRaw,
        CacheKind::ProjectedRaw,
        CacheKind::SpinAxisRaw,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            CacheKind::MergedRaw => "eigenvalues.npy",
            CacheKind::UnfoldedRaw => "unfolded_eigenvalues.npy",
            CacheKind::ProjectedRaw => "projected_eigenvalues.npy",
            CacheKind::SpinAxisRaw => "spin_projections.npy",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheKind::MergedRaw => "merged eigenvalues",
            CacheKind::UnfoldedRaw => "unfolded spectral data",
            CacheKind::ProjectedRaw => "projected eigenvalues",
            CacheKind::SpinAxisRaw => "spin-axis projections",
        };
        f.write_str(name)
    }
}

/// File-backed cache keyed by `(folder, kind)`.
///
/// Writes are serialized through one lock and land via rename, so a reader
/// in another thread or process never observes a partial file. Each key is
/// written at most once per cache instance.
pub struct DerivedDataCache {
    enabled: bool,
    written: Mutex<HashSet<(PathBuf, CacheKind)>>,
}

impl Default for DerivedDataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DerivedDataCache {
    pub fn new() -> Self {
        Self {
            enabled: true,
            written: Mutex::new(HashSet::new()),
        }
    }

    /// A cache that never hits and never writes.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            written: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(folder: &Path, kind: CacheKind) -> PathBuf {
        folder.join(kind.file_name())
    }

    pub fn contains(&self, folder: &Path, kind: CacheKind) -> bool {
        self.enabled && Self::path(folder, kind).is_file()
    }

    /// Load an entry; `Ok(None)` is a miss.
    pub fn load<D: Dimension>(
        &self,
        folder: &Path,
        kind: CacheKind,
    ) -> Result<Option<Array<f64, D>>, DataIntegrityError> {
        if !self.enabled {
            return Ok(None);
        }
        let path = Self::path(folder, kind);
        if !path.is_file() {
            debug!("[cache] miss {kind} in {}", folder.display());
            return Ok(None);
        }
        let array: Array<f64, D> =
            read_npy(&path).map_err(|source| DataIntegrityError::CacheRead {
                kind,
                path: path.clone(),
                source,
            })?;
        debug!(
            "[cache] hit {kind} in {} shape={:?}",
            folder.display(),
            array.shape()
        );
        Ok(Some(array))
    }

    /// Persist an entry. Returns `false` when the key was already written by
    /// this cache (or the cache is disabled) and the call was skipped.
    pub fn store<S, D>(
        &self,
        folder: &Path,
        kind: CacheKind,
        array: &ArrayBase<S, D>,
    ) -> Result<bool, DataIntegrityError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        if !self.enabled {
            return Ok(false);
        }
        let key = (folder.to_path_buf(), kind);
        let mut written = self.written.lock();
        if written.contains(&key) {
            debug!("[cache] skip {kind} in {} (already written)", folder.display());
            return Ok(false);
        }

        let path = Self::path(folder, kind);
        let tmp = path.with_extension(format!("npy.tmp{}", std::process::id()));
        let write_err = |message: String| DataIntegrityError::CacheWrite {
            kind,
            path: path.clone(),
            message,
        };
        let file = File::create(&tmp).map_err(|e| write_err(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        let outcome = array
            .write_npy(&mut writer)
            .map_err(|e| e.to_string())
            .and_then(|()| writer.flush().map_err(|e| e.to_string()));
        if let Err(message) = outcome {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(message));
        }
        fs::rename(&tmp, &path).map_err(|e| write_err(e.to_string()))?;

        written.insert(key);
        debug!(
            "[cache] stored {kind} in {} shape={:?}",
            folder.display(),
            array.shape()
        );
        Ok(true)
    }
}
