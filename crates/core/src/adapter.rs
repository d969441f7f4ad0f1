//! Normalization of Reader/Unfolder output into canonical arrays.
//!
//! Every raw array goes through the [`DerivedDataCache`] before any spin or
//! axis selection. The hybrid-functional k-point filter runs once, before
//! the write, so cached arrays never contain finite-weight SCF points.

use std::path::Path;

use log::{debug, info};
use ndarray::{s, Array, Array2, Array3, Array4, Array5, ArrayView2, Axis, RemoveAxis};

use crate::cache::{CacheKind, DerivedDataCache};
use crate::dataset::UnfoldOptions;
use crate::error::{ConfigError, DataIntegrityError, Result};
use crate::kpath::{densify_legs, leg_columns};
use crate::projection::pseudo_spin_split;
use crate::reader::{CalculationFlags, Reader, UnfoldRequest, Unfolder};
use crate::spin::{SocAxis, Spin};

/// Shifted (and stretched) eigenvalues of one spin channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptedBands {
    /// `[bands, kpoints]`
    pub eigenvalues: Array2<f64>,
    pub kpoints: Vec<[f64; 3]>,
}

/// Unfolded eigenvalues with one column per point on the primitive path,
/// leg boundaries duplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct UnfoldedBands {
    /// `[bands, kpoints]`
    pub eigenvalues: Array2<f64>,
    /// `[bands, kpoints]`
    pub spectral_weights: Array2<f64>,
    /// Supercell k index each state was unfolded from, `[bands, kpoints]`.
    pub origin_k: Array2<usize>,
    pub kpoints: Vec<[f64; 3]>,
}

/// Fermi reference and stretch applied to every eigenvalue:
/// `(raw - fermi) * stretch`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyScale {
    pub fermi: f64,
    pub stretch: f64,
}

impl EnergyScale {
    pub fn apply(&self, raw: f64) -> f64 {
        (raw - self.fermi) * self.stretch
    }
}

pub struct RawDataAdapter<'a> {
    reader: &'a dyn Reader,
    cache: &'a DerivedDataCache,
}

impl<'a> RawDataAdapter<'a> {
    pub fn new(reader: &'a dyn Reader, cache: &'a DerivedDataCache) -> Self {
        Self { reader, cache }
    }

    /// Reference energy: the reader's Fermi level (taken from `efermi_folder`
    /// when given) plus `shift`.
    pub fn fermi_energy(
        &self,
        folder: &Path,
        efermi_folder: Option<&Path>,
        shift: f64,
    ) -> Result<f64, DataIntegrityError> {
        let source = efermi_folder.unwrap_or(folder);
        let energy = self
            .reader
            .read_fermi_energy(source)?
            .ok_or_else(|| DataIntegrityError::MissingFermiEnergy(source.to_path_buf()))?;
        if !energy.is_finite() {
            return Err(DataIntegrityError::InvalidFermiEnergy(energy));
        }
        info!("Fermi energy {energy:.4} eV from {}", source.display());
        Ok(energy + shift)
    }

    /// Merged eigenvalue/k-point array `[bands, kpoints, 2 * channels + 3]`,
    /// from the cache when present.
    pub fn merged_raw(
        &self,
        folder: &Path,
        fermi: f64,
        flags: &CalculationFlags,
    ) -> Result<Array3<f64>, DataIntegrityError> {
        let width = 2 * flags.eigenvalue_channels() + 3;
        if let Some(merged) = self.cache.load::<ndarray::Ix3>(folder, CacheKind::MergedRaw)? {
            if merged.shape()[2] != width {
                return Err(DataIntegrityError::CacheShape {
                    kind: CacheKind::MergedRaw,
                    expected: format!("[bands, kpoints, {width}]"),
                    found: merged.shape().to_vec(),
                });
            }
            return Ok(merged);
        }
        let merged = self.build_merged(folder, fermi, flags)?;
        self.cache.store(folder, CacheKind::MergedRaw, &merged)?;
        Ok(merged)
    }

    fn build_merged(
        &self,
        folder: &Path,
        fermi: f64,
        flags: &CalculationFlags,
    ) -> Result<Array3<f64>, DataIntegrityError> {
        let raw = self.reader.read_eigenvalues(folder)?;
        let channels = flags.eigenvalue_channels();
        if raw.channels.len() < channels {
            return Err(DataIntegrityError::MissingData(format!(
                "{channels} spin channels expected, reader returned {}",
                raw.channels.len()
            )));
        }
        let (nk, nb) = (raw.num_kpoints(), raw.num_bands());
        if raw.kpoint_weights.len() != nk {
            return Err(DataIntegrityError::ShapeMismatch(format!(
                "{} k-point weights for {nk} k-points",
                raw.kpoint_weights.len()
            )));
        }
        for (idx, channel) in raw.channels.iter().take(channels).enumerate() {
            if channel.shape() != [nk, nb, 2] {
                return Err(DataIntegrityError::ShapeMismatch(format!(
                    "eigenvalue channel {idx} has shape {:?}, expected [{nk}, {nb}, 2]",
                    channel.shape()
                )));
            }
        }

        let keep = if flags.hybrid_functional {
            zero_weight_columns(&raw.kpoint_weights)?
        } else {
            (0..nk).collect()
        };

        let mut merged = Array3::zeros((nb, keep.len(), 2 * channels + 3));
        for (c, channel) in raw.channels.iter().take(channels).enumerate() {
            let selected = channel.select(Axis(0), &keep).permuted_axes([1, 0, 2]);
            merged
                .slice_mut(s![.., .., 2 * c..2 * c + 2])
                .assign(&selected);
            merged
                .slice_mut(s![.., .., 2 * c])
                .mapv_inplace(|e| e - fermi);
        }
        for (col, &k) in keep.iter().enumerate() {
            for (j, &coord) in raw.kpoints[k].iter().enumerate() {
                merged
                    .slice_mut(s![.., col, 2 * channels + j])
                    .fill(coord);
            }
        }
        debug!(
            "merged {} bands x {} k-points ({} channel(s)) from {}",
            nb,
            keep.len(),
            channels,
            folder.display()
        );
        Ok(merged)
    }

    /// Eigenvalues of the requested spin channel, multiplied by `stretch`.
    pub fn eigenvalues(
        &self,
        folder: &Path,
        energy: EnergyScale,
        flags: &CalculationFlags,
        spin: Spin,
    ) -> Result<AdaptedBands, DataIntegrityError> {
        let merged = self.merged_raw(folder, energy.fermi, flags)?;
        let channels = flags.eigenvalue_channels();
        let channel = if channels == 2 { spin.channel() } else { 0 };
        let eigenvalues = merged
            .index_axis(Axis(2), 2 * channel)
            .mapv(|e| e * energy.stretch);
        let kpoints = if merged.shape()[0] == 0 {
            Vec::new()
        } else {
            let coords = merged.slice(s![0usize, .., (2 * channels)..]);
            coords
                .outer_iter()
                .map(|row| [row[0], row[1], row[2]])
                .collect()
        };
        info!(
            "loaded {} bands x {} k-points (spin {spin}) from {}",
            eigenvalues.shape()[0],
            eigenvalues.shape()[1],
            folder.display()
        );
        Ok(AdaptedBands {
            eigenvalues,
            kpoints,
        })
    }

    /// Unfolded bands along the densified primitive-cell path.
    pub fn unfolded(
        &self,
        folder: &Path,
        unfolder: Option<&dyn Unfolder>,
        options: &UnfoldOptions,
        energy: EnergyScale,
        flags: &CalculationFlags,
        spin: Spin,
    ) -> Result<UnfoldedBands> {
        options.validate()?;
        let n = options.points_per_leg;
        let kpath = densify_legs(&options.high_symmetry_points, n);

        let raw = match self.cache.load::<ndarray::Ix4>(folder, CacheKind::UnfoldedRaw)? {
            Some(raw) => raw,
            None => {
                let unfolder = unfolder
                    .ok_or_else(|| ConfigError::UnfolderUnavailable(folder.to_path_buf()))?;
                let request = UnfoldRequest {
                    transform: options.transform,
                    kpath: kpath.clone(),
                    spin_orbit: flags.spin_orbit,
                };
                let raw = unfolder.spectral_weight(folder, &request)?;
                self.cache.store(folder, CacheKind::UnfoldedRaw, &raw)?;
                raw
            }
        };
        let shape = raw.shape();
        if shape[0] == 0 || shape[1] != 3 || shape[3] != kpath.len() {
            return Err(DataIntegrityError::CacheShape {
                kind: CacheKind::UnfoldedRaw,
                expected: format!("[spin, 3, bands, {}]", kpath.len()),
                found: shape.to_vec(),
            }
            .into());
        }

        let channel = if !flags.spin_orbit && shape[0] > 1 {
            spin.channel()
        } else {
            0
        };
        let data = raw.index_axis(Axis(0), channel);
        let columns = leg_columns(options.legs.len(), n);
        let pick = |row: usize| data.index_axis(Axis(0), row).select(Axis(1), &columns);

        let eigenvalues = pick(0).mapv(|e| energy.apply(e));
        let spectral_weights = pick(1);
        let origin_k = origin_indices(pick(2).view())?;
        let kpoints = columns.iter().map(|&c| kpath[c]).collect();
        info!(
            "unfolded {} bands over {} legs x {} points from {}",
            eigenvalues.shape()[0],
            options.legs.len(),
            n + 1,
            folder.display()
        );
        Ok(UnfoldedBands {
            eigenvalues,
            spectral_weights,
            origin_k,
            kpoints,
        })
    }

    /// Raw projections `[bands, kpoints, channels, atoms, orbitals]`,
    /// hybrid-filtered, from the cache when present.
    pub fn projections_raw(
        &self,
        folder: &Path,
        flags: &CalculationFlags,
    ) -> Result<Array5<f64>, DataIntegrityError> {
        if let Some(raw) = self.cache.load::<ndarray::Ix5>(folder, CacheKind::ProjectedRaw)? {
            return Ok(raw);
        }
        let raw = self.reader.read_projections(folder)?;
        let raw = self.drop_scf_columns(folder, flags, raw, "projection")?;
        self.cache.store(folder, CacheKind::ProjectedRaw, &raw)?;
        Ok(raw)
    }

    /// Non-negative projection weights `[bands, kpoints, atoms, orbitals]`
    /// for one channel.
    ///
    /// With `soc_axis`, the signed axis component is split into pseudo-spins
    /// and the half matching `spin` is kept; squaring happens after the split.
    pub fn projections(
        &self,
        folder: &Path,
        flags: &CalculationFlags,
        spin: Spin,
        soc_axis: Option<SocAxis>,
        atoms: usize,
        orbitals: usize,
    ) -> Result<Array4<f64>> {
        if let Some(axis) = soc_axis {
            if !flags.spin_orbit {
                return Err(ConfigError::SpinAxisWithoutSpinOrbit(axis).into());
            }
        }
        let raw = self.projections_raw(folder, flags)?;
        let channels = flags.projection_channels();
        let shape = raw.shape();
        if shape[2] != channels || shape[3] != atoms || shape[4] != orbitals {
            return Err(DataIntegrityError::CacheShape {
                kind: CacheKind::ProjectedRaw,
                expected: format!("[bands, kpoints, {channels}, {atoms}, {orbitals}]"),
                found: shape.to_vec(),
            }
            .into());
        }

        let channel = match (flags.spin_orbit, soc_axis) {
            (true, Some(axis)) => axis.channel(),
            (true, None) => 0,
            (false, _) if channels == 2 => spin.channel(),
            (false, _) => 0,
        };
        let selected = raw.index_axis(Axis(2), channel);
        let selected = match soc_axis {
            Some(_) => {
                let (up, down) = pseudo_spin_split(selected);
                match spin {
                    Spin::Up => up,
                    Spin::Down => down,
                }
            }
            None => selected.to_owned(),
        };
        Ok(selected.mapv(|v| v * v))
    }

    /// Normalized pseudo-spin weights `[bands, kpoints]` along `axis`.
    pub fn spin_axis_projections(
        &self,
        folder: &Path,
        flags: &CalculationFlags,
        spin: Spin,
        axis: SocAxis,
    ) -> Result<Array2<f64>> {
        if !flags.spin_orbit {
            return Err(ConfigError::SpinAxisWithoutSpinOrbit(axis).into());
        }
        let raw = match self.cache.load::<ndarray::Ix3>(folder, CacheKind::SpinAxisRaw)? {
            Some(raw) => raw,
            None => {
                let raw = self.reader.read_spin_axis_projections(folder)?;
                let raw = self.drop_scf_columns(folder, flags, raw, "spin-axis projection")?;
                self.cache.store(folder, CacheKind::SpinAxisRaw, &raw)?;
                raw
            }
        };
        if raw.shape()[2] != 4 {
            return Err(DataIntegrityError::CacheShape {
                kind: CacheKind::SpinAxisRaw,
                expected: "[bands, kpoints, 4]".to_string(),
                found: raw.shape().to_vec(),
            }
            .into());
        }

        let (mut up, mut down) = pseudo_spin_split(raw.index_axis(Axis(2), axis.channel()));
        let max = up.iter().chain(down.iter()).fold(0.0_f64, |acc, &v| acc.max(v));
        if max > 0.0 {
            up.mapv_inplace(|v| v / max);
            down.mapv_inplace(|v| v / max);
        }
        Ok(match spin {
            Spin::Up => up,
            Spin::Down => down,
        })
    }

    /// Keep only the zero-weight k columns (axis 1) of a hybrid run's array.
    fn drop_scf_columns<D: RemoveAxis>(
        &self,
        folder: &Path,
        flags: &CalculationFlags,
        raw: Array<f64, D>,
        what: &str,
    ) -> Result<Array<f64, D>, DataIntegrityError> {
        if !flags.hybrid_functional {
            return Ok(raw);
        }
        let weights = self.reader.read_eigenvalues(folder)?.kpoint_weights;
        let available = raw.len_of(Axis(1));
        if available != weights.len() {
            return Err(DataIntegrityError::ShapeMismatch(format!(
                "{what} data has {available} k-points, the k-point weights list {}",
                weights.len()
            )));
        }
        let keep = zero_weight_columns(&weights)?;
        Ok(raw.select(Axis(1), &keep))
    }
}

/// Indices of band-structure-only (zero-weight) k-points.
pub fn zero_weight_columns(weights: &[f64]) -> Result<Vec<usize>, DataIntegrityError> {
    let keep: Vec<usize> = weights
        .iter()
        .enumerate()
        .filter(|&(_, &w)| w == 0.0)
        .map(|(idx, _)| idx)
        .collect();
    if keep.is_empty() {
        return Err(DataIntegrityError::KPointLayout(
            "hybrid-functional run has no zero-weight k-points".to_string(),
        ));
    }
    Ok(keep)
}

fn origin_indices(raw: ArrayView2<'_, f64>) -> Result<Array2<usize>, DataIntegrityError> {
    if raw.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(DataIntegrityError::ShapeMismatch(
            "origin k indices must be non-negative integers".to_string(),
        ));
    }
    Ok(raw.mapv(|v| v.round() as usize))
}
