#![cfg(test)]

use ndarray::{Array3, Ix3, Ix5};
use tempfile::tempdir;

use super::_tests_fixtures::{
    hybrid_dump, polarized_dump, regular_dump, spin_orbit_dump, MemoryReader, FERMI,
};
use super::adapter::{zero_weight_columns, EnergyScale, RawDataAdapter};
use super::cache::{CacheKind, DerivedDataCache};
use super::error::{BandError, ConfigError, DataIntegrityError};
use super::spin::{SocAxis, Spin};

fn scale(fermi: f64) -> EnergyScale {
    EnergyScale { fermi, stretch: 1.0 }
}

#[test]
fn fermi_energy_adds_the_user_shift() {
    let reader = MemoryReader::new(regular_dump());
    let cache = DerivedDataCache::disabled();
    let adapter = RawDataAdapter::new(&reader, &cache);
    let dir = tempdir().unwrap();
    let fermi = adapter.fermi_energy(dir.path(), None, 0.2).unwrap();
    assert!((fermi - (FERMI + 0.2)).abs() < 1e-12);
}

#[test]
fn missing_or_invalid_fermi_energy_is_fatal() {
    let dir = tempdir().unwrap();
    let cache = DerivedDataCache::disabled();

    let mut dump = regular_dump();
    dump.fermi_energy = None;
    let reader = MemoryReader::new(dump);
    let err = RawDataAdapter::new(&reader, &cache)
        .fermi_energy(dir.path(), None, 0.0)
        .unwrap_err();
    assert!(matches!(err, DataIntegrityError::MissingFermiEnergy(_)));

    let mut dump = regular_dump();
    dump.fermi_energy = Some(f64::NAN);
    let reader = MemoryReader::new(dump);
    let err = RawDataAdapter::new(&reader, &cache)
        .fermi_energy(dir.path(), None, 0.0)
        .unwrap_err();
    assert!(matches!(err, DataIntegrityError::InvalidFermiEnergy(_)));
}

#[test]
fn merged_layout_appends_kpoints_after_channels() {
    let reader = MemoryReader::new(polarized_dump());
    let cache = DerivedDataCache::disabled();
    let adapter = RawDataAdapter::new(&reader, &cache);
    let dir = tempdir().unwrap();
    let merged = adapter
        .merged_raw(dir.path(), FERMI, &reader.dump.flags)
        .unwrap();
    assert_eq!(merged.shape(), &[4, 21, 7]);
    let raw_up = reader.dump.eigenvalues.channels[0][[3, 2, 0]];
    let raw_down = reader.dump.eigenvalues.channels[1][[3, 2, 0]];
    assert!((merged[[2, 3, 0]] - (raw_up - FERMI)).abs() < 1e-12);
    assert_eq!(merged[[2, 3, 1]], 1.0);
    assert!((merged[[2, 3, 2]] - (raw_down - FERMI)).abs() < 1e-12);
    assert!((merged[[2, 3, 4]] - 0.15).abs() < 1e-12);
    assert_eq!(merged[[2, 3, 5]], 0.0);
}

#[test]
fn spin_selection_happens_after_the_cache() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(polarized_dump());
    let cache = DerivedDataCache::new();
    let adapter = RawDataAdapter::new(&reader, &cache);
    let flags = reader.dump.flags;

    let up = adapter.eigenvalues(dir.path(), scale(FERMI), &flags, Spin::Up).unwrap();
    let down = adapter.eigenvalues(dir.path(), scale(FERMI), &flags, Spin::Down).unwrap();
    assert_eq!(reader.eigenvalue_reads(), 1);
    assert!(cache.contains(dir.path(), CacheKind::MergedRaw));
    assert!((down.eigenvalues[[1, 5]] - up.eigenvalues[[1, 5]] - 0.25).abs() < 1e-12);
    assert_eq!(up.kpoints, down.kpoints);

    // a second cache instance (another process) reuses the file
    let fresh = DerivedDataCache::new();
    let again = RawDataAdapter::new(&reader, &fresh)
        .eigenvalues(dir.path(), scale(FERMI), &flags, Spin::Down)
        .unwrap();
    assert_eq!(reader.eigenvalue_reads(), 1);
    assert_eq!(again, down);
}

#[test]
fn stretch_multiplies_shifted_eigenvalues() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(regular_dump());
    let cache = DerivedDataCache::disabled();
    let adapter = RawDataAdapter::new(&reader, &cache);
    let flags = reader.dump.flags;
    let plain = adapter.eigenvalues(dir.path(), scale(FERMI), &flags, Spin::Up).unwrap();
    let stretched = adapter
        .eigenvalues(dir.path(), EnergyScale { fermi: FERMI, stretch: 2.0 }, &flags, Spin::Up)
        .unwrap();
    assert!((stretched.eigenvalues[[0, 0]] - 2.0 * plain.eigenvalues[[0, 0]]).abs() < 1e-12);
}

#[test]
fn hybrid_filter_runs_before_caching() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(hybrid_dump());
    let cache = DerivedDataCache::new();
    let adapter = RawDataAdapter::new(&reader, &cache);
    let flags = reader.dump.flags;
    let bands = adapter.eigenvalues(dir.path(), scale(FERMI), &flags, Spin::Up).unwrap();
    assert_eq!(bands.eigenvalues.shape(), &[4, 11]);
    assert_eq!(bands.kpoints[0], [0.0, 0.0, 0.0]);
    assert!((bands.kpoints[10][0] - 0.5).abs() < 1e-12);

    let cached = cache.load::<Ix3>(dir.path(), CacheKind::MergedRaw).unwrap().unwrap();
    assert_eq!(cached.shape()[1], 11);

    adapter
        .projections(dir.path(), &flags, Spin::Up, None, 2, 9)
        .unwrap();
    let cached = cache.load::<Ix5>(dir.path(), CacheKind::ProjectedRaw).unwrap().unwrap();
    assert_eq!(cached.shape()[1], 11);
}

#[test]
fn hybrid_spin_axis_data_must_cover_every_weighted_kpoint() {
    let dir = tempdir().unwrap();
    let mut dump = hybrid_dump();
    dump.flags.spin_orbit = true;
    dump.spin_axis_projections = Some(Array3::from_elem((4, 11, 4), 0.5));
    let reader = MemoryReader::new(dump);
    let cache = DerivedDataCache::new();
    let adapter = RawDataAdapter::new(&reader, &cache);
    let err = adapter
        .spin_axis_projections(dir.path(), &reader.dump.flags, Spin::Up, SocAxis::Z)
        .unwrap_err();
    assert!(matches!(
        err,
        BandError::Integrity(DataIntegrityError::ShapeMismatch(_))
    ));
    assert!(!cache.contains(dir.path(), CacheKind::SpinAxisRaw));
}

#[test]
fn zero_weight_filter_requires_band_points() {
    assert_eq!(zero_weight_columns(&[0.5, 0.0, 0.5, 0.0]).unwrap(), vec![1, 3]);
    assert!(zero_weight_columns(&[0.5, 0.5]).is_err());
}

#[test]
fn projections_are_squared_after_channel_selection() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(polarized_dump());
    let cache = DerivedDataCache::disabled();
    let adapter = RawDataAdapter::new(&reader, &cache);
    let flags = reader.dump.flags;
    let down = adapter
        .projections(dir.path(), &flags, Spin::Down, None, 2, 9)
        .unwrap();
    let raw = reader.dump.projections.as_ref().unwrap()[[1, 2, 1, 0, 4]];
    assert!((down[[1, 2, 0, 4]] - raw * raw).abs() < 1e-15);
}

#[test]
fn spin_orbit_axis_splits_before_squaring() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(spin_orbit_dump());
    let cache = DerivedDataCache::new();
    let adapter = RawDataAdapter::new(&reader, &cache);
    let flags = reader.dump.flags;

    let up = adapter
        .projections(dir.path(), &flags, Spin::Up, Some(SocAxis::Z), 2, 9)
        .unwrap();
    let down = adapter
        .projections(dir.path(), &flags, Spin::Down, Some(SocAxis::Z), 2, 9)
        .unwrap();
    assert_eq!(reader.projection_reads(), 1);
    // band 0 has a positive z component, band 1 a negative one
    assert!((up[[0, 0, 0, 2]] - 0.09).abs() < 1e-12);
    assert_eq!(down[[0, 0, 0, 2]], 0.0);
    assert_eq!(up[[1, 0, 0, 2]], 0.0);
    assert!((down[[1, 0, 0, 2]] - 0.09).abs() < 1e-12);

    let total = adapter
        .projections(dir.path(), &flags, Spin::Down, None, 2, 9)
        .unwrap();
    assert!((total[[1, 0, 0, 2]] - 0.09).abs() < 1e-12);
}

#[test]
fn spin_axis_needs_spin_orbit() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(regular_dump());
    let cache = DerivedDataCache::disabled();
    let adapter = RawDataAdapter::new(&reader, &cache);
    let err = adapter
        .spin_axis_projections(dir.path(), &reader.dump.flags, Spin::Up, SocAxis::X)
        .unwrap_err();
    assert!(matches!(
        err,
        BandError::Config(ConfigError::SpinAxisWithoutSpinOrbit(SocAxis::X))
    ));
}

#[test]
fn spin_axis_weights_are_normalized_by_the_joint_maximum() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(spin_orbit_dump());
    let cache = DerivedDataCache::disabled();
    let adapter = RawDataAdapter::new(&reader, &cache);
    let flags = reader.dump.flags;
    let up = adapter
        .spin_axis_projections(dir.path(), &flags, Spin::Up, SocAxis::Y)
        .unwrap();
    let down = adapter
        .spin_axis_projections(dir.path(), &flags, Spin::Down, SocAxis::Y)
        .unwrap();
    // maxima: up 1.5 (band 2), down 1.0 (band 3)
    assert!((up[[2, 0]] - 1.0).abs() < 1e-12);
    assert!((up[[0, 0]] - 0.5 / 1.5).abs() < 1e-12);
    assert!((down[[3, 0]] - 1.0 / 1.5).abs() < 1e-12);
    assert_eq!(up[[1, 0]], 0.0);
}

#[test]
fn cached_merged_array_with_wrong_width_is_rejected() {
    let dir = tempdir().unwrap();
    let cache = DerivedDataCache::new();
    cache
        .store(dir.path(), CacheKind::MergedRaw, &Array3::<f64>::zeros((4, 21, 7)))
        .unwrap();
    let reader = MemoryReader::new(regular_dump());
    let adapter = RawDataAdapter::new(&reader, &cache);
    let err = adapter
        .merged_raw(dir.path(), FERMI, &reader.dump.flags)
        .unwrap_err();
    assert!(matches!(err, DataIntegrityError::CacheShape { kind: CacheKind::MergedRaw, .. }));
    assert_eq!(reader.eigenvalue_reads(), 0);
}
