#![cfg(test)]

use std::sync::atomic::Ordering;

use tempfile::tempdir;

use super::_tests_fixtures::{
    hybrid_dump, positive_projections, regular_dump, spin_orbit_dump, LinearUnfolder,
    MemoryReader, FERMI,
};
use super::cache::DerivedDataCache;
use super::dataset::{Dataset, DatasetOptions, UnfoldOptions};
use super::error::{BandError, ConfigError, DataIntegrityError};
use super::kpath::CustomPathSpec;
use super::spin::{SocAxis, Spin};

fn unfold_options() -> UnfoldOptions {
    UnfoldOptions {
        legs: vec![("G".into(), "X".into()), ("X".into(), "M".into())],
        points_per_leg: 5,
        transform: [[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]],
        high_symmetry_points: vec![[0.0, 0.0, 0.0], [0.5, 0.0, 0.0], [0.5, 0.5, 0.0]],
    }
}

#[test]
fn regular_dataset_ticks_land_on_high_symmetry_points() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(regular_dump());
    let cache = DerivedDataCache::new();
    let dataset = Dataset::load(&reader, None, &cache, &DatasetOptions::new(dir.path())).unwrap();

    assert_eq!(dataset.eigenvalues().shape(), &[4, 21]);
    assert_eq!(dataset.kpoints().len(), 21);
    assert_eq!(dataset.natural_segments().len(), 2);
    let ticks = dataset.ticks();
    let indices: Vec<usize> = ticks.iter().map(|t| t.kpoint_index).collect();
    let labels: Vec<&str> = ticks.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(indices, vec![0, 10, 20]);
    assert_eq!(labels, vec!["\\Gamma", "X", "\\Gamma"]);
    assert!((ticks[1].distance - 0.5).abs() < 1e-12);
    assert!((ticks[2].distance - 1.0).abs() < 1e-12);
    assert!((dataset.eigenvalues()[[0, 0]] - (-2.0 - FERMI)).abs() < 1e-12);
}

#[test]
fn custom_path_reorders_and_flips_segments() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(regular_dump());
    let cache = DerivedDataCache::disabled();
    let mut options = DatasetOptions::new(dir.path());
    options.custom_kpath = Some(CustomPathSpec::new(vec![2, -1]));
    let dataset = Dataset::load(&reader, None, &cache, &options).unwrap();

    assert_eq!(dataset.path().flips(), vec![false, true]);
    assert_eq!(dataset.path().segment_ids(), vec![1, 0]);
    let first = &dataset.path().segments()[0];
    assert_eq!(first.kpoint_indices().first(), Some(&10));
    let second = &dataset.path().segments()[1];
    assert_eq!(second.kpoint_indices().first(), Some(&10));
    assert_eq!(second.kpoint_indices().last(), Some(&0));
}

#[test]
fn custom_path_out_of_range_is_fatal() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(regular_dump());
    let cache = DerivedDataCache::disabled();
    let mut options = DatasetOptions::new(dir.path());
    options.custom_kpath = Some(CustomPathSpec::new(vec![1, -3]));
    let err = Dataset::load(&reader, None, &cache, &options).unwrap_err();
    assert!(matches!(
        err,
        BandError::Config(ConfigError::SegmentIndexOutOfRange { index: -3, segments: 2 })
    ));
}

#[test]
fn hybrid_dataset_keeps_only_band_structure_points() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(hybrid_dump());
    let cache = DerivedDataCache::disabled();
    let mut options = DatasetOptions::new(dir.path());
    options.projected = true;
    let dataset = Dataset::load(&reader, None, &cache, &options).unwrap();
    assert_eq!(dataset.kpoints().len(), 11);
    assert_eq!(dataset.path().len(), 1);
    assert_eq!(dataset.path().segments()[0].range, 0..11);
    assert_eq!(dataset.projections().unwrap().shape(), &[4, 11, 2, 9]);
}

#[test]
fn hybrid_projections_with_the_wrong_kpoint_count_are_rejected() {
    let dir = tempdir().unwrap();
    let mut dump = hybrid_dump();
    // 11 band-structure points only; the weights list all 15
    dump.projections = Some(positive_projections(4, 11, 1));
    let reader = MemoryReader::new(dump);
    let mut options = DatasetOptions::new(dir.path());
    options.projected = true;
    let err = Dataset::load(&reader, None, &DerivedDataCache::disabled(), &options).unwrap_err();
    assert!(matches!(
        err,
        BandError::Integrity(DataIntegrityError::ShapeMismatch(_))
    ));
}

#[test]
fn odd_hybrid_corner_count_keeps_complete_pairs() {
    let dir = tempdir().unwrap();
    let mut dump = hybrid_dump();
    // extend G -> X with X -> G: corners G, X, G
    for i in (0..10).rev() {
        dump.eigenvalues.kpoints.push([0.05 * i as f64, 0.0, 0.0]);
        dump.eigenvalues.kpoint_weights.push(0.0);
    }
    let nk = dump.eigenvalues.kpoints.len();
    dump.eigenvalues.channels = vec![super::_tests_fixtures::eigen_channel(nk, 4, 0.0)];
    dump.projections = None;
    let reader = MemoryReader::new(dump);
    let dataset = Dataset::load(
        &reader,
        None,
        &DerivedDataCache::disabled(),
        &DatasetOptions::new(dir.path()),
    )
    .unwrap();
    assert_eq!(dataset.kpoints().len(), 21);
    assert_eq!(dataset.path().len(), 1);
    assert_eq!(dataset.path().segments()[0].range, 0..11);
}

#[test]
fn unfolded_dataset_without_bands_cannot_align_projections() {
    let dir = tempdir().unwrap();
    let mut dump = regular_dump();
    dump.eigenvalues.channels = vec![super::_tests_fixtures::eigen_channel(21, 0, 0.0)];
    dump.projections = Some(positive_projections(0, 21, 1));
    let reader = MemoryReader::new(dump);
    let unfolder = LinearUnfolder::new(0, 21);
    let mut options = DatasetOptions::new(dir.path());
    options.unfold = Some(unfold_options());
    options.projected = true;
    let err = Dataset::load(&reader, Some(&unfolder), &DerivedDataCache::disabled(), &options)
        .unwrap_err();
    assert!(matches!(
        err,
        BandError::Integrity(DataIntegrityError::ShapeMismatch(_))
    ));
}

#[test]
fn unfolded_dataset_duplicates_leg_boundaries() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(regular_dump());
    let unfolder = LinearUnfolder::new(4, 21);
    let cache = DerivedDataCache::new();
    let mut options = DatasetOptions::new(dir.path());
    options.unfold = Some(unfold_options());
    options.projected = true;
    let dataset = Dataset::load(&reader, Some(&unfolder), &cache, &options).unwrap();

    assert!(dataset.is_unfolded());
    assert_eq!(dataset.eigenvalues().shape(), &[4, 12]);
    assert_eq!(dataset.kpoints()[5], dataset.kpoints()[6]);
    assert_eq!(dataset.path().segments()[1].range, 6..12);
    // column 6 repeats unfolder point 5
    assert!((dataset.eigenvalues()[[1, 6]] - (1.05 - FERMI)).abs() < 1e-12);
    assert_eq!(dataset.origin_k().unwrap()[[0, 11]], 10);
    assert_eq!(dataset.spectral_weights().unwrap()[[3, 3]], 0.5);
    let ticks = dataset.ticks();
    assert_eq!(ticks.len(), 3);
    assert_eq!(ticks[2].label, "M");

    let projections = dataset.projections().unwrap();
    assert_eq!(projections.shape(), &[4, 12, 2, 9]);

    // the cached spectral data serves a later load without an unfolder
    let again = Dataset::load(&reader, None, &DerivedDataCache::new(), &options).unwrap();
    assert_eq!(again.eigenvalues(), dataset.eigenvalues());
    assert_eq!(unfolder.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unfolding_without_unfolder_or_cache_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(regular_dump());
    let cache = DerivedDataCache::new();
    let mut options = DatasetOptions::new(dir.path());
    options.unfold = Some(unfold_options());
    let err = Dataset::load(&reader, None, &cache, &options).unwrap_err();
    assert!(matches!(err, BandError::Config(ConfigError::UnfolderUnavailable(_))));
}

#[test]
fn soc_axis_requires_spin_orbit_data() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(regular_dump());
    let cache = DerivedDataCache::disabled();
    let mut options = DatasetOptions::new(dir.path());
    options.soc_axis = Some(SocAxis::Z);
    let err = Dataset::load(&reader, None, &cache, &options).unwrap_err();
    assert!(matches!(
        err,
        BandError::Config(ConfigError::SpinAxisWithoutSpinOrbit(SocAxis::Z))
    ));
}

#[test]
fn spin_orbit_dataset_attaches_pseudo_spin_weights() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(spin_orbit_dump());
    let cache = DerivedDataCache::disabled();
    let mut options = DatasetOptions::new(dir.path());
    options.soc_axis = Some(SocAxis::X);
    options.spin = Spin::Down;
    let dataset = Dataset::load(&reader, None, &cache, &options).unwrap();
    let weights = dataset.spin_projections().unwrap();
    assert_eq!(weights.shape(), &[4, 21]);
    assert!(weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
    assert_eq!(weights[[0, 0]], 0.0);
}

#[test]
fn aggregator_requires_projections() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(regular_dump());
    let cache = DerivedDataCache::disabled();
    let dataset = Dataset::load(&reader, None, &cache, &DatasetOptions::new(dir.path())).unwrap();
    assert!(matches!(
        dataset.aggregator(),
        Err(BandError::Config(ConfigError::ProjectionsNotLoaded))
    ));

    let mut dataset = dataset;
    dataset.attach_projections(&reader, &cache).unwrap();
    let by_element = dataset.aggregator().unwrap().elements(&["Ga", "As"]).unwrap();
    assert_eq!(by_element.shape(), &[4, 21, 2]);
}

#[test]
fn regular_dataset_needs_a_line_mode_layout() {
    let dir = tempdir().unwrap();
    let mut dump = regular_dump();
    dump.kpoint_layout.line_mode = None;
    let reader = MemoryReader::new(dump);
    let cache = DerivedDataCache::disabled();
    let err = Dataset::load(&reader, None, &cache, &DatasetOptions::new(dir.path())).unwrap_err();
    assert!(matches!(err, BandError::Integrity(DataIntegrityError::MissingData(_))));
}

#[test]
fn invalid_stretch_is_rejected_up_front() {
    let dir = tempdir().unwrap();
    let reader = MemoryReader::new(regular_dump());
    let cache = DerivedDataCache::disabled();
    let mut options = DatasetOptions::new(dir.path());
    options.stretch_factor = 0.0;
    let err = Dataset::load(&reader, None, &cache, &options).unwrap_err();
    assert!(matches!(err, BandError::Config(ConfigError::InvalidOption(_))));
}
