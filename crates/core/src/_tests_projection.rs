#![cfg(test)]

use ndarray::{array, s, Array2, Array4, Axis};

use super::error::{BandError, ConfigError, DataIntegrityError};
use super::lattice::Lattice;
use super::projection::{
    pseudo_spin_split, stack_columns, OrbitalGroup, OrbitalTable, ProjectionAggregator,
};
use super::reader::Structure;

fn ga2as() -> Structure {
    Structure {
        site_symbols: vec!["Ga".into(), "As".into()],
        atom_counts: vec![2, 1],
        lattice: Lattice::cubic(5.65),
    }
}

fn weights(orbitals: usize) -> Array4<f64> {
    Array4::from_shape_fn((2, 3, 3, orbitals), |(b, k, a, o)| {
        0.001 * ((b + 1) * 100 + (k + 1) * 10 + (a + 1)) as f64 * (o + 1) as f64
    })
}

fn close(a: &ndarray::ArrayD<f64>, b: &ndarray::ArrayD<f64>) -> bool {
    a.shape() == b.shape() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-12)
}

#[test]
fn orbital_table_follows_f_block_presence() {
    let table = OrbitalTable::for_structure(&ga2as());
    assert_eq!(table.width(), 9);
    assert_eq!(table.groups(), &[OrbitalGroup::S, OrbitalGroup::P, OrbitalGroup::D]);

    let mut cerium = ga2as();
    cerium.site_symbols[0] = "Ce".into();
    let table = OrbitalTable::for_structure(&cerium);
    assert_eq!(table.width(), 16);
    assert_eq!(table.groups().len(), 4);
    assert_eq!(table.label(12), Some("f_{z^{3}}"));
}

#[test]
fn group_blocks_partition_the_orbital_axis() {
    assert_eq!(OrbitalGroup::S.range(), 0..1);
    assert_eq!(OrbitalGroup::P.range(), 1..4);
    assert_eq!(OrbitalGroup::D.range(), 4..9);
    assert_eq!(OrbitalGroup::F.range(), 9..16);
    assert_eq!(
        OrbitalGroup::parse_list("spd").unwrap(),
        vec![OrbitalGroup::S, OrbitalGroup::P, OrbitalGroup::D]
    );
    assert!(OrbitalGroup::parse_list("sx").is_err());
}

#[test]
fn orbital_selection_sums_over_atoms() {
    let structure = ga2as();
    let w = weights(9);
    let agg = ProjectionAggregator::new(w.view(), OrbitalTable::new(false), &structure).unwrap();
    let out = agg.orbitals(&[3, 0]).unwrap();
    assert_eq!(out.shape(), &[2, 3, 2]);
    let expected = w.slice(s![1, 2, .., 3]).sum();
    assert!((out[[1, 2, 0]] - expected).abs() < 1e-12);
    let expected = w.slice(s![0, 1, .., 0]).sum();
    assert!((out[[0, 1, 1]] - expected).abs() < 1e-12);
}

#[test]
fn spd_blocks_add_up_to_the_total() {
    let structure = ga2as();
    let w = weights(9);
    let agg = ProjectionAggregator::new(w.view(), OrbitalTable::new(false), &structure).unwrap();
    let spd = agg.spd(&[OrbitalGroup::S, OrbitalGroup::P, OrbitalGroup::D]).unwrap();
    let total = w.sum_axis(Axis(3)).sum_axis(Axis(2));
    assert!(close(&spd.sum_axis(Axis(2)).into_dyn(), &total.into_dyn()));
}

#[test]
fn atoms_spd_keeps_the_block_split_per_atom() {
    let structure = ga2as();
    let w = weights(9);
    let agg = ProjectionAggregator::new(w.view(), OrbitalTable::new(false), &structure).unwrap();
    let split = agg.atoms_spd(&[2, 0]).unwrap();
    assert_eq!(split.shape(), &[2, 3, 2, 3]);
    let atoms = agg.atoms(&[2, 0]).unwrap();
    assert!(close(&split.sum_axis(Axis(3)).into_dyn(), &atoms.into_dyn()));
    let p_of_atom2 = w.slice(s![0, 0, 2, 1..4]).sum();
    assert!((split[[0, 0, 0, 1]] - p_of_atom2).abs() < 1e-12);
}

#[test]
fn element_totals_conserve_atom_weight() {
    let structure = ga2as();
    let w = weights(9);
    let agg = ProjectionAggregator::new(w.view(), OrbitalTable::new(false), &structure).unwrap();
    let by_element = agg.elements(&["Ga", "As"]).unwrap().sum_axis(Axis(2));
    let by_atom = agg.atoms(&[0, 1, 2]).unwrap().sum_axis(Axis(2));
    assert!(close(&by_element.into_dyn(), &by_atom.into_dyn()));

    let ga = agg.elements(&["Ga"]).unwrap();
    let atoms = agg.atoms(&[0, 1]).unwrap().sum_axis(Axis(2));
    assert!(close(&ga.index_axis(Axis(2), 0).to_owned().into_dyn(), &atoms.into_dyn()));
}

#[test]
fn element_spd_matches_element_group_pairs() {
    let structure = ga2as();
    let w = weights(9);
    let agg = ProjectionAggregator::new(w.view(), OrbitalTable::new(false), &structure).unwrap();
    let table = agg.element_spd(&["As", "Ga"]).unwrap();
    let pairs = agg
        .element_groups(&[("As", OrbitalGroup::D), ("Ga", OrbitalGroup::S)])
        .unwrap();
    assert!((table[[1, 1, 0, 2]] - pairs[[1, 1, 0]]).abs() < 1e-12);
    assert!((table[[1, 1, 1, 0]] - pairs[[1, 1, 1]]).abs() < 1e-12);

    let orbitals = agg.element_orbitals(&[("Ga", 4)]).unwrap();
    let expected = w.slice(s![0, 2, 0..2, 4]).sum();
    assert!((orbitals[[0, 2, 0]] - expected).abs() < 1e-12);
}

#[test]
fn pair_selections_keep_request_order() {
    let structure = ga2as();
    let w = weights(9);
    let agg = ProjectionAggregator::new(w.view(), OrbitalTable::new(false), &structure).unwrap();
    let out = agg.atom_orbitals(&[(2, 8), (0, 1)]).unwrap();
    assert_eq!(out.shape(), &[2, 3, 2]);
    assert_eq!(out[[1, 0, 0]], w[[1, 0, 2, 8]]);
    assert_eq!(out[[1, 0, 1]], w[[1, 0, 0, 1]]);

    let out = agg.atom_groups(&[(1, OrbitalGroup::P)]).unwrap();
    assert!((out[[0, 0, 0]] - w.slice(s![0, 0, 1, 1..4]).sum()).abs() < 1e-12);

    assert_eq!(agg.atom_orbitals(&[]).unwrap().shape(), &[2, 3, 0]);
}

#[test]
fn invalid_selectors_are_configuration_errors() {
    let structure = ga2as();
    let w = weights(9);
    let agg = ProjectionAggregator::new(w.view(), OrbitalTable::new(false), &structure).unwrap();
    assert!(matches!(
        agg.orbitals(&[9]),
        Err(ConfigError::OrbitalOutOfRange { index: 9, available: 9 })
    ));
    assert!(matches!(
        agg.spd(&[OrbitalGroup::F]),
        Err(BandError::Config(ConfigError::OrbitalGroupUnavailable(OrbitalGroup::F)))
    ));
    assert!(matches!(
        agg.atoms(&[3]),
        Err(ConfigError::AtomOutOfRange { index: 3, available: 3 })
    ));
    assert!(matches!(
        agg.elements(&["In"]),
        Err(ConfigError::UnknownElement(ref e)) if e == "In"
    ));
}

#[test]
fn tensor_width_must_match_the_table() {
    let structure = ga2as();
    let w = weights(16);
    assert!(ProjectionAggregator::new(w.view(), OrbitalTable::new(false), &structure).is_err());
    assert!(ProjectionAggregator::new(w.view(), OrbitalTable::new(true), &structure).is_ok());
}

#[test]
fn pseudo_spin_split_reconstructs_the_signed_array() {
    let signed = array![[0.4, -0.2, 0.0], [-1.5, 0.3, -0.01]];
    let (up, down) = pseudo_spin_split(signed.view());
    assert!(up.iter().all(|&v| v >= 0.0));
    assert!(down.iter().all(|&v| v >= 0.0));
    assert_eq!(&up - &down, signed);
    assert_eq!(up[[0, 1]], 0.0);
    assert_eq!(down[[1, 0]], 1.5);
}

#[test]
fn mismatched_columns_are_a_shape_error() {
    let columns = vec![Array2::<f64>::zeros((2, 3)), Array2::<f64>::zeros((2, 4))];
    assert!(matches!(
        stack_columns((2, 3), columns),
        Err(DataIntegrityError::ShapeMismatch(_))
    ));
    let empty = stack_columns((2, 3), Vec::new()).unwrap();
    assert_eq!(empty.shape(), &[2, 3, 0]);
}
