//! Orbital/atom/element aggregation of projection weights.
//!
//! All aggregations operate on the canonical non-negative tensor
//! `[bands, kpoints, atoms, orbitals]`. The orbital axis follows the fixed
//! ordering s, py, pz, px, dxy, dyz, dz2, dxz, dx2-y2, then the seven f
//! orbitals when the structure contains lanthanides or actinides.

use std::fmt;
use std::ops::Range;

use ndarray::{
    s, stack, Array, Array2, Array3, Array4, ArrayView, ArrayView2, ArrayView3, ArrayView4, Axis,
    Dimension,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DataIntegrityError, Result};
use crate::reader::Structure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrbitalGroup {
    S,
    P,
    D,
    F,
}

impl OrbitalGroup {
    /// Contiguous block of the orbital axis covered by this group.
    pub fn range(self) -> Range<usize> {
        match self {
            OrbitalGroup::S => 0..1,
            OrbitalGroup::P => 1..4,
            OrbitalGroup::D => 4..9,
            OrbitalGroup::F => 9..16,
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            's' => Some(OrbitalGroup::S),
            'p' => Some(OrbitalGroup::P),
            'd' => Some(OrbitalGroup::D),
            'f' => Some(OrbitalGroup::F),
            _ => None,
        }
    }

    /// Parse a compact group string such as `"spd"`.
    pub fn parse_list(spec: &str) -> Result<Vec<Self>, ConfigError> {
        spec.chars()
            .map(|c| {
                Self::from_char(c).ok_or_else(|| {
                    ConfigError::InvalidOption(format!("'{c}' is not an orbital group (s, p, d, f)"))
                })
            })
            .collect()
    }
}

impl fmt::Display for OrbitalGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrbitalGroup::S => "s",
            OrbitalGroup::P => "p",
            OrbitalGroup::D => "d",
            OrbitalGroup::F => "f",
        };
        f.write_str(name)
    }
}

const ORBITAL_LABELS: [&str; 16] = [
    "s",
    "p_{y}",
    "p_{z}",
    "p_{x}",
    "d_{xy}",
    "d_{yz}",
    "d_{z^{2}}",
    "d_{xz}",
    "d_{x^{2}-y^{2}}",
    "f_{y^{3}x^{2}}",
    "f_{xyz}",
    "f_{yz^{2}}",
    "f_{z^{3}}",
    "f_{xz^{2}}",
    "f_{zx^{3}}",
    "f_{x^{3}}",
];

const SPD: [OrbitalGroup; 3] = [OrbitalGroup::S, OrbitalGroup::P, OrbitalGroup::D];
const SPDF: [OrbitalGroup; 4] = [
    OrbitalGroup::S,
    OrbitalGroup::P,
    OrbitalGroup::D,
    OrbitalGroup::F,
];

/// Orbital layout of one dataset, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrbitalTable {
    has_f: bool,
}

impl OrbitalTable {
    pub fn new(has_f: bool) -> Self {
        Self { has_f }
    }

    pub fn for_structure(structure: &Structure) -> Self {
        Self::new(structure.has_f_orbitals())
    }

    pub fn has_f(&self) -> bool {
        self.has_f
    }

    pub fn width(&self) -> usize {
        if self.has_f {
            16
        } else {
            9
        }
    }

    pub fn groups(&self) -> &'static [OrbitalGroup] {
        if self.has_f {
            &SPDF
        } else {
            &SPD
        }
    }

    pub fn label(&self, orbital: usize) -> Option<&'static str> {
        (orbital < self.width()).then(|| ORBITAL_LABELS[orbital])
    }

    pub fn check_orbital(&self, orbital: usize) -> Result<(), ConfigError> {
        if orbital < self.width() {
            Ok(())
        } else {
            Err(ConfigError::OrbitalOutOfRange {
                index: orbital,
                available: self.width(),
            })
        }
    }

    pub fn check_group(&self, group: OrbitalGroup) -> Result<(), ConfigError> {
        if group == OrbitalGroup::F && !self.has_f {
            Err(ConfigError::OrbitalGroupUnavailable(group))
        } else {
            Ok(())
        }
    }
}

/// Summation modes over a projection tensor.
pub struct ProjectionAggregator<'a> {
    weights: ArrayView4<'a, f64>,
    table: OrbitalTable,
    structure: &'a Structure,
}

impl<'a> ProjectionAggregator<'a> {
    pub fn new(
        weights: ArrayView4<'a, f64>,
        table: OrbitalTable,
        structure: &'a Structure,
    ) -> Result<Self, DataIntegrityError> {
        let shape = weights.shape();
        if shape[3] != table.width() {
            return Err(DataIntegrityError::ShapeMismatch(format!(
                "projection tensor has {} orbitals, structure expects {}",
                shape[3],
                table.width()
            )));
        }
        if shape[2] != structure.num_atoms() {
            return Err(DataIntegrityError::ShapeMismatch(format!(
                "projection tensor has {} atoms, structure declares {}",
                shape[2],
                structure.num_atoms()
            )));
        }
        Ok(Self {
            weights,
            table,
            structure,
        })
    }

    pub fn table(&self) -> OrbitalTable {
        self.table
    }

    fn num_atoms(&self) -> usize {
        self.weights.shape()[2]
    }

    fn check_atom(&self, atom: usize) -> Result<(), ConfigError> {
        if atom < self.num_atoms() {
            Ok(())
        } else {
            Err(ConfigError::AtomOutOfRange {
                index: atom,
                available: self.num_atoms(),
            })
        }
    }

    fn element_atoms(&self, element: &str) -> Result<Vec<usize>, ConfigError> {
        let atoms = self.structure.atom_indices_of(element);
        if atoms.is_empty() {
            Err(ConfigError::UnknownElement(element.to_string()))
        } else {
            Ok(atoms)
        }
    }

    /// `[bands, kpoints, orbitals]` summed over the given atoms.
    fn atoms_by_orbital(&self, atoms: &[usize]) -> Array3<f64> {
        let (bands, kpoints, _, orbitals) = self.weights.dim();
        let mut out = Array3::zeros((bands, kpoints, orbitals));
        for &atom in atoms {
            out += &self.weights.index_axis(Axis(2), atom);
        }
        out
    }

    /// Selected orbitals, summed over every atom.
    pub fn orbitals(&self, orbitals: &[usize]) -> Result<Array3<f64>, ConfigError> {
        for &orbital in orbitals {
            self.table.check_orbital(orbital)?;
        }
        let per_orbital = self.weights.sum_axis(Axis(2));
        Ok(per_orbital.select(Axis(2), orbitals))
    }

    /// s/p/d(/f) block totals, summed over every atom.
    pub fn spd(&self, groups: &[OrbitalGroup]) -> Result<Array3<f64>> {
        let per_orbital = self.weights.sum_axis(Axis(2));
        self.group_columns(per_orbital.view(), groups)
    }

    /// Selected atoms, summed over every orbital.
    pub fn atoms(&self, atoms: &[usize]) -> Result<Array3<f64>, ConfigError> {
        for &atom in atoms {
            self.check_atom(atom)?;
        }
        let per_atom = self.weights.sum_axis(Axis(3));
        Ok(per_atom.select(Axis(2), atoms))
    }

    /// `[bands, kpoints, atoms, groups]` keeping the block split per atom.
    pub fn atoms_spd(&self, atoms: &[usize]) -> Result<Array4<f64>, ConfigError> {
        for &atom in atoms {
            self.check_atom(atom)?;
        }
        let selected = self.weights.select(Axis(2), atoms);
        Ok(split_groups(selected.view(), self.table.groups()))
    }

    /// One column per (atom, orbital) pair, in request order.
    pub fn atom_orbitals(&self, pairs: &[(usize, usize)]) -> Result<Array3<f64>> {
        let mut columns = Vec::with_capacity(pairs.len());
        for &(atom, orbital) in pairs {
            self.check_atom(atom)?;
            self.table.check_orbital(orbital)?;
            columns.push(self.weights.slice(s![.., .., atom, orbital]).to_owned());
        }
        Ok(stack_columns(self.band_k_dims(), columns)?)
    }

    /// One column per (atom, group) pair, in request order.
    pub fn atom_groups(
        &self,
        pairs: &[(usize, OrbitalGroup)],
    ) -> Result<Array3<f64>> {
        let mut columns = Vec::with_capacity(pairs.len());
        for &(atom, group) in pairs {
            self.check_atom(atom)?;
            self.table.check_group(group)?;
            let block = self.weights.slice(s![.., .., atom, group.range()]);
            columns.push(block.sum_axis(Axis(2)));
        }
        Ok(stack_columns(self.band_k_dims(), columns)?)
    }

    /// `[bands, kpoints, elements, orbitals]`, each element summed over its atoms.
    pub fn element_orbital_table<S: AsRef<str>>(
        &self,
        elements: &[S],
    ) -> Result<Array4<f64>, ConfigError> {
        let (bands, kpoints, _, orbitals) = self.weights.dim();
        let mut out = Array4::zeros((bands, kpoints, elements.len(), orbitals));
        for (slot, element) in elements.iter().enumerate() {
            let atoms = self.element_atoms(element.as_ref())?;
            out.index_axis_mut(Axis(2), slot)
                .assign(&self.atoms_by_orbital(&atoms));
        }
        Ok(out)
    }

    /// Selected elements, summed over atoms and orbitals.
    pub fn elements<S: AsRef<str>>(&self, elements: &[S]) -> Result<Array3<f64>, ConfigError> {
        Ok(self.element_orbital_table(elements)?.sum_axis(Axis(3)))
    }

    /// `[bands, kpoints, elements, groups]`.
    pub fn element_spd<S: AsRef<str>>(&self, elements: &[S]) -> Result<Array4<f64>, ConfigError> {
        let table = self.element_orbital_table(elements)?;
        Ok(split_groups(table.view(), self.table.groups()))
    }

    /// One column per (element, orbital) pair, in request order.
    pub fn element_orbitals<S: AsRef<str>>(
        &self,
        pairs: &[(S, usize)],
    ) -> Result<Array3<f64>> {
        let mut columns = Vec::with_capacity(pairs.len());
        for (element, orbital) in pairs {
            self.table.check_orbital(*orbital)?;
            let atoms = self.element_atoms(element.as_ref())?;
            let summed = self.atoms_by_orbital(&atoms);
            columns.push(summed.index_axis(Axis(2), *orbital).to_owned());
        }
        Ok(stack_columns(self.band_k_dims(), columns)?)
    }

    /// One column per (element, group) pair, in request order.
    pub fn element_groups<S: AsRef<str>>(
        &self,
        pairs: &[(S, OrbitalGroup)],
    ) -> Result<Array3<f64>> {
        let mut columns = Vec::with_capacity(pairs.len());
        for (element, group) in pairs {
            self.table.check_group(*group)?;
            let atoms = self.element_atoms(element.as_ref())?;
            let summed = self.atoms_by_orbital(&atoms);
            columns.push(summed.slice(s![.., .., group.range()]).sum_axis(Axis(2)));
        }
        Ok(stack_columns(self.band_k_dims(), columns)?)
    }

    fn group_columns(
        &self,
        per_orbital: ArrayView3<'_, f64>,
        groups: &[OrbitalGroup],
    ) -> Result<Array3<f64>> {
        let mut columns = Vec::with_capacity(groups.len());
        for &group in groups {
            self.table.check_group(group)?;
            columns.push(per_orbital.slice(s![.., .., group.range()]).sum_axis(Axis(2)));
        }
        Ok(stack_columns(self.band_k_dims(), columns)?)
    }

    fn band_k_dims(&self) -> (usize, usize) {
        let (bands, kpoints, _, _) = self.weights.dim();
        (bands, kpoints)
    }
}

/// Sum the trailing orbital axis of `[b, k, n, orbitals]` into group blocks.
fn split_groups(weights: ArrayView4<'_, f64>, groups: &[OrbitalGroup]) -> Array4<f64> {
    let (bands, kpoints, n, _) = weights.dim();
    let mut out = Array4::zeros((bands, kpoints, n, groups.len()));
    for (slot, group) in groups.iter().enumerate() {
        let block = weights.slice(s![.., .., .., group.range()]).sum_axis(Axis(3));
        out.index_axis_mut(Axis(3), slot).assign(&block);
    }
    out
}

pub(crate) fn stack_columns(
    (bands, kpoints): (usize, usize),
    columns: Vec<Array2<f64>>,
) -> Result<Array3<f64>, DataIntegrityError> {
    if columns.is_empty() {
        return Ok(Array3::zeros((bands, kpoints, 0)));
    }
    let views: Vec<ArrayView2<'_, f64>> = columns.iter().map(|c| c.view()).collect();
    stack(Axis(2), &views).map_err(|e| {
        DataIntegrityError::ShapeMismatch(format!(
            "cannot stack {} projection columns over [{bands}, {kpoints}]: {e}",
            columns.len()
        ))
    })
}

/// Split a signed array into non-negative (up, down) halves.
///
/// Positive entries go to `up`, the magnitude of negative entries to `down`;
/// `up - down` reproduces the input exactly.
pub fn pseudo_spin_split<D: Dimension>(
    signed: ArrayView<'_, f64, D>,
) -> (Array<f64, D>, Array<f64, D>) {
    let up = signed.mapv(|v| if v > 0.0 { v } else { 0.0 });
    let down = signed.mapv(|v| if v < 0.0 { -v } else { 0.0 });
    (up, down)
}
