//! Band-structure reconstruction: normalized eigenvalue, projection, and
//! unfolding data along a resolvable k-path.

pub mod adapter;
pub mod bandstructure;
pub mod cache;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod interpolate;
pub mod io;
pub mod kpath;
pub mod lattice;
pub mod projection;
pub mod reader;
pub mod spin;

pub use error::{BandError, ConfigError, DataIntegrityError, Result};


#[cfg(test)]
mod _tests_adapter;
#[cfg(test)]
mod _tests_dataset;
#[cfg(test)]
mod _tests_projection;
