//! Spin channel and spin-orbit axis markers.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Spin {
    #[default]
    Up,
    Down,
}

impl Spin {
    /// Index of this channel in a two-channel (collinear) array.
    pub fn channel(self) -> usize {
        match self {
            Spin::Up => 0,
            Spin::Down => 1,
        }
    }
}

impl fmt::Display for Spin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Spin::Up => write!(f, "up"),
            Spin::Down => write!(f, "down"),
        }
    }
}

/// Magnetization axis used to split spin-orbit states into pseudo-spins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocAxis {
    X,
    Y,
    Z,
}

impl SocAxis {
    /// Channel index in a spin-orbit projection array laid out as (total, x, y, z).
    pub fn channel(self) -> usize {
        match self {
            SocAxis::X => 1,
            SocAxis::Y => 2,
            SocAxis::Z => 3,
        }
    }
}

impl fmt::Display for SocAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocAxis::X => write!(f, "x"),
            SocAxis::Y => write!(f, "y"),
            SocAxis::Z => write!(f, "z"),
        }
    }
}
