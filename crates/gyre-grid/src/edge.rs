//! Lateral boundary and coordinate-system choices.

use serde::{Deserialize, Serialize};

/// How the grid closes in the zonal direction.
///
/// The meridional direction is always closed: the northern and southern
/// halo rows are land.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZonalBoundary {
    /// Halo columns are land.
    #[default]
    Closed,
    /// The eastern edge wraps onto the western edge (re-entrant channel or
    /// global ocean).
    Cyclic,
}

/// Horizontal coordinate system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSystem {
    /// Spacings in metres, no metric terms.
    #[default]
    Cartesian,
    /// Spacings in degrees; zonal spacings scale with cos(latitude).
    Spherical,
}
