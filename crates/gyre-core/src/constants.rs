//! Physical constants shared by the solvers.

/// Earth radius in metres.
pub const RADIUS: f64 = 6370.0e3;

/// Earth rotation rate in 1/s.
pub const OMEGA: f64 = std::f64::consts::PI / 43082.0;

/// Reference density in kg/m^3.
pub const RHO_0: f64 = 1024.0;

/// Gravitational acceleration in m/s^2.
pub const GRAV: f64 = 9.81;

/// Metres per degree of arc on the model sphere.
pub const DEG_TO_M: f64 = RADIUS / 180.0 * std::f64::consts::PI;

/// Small number guarding divisions by vanishing stratification or energy.
pub const EPSLN: f64 = 1.0e-20;
