//! Surface forcing supplied by an external provider each step.

use crate::error::ForcingError;

/// Per-column surface fluxes for one model time.
///
/// All arrays are horizontal (one value per column including halo cells).
/// Wind stress is kinematic (N/m^2 divided by the reference density).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceForcing {
    /// Zonal wind stress at u points, m^2/s^2.
    pub taux: Vec<f64>,
    /// Meridional wind stress at v points, m^2/s^2.
    pub tauy: Vec<f64>,
    /// Surface temperature flux, K m/s (positive warms the ocean).
    pub temp_flux: Vec<f64>,
    /// Surface salinity flux, g/kg m/s.
    pub salt_flux: Vec<f64>,
    /// Internal-wave energy flux into the bottom cell, m^3/s^3.
    pub iw_bottom: Vec<f64>,
    /// Internal-wave energy flux into the surface cell, m^3/s^3.
    pub iw_surface: Vec<f64>,
    /// Energy input into the M2 tidal band, m^3/s^3.
    pub m2: Vec<f64>,
    /// Energy input into the near-inertial band, m^3/s^3.
    pub niw: Vec<f64>,
}

impl SurfaceForcing {
    /// Forcing that is zero everywhere.
    pub fn zeros(columns: usize) -> Self {
        let z = vec![0.0; columns];
        Self {
            taux: z.clone(),
            tauy: z.clone(),
            temp_flux: z.clone(),
            salt_flux: z.clone(),
            iw_bottom: z.clone(),
            iw_surface: z.clone(),
            m2: z.clone(),
            niw: z,
        }
    }

    /// Named views of every array, for validation.
    pub fn arrays(&self) -> [(&'static str, &[f64]); 8] {
        [
            ("taux", self.taux.as_slice()),
            ("tauy", self.tauy.as_slice()),
            ("temp_flux", self.temp_flux.as_slice()),
            ("salt_flux", self.salt_flux.as_slice()),
            ("iw_bottom", self.iw_bottom.as_slice()),
            ("iw_surface", self.iw_surface.as_slice()),
            ("m2", self.m2.as_slice()),
            ("niw", self.niw.as_slice()),
        ]
    }

    /// Check every array has `columns` finite entries.
    pub fn validate(&self, columns: usize) -> Result<(), ForcingError> {
        for (field, data) in self.arrays() {
            if data.len() != columns {
                return Err(ForcingError::InvalidShape {
                    field,
                    expected: columns,
                    actual: data.len(),
                });
            }
            if let Some(index) = data.iter().position(|v| !v.is_finite()) {
                return Err(ForcingError::NonFinite { field, index });
            }
        }
        Ok(())
    }
}

/// Supplies surface forcing keyed by model time.
///
/// Implementations must return values for exactly the requested time or
/// signal [`ForcingError::Unavailable`]; the model never substitutes a
/// default. `columns` is the number of horizontal cells including halo,
/// which every returned array must match.
pub trait ForcingProvider {
    /// Forcing at model time `time` (seconds since the start of the run).
    fn forcing(&self, time: f64, columns: usize) -> Result<SurfaceForcing, ForcingError>;
}

impl<F> ForcingProvider for F
where
    F: Fn(f64, usize) -> Result<SurfaceForcing, ForcingError>,
{
    fn forcing(&self, time: f64, columns: usize) -> Result<SurfaceForcing, ForcingError> {
        self(time, columns)
    }
}

/// Zero forcing at every time.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoForcing;

impl ForcingProvider for NoForcing {
    fn forcing(&self, _time: f64, columns: usize) -> Result<SurfaceForcing, ForcingError> {
        Ok(SurfaceForcing::zeros(columns))
    }
}

/// The same forcing at every time.
#[derive(Clone, Debug)]
pub struct SteadyForcing {
    fields: SurfaceForcing,
}

impl SteadyForcing {
    /// Wrap a fixed set of fluxes.
    pub fn new(fields: SurfaceForcing) -> Self {
        Self { fields }
    }

    /// The wrapped fluxes.
    pub fn fields(&self) -> &SurfaceForcing {
        &self.fields
    }
}

impl ForcingProvider for SteadyForcing {
    fn forcing(&self, _time: f64, columns: usize) -> Result<SurfaceForcing, ForcingError> {
        self.fields.validate(columns)?;
        Ok(self.fields.clone())
    }
}
