//! Equation of state for seawater.
//!
//! A quadratic fit around `T = 10 °C`, `S = 35 g/kg` in the form of
//! Roquet et al. (2015). The nonlinear variants add cabbeling and the
//! thermobaric pressure dependence on top of the linear core. Densities
//! are anomalies relative to the reference density.

use gyre_core::constants::{GRAV, RHO_0};
use gyre_grid::Grid;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const T_REF: f64 = 10.0;
const S_REF: f64 = 35.0;

/// Selectable equation-of-state forms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquationOfState {
    /// Constant thermal expansion and haline contraction.
    #[default]
    Linear,
    /// Cabbeling terms, no pressure dependence.
    NonlinearNoCompression,
    /// Cabbeling and thermobaric compressibility.
    Nonlinear,
}

#[derive(Clone, Copy)]
struct Coefficients {
    a0: f64,
    b0: f64,
    lambda1: f64,
    lambda2: f64,
    mu1: f64,
    mu2: f64,
    nu: f64,
}

impl EquationOfState {
    fn coefficients(self) -> Coefficients {
        let linear = Coefficients {
            a0: 0.1655,
            b0: 0.76554,
            lambda1: 0.0,
            lambda2: 0.0,
            mu1: 0.0,
            mu2: 0.0,
            nu: 0.0,
        };
        match self {
            Self::Linear => linear,
            Self::NonlinearNoCompression => Coefficients {
                lambda1: 0.05952,
                lambda2: 5.4914e-4,
                nu: 0.0024341,
                ..linear
            },
            Self::Nonlinear => Coefficients {
                lambda1: 0.05952,
                lambda2: 5.4914e-4,
                mu1: 1.497e-4,
                mu2: 1.109e-5,
                nu: 0.0024341,
                ..linear
            },
        }
    }

    /// Whether density depends on pressure.
    pub fn is_compressible(self) -> bool {
        self == Self::Nonlinear
    }

    /// Density anomaly in kg/m^3 at positive `depth` in metres.
    pub fn density(self, temp: f64, salt: f64, depth: f64) -> f64 {
        let c = self.coefficients();
        let (ta, sa) = (temp - T_REF, salt - S_REF);
        -c.a0 * (1.0 + 0.5 * c.lambda1 * ta + c.mu1 * depth) * ta
            + c.b0 * (1.0 - 0.5 * c.lambda2 * sa - c.mu2 * depth) * sa
            - c.nu * ta * sa
    }

    /// `∂ρ/∂T` at constant salinity and depth.
    pub fn drho_dt(self, temp: f64, salt: f64, depth: f64) -> f64 {
        let c = self.coefficients();
        let (ta, sa) = (temp - T_REF, salt - S_REF);
        -c.a0 * (1.0 + c.lambda1 * ta + c.mu1 * depth) - c.nu * sa
    }

    /// `∂ρ/∂S` at constant temperature and depth.
    pub fn drho_ds(self, temp: f64, salt: f64, depth: f64) -> f64 {
        let c = self.coefficients();
        let (ta, sa) = (temp - T_REF, salt - S_REF);
        c.b0 * (1.0 - c.lambda2 * sa - c.mu2 * depth) - c.nu * ta
    }

    /// Dynamic enthalpy `g/ρ0 ∫₀^depth ρ dz'` at fixed temperature and
    /// salinity, m^2/s^2.
    pub fn dynamic_enthalpy(self, temp: f64, salt: f64, depth: f64) -> f64 {
        let c = self.coefficients();
        let (ta, sa) = (temp - T_REF, salt - S_REF);
        let z = depth;
        let integral = -c.a0 * (1.0 + 0.5 * c.lambda1 * ta) * ta * z
            - 0.5 * c.a0 * c.mu1 * ta * z * z
            + c.b0 * (1.0 - 0.5 * c.lambda2 * sa) * sa * z
            - 0.5 * c.b0 * c.mu2 * sa * z * z
            - c.nu * ta * sa * z;
        GRAV / RHO_0 * integral
    }

    /// Density anomaly on T cells and `Nsqr` on W cells from one time level
    /// of temperature and salinity. Land cells are zero.
    pub fn diagnose(
        self,
        grid: &Grid,
        temp: &[f64],
        salt: &[f64],
        rho: &mut [f64],
        nsqr: &mut [f64],
    ) {
        let nz = grid.shape().nz;
        let top = nz - 1;
        rho.par_iter_mut().enumerate().for_each(|(c, r)| {
            *r = self.density(temp[c], salt[c], -grid.zt[c % nz]) * grid.mask_t[c];
        });
        nsqr.par_chunks_mut(nz).enumerate().for_each(|(col, n2)| {
            n2.fill(0.0);
            let base = col * nz;
            for k in 0..top {
                let c = base + k;
                if grid.mask_w[c] == 0.0 || grid.mask_t[c + 1] == 0.0 {
                    continue;
                }
                let p = -grid.zw[k];
                let upper = self.density(temp[c + 1], salt[c + 1], p);
                let lower = self.density(temp[c], salt[c], p);
                n2[k] = -GRAV / RHO_0 * (upper - lower) / grid.dzw[k];
            }
            if top > 0 {
                n2[top] = n2[top - 1] * grid.mask_w[base + top];
            }
        });
    }
}
