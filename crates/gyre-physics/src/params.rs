//! Physical and numerical parameters of the stages.
//!
//! Every struct deserializes with `#[serde(default)]`, so a configuration
//! file only lists the values it changes. Defaults are the conventional
//! values of the model family this code follows: everything optional is
//! switched off and all coefficients are zero unless a closure needs a
//! calibrated constant.

use serde::{Deserialize, Serialize};

use crate::eos::EquationOfState;

const DAY: f64 = 86400.0;

/// Flux reconstruction for advection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvectionScheme {
    /// Second-order centred fluxes.
    #[default]
    Centered,
    /// Flux-limited scheme with the superbee limiter.
    Superbee,
}

/// Momentum equation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumParams {
    /// Include Coriolis and metric terms.
    pub coriolis: bool,
    /// Momentum advection scheme, `None` to drop the term.
    pub advection: Option<AdvectionScheme>,
    /// Harmonic lateral viscosity, m^2/s.
    pub a_h: f64,
    /// Biharmonic lateral viscosity, m^4/s.
    pub a_hbi: f64,
    /// Scale `a_h` with `cos(latitude)^hor_friction_cos_power`.
    pub hor_friction_cos_scaling: bool,
    /// Exponent of the cosine scaling.
    pub hor_friction_cos_power: i32,
    /// Solve vertical friction implicitly.
    pub implicit_vert_friction: bool,
    /// Apply vertical friction explicitly (ignored when implicit is on).
    pub explicit_vert_friction: bool,
    /// Vertical viscosity without a turbulence closure, m^2/s.
    pub kappa_m_0: f64,
    /// Rayleigh damping rate, 1/s.
    pub r_ray: f64,
    /// Linear bottom drag, m/s.
    pub r_bot: f64,
    /// Quadratic bottom drag coefficient.
    pub r_quad_bot: f64,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            coriolis: true,
            advection: Some(AdvectionScheme::Centered),
            a_h: 0.0,
            a_hbi: 0.0,
            hor_friction_cos_scaling: false,
            hor_friction_cos_power: 3,
            implicit_vert_friction: false,
            explicit_vert_friction: false,
            kappa_m_0: 0.0,
            r_ray: 0.0,
            r_bot: 0.0,
            r_quad_bot: 0.0,
        }
    }
}

/// External-mode and non-hydrostatic pressure solves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Relative residual at which the barotropic solve stops.
    pub congr_epsilon: f64,
    /// Iteration cap of the barotropic solve.
    pub congr_max_iterations: usize,
    /// Implicit free surface instead of a rigid lid.
    pub free_surface: bool,
    /// Solve for a non-hydrostatic pressure after the barotropic step.
    pub non_hydrostatic: bool,
    /// Relative residual of the non-hydrostatic solve.
    pub congr_epsilon_non_hydro: f64,
    /// Iteration cap of the non-hydrostatic solve.
    pub congr_max_iterations_non_hydro: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            congr_epsilon: 1e-12,
            congr_max_iterations: 1000,
            free_surface: false,
            non_hydrostatic: false,
            congr_epsilon_non_hydro: 1e-12,
            congr_max_iterations_non_hydro: 1000,
        }
    }
}

/// Temperature and salinity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerParams {
    /// Advection scheme.
    pub advection: AdvectionScheme,
    /// Harmonic lateral diffusivity, m^2/s.
    pub k_h: f64,
    /// Biharmonic lateral diffusivity, m^4/s.
    pub k_hbi: f64,
    /// Vertical diffusivity without a closure, m^2/s.
    pub kappa_h_0: f64,
    /// Equation of state.
    pub eos: EquationOfState,
}

/// Isoneutral (Redi) and skew (GM) diffusion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsoneutralParams {
    /// Diffuse along neutral surfaces.
    pub enabled: bool,
    /// Add the GM skew flux.
    pub skew_diffusion: bool,
    /// Isoneutral diffusivity without EKE, m^2/s.
    pub k_iso_0: f64,
    /// Extra lateral diffusivity where slopes are tapered, m^2/s.
    pub k_iso_steep: f64,
    /// GM diffusivity without EKE, m^2/s.
    pub k_gm_0: f64,
    /// Critical slope of the taper.
    pub iso_slopec: f64,
    /// Width of the taper.
    pub iso_dslope: f64,
}

impl Default for IsoneutralParams {
    fn default() -> Self {
        Self {
            enabled: false,
            skew_diffusion: false,
            k_iso_0: 0.0,
            k_iso_steep: 0.0,
            k_gm_0: 0.0,
            iso_slopec: 1e-3,
            iso_dslope: 8e-4,
        }
    }
}

/// Turbulent kinetic energy closure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TkeParams {
    /// Run the closure.
    pub enabled: bool,
    /// Viscosity coefficient.
    pub c_k: f64,
    /// Dissipation coefficient.
    pub c_eps: f64,
    /// Vertical diffusivity of TKE relative to `kappaM`.
    pub alpha_tke: f64,
    /// Lower bound of the mixing length, m.
    pub mxl_min: f64,
    /// Lower bound of `kappaM`.
    pub kappa_m_min: f64,
    /// Upper bound of `kappaM`.
    pub kappa_m_max: f64,
    /// Derive the Prandtl number from the Richardson number.
    pub richardson_prandtl: bool,
    /// Prandtl number when not derived, also used for Osborn viscosity.
    pub prandtl_number: f64,
    /// Advection of TKE on the W grid.
    pub advection: Option<AdvectionScheme>,
    /// Send bottom and Rayleigh drag losses to TKE instead of IDEMIX.
    pub store_bottom_friction: bool,
}

impl Default for TkeParams {
    fn default() -> Self {
        Self {
            enabled: false,
            c_k: 0.1,
            c_eps: 0.7,
            alpha_tke: 1.0,
            mxl_min: 1e-12,
            kappa_m_min: 0.0,
            kappa_m_max: 100.0,
            richardson_prandtl: true,
            prandtl_number: 10.0,
            advection: None,
            store_bottom_friction: false,
        }
    }
}

/// Mesoscale eddy kinetic energy closure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EkeParams {
    /// Run the closure.
    pub enabled: bool,
    /// Diffusivity coefficient.
    pub c_k: f64,
    /// Dissipation coefficient.
    pub c_eps: f64,
    /// Minimum eddy length scale, m.
    pub lmin: f64,
    /// Upper bound of `K_gm`, m^2/s.
    pub k_max: f64,
    /// Weight of the Rossby radius in the length scale.
    pub cross: f64,
    /// Weight of the Rhines scale in the length scale.
    pub crhin: f64,
    /// Bottom drag of EKE, m/s.
    pub r_bot: f64,
    /// Use `K_gm` for isoneutral diffusion too.
    pub isopycnal_diffusion: bool,
    /// Lee-wave sink over rough topography, feeding IDEMIX.
    pub leewave_dissipation: bool,
    /// Lee-wave drag coefficient.
    pub c_lee0: f64,
    /// Share of EKE dissipation handed to internal waves when IDEMIX runs;
    /// the rest goes to TKE.
    pub diss_iw_fraction: f64,
    /// Vertical diffusivity of EKE relative to `kappaM`.
    pub alpha_eke: f64,
    /// Advection of EKE on the W grid.
    pub advection: Option<AdvectionScheme>,
}

impl Default for EkeParams {
    fn default() -> Self {
        Self {
            enabled: false,
            c_k: 1.0,
            c_eps: 1.0,
            lmin: 100.0,
            k_max: 1e4,
            cross: 1.0,
            crhin: 1.0,
            r_bot: 0.0,
            isopycnal_diffusion: false,
            leewave_dissipation: false,
            c_lee0: 1.0,
            diss_iw_fraction: 1.0,
            alpha_eke: 1.0,
            advection: None,
        }
    }
}

/// Internal-wave energy closure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdemixParams {
    /// Run the closure.
    pub enabled: bool,
    /// Vertical symmetrisation time scale, s.
    pub tau_v: f64,
    /// Horizontal symmetrisation time scale, s.
    pub tau_h: f64,
    /// Group-speed scaling.
    pub gamma: f64,
    /// Spectral bandwidth in modes.
    pub jstar: f64,
    /// Dissipation parameter.
    pub mu0: f64,
    /// Horizontal symmetrisation.
    pub hor_diffusion: bool,
    /// Advection of internal-wave energy on the W grid.
    pub advection: Option<AdvectionScheme>,
    /// Integrate the M2 and near-inertial bands.
    pub wave_bands: bool,
    /// Decay time of the M2 band into the wave field, s.
    pub tau_m2: f64,
    /// Decay time of the near-inertial band, s.
    pub tau_niw: f64,
}

impl Default for IdemixParams {
    fn default() -> Self {
        Self {
            enabled: false,
            tau_v: DAY,
            tau_h: 15.0 * DAY,
            gamma: 1.57,
            jstar: 10.0,
            mu0: 4.0 / 3.0,
            hor_diffusion: false,
            advection: None,
            wave_bands: false,
            tau_m2: 10.0 * DAY,
            tau_niw: 5.0 * DAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_off_by_default() {
        assert!(!TkeParams::default().enabled);
        assert!(!EkeParams::default().enabled);
        assert!(!IdemixParams::default().enabled);
        assert!(!IsoneutralParams::default().enabled);
    }

    #[test]
    fn calibrated_constants() {
        let t = TkeParams::default();
        assert_eq!((t.c_k, t.c_eps, t.kappa_m_max), (0.1, 0.7, 100.0));
        let i = IdemixParams::default();
        assert_eq!(i.tau_v, 86400.0);
        assert_eq!(i.tau_h, 15.0 * 86400.0);
        assert_eq!(SolverParams::default().congr_max_iterations, 1000);
    }
}
