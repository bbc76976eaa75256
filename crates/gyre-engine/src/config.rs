//! Model configuration, validation, and pipeline assembly.
//!
//! [`ModelConfig`] is the complete, immutable description of a run. It
//! deserializes with `#[serde(default)]` at every level, so a parameter
//! file only names what it changes. [`ModelConfig::validate`] rejects
//! inconsistent settings before any state is allocated.

use std::error::Error;
use std::fmt;

use gyre_core::constants::EPSLN;
use gyre_grid::{Grid, GridError, Shape};
use gyre_physics::{
    BoundaryExchange, ClosureMixing, EkeParams, EkeStage, EquationOfState, ForcingStage,
    IdemixParams, IdemixStage, IsoneutralParams, MomentumParams, MomentumStage, SolverParams,
    TkeParams, TkeStage, TracerParams, TracerStage, WGridStage,
};
use gyre_stage::{PipelineError, Stage};
use gyre_state::Allocation;
use serde::{Deserialize, Serialize};

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating a [`ModelConfig`] or building a
/// [`Model`](crate::Model) from it.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// Stage pipeline validation failed.
    Pipeline(PipelineError),
    /// The grid failed its mask-consistency check.
    Grid(GridError),
    /// `dt` is zero, negative or non-finite.
    InvalidTimeStep {
        /// The configured value.
        value: f64,
    },
    /// `ab_eps` is outside the open interval (0, 1).
    AbEpsOutOfRange {
        /// The configured value.
        value: f64,
    },
    /// A fraction is outside [0, 1].
    FractionOutOfRange {
        /// Parameter name.
        name: &'static str,
        /// The configured value.
        value: f64,
    },
    /// A coefficient that must be non-negative is negative or non-finite.
    NegativeCoefficient {
        /// Parameter name.
        name: &'static str,
        /// The configured value.
        value: f64,
    },
    /// Solver tolerances or iteration caps are unusable.
    InvalidSolver {
        /// What is wrong.
        reason: String,
    },
    /// The TKE closure needs the implicit vertical friction solve.
    TkeRequiresImplicitFriction,
    /// A supplied state was allocated for a different grid.
    ShapeMismatch {
        /// Shape of the grid.
        expected: Shape,
        /// Shape of the state.
        actual: Shape,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline(e) => write!(f, "pipeline: {e}"),
            Self::Grid(e) => write!(f, "grid: {e}"),
            Self::InvalidTimeStep { value } => {
                write!(f, "dt must be finite and positive, got {value}")
            }
            Self::AbEpsOutOfRange { value } => {
                write!(f, "ab_eps must lie in (0, 1), got {value}")
            }
            Self::FractionOutOfRange { name, value } => {
                write!(f, "{name} must lie in [0, 1], got {value}")
            }
            Self::NegativeCoefficient { name, value } => {
                write!(f, "{name} must be finite and non-negative, got {value}")
            }
            Self::InvalidSolver { reason } => write!(f, "solver: {reason}"),
            Self::TkeRequiresImplicitFriction => write!(
                f,
                "the TKE closure requires implicit vertical friction \
                 (momentum.implicit_vert_friction = true)"
            ),
            Self::ShapeMismatch { expected, actual } => write!(
                f,
                "state shape {}x{}x{} does not match grid shape {}x{}x{}",
                actual.nx, actual.ny, actual.nz, expected.nx, expected.ny, expected.nz,
            ),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Pipeline(e) => Some(e),
            Self::Grid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PipelineError> for ConfigError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

impl From<GridError> for ConfigError {
    fn from(e: GridError) -> Self {
        Self::Grid(e)
    }
}

// ── ModelConfig ────────────────────────────────────────────────────

/// Everything needed to assemble a [`Model`](crate::Model) apart from the
/// grid and the forcing provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Time step for momentum and tracers, s.
    pub dt: f64,
    /// Adams-Bashforth off-centering.
    pub ab_eps: f64,
    /// Momentum equation.
    pub momentum: MomentumParams,
    /// Barotropic and non-hydrostatic solves.
    pub solver: SolverParams,
    /// Temperature, salinity and the equation of state.
    pub tracer: TracerParams,
    /// Isoneutral and skew diffusion.
    pub isoneutral: IsoneutralParams,
    /// Turbulent kinetic energy closure.
    pub tke: TkeParams,
    /// Eddy kinetic energy closure.
    pub eke: EkeParams,
    /// Internal-wave energy closure.
    pub idemix: IdemixParams,
    /// Check the closure transfer ledger after every step.
    pub enable_conserve_energy: bool,
    /// Relative imbalance tolerated on a ledger route.
    pub conserve_tolerance: f64,
    /// Scan every written field for NaN or infinity after each stage.
    pub check_finite: bool,
    /// Steps between output frames; 0 disables output.
    pub output_interval: u64,
    /// Steps between tracer-monitor and energy diagnostics; 0 disables them.
    pub diagnostics_interval: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dt: 3600.0,
            ab_eps: 0.1,
            momentum: MomentumParams::default(),
            solver: SolverParams::default(),
            tracer: TracerParams::default(),
            isoneutral: IsoneutralParams::default(),
            tke: TkeParams::default(),
            eke: EkeParams::default(),
            idemix: IdemixParams::default(),
            enable_conserve_energy: false,
            conserve_tolerance: 1e-9,
            check_finite: true,
            output_interval: 0,
            diagnostics_interval: 0,
        }
    }
}

impl ModelConfig {
    /// Every closure switched on, with the constants of the global
    /// one-degree setup: isoneutral and GM mixing, TKE with implicit
    /// friction, EKE with isopycnal diffusion and IDEMIX with horizontal
    /// symmetrisation, all closure energies advected with superbee.
    pub fn global_closures() -> Self {
        use gyre_physics::AdvectionScheme::Superbee;
        Self {
            dt: 1800.0,
            momentum: MomentumParams {
                a_h: 5e4,
                hor_friction_cos_scaling: true,
                hor_friction_cos_power: 1,
                implicit_vert_friction: true,
                ..MomentumParams::default()
            },
            solver: SolverParams {
                congr_epsilon: 1e-6,
                congr_max_iterations: 10_000,
                ..SolverParams::default()
            },
            tracer: TracerParams {
                eos: EquationOfState::Nonlinear,
                ..TracerParams::default()
            },
            isoneutral: IsoneutralParams {
                enabled: true,
                skew_diffusion: true,
                k_iso_0: 1000.0,
                k_iso_steep: 50.0,
                iso_slopec: 0.005,
                iso_dslope: 0.005,
                ..IsoneutralParams::default()
            },
            tke: TkeParams {
                enabled: true,
                c_k: 0.1,
                c_eps: 0.7,
                alpha_tke: 30.0,
                mxl_min: 1e-8,
                advection: Some(Superbee),
                ..TkeParams::default()
            },
            eke: EkeParams {
                enabled: true,
                k_max: 1e4,
                c_k: 0.4,
                c_eps: 0.5,
                cross: 2.0,
                crhin: 1.0,
                lmin: 100.0,
                isopycnal_diffusion: true,
                advection: Some(Superbee),
                ..EkeParams::default()
            },
            idemix: IdemixParams {
                enabled: true,
                hor_diffusion: true,
                advection: Some(Superbee),
                ..IdemixParams::default()
            },
            ..Self::default()
        }
    }

    /// Whether any energy closure runs.
    pub fn closures_enabled(&self) -> bool {
        self.tke.enabled || self.eke.enabled || self.idemix.enabled
    }

    /// Which optional field groups the state needs.
    pub fn allocation(&self) -> Allocation {
        Allocation {
            tke: self.tke.enabled,
            eke: self.eke.enabled,
            idemix: self.idemix.enabled,
            wave_bands: self.idemix.enabled && self.idemix.wave_bands,
            isoneutral: self.isoneutral.enabled,
            wgrid: self.closures_enabled(),
            non_hydrostatic: self.solver.non_hydrostatic,
        }
    }

    /// Check the configuration for internal consistency.
    ///
    /// Grid-dependent checks (mask consistency, state shape, pipeline
    /// ownership) happen when the model is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. Time stepping.
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(ConfigError::InvalidTimeStep { value: self.dt });
        }
        if !(self.ab_eps > 0.0 && self.ab_eps < 1.0) {
            return Err(ConfigError::AbEpsOutOfRange { value: self.ab_eps });
        }
        // 2. Closure coupling.
        if self.tke.enabled && !self.momentum.implicit_vert_friction {
            return Err(ConfigError::TkeRequiresImplicitFriction);
        }
        fraction("eke.diss_iw_fraction", self.eke.diss_iw_fraction)?;
        // 3. Solvers.
        let s = &self.solver;
        for (name, eps, max) in [
            ("barotropic", s.congr_epsilon, s.congr_max_iterations),
            (
                "non-hydrostatic",
                s.congr_epsilon_non_hydro,
                s.congr_max_iterations_non_hydro,
            ),
        ] {
            if !eps.is_finite() || eps <= 0.0 {
                return Err(ConfigError::InvalidSolver {
                    reason: format!("{name} tolerance must be positive, got {eps}"),
                });
            }
            if max == 0 {
                return Err(ConfigError::InvalidSolver {
                    reason: format!("{name} iteration cap must be at least 1"),
                });
            }
        }
        // 4. Coefficients.
        for (name, value) in self.coefficients() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeCoefficient { name, value });
            }
        }
        if self.tke.kappa_m_min > self.tke.kappa_m_max {
            return Err(ConfigError::NegativeCoefficient {
                name: "tke.kappa_m_max - tke.kappa_m_min",
                value: self.tke.kappa_m_max - self.tke.kappa_m_min,
            });
        }
        Ok(())
    }

    /// Named coefficients that must be finite and non-negative.
    fn coefficients(&self) -> [(&'static str, f64); 33] {
        let (m, t, i) = (&self.momentum, &self.tracer, &self.isoneutral);
        let (tke, eke, iw) = (&self.tke, &self.eke, &self.idemix);
        [
            ("momentum.a_h", m.a_h),
            ("momentum.a_hbi", m.a_hbi),
            ("momentum.kappa_m_0", m.kappa_m_0),
            ("momentum.r_ray", m.r_ray),
            ("momentum.r_bot", m.r_bot),
            ("momentum.r_quad_bot", m.r_quad_bot),
            ("tracer.k_h", t.k_h),
            ("tracer.k_hbi", t.k_hbi),
            ("tracer.kappa_h_0", t.kappa_h_0),
            ("isoneutral.k_iso_0", i.k_iso_0),
            ("isoneutral.k_iso_steep", i.k_iso_steep),
            ("isoneutral.k_gm_0", i.k_gm_0),
            ("isoneutral.iso_slopec", i.iso_slopec),
            ("isoneutral.iso_dslope", i.iso_dslope),
            ("tke.c_k", tke.c_k),
            ("tke.c_eps", tke.c_eps),
            ("tke.alpha_tke", tke.alpha_tke),
            ("tke.mxl_min", tke.mxl_min),
            ("tke.kappa_m_min", tke.kappa_m_min),
            ("tke.prandtl_number", tke.prandtl_number),
            ("eke.c_k", eke.c_k),
            ("eke.c_eps", eke.c_eps),
            ("eke.lmin", eke.lmin),
            ("eke.k_max", eke.k_max),
            ("eke.r_bot", eke.r_bot),
            ("eke.c_lee0", eke.c_lee0),
            ("eke.alpha_eke", eke.alpha_eke),
            ("idemix.tau_v", iw.tau_v),
            ("idemix.tau_h", iw.tau_h),
            ("idemix.gamma", iw.gamma),
            ("idemix.mu0", iw.mu0),
            ("idemix.tau_m2", iw.tau_m2),
            ("conserve_tolerance", self.conserve_tolerance),
        ]
    }

    /// The largest isoneutral slope the explicit diffusion can carry at
    /// this `dt`, or `None` when isoneutral mixing is off.
    ///
    /// The bound is `min(dz) * min(dx cos, dy) / (4 K_iso dt)`.
    pub fn slope_stability_bound(&self, grid: &Grid) -> Option<f64> {
        if !self.isoneutral.enabled {
            return None;
        }
        let s = grid.shape();
        let dz = grid.dzt.iter().copied().fold(f64::INFINITY, f64::min);
        let mut dh = f64::INFINITY;
        for i in s.interior_i() {
            for j in s.interior_j() {
                dh = dh.min(grid.dxt[i] * grid.cost[j]).min(grid.dyt[j]);
            }
        }
        let k_iso = self.isoneutral.k_iso_0.max(self.isoneutral.k_gm_0);
        Some(dz * dh / (4.0 * k_iso * self.dt + EPSLN))
    }

    /// Warn when `iso_slopec` exceeds [`slope_stability_bound`](Self::slope_stability_bound).
    /// Returns whether the warning fired.
    pub fn check_slope_stability(&self, grid: &Grid) -> bool {
        match self.slope_stability_bound(grid) {
            Some(bound) if self.isoneutral.iso_slopec > bound => {
                log::warn!(
                    "iso_slopec {:.3e} exceeds the stability bound {:.3e} for dt = {} s; \
                     decrease dt or iso_slopec",
                    self.isoneutral.iso_slopec,
                    bound,
                    self.dt,
                );
                true
            }
            _ => false,
        }
    }

    /// The stages of one step, in execution order.
    ///
    /// 1. forcing
    /// 2. closure_mixing
    /// 3. momentum
    /// 4. tracer
    /// 5. wgrid_velocity (closures only)
    /// 6. eke, idemix, tke (each when enabled)
    /// 7. exchange of every field written above
    pub fn pipeline(&self, grid: &Grid) -> Vec<Box<dyn Stage>> {
        let eps = self.ab_eps;
        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(ForcingStage::new()),
            Box::new(ClosureMixing::new(
                self.tke.clone(),
                self.eke.clone(),
                self.idemix.clone(),
                self.isoneutral.clone(),
                self.momentum.kappa_m_0,
                self.tracer.kappa_h_0,
            )),
            Box::new(MomentumStage::new(
                grid,
                self.momentum.clone(),
                self.solver.clone(),
                eps,
                self.dt,
            )),
            Box::new(TracerStage::new(
                self.tracer.clone(),
                self.isoneutral.clone(),
                eps,
            )),
        ];
        if self.closures_enabled() {
            stages.push(Box::new(WGridStage::new()));
        }
        if self.eke.enabled {
            stages.push(Box::new(EkeStage::new(
                self.eke.clone(),
                &self.tke,
                &self.idemix,
                eps,
            )));
        }
        if self.idemix.enabled {
            stages.push(Box::new(IdemixStage::new(
                self.idemix.clone(),
                &self.tke,
                &self.eke,
                eps,
            )));
        }
        if self.tke.enabled {
            stages.push(Box::new(TkeStage::new(
                self.tke.clone(),
                &self.eke,
                &self.idemix,
                eps,
            )));
        }

        let mut written = gyre_core::FieldSet::empty();
        for stage in &stages {
            for key in stage.writes() {
                written.insert(key);
            }
        }
        stages.push(Box::new(BoundaryExchange::new(written)));
        stages
    }
}

fn fraction(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::FractionOutOfRange { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_grid::GridBuilder;
    use proptest::prelude::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(ModelConfig::default().validate(), Ok(()));
        assert_eq!(ModelConfig::global_closures().validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_time_step() {
        for dt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = ModelConfig {
                dt,
                ..ModelConfig::default()
            };
            match cfg.validate() {
                Err(ConfigError::InvalidTimeStep { .. }) => {}
                other => panic!("expected InvalidTimeStep for {dt}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_ab_eps_on_the_boundary() {
        for ab_eps in [0.0, 1.0, 1.5] {
            let cfg = ModelConfig {
                ab_eps,
                ..ModelConfig::default()
            };
            assert_eq!(
                cfg.validate(),
                Err(ConfigError::AbEpsOutOfRange { value: ab_eps })
            );
        }
    }

    #[test]
    fn tke_needs_implicit_friction() {
        let mut cfg = ModelConfig::default();
        cfg.tke.enabled = true;
        assert_eq!(cfg.validate(), Err(ConfigError::TkeRequiresImplicitFriction));
        cfg.momentum.implicit_vert_friction = true;
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn rejects_fraction_and_negative_coefficient() {
        let mut cfg = ModelConfig::default();
        cfg.eke.diss_iw_fraction = 1.2;
        match cfg.validate() {
            Err(ConfigError::FractionOutOfRange { name, .. }) => {
                assert_eq!(name, "eke.diss_iw_fraction")
            }
            other => panic!("expected FractionOutOfRange, got {other:?}"),
        }

        let mut cfg = ModelConfig::default();
        cfg.momentum.a_h = -1.0;
        match cfg.validate() {
            Err(ConfigError::NegativeCoefficient { name, value }) => {
                assert_eq!((name, value), ("momentum.a_h", -1.0))
            }
            other => panic!("expected NegativeCoefficient, got {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_iteration_cap() {
        let mut cfg = ModelConfig::default();
        cfg.solver.congr_max_iterations = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidSolver { .. })
        ));
    }

    #[test]
    fn allocation_follows_closures() {
        let alloc = ModelConfig::default().allocation();
        assert!(!alloc.tke && !alloc.eke && !alloc.idemix && !alloc.wgrid);
        let alloc = ModelConfig::global_closures().allocation();
        assert!(alloc.tke && alloc.eke && alloc.idemix && alloc.wgrid && alloc.isoneutral);
        assert!(!alloc.wave_bands);
    }

    #[test]
    fn pipeline_order() {
        let grid = GridBuilder::new(4, 4, 3).build().unwrap();
        let names = |cfg: &ModelConfig| -> Vec<String> {
            cfg.pipeline(&grid)
                .iter()
                .map(|s| s.name().to_string())
                .collect()
        };
        assert_eq!(
            names(&ModelConfig::default()),
            ["forcing", "closure_mixing", "momentum", "tracer", "exchange"]
        );
        assert_eq!(
            names(&ModelConfig::global_closures()),
            [
                "forcing",
                "closure_mixing",
                "momentum",
                "tracer",
                "wgrid_velocity",
                "eke",
                "idemix",
                "tke",
                "exchange"
            ]
        );
    }

    #[test]
    fn steep_slopes_warn() {
        let grid = GridBuilder::new(4, 4, 3)
            .uniform_spacing(1e4, 1e4)
            .dzt(vec![10.0, 10.0, 10.0])
            .build()
            .unwrap();
        let mut cfg = ModelConfig::default();
        assert_eq!(cfg.slope_stability_bound(&grid), None);
        cfg.isoneutral.enabled = true;
        cfg.isoneutral.k_iso_0 = 1000.0;
        // 10 m * 1e4 m / (4 * 1000 m^2/s * 3600 s)
        let bound = cfg.slope_stability_bound(&grid).unwrap();
        assert!((bound - 1e5 / 1.44e7).abs() < 1e-12);
        cfg.isoneutral.iso_slopec = 1e-3;
        assert!(!cfg.check_slope_stability(&grid));
        cfg.isoneutral.iso_slopec = 1e-2;
        assert!(cfg.check_slope_stability(&grid));
    }

    proptest! {
        #[test]
        fn interior_ab_eps_and_positive_dt_validate(
            ab_eps in 1e-6f64..0.999_999,
            dt in 1.0f64..86_400.0,
        ) {
            let cfg = ModelConfig {
                ab_eps,
                dt,
                ..ModelConfig::default()
            };
            prop_assert_eq!(cfg.validate(), Ok(()));
        }

        #[test]
        fn negative_coefficients_are_named(value in -1e6f64..-1e-12) {
            let mut cfg = ModelConfig::default();
            cfg.momentum.a_h = value;
            match cfg.validate() {
                Err(ConfigError::NegativeCoefficient { name, value: v }) => {
                    prop_assert_eq!(name, "momentum.a_h");
                    prop_assert_eq!(v, value);
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn error_display_and_source() {
        let e = ConfigError::from(PipelineError::EmptyPipeline);
        assert!(e.to_string().starts_with("pipeline:"));
        assert!(e.source().is_some());
        assert!(ConfigError::TkeRequiresImplicitFriction.source().is_none());
    }
}
