//! The time-step orchestrator.
//!
//! [`Model`] owns the grid, the state and the validated stage pipeline.
//! [`Model::advance_one_step`] runs every stage in order, rotates the time
//! levels on success and reports timings, iteration counts and the energy
//! transfer ledger. A failed stage halts the model: the `next` slots are
//! never promoted and every later call returns [`StepError::Halted`].

use std::error::Error;
use std::fmt;
use std::time::Instant;

use gyre_core::{FieldKey, FieldSet, ForcingProvider, StageError, StepId};
use gyre_grid::{CyclicExchange, Grid, HaloExchange};
use gyre_physics::EquationOfState;
use gyre_stage::{validate_pipeline, PipelinePlan, Stage, StepContext};
use gyre_state::{ModelState, PanicSnapshot, TransferLedger, TransferViolation};
use smallvec::SmallVec;

use crate::config::{ConfigError, ModelConfig};
use crate::diagnostics::{EnergyBudget, Overturning, TracerMonitor, TracerReport};
use crate::metrics::StepMetrics;
use crate::output::{OutputRegistry, OutputSink};

// ── StepError ──────────────────────────────────────────────────────

/// Why a step did not complete.
#[derive(Debug)]
pub enum StepError {
    /// An earlier step failed; the model refuses to continue.
    Halted,
    /// A stage failed and the step was abandoned.
    StageFailed {
        /// Name of the failing stage.
        stage: String,
        /// What went wrong.
        error: StageError,
        /// State at the moment of failure.
        snapshot: Box<PanicSnapshot>,
    },
}

impl StepError {
    /// The underlying stage error, if a stage failed.
    pub fn stage_error(&self) -> Option<&StageError> {
        match self {
            Self::StageFailed { error, .. } => Some(error),
            Self::Halted => None,
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halted => write!(f, "model is halted after a failed step"),
            Self::StageFailed {
                stage,
                error,
                snapshot,
            } => write!(
                f,
                "stage '{stage}' failed after step {}: {error}",
                snapshot.step
            ),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StageFailed { error, .. } => Some(error),
            Self::Halted => None,
        }
    }
}

// ── StepReport ─────────────────────────────────────────────────────

/// Summary of one completed step.
#[derive(Clone, Debug)]
pub struct StepReport {
    /// The completed step.
    pub step: StepId,
    /// Model time after the step, s.
    pub time: f64,
    /// Iterations of the barotropic solve.
    pub barotropic_iterations: usize,
    /// Iterations of the non-hydrostatic pressure solve.
    pub pressure_iterations: usize,
    /// Stage timings.
    pub metrics: StepMetrics,
    /// Energy handed between closures during the step.
    pub transfers: TransferLedger,
    /// Ledger routes out of balance (only with `enable_conserve_energy`).
    pub warnings: SmallVec<[TransferViolation; 4]>,
    /// Tracer-monitor reading, on diagnostic steps.
    pub tracers: Option<TracerReport>,
    /// Energy compartments, on diagnostic steps.
    pub energy: Option<EnergyBudget>,
    /// Meridional overturning, on diagnostic steps.
    pub overturning: Option<Overturning>,
}

// ── Model ──────────────────────────────────────────────────────────

/// Owns the grid, the state and the stage pipeline of one run.
pub struct Model {
    grid: Grid,
    config: ModelConfig,
    state: ModelState,
    stages: Vec<Box<dyn Stage>>,
    plan: PipelinePlan,
    exchange: Box<dyn HaloExchange>,
    outputs: OutputRegistry,
    sink: Option<Box<dyn OutputSink>>,
    monitor: TracerMonitor,
    halted: bool,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("shape", self.grid.shape())
            .field("step", &self.state.step)
            .field("time", &self.state.time)
            .field("stages", &self.stage_names())
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Build a model at rest with a freshly allocated state.
    pub fn new(grid: Grid, config: ModelConfig) -> Result<Self, ConfigError> {
        let state = ModelState::new(&grid, config.allocation());
        Self::with_state(grid, config, state)
    }

    /// Build a model from an initial state.
    ///
    /// `current` and `past` of every prognostic field must already be
    /// masked and exchanged.
    pub fn with_state(
        grid: Grid,
        config: ModelConfig,
        state: ModelState,
    ) -> Result<Self, ConfigError> {
        let stages = config.pipeline(&grid);
        Self::with_stages(grid, config, state, stages)
    }

    /// Build a model around a caller-supplied pipeline.
    ///
    /// `rho` and `Nsqr` of the `past` and `current` levels are recomputed
    /// from the initial tracers.
    pub fn with_stages(
        grid: Grid,
        config: ModelConfig,
        mut state: ModelState,
        stages: Vec<Box<dyn Stage>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        grid.check_mask_consistency()?;
        if state.shape() != grid.shape() {
            return Err(ConfigError::ShapeMismatch {
                expected: *grid.shape(),
                actual: *state.shape(),
            });
        }
        diagnose_density(&grid, config.tracer.eos, &mut state);
        let defined: FieldSet = FieldKey::ALL
            .iter()
            .copied()
            .filter(|&k| state.has(k))
            .collect();
        let plan = validate_pipeline(&stages, &defined)?;
        config.check_slope_stability(&grid);
        log::debug!(
            "model: {}x{}x{} grid, pipeline [{}]",
            grid.shape().nx,
            grid.shape().ny,
            grid.shape().nz,
            stages
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", "),
        );

        Ok(Self {
            exchange: Box::new(CyclicExchange::new(grid.boundary())),
            grid,
            config,
            state,
            stages,
            plan,
            outputs: OutputRegistry::new(),
            sink: None,
            monitor: TracerMonitor::new(),
            halted: false,
        })
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// The grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// The configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The state after the last completed step.
    pub fn state(&self) -> &ModelState {
        &self.state
    }

    /// Mutable state, for setting initial conditions.
    pub fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Name of the stage that writes `key`, if any.
    pub fn owner(&self, key: FieldKey) -> Option<&str> {
        self.plan.owner(key).map(|i| self.stages[i].name())
    }

    /// Whether a failed step halted the model.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The registered outputs.
    pub fn outputs(&self) -> &OutputRegistry {
        &self.outputs
    }

    // ── Setup ──────────────────────────────────────────────────────

    /// Replace the single-partition halo exchange.
    pub fn set_exchange(&mut self, exchange: Box<dyn HaloExchange>) {
        self.exchange = exchange;
    }

    /// Send frames and panic snapshots to `sink`.
    pub fn set_output_sink(&mut self, sink: Box<dyn OutputSink>) {
        self.sink = Some(sink);
    }

    /// Register `key` for output. Returns `false` if the field is not
    /// allocated in this configuration or already registered.
    pub fn register_output(&mut self, key: FieldKey) -> bool {
        if !self.state.has(key) {
            log::warn!("output '{key}' is not allocated in this configuration");
            return false;
        }
        self.outputs.register(key)
    }

    // ── Stepping ───────────────────────────────────────────────────

    /// Advance the model by one time step.
    ///
    /// Runs every stage in pipeline order. On success the time levels
    /// rotate and the report describes the completed step. On failure a
    /// [`PanicSnapshot`] goes to the output sink and into the error, and
    /// the model halts.
    pub fn advance_one_step(
        &mut self,
        forcing: &dyn ForcingProvider,
    ) -> Result<StepReport, StepError> {
        if self.halted {
            return Err(StepError::Halted);
        }
        let step_start = Instant::now();
        let dt = self.config.dt;
        let mut metrics = StepMetrics::default();

        self.state.transfers.reset();
        self.state.barotropic_iterations = 0;
        self.state.pressure_iterations = 0;

        for stage in &self.stages {
            let stage_start = Instant::now();
            let result = {
                let mut ctx = StepContext::new(
                    &self.grid,
                    &mut self.state,
                    self.exchange.as_ref(),
                    forcing,
                    dt,
                );
                stage.step(&mut ctx)
            };
            metrics
                .stage_us
                .insert(stage.name().to_string(), stage_start.elapsed().as_micros() as u64);

            let result = result.and_then(|()| {
                if !self.config.check_finite {
                    return Ok(());
                }
                let check_start = Instant::now();
                let checked = check_finite(&self.state, stage.writes());
                metrics.finite_check_us += check_start.elapsed().as_micros() as u64;
                checked
            });
            if let Err(error) = result {
                let name = stage.name().to_string();
                return Err(self.fail(name, error));
            }
            log::trace!("{}: done", stage.name());
        }

        let transfers = self.state.transfers.clone();
        let warnings = if self.config.enable_conserve_energy {
            let violations = transfers.check(self.config.conserve_tolerance);
            for v in &violations {
                log::warn!("energy transfer out of balance: {v}");
            }
            violations
        } else {
            SmallVec::new()
        };
        let barotropic_iterations = self.state.barotropic_iterations;
        let pressure_iterations = self.state.pressure_iterations;

        self.state.rotate(dt);
        let step = self.state.step;
        let time = self.state.time;

        let diag_start = Instant::now();
        let (tracers, energy, overturning) = if due(step, self.config.diagnostics_interval) {
            let tracers = self.monitor.observe(&self.grid, &self.state);
            let energy = EnergyBudget::compute(&self.grid, &self.state);
            log::info!(
                "step {step}: energy kinetic {:.4e} potential {:.4e} closures {:.4e}",
                energy.kinetic,
                energy.potential,
                energy.closures(),
            );
            let iso = &self.config.isoneutral;
            let overturning = Overturning::compute(
                &self.grid,
                self.config.tracer.eos,
                &self.state,
                iso.enabled && iso.skew_diffusion,
            );
            log::debug!(
                "step {step}: overturning max {:.3e} m^3/s",
                overturning.max_abs()
            );
            (tracers, Some(energy), Some(overturning))
        } else {
            (None, None, None)
        };
        if due(step, self.config.output_interval) {
            if let Some(sink) = self.sink.as_mut() {
                sink.frame(self.outputs.frame(step, time, &self.state));
            }
        }
        metrics.diagnostics_us = diag_start.elapsed().as_micros() as u64;
        metrics.total_us = step_start.elapsed().as_micros() as u64;

        log::debug!(
            "step {step}: t = {time} s, {barotropic_iterations} barotropic iterations, {} us",
            metrics.total_us
        );
        Ok(StepReport {
            step,
            time,
            barotropic_iterations,
            pressure_iterations,
            metrics,
            transfers,
            warnings,
            tracers,
            energy,
            overturning,
        })
    }

    /// Advance `steps` times, stopping at the first failure. Returns the
    /// summed timings.
    pub fn run(
        &mut self,
        forcing: &dyn ForcingProvider,
        steps: u64,
    ) -> Result<StepMetrics, StepError> {
        let mut total = StepMetrics::default();
        for _ in 0..steps {
            let report = self.advance_one_step(forcing)?;
            total.accumulate(&report.metrics);
        }
        Ok(total)
    }

    fn fail(&mut self, stage: String, error: StageError) -> StepError {
        log::error!(
            "step {} aborted in '{stage}': {error}",
            self.state.step.next()
        );
        let snapshot = PanicSnapshot::capture(&self.state, &stage);
        if let Some(sink) = self.sink.as_mut() {
            sink.panic(&snapshot);
        }
        self.halted = true;
        StepError::StageFailed {
            stage,
            error,
            snapshot: Box::new(snapshot),
        }
    }
}

/// Density and stratification of both filled time levels.
fn diagnose_density(grid: &Grid, eos: EquationOfState, state: &mut ModelState) {
    let lv = state.levels;
    let ModelState {
        temp,
        salt,
        rho,
        nsqr,
        ..
    } = state;
    for slot in [lv.past(), lv.current()] {
        eos.diagnose(
            grid,
            temp.slot(slot),
            salt.slot(slot),
            rho.slot_mut(slot),
            nsqr.slot_mut(slot),
        );
    }
}

fn due(step: StepId, interval: u64) -> bool {
    interval > 0 && step.0 % interval == 0
}

/// First non-finite value among the arrays a stage wrote.
fn check_finite(
    state: &ModelState,
    keys: impl IntoIterator<Item = FieldKey>,
) -> Result<(), StageError> {
    for field in keys {
        let Some(data) = state.written(field) else {
            continue;
        };
        if let Some(index) = data.iter().position(|v| !v.is_finite()) {
            return Err(StageError::NonFinite { field, index });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_core::NoForcing;
    use gyre_test_utils::{closed_basin, ConstStage, FailingStage, NanStage};

    fn config() -> ModelConfig {
        ModelConfig {
            dt: 600.0,
            ..ModelConfig::default()
        }
    }

    fn fresh_state(grid: &Grid) -> ModelState {
        ModelState::new(grid, config().allocation())
    }

    #[test]
    fn default_pipeline_owns_prognostics() {
        let model = Model::new(closed_basin(4, 4, 3), config()).unwrap();
        assert_eq!(model.owner(FieldKey::U), Some("momentum"));
        assert_eq!(model.owner(FieldKey::Temp), Some("tracer"));
        assert_eq!(model.owner(FieldKey::KappaM), Some("closure_mixing"));
        assert_eq!(model.owner(FieldKey::Tke), None);
        assert_eq!(model.stage_names().last(), Some(&"exchange"));
    }

    #[test]
    fn successful_step_rotates_and_reports() {
        let grid = closed_basin(3, 3, 2);
        let state = fresh_state(&grid);
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(ConstStage::new("heat", FieldKey::Temp, 5.0)),
            Box::new(ConstStage::new("mix", FieldKey::KappaH, 1e-5)),
        ];
        let mut model = Model::with_stages(grid, config(), state, stages).unwrap();
        let report = model.advance_one_step(&NoForcing).unwrap();
        assert_eq!(report.step, StepId(1));
        assert_eq!(report.time, 600.0);
        assert_eq!(
            report.metrics.stage_us.keys().collect::<Vec<_>>(),
            ["heat", "mix"]
        );
        let lv = model.state().levels;
        assert!(model.state().temp.current(lv).iter().all(|&t| t == 5.0));
    }

    #[test]
    fn failure_halts_and_keeps_current() {
        let grid = closed_basin(3, 3, 2);
        let state = fresh_state(&grid);
        let failing = FailingStage::new("flaky", 1);
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(ConstStage::new("heat", FieldKey::Temp, 5.0)),
            Box::new(failing),
        ];
        let mut model = Model::with_stages(grid, config(), state, stages).unwrap();
        model.advance_one_step(&NoForcing).unwrap();
        let err = model.advance_one_step(&NoForcing).unwrap_err();
        match &err {
            StepError::StageFailed {
                stage, snapshot, ..
            } => {
                assert_eq!(stage, "flaky");
                assert_eq!(snapshot.step, StepId(1));
            }
            other => panic!("expected StageFailed, got {other:?}"),
        }
        assert!(err.source().is_some());
        assert!(model.is_halted());
        assert_eq!(model.state().step, StepId(1));
        assert!(matches!(
            model.advance_one_step(&NoForcing),
            Err(StepError::Halted)
        ));
    }

    #[test]
    fn non_finite_writes_fail_the_stage() {
        let grid = closed_basin(3, 3, 2);
        let state = fresh_state(&grid);
        let stages: Vec<Box<dyn Stage>> = vec![Box::new(NanStage {
            output: FieldKey::Salt,
        })];
        let mut model = Model::with_stages(grid, config(), state, stages).unwrap();
        let err = model.advance_one_step(&NoForcing).unwrap_err();
        assert_eq!(
            err.stage_error(),
            Some(&StageError::NonFinite {
                field: FieldKey::Salt,
                index: 0
            })
        );
    }

    #[test]
    fn finite_check_can_be_disabled() {
        let grid = closed_basin(3, 3, 2);
        let state = fresh_state(&grid);
        let cfg = ModelConfig {
            check_finite: false,
            ..config()
        };
        let stages: Vec<Box<dyn Stage>> = vec![Box::new(NanStage {
            output: FieldKey::Salt,
        })];
        let mut model = Model::with_stages(grid, cfg, state, stages).unwrap();
        assert!(model.advance_one_step(&NoForcing).is_ok());
    }

    #[test]
    fn rejects_state_of_another_grid() {
        let state = fresh_state(&closed_basin(3, 3, 2));
        match Model::with_state(closed_basin(4, 3, 2), config(), state) {
            Err(ConfigError::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected.nx, 4);
                assert_eq!(actual.nx, 3);
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn unallocated_outputs_are_refused() {
        let mut model = Model::new(closed_basin(3, 3, 2), config()).unwrap();
        assert!(model.register_output(FieldKey::Temp));
        assert!(!model.register_output(FieldKey::Temp));
        assert!(!model.register_output(FieldKey::Tke));
        assert_eq!(model.outputs().len(), 1);
    }
}
