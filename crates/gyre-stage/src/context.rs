//! Execution context passed to stages.

use gyre_core::{FieldKey, ForcingProvider, Rank, StepId};
use gyre_grid::{Grid, HaloExchange};
use gyre_state::{ModelState, TimeLevels};

/// Everything a stage may touch during one step.
///
/// The grid, exchange and forcing provider are shared read-only; the
/// state is borrowed mutably for the duration of the stage. Accessors for
/// the shared parts return references with the context's lifetime so they
/// can be held while the state is borrowed mutably.
pub struct StepContext<'a> {
    grid: &'a Grid,
    state: &'a mut ModelState,
    exchange: &'a dyn HaloExchange,
    forcing: &'a dyn ForcingProvider,
    dt: f64,
}

impl<'a> StepContext<'a> {
    /// Construct a step context.
    ///
    /// Typically called by the model, not by stages directly.
    pub fn new(
        grid: &'a Grid,
        state: &'a mut ModelState,
        exchange: &'a dyn HaloExchange,
        forcing: &'a dyn ForcingProvider,
        dt: f64,
    ) -> Self {
        Self {
            grid,
            state,
            exchange,
            forcing,
            dt,
        }
    }

    /// The model grid.
    pub fn grid(&self) -> &'a Grid {
        self.grid
    }

    /// Read access to the state.
    pub fn state(&self) -> &ModelState {
        self.state
    }

    /// Write access to the state.
    pub fn state_mut(&mut self) -> &mut ModelState {
        self.state
    }

    /// Boundary exchange.
    pub fn exchange(&self) -> &'a dyn HaloExchange {
        self.exchange
    }

    /// Surface forcing provider.
    pub fn forcing(&self) -> &'a dyn ForcingProvider {
        self.forcing
    }

    /// Time step in seconds.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Time-slot assignment of the step in progress.
    pub fn levels(&self) -> TimeLevels {
        self.state.levels
    }

    /// Number of completed steps.
    pub fn step_id(&self) -> StepId {
        self.state.step
    }

    /// Model time of the `current` slot.
    pub fn time(&self) -> f64 {
        self.state.time
    }

    /// Whether this is the first step of the run, when no `past`
    /// tendency exists yet.
    pub fn is_first_step(&self) -> bool {
        self.state.step == StepId(0)
    }

    /// Refresh the halo of the array written for `key` this step.
    ///
    /// Unallocated keys are ignored.
    pub fn exchange_written(&mut self, key: FieldKey) {
        let shape = *self.grid.shape();
        let levels = match key.meta().rank {
            Rank::Surface => 1,
            Rank::Volume => shape.nz,
        };
        if let Some(data) = self.state.written_mut(key) {
            self.exchange.exchange(&shape, data, levels);
        }
    }
}
