//! Per-step performance metrics.
//!
//! [`StepMetrics`] records wall-clock time for one step and for each stage
//! in pipeline order, the equivalent of a set of named stage timers.

use indexmap::IndexMap;

/// Timing collected during a single step.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire step.
    pub total_us: u64,
    /// Per-stage execution time, keyed by stage name in pipeline order.
    pub stage_us: IndexMap<String, u64>,
    /// Time spent scanning written fields for non-finite values.
    pub finite_check_us: u64,
    /// Time spent on diagnostics and output after the step.
    pub diagnostics_us: u64,
}

impl StepMetrics {
    /// Execution time of `stage`, if it ran.
    pub fn stage(&self, stage: &str) -> Option<u64> {
        self.stage_us.get(stage).copied()
    }

    /// Fold another step's timings into running totals.
    pub fn accumulate(&mut self, other: &StepMetrics) {
        self.total_us += other.total_us;
        self.finite_check_us += other.finite_check_us;
        self.diagnostics_us += other.diagnostics_us;
        for (name, us) in &other.stage_us {
            *self.stage_us.entry(name.clone()).or_insert(0) += us;
        }
    }
}
