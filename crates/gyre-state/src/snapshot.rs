//! Full-state capture taken when a step fails.

use gyre_core::{FieldAccess, FieldKey, StepId};

use crate::state::ModelState;

/// A copy of the model state at the moment a stage failed.
///
/// Prognostic reads see the last completed step; the `next` slots of the
/// failed step are kept for inspection but were never promoted.
#[derive(Clone, Debug, PartialEq)]
pub struct PanicSnapshot {
    /// Last completed step.
    pub step: StepId,
    /// Model time of the last completed step.
    pub time: f64,
    /// Name of the stage that failed.
    pub stage: String,
    /// The captured state.
    pub state: ModelState,
}

impl PanicSnapshot {
    /// Capture `state` after `stage` failed.
    pub fn capture(state: &ModelState, stage: &str) -> Self {
        Self {
            step: state.step,
            time: state.time,
            stage: stage.to_string(),
            state: state.clone(),
        }
    }
}

impl FieldAccess for PanicSnapshot {
    fn field(&self, key: FieldKey) -> Option<&[f64]> {
        self.state.field(key)
    }
}
