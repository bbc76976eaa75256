//! The [`Stage`] trait.

use gyre_core::{FieldKey, FieldSet, StageError};
use smallvec::SmallVec;

use crate::context::StepContext;

/// Fields written by one stage.
pub type WriteList = SmallVec<[FieldKey; 8]>;

/// One named step of the per-timestep pipeline.
///
/// # Contract
///
/// - `step()` is deterministic: same state in, same state out.
/// - Stages are immutable; parameters are fixed at construction and all
///   evolving data lives in the [`ModelState`](gyre_state::ModelState).
/// - `reads()` and `writes()` are called once when the pipeline is built.
/// - A stage only writes the fields it declares: the `next` slot of a
///   prognostic field, the `current` slot of a tendency or a diagnostic
///   array. Refreshing halos of another stage's output is not a write.
///
/// # Examples
///
/// ```
/// use gyre_core::{FieldKey, FieldSet, StageError};
/// use gyre_stage::{Stage, StepContext, WriteList};
///
/// struct ClearBottomDrag;
///
/// impl Stage for ClearBottomDrag {
///     fn name(&self) -> &str { "clear_bottom_drag" }
///     fn reads(&self) -> FieldSet { FieldSet::empty() }
///     fn writes(&self) -> WriteList { [FieldKey::KDissBot].into_iter().collect() }
///     fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError> {
///         ctx.state_mut().dissipation.k_diss_bot.fill(0.0);
///         Ok(())
///     }
/// }
///
/// assert_eq!(ClearBottomDrag.name(), "clear_bottom_drag");
/// ```
pub trait Stage: Send {
    /// Name used in logs, timings and panic snapshots.
    fn name(&self) -> &str;

    /// Fields read by this stage.
    fn reads(&self) -> FieldSet;

    /// Fields written by this stage.
    fn writes(&self) -> WriteList;

    /// Execute the stage for the step in progress.
    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError>;
}
