//! Reusable stage fixtures.
//!
//! Three standard stages for pipeline validation and engine testing:
//!
//! - [`ConstStage`]: writes a constant into one field.
//! - [`FailingStage`]: fails deterministically after N calls.
//! - [`NanStage`]: writes a NaN into one field, for finiteness checks.

use std::sync::atomic::{AtomicUsize, Ordering};

use gyre_core::{FieldKey, FieldSet, StageError};
use gyre_stage::{Stage, StepContext, WriteList};

fn written<'a>(ctx: &'a mut StepContext<'_>, key: FieldKey) -> Result<&'a mut [f64], StageError> {
    ctx.state_mut()
        .written_mut(key)
        .ok_or_else(|| StageError::ExecutionFailed {
            reason: format!("field {key} not allocated"),
        })
}

/// Writes a constant value to every cell of one field (no reads).
///
/// Useful for checking that write slots reach later stages and that
/// duplicate writers are rejected.
pub struct ConstStage {
    pub name: String,
    pub output: FieldKey,
    pub value: f64,
}

impl ConstStage {
    pub fn new(name: impl Into<String>, output: FieldKey, value: f64) -> Self {
        Self {
            name: name.into(),
            output,
            value,
        }
    }
}

impl Stage for ConstStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> FieldSet {
        FieldSet::empty()
    }

    fn writes(&self) -> WriteList {
        [self.output].into_iter().collect()
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError> {
        written(ctx, self.output)?.fill(self.value);
        Ok(())
    }
}

/// Succeeds `succeed_count` times, then fails every call after that.
///
/// Uses an atomic counter so the stage stays `&self` like every other
/// stage.
pub struct FailingStage {
    pub name: String,
    succeed_count: usize,
    call_count: AtomicUsize,
}

impl FailingStage {
    pub fn new(name: impl Into<String>, succeed_count: usize) -> Self {
        Self {
            name: name.into(),
            succeed_count,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Number of calls so far.
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> FieldSet {
        FieldSet::empty()
    }

    fn writes(&self) -> WriteList {
        WriteList::new()
    }

    fn step(&self, _ctx: &mut StepContext<'_>) -> Result<(), StageError> {
        let n = self.call_count.fetch_add(1, Ordering::Relaxed);
        if n >= self.succeed_count {
            return Err(StageError::ExecutionFailed {
                reason: format!("{} failed on call {}", self.name, n + 1),
            });
        }
        Ok(())
    }
}

/// Writes NaN into the first cell of one field.
pub struct NanStage {
    pub output: FieldKey,
}

impl Stage for NanStage {
    fn name(&self) -> &str {
        "nan"
    }

    fn reads(&self) -> FieldSet {
        FieldSet::empty()
    }

    fn writes(&self) -> WriteList {
        [self.output].into_iter().collect()
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError> {
        let out = written(ctx, self.output)?;
        if let Some(first) = out.first_mut() {
            *first = f64::NAN;
        }
        Ok(())
    }
}
