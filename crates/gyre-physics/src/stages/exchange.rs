//! End-of-step halo refresh.

use gyre_core::{FieldKey, FieldSet, StageError};
use gyre_stage::{Stage, StepContext, WriteList};

/// Refreshes the halo of every field written earlier in the step.
///
/// Declares no writes of its own: refreshing another stage's output does
/// not make this stage its owner.
#[derive(Clone, Debug)]
pub struct BoundaryExchange {
    fields: FieldSet,
}

impl BoundaryExchange {
    /// Exchange each field in `fields`.
    pub fn new(fields: FieldSet) -> Self {
        Self { fields }
    }

    /// The exchanged fields.
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }
}

impl Stage for BoundaryExchange {
    fn name(&self) -> &str {
        "exchange"
    }

    fn reads(&self) -> FieldSet {
        self.fields.clone()
    }

    fn writes(&self) -> WriteList {
        WriteList::new()
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError> {
        let keys: Vec<FieldKey> = self.fields.iter().collect();
        for key in keys {
            ctx.exchange_written(key);
        }
        log::trace!("exchange: {} fields", self.fields.len());
        Ok(())
    }
}
