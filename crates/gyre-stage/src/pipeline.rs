//! Pipeline validation.
//!
//! [`validate_pipeline`] runs once when the model is built. It checks that
//! every `next` slot has a single writer and that stages only reference
//! fields allocated for this configuration.

use std::error::Error;
use std::fmt;

use gyre_core::{FieldKey, FieldSet};
use indexmap::IndexMap;

use crate::stage::Stage;

// ── Plan ───────────────────────────────────────────────────────────

/// Write ownership derived from a validated pipeline.
#[derive(Debug)]
#[must_use]
pub struct PipelinePlan {
    owners: IndexMap<FieldKey, usize>,
    written: FieldSet,
}

impl PipelinePlan {
    /// Index of the stage that writes `key`, if any.
    pub fn owner(&self, key: FieldKey) -> Option<usize> {
        self.owners.get(&key).copied()
    }

    /// Every field written during a step.
    pub fn written(&self) -> &FieldSet {
        &self.written
    }

    /// `(field, stage index)` pairs in pipeline order.
    pub fn owners(&self) -> impl Iterator<Item = (FieldKey, usize)> + '_ {
        self.owners.iter().map(|(k, i)| (*k, *i))
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Two stages writing the same field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConflict {
    /// The contested field.
    pub field: FieldKey,
    /// Name of the earlier writer.
    pub first_writer: String,
    /// Name of the later writer.
    pub second_writer: String,
}

/// Errors from pipeline validation.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No stages registered.
    EmptyPipeline,

    /// Two or more stages write the same field.
    WriteConflict(Vec<WriteConflict>),

    /// A stage references a field the state does not allocate.
    UndefinedField {
        /// Which stage.
        stage: String,
        /// The missing field.
        field: FieldKey,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPipeline => write!(f, "pipeline has no stages"),
            Self::WriteConflict(conflicts) => {
                write!(f, "write-write conflicts: ")?;
                for (i, c) in conflicts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(
                        f,
                        "field '{}' written by '{}' and '{}'",
                        c.field, c.first_writer, c.second_writer,
                    )?;
                }
                Ok(())
            }
            Self::UndefinedField { stage, field } => {
                write!(f, "stage '{stage}' references unallocated field '{field}'")
            }
        }
    }
}

impl Error for PipelineError {}

// ── Validation ─────────────────────────────────────────────────────

/// Validate a stage pipeline.
///
/// Checks performed:
///
/// 1. The pipeline is non-empty.
/// 2. No two stages write the same field.
/// 3. Every read and written field is in `defined_fields`.
pub fn validate_pipeline(
    stages: &[Box<dyn Stage>],
    defined_fields: &FieldSet,
) -> Result<PipelinePlan, PipelineError> {
    if stages.is_empty() {
        return Err(PipelineError::EmptyPipeline);
    }

    let mut owners: IndexMap<FieldKey, usize> = IndexMap::new();
    let mut conflicts: Vec<WriteConflict> = Vec::new();
    for (i, stage) in stages.iter().enumerate() {
        for field in stage.writes() {
            if let Some(&j) = owners.get(&field) {
                conflicts.push(WriteConflict {
                    field,
                    first_writer: stages[j].name().to_string(),
                    second_writer: stage.name().to_string(),
                });
            } else {
                owners.insert(field, i);
            }
        }
    }
    if !conflicts.is_empty() {
        return Err(PipelineError::WriteConflict(conflicts));
    }

    for stage in stages {
        let undefined = stage
            .reads()
            .iter()
            .chain(stage.writes())
            .find(|field| !defined_fields.contains(*field));
        if let Some(field) = undefined {
            return Err(PipelineError::UndefinedField {
                stage: stage.name().to_string(),
                field,
            });
        }
    }

    let written = owners.keys().copied().collect();
    Ok(PipelinePlan { owners, written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StepContext;
    use crate::stage::WriteList;
    use gyre_core::StageError;

    // ── Test stages ────────────────────────────────────────────

    struct Fixed {
        name: &'static str,
        reads: Vec<FieldKey>,
        writes: Vec<FieldKey>,
    }

    impl Stage for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn reads(&self) -> FieldSet {
            self.reads.iter().copied().collect()
        }
        fn writes(&self) -> WriteList {
            self.writes.iter().copied().collect()
        }
        fn step(&self, _ctx: &mut StepContext<'_>) -> Result<(), StageError> {
            Ok(())
        }
    }

    fn stage(name: &'static str, reads: &[FieldKey], writes: &[FieldKey]) -> Box<dyn Stage> {
        Box::new(Fixed {
            name,
            reads: reads.to_vec(),
            writes: writes.to_vec(),
        })
    }

    fn all_fields() -> FieldSet {
        FieldKey::ALL.into_iter().collect()
    }

    #[test]
    fn empty_pipeline_fails() {
        let result = validate_pipeline(&[], &all_fields());
        assert!(matches!(result, Err(PipelineError::EmptyPipeline)));
    }

    #[test]
    fn chained_stages_validate() {
        let stages = vec![
            stage("momentum", &[FieldKey::Rho], &[FieldKey::U, FieldKey::V]),
            stage("tracer", &[FieldKey::U, FieldKey::V], &[FieldKey::Temp, FieldKey::Rho]),
        ];
        let plan = validate_pipeline(&stages, &all_fields()).unwrap();
        assert_eq!(plan.owner(FieldKey::U), Some(0));
        assert_eq!(plan.owner(FieldKey::Rho), Some(1));
        assert_eq!(plan.owner(FieldKey::Salt), None);
        assert_eq!(plan.written().len(), 4);
    }

    #[test]
    fn write_conflict_is_rejected() {
        let stages = vec![
            stage("tke", &[], &[FieldKey::KappaM]),
            stage("eke", &[], &[FieldKey::KGm]),
            stage("closure_mixing", &[], &[FieldKey::KappaM, FieldKey::KGm]),
        ];
        match validate_pipeline(&stages, &all_fields()) {
            Err(PipelineError::WriteConflict(conflicts)) => {
                assert_eq!(conflicts.len(), 2);
                assert_eq!(conflicts[0].field, FieldKey::KappaM);
                assert_eq!(conflicts[0].first_writer, "tke");
                assert_eq!(conflicts[0].second_writer, "closure_mixing");
                assert_eq!(conflicts[1].first_writer, "eke");
            }
            other => panic!("expected WriteConflict, got {other:?}"),
        }
    }

    #[test]
    fn conflict_message_names_both_writers() {
        let stages = vec![
            stage("a", &[], &[FieldKey::Tke]),
            stage("b", &[], &[FieldKey::Tke]),
        ];
        let err = validate_pipeline(&stages, &all_fields()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'tke'"));
        assert!(msg.contains("'a'") && msg.contains("'b'"));
    }

    #[test]
    fn unallocated_field_is_rejected() {
        let defined: FieldSet = [FieldKey::U, FieldKey::V].into_iter().collect();
        let stages = vec![stage("tke", &[FieldKey::U], &[FieldKey::Tke])];
        assert_eq!(
            validate_pipeline(&stages, &defined).unwrap_err(),
            PipelineError::UndefinedField {
                stage: "tke".to_string(),
                field: FieldKey::Tke,
            }
        );
    }
}
