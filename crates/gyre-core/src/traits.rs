//! Core abstraction traits for field access.

use crate::field::FieldKey;

/// Read-only access to model fields by key.
///
/// Implemented by the live model state and by its snapshots so that
/// output sinks and diagnostics can read fields without knowing how they
/// are stored. Prognostic fields are read at the `current` time level.
/// Returns `None` for fields that are not allocated in this configuration
/// (e.g. closure fields of a disabled closure).
pub trait FieldAccess {
    /// Read the data for a field as a flat slice including halo cells.
    fn field(&self, key: FieldKey) -> Option<&[f64]>;
}
