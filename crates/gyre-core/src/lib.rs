//! Core types and traits for the gyre ocean model.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! vocabulary shared by every other crate in the workspace: step ids,
//! field keys and their staggering, error types, the forcing and field
//! access traits, and physical constants.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod constants;
pub mod error;
pub mod field;
pub mod forcing;
pub mod id;
pub mod traits;

pub use error::{ForcingError, StageError};
pub use field::{FieldKey, FieldKind, FieldMeta, FieldSet, GridPoint, Rank};
pub use forcing::{ForcingProvider, NoForcing, SteadyForcing, SurfaceForcing};
pub use id::StepId;
pub use traits::FieldAccess;
