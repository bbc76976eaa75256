//! Stage trait and step context for the gyre ocean model.
//!
//! A time step is an ordered pipeline of named [`Stage`]s. Each stage
//! declares the fields it reads and writes; [`validate_pipeline`] rejects
//! pipelines where two stages write the same field, so every `next` slot
//! has exactly one writer per step.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod context;
pub mod pipeline;
pub mod stage;

pub use context::StepContext;
pub use pipeline::{validate_pipeline, PipelineError, PipelinePlan, WriteConflict};
pub use stage::{Stage, WriteList};
