//! Time-step orchestration for the gyre ocean model.
//!
//! A [`Model`] is assembled from a [`Grid`](gyre_grid::Grid) and a
//! validated [`ModelConfig`]. Each call to [`Model::advance_one_step`]
//! runs the stage pipeline in a fixed order:
//!
//! ```text
//! forcing -> closure_mixing -> momentum -> tracer -> wgrid_velocity
//!         -> eke -> idemix -> tke -> exchange -> rotate
//! ```
//!
//! Stages of disabled closures are left out. The step either completes
//! and promotes every `next` slot, or fails, emits a
//! [`PanicSnapshot`](gyre_state::PanicSnapshot) and halts the model.
//!
//! Outputs are registered by field key and delivered as [`OutputFrame`]s
//! to an [`OutputSink`]; [`diagnostics`] holds the tracer monitor, the
//! overturning streamfunction and the energy budget.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod diagnostics;
pub mod metrics;
pub mod model;
pub mod output;

pub use config::{ConfigError, ModelConfig};
pub use diagnostics::{
    BolusOverturning, EnergyBudget, Moments, Overturning, TracerMonitor, TracerReport,
};
pub use metrics::StepMetrics;
pub use model::{Model, StepError, StepReport};
pub use output::{
    ChannelSink, MemorySink, OutputField, OutputFrame, OutputMessage, OutputRegistry, OutputSink,
    OutputVariable,
};
