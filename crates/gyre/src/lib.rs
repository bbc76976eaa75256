//! Gyre: a hydrostatic ocean circulation model with energetically
//! consistent turbulence closures.
//!
//! This is the top-level facade crate that re-exports the public API of
//! every gyre sub-crate. For most users, adding `gyre` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use gyre::prelude::*;
//!
//! // A 10x8 closed basin with 10 km cells and three layers.
//! let grid = GridBuilder::new(10, 8, 3)
//!     .uniform_spacing(1e4, 1e4)
//!     .dzt(vec![200.0, 100.0, 50.0])
//!     .coriolis(Coriolis::BetaPlane { f0: 1e-4, beta: 0.0 })
//!     .build()
//!     .unwrap();
//!
//! let config = ModelConfig {
//!     dt: 600.0,
//!     output_interval: 1,
//!     ..ModelConfig::default()
//! };
//! let mut model = Model::new(grid, config).unwrap();
//! let sink = MemorySink::new();
//! model.set_output_sink(Box::new(sink.clone()));
//! model.register_output(FieldKey::Temp);
//!
//! let report = model.advance_one_step(&NoForcing).unwrap();
//! assert_eq!(report.step, StepId(1));
//! assert_eq!(sink.frames().len(), 1);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `gyre-core` | Field keys, step ids, forcing, errors, constants |
//! | [`grid`] | `gyre-grid` | Staggered grid, masks, halo exchange |
//! | [`state`] | `gyre-state` | Time-level storage, transfer ledger, snapshots |
//! | [`stage`] | `gyre-stage` | Stage trait and pipeline validation |
//! | [`physics`] | `gyre-physics` | Numerics, solvers and the model stages |
//! | [`engine`] | `gyre-engine` | Configuration, stepping, output, diagnostics |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and constants (`gyre-core`).
///
/// Contains [`types::FieldKey`], [`types::StepId`], the
/// [`types::ForcingProvider`] trait and the stage error types.
pub use gyre_core as types;

/// Grid geometry and halo exchange (`gyre-grid`).
///
/// Build a [`grid::Grid`] with [`grid::GridBuilder`]; replace the
/// single-partition [`grid::CyclicExchange`] through the
/// [`grid::HaloExchange`] trait.
pub use gyre_grid as grid;

/// Model state (`gyre-state`).
///
/// [`state::ModelState`] holds every field with its three time levels;
/// [`state::TransferLedger`] records inter-closure energy transfers.
pub use gyre_state as state;

/// Stage trait and pipeline validation (`gyre-stage`).
///
/// [`stage::Stage`] is the extension point for custom model components.
pub use gyre_stage as stage;

/// Numerics and model stages (`gyre-physics`).
pub use gyre_physics as physics;

/// Model orchestration (`gyre-engine`).
///
/// [`engine::Model`] advances the state; [`engine::ModelConfig`] selects
/// and parameterises the stages.
pub use gyre_engine as engine;

/// Common imports for typical gyre usage.
///
/// ```rust
/// use gyre::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use gyre_core::{
        FieldAccess, FieldKey, FieldSet, ForcingProvider, NoForcing, SteadyForcing, StepId,
        SurfaceForcing,
    };

    // Errors
    pub use gyre_core::{ForcingError, StageError};

    // Grid
    pub use gyre_grid::{CoordinateSystem, Coriolis, Grid, GridBuilder, ZonalBoundary};

    // State
    pub use gyre_state::{ModelState, PanicSnapshot, TransferRoute};

    // Stage
    pub use gyre_stage::{Stage, StepContext, WriteList};

    // Engine
    pub use gyre_engine::{
        ConfigError, EnergyBudget, MemorySink, Model, ModelConfig, OutputSink, StepError,
        StepMetrics, StepReport,
    };
}
