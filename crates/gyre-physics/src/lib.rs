//! Numerics and pipeline stages of the gyre ocean model.
//!
//! # Pipeline order (each step)
//!
//! 1. [`ForcingStage`]: provider fluxes into the surface fields
//! 2. [`ClosureMixing`]: `kappaM`, `kappaH`, `K_gm`, `K_iso` from the closure energies
//! 3. [`MomentumStage`]: `u`, `v`, `w`, `psi` and kinetic dissipation
//! 4. [`TracerStage`]: temperature, salinity, density, `Nsqr` and potential dissipation
//! 5. [`WGridStage`]: velocities on W cells for closure advection
//! 6. [`EkeStage`], [`IdemixStage`], [`TkeStage`]: closure energies
//! 7. [`BoundaryExchange`]: halo refresh of every written field
//!
//! Shared operators live in [`numerics`] and [`elliptic`]; the
//! configurable constants of every stage are in [`params`].

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod elliptic;
pub mod eos;
pub mod isoneutral;
pub mod numerics;
pub mod params;
pub mod stages;

mod closure;

pub use eos::EquationOfState;
pub use params::{
    AdvectionScheme, EkeParams, IdemixParams, IsoneutralParams, MomentumParams, SolverParams,
    TkeParams, TracerParams,
};
pub use stages::{
    BoundaryExchange, ClosureMixing, EkeStage, ForcingStage, IdemixStage, MomentumStage,
    TkeStage, TracerStage, WGridStage,
};
