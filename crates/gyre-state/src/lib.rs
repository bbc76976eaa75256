//! Field store for the gyre ocean model.
//!
//! Prognostic fields keep three time slots addressed by a rotating
//! [`TimeLevels`] triple:
//!
//! ```text
//! slots:    [ A ] [ B ] [ C ]
//! step n:   past  curr  next      levels = (0, 1, 2)
//! rotate:   next  past  curr      levels = (1, 2, 0)
//! ```
//!
//! Advancing time swaps three small integers and never copies data.
//! Closure fields are optional components allocated once from the
//! [`Allocation`] flags, so a disabled closure owns no memory.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod ledger;
pub mod levels;
pub mod prognostic;
pub mod snapshot;
pub mod state;

pub use ledger::{Transfer, TransferLedger, TransferRoute, TransferViolation};
pub use levels::TimeLevels;
pub use prognostic::{Prognostic, Slots};
pub use snapshot::PanicSnapshot;
pub use state::{
    Allocation, Dissipation, EkeFields, IdemixFields, IsoneutralTensor, Mixing, ModelState,
    SurfaceFields, TkeFields, WGridVelocity, WaveBandFields,
};
