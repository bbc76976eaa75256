//! Staggered C-grid geometry for the gyre ocean model.
//!
//! A [`Grid`] is built once by a [`GridBuilder`] from spacings, Coriolis
//! parameters and the bottom-index map, and is read-only afterwards. All
//! arrays carry a [`HALO`] of two cells in both horizontal directions; the
//! [`HaloExchange`] trait refreshes those halos after a field changes.
//!
//! # Layout
//!
//! Volume fields are stored `(i, j, k)` with `k` contiguous, so each water
//! column is one contiguous slice of length `nz`. Level `k = 0` is the
//! deepest level and `k = nz - 1` touches the surface.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod edge;
pub mod error;
pub mod exchange;
pub mod grid;
pub mod shape;

pub use edge::{CoordinateSystem, ZonalBoundary};
pub use error::GridError;
pub use exchange::{CyclicExchange, HaloExchange};
pub use grid::{Coriolis, Grid, GridBuilder};
pub use shape::{Shape, HALO};
