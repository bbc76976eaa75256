//! Halo exchange.
//!
//! The core only knows the logical contract: after `exchange` returns, every
//! halo cell of the array holds the value of the interior cell it mirrors.
//! The call is blocking. A distributed implementation plugs in behind the
//! same trait.

use crate::edge::ZonalBoundary;
use crate::shape::{Shape, HALO};

/// Refreshes the halo cells of a field.
pub trait HaloExchange: Send + Sync {
    /// Update halos of `data`, a field with `levels` values per column.
    fn exchange(&self, shape: &Shape, data: &mut [f64], levels: usize);
}

/// Single-partition exchange: cyclic wrap in x when enabled, nothing
/// otherwise (closed halos are land and stay at the zero sentinel).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CyclicExchange {
    boundary: ZonalBoundary,
}

impl CyclicExchange {
    /// Create an exchange for the given zonal boundary.
    pub fn new(boundary: ZonalBoundary) -> Self {
        Self { boundary }
    }
}

impl HaloExchange for CyclicExchange {
    fn exchange(&self, shape: &Shape, data: &mut [f64], levels: usize) {
        if self.boundary != ZonalBoundary::Cyclic {
            return;
        }
        debug_assert_eq!(data.len(), shape.columns() * levels);
        // One i-slab (all j and k for a fixed i) is contiguous.
        let slab = shape.nyt() * levels;
        let nx = shape.nx;
        // Western halo mirrors the easternmost interior columns.
        data.copy_within(nx * slab..(nx + HALO) * slab, 0);
        // Eastern halo mirrors the westernmost interior columns.
        data.copy_within(HALO * slab..2 * HALO * slab, (nx + HALO) * slab);
    }
}
