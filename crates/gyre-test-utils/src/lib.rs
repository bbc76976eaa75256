//! Test fixtures and mock types for gyre development.
//!
//! Provides small grids, initial states, mock [`ForcingProvider`]s and the
//! mock stages in [`fixtures`] for driving pipelines in tests.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::Mutex;

use gyre_core::{ForcingError, ForcingProvider, SurfaceForcing};
use gyre_grid::{Coriolis, Grid, GridBuilder, ZonalBoundary};
use gyre_state::{Allocation, ModelState};

pub use fixtures::{ConstStage, FailingStage, NanStage};

/// Closed flat-bottomed basin with 10 km cells and uneven layers.
pub fn closed_basin(nx: usize, ny: usize, nz: usize) -> Grid {
    basin_builder(nx, ny, nz).build().expect("valid basin grid")
}

/// Zonally cyclic channel on a mid-latitude beta plane.
pub fn channel(nx: usize, ny: usize, nz: usize) -> Grid {
    basin_builder(nx, ny, nz)
        .boundary(ZonalBoundary::Cyclic)
        .coriolis(Coriolis::BetaPlane {
            f0: 1e-4,
            beta: 2e-11,
        })
        .build()
        .expect("valid channel grid")
}

/// Closed basin with a stepped bottom: column `(i, j)` has
/// `1 + (i + j) % nz` wet levels, and the corner column is land.
pub fn stepped_basin(nx: usize, ny: usize, nz: usize) -> Grid {
    let mut kbot: Vec<usize> = (0..nx * ny)
        .map(|n| {
            let (i, j) = (n / ny, n % ny);
            nz - (i + j) % nz
        })
        .collect();
    kbot[0] = 0;
    basin_builder(nx, ny, nz)
        .kbot(kbot)
        .build()
        .expect("valid stepped grid")
}

fn basin_builder(nx: usize, ny: usize, nz: usize) -> GridBuilder {
    let dzt: Vec<f64> = (0..nz).map(|k| 50.0 * (nz - k) as f64).collect();
    GridBuilder::new(nx, ny, nz)
        .uniform_spacing(1e4, 1e4)
        .dzt(dzt)
}

/// Set `current` and `past` of every wet tracer cell to a uniform state.
pub fn uniform_tracers(state: &mut ModelState, grid: &Grid, temp: f64, salt: f64) {
    let lv = state.levels;
    for slot in [lv.past(), lv.current()] {
        for (t, m) in state.temp.slot_mut(slot).iter_mut().zip(&grid.mask_t) {
            *t = temp * m;
        }
        for (s, m) in state.salt.slot_mut(slot).iter_mut().zip(&grid.mask_t) {
            *s = salt * m;
        }
    }
}

/// A resting state with temperature falling linearly from `top` at the
/// surface to `bottom` at the deepest level and salinity 35.
pub fn stratified_state(grid: &Grid, alloc: Allocation, top: f64, bottom: f64) -> ModelState {
    let mut state = ModelState::new(grid, alloc);
    let s = *grid.shape();
    let lv = state.levels;
    let span = (s.nz.max(2) - 1) as f64;
    for slot in [lv.past(), lv.current()] {
        let temp = state.temp.slot_mut(slot);
        for (c, t) in temp.iter_mut().enumerate() {
            let k = (c % s.nz) as f64;
            *t = (bottom + (top - bottom) * k / span) * grid.mask_t[c];
        }
        for (x, m) in state.salt.slot_mut(slot).iter_mut().zip(&grid.mask_t) {
            *x = 35.0 * m;
        }
    }
    state
}

/// Forcing that is available only up to (and including) `until`.
#[derive(Clone, Copy, Debug)]
pub struct ForcingUntil {
    pub until: f64,
}

impl ForcingProvider for ForcingUntil {
    fn forcing(&self, time: f64, columns: usize) -> Result<SurfaceForcing, ForcingError> {
        if time > self.until {
            return Err(ForcingError::Unavailable { time });
        }
        Ok(SurfaceForcing::zeros(columns))
    }
}

/// Returns arrays of the wrong length.
#[derive(Clone, Copy, Debug, Default)]
pub struct MisshapenForcing;

impl ForcingProvider for MisshapenForcing {
    fn forcing(&self, _time: f64, columns: usize) -> Result<SurfaceForcing, ForcingError> {
        Ok(SurfaceForcing::zeros(columns + 1))
    }
}

/// Zero forcing that records every requested time.
#[derive(Debug, Default)]
pub struct RecordingForcing {
    times: Mutex<Vec<f64>>,
}

impl RecordingForcing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Times requested so far, in call order.
    pub fn times(&self) -> Vec<f64> {
        self.times.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl ForcingProvider for RecordingForcing {
    fn forcing(&self, time: f64, columns: usize) -> Result<SurfaceForcing, ForcingError> {
        if let Ok(mut t) = self.times.lock() {
            t.push(time);
        }
        Ok(SurfaceForcing::zeros(columns))
    }
}

/// Uniform wind stress on every column.
pub fn uniform_wind(columns: usize, taux: f64) -> SurfaceForcing {
    SurfaceForcing {
        taux: vec![taux; columns],
        ..SurfaceForcing::zeros(columns)
    }
}
