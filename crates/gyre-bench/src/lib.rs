//! Benchmark profiles for the gyre ocean model.
//!
//! Each profile is a ready-to-run [`Profile`]:
//!
//! - [`reference_profile`]: 60x40x15 spherical sector, no closures
//! - [`closures_profile`]: same sector with TKE, EKE and IDEMIX enabled
//! - [`stress_profile`]: 180x120x30 global-band sector, no closures

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use gyre_core::{SteadyForcing, SurfaceForcing};
use gyre_engine::{ConfigError, Model, ModelConfig};
use gyre_grid::{CoordinateSystem, Coriolis, Grid, GridBuilder, GridError, ZonalBoundary};
use gyre_state::ModelState;

/// Grid, configuration, initial state and forcing of one benchmark run.
pub struct Profile {
    /// Model grid.
    pub grid: Grid,
    /// Model configuration.
    pub config: ModelConfig,
    /// Initial state, stratified and at rest.
    pub state: ModelState,
    /// Steady surface forcing.
    pub forcing: SteadyForcing,
}

impl Profile {
    /// Assemble the model.
    pub fn into_model(self) -> Result<(Model, SteadyForcing), ConfigError> {
        let model = Model::with_state(self.grid, self.config, self.state)?;
        Ok((model, self.forcing))
    }
}

/// 60x40x15 cyclic sector from 40S to 40N at 2 degrees, dt = 1800 s.
pub fn reference_profile() -> Result<Profile, GridError> {
    let grid = sector(60, 40, 15, 2.0)?;
    let config = ModelConfig {
        dt: 1800.0,
        ..ModelConfig::default()
    };
    Ok(profile(grid, config))
}

/// [`reference_profile`] geometry with every closure enabled.
pub fn closures_profile() -> Result<Profile, GridError> {
    let grid = sector(60, 40, 15, 2.0)?;
    Ok(profile(grid, ModelConfig::global_closures()))
}

/// 180x120x30 cyclic sector at 2/3 degree, dt = 900 s.
pub fn stress_profile() -> Result<Profile, GridError> {
    let grid = sector(180, 120, 30, 2.0 / 3.0)?;
    let config = ModelConfig {
        dt: 900.0,
        ..ModelConfig::default()
    };
    Ok(profile(grid, config))
}

/// Cyclic spherical sector centred on the equator with a sloping bottom
/// towards the southern and northern walls.
fn sector(nx: usize, ny: usize, nz: usize, deg: f64) -> Result<Grid, GridError> {
    let dzt: Vec<f64> = (0..nz).map(|k| 10.0 + 40.0 * (nz - 1 - k) as f64).collect();
    let kbot: Vec<usize> = (0..nx * ny)
        .map(|n| {
            let j = n % ny;
            let from_wall = j.min(ny - 1 - j);
            1 + (nz / 3).saturating_sub(from_wall)
        })
        .collect();
    GridBuilder::new(nx, ny, nz)
        .coordinates(CoordinateSystem::Spherical)
        .boundary(ZonalBoundary::Cyclic)
        .coriolis(Coriolis::Spherical)
        .origin(0.0, -(ny as f64) * deg / 2.0 + deg / 2.0)
        .uniform_spacing(deg, deg)
        .dzt(dzt)
        .kbot(kbot)
        .build()
}

fn profile(grid: Grid, config: ModelConfig) -> Profile {
    let mut state = ModelState::new(&grid, config.allocation());
    let s = *grid.shape();
    let span = (s.nz.max(2) - 1) as f64;
    let lv = state.levels;
    for slot in [lv.past(), lv.current()] {
        for (c, t) in state.temp.slot_mut(slot).iter_mut().enumerate() {
            let k = (c % s.nz) as f64;
            *t = (2.0 + 18.0 * k / span) * grid.mask_t[c];
        }
        for (x, m) in state.salt.slot_mut(slot).iter_mut().zip(&grid.mask_t) {
            *x = 35.0 * m;
        }
    }

    // Easterlies in the tropics, westerlies poleward.
    let mut forcing = SurfaceForcing::zeros(s.columns());
    for col in 0..s.columns() {
        let (_, j) = s.ij(col);
        let lat = grid.yt[j].to_radians();
        forcing.taux[col] = -1e-4 * (3.0 * lat).cos();
        forcing.iw_bottom[col] = 1e-6;
        forcing.iw_surface[col] = 1e-7;
    }
    Profile {
        grid,
        config,
        state,
        forcing: SteadyForcing::new(forcing),
    }
}
