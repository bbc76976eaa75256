//! Surface forcing update.

use gyre_core::{FieldKey, FieldSet, StageError};
use gyre_stage::{Stage, StepContext, WriteList};

/// Fetches this step's forcing from the provider and copies it into the
/// surface flux fields.
///
/// Also derives the wind-driven TKE input `|τ|^{3/2}` on T columns. A
/// provider that cannot supply the exact model time fails the step; there
/// is no fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForcingStage;

impl ForcingStage {
    /// Create the stage.
    pub fn new() -> Self {
        Self
    }
}

impl Stage for ForcingStage {
    fn name(&self) -> &str {
        "forcing"
    }

    fn reads(&self) -> FieldSet {
        FieldSet::empty()
    }

    fn writes(&self) -> WriteList {
        [
            FieldKey::SurfaceTaux,
            FieldKey::SurfaceTauy,
            FieldKey::TempFlux,
            FieldKey::SaltFlux,
            FieldKey::TkeSurfaceFlux,
            FieldKey::IwBottomFlux,
            FieldKey::IwSurfaceFlux,
            FieldKey::M2Forcing,
            FieldKey::NiwForcing,
        ]
        .into_iter()
        .collect()
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError> {
        let grid = ctx.grid();
        let s = *grid.shape();
        let columns = s.columns();
        let time = ctx.time();
        let forcing = ctx.forcing().forcing(time, columns)?;
        forcing.validate(columns)?;
        log::trace!("forcing: fluxes for t = {time} s");

        let sf = &mut ctx.state_mut().surface;
        sf.taux.copy_from_slice(&forcing.taux);
        sf.tauy.copy_from_slice(&forcing.tauy);
        sf.temp_flux.copy_from_slice(&forcing.temp_flux);
        sf.salt_flux.copy_from_slice(&forcing.salt_flux);
        sf.iw_bottom.copy_from_slice(&forcing.iw_bottom);
        sf.iw_surface.copy_from_slice(&forcing.iw_surface);
        sf.m2.copy_from_slice(&forcing.m2);
        sf.niw.copy_from_slice(&forcing.niw);

        sf.tke_flux.fill(0.0);
        for i in 0..s.nxt() {
            for j in 0..s.nyt() {
                let c = s.col(i, j);
                if !s.has_neighbours(i, j) || grid.kbot[c] == 0 {
                    continue;
                }
                let tx = 0.5 * (sf.taux[c] + sf.taux[s.col(i - 1, j)]);
                let ty = 0.5 * (sf.tauy[c] + sf.tauy[s.col(i, j - 1)]);
                sf.tke_flux[c] = (tx * tx + ty * ty).sqrt().powf(1.5);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_core::{ForcingError, SteadyForcing, SurfaceForcing};
    use gyre_grid::{CyclicExchange, GridBuilder, ZonalBoundary, HALO};
    use gyre_state::{Allocation, ModelState};

    #[test]
    fn stress_is_copied_and_tke_flux_derived() {
        let grid = GridBuilder::new(3, 3, 2).build().unwrap();
        let s = *grid.shape();
        let mut f = SurfaceForcing::zeros(s.columns());
        f.taux.fill(3e-4);
        f.tauy.fill(4e-4);
        let provider = SteadyForcing::new(f);
        let mut state = ModelState::new(&grid, Allocation::default());
        let ex = CyclicExchange::new(ZonalBoundary::Closed);
        let mut ctx = StepContext::new(&grid, &mut state, &ex, &provider, 60.0);
        ForcingStage::new().step(&mut ctx).unwrap();
        let c = s.col(HALO + 1, HALO + 1);
        let expected = 5e-4_f64.powf(1.5);
        assert!((state.surface.tke_flux[c] - expected).abs() < 1e-18);
        assert_eq!(state.surface.taux[c], 3e-4);
    }

    #[test]
    fn unavailable_forcing_fails_the_stage() {
        let grid = GridBuilder::new(2, 2, 1).build().unwrap();
        let provider = |time: f64, _columns: usize| -> Result<SurfaceForcing, ForcingError> {
            Err(ForcingError::Unavailable { time })
        };
        let mut state = ModelState::new(&grid, Allocation::default());
        let ex = CyclicExchange::new(ZonalBoundary::Closed);
        let mut ctx = StepContext::new(&grid, &mut state, &ex, &provider, 60.0);
        let err = ForcingStage::new().step(&mut ctx).unwrap_err();
        assert_eq!(
            err,
            StageError::Forcing(ForcingError::Unavailable { time: 0.0 })
        );
    }
}
