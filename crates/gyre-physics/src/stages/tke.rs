//! Turbulent kinetic energy.

use gyre_core::{FieldKey, FieldSet, StageError};
use gyre_stage::{Stage, StepContext, WriteList};
use gyre_state::{ModelState, TransferRoute};

use crate::closure::{
    bottom_friction_to_tke, explicit_part, record, remap_to_w, solve_columns, t_integral,
    w_integral,
};
use crate::numerics::ab_weights;
use crate::params::{EkeParams, IdemixParams, TkeParams};

/// Advances TKE on the W grid.
///
/// Production is shear dissipation `K_diss_v` minus the buoyancy flux
/// `P_diss_v`, plus whatever the other closures hand over: EKE and
/// internal-wave dissipation and, depending on routing, drag losses. Wind
/// input enters the surface cell. Dissipation `c_eps E^1.5 / mxl` and
/// vertical diffusion with `alpha_tke * kappaM` are implicit.
#[derive(Clone, Debug)]
pub struct TkeStage {
    params: TkeParams,
    from_eke: bool,
    from_idemix: bool,
    from_drag: bool,
    ab_eps: f64,
}

impl TkeStage {
    /// Bind the TKE parameters; the other closures decide what flows in.
    pub fn new(params: TkeParams, eke: &EkeParams, idemix: &IdemixParams, ab_eps: f64) -> Self {
        let from_drag = bottom_friction_to_tke(&params, idemix);
        Self {
            params,
            from_eke: eke.enabled,
            from_idemix: idemix.enabled,
            from_drag,
            ab_eps,
        }
    }
}

impl Stage for TkeStage {
    fn name(&self) -> &str {
        "tke"
    }

    fn reads(&self) -> FieldSet {
        let mut set: FieldSet = [
            FieldKey::Tke,
            FieldKey::DTke,
            FieldKey::KappaM,
            FieldKey::KDissV,
            FieldKey::PDissV,
            FieldKey::TkeSurfaceFlux,
        ]
        .into_iter()
        .collect();
        if self.from_eke {
            set.insert(FieldKey::EkeDissTke);
        }
        if self.from_idemix {
            set.insert(FieldKey::IwDiss);
        }
        if self.from_drag {
            set.insert(FieldKey::KDissBot);
        }
        if self.params.advection.is_some() {
            set.insert(FieldKey::UWgrid);
            set.insert(FieldKey::VWgrid);
            set.insert(FieldKey::WWgrid);
        }
        set
    }

    fn writes(&self) -> WriteList {
        [FieldKey::Tke, FieldKey::DTke, FieldKey::TkeDiss]
            .into_iter()
            .collect()
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError> {
        let grid = ctx.grid();
        let dt = ctx.dt();
        let lv = ctx.levels();
        let weights = ab_weights(self.ab_eps, ctx.is_first_step());
        let p = &self.params;
        let nz = grid.shape().nz;
        let top = nz - 1;

        let ModelState {
            tke,
            eke,
            idemix,
            wgrid,
            mixing,
            dissipation,
            surface,
            transfers,
            ..
        } = ctx.state_mut();
        let tf = tke.as_mut().ok_or_else(|| StageError::ExecutionFailed {
            reason: "tke fields not allocated".into(),
        })?;

        explicit_part(
            grid,
            wgrid.as_ref(),
            p.advection,
            dt,
            weights,
            &mut tf.tke,
            &mut tf.dtke,
            lv,
        );

        let drag = self
            .from_drag
            .then(|| remap_to_w(grid, &dissipation.k_diss_bot));
        let from_eke = eke.as_ref().filter(|_| self.from_eke).map(|f| &f.diss_tke);
        let from_iw = idemix.as_ref().filter(|_| self.from_idemix).map(|f| &f.diss);
        let k_diss_v = &dissipation.k_diss_v;
        let p_diss_v = &dissipation.p_diss_v;
        let forcing = |c: usize| {
            k_diss_v[c] - p_diss_v[c]
                + drag.as_ref().map_or(0.0, |d| d[c])
                + from_eke.map_or(0.0, |d| d[c])
                + from_iw.map_or(0.0, |d| d[c])
        };

        let sl = tf.tke.slots(lv);
        let current: &[f64] = sl.current;
        let mxl = &tf.mxl;
        let floor = p.mxl_min.max(gyre_core::constants::EPSLN);
        let sink = |c: usize| p.c_eps * current[c].max(0.0).sqrt() / mxl[c].max(floor);
        let tke_flux = &surface.tke_flux;

        solve_columns(
            grid,
            dt,
            &mixing.kappa_m,
            p.alpha_tke,
            &mut *sl.next,
            |col, k| {
                let c = col * nz + k;
                let wind = if k == top { tke_flux[col] / grid.dzw[top] } else { 0.0 };
                (sink(c), forcing(c) + wind)
            },
            "tke",
        )?;

        let next: &[f64] = sl.next;
        for (c, d) in tf.diss.iter_mut().enumerate() {
            *d = sink(c) * next[c] * grid.mask_w[c];
        }

        let bot = &dissipation.k_diss_bot;
        record(
            transfers,
            TransferRoute::ShearToTke,
            w_integral(grid, dt, |c| k_diss_v[c]),
            w_integral(grid, dt, |c| k_diss_v[c] * grid.mask_w[c]),
        );
        record(
            transfers,
            TransferRoute::BuoyancyToTke,
            -w_integral(grid, dt, |c| p_diss_v[c]),
            -w_integral(grid, dt, |c| p_diss_v[c] * grid.mask_w[c]),
        );
        if let Some(d) = &drag {
            record(
                transfers,
                TransferRoute::BottomFrictionToTke,
                t_integral(grid, dt, |c| bot[c]),
                w_integral(grid, dt, |c| d[c]),
            );
        }
        if let Some(d) = from_eke {
            transfers.record_received(TransferRoute::EkeToTke, w_integral(grid, dt, |c| d[c]));
        }
        if let Some(d) = from_iw {
            transfers.record_received(TransferRoute::IdemixToTke, w_integral(grid, dt, |c| d[c]));
        }

        log::trace!(
            "tke: dissipated {:.3e}, wind input {:.3e}",
            w_integral(grid, dt, |c| tf.diss[c]),
            dt * grid.integrate_surface(|col| tke_flux[col]),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_core::NoForcing;
    use gyre_grid::{CyclicExchange, Grid, GridBuilder, ZonalBoundary, HALO};
    use gyre_state::Allocation;

    fn setup() -> (Grid, ModelState) {
        let grid = GridBuilder::new(2, 2, 3)
            .dzt(vec![30.0, 20.0, 10.0])
            .build()
            .unwrap();
        let alloc = Allocation {
            tke: true,
            ..Allocation::default()
        };
        let state = ModelState::new(&grid, alloc);
        (grid, state)
    }

    fn enabled() -> TkeParams {
        TkeParams {
            enabled: true,
            ..TkeParams::default()
        }
    }

    fn run(stage: &TkeStage, grid: &Grid, state: &mut ModelState, dt: f64) {
        let ex = CyclicExchange::new(ZonalBoundary::Closed);
        let mut ctx = StepContext::new(grid, state, &ex, &NoForcing, dt);
        stage.step(&mut ctx).unwrap();
    }

    #[test]
    fn unforced_tke_decays_implicitly() {
        let (grid, mut state) = setup();
        let lv = state.levels;
        let tf = state.tke.as_mut().unwrap();
        for (c, e) in tf.tke.slot_mut(lv.current()).iter_mut().enumerate() {
            *e = 1e-4 * grid.mask_w[c];
        }
        tf.mxl.fill(10.0);
        let stage = TkeStage::new(enabled(), &EkeParams::default(), &IdemixParams::default(), 0.1);
        let dt = 600.0;
        run(&stage, &grid, &mut state, dt);

        let c = grid.idx(HALO, HALO, 1);
        let tf = state.tke.as_ref().unwrap();
        let rate = 0.7 * 1e-2 / 10.0;
        let expected = 1e-4 / (1.0 + dt * rate);
        assert!((tf.tke.next(lv)[c] - expected).abs() < 1e-15);
        assert!((tf.diss[c] - rate * expected).abs() < 1e-18);
    }

    #[test]
    fn shear_production_is_balanced_in_the_ledger() {
        let (grid, mut state) = setup();
        for (c, k) in state.dissipation.k_diss_v.iter_mut().enumerate() {
            *k = 1e-8 * grid.mask_w[c];
        }
        state.tke.as_mut().unwrap().mxl.fill(1.0);
        let stage = TkeStage::new(enabled(), &EkeParams::default(), &IdemixParams::default(), 0.1);
        run(&stage, &grid, &mut state, 100.0);

        let gained = state
            .tke
            .as_ref()
            .map(|f| grid.integrate_w(|c| f.tke.next(state.levels)[c]))
            .unwrap();
        let shear = state.transfers.get(TransferRoute::ShearToTke).unwrap();
        assert!(shear.sent > 0.0);
        assert!((gained - shear.received).abs() < 1e-12 * shear.received);
        assert!(state.transfers.check(1e-12).is_empty());
    }

    #[test]
    fn drag_goes_to_tke_without_idemix() {
        let (grid, mut state) = setup();
        let c = grid.idx(HALO + 1, HALO, 0);
        state.dissipation.k_diss_bot[c] = 1e-6;
        state.tke.as_mut().unwrap().mxl.fill(1.0);
        let stage = TkeStage::new(enabled(), &EkeParams::default(), &IdemixParams::default(), 0.1);
        assert!(stage.reads().contains(FieldKey::KDissBot));
        run(&stage, &grid, &mut state, 100.0);
        let t = state.transfers.get(TransferRoute::BottomFrictionToTke).unwrap();
        assert!((t.sent - t.received).abs() < 1e-12 * t.sent);
    }
}
