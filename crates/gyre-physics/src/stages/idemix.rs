//! Internal-wave energy (IDEMIX) and its M2 and near-inertial bands.

use std::f64::consts::PI;

use gyre_core::{FieldKey, FieldSet, StageError};
use gyre_grid::Grid;
use gyre_stage::{Stage, StepContext, WriteList};
use gyre_state::{IdemixFields, ModelState, TimeLevels, TransferRoute, WaveBandFields};
use rayon::prelude::*;

use crate::closure::{
    bottom_friction_to_idemix, explicit_part, record, remap_to_w, solve_columns, t_integral,
    w_integral,
};
use crate::numerics::ab_weights;
use crate::numerics::lateral::harmonic;
use crate::params::{EkeParams, IdemixParams, TkeParams};

/// Vertical group-speed shape factor of the wave spectrum.
fn gofx2(x: f64) -> f64 {
    let x = x.max(3.0);
    let c = 1.0 - (2.0 / PI) * (1.0 / x).asin();
    2.0 / PI / c * 0.9 * x.powf(-2.0 / 3.0) * (1.0 - (-x / 4.3).exp())
}

/// Horizontal group-speed shape factor of the wave spectrum.
fn hofx1(x: f64) -> f64 {
    if x <= 1.0 {
        return 0.0;
    }
    (2.0 / PI) / (1.0 - (2.0 / PI) * (1.0 / x).asin()) * (x - 1.0) / (x + 1.0)
}

/// Advances internal-wave energy `E_iw` on the W grid.
///
/// Sources are the bottom and surface wave fluxes from the forcing, the
/// EKE dissipation share and lee-wave flux, drag losses when routed here,
/// and the decay of the M2 (bottom) and near-inertial (surface) bands.
/// Vertical symmetrisation `tau_v c0^2` and dissipation `alpha_c E^2` are
/// implicit; horizontal symmetrisation `tau_h v0^2` is explicit.
#[derive(Clone, Debug)]
pub struct IdemixStage {
    params: IdemixParams,
    from_eke: bool,
    from_lee_waves: bool,
    from_drag: bool,
    to_tke: bool,
    ab_eps: f64,
}

impl IdemixStage {
    /// Bind the IDEMIX parameters; the other closures decide the coupling.
    pub fn new(params: IdemixParams, tke: &TkeParams, eke: &EkeParams, ab_eps: f64) -> Self {
        let from_drag = bottom_friction_to_idemix(tke, &params);
        Self {
            params,
            from_eke: eke.enabled,
            from_lee_waves: eke.enabled && eke.leewave_dissipation,
            from_drag,
            to_tke: tke.enabled,
            ab_eps,
        }
    }

    /// Group speeds `c0`, `v0` and the dissipation coefficient `alpha_c`
    /// from the `current` stratification.
    fn wave_parameters(&self, grid: &Grid, nsqr: &[f64], iw: &mut IdemixFields) {
        let p = &self.params;
        let nz = grid.shape().nz;
        iw.c0
            .par_chunks_mut(nz)
            .zip(iw.v0.par_chunks_mut(nz))
            .zip(iw.alpha_c.par_chunks_mut(nz))
            .enumerate()
            .for_each(|(col, ((c0, v0), alpha))| {
                let base = col * nz;
                let n = |k: usize| nsqr[base + k].max(0.0).sqrt();
                let bn0: f64 = (0..nz)
                    .map(|k| n(k) * grid.dzw[k] * grid.mask_w[base + k])
                    .sum();
                let cstar = (bn0 / (PI * p.jstar)).max(1e-2);
                let f = grid.coriolis_t[col].abs();
                for k in 0..nz {
                    let mask = grid.mask_w[base + k];
                    let fxa = n(k) / (1e-22 + f);
                    c0[k] = (p.gamma * cstar * gofx2(fxa)).max(0.0) * mask;
                    v0[k] = (p.gamma * cstar * hofx1(fxa)).max(0.0) * mask;
                    let a = p.mu0 * fxa.max(1.0).acosh() * f / (cstar * cstar);
                    alpha[k] = a.max(1e-4) * mask;
                }
            });
    }
}

/// Implicit decay of the vertically integrated bands. Returns the decay
/// rates `(M2, NIW)` per column handed to the wave field.
fn advance_bands(
    grid: &Grid,
    p: &IdemixParams,
    dt: f64,
    lv: TimeLevels,
    bands: &mut WaveBandFields,
    m2: &[f64],
    niw: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let s = *grid.shape();
    let mut rates = (vec![0.0; s.columns()], vec![0.0; s.columns()]);
    for (band, forcing, tau, rate) in [
        (&mut bands.e_m2, m2, p.tau_m2, &mut rates.0),
        (&mut bands.e_niw, niw, p.tau_niw, &mut rates.1),
    ] {
        let sl = band.slots(lv);
        for col in 0..s.columns() {
            let (i, j) = s.ij(col);
            if grid.kbot[col] == 0 || !s.is_interior(i, j) {
                sl.next[col] = 0.0;
                continue;
            }
            sl.next[col] = (sl.current[col] + dt * forcing[col]) / (1.0 + dt / tau);
            rate[col] = sl.next[col] / tau;
        }
    }
    rates
}

impl Stage for IdemixStage {
    fn name(&self) -> &str {
        "idemix"
    }

    fn reads(&self) -> FieldSet {
        let mut set: FieldSet = [
            FieldKey::EIw,
            FieldKey::DEIw,
            FieldKey::Nsqr,
            FieldKey::IwBottomFlux,
            FieldKey::IwSurfaceFlux,
        ]
        .into_iter()
        .collect();
        if self.from_eke {
            set.insert(FieldKey::EkeDissIw);
        }
        if self.from_lee_waves {
            set.insert(FieldKey::EkeLeeFlux);
        }
        if self.from_drag {
            set.insert(FieldKey::KDissBot);
        }
        if self.params.wave_bands {
            set.insert(FieldKey::EM2);
            set.insert(FieldKey::ENiw);
            set.insert(FieldKey::M2Forcing);
            set.insert(FieldKey::NiwForcing);
        }
        if self.params.advection.is_some() {
            set.insert(FieldKey::UWgrid);
            set.insert(FieldKey::VWgrid);
            set.insert(FieldKey::WWgrid);
        }
        set
    }

    fn writes(&self) -> WriteList {
        let mut w: WriteList = [FieldKey::EIw, FieldKey::DEIw, FieldKey::IwDiss]
            .into_iter()
            .collect();
        if self.params.wave_bands {
            w.push(FieldKey::EM2);
            w.push(FieldKey::ENiw);
        }
        w
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError> {
        let grid = ctx.grid();
        let dt = ctx.dt();
        let lv = ctx.levels();
        let weights = ab_weights(self.ab_eps, ctx.is_first_step());
        let p = &self.params;
        let s = *grid.shape();
        let (n, nz) = (s.cells(), s.nz);
        let top = nz - 1;

        let ModelState {
            idemix,
            eke,
            wave_bands,
            wgrid,
            nsqr,
            dissipation,
            surface,
            transfers,
            ..
        } = ctx.state_mut();
        let iw = idemix.as_mut().ok_or_else(|| StageError::ExecutionFailed {
            reason: "idemix fields not allocated".into(),
        })?;

        self.wave_parameters(grid, nsqr.current(lv), iw);
        explicit_part(
            grid,
            wgrid.as_ref(),
            p.advection,
            dt,
            weights,
            &mut iw.e_iw,
            &mut iw.de_iw,
            lv,
        );

        let IdemixFields {
            e_iw,
            diss,
            c0,
            v0,
            alpha_c,
            ..
        } = iw;
        let (c0, v0, alpha_c) = (&*c0, &*v0, &*alpha_c);
        let sl = e_iw.slots(lv);

        if p.hor_diffusion {
            let mut tend = vec![0.0; n];
            let tau_h = p.tau_h;
            harmonic(
                grid,
                &grid.mask_w,
                |a, b| tau_h * 0.5 * (v0[a] * v0[a] + v0[b] * v0[b]),
                sl.current,
                &mut tend,
            );
            sl.next
                .iter_mut()
                .zip(&tend)
                .for_each(|(e, t)| *e += dt * t);
        }

        let (m2_decay, niw_decay) = match (p.wave_bands, wave_bands.as_mut()) {
            (true, Some(bands)) => {
                advance_bands(grid, p, dt, lv, bands, &surface.m2, &surface.niw)
            }
            (true, None) => {
                return Err(StageError::ExecutionFailed {
                    reason: "wave band fields not allocated".into(),
                })
            }
            _ => (vec![0.0; s.columns()], vec![0.0; s.columns()]),
        };

        let drag = self
            .from_drag
            .then(|| remap_to_w(grid, &dissipation.k_diss_bot));
        let eke_diss = eke.as_ref().filter(|_| self.from_eke).map(|f| &f.diss_iw);
        let lee = eke
            .as_ref()
            .filter(|_| self.from_lee_waves)
            .map(|f| &f.lee_flux);

        // Column-integrated inputs at the bottom and surface cells.
        let bottom_in =
            |col: usize| surface.iw_bottom[col] + lee.map_or(0.0, |f| f[col]) + m2_decay[col];
        let surface_in = |col: usize| surface.iw_surface[col] + niw_decay[col];

        let kappa: Vec<f64> = c0.iter().map(|c| p.tau_v * c * c).collect();
        let current: &[f64] = sl.current;
        let sink = |c: usize| alpha_c[c] * current[c].max(0.0);

        solve_columns(
            grid,
            dt,
            &kappa,
            1.0,
            &mut *sl.next,
            |col, k| {
                let c = col * nz + k;
                let mut source =
                    eke_diss.map_or(0.0, |d| d[c]) + drag.as_ref().map_or(0.0, |d| d[c]);
                if grid.kbot[col] == k + 1 {
                    source += bottom_in(col) / grid.dzw[k];
                }
                if k == top {
                    source += surface_in(col) / grid.dzw[top];
                }
                (sink(c), source)
            },
            "idemix",
        )?;

        let next: &[f64] = sl.next;
        for (c, d) in diss.iter_mut().enumerate() {
            *d = sink(c) * next[c] * grid.mask_w[c];
        }

        if let Some(d) = eke_diss {
            transfers.record_received(TransferRoute::EkeToIdemix, w_integral(grid, dt, |c| d[c]));
        }
        if let Some(f) = lee {
            transfers.record_received(
                TransferRoute::LeeWavesToIdemix,
                dt * grid.integrate_surface(|col| f[col]),
            );
        }
        if let Some(d) = &drag {
            let bot = &dissipation.k_diss_bot;
            record(
                transfers,
                TransferRoute::BottomFrictionToIdemix,
                t_integral(grid, dt, |c| bot[c]),
                w_integral(grid, dt, |c| d[c]),
            );
        }
        if p.wave_bands {
            let m2 = dt * grid.integrate_surface(|col| m2_decay[col]);
            let niw = dt * grid.integrate_surface(|col| niw_decay[col]);
            record(transfers, TransferRoute::TidalBandToIdemix, m2, m2);
            record(transfers, TransferRoute::NearInertialBandToIdemix, niw, niw);
        }
        if self.to_tke {
            transfers.record_sent(TransferRoute::IdemixToTke, w_integral(grid, dt, |c| diss[c]));
        }

        log::trace!(
            "idemix: dissipated {:.3e}, max c0 = {:.3e}",
            w_integral(grid, dt, |c| diss[c]),
            c0.iter().copied().fold(0.0, f64::max),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_core::NoForcing;
    use gyre_grid::{CyclicExchange, GridBuilder, ZonalBoundary, HALO};
    use gyre_state::Allocation;

    fn enabled() -> IdemixParams {
        IdemixParams {
            enabled: true,
            ..IdemixParams::default()
        }
    }

    fn alloc(wave_bands: bool) -> Allocation {
        Allocation {
            idemix: true,
            wave_bands,
            ..Allocation::default()
        }
    }

    fn run(stage: &IdemixStage, grid: &Grid, state: &mut ModelState, dt: f64) {
        let ex = CyclicExchange::new(ZonalBoundary::Closed);
        let mut ctx = StepContext::new(grid, state, &ex, &NoForcing, dt);
        stage.step(&mut ctx).unwrap();
    }

    #[test]
    fn spectral_shape_factors() {
        assert_eq!(gofx2(0.5), gofx2(3.0));
        assert!(gofx2(10.0) < gofx2(3.0));
        assert_eq!(hofx1(1.0), 0.0);
        assert!(hofx1(50.0) > hofx1(5.0));
    }

    #[test]
    fn bottom_and_surface_fluxes_are_conserved() {
        let grid = GridBuilder::new(3, 2, 4)
            .dzt(vec![40.0, 30.0, 20.0, 10.0])
            .kbot(vec![1, 2, 3, 4, 1, 2])
            .build()
            .unwrap();
        let mut state = ModelState::new(&grid, alloc(false));
        let lv = state.levels;
        let s = *grid.shape();
        for c in 0..s.cells() {
            state.nsqr.slot_mut(lv.current())[c] = 1e-5 * grid.mask_w[c];
        }
        state.surface.iw_bottom.fill(2e-6);
        state.surface.iw_surface.fill(1e-6);
        let stage = IdemixStage::new(enabled(), &TkeParams::default(), &EkeParams::default(), 0.1);
        let dt = 3600.0;
        run(&stage, &grid, &mut state, dt);

        let gained = grid.integrate_w(|c| state.idemix.as_ref().unwrap().e_iw.next(lv)[c]);
        let expected = dt * grid.integrate_surface(|_| 3e-6);
        assert!((gained - expected).abs() < 1e-10 * expected);
        let iw = state.idemix.as_ref().unwrap();
        assert!(iw.c0.iter().all(|&c| c >= 0.0));
        assert!(iw.alpha_c[grid.idx(HALO, HALO, 3)] >= 1e-4);
    }

    #[test]
    fn m2_band_decays_into_the_bottom_cell() {
        let grid = GridBuilder::new(1, 1, 1).dzt(vec![100.0]).build().unwrap();
        let mut state = ModelState::new(&grid, alloc(true));
        let col = grid.col(HALO, HALO);
        state.surface.m2[col] = 1e-3;
        let params = IdemixParams {
            wave_bands: true,
            ..enabled()
        };
        let stage = IdemixStage::new(params.clone(), &TkeParams::default(), &EkeParams::default(), 0.1);
        let dt = 3600.0;
        run(&stage, &grid, &mut state, dt);

        let lv = state.levels;
        let band = state.wave_bands.as_ref().unwrap().e_m2.next(lv)[col];
        let expected_band = dt * 1e-3 / (1.0 + dt / params.tau_m2);
        assert!((band - expected_band).abs() < 1e-15);
        let e = state.idemix.as_ref().unwrap().e_iw.next(lv)[grid.idx(HALO, HALO, 0)];
        let expected = dt * band / params.tau_m2 / grid.dzw[0];
        assert!((e - expected).abs() < 1e-12 * expected);
        assert!(state.transfers.check(1e-12).is_empty());
        assert!(state.transfers.get(TransferRoute::TidalBandToIdemix).is_some());
    }
}
