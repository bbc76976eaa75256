//! Temperature and salinity with the equation of state.

use gyre_core::constants::{GRAV, RHO_0};
use gyre_core::{FieldKey, FieldSet, StageError};
use gyre_grid::Grid;
use gyre_stage::{Stage, StepContext, WriteList};
use gyre_state::{IsoneutralTensor, ModelState};
use rayon::prelude::*;

use crate::isoneutral::{compute_tensor, IsoneutralFluxes};
use crate::numerics::advection::{Advection, CellGeometry, FaceVelocity};
use crate::numerics::lateral::{biharmonic, harmonic};
use crate::numerics::tridiag::{implicit_column, ColumnGeometry};
use crate::numerics::{ab_step, ab_weights};
use crate::params::{IsoneutralParams, TracerParams};

fn t_cells(grid: &Grid) -> CellGeometry<'_> {
    CellGeometry {
        mask: &grid.mask_t,
        dx: &grid.dxt,
        dy: &grid.dyt,
        dz: &grid.dzt,
        cos_centre: &grid.cost,
        cos_north: &grid.cosu,
    }
}

/// Tracer stage: advection, lateral diffusion, isoneutral and skew
/// diffusion, implicit vertical diffusion with surface fluxes, then the
/// equation of state for `rho` and `Nsqr`.
///
/// Only advection goes through Adams-Bashforth; the mixing terms are
/// applied forward from the `current` tracer.
#[derive(Clone, Debug)]
pub struct TracerStage {
    params: TracerParams,
    iso: IsoneutralParams,
    ab_eps: f64,
}

impl TracerStage {
    /// Bind the tracer and isoneutral parameters.
    pub fn new(params: TracerParams, iso: IsoneutralParams, ab_eps: f64) -> Self {
        Self {
            params,
            iso,
            ab_eps,
        }
    }
}

/// Density tendency `drdT · tend_T + drdS · tend_S` turned into a
/// potential-energy rate on T cells.
fn potential_rate(grid: &Grid, drdt: &[f64], drds: &[f64], tt: &[f64], ts: &[f64], out: &mut [f64]) {
    let nz = grid.shape().nz;
    out.par_iter_mut().enumerate().for_each(|(c, o)| {
        let z = grid.zt[c % nz];
        *o = GRAV / RHO_0 * z * (drdt[c] * tt[c] + drds[c] * ts[c]) * grid.mask_t[c];
    });
}

impl Stage for TracerStage {
    fn name(&self) -> &str {
        "tracer"
    }

    fn reads(&self) -> FieldSet {
        let mut set: FieldSet = [
            FieldKey::Temp,
            FieldKey::Salt,
            FieldKey::U,
            FieldKey::V,
            FieldKey::W,
            FieldKey::KappaH,
            FieldKey::TempFlux,
            FieldKey::SaltFlux,
            FieldKey::DTemp,
            FieldKey::DSalt,
        ]
        .into_iter()
        .collect();
        if self.iso.enabled {
            set.insert(FieldKey::KIso);
            set.insert(FieldKey::KGm);
        }
        set
    }

    fn writes(&self) -> WriteList {
        let mut w: WriteList = [
            FieldKey::Temp,
            FieldKey::Salt,
            FieldKey::Rho,
            FieldKey::Nsqr,
            FieldKey::DTemp,
            FieldKey::DSalt,
            FieldKey::PDissV,
            FieldKey::PDissIso,
            FieldKey::PDissSkew,
            FieldKey::PDissNonlin,
            FieldKey::PDissComp,
        ]
        .into_iter()
        .collect();
        if self.iso.enabled {
            w.push(FieldKey::K33);
        }
        w
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError> {
        let grid = ctx.grid();
        let exchange = ctx.exchange();
        let dt = ctx.dt();
        let lv = ctx.levels();
        let weights = ab_weights(self.ab_eps, ctx.is_first_step());
        let s = *grid.shape();
        let (n, nz) = (s.cells(), s.nz);
        let top = nz - 1;
        let eos = self.params.eos;

        let ModelState {
            u,
            v,
            w,
            temp,
            salt,
            rho,
            nsqr,
            dtemp,
            dsalt,
            mixing,
            dissipation,
            surface,
            isoneutral,
            ..
        } = ctx.state_mut();

        let mut taper = vec![1.0; n];
        let tensor: Option<&IsoneutralTensor> = match (self.iso.enabled, isoneutral.as_mut()) {
            (true, Some(t)) => {
                compute_tensor(
                    grid,
                    eos,
                    &self.iso,
                    temp.current(lv),
                    salt.current(lv),
                    &mixing.k_iso,
                    t,
                    &mut taper,
                );
                Some(&*t)
            }
            (true, None) => {
                return Err(StageError::ExecutionFailed {
                    reason: "isoneutral tensor not allocated".into(),
                })
            }
            _ => None,
        };
        let fluxes = tensor.map(|t| IsoneutralFluxes {
            grid,
            tensor: t,
            taper: &taper,
            k_iso: &mixing.k_iso,
            k_gm: &mixing.k_gm,
            k_iso_steep: self.iso.k_iso_steep,
            skew: self.iso.skew_diffusion,
        });
        let k33 = |c: usize| tensor.map_or(0.0, |t| t.k33[c]);

        let adv = Advection::new(
            s,
            t_cells(grid),
            FaceVelocity {
                east: u.next(lv),
                north: v.next(lv),
                top: w.next(lv),
            },
            self.params.advection,
            dt,
        );
        let kappa_h = &mixing.kappa_h;
        let mut scratch = vec![0.0; n];
        let mut tend = vec![0.0; n];
        let mut iso_tend = [vec![0.0; n], vec![0.0; n]];
        let mut skew_tend = [vec![0.0; n], vec![0.0; n]];

        let tracers = [
            (&mut *temp, &mut *dtemp, &surface.temp_flux),
            (&mut *salt, &mut *dsalt, &surface.salt_flux),
        ];
        for (m, (q, dq, flux)) in tracers.into_iter().enumerate() {
            let sl = q.slots(lv);
            let (now, past) = dq.tendency(lv);
            adv.tendency(sl.current, now);
            ab_step(sl.next, sl.current, now, past, &grid.mask_t, dt, weights);

            if self.params.k_h > 0.0 {
                let k_h = self.params.k_h;
                harmonic(grid, &grid.mask_t, |_, _| k_h, sl.current, &mut tend);
                sl.next.iter_mut().zip(&tend).for_each(|(x, t)| *x += dt * t);
            }
            if self.params.k_hbi > 0.0 {
                biharmonic(
                    grid,
                    exchange,
                    &grid.mask_t,
                    self.params.k_hbi,
                    sl.current,
                    &mut scratch,
                    &mut tend,
                );
                sl.next.iter_mut().zip(&tend).for_each(|(x, t)| *x += dt * t);
            }
            if let Some(f) = &fluxes {
                f.tendencies(sl.current, &mut iso_tend[m], &mut skew_tend[m]);
                for c in 0..n {
                    sl.next[c] += dt * (iso_tend[m][c] + skew_tend[m][c]);
                }
            }

            sl.next
                .par_chunks_mut(nz)
                .enumerate()
                .try_for_each(|(col, x)| {
                    let kb = grid.kbot[col];
                    if kb == 0 {
                        return Ok(());
                    }
                    let base = col * nz;
                    let ok = implicit_column(
                        x,
                        kb - 1,
                        dt,
                        ColumnGeometry::t_cells(&grid.dzt, &grid.dzw),
                        |k| kappa_h[base + k] + k33(base + k),
                        |_| 0.0,
                        |k| if k == top { flux[col] / grid.dzt[top] } else { 0.0 },
                    );
                    if ok {
                        Ok(())
                    } else {
                        Err(StageError::ExecutionFailed {
                            reason: format!("tracer: singular diffusion system in column {col}"),
                        })
                    }
                })?;
            exchange.exchange(&s, sl.next, nz);
        }

        // Equation of state on the new tracers.
        let (t_new, s_new) = (temp.next(lv), salt.next(lv));
        let (t_old, s_old) = (temp.current(lv), salt.current(lv));
        let depth = |c: usize| -grid.zt[c % nz];
        eos.diagnose(grid, t_new, s_new, rho.next_mut(lv), nsqr.next_mut(lv));

        let n2_new = nsqr.next(lv);
        dissipation
            .p_diss_v
            .par_iter_mut()
            .enumerate()
            .for_each(|(c, p)| *p = kappa_h[c] * n2_new[c] * grid.mask_w[c]);

        let drdt: Vec<f64> = (0..n)
            .map(|c| eos.drho_dt(t_old[c], s_old[c], depth(c)))
            .collect();
        let drds: Vec<f64> = (0..n)
            .map(|c| eos.drho_ds(t_old[c], s_old[c], depth(c)))
            .collect();
        potential_rate(grid, &drdt, &drds, &iso_tend[0], &iso_tend[1], &mut dissipation.p_diss_iso);
        potential_rate(grid, &drdt, &drds, &skew_tend[0], &skew_tend[1], &mut dissipation.p_diss_skew);

        dissipation
            .p_diss_nonlin
            .par_iter_mut()
            .zip(dissipation.p_diss_comp.par_iter_mut())
            .enumerate()
            .for_each(|(c, (nonlin, comp))| {
                let z = grid.zt[c % nz];
                let (dtt, dss) = (t_new[c] - t_old[c], s_new[c] - s_old[c]);
                let d = depth(c);
                let residual = eos.density(t_new[c], s_new[c], d)
                    - eos.density(t_old[c], s_old[c], d)
                    - drdt[c] * dtt
                    - drds[c] * dss;
                *nonlin = GRAV / RHO_0 * z * residual / dt * grid.mask_t[c];
                *comp = if eos.is_compressible() {
                    let at_surface = (
                        eos.drho_dt(t_old[c], s_old[c], 0.0),
                        eos.drho_ds(t_old[c], s_old[c], 0.0),
                    );
                    GRAV / RHO_0 * z
                        * ((drdt[c] - at_surface.0) * dtt + (drds[c] - at_surface.1) * dss)
                        / dt
                        * grid.mask_t[c]
                } else {
                    0.0
                };
            });

        log::debug!(
            "tracer: step done, P_diss_v integral = {:.3e}",
            grid.integrate_w(|c| dissipation.p_diss_v[c])
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_core::NoForcing;
    use gyre_grid::{CyclicExchange, GridBuilder, ZonalBoundary};
    use gyre_state::Allocation;

    fn column_grid() -> Grid {
        GridBuilder::new(2, 2, 3)
            .uniform_spacing(1e4, 1e4)
            .dzt(vec![100.0, 50.0, 25.0])
            .build()
            .unwrap()
    }

    fn run(stage: &TracerStage, grid: &Grid, state: &mut ModelState, dt: f64) {
        let ex = CyclicExchange::new(ZonalBoundary::Closed);
        let mut ctx = StepContext::new(grid, state, &ex, &NoForcing, dt);
        stage.step(&mut ctx).unwrap();
    }

    #[test]
    fn surface_flux_heats_the_ocean() {
        let grid = column_grid();
        let s = *grid.shape();
        let mut state = ModelState::new(&grid, Allocation::default());
        let lv = state.levels;
        for c in 0..s.cells() {
            state.temp.slot_mut(lv.current())[c] = 10.0 * grid.mask_t[c];
        }
        state.surface.temp_flux.fill(1e-5);
        state.mixing.kappa_h.fill(1e-3);
        let stage = TracerStage::new(TracerParams::default(), IsoneutralParams::default(), 0.1);
        let dt = 3600.0;
        run(&stage, &grid, &mut state, dt);
        let gained = grid.integrate_t(|c| state.temp.next(lv)[c] - state.temp.current(lv)[c]);
        let expected = dt * grid.integrate_surface(|_| 1e-5);
        assert!((gained - expected).abs() < 1e-9 * expected);
    }

    #[test]
    fn stable_stratification_has_positive_nsqr() {
        let grid = column_grid();
        let s = *grid.shape();
        let mut state = ModelState::new(&grid, Allocation::default());
        let lv = state.levels;
        for c in 0..s.cells() {
            let k = c % s.nz;
            state.temp.slot_mut(lv.current())[c] = (5.0 + 3.0 * k as f64) * grid.mask_t[c];
            state.salt.slot_mut(lv.current())[c] = 35.0 * grid.mask_t[c];
        }
        let stage = TracerStage::new(TracerParams::default(), IsoneutralParams::default(), 0.1);
        run(&stage, &grid, &mut state, 600.0);
        let col = grid.col(2, 2);
        let n2 = &state.nsqr.next(lv)[col * s.nz..(col + 1) * s.nz];
        assert!(n2[0] > 0.0 && n2[1] > 0.0);
        assert_eq!(n2[2], n2[1]);
        // Nothing mixes, so no potential energy is gained.
        assert!(state.dissipation.p_diss_v.iter().all(|&p| p == 0.0));
        assert!(state.dissipation.p_diss_nonlin.iter().all(|&p| p == 0.0));
    }
}
