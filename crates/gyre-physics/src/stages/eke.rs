//! Mesoscale eddy kinetic energy.

use gyre_core::constants::EPSLN;
use gyre_core::{FieldKey, FieldSet, StageError};
use gyre_stage::{Stage, StepContext, WriteList};
use gyre_state::{ModelState, TransferRoute};

use crate::closure::{explicit_part, record, remap_to_w, solve_columns, t_integral, w_integral};
use crate::numerics::ab_weights;
use crate::params::{EkeParams, IdemixParams, TkeParams};

/// Advances EKE on the W grid.
///
/// Production is lateral friction `K_diss_h` plus the release of available
/// potential energy `-P_diss_skew`, both remapped conservatively from T
/// cells. Interior dissipation `c_eps E^1.5 / L`, bottom drag and the
/// lee-wave sink are implicit. Dissipation is split between IDEMIX and TKE
/// by `diss_iw_fraction`; the lee-wave flux always goes to IDEMIX.
#[derive(Clone, Debug)]
pub struct EkeStage {
    params: EkeParams,
    to_tke: bool,
    to_idemix: bool,
    lee_waves: bool,
    ab_eps: f64,
}

impl EkeStage {
    /// Bind the EKE parameters; the other closures decide where the
    /// dissipation goes.
    pub fn new(params: EkeParams, tke: &TkeParams, idemix: &IdemixParams, ab_eps: f64) -> Self {
        let lee_waves = params.leewave_dissipation && idemix.enabled;
        Self {
            params,
            to_tke: tke.enabled,
            to_idemix: idemix.enabled,
            lee_waves,
            ab_eps,
        }
    }
}

impl Stage for EkeStage {
    fn name(&self) -> &str {
        "eke"
    }

    fn reads(&self) -> FieldSet {
        let mut set: FieldSet = [
            FieldKey::Eke,
            FieldKey::DEke,
            FieldKey::KappaM,
            FieldKey::KDissH,
            FieldKey::PDissSkew,
            FieldKey::Nsqr,
        ]
        .into_iter()
        .collect();
        if self.params.advection.is_some() {
            set.insert(FieldKey::UWgrid);
            set.insert(FieldKey::VWgrid);
            set.insert(FieldKey::WWgrid);
        }
        set
    }

    fn writes(&self) -> WriteList {
        [
            FieldKey::Eke,
            FieldKey::DEke,
            FieldKey::EkeDiss,
            FieldKey::EkeDissIw,
            FieldKey::EkeDissTke,
            FieldKey::EkeLeeFlux,
        ]
        .into_iter()
        .collect()
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError> {
        let grid = ctx.grid();
        let dt = ctx.dt();
        let lv = ctx.levels();
        let weights = ab_weights(self.ab_eps, ctx.is_first_step());
        let p = &self.params;
        let s = *grid.shape();
        let nz = s.nz;

        let ModelState {
            eke,
            wgrid,
            nsqr,
            mixing,
            dissipation,
            transfers,
            ..
        } = ctx.state_mut();
        let ef = eke.as_mut().ok_or_else(|| StageError::ExecutionFailed {
            reason: "eke fields not allocated".into(),
        })?;

        explicit_part(
            grid,
            wgrid.as_ref(),
            p.advection,
            dt,
            weights,
            &mut ef.eke,
            &mut ef.deke,
            lv,
        );

        let friction = remap_to_w(grid, &dissipation.k_diss_h);
        let skew = remap_to_w(grid, &dissipation.p_diss_skew);

        // Bottom-cell sink rates per column: linear drag, then lee waves.
        let n2 = nsqr.current(lv);
        let bottom: Vec<(f64, f64)> = (0..s.columns())
            .map(|col| {
                let kb = grid.kbot[col];
                if kb == 0 {
                    return (0.0, 0.0);
                }
                let ks = kb - 1;
                let drag = p.r_bot / grid.dzw[ks];
                let lee = if self.lee_waves {
                    p.c_lee0 * grid.hrms_k0[col] * n2[col * nz + ks].max(0.0).sqrt() / grid.dzw[ks]
                } else {
                    0.0
                };
                (drag, lee)
            })
            .collect();

        let sl = ef.eke.slots(lv);
        let current: &[f64] = sl.current;
        let length = &ef.length;
        let floor = p.lmin.max(EPSLN);
        // Dissipation rate excluding the lee-wave sink.
        let diss_rate = |col: usize, k: usize| {
            let c = col * nz + k;
            let interior = p.c_eps * current[c].max(0.0).sqrt() / length[c].max(floor);
            let at_bottom = grid.kbot[col] == k + 1;
            interior + if at_bottom { bottom[col].0 } else { 0.0 }
        };

        solve_columns(
            grid,
            dt,
            &mixing.kappa_m,
            p.alpha_eke,
            &mut *sl.next,
            |col, k| {
                let c = col * nz + k;
                let lee = if grid.kbot[col] == k + 1 { bottom[col].1 } else { 0.0 };
                (diss_rate(col, k) + lee, friction[c] - skew[c])
            },
            "eke",
        )?;

        let next: &[f64] = sl.next;
        for (c, d) in ef.diss.iter_mut().enumerate() {
            *d = diss_rate(c / nz, c % nz) * next[c] * grid.mask_w[c];
        }
        for (col, f) in ef.lee_flux.iter_mut().enumerate() {
            let kb = grid.kbot[col];
            *f = if kb == 0 {
                0.0
            } else {
                bottom[col].1 * next[col * nz + kb - 1] * grid.dzw[kb - 1]
            };
        }
        let (iw_share, tke_share) =
            dissipation_shares(self.to_idemix, self.to_tke, p.diss_iw_fraction);
        for c in 0..s.cells() {
            ef.diss_iw[c] = iw_share * ef.diss[c];
            ef.diss_tke[c] = tke_share * ef.diss[c];
        }

        let k_diss_h = &dissipation.k_diss_h;
        let p_diss_skew = &dissipation.p_diss_skew;
        record(
            transfers,
            TransferRoute::LateralFrictionToEke,
            t_integral(grid, dt, |c| k_diss_h[c]),
            w_integral(grid, dt, |c| friction[c]),
        );
        record(
            transfers,
            TransferRoute::SkewFluxToEke,
            -t_integral(grid, dt, |c| p_diss_skew[c]),
            -w_integral(grid, dt, |c| skew[c]),
        );
        if self.to_idemix {
            let d = &ef.diss_iw;
            transfers.record_sent(TransferRoute::EkeToIdemix, w_integral(grid, dt, |c| d[c]));
        }
        if self.to_tke {
            let d = &ef.diss_tke;
            transfers.record_sent(TransferRoute::EkeToTke, w_integral(grid, dt, |c| d[c]));
        }
        if self.lee_waves {
            let f = &ef.lee_flux;
            transfers.record_sent(
                TransferRoute::LeeWavesToIdemix,
                dt * grid.integrate_surface(|col| f[col]),
            );
        }

        log::trace!(
            "eke: dissipated {:.3e}",
            w_integral(grid, dt, |c| ef.diss[c])
        );
        Ok(())
    }
}

/// Fractions of EKE dissipation handed to IDEMIX and TKE. A lone receiver
/// takes all of it; with neither enabled the energy leaves the closures.
fn dissipation_shares(to_idemix: bool, to_tke: bool, iw_fraction: f64) -> (f64, f64) {
    match (to_idemix, to_tke) {
        (true, true) => (iw_fraction, 1.0 - iw_fraction),
        (true, false) => (1.0, 0.0),
        (false, true) => (0.0, 1.0),
        (false, false) => (0.0, 0.0),
    }
}
