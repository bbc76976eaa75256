//! Numerics shared by the closure energy equations on the W grid.

use gyre_core::StageError;
use gyre_grid::Grid;
use gyre_state::{Prognostic, TimeLevels, TransferLedger, TransferRoute, WGridVelocity};
use rayon::prelude::*;

use crate::numerics::advection::{Advection, CellGeometry, FaceVelocity};
use crate::numerics::remap::t_to_w;
use crate::numerics::tridiag::{implicit_column, ColumnGeometry};
use crate::params::{AdvectionScheme, IdemixParams, TkeParams};

/// Whether drag losses (`K_diss_bot`) feed TKE.
///
/// They do when asked to, or when there is no wave field to take them.
pub(crate) fn bottom_friction_to_tke(tke: &TkeParams, idemix: &IdemixParams) -> bool {
    tke.enabled && (tke.store_bottom_friction || !idemix.enabled)
}

/// Whether drag losses (`K_diss_bot`) feed IDEMIX.
pub(crate) fn bottom_friction_to_idemix(tke: &TkeParams, idemix: &IdemixParams) -> bool {
    idemix.enabled && !(tke.enabled && tke.store_bottom_friction)
}

/// Finite-volume metrics of W cells.
pub(crate) fn w_cells(grid: &Grid) -> CellGeometry<'_> {
    CellGeometry {
        mask: &grid.mask_w,
        dx: &grid.dxt,
        dy: &grid.dyt,
        dz: &grid.dzw,
        cos_centre: &grid.cost,
        cos_north: &grid.cosu,
    }
}

/// Start the step: copy `current` into `next`, then add the
/// Adams-Bashforth advection increment when advection is enabled.
///
/// The advective tendency is stored in the `current` slot of `tendency`.
pub(crate) fn explicit_part(
    grid: &Grid,
    wgrid: Option<&WGridVelocity>,
    scheme: Option<AdvectionScheme>,
    dt: f64,
    (wc, wp): (f64, f64),
    energy: &mut Prognostic,
    tendency: &mut Prognostic,
    lv: TimeLevels,
) {
    let slots = energy.slots(lv);
    slots.next.copy_from_slice(slots.current);
    let (Some(scheme), Some(wg)) = (scheme, wgrid) else {
        return;
    };
    let adv = Advection::new(
        *grid.shape(),
        w_cells(grid),
        FaceVelocity {
            east: &wg.u,
            north: &wg.v,
            top: &wg.w,
        },
        scheme,
        dt,
    );
    let (now, past) = tendency.tendency(lv);
    adv.tendency(slots.current, now);
    let mask = &grid.mask_w;
    slots
        .next
        .par_iter_mut()
        .enumerate()
        .for_each(|(c, e)| *e += dt * (wc * now[c] + wp * past[c]) * mask[c]);
}

/// Implicit vertical diffusion, linear sink and explicit source on the W
/// cells of every wet interior column.
///
/// The diffusivity on the interface between W cells `k` and `k + 1` is
/// `alpha * (kappa[k] + kappa[k + 1]) / 2`. `terms(col, k)` returns
/// `(sink rate, source)` for one cell. Dry cells and halo columns are
/// zeroed.
pub(crate) fn solve_columns<F>(
    grid: &Grid,
    dt: f64,
    kappa: &[f64],
    alpha: f64,
    energy: &mut [f64],
    terms: F,
    solver: &'static str,
) -> Result<(), StageError>
where
    F: Fn(usize, usize) -> (f64, f64) + Sync,
{
    let s = *grid.shape();
    let nz = s.nz;
    let geom = ColumnGeometry {
        dz: &grid.dzw,
        dz_iface: &grid.dzt[1..],
    };
    energy
        .par_chunks_mut(nz)
        .enumerate()
        .try_for_each(|(col, x)| {
            let (i, j) = s.ij(col);
            let kb = grid.kbot[col];
            if kb == 0 || !s.is_interior(i, j) {
                x.fill(0.0);
                return Ok(());
            }
            let ks = kb - 1;
            x[..ks].fill(0.0);
            let base = col * nz;
            let ok = implicit_column(
                x,
                ks,
                dt,
                geom,
                |k| alpha * 0.5 * (kappa[base + k] + kappa[base + k + 1]),
                |k| terms(col, k).0,
                |k| terms(col, k).1,
            );
            if ok {
                Ok(())
            } else {
                Err(StageError::ExecutionFailed {
                    reason: format!("{solver}: singular column system at ({i}, {j})"),
                })
            }
        })
}

/// Conservative T-to-W remap of a whole field. Dry and halo columns are
/// zeroed, matching what [`Grid::integrate_t`] sees.
pub(crate) fn remap_to_w(grid: &Grid, t: &[f64]) -> Vec<f64> {
    let s = *grid.shape();
    let nz = s.nz;
    let mut out = vec![0.0; s.cells()];
    out.par_chunks_mut(nz).enumerate().for_each(|(col, w)| {
        let (i, j) = s.ij(col);
        let kb = grid.kbot[col];
        if kb == 0 || !s.is_interior(i, j) {
            return;
        }
        t_to_w(&t[col * nz..(col + 1) * nz], kb - 1, &grid.dzt, &grid.dzw, w);
    });
    out
}

/// Energy integral `dt Σ rate · volume` over wet T cells.
pub(crate) fn t_integral(grid: &Grid, dt: f64, rate: impl Fn(usize) -> f64) -> f64 {
    dt * grid.integrate_t(rate)
}

/// Record both sides of a transfer handled within one stage.
pub(crate) fn record(ledger: &mut TransferLedger, route: TransferRoute, sent: f64, received: f64) {
    ledger.record_sent(route, sent);
    ledger.record_received(route, received);
}

/// Energy integral `dt Σ rate · volume` over wet W cells.
pub(crate) fn w_integral(grid: &Grid, dt: f64, rate: impl Fn(usize) -> f64) -> f64 {
    dt * grid.integrate_w(rate)
}
