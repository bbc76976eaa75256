//! Mixing coefficients from the closure energies.

use std::f64::consts::{PI, SQRT_2};

use gyre_core::{FieldKey, FieldSet, StageError};
use gyre_grid::Grid;
use gyre_stage::{Stage, StepContext, WriteList};
use gyre_state::{ModelState, TimeLevels};
use rayon::prelude::*;

use crate::params::{EkeParams, IdemixParams, IsoneutralParams, TkeParams};

/// Recomputes `kappaM`, `kappaH`, `K_gm` and `K_iso` from the `current`
/// closure energies, before momentum and tracers consume them.
///
/// Coefficients of a disabled closure fall back to their constant
/// background values. The TKE mixing length and the EKE length scale are
/// stored alongside the closure fields for the energy stages.
#[derive(Clone, Debug)]
pub struct ClosureMixing {
    tke: TkeParams,
    eke: EkeParams,
    idemix: IdemixParams,
    iso: IsoneutralParams,
    kappa_m_0: f64,
    kappa_h_0: f64,
}

impl ClosureMixing {
    /// Bind the closure parameters and the background diffusivities.
    pub fn new(
        tke: TkeParams,
        eke: EkeParams,
        idemix: IdemixParams,
        iso: IsoneutralParams,
        kappa_m_0: f64,
        kappa_h_0: f64,
    ) -> Self {
        Self {
            tke,
            eke,
            idemix,
            iso,
            kappa_m_0,
            kappa_h_0,
        }
    }

    /// Vertical viscosity and diffusivity from TKE, with the Richardson
    /// number limited by internal-wave dissipation when IDEMIX runs.
    fn tke_mixing(&self, grid: &Grid, st: &mut ModelState, lv: TimeLevels) {
        let p = &self.tke;
        let nz = grid.shape().nz;
        let Some(tf) = st.tke.as_mut() else { return };
        let tke = tf.tke.current(lv);
        let nsqr = st.nsqr.current(lv);
        let k_diss_v = &st.dissipation.k_diss_v;
        let iw = st
            .idemix
            .as_ref()
            .map(|f| (f.e_iw.current(lv), f.alpha_c.as_slice()));

        tf.mxl
            .par_chunks_mut(nz)
            .zip(st.mixing.kappa_m.par_chunks_mut(nz))
            .zip(st.mixing.kappa_h.par_chunks_mut(nz))
            .enumerate()
            .for_each(|(col, ((mxl, km), kh))| {
                let ht = grid.ht[col];
                for k in 0..nz {
                    let c = col * nz + k;
                    let mask = grid.mask_w[c];
                    if mask == 0.0 {
                        mxl[k] = 0.0;
                        km[k] = 0.0;
                        kh[k] = 0.0;
                        continue;
                    }
                    let e = tke[c].max(0.0);
                    let n2 = nsqr[c];
                    let mut l = SQRT_2 * e.sqrt() / n2.max(1e-12).sqrt();
                    l = l
                        .min(-grid.zw[k] + 0.5 * grid.dzw[k])
                        .min(ht + grid.zw[k])
                        .max(p.mxl_min);
                    mxl[k] = l;

                    let m = (p.c_k * l * e.sqrt()).min(p.kappa_m_max);
                    let mut ri = n2 / (k_diss_v[c] / m.max(1e-12)).max(1e-12);
                    if let Some((e_iw, alpha_c)) = iw {
                        ri = ri.min(m * n2 / (alpha_c[c] * e_iw[c] * e_iw[c]).max(1e-12));
                    }
                    let prandtl = if p.richardson_prandtl {
                        (6.6 * ri).clamp(1.0, 10.0)
                    } else {
                        p.prandtl_number
                    };
                    kh[k] = m / prandtl * mask;
                    km[k] = m.max(p.kappa_m_min) * mask;
                }
            });
    }

    /// Osborn relation: internal-wave dissipation sets the diffusivity.
    fn osborn_mixing(&self, grid: &Grid, st: &mut ModelState, lv: TimeLevels) {
        let Some(iw) = st.idemix.as_ref() else { return };
        let nsqr = st.nsqr.current(lv);
        let prandtl = self.tke.prandtl_number;
        let (kappa_m_0, kappa_h_0) = (self.kappa_m_0, self.kappa_h_0);
        st.mixing
            .kappa_m
            .par_iter_mut()
            .zip(st.mixing.kappa_h.par_iter_mut())
            .enumerate()
            .for_each(|(c, (km, kh))| {
                let h = (0.2 * iw.diss[c] / nsqr[c].max(1e-12)).max(kappa_h_0);
                *kh = h * grid.mask_w[c];
                *km = (prandtl * h).max(kappa_m_0) * grid.mask_w[c];
            });
    }

    /// Eddy diffusivities from EKE with the length scale limited by the
    /// Rossby radius, the Rhines scale and `lmin`.
    fn eke_mixing(&self, grid: &Grid, st: &mut ModelState, lv: TimeLevels) {
        let p = &self.eke;
        let nz = grid.shape().nz;
        let Some(ef) = st.eke.as_mut() else { return };
        let eke = ef.eke.current(lv);
        let nsqr = st.nsqr.current(lv);
        let iso_follows = p.isopycnal_diffusion;
        let k_iso_0 = self.iso.k_iso_0;

        ef.length
            .par_chunks_mut(nz)
            .zip(st.mixing.k_gm.par_chunks_mut(nz))
            .zip(st.mixing.k_iso.par_chunks_mut(nz))
            .enumerate()
            .for_each(|(col, ((len, kgm), kiso))| {
                let base = col * nz;
                let c_rossby: f64 = (0..nz)
                    .map(|k| nsqr[base + k].max(0.0).sqrt() * grid.dzw[k] * grid.mask_w[base + k])
                    .sum::<f64>()
                    / PI;
                let f = grid.coriolis_t[col].abs();
                let beta = grid.beta[col];
                let l_rossby = (c_rossby / f.max(1e-16))
                    .min((c_rossby / (2.0 * beta).max(1e-16)).sqrt());
                for k in 0..nz {
                    let c = base + k;
                    let mask = grid.mask_w[c];
                    let e = eke[c].max(0.0);
                    let l_rhines = (e.sqrt() / beta.max(1e-16)).sqrt();
                    let l = (p.cross * l_rossby).min(p.crhin * l_rhines).max(p.lmin);
                    len[k] = l * mask;
                    kgm[k] = (p.c_k * e.sqrt() * l).min(p.k_max) * mask;
                    kiso[k] = if iso_follows { kgm[k] } else { k_iso_0 * mask };
                }
            });
    }
}

impl Stage for ClosureMixing {
    fn name(&self) -> &str {
        "closure_mixing"
    }

    fn reads(&self) -> FieldSet {
        let mut set: FieldSet = [FieldKey::Nsqr, FieldKey::KDissV].into_iter().collect();
        if self.tke.enabled {
            set.insert(FieldKey::Tke);
        }
        if self.eke.enabled {
            set.insert(FieldKey::Eke);
        }
        if self.idemix.enabled {
            set.insert(FieldKey::EIw);
            set.insert(FieldKey::IwDiss);
        }
        set
    }

    fn writes(&self) -> WriteList {
        [
            FieldKey::KappaM,
            FieldKey::KappaH,
            FieldKey::KGm,
            FieldKey::KIso,
        ]
        .into_iter()
        .collect()
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError> {
        let grid = ctx.grid();
        let lv = ctx.levels();
        let st = ctx.state_mut();

        if self.tke.enabled {
            self.tke_mixing(grid, st, lv);
        } else if self.idemix.enabled {
            self.osborn_mixing(grid, st, lv);
        } else {
            fill_masked(&mut st.mixing.kappa_m, &grid.mask_w, self.kappa_m_0);
            fill_masked(&mut st.mixing.kappa_h, &grid.mask_w, self.kappa_h_0);
        }

        if self.eke.enabled {
            self.eke_mixing(grid, st, lv);
        } else {
            fill_masked(&mut st.mixing.k_gm, &grid.mask_w, self.iso.k_gm_0);
            fill_masked(&mut st.mixing.k_iso, &grid.mask_w, self.iso.k_iso_0);
        }

        log::debug!(
            "closure_mixing: max kappaM = {:.3e}, max K_gm = {:.3e}",
            st.mixing.kappa_m.iter().copied().fold(0.0, f64::max),
            st.mixing.k_gm.iter().copied().fold(0.0, f64::max),
        );
        Ok(())
    }
}

/// Set `out = value * mask`.
fn fill_masked(out: &mut [f64], mask: &[f64], value: f64) {
    for (o, m) in out.iter_mut().zip(mask) {
        *o = value * m;
    }
}
