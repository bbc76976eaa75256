//! Domain diagnostics computed between steps.
//!
//! The tracer monitor and the energy budget read the `current` level
//! through [`FieldAccess`], so they work on the live state and on a
//! [`PanicSnapshot`](gyre_state::PanicSnapshot) alike. The overturning
//! also needs the isoneutral slopes and reads the [`ModelState`]. Sums run
//! sequentially in a fixed order.

use gyre_core::constants::{GRAV, RHO_0};
use gyre_core::{FieldAccess, FieldKey};
use gyre_grid::Grid;
use gyre_physics::EquationOfState;
use gyre_state::ModelState;

// ── Tracer monitor ─────────────────────────────────────────────────

/// Volume-weighted moments of one tracer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Moments {
    /// Mean.
    pub mean: f64,
    /// Variance about the mean.
    pub variance: f64,
}

impl Moments {
    fn of(grid: &Grid, data: &[f64]) -> Self {
        let volume = grid.integrate_t(|_| 1.0);
        if volume <= 0.0 {
            return Self::default();
        }
        let mean = grid.integrate_t(|c| data[c]) / volume;
        let variance = grid.integrate_t(|c| (data[c] - mean).powi(2)) / volume;
        Self { mean, variance }
    }
}

/// One tracer-monitor reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TracerReport {
    /// Temperature moments.
    pub temp: Moments,
    /// Salinity moments.
    pub salt: Moments,
    /// Change of temperature moments since the previous reading.
    pub temp_change: Option<Moments>,
    /// Change of salinity moments since the previous reading.
    pub salt_change: Option<Moments>,
}

/// Tracks global tracer content between readings.
#[derive(Clone, Debug, Default)]
pub struct TracerMonitor {
    last: Option<(Moments, Moments)>,
}

impl TracerMonitor {
    /// A monitor with no previous reading.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reading and log it at `info`.
    ///
    /// Returns `None` if temperature or salinity is not available.
    pub fn observe(&mut self, grid: &Grid, fields: &dyn FieldAccess) -> Option<TracerReport> {
        let temp = Moments::of(grid, fields.field(FieldKey::Temp)?);
        let salt = Moments::of(grid, fields.field(FieldKey::Salt)?);
        let diff = |now: Moments, then: Moments| Moments {
            mean: now.mean - then.mean,
            variance: now.variance - then.variance,
        };
        let report = TracerReport {
            temp,
            salt,
            temp_change: self.last.map(|(t, _)| diff(temp, t)),
            salt_change: self.last.map(|(_, s)| diff(salt, s)),
        };
        self.last = Some((temp, salt));

        let dt = report.temp_change.unwrap_or_default();
        let ds = report.salt_change.unwrap_or_default();
        log::info!(
            "mean temperature {:.6e} change {:.2e}",
            temp.mean,
            dt.mean
        );
        log::info!("mean salinity {:.6e} change {:.2e}", salt.mean, ds.mean);
        log::info!(
            "temperature variance {:.6e} change {:.2e}",
            temp.variance,
            dt.variance
        );
        log::info!(
            "salinity variance {:.6e} change {:.2e}",
            salt.variance,
            ds.variance
        );
        Some(report)
    }
}

// ── Overturning ────────────────────────────────────────────────────

/// Reference depth of the potential density that labels isopycnals, m.
const SIGMA_REF_DEPTH: f64 = 2000.0;

/// Density classes per vertical level.
const CLASSES_PER_LEVEL: usize = 4;

/// Streamfunctions of the GM eddy-induced (bolus) transport, m^3/s.
#[derive(Clone, Debug, PartialEq)]
pub struct BolusOverturning {
    depth: Vec<f64>,
    iso: Vec<f64>,
}

/// Meridional overturning in depth and density coordinates.
///
/// Rows are interior v faces `j` (0-based, no halo). Depth-coordinate
/// streamfunctions are on levels `k`, accumulated from the bottom up to the
/// top of level `k`. The density-class transport `trans(j, m)` is the
/// northward flow of water denser than `sigma[m]` (potential density
/// anomaly at 2000 m); `iso(j, k)` maps it back to depth by the area each
/// class occupies.
#[derive(Clone, Debug, PartialEq)]
pub struct Overturning {
    ny: usize,
    nz: usize,
    sigma: Vec<f64>,
    depth: Vec<f64>,
    trans: Vec<f64>,
    iso: Vec<f64>,
    bolus: Option<BolusOverturning>,
}

impl Overturning {
    /// Integrate the `current` level. The bolus part needs the isoneutral
    /// slopes and is only computed when `bolus` is set and they are
    /// allocated.
    pub fn compute(grid: &Grid, eos: EquationOfState, state: &ModelState, bolus: bool) -> Self {
        let s = *grid.shape();
        let (ny, nz) = (s.ny, s.nz);
        let lv = state.levels;
        let (v, temp, salt) = (
            state.v.current(lv),
            state.temp.current(lv),
            state.salt.current(lv),
        );

        let levels = nz * CLASSES_PER_LEVEL;
        let lightest = eos.density(30.0, 35.0, SIGMA_REF_DEPTH);
        let densest = eos.density(-2.0, 35.0, SIGMA_REF_DEPTH);
        let step = (densest - lightest) / (levels - 1).max(1) as f64;
        let sigma: Vec<f64> = (0..levels).map(|m| lightest + step * m as f64).collect();
        let sig = |c: usize| eos.density(temp[c], salt[c], SIGMA_REF_DEPTH);

        // Bolus streamfunction on v faces at W levels.
        let b1: Option<Vec<f64>> = state.isoneutral.as_ref().filter(|_| bolus).map(|iso| {
            let k_gm = &state.mixing.k_gm;
            let mut b1 = vec![0.0; s.cells()];
            for i in 0..s.nxt() {
                for j in 0..s.nyt() - 1 {
                    for k in 0..nz {
                        let c = s.idx(i, j, k);
                        let n = s.idx(i, j + 1, k);
                        b1[c] = -0.5
                            * (k_gm[c] * iso.slope_y[c] + k_gm[n] * iso.slope_y[n])
                            * grid.mask_v[c];
                    }
                }
            }
            b1
        });

        let mut depth = vec![0.0; ny * nz];
        let mut zarea = vec![0.0; ny * nz];
        let mut trans = vec![0.0; ny * levels];
        let mut iso = vec![0.0; ny * nz];
        let mut bolus_parts = b1.as_ref().map(|_| {
            (
                vec![0.0; ny * nz],
                vec![0.0; ny * levels],
                vec![0.0; ny * nz],
            )
        });

        for (row, j) in s.interior_j().enumerate() {
            // Contributions binned by the number of classes lighter than
            // the face; class m collects every bin above m.
            let mut flow_bins = vec![0.0; levels + 1];
            let mut area_bins = vec![0.0; levels + 1];
            let mut bolus_bins = vec![0.0; levels + 1];
            let (mut flow_below, mut area_below) = (0.0, 0.0);
            for k in 0..nz {
                let (mut flow, mut area, mut bolus_level) = (0.0, 0.0, 0.0);
                for i in s.interior_i() {
                    let c = s.idx(i, j, k);
                    let width = grid.dxt[i] * grid.cosu[j] * grid.mask_v[c];
                    if width == 0.0 {
                        continue;
                    }
                    let fac = width * grid.dzt[k];
                    flow += v[c] * fac;
                    area += fac;
                    let face = 0.5 * (sig(c) + sig(s.idx(i, j + 1, k)));
                    let bin = sigma.partition_point(|&sm| sm < face);
                    flow_bins[bin] += v[c] * fac;
                    area_bins[bin] += fac;
                    if let Some(b1) = &b1 {
                        let dpsi = if k == 0 { b1[c] } else { b1[c] - b1[c - 1] };
                        bolus_bins[bin] += dpsi * width;
                        bolus_level += b1[c] * width;
                    }
                }
                flow_below += flow;
                area_below += area;
                depth[row * nz + k] = flow_below;
                zarea[row * nz + k] = area_below;
                if let Some((bolus_depth, _, _)) = bolus_parts.as_mut() {
                    bolus_depth[row * nz + k] = bolus_level;
                }
            }

            let mut z_sig = vec![0.0; levels];
            let (mut flow_acc, mut area_acc, mut bolus_acc) = (0.0, 0.0, 0.0);
            for m in (0..levels).rev() {
                flow_acc += flow_bins[m + 1];
                area_acc += area_bins[m + 1];
                bolus_acc += bolus_bins[m + 1];
                trans[row * levels + m] = flow_acc;
                z_sig[m] = area_acc;
                if let Some((_, bolus_trans, _)) = bolus_parts.as_mut() {
                    bolus_trans[row * levels + m] = bolus_acc;
                }
            }

            // Area below an isopycnal shrinks as density grows, so the
            // negated areas are non-decreasing in m.
            let xp: Vec<f64> = z_sig.iter().map(|a| -a).collect();
            for k in 0..nz {
                let x = -zarea[row * nz + k];
                let fp = &trans[row * levels..(row + 1) * levels];
                iso[row * nz + k] = interpolate(&xp, fp, x);
                if let Some((_, bolus_trans, bolus_iso)) = bolus_parts.as_mut() {
                    let fp = &bolus_trans[row * levels..(row + 1) * levels];
                    bolus_iso[row * nz + k] = interpolate(&xp, fp, x);
                }
            }
        }

        Self {
            ny,
            nz,
            sigma,
            depth,
            trans,
            iso,
            bolus: bolus_parts.map(|(depth, _, iso)| BolusOverturning { depth, iso }),
        }
    }

    /// Depth-coordinate transport through row `j` up to the top of level `k`.
    pub fn get(&self, j: usize, k: usize) -> f64 {
        self.depth[j * self.nz + k]
    }

    /// Transport through row `j` of water denser than `sigma()[m]`.
    pub fn density_class(&self, j: usize, m: usize) -> f64 {
        self.trans[j * self.sigma.len() + m]
    }

    /// Density-class transport remapped to level `k`.
    pub fn isopycnal(&self, j: usize, k: usize) -> f64 {
        self.iso[j * self.nz + k]
    }

    /// Bolus streamfunction on the top face of level `k`, if computed.
    pub fn bolus_depth(&self, j: usize, k: usize) -> Option<f64> {
        self.bolus.as_ref().map(|b| b.depth[j * self.nz + k])
    }

    /// Bolus transport by density class remapped to level `k`, if computed.
    pub fn bolus_isopycnal(&self, j: usize, k: usize) -> Option<f64> {
        self.bolus.as_ref().map(|b| b.iso[j * self.nz + k])
    }

    /// Potential density anomalies bounding the classes, ascending.
    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }

    /// Largest absolute depth-coordinate transport, m^3/s.
    pub fn max_abs(&self) -> f64 {
        self.depth.iter().fold(0.0f64, |m, p| m.max(p.abs()))
    }

    /// Number of interior rows.
    pub fn rows(&self) -> usize {
        self.ny
    }
}

/// Piecewise-linear interpolation on non-decreasing `xp`, clamped to the
/// end values outside the range.
fn interpolate(xp: &[f64], fp: &[f64], x: f64) -> f64 {
    let hi = xp.partition_point(|&p| p <= x);
    match hi {
        0 => fp.first().copied().unwrap_or(0.0),
        n if n == xp.len() => fp.last().copied().unwrap_or(0.0),
        _ => {
            let lo = hi - 1;
            let w = (x - xp[lo]) / (xp[hi] - xp[lo]);
            fp[lo] + w * (fp[hi] - fp[lo])
        }
    }
}

// ── Energy budget ──────────────────────────────────────────────────

/// Domain integrals of the energy compartments, m^5/s^2.
///
/// Closure energies of disabled closures are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EnergyBudget {
    /// Resolved kinetic energy `(u^2 + v^2) / 2`.
    pub kinetic: f64,
    /// Potential energy `g rho z / rho_0`.
    pub potential: f64,
    /// Turbulent kinetic energy.
    pub tke: f64,
    /// Eddy kinetic energy.
    pub eke: f64,
    /// Internal-wave energy.
    pub internal_waves: f64,
}

impl EnergyBudget {
    /// Integrate every compartment at the `current` level.
    pub fn compute(grid: &Grid, fields: &dyn FieldAccess) -> Self {
        let nz = grid.shape().nz;
        let zero: &[f64] = &[];
        let u = fields.field(FieldKey::U).unwrap_or(zero);
        let v = fields.field(FieldKey::V).unwrap_or(zero);
        let rho = fields.field(FieldKey::Rho).unwrap_or(zero);
        let at = |a: &[f64], c: usize| a.get(c).copied().unwrap_or(0.0);
        let w_energy = |key: FieldKey| {
            fields
                .field(key)
                .map_or(0.0, |e| grid.integrate_w(|c| e[c]))
        };
        Self {
            kinetic: grid.integrate_t(|c| {
                0.5 * (at(u, c).powi(2) * grid.mask_u[c] + at(v, c).powi(2) * grid.mask_v[c])
            }),
            potential: grid.integrate_t(|c| GRAV / RHO_0 * at(rho, c) * grid.zt[c % nz]),
            tke: w_energy(FieldKey::Tke),
            eke: w_energy(FieldKey::Eke),
            internal_waves: w_energy(FieldKey::EIw),
        }
    }

    /// Sum of the closure energies.
    pub fn closures(&self) -> f64 {
        self.tke + self.eke + self.internal_waves
    }

    /// Sum of all compartments.
    pub fn total(&self) -> f64 {
        self.kinetic + self.potential + self.closures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_grid::GridBuilder;
    use gyre_state::{Allocation, ModelState};

    fn grid() -> Grid {
        GridBuilder::new(3, 2, 2)
            .uniform_spacing(100.0, 50.0)
            .dzt(vec![20.0, 10.0])
            .build()
            .unwrap()
    }

    #[test]
    fn monitor_reports_mean_variance_and_change() {
        let g = grid();
        let mut state = ModelState::new(&g, Allocation::default());
        let lv = state.levels;
        let s = *g.shape();
        // Bottom level 20 m at 1.0, top level 10 m at 4.0.
        for c in 0..s.cells() {
            let t = if c % s.nz == 0 { 1.0 } else { 4.0 };
            state.temp.slot_mut(lv.current())[c] = t * g.mask_t[c];
            state.salt.slot_mut(lv.current())[c] = 35.0 * g.mask_t[c];
        }
        let mut mon = TracerMonitor::new();
        let r = mon.observe(&g, &state).unwrap();
        assert!((r.temp.mean - 2.0).abs() < 1e-12);
        // (20 * 1 + 10 * 4) / 30 = 2; variance (20 * 1 + 10 * 4) / 30 = 2.
        assert!((r.temp.variance - 2.0).abs() < 1e-12);
        assert!(r.salt.variance.abs() < 1e-20);
        assert!(r.temp_change.is_none());

        for t in state.temp.slot_mut(lv.current()).iter_mut() {
            *t += 1.0;
        }
        let r = mon.observe(&g, &state).unwrap();
        let change = r.temp_change.unwrap();
        assert!((change.mean - 1.0).abs() < 1e-12);
        assert!(change.variance.abs() < 1e-12);
    }

    #[test]
    fn overturning_accumulates_from_the_bottom() {
        let g = grid();
        let s = *g.shape();
        let mut state = ModelState::new(&g, Allocation::default());
        let lv = state.levels;
        for c in 0..s.cells() {
            state.v.slot_mut(lv.current())[c] = 0.1 * g.mask_v[c];
        }
        let ovt = Overturning::compute(&g, EquationOfState::Linear, &state, false);
        assert_eq!(ovt.rows(), 2);
        // Row 0 has a wet northern face: 3 cells of 100 m, 20 m then 10 m.
        assert!((ovt.get(0, 0) - 0.1 * 300.0 * 20.0).abs() < 1e-9);
        assert!((ovt.get(0, 1) - 0.1 * 300.0 * 30.0).abs() < 1e-9);
        // The northernmost face touches the closed boundary.
        assert_eq!(ovt.get(1, 1), 0.0);
        assert!((ovt.max_abs() - 900.0).abs() < 1e-9);
    }

    /// Fill the current tracers level by level and `v` uniformly.
    fn layered(g: &Grid, alloc: Allocation, temps: [f64; 2], v: [f64; 2]) -> ModelState {
        let s = *g.shape();
        let mut state = ModelState::new(g, alloc);
        let lv = state.levels;
        for c in 0..s.cells() {
            let k = c % s.nz;
            state.temp.slot_mut(lv.current())[c] = temps[k] * g.mask_t[c];
            state.salt.slot_mut(lv.current())[c] = 35.0 * g.mask_t[c];
            state.v.slot_mut(lv.current())[c] = v[k] * g.mask_v[c];
        }
        state
    }

    #[test]
    fn uniform_water_maps_density_classes_back_onto_depth() {
        let g = grid();
        let state = layered(&g, Allocation::default(), [10.0, 10.0], [0.1, 0.1]);
        let ovt = Overturning::compute(&g, EquationOfState::Linear, &state, false);
        assert_eq!(ovt.sigma().len(), 2 * CLASSES_PER_LEVEL);
        assert!(ovt.sigma().windows(2).all(|w| w[0] < w[1]));
        assert!(ovt.bolus_depth(0, 0).is_none());

        // Lightest class holds everything, densest nothing.
        let last = ovt.sigma().len() - 1;
        assert!((ovt.density_class(0, 0) - 900.0).abs() < 1e-9);
        assert_eq!(ovt.density_class(0, last), 0.0);
        for k in 0..2 {
            assert!(
                (ovt.isopycnal(0, k) - ovt.get(0, k)).abs() < 1e-9,
                "level {k}: {} vs {}",
                ovt.isopycnal(0, k),
                ovt.get(0, k)
            );
        }
    }

    #[test]
    fn opposing_layers_separate_by_density() {
        let g = grid();
        // Cold water flows south under warm water flowing north.
        let state = layered(&g, Allocation::default(), [2.0, 20.0], [-0.1, 0.2]);
        let ovt = Overturning::compute(&g, EquationOfState::Linear, &state, false);
        let classes = ovt.sigma().len();
        assert!(ovt.density_class(0, 0).abs() < 1e-9);
        assert!((0..classes).any(|m| (ovt.density_class(0, m) + 600.0).abs() < 1e-9));
        assert_eq!(ovt.density_class(0, classes - 1), 0.0);
        assert!((ovt.get(0, 0) + 600.0).abs() < 1e-9);
        assert!(ovt.get(0, 1).abs() < 1e-9);
    }

    #[test]
    fn bolus_streamfunction_follows_the_slopes() {
        let g = grid();
        let alloc = Allocation {
            isoneutral: true,
            ..Allocation::default()
        };
        let mut state = layered(&g, alloc, [10.0, 10.0], [0.0, 0.0]);
        let nz = g.shape().nz;
        state.mixing.k_gm.fill(1e3);
        let tensor = state.isoneutral.as_mut().unwrap();
        for (c, sy) in tensor.slope_y.iter_mut().enumerate() {
            *sy = if c % nz == 0 { 1e-3 } else { 0.0 };
        }
        let ovt = Overturning::compute(&g, EquationOfState::Linear, &state, true);

        // -K_gm S_y = -1 m^2/s over three 100 m faces below the top level.
        assert!((ovt.bolus_depth(0, 0).unwrap() + 300.0).abs() < 1e-9);
        assert!(ovt.bolus_depth(0, 1).unwrap().abs() < 1e-9);
        assert_eq!(ovt.bolus_depth(1, 0), Some(0.0));
        // The eddy-induced flow closes within the column.
        assert!(ovt.bolus_isopycnal(0, 1).unwrap().abs() < 1e-9);
        assert_eq!(ovt.max_abs(), 0.0);

        let without = Overturning::compute(&g, EquationOfState::Linear, &state, false);
        assert!(without.bolus_isopycnal(0, 0).is_none());
    }

    #[test]
    fn interpolation_clamps_outside_the_table() {
        let xp = [-3.0, -3.0, -1.0, 0.0];
        let fp = [5.0, 5.0, 1.0, 0.0];
        assert_eq!(interpolate(&xp, &fp, -4.0), 5.0);
        assert_eq!(interpolate(&xp, &fp, -2.0), 3.0);
        assert_eq!(interpolate(&xp, &fp, 0.0), 0.0);
        assert_eq!(interpolate(&xp, &fp, 1.0), 0.0);
    }

    #[test]
    fn energy_budget_sums_compartments() {
        let g = grid();
        let s = *g.shape();
        let alloc = Allocation {
            tke: true,
            ..Allocation::default()
        };
        let mut state = ModelState::new(&g, alloc);
        let lv = state.levels;
        let tf = state.tke.as_mut().unwrap();
        for c in 0..s.cells() {
            tf.tke.slot_mut(lv.current())[c] = 1e-3 * g.mask_w[c];
        }
        let e = EnergyBudget::compute(&g, &state);
        assert_eq!(e.kinetic, 0.0);
        assert_eq!(e.eke, 0.0);
        let volume = g.integrate_w(|_| 1.0);
        assert!((e.tke - 1e-3 * volume).abs() < 1e-9);
        assert!((e.total() - e.tke).abs() < 1e-12);
    }
}
