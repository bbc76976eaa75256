//! Isoneutral (Redi) diffusion and the GM skew flux.
//!
//! Slopes live on W points, the top face of each tracer cell. Lateral
//! density gradients are averaged onto them from the four adjacent
//! velocity faces. The steep-slope taper
//! `0.5 (1 + tanh((slopec - |s|) / dslope))` multiplies both slope
//! components; `K_33 = K_iso |s|²` is handed to the implicit vertical
//! solve, everything else is explicit.

use gyre_core::constants::EPSLN;
use gyre_grid::Grid;
use gyre_state::IsoneutralTensor;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::eos::EquationOfState;
use crate::params::IsoneutralParams;

/// Smooth steep-slope taper in `[0, 1]`, decreasing in `|s|`.
pub fn taper(slope: f64, params: &IsoneutralParams) -> f64 {
    0.5 * (1.0 + ((params.iso_slopec - slope.abs()) / params.iso_dslope).tanh())
}

/// Face gradients of one field.
struct Gradients {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

fn gradients(grid: &Grid, q: &[f64]) -> Gradients {
    let s = *grid.shape();
    let nz = s.nz;
    let n = s.cells();
    let mut x = vec![0.0; n];
    let mut y = vec![0.0; n];
    let mut z = vec![0.0; n];
    for i in 0..s.nxt() - 1 {
        for j in 0..s.nyt() - 1 {
            for k in 0..nz {
                let c = s.idx(i, j, k);
                x[c] = (q[s.idx(i + 1, j, k)] - q[c]) / (grid.cost[j] * grid.dxu[i]) * grid.mask_u[c];
                y[c] = (q[s.idx(i, j + 1, k)] - q[c]) / grid.dyu[j] * grid.mask_v[c];
                if k + 1 < nz {
                    z[c] = (q[c + 1] - q[c]) / grid.dzw[k] * grid.mask_w[c];
                }
            }
        }
    }
    Gradients { x, y, z }
}

/// Average of the faces around a W point, weighted by their masks.
fn around_w(field: &[f64], mask: &[f64], faces: [usize; 4]) -> f64 {
    let (mut sum, mut weight) = (0.0, 0.0);
    for f in faces {
        sum += field[f] * mask[f];
        weight += mask[f];
    }
    if weight > 0.0 {
        sum / weight
    } else {
        0.0
    }
}

/// Locally referenced density gradient on u and v faces.
fn density_gradients(
    grid: &Grid,
    drdt: &[f64],
    drds: &[f64],
    gt: &Gradients,
    gs: &Gradients,
) -> (Vec<f64>, Vec<f64>) {
    let s = *grid.shape();
    let mut rx = vec![0.0; s.cells()];
    let mut ry = vec![0.0; s.cells()];
    for i in 0..s.nxt() - 1 {
        for j in 0..s.nyt() - 1 {
            for k in 0..s.nz {
                let c = s.idx(i, j, k);
                let e = s.idx(i + 1, j, k);
                let n = s.idx(i, j + 1, k);
                rx[c] = 0.5 * (drdt[c] + drdt[e]) * gt.x[c] + 0.5 * (drds[c] + drds[e]) * gs.x[c];
                ry[c] = 0.5 * (drdt[c] + drdt[n]) * gt.y[c] + 0.5 * (drds[c] + drds[n]) * gs.y[c];
            }
        }
    }
    (rx, ry)
}

/// Recompute the tapered slopes and `K_33` on W points.
///
/// `taper_out` receives the taper factor per W point for the steep-slope
/// lateral diffusivity.
#[allow(clippy::too_many_arguments)]
pub fn compute_tensor(
    grid: &Grid,
    eos: EquationOfState,
    params: &IsoneutralParams,
    temp: &[f64],
    salt: &[f64],
    k_iso: &[f64],
    tensor: &mut IsoneutralTensor,
    taper_out: &mut [f64],
) {
    let s = *grid.shape();
    let nz = s.nz;
    let gt = gradients(grid, temp);
    let gs = gradients(grid, salt);
    let depth = |k: usize| -grid.zt[k];
    let drdt: Vec<f64> = (0..s.cells())
        .map(|c| eos.drho_dt(temp[c], salt[c], depth(c % nz)))
        .collect();
    let drds: Vec<f64> = (0..s.cells())
        .map(|c| eos.drho_ds(temp[c], salt[c], depth(c % nz)))
        .collect();
    let (rho_x, rho_y) = density_gradients(grid, &drdt, &drds, &gt, &gs);

    let slab = s.nyt() * nz;
    let IsoneutralTensor {
        slope_x,
        slope_y,
        k33,
    } = tensor;
    slope_x
        .par_chunks_mut(slab)
        .zip(slope_y.par_chunks_mut(slab))
        .zip(k33.par_chunks_mut(slab))
        .zip(taper_out.par_chunks_mut(slab))
        .enumerate()
        .for_each(|(i, (((sx_p, sy_p), k33_p), t_p))| {
            sx_p.fill(0.0);
            sy_p.fill(0.0);
            k33_p.fill(0.0);
            t_p.fill(1.0);
            if !s.interior_i().contains(&i) {
                return;
            }
            for j in s.interior_j() {
                for k in 0..nz - 1 {
                    let c = s.idx(i, j, k);
                    if grid.mask_w[c] == 0.0 {
                        continue;
                    }
                    let l = j * nz + k;
                    let rho_z = 0.5 * (drdt[c] + drdt[c + 1]) * gt.z[c]
                        + 0.5 * (drds[c] + drds[c + 1]) * gs.z[c];
                    let xf = [s.idx(i - 1, j, k), c, s.idx(i - 1, j, k + 1), c + 1];
                    let yf = [s.idx(i, j - 1, k), c, s.idx(i, j - 1, k + 1), c + 1];
                    let rx = around_w(&rho_x, &grid.mask_u, xf);
                    let ry = around_w(&rho_y, &grid.mask_v, yf);
                    let denom = rho_z.min(-EPSLN);
                    let (sx, sy) = (-rx / denom, -ry / denom);
                    let t = taper((sx * sx + sy * sy).sqrt(), params);
                    sx_p[l] = t * sx;
                    sy_p[l] = t * sy;
                    t_p[l] = t;
                    k33_p[l] = k_iso[c] * (sx_p[l] * sx_p[l] + sy_p[l] * sy_p[l]);
                }
            }
        });
}

/// Explicit isoneutral and skew tendencies of one tracer.
pub struct IsoneutralFluxes<'a> {
    /// Grid.
    pub grid: &'a Grid,
    /// Tapered slopes.
    pub tensor: &'a IsoneutralTensor,
    /// Taper factor per W point.
    pub taper: &'a [f64],
    /// Isoneutral diffusivity, W grid.
    pub k_iso: &'a [f64],
    /// GM diffusivity, W grid; zero disables the skew flux.
    pub k_gm: &'a [f64],
    /// Lateral diffusivity where slopes are tapered.
    pub k_iso_steep: f64,
    /// Whether the skew flux is active.
    pub skew: bool,
}

impl IsoneutralFluxes<'_> {
    /// Write the isoneutral and skew parts of `-div F` for tracer `q`.
    pub fn tendencies(&self, q: &[f64], iso: &mut [f64], skew: &mut [f64]) {
        let grid = self.grid;
        let s = *grid.shape();
        let nz = s.nz;
        let g = gradients(grid, q);
        let t = self.tensor;
        let gm = |c: usize| if self.skew { self.k_gm[c] } else { 0.0 };

        // Fluxes per face, split into (isoneutral, skew).
        let flux_x = |c: usize, e: usize, k: usize| -> (f64, f64) {
            if grid.mask_u[c] == 0.0 {
                return (0.0, 0.0);
            }
            let mut w = w_points(c, e, k);
            w.retain(|p| grid.mask_w[*p] > 0.0);
            let n = w.len().max(1) as f64;
            let sx: f64 = w.iter().map(|&p| t.slope_x[p]).sum::<f64>() / n;
            let dz: f64 = w.iter().map(|&p| g.z[p]).sum::<f64>() / n;
            let tap: f64 = if w.is_empty() {
                1.0
            } else {
                w.iter().map(|&p| self.taper[p]).sum::<f64>() / n
            };
            let kiso = 0.5 * (self.k_iso[c] + self.k_iso[e]);
            let kgm = 0.5 * (gm(c) + gm(e));
            let iso = -kiso * (g.x[c] + sx * dz) - self.k_iso_steep * (1.0 - tap) * g.x[c];
            (iso, kgm * sx * dz)
        };
        let flux_y = |c: usize, nb: usize, k: usize| -> (f64, f64) {
            if grid.mask_v[c] == 0.0 {
                return (0.0, 0.0);
            }
            let mut w = w_points(c, nb, k);
            w.retain(|p| grid.mask_w[*p] > 0.0);
            let n = w.len().max(1) as f64;
            let sy: f64 = w.iter().map(|&p| t.slope_y[p]).sum::<f64>() / n;
            let dz: f64 = w.iter().map(|&p| g.z[p]).sum::<f64>() / n;
            let tap: f64 = if w.is_empty() {
                1.0
            } else {
                w.iter().map(|&p| self.taper[p]).sum::<f64>() / n
            };
            let kiso = 0.5 * (self.k_iso[c] + self.k_iso[nb]);
            let kgm = 0.5 * (gm(c) + gm(nb));
            let iso = -kiso * (g.y[c] + sy * dz) - self.k_iso_steep * (1.0 - tap) * g.y[c];
            (iso, kgm * sy * dz)
        };
        let flux_z = |i: usize, j: usize, k: usize| -> (f64, f64) {
            let c = s.idx(i, j, k);
            if k + 1 >= nz || grid.mask_w[c] == 0.0 {
                return (0.0, 0.0);
            }
            let xf = [s.idx(i - 1, j, k), c, s.idx(i - 1, j, k + 1), c + 1];
            let yf = [s.idx(i, j - 1, k), c, s.idx(i, j - 1, k + 1), c + 1];
            let dx = around_w(&g.x, &grid.mask_u, xf);
            let dy = around_w(&g.y, &grid.mask_v, yf);
            let along = t.slope_x[c] * dx + t.slope_y[c] * dy;
            (-self.k_iso[c] * along, -gm(c) * along)
        };

        let slab = s.nyt() * nz;
        iso.par_chunks_mut(slab)
            .zip(skew.par_chunks_mut(slab))
            .enumerate()
            .for_each(|(i, (ip, sp))| {
                ip.fill(0.0);
                sp.fill(0.0);
                if !s.interior_i().contains(&i) {
                    return;
                }
                for j in s.interior_j() {
                    for k in 0..nz {
                        let c = s.idx(i, j, k);
                        if grid.mask_t[c] == 0.0 {
                            continue;
                        }
                        let w = s.idx(i - 1, j, k);
                        let sth = s.idx(i, j - 1, k);
                        let fe = flux_x(c, s.idx(i + 1, j, k), k);
                        let fw = flux_x(w, c, k);
                        let fn_ = flux_y(c, s.idx(i, j + 1, k), k);
                        let fs = flux_y(sth, c, k);
                        let ft = flux_z(i, j, k);
                        let fb = if k > 0 { flux_z(i, j, k - 1) } else { (0.0, 0.0) };
                        let dx = grid.cost[j] * grid.dxt[i];
                        let dy = grid.cost[j] * grid.dyt[j];
                        let div = |e: f64, w: f64, n: f64, s_: f64, t_: f64, b: f64| {
                            (e - w) / dx
                                + (grid.cosu[j] * n - grid.cosu[j - 1] * s_) / dy
                                + (t_ - b) / grid.dzt[k]
                        };
                        let l = j * nz + k;
                        ip[l] = -div(fe.0, fw.0, fn_.0, fs.0, ft.0, fb.0);
                        sp[l] = -div(fe.1, fw.1, fn_.1, fs.1, ft.1, fb.1);
                    }
                }
            });
    }
}

/// The W points above and below the face between cells `a` and `b` at
/// level `k`: `(a, k)`, `(b, k)`, `(a, k-1)`, `(b, k-1)`.
fn w_points(a: usize, b: usize, k: usize) -> SmallVec<[usize; 4]> {
    let mut w = SmallVec::new();
    w.push(a);
    w.push(b);
    if k > 0 {
        w.push(a - 1);
        w.push(b - 1);
    }
    w
}
