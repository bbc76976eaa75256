//! Lateral harmonic and biharmonic diffusion on T and W cells.

use gyre_grid::{Grid, HaloExchange};
use rayon::prelude::*;

/// Write `div(K grad q)` for interior cells of a T- or W-grid field.
///
/// `kappa(a, b)` is the diffusivity on the face between cells `a` and `b`.
/// Faces touching a cell with `mask == 0` carry no flux. Halo cells of
/// `out` are zeroed.
pub fn harmonic<K>(grid: &Grid, mask: &[f64], kappa: K, q: &[f64], out: &mut [f64])
where
    K: Fn(usize, usize) -> f64 + Sync,
{
    let s = *grid.shape();
    let nz = s.nz;
    let slab = s.nyt() * nz;
    let flux_x = |i: usize, j: usize, k: usize| {
        let (a, b) = (s.idx(i, j, k), s.idx(i + 1, j, k));
        let m = mask[a] * mask[b];
        if m == 0.0 {
            return 0.0;
        }
        kappa(a, b) * (q[b] - q[a]) / (grid.cost[j] * grid.dxu[i])
    };
    let flux_y = |i: usize, j: usize, k: usize| {
        let (a, b) = (s.idx(i, j, k), s.idx(i, j + 1, k));
        let m = mask[a] * mask[b];
        if m == 0.0 {
            return 0.0;
        }
        kappa(a, b) * (q[b] - q[a]) / grid.dyu[j]
    };
    out.par_chunks_mut(slab).enumerate().for_each(|(i, plane)| {
        plane.fill(0.0);
        if !s.interior_i().contains(&i) {
            return;
        }
        for j in s.interior_j() {
            for k in 0..nz {
                if mask[s.idx(i, j, k)] == 0.0 {
                    continue;
                }
                let dx = grid.cost[j] * grid.dxt[i];
                let dy = grid.cost[j] * grid.dyt[j];
                plane[j * nz + k] = (flux_x(i, j, k) - flux_x(i - 1, j, k)) / dx
                    + (grid.cosu[j] * flux_y(i, j, k) - grid.cosu[j - 1] * flux_y(i, j - 1, k))
                        / dy;
            }
        }
    });
}

/// Write `-K ∇⁴ q` for interior cells, with a halo refresh between the
/// two Laplacians. `scratch` receives the first Laplacian.
pub fn biharmonic(
    grid: &Grid,
    exchange: &dyn HaloExchange,
    mask: &[f64],
    k_hbi: f64,
    q: &[f64],
    scratch: &mut [f64],
    out: &mut [f64],
) {
    let s = *grid.shape();
    harmonic(grid, mask, |_, _| 1.0, q, scratch);
    exchange.exchange(&s, scratch, s.nz);
    harmonic(grid, mask, |_, _| -k_hbi, scratch, out);
}
