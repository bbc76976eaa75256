//! The three-dimensional pressure problem of non-hydrostatic runs.
//!
//! Same structure as the barotropic operator, but the unknowns are wet
//! tracer cells and the stencil has seven points. The lid and the bottom
//! are impermeable, so the operator is always singular.

use gyre_grid::{Grid, ZonalBoundary, HALO};
use rayon::prelude::*;

use super::stencil::{Stencil, StencilBuilder};

/// Stencil over wet interior cells.
#[derive(Clone, Debug)]
pub struct PressureOperator {
    stencil: Stencil,
    cells: Vec<usize>,
}

impl PressureOperator {
    /// Build the operator for `grid`.
    pub fn new(grid: &Grid) -> Self {
        let s = *grid.shape();
        let nz = s.nz;
        let mut row_of = vec![usize::MAX; s.cells()];
        let mut cells = Vec::new();
        for i in s.interior_i() {
            for j in s.interior_j() {
                for k in 0..nz {
                    let c = s.idx(i, j, k);
                    if grid.mask_t[c] > 0.0 {
                        row_of[c] = cells.len();
                        cells.push(c);
                    }
                }
            }
        }
        let cyclic = grid.boundary() == ZonalBoundary::Cyclic;
        let mut builder = StencilBuilder::new(cells.len());
        for (r, &c) in cells.iter().enumerate() {
            let (i, j) = s.ij(c / nz);
            let k = c % nz;
            let ie = if i + 1 < HALO + s.nx {
                Some(i + 1)
            } else if cyclic {
                Some(HALO)
            } else {
                None
            };
            if let Some(ie) = ie {
                let nb = row_of[s.idx(ie, j, k)];
                if nb != usize::MAX {
                    let coef = grid.dyt[j] * grid.dzt[k] / (grid.cost[j] * grid.dxu[i]);
                    builder.add_face(r, nb, coef * grid.mask_u[c]);
                }
            }
            if j + 1 < HALO + s.ny {
                let nb = row_of[s.idx(i, j + 1, k)];
                if nb != usize::MAX {
                    let coef = grid.dxt[i] * grid.cosu[j] * grid.dzt[k] / grid.dyu[j];
                    builder.add_face(r, nb, coef * grid.mask_v[c]);
                }
            }
            if k + 1 < nz {
                let nb = row_of[c + 1];
                if nb != usize::MAX {
                    let coef = grid.area_t[c / nz] / grid.dzw[k];
                    builder.add_face(r, nb, coef * grid.mask_w[c]);
                }
            }
        }
        Self {
            stencil: builder.build(),
            cells,
        }
    }

    /// The assembled operator.
    pub fn stencil(&self) -> &Stencil {
        &self.stencil
    }

    /// Flat cell index of each unknown.
    pub fn cells(&self) -> &[usize] {
        &self.cells
    }

    /// Volume-integrated divergence of `(u, v, w)` per unknown, ignoring
    /// the flux through the lid.
    pub fn divergence(&self, grid: &Grid, u: &[f64], v: &[f64], w: &[f64]) -> Vec<f64> {
        let s = *grid.shape();
        let nz = s.nz;
        self.cells
            .par_iter()
            .map(|&c| {
                let col = c / nz;
                let (i, j) = s.ij(col);
                let k = c % nz;
                let west = s.idx(i - 1, j, k);
                let south = s.idx(i, j - 1, k);
                let top = if k + 1 < nz { w[c] * grid.mask_w[c] } else { 0.0 };
                let bottom = if k > 0 { w[c - 1] * grid.mask_w[c - 1] } else { 0.0 };
                grid.dyt[j] * grid.dzt[k] * (u[c] - u[west])
                    + grid.dxt[i] * grid.dzt[k] * (grid.cosu[j] * v[c] - grid.cosu[j - 1] * v[south])
                    + grid.area_t[col] * (top - bottom)
            })
            .collect()
    }

    /// Write a solution into a volume field; other cells are zeroed.
    pub fn scatter(&self, solution: &[f64], p: &mut [f64]) {
        p.fill(0.0);
        for (x, &c) in solution.iter().zip(&self.cells) {
            p[c] = *x;
        }
    }

    /// Subtract `dt ∇p` from all three velocity components. `p` must have
    /// valid halos.
    pub fn correct(
        grid: &Grid,
        p: &[f64],
        dt: f64,
        u: &mut [f64],
        v: &mut [f64],
        w: &mut [f64],
    ) {
        let s = *grid.shape();
        let nz = s.nz;
        let slab = s.nyt() * nz;
        u.par_chunks_mut(slab)
            .zip(v.par_chunks_mut(slab))
            .zip(w.par_chunks_mut(slab))
            .enumerate()
            .for_each(|(i, ((up, vp), wp))| {
                if i + 1 >= s.nxt() {
                    return;
                }
                for j in 0..s.nyt() - 1 {
                    for k in 0..nz {
                        let c = s.idx(i, j, k);
                        let l = j * nz + k;
                        let gx = (p[s.idx(i + 1, j, k)] - p[c]) / (grid.cost[j] * grid.dxu[i]);
                        let gy = (p[s.idx(i, j + 1, k)] - p[c]) / grid.dyu[j];
                        up[l] -= dt * gx * grid.mask_u[c];
                        vp[l] -= dt * gy * grid.mask_v[c];
                        if k + 1 < nz {
                            wp[l] -= dt * (p[c + 1] - p[c]) / grid.dzw[k] * grid.mask_w[c];
                        }
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_grid::{CyclicExchange, GridBuilder, HaloExchange};

    #[test]
    fn projection_makes_flow_solenoidal() {
        let g = GridBuilder::new(5, 4, 4)
            .boundary(ZonalBoundary::Cyclic)
            .uniform_spacing(500.0, 500.0)
            .dzt(vec![40.0, 30.0, 20.0, 10.0])
            .kbot(vec![1, 1, 2, 1, 1, 3, 0, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 4])
            .build()
            .unwrap();
        let s = *g.shape();
        let ex = CyclicExchange::new(ZonalBoundary::Cyclic);
        let mut u = vec![0.0; s.cells()];
        let mut v = vec![0.0; s.cells()];
        let mut w = vec![0.0; s.cells()];
        for c in 0..s.cells() {
            u[c] = ((c * 5) % 9) as f64 * 0.1 * g.mask_u[c];
            v[c] = ((c * 3) % 4) as f64 * 0.1 * g.mask_v[c];
            w[c] = ((c * 7) % 5) as f64 * 1e-3 * g.mask_w[c];
        }
        for f in [&mut u, &mut v, &mut w] {
            ex.exchange(&s, f, s.nz);
        }
        let op = PressureOperator::new(&g);
        assert!(op.stencil().is_singular());
        let dt = 60.0;
        let before: f64 = op.divergence(&g, &u, &v, &w).iter().map(|d| d.abs()).sum();
        let rhs: Vec<f64> = op.divergence(&g, &u, &v, &w).iter().map(|d| -d / dt).collect();
        let sol = op.stencil().solve(&rhs, &vec![0.0; rhs.len()], 1e-13, 2000);
        assert!(sol.converged);
        let mut p = vec![0.0; s.cells()];
        op.scatter(&sol.solution, &mut p);
        ex.exchange(&s, &mut p, s.nz);
        PressureOperator::correct(&g, &p, dt, &mut u, &mut v, &mut w);
        for f in [&mut u, &mut v, &mut w] {
            ex.exchange(&s, f, s.nz);
        }
        let after: f64 = op.divergence(&g, &u, &v, &w).iter().map(|d| d.abs()).sum();
        assert!(after < 1e-9 * before, "{after} vs {before}");
    }
}
