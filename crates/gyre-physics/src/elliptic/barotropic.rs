//! The external-mode surface-pressure problem.
//!
//! Unknowns are the wet interior columns. Rows are area-integrated volume
//! flux divergences, so the operator couples neighbouring columns through
//! the depth of the face between them:
//!
//! ```text
//! east:  hu · dyt / (cos φ · dxu)
//! north: hv · dxt · cos φ_v / dyu
//! ```
//!
//! With a rigid lid the operator is singular with one null vector per
//! basin; the implicit free surface adds `area / (g dt²)` to the diagonal.

use gyre_core::constants::GRAV;
use gyre_grid::{Grid, ZonalBoundary, HALO};
use rayon::prelude::*;

use super::stencil::{Stencil, StencilBuilder};

/// Stencil plus the mapping between unknowns and grid columns.
#[derive(Clone, Debug)]
pub struct BarotropicOperator {
    stencil: Stencil,
    columns: Vec<usize>,
    surface: Option<Vec<f64>>,
}

impl BarotropicOperator {
    /// Build the operator for `grid`. `dt` only matters with a free
    /// surface.
    pub fn new(grid: &Grid, free_surface: bool, dt: f64) -> Self {
        let s = *grid.shape();
        let mut row_of = vec![usize::MAX; s.columns()];
        let mut columns = Vec::new();
        for i in s.interior_i() {
            for j in s.interior_j() {
                let c = s.col(i, j);
                if grid.kbot[c] > 0 {
                    row_of[c] = columns.len();
                    columns.push(c);
                }
            }
        }
        let cyclic = grid.boundary() == ZonalBoundary::Cyclic;
        let mut builder = StencilBuilder::new(columns.len());
        for (r, &c) in columns.iter().enumerate() {
            let (i, j) = s.ij(c);
            let east = if i + 1 < HALO + s.nx {
                Some(i + 1)
            } else if cyclic {
                Some(HALO)
            } else {
                None
            };
            if let Some(ie) = east {
                let nb = row_of[s.col(ie, j)];
                if nb != usize::MAX {
                    let coef = grid.hu[c] * grid.dyt[j] / (grid.cost[j] * grid.dxu[i]);
                    builder.add_face(r, nb, coef);
                }
            }
            if j + 1 < HALO + s.ny {
                let nb = row_of[s.col(i, j + 1)];
                if nb != usize::MAX {
                    let coef = grid.hv[c] * grid.dxt[i] * grid.cosu[j] / grid.dyu[j];
                    builder.add_face(r, nb, coef);
                }
            }
        }
        let surface = free_surface.then(|| {
            columns
                .iter()
                .map(|&c| grid.area_t[c] / (GRAV * dt * dt))
                .collect::<Vec<f64>>()
        });
        if let Some(diag) = &surface {
            for (r, d) in diag.iter().enumerate() {
                builder.add_diagonal(r, *d);
            }
        }
        Self {
            stencil: builder.build(),
            columns,
            surface,
        }
    }

    /// The assembled operator.
    pub fn stencil(&self) -> &Stencil {
        &self.stencil
    }

    /// Flat column index of each unknown.
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Area-integrated divergence of the depth-integrated transport, per
    /// unknown. `u` and `v` must have valid halos.
    pub fn transport_divergence(&self, grid: &Grid, u: &[f64], v: &[f64]) -> Vec<f64> {
        let s = *grid.shape();
        let nz = s.nz;
        let transport = |f: &[f64], col: usize| -> f64 {
            (0..nz).map(|k| f[col * nz + k] * grid.dzt[k]).sum()
        };
        self.columns
            .par_iter()
            .map(|&c| {
                let (i, j) = s.ij(c);
                let ue = transport(u, c);
                let uw = transport(u, s.col(i - 1, j));
                let vn = transport(v, c);
                let vs = transport(v, s.col(i, j - 1));
                grid.dyt[j] * (ue - uw) + grid.dxt[i] * (grid.cosu[j] * vn - grid.cosu[j - 1] * vs)
            })
            .collect()
    }

    /// Right-hand side `-D(U*)/dt`, plus the free-surface memory term.
    pub fn rhs(&self, grid: &Grid, u: &[f64], v: &[f64], psi: &[f64], dt: f64) -> Vec<f64> {
        let mut b = self.transport_divergence(grid, u, v);
        for x in &mut b {
            *x = -*x / dt;
        }
        if let Some(diag) = &self.surface {
            for ((x, d), &c) in b.iter_mut().zip(diag).zip(&self.columns) {
                *x += d * psi[c];
            }
        }
        b
    }

    /// Linear extrapolation `2 ψ_current - ψ_past` as the first guess.
    pub fn initial_guess(&self, current: &[f64], past: &[f64]) -> Vec<f64> {
        self.columns
            .iter()
            .map(|&c| 2.0 * current[c] - past[c])
            .collect()
    }

    /// Write a solution into a column field; land and halo columns are
    /// zeroed.
    pub fn scatter(&self, solution: &[f64], psi: &mut [f64]) {
        psi.fill(0.0);
        for (x, &c) in solution.iter().zip(&self.columns) {
            psi[c] = *x;
        }
    }

    /// Subtract `dt ∇ψ` from the velocities. `psi` must have valid halos.
    pub fn correct(grid: &Grid, psi: &[f64], dt: f64, u: &mut [f64], v: &mut [f64]) {
        let s = *grid.shape();
        let nz = s.nz;
        let slab = s.nyt() * nz;
        u.par_chunks_mut(slab)
            .zip(v.par_chunks_mut(slab))
            .enumerate()
            .for_each(|(i, (up, vp))| {
                if i + 1 >= s.nxt() {
                    return;
                }
                for j in 0..s.nyt() - 1 {
                    let c = s.col(i, j);
                    let gx = (psi[s.col(i + 1, j)] - psi[c]) / (grid.cost[j] * grid.dxu[i]);
                    let gy = (psi[s.col(i, j + 1)] - psi[c]) / grid.dyu[j];
                    for k in 0..nz {
                        up[j * nz + k] -= dt * gx * grid.mask_u[c * nz + k];
                        vp[j * nz + k] -= dt * gy * grid.mask_v[c * nz + k];
                    }
                }
            });
    }
}
