//! Momentum equation with the barotropic projection.
//!
//! Explicit tendencies (Coriolis, advection, hydrostatic pressure) are
//! integrated with Adams-Bashforth. Lateral friction, Rayleigh damping
//! and bottom drag are applied forward in time from the `current`
//! velocity, vertical friction implicitly. The surface-pressure solve
//! then removes the divergence of the depth-integrated transport, and the
//! vertical velocity follows from continuity.

use gyre_core::constants::{GRAV, RHO_0};
use gyre_core::{FieldKey, FieldSet, StageError};
use gyre_grid::{Grid, HaloExchange, Shape};
use gyre_stage::{Stage, StepContext, WriteList};
use gyre_state::ModelState;
use rayon::prelude::*;

use crate::elliptic::{BarotropicOperator, PressureOperator};
use crate::numerics::advection::{Advection, CellGeometry, FaceVelocity};
use crate::numerics::tridiag::{implicit_column, ColumnGeometry};
use crate::numerics::{ab_step, ab_weights};
use crate::params::{MomentumParams, SolverParams};

/// Horizontal metrics of U or V cells, expressed on the cell's own
/// index so that the T-grid operators can be reused.
#[derive(Clone, Debug)]
struct Metrics {
    dx: Vec<f64>,
    /// Distance between the centres of cells `i` and `i + 1`.
    dx_face: Vec<f64>,
    dy: Vec<f64>,
    /// Distance between the centres of cells `j` and `j + 1`.
    dy_face: Vec<f64>,
    cos_centre: Vec<f64>,
    cos_north: Vec<f64>,
}

fn shifted(v: &[f64]) -> Vec<f64> {
    let n = v.len();
    (0..n).map(|i| v[(i + 1).min(n - 1)]).collect()
}

impl Metrics {
    fn u_cells(grid: &Grid) -> Self {
        Self {
            dx: grid.dxu.clone(),
            dx_face: shifted(&grid.dxt),
            dy: grid.dyt.clone(),
            dy_face: grid.dyu.clone(),
            cos_centre: grid.cost.clone(),
            cos_north: grid.cosu.clone(),
        }
    }

    fn v_cells(grid: &Grid) -> Self {
        Self {
            dx: grid.dxt.clone(),
            dx_face: grid.dxu.clone(),
            dy: grid.dyu.clone(),
            dy_face: shifted(&grid.dyt),
            cos_centre: grid.cosu.clone(),
            cos_north: shifted(&grid.cost),
        }
    }

    fn geometry<'a>(&'a self, mask: &'a [f64], dz: &'a [f64]) -> CellGeometry<'a> {
        CellGeometry {
            mask,
            dx: &self.dx,
            dy: &self.dy,
            dz,
            cos_centre: &self.cos_centre,
            cos_north: &self.cos_north,
        }
    }
}

/// Write `div(A grad q)` on the cells described by `m`. `visc(cos)` is the
/// viscosity on a face at latitude cosine `cos`.
fn lateral_friction<V>(shape: Shape, m: &Metrics, mask: &[f64], visc: V, q: &[f64], out: &mut [f64])
where
    V: Fn(f64) -> f64 + Sync,
{
    let s = shape;
    let nz = s.nz;
    let flux_x = |i: usize, j: usize, k: usize| {
        let (a, b) = (s.idx(i, j, k), s.idx(i + 1, j, k));
        if mask[a] * mask[b] == 0.0 {
            return 0.0;
        }
        let cos = m.cos_centre[j];
        visc(cos) * (q[b] - q[a]) / (cos * m.dx_face[i])
    };
    let flux_y = |i: usize, j: usize, k: usize| {
        let (a, b) = (s.idx(i, j, k), s.idx(i, j + 1, k));
        if mask[a] * mask[b] == 0.0 {
            return 0.0;
        }
        visc(m.cos_north[j]) * (q[b] - q[a]) / m.dy_face[j]
    };
    out.par_chunks_mut(s.nyt() * nz)
        .enumerate()
        .for_each(|(i, plane)| {
            plane.fill(0.0);
            if !s.interior_i().contains(&i) {
                return;
            }
            for j in s.interior_j() {
                let cc = m.cos_centre[j];
                for k in 0..nz {
                    if mask[s.idx(i, j, k)] == 0.0 {
                        continue;
                    }
                    plane[j * nz + k] = (flux_x(i, j, k) - flux_x(i - 1, j, k)) / (cc * m.dx[i])
                        + (m.cos_north[j] * flux_y(i, j, k)
                            - m.cos_north[j - 1] * flux_y(i, j - 1, k))
                            / (cc * m.dy[j]);
                }
            }
        });
}

/// Area-weighted average of per-volume rates on U and V cells onto the
/// T cells they border, scaled by `mask`. Each face gives half of its
/// energy to either neighbour, so domain integrals are preserved.
fn faces_to_t(grid: &Grid, e_u: &[f64], e_v: &[f64], mask: &[f64], out: &mut [f64]) {
    let s = *grid.shape();
    let nz = s.nz;
    out.par_chunks_mut(s.nyt() * nz)
        .enumerate()
        .for_each(|(i, plane)| {
            plane.fill(0.0);
            if !s.interior_i().contains(&i) {
                return;
            }
            for j in s.interior_j() {
                let col = s.col(i, j);
                let (west, south) = (s.col(i - 1, j), s.col(i, j - 1));
                for k in 0..nz {
                    let c = s.idx(i, j, k);
                    if mask[c] == 0.0 {
                        continue;
                    }
                    let sum = grid.area_u[col] * e_u[c]
                        + grid.area_u[west] * e_u[west * nz + k]
                        + grid.area_v[col] * e_v[c]
                        + grid.area_v[south] * e_v[south * nz + k];
                    plane[j * nz + k] = 0.5 * sum / grid.area_t[col] * mask[c];
                }
            }
        });
}

/// Lowest wet level + 1 of every column of a face mask; 0 for dry columns.
fn bottom_levels(shape: Shape, mask: &[f64]) -> Vec<usize> {
    mask.chunks(shape.nz)
        .map(|column| column.iter().position(|&m| m > 0.0).map_or(0, |k| k + 1))
        .collect()
}

/// Momentum stage: writes `u`, `v`, `w`, `psi` at `next` and the kinetic
/// dissipation diagnostics consumed by the closures.
#[derive(Clone, Debug)]
pub struct MomentumStage {
    params: MomentumParams,
    solver: SolverParams,
    ab_eps: f64,
    barotropic: BarotropicOperator,
    pressure: Option<PressureOperator>,
    ucell: Metrics,
    vcell: Metrics,
    kbot_u: Vec<usize>,
    kbot_v: Vec<usize>,
}

impl MomentumStage {
    /// Assemble the elliptic operators for `grid`. The free-surface term
    /// of the barotropic operator depends on `dt`.
    pub fn new(
        grid: &Grid,
        params: MomentumParams,
        solver: SolverParams,
        ab_eps: f64,
        dt: f64,
    ) -> Self {
        let shape = *grid.shape();
        Self {
            barotropic: BarotropicOperator::new(grid, solver.free_surface, dt),
            pressure: solver.non_hydrostatic.then(|| PressureOperator::new(grid)),
            ucell: Metrics::u_cells(grid),
            vcell: Metrics::v_cells(grid),
            kbot_u: bottom_levels(shape, &grid.mask_u),
            kbot_v: bottom_levels(shape, &grid.mask_v),
            params,
            solver,
            ab_eps,
        }
    }

    /// The surface-pressure operator.
    pub fn barotropic(&self) -> &BarotropicOperator {
        &self.barotropic
    }

    /// Coriolis, advection and hydrostatic pressure gradient of the
    /// `current` velocity, written to `du` and `dv`.
    #[allow(clippy::too_many_arguments)]
    fn explicit_tendencies(
        &self,
        grid: &Grid,
        dt: f64,
        u: &[f64],
        v: &[f64],
        w: &[f64],
        rho: &[f64],
        du: &mut [f64],
        dv: &mut [f64],
    ) {
        let s = *grid.shape();
        let nz = s.nz;
        let n = s.cells();
        du.fill(0.0);
        dv.fill(0.0);

        if let Some(scheme) = self.params.advection {
            let mut east = vec![0.0; n];
            let mut north = vec![0.0; n];
            let mut top = vec![0.0; n];
            let mut tend = vec![0.0; n];
            let avg = |f: &[f64], a: usize, b: usize| 0.5 * (f[a] + f[b]);
            for i in 0..s.nxt() - 1 {
                for j in 0..s.nyt() {
                    for k in 0..nz {
                        let (c, e) = (s.idx(i, j, k), s.idx(i + 1, j, k));
                        east[c] = avg(u, c, e);
                        north[c] = avg(v, c, e);
                        top[c] = avg(w, c, e);
                    }
                }
            }
            Advection::new(
                s,
                self.ucell.geometry(&grid.mask_u, &grid.dzt),
                FaceVelocity {
                    east: &east,
                    north: &north,
                    top: &top,
                },
                scheme,
                dt,
            )
            .tendency(u, &mut tend);
            du.iter_mut().zip(&tend).for_each(|(d, t)| *d += t);

            for i in 0..s.nxt() {
                for j in 0..s.nyt() - 1 {
                    for k in 0..nz {
                        let (c, nb) = (s.idx(i, j, k), s.idx(i, j + 1, k));
                        east[c] = avg(u, c, nb);
                        north[c] = avg(v, c, nb);
                        top[c] = avg(w, c, nb);
                    }
                }
            }
            Advection::new(
                s,
                self.vcell.geometry(&grid.mask_v, &grid.dzt),
                FaceVelocity {
                    east: &east,
                    north: &north,
                    top: &top,
                },
                scheme,
                dt,
            )
            .tendency(v, &mut tend);
            dv.iter_mut().zip(&tend).for_each(|(d, t)| *d += t);
        }

        // Hydrostatic pressure at T points, integrated down from the lid.
        let mut p = vec![0.0; n];
        p.par_chunks_mut(nz).enumerate().for_each(|(col, pc)| {
            let mut above = 0.0;
            for k in (0..nz).rev() {
                let c = col * nz + k;
                let r = rho[c] * grid.mask_t[c];
                pc[k] = GRAV / RHO_0 * (above + 0.5 * r * grid.dzt[k]);
                above += r * grid.dzt[k];
            }
        });

        let coriolis = self.params.coriolis;
        let f_eff = |i: usize, j: usize, k: usize| {
            let col = s.col(i, j);
            grid.coriolis_t[col]
                + grid.tantr[j] * 0.5 * (u[s.idx(i - 1, j, k)] + u[s.idx(i, j, k)])
        };
        du.par_chunks_mut(s.nyt() * nz)
            .zip(dv.par_chunks_mut(s.nyt() * nz))
            .enumerate()
            .for_each(|(i, (du_p, dv_p))| {
                if !s.interior_i().contains(&i) {
                    du_p.fill(0.0);
                    dv_p.fill(0.0);
                    return;
                }
                for j in s.interior_j() {
                    for k in 0..nz {
                        let c = s.idx(i, j, k);
                        let l = j * nz + k;
                        let (mu, mv) = (grid.mask_u[c], grid.mask_v[c]);
                        let east = s.idx(i + 1, j, k);
                        let north = s.idx(i, j + 1, k);
                        du_p[l] -= (p[east] - p[c]) / (grid.cost[j] * grid.dxu[i]) * mu;
                        dv_p[l] -= (p[north] - p[c]) / grid.dyu[j] * mv;
                        if coriolis {
                            let (fc, fe, fn_) = (f_eff(i, j, k), f_eff(i + 1, j, k), f_eff(i, j + 1, k));
                            let v_here = v[c] + v[s.idx(i, j - 1, k)];
                            let v_east = v[east] + v[s.idx(i + 1, j - 1, k)];
                            du_p[l] += 0.25
                                * mu
                                * (fc * v_here * grid.dxt[i] + fe * v_east * grid.dxt[i + 1])
                                / grid.dxu[i];
                            let u_here = u[c] + u[s.idx(i - 1, j, k)];
                            let u_north = u[north] + u[s.idx(i - 1, j + 1, k)];
                            dv_p[l] -= 0.25
                                * mv
                                * (fc * u_here * grid.dyt[j] * grid.cost[j]
                                    + fn_ * u_north * grid.dyt[j + 1] * grid.cost[j + 1])
                                / (grid.dyu[j] * grid.cosu[j]);
                        }
                    }
                }
            });
    }

    /// Harmonic and biharmonic friction evaluated on `u_cur`, added to
    /// `u_next`. Returns the per-volume dissipation on the cells.
    #[allow(clippy::too_many_arguments)]
    fn lateral(
        &self,
        grid: &Grid,
        exchange: &dyn HaloExchange,
        m: &Metrics,
        mask: &[f64],
        dt: f64,
        cur: &[f64],
        next: &mut [f64],
    ) -> Vec<f64> {
        let s = *grid.shape();
        let n = s.cells();
        let mut diss = vec![0.0; n];
        let mut tend = vec![0.0; n];
        let p = &self.params;
        if p.a_h > 0.0 {
            let visc = |cos: f64| {
                if p.hor_friction_cos_scaling {
                    p.a_h * cos.powi(p.hor_friction_cos_power)
                } else {
                    p.a_h
                }
            };
            lateral_friction(s, m, mask, visc, cur, &mut tend);
            for c in 0..n {
                next[c] += dt * tend[c];
                diss[c] -= cur[c] * tend[c];
            }
        }
        if p.a_hbi > 0.0 {
            let mut lap = vec![0.0; n];
            lateral_friction(s, m, mask, |_| 1.0, cur, &mut lap);
            exchange.exchange(&s, &mut lap, s.nz);
            let a_hbi = p.a_hbi;
            lateral_friction(s, m, mask, |_| -a_hbi, &lap, &mut tend);
            for c in 0..n {
                next[c] += dt * tend[c];
                diss[c] -= cur[c] * tend[c];
            }
        }
        diss
    }

    /// Rayleigh damping and bottom drag from the `current` velocities.
    /// Returns the per-volume dissipation on U and V cells.
    fn drag(
        &self,
        grid: &Grid,
        dt: f64,
        (u_cur, v_cur): (&[f64], &[f64]),
        (u_next, v_next): (&mut [f64], &mut [f64]),
    ) -> (Vec<f64>, Vec<f64>) {
        let s = *grid.shape();
        let nz = s.nz;
        let n = s.cells();
        let p = &self.params;
        let mut e_u = vec![0.0; n];
        let mut e_v = vec![0.0; n];
        if p.r_ray > 0.0 {
            for c in 0..n {
                u_next[c] -= dt * p.r_ray * u_cur[c] * grid.mask_u[c];
                v_next[c] -= dt * p.r_ray * v_cur[c] * grid.mask_v[c];
                e_u[c] += p.r_ray * u_cur[c] * u_cur[c] * grid.mask_u[c];
                e_v[c] += p.r_ray * v_cur[c] * v_cur[c] * grid.mask_v[c];
            }
        }
        if p.r_bot <= 0.0 && p.r_quad_bot <= 0.0 {
            return (e_u, e_v);
        }
        for i in s.interior_i() {
            for j in s.interior_j() {
                let col = s.col(i, j);
                if self.kbot_u[col] > 0 {
                    let k = self.kbot_u[col] - 1;
                    let c = col * nz + k;
                    let v_avg = 0.25
                        * (v_cur[c]
                            + v_cur[s.idx(i + 1, j, k)]
                            + v_cur[s.idx(i, j - 1, k)]
                            + v_cur[s.idx(i + 1, j - 1, k)]);
                    let speed = (u_cur[c] * u_cur[c] + v_avg * v_avg).sqrt();
                    let rate = (p.r_bot + p.r_quad_bot * speed) / grid.dzt[k];
                    u_next[c] -= dt * rate * u_cur[c];
                    e_u[c] += rate * u_cur[c] * u_cur[c];
                }
                if self.kbot_v[col] > 0 {
                    let k = self.kbot_v[col] - 1;
                    let c = col * nz + k;
                    let u_avg = 0.25
                        * (u_cur[c]
                            + u_cur[s.idx(i, j + 1, k)]
                            + u_cur[s.idx(i - 1, j, k)]
                            + u_cur[s.idx(i - 1, j + 1, k)]);
                    let speed = (v_cur[c] * v_cur[c] + u_avg * u_avg).sqrt();
                    let rate = (p.r_bot + p.r_quad_bot * speed) / grid.dzt[k];
                    v_next[c] -= dt * rate * v_cur[c];
                    e_v[c] += rate * v_cur[c] * v_cur[c];
                }
            }
        }
        (e_u, e_v)
    }

    /// Vertical friction and wind stress on one velocity component.
    /// `offset` is the flat distance to the neighbouring T column whose
    /// `kappaM` is averaged with this one. Returns the shear dissipation
    /// per volume on the W interfaces of the face columns.
    #[allow(clippy::too_many_arguments)]
    fn vertical(
        &self,
        grid: &Grid,
        dt: f64,
        kbot: &[usize],
        offset: usize,
        kappa_m: &[f64],
        tau: &[f64],
        vel: &mut [f64],
    ) -> Result<Vec<f64>, StageError> {
        let s = *grid.shape();
        let nz = s.nz;
        let top = nz - 1;
        let kappa = |col: usize, k: usize| {
            let c = col * nz + k;
            let other = kappa_m.get(c + offset).copied().unwrap_or(0.0);
            0.5 * (kappa_m[c] + other)
        };
        let p = &self.params;
        if p.implicit_vert_friction {
            vel.par_chunks_mut(nz)
                .enumerate()
                .try_for_each(|(col, x)| {
                    if kbot[col] == 0 {
                        return Ok(());
                    }
                    let ok = implicit_column(
                        x,
                        kbot[col] - 1,
                        dt,
                        ColumnGeometry::t_cells(&grid.dzt, &grid.dzw),
                        |k| kappa(col, k),
                        |_| 0.0,
                        |k| if k == top { tau[col] / grid.dzt[top] } else { 0.0 },
                    );
                    if ok {
                        Ok(())
                    } else {
                        Err(StageError::ExecutionFailed {
                            reason: format!("momentum: singular friction system in column {col}"),
                        })
                    }
                })?;
        } else {
            vel.par_chunks_mut(nz).enumerate().for_each(|(col, x)| {
                if kbot[col] == 0 {
                    return;
                }
                let ks = kbot[col] - 1;
                if p.explicit_vert_friction {
                    let flux: Vec<f64> = (0..nz)
                        .map(|k| {
                            if k >= ks && k < top {
                                kappa(col, k) * (x[k + 1] - x[k]) / grid.dzw[k]
                            } else {
                                0.0
                            }
                        })
                        .collect();
                    for k in ks..nz {
                        let below = if k > ks { flux[k - 1] } else { 0.0 };
                        x[k] += dt * (flux[k] - below) / grid.dzt[k];
                    }
                }
                x[top] += dt * tau[col] / grid.dzt[top];
            });
        }

        let mut shear = vec![0.0; s.cells()];
        if p.implicit_vert_friction || p.explicit_vert_friction {
            shear
                .par_chunks_mut(nz)
                .zip(vel.par_chunks(nz))
                .enumerate()
                .for_each(|(col, (e, x))| {
                    if kbot[col] == 0 {
                        return;
                    }
                    for k in kbot[col] - 1..top {
                        let g = (x[k + 1] - x[k]) / grid.dzw[k];
                        e[k] = kappa(col, k) * g * g;
                    }
                });
        }
        Ok(shear)
    }

    /// Barotropic projection of `u` and `v`; writes the solution to
    /// `psi_next`.
    #[allow(clippy::too_many_arguments)]
    fn project(
        &self,
        grid: &Grid,
        exchange: &dyn HaloExchange,
        dt: f64,
        psi: (&[f64], &[f64], &mut [f64]),
        u: &mut [f64],
        v: &mut [f64],
    ) -> Result<usize, StageError> {
        let s = *grid.shape();
        let (past, current, next) = psi;
        let op = &self.barotropic;
        let rhs = op.rhs(grid, u, v, current, dt);
        let guess = op.initial_guess(current, past);
        let sol = op.stencil().solve(
            &rhs,
            &guess,
            self.solver.congr_epsilon,
            self.solver.congr_max_iterations,
        );
        if !sol.converged {
            return Err(StageError::NotConverged {
                solver: "barotropic",
                iterations: sol.iterations,
                residual: sol.residual_norm,
            });
        }
        log::trace!(
            "momentum: barotropic solve converged in {} iterations (residual {:.3e})",
            sol.iterations,
            sol.residual_norm
        );
        op.scatter(&sol.solution, next);
        exchange.exchange(&s, next, 1);
        BarotropicOperator::correct(grid, next, dt, u, v);
        exchange.exchange(&s, u, s.nz);
        exchange.exchange(&s, v, s.nz);
        Ok(sol.iterations)
    }
}

/// Vertical velocity at the top of every T cell from continuity,
/// integrated up from the bottom.
fn continuity(grid: &Grid, u: &[f64], v: &[f64], w: &mut [f64]) {
    let s = *grid.shape();
    let nz = s.nz;
    w.par_chunks_mut(s.nyt() * nz)
        .enumerate()
        .for_each(|(i, plane)| {
            plane.fill(0.0);
            for j in 0..s.nyt() {
                if !s.has_neighbours(i, j) {
                    continue;
                }
                let mut below = 0.0;
                for k in 0..nz {
                    let c = s.idx(i, j, k);
                    if grid.mask_t[c] == 0.0 {
                        continue;
                    }
                    let div = (u[c] - u[s.idx(i - 1, j, k)]) / (grid.cost[j] * grid.dxt[i])
                        + (grid.cosu[j] * v[c] - grid.cosu[j - 1] * v[s.idx(i, j - 1, k)])
                            / (grid.cost[j] * grid.dyt[j]);
                    below -= grid.dzt[k] * div;
                    plane[j * nz + k] = below * grid.mask_w[c];
                }
            }
        });
}

impl Stage for MomentumStage {
    fn name(&self) -> &str {
        "momentum"
    }

    fn reads(&self) -> FieldSet {
        let mut set: FieldSet = [
            FieldKey::U,
            FieldKey::V,
            FieldKey::W,
            FieldKey::Psi,
            FieldKey::Rho,
            FieldKey::KappaM,
            FieldKey::SurfaceTaux,
            FieldKey::SurfaceTauy,
            FieldKey::DU,
            FieldKey::DV,
        ]
        .into_iter()
        .collect();
        if self.pressure.is_some() {
            set.insert(FieldKey::DW);
        }
        set
    }

    fn writes(&self) -> WriteList {
        let mut w: WriteList = [
            FieldKey::U,
            FieldKey::V,
            FieldKey::W,
            FieldKey::Psi,
            FieldKey::DU,
            FieldKey::DV,
            FieldKey::KDissV,
            FieldKey::KDissH,
            FieldKey::KDissBot,
        ]
        .into_iter()
        .collect();
        if self.pressure.is_some() {
            w.push(FieldKey::DW);
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
        let nz = s.nz;

        let ModelState {
            u,
            v,
            w,
            psi,
            rho,
            du,
            dv,
            dw,
            mixing,
            dissipation,
            surface,
            barotropic_iterations,
            pressure_iterations,
            ..
        } = ctx.state_mut();

        {
            let (du_now, _) = du.tendency(lv);
            let (dv_now, _) = dv.tendency(lv);
            self.explicit_tendencies(
                grid,
                dt,
                u.current(lv),
                v.current(lv),
                w.current(lv),
                rho.current(lv),
                du_now,
                dv_now,
            );
        }

        let us = u.slots(lv);
        let vs = v.slots(lv);
        {
            let (du_now, du_past) = du.tendency(lv);
            ab_step(us.next, us.current, du_now, du_past, &grid.mask_u, dt, weights);
            let (dv_now, dv_past) = dv.tendency(lv);
            ab_step(vs.next, vs.current, dv_now, dv_past, &grid.mask_v, dt, weights);
        }

        let diss_u = self.lateral(grid, exchange, &self.ucell, &grid.mask_u, dt, us.current, us.next);
        let diss_v = self.lateral(grid, exchange, &self.vcell, &grid.mask_v, dt, vs.current, vs.next);
        faces_to_t(grid, &diss_u, &diss_v, &grid.mask_t, &mut dissipation.k_diss_h);

        let (bot_u, bot_v) = self.drag(grid, dt, (us.current, vs.current), (&mut *us.next, &mut *vs.next));
        faces_to_t(grid, &bot_u, &bot_v, &grid.mask_t, &mut dissipation.k_diss_bot);

        let shear_u = self.vertical(
            grid,
            dt,
            &self.kbot_u,
            nz * s.nyt(),
            &mixing.kappa_m,
            &surface.taux,
            us.next,
        )?;
        let shear_v = self.vertical(
            grid,
            dt,
            &self.kbot_v,
            nz,
            &mixing.kappa_m,
            &surface.tauy,
            vs.next,
        )?;
        faces_to_t(grid, &shear_u, &shear_v, &grid.mask_w, &mut dissipation.k_diss_v);

        exchange.exchange(&s, us.next, nz);
        exchange.exchange(&s, vs.next, nz);

        let ps = psi.slots(lv);
        *barotropic_iterations =
            self.project(grid, exchange, dt, (ps.past, ps.current, ps.next), us.next, vs.next)?;

        let ws = w.slots(lv);
        match (&self.pressure, dw.as_mut()) {
            (Some(op), Some(dw)) => {
                let (dw_now, dw_past) = dw.tendency(lv);
                dw_now.fill(0.0);
                if let Some(scheme) = self.params.advection {
                    let n = s.cells();
                    let mut east = vec![0.0; n];
                    let mut north = vec![0.0; n];
                    let mut top = vec![0.0; n];
                    for c in 0..n {
                        if c % nz + 1 < nz {
                            east[c] = 0.5 * (us.current[c] + us.current[c + 1]);
                            north[c] = 0.5 * (vs.current[c] + vs.current[c + 1]);
                            top[c] = 0.5 * (ws.current[c] + ws.current[c + 1]);
                        }
                    }
                    Advection::new(
                        s,
                        crate::closure::w_cells(grid),
                        FaceVelocity {
                            east: &east,
                            north: &north,
                            top: &top,
                        },
                        scheme,
                        dt,
                    )
                    .tendency(ws.current, dw_now);
                }
                ab_step(ws.next, ws.current, dw_now, dw_past, &grid.mask_w, dt, weights);
                // Rigid lid.
                for column in ws.next.chunks_mut(nz) {
                    column[nz - 1] = 0.0;
                }
                exchange.exchange(&s, ws.next, nz);

                let rhs: Vec<f64> = op
                    .divergence(grid, us.next, vs.next, ws.next)
                    .iter()
                    .map(|d| -d / dt)
                    .collect();
                let sol = op.stencil().solve(
                    &rhs,
                    &vec![0.0; rhs.len()],
                    self.solver.congr_epsilon_non_hydro,
                    self.solver.congr_max_iterations_non_hydro,
                );
                if !sol.converged {
                    return Err(StageError::NotConverged {
                        solver: "pressure",
                        iterations: sol.iterations,
                        residual: sol.residual_norm,
                    });
                }
                let mut p = vec![0.0; s.cells()];
                op.scatter(&sol.solution, &mut p);
                exchange.exchange(&s, &mut p, nz);
                PressureOperator::correct(grid, &p, dt, us.next, vs.next, ws.next);
                for f in [&mut *us.next, &mut *vs.next, &mut *ws.next] {
                    exchange.exchange(&s, f, nz);
                }
                *pressure_iterations = sol.iterations;
            }
            _ => {
                continuity(grid, us.next, vs.next, ws.next);
                exchange.exchange(&s, ws.next, nz);
            }
        }

        log::debug!(
            "momentum: step done, barotropic iterations = {}",
            *barotropic_iterations
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_core::NoForcing;
    use gyre_grid::{Coriolis, CyclicExchange, GridBuilder, ZonalBoundary, HALO};
    use gyre_state::Allocation;

    fn basin() -> Grid {
        GridBuilder::new(6, 5, 3)
            .uniform_spacing(2e4, 2e4)
            .dzt(vec![200.0, 100.0, 50.0])
            .coriolis(Coriolis::BetaPlane {
                f0: 1e-4,
                beta: 2e-11,
            })
            .build()
            .unwrap()
    }

    fn run(stage: &MomentumStage, grid: &Grid, state: &mut ModelState, dt: f64) {
        let ex = CyclicExchange::new(grid.boundary());
        let mut ctx = StepContext::new(grid, state, &ex, &NoForcing, dt);
        stage.step(&mut ctx).unwrap();
    }

    #[test]
    fn coriolis_does_no_work() {
        let grid = basin();
        let s = *grid.shape();
        let mut state = ModelState::new(&grid, Allocation::default());
        let lv = state.levels;
        for c in 0..s.cells() {
            state.u.slot_mut(lv.current())[c] = ((c * 7) % 5) as f64 * 0.01 * grid.mask_u[c];
            state.v.slot_mut(lv.current())[c] = ((c * 3) % 4) as f64 * 0.01 * grid.mask_v[c];
        }
        let params = MomentumParams {
            advection: None,
            ..MomentumParams::default()
        };
        let stage = MomentumStage::new(&grid, params, SolverParams::default(), 0.1, 600.0);
        let (u, v) = (state.u.current(lv).to_vec(), state.v.current(lv).to_vec());
        let mut du = vec![0.0; s.cells()];
        let mut dv = vec![0.0; s.cells()];
        let rho = vec![0.0; s.cells()];
        let w = vec![0.0; s.cells()];
        stage.explicit_tendencies(&grid, 600.0, &u, &v, &w, &rho, &mut du, &mut dv);
        let mut work = 0.0f64;
        let mut scale = 0.0f64;
        for i in s.interior_i() {
            for j in s.interior_j() {
                let col = s.col(i, j);
                for k in 0..s.nz {
                    let c = s.idx(i, j, k);
                    let vol_u = grid.area_u[col] * grid.dzt[k];
                    let vol_v = grid.area_v[col] * grid.dzt[k];
                    work += vol_u * u[c] * du[c] + vol_v * v[c] * dv[c];
                    scale += (vol_u * u[c] * du[c]).abs() + (vol_v * v[c] * dv[c]).abs();
                }
            }
        }
        assert!(scale > 0.0);
        assert!(work.abs() < 1e-12 * scale, "{work} vs {scale}");
    }

    #[test]
    fn projected_flow_is_non_divergent() {
        let grid = basin();
        let s = *grid.shape();
        let mut state = ModelState::new(&grid, Allocation::default());
        let lv = state.levels;
        for c in 0..s.cells() {
            state.u.slot_mut(lv.current())[c] = ((c * 11) % 7) as f64 * 0.02 * grid.mask_u[c];
        }
        let stage = MomentumStage::new(
            &grid,
            MomentumParams::default(),
            SolverParams::default(),
            0.1,
            600.0,
        );
        run(&stage, &grid, &mut state, 600.0);
        let div = stage
            .barotropic()
            .transport_divergence(&grid, state.u.next(lv), state.v.next(lv));
        let scale = stage
            .barotropic()
            .transport_divergence(&grid, state.u.current(lv), state.v.current(lv))
            .iter()
            .map(|d| d.abs())
            .sum::<f64>();
        let residual: f64 = div.iter().map(|d| d.abs()).sum();
        assert!(residual < 1e-9 * scale, "{residual} vs {scale}");
        // The rigid lid holds: no flow through the surface.
        for i in s.interior_i() {
            for j in s.interior_j() {
                let top = s.idx(i, j, s.nz - 1);
                assert!(state.w.next(lv)[top].abs() < 1e-12);
            }
        }
        assert!(state.barotropic_iterations > 0);
    }

    #[test]
    fn rest_stays_at_rest() {
        let grid = basin();
        let mut state = ModelState::new(&grid, Allocation::default());
        let stage = MomentumStage::new(
            &grid,
            MomentumParams::default(),
            SolverParams::default(),
            0.1,
            600.0,
        );
        run(&stage, &grid, &mut state, 600.0);
        let lv = state.levels;
        assert!(state.u.next(lv).iter().all(|&x| x == 0.0));
        assert!(state.dissipation.k_diss_v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn bottom_drag_dissipates_into_k_diss_bot() {
        let grid = basin();
        let s = *grid.shape();
        let mut state = ModelState::new(&grid, Allocation::default());
        let lv = state.levels;
        let c = s.idx(HALO + 2, HALO + 2, 0);
        state.u.slot_mut(lv.current())[c] = 0.1;
        let params = MomentumParams {
            r_bot: 1e-3,
            ..MomentumParams::default()
        };
        let stage = MomentumStage::new(&grid, params, SolverParams::default(), 0.1, 600.0);
        run(&stage, &grid, &mut state, 600.0);
        let lost = grid.integrate_t(|x| state.dissipation.k_diss_bot[x]);
        let expected = 1e-3 * 0.01 / grid.dzt[0] * grid.area_u[c / s.nz] * grid.dzt[0];
        assert!((lost - expected).abs() < 1e-12 * expected);
    }
}
