//! Flux-form advection on any of the staggered cell types.
//!
//! The operator is written once for a generic finite-volume cell: the
//! caller describes the cell widths, the cosine factors and the mask, and
//! supplies the transport velocity on the east, north and top faces. This
//! covers tracers on T cells, the closure energies on W cells and momentum
//! on U and V cells.

use gyre_grid::Shape;
use rayon::prelude::*;

use crate::params::AdvectionScheme;

/// Metrics of the advected cell type.
#[derive(Clone, Copy, Debug)]
pub struct CellGeometry<'a> {
    /// Cell mask, one value per cell.
    pub mask: &'a [f64],
    /// Zonal cell width per `i`, unscaled by latitude.
    pub dx: &'a [f64],
    /// Meridional cell height per `j`.
    pub dy: &'a [f64],
    /// Cell thickness per `k`.
    pub dz: &'a [f64],
    /// Cosine of latitude at the cell centre, per `j`.
    pub cos_centre: &'a [f64],
    /// Cosine of latitude at the northern face of row `j`.
    pub cos_north: &'a [f64],
}

/// Transport velocity on the faces of each cell.
///
/// `east[c]` sits between cell `c` and its eastern neighbour, `north[c]`
/// between `c` and its northern neighbour, `top[c]` between level `k` and
/// `k + 1`.
#[derive(Clone, Copy, Debug)]
pub struct FaceVelocity<'a> {
    /// Zonal velocity on eastern faces.
    pub east: &'a [f64],
    /// Meridional velocity on northern faces.
    pub north: &'a [f64],
    /// Vertical velocity on top faces.
    pub top: &'a [f64],
}

/// Advection operator for one field layout.
#[derive(Clone, Copy, Debug)]
pub struct Advection<'a> {
    shape: Shape,
    geom: CellGeometry<'a>,
    vel: FaceVelocity<'a>,
    scheme: AdvectionScheme,
    dt: f64,
}

impl<'a> Advection<'a> {
    /// Bind geometry and velocities. `dt` only enters the superbee CFL.
    pub fn new(
        shape: Shape,
        geom: CellGeometry<'a>,
        vel: FaceVelocity<'a>,
        scheme: AdvectionScheme,
        dt: f64,
    ) -> Self {
        Self {
            shape,
            geom,
            vel,
            scheme,
            dt,
        }
    }

    /// Write `-div(v q)` for every interior cell into `out`.
    ///
    /// Halo cells of `out` are set to zero. Faces touching land carry no
    /// flux, and neither do the top face of the uppermost level and the
    /// bottom face of level zero, so the domain integral of `out` weighted
    /// by cell volume vanishes.
    pub fn tendency(&self, q: &[f64], out: &mut [f64]) {
        let s = self.shape;
        let nz = s.nz;
        let slab = s.nyt() * nz;
        out.par_chunks_mut(slab).enumerate().for_each(|(i, plane)| {
            plane.fill(0.0);
            if !s.interior_i().contains(&i) {
                return;
            }
            for j in s.interior_j() {
                for k in 0..nz {
                    let c = s.idx(i, j, k);
                    if self.geom.mask[c] == 0.0 {
                        continue;
                    }
                    let fe = self.flux_x(q, i, j, k);
                    let fw = self.flux_x(q, i - 1, j, k);
                    let fn_ = self.flux_y(q, i, j, k);
                    let fs = self.flux_y(q, i, j - 1, k);
                    let ft = if k + 1 < nz { self.flux_z(q, i, j, k) } else { 0.0 };
                    let fb = if k > 0 { self.flux_z(q, i, j, k - 1) } else { 0.0 };
                    let g = &self.geom;
                    let div = (fe - fw) / (g.cos_centre[j] * g.dx[i])
                        + (g.cos_north[j] * fn_ - g.cos_north[j - 1] * fs)
                            / (g.cos_centre[j] * g.dy[j])
                        + (ft - fb) / g.dz[k];
                    plane[j * nz + k] = -div * g.mask[c];
                }
            }
        });
    }

    fn face_mask(&self, a: usize, b: usize) -> f64 {
        self.geom.mask[a] * self.geom.mask[b]
    }

    /// Flux through the face between `(i, j, k)` and `(i + 1, j, k)`.
    fn flux_x(&self, q: &[f64], i: usize, j: usize, k: usize) -> f64 {
        let s = &self.shape;
        let (c0, c1) = (s.idx(i, j, k), s.idx(i + 1, j, k));
        let m0 = self.face_mask(c0, c1);
        if m0 == 0.0 {
            return 0.0;
        }
        let vel = self.vel.east[c0];
        match self.scheme {
            AdvectionScheme::Centered => vel * 0.5 * (q[c0] + q[c1]) * m0,
            AdvectionScheme::Superbee => {
                let cm = s.idx(i - 1, j, k);
                let cp = s.idx(i + 2, j, k);
                let spacing =
                    self.geom.cos_centre[j] * 0.5 * (self.geom.dx[i] + self.geom.dx[i + 1]);
                superbee(
                    vel,
                    [q[cm], q[c0], q[c1], q[cp]],
                    [self.face_mask(cm, c0), m0, self.face_mask(c1, cp)],
                    self.dt / spacing,
                )
            }
        }
    }

    /// Flux through the face between `(i, j, k)` and `(i, j + 1, k)`.
    fn flux_y(&self, q: &[f64], i: usize, j: usize, k: usize) -> f64 {
        let s = &self.shape;
        let (c0, c1) = (s.idx(i, j, k), s.idx(i, j + 1, k));
        let m0 = self.face_mask(c0, c1);
        if m0 == 0.0 {
            return 0.0;
        }
        let vel = self.vel.north[c0];
        match self.scheme {
            AdvectionScheme::Centered => vel * 0.5 * (q[c0] + q[c1]) * m0,
            AdvectionScheme::Superbee => {
                let cm = s.idx(i, j - 1, k);
                let cp = s.idx(i, j + 2, k);
                let spacing = 0.5 * (self.geom.dy[j] + self.geom.dy[j + 1]);
                superbee(
                    vel,
                    [q[cm], q[c0], q[c1], q[cp]],
                    [self.face_mask(cm, c0), m0, self.face_mask(c1, cp)],
                    self.dt / spacing,
                )
            }
        }
    }

    /// Flux through the face between levels `k` and `k + 1`.
    fn flux_z(&self, q: &[f64], i: usize, j: usize, k: usize) -> f64 {
        let s = &self.shape;
        let nz = s.nz;
        let (c0, c1) = (s.idx(i, j, k), s.idx(i, j, k + 1));
        let m0 = self.face_mask(c0, c1);
        if m0 == 0.0 {
            return 0.0;
        }
        let vel = self.vel.top[c0];
        match self.scheme {
            AdvectionScheme::Centered => vel * 0.5 * (q[c0] + q[c1]) * m0,
            AdvectionScheme::Superbee => {
                let (qm, mm) = if k > 0 {
                    (q[c0 - 1], self.face_mask(c0 - 1, c0))
                } else {
                    (q[c0], 0.0)
                };
                let (qp, mp) = if k + 2 < nz {
                    (q[c1 + 1], self.face_mask(c1, c1 + 1))
                } else {
                    (q[c1], 0.0)
                };
                let spacing = 0.5 * (self.geom.dz[k] + self.geom.dz[k + 1]);
                superbee(vel, [qm, q[c0], q[c1], qp], [mm, m0, mp], self.dt / spacing)
            }
        }
    }
}

/// Superbee-limited flux through the face between `q[1]` and `q[2]`.
///
/// `masks` are the face masks of the upstream, central and downstream
/// faces; `dt_dx` converts the velocity into a Courant number.
fn superbee(vel: f64, q: [f64; 4], masks: [f64; 3], dt_dx: f64) -> f64 {
    let rjm = (q[1] - q[0]) * masks[0];
    let rj = (q[2] - q[1]) * masks[1];
    let rjp = (q[3] - q[2]) * masks[2];
    let denom = if rj.abs() < 1e-20 { 1e-20 } else { rj };
    let ratio = if vel > 0.0 { rjm } else { rjp } / denom;
    let limiter = (2.0 * ratio).min(1.0).max(ratio.min(2.0)).max(0.0);
    let cfl = (vel * dt_dx).abs();
    vel * 0.5 * (q[1] + q[2]) - vel.abs() * ((1.0 - limiter) + cfl * limiter) * rj * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_grid::{GridBuilder, HALO};

    #[test]
    fn superbee_is_upwind_at_extrema() {
        // Local maximum: ratio negative, limiter zero, pure upwind.
        let f = superbee(2.0, [0.0, 1.0, 0.0, 0.0], [1.0; 3], 0.0);
        assert!((f - 2.0 * 1.0).abs() < 1e-14);
        let f = superbee(-2.0, [0.0, 0.0, 1.0, 0.0], [1.0; 3], 0.0);
        assert!((f + 2.0 * 1.0).abs() < 1e-14);
    }

    #[test]
    fn superbee_on_linear_profile() {
        // Vanishing Courant number recovers the centred flux.
        let f = superbee(1.0, [0.0, 1.0, 2.0, 3.0], [1.0; 3], 0.0);
        assert!((f - 1.5).abs() < 1e-14);
        // At unit Courant number the face value is the upstream cell.
        let f = superbee(1.0, [0.0, 1.0, 2.0, 3.0], [1.0; 3], 1.0);
        assert!((f - 1.0).abs() < 1e-14);
    }

    #[test]
    fn zonal_shift_is_conservative() {
        let g = GridBuilder::new(6, 4, 3)
            .uniform_spacing(1e3, 1e3)
            .dzt(vec![10.0; 3])
            .build()
            .unwrap();
        let s = *g.shape();
        let mut q = vec![0.0; s.cells()];
        let mut u = vec![0.0; s.cells()];
        for i in s.interior_i() {
            for j in s.interior_j() {
                for k in 0..3 {
                    let c = s.idx(i, j, k);
                    q[c] = (i * 7 + j * 3 + k) as f64 % 5.0;
                    u[c] = 0.3 * g.mask_u[c];
                }
            }
        }
        let zero = vec![0.0; s.cells()];
        for scheme in [AdvectionScheme::Centered, AdvectionScheme::Superbee] {
            let adv = Advection::new(
                s,
                CellGeometry {
                    mask: &g.mask_t,
                    dx: &g.dxt,
                    dy: &g.dyt,
                    dz: &g.dzt,
                    cos_centre: &g.cost,
                    cos_north: &g.cosu,
                },
                FaceVelocity {
                    east: &u,
                    north: &zero,
                    top: &zero,
                },
                scheme,
                100.0,
            );
            let mut out = vec![1.0; s.cells()];
            adv.tendency(&q, &mut out);
            let total = g.integrate_t(|c| out[c]);
            let scale = g.integrate_t(|c| out[c].abs());
            assert!(scale > 0.0);
            assert!(total.abs() <= 1e-12 * scale, "{scheme:?}: {total}");
            assert_eq!(out[s.idx(0, HALO, 0)], 0.0);
        }
    }
}
