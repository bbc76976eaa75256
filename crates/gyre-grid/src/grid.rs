//! The immutable model grid and its builder.

use gyre_core::constants::{DEG_TO_M, OMEGA};

use crate::edge::{CoordinateSystem, ZonalBoundary};
use crate::error::GridError;
use crate::exchange::{CyclicExchange, HaloExchange};
use crate::shape::{Shape, HALO};

/// How the Coriolis parameter is specified.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Coriolis {
    /// `f = f0 + beta * y` with `y` in metres from the southern edge.
    BetaPlane {
        /// Coriolis parameter at the southern edge, 1/s.
        f0: f64,
        /// Meridional gradient, 1/(m s).
        beta: f64,
    },
    /// `f = 2 Ω sin(latitude)`; requires spherical coordinates.
    Spherical,
}

/// Geometry, metrics and masks of the staggered grid.
///
/// Produced once by [`GridBuilder::build`]; never mutated afterwards. Mask
/// arrays hold `1.0` for ocean and `0.0` for land so they can multiply
/// fields directly.
#[derive(Clone, Debug)]
pub struct Grid {
    shape: Shape,
    coords: CoordinateSystem,
    boundary: ZonalBoundary,

    /// Zonal position of tracer points (metres or degrees).
    pub xt: Vec<f64>,
    /// Zonal position of u points.
    pub xu: Vec<f64>,
    /// Zonal tracer-cell width in metres (unscaled by latitude).
    pub dxt: Vec<f64>,
    /// Zonal distance between tracer points in metres (unscaled).
    pub dxu: Vec<f64>,
    /// Meridional position of tracer points.
    pub yt: Vec<f64>,
    /// Meridional position of v points.
    pub yu: Vec<f64>,
    /// Meridional tracer-cell height in metres.
    pub dyt: Vec<f64>,
    /// Meridional distance between tracer points in metres.
    pub dyu: Vec<f64>,
    /// Depth of tracer points (negative, metres).
    pub zt: Vec<f64>,
    /// Depth of w points, the top face of each cell.
    pub zw: Vec<f64>,
    /// Tracer-cell thickness.
    pub dzt: Vec<f64>,
    /// W-cell thickness (distance between tracer points).
    pub dzw: Vec<f64>,
    /// cos(latitude) at tracer rows.
    pub cost: Vec<f64>,
    /// cos(latitude) at v rows.
    pub cosu: Vec<f64>,
    /// tan(latitude) / radius at tracer rows, zero on Cartesian grids.
    pub tantr: Vec<f64>,

    /// Coriolis parameter at tracer points.
    pub coriolis_t: Vec<f64>,
    /// Horizontal Coriolis component `2 Ω cos(latitude)`.
    pub coriolis_h: Vec<f64>,
    /// Meridional gradient of the Coriolis parameter.
    pub beta: Vec<f64>,

    /// Bottom-index map: 0 for land, otherwise `1 + ` the deepest wet level.
    pub kbot: Vec<usize>,
    /// Lee-wave topographic roughness per column, metres.
    pub hrms_k0: Vec<f64>,
    /// Water depth at tracer columns.
    pub ht: Vec<f64>,
    /// Water depth at u columns.
    pub hu: Vec<f64>,
    /// Water depth at v columns.
    pub hv: Vec<f64>,
    /// Horizontal area of tracer cells.
    pub area_t: Vec<f64>,
    /// Horizontal area of u cells.
    pub area_u: Vec<f64>,
    /// Horizontal area of v cells.
    pub area_v: Vec<f64>,

    /// Tracer mask.
    pub mask_t: Vec<f64>,
    /// U mask.
    pub mask_u: Vec<f64>,
    /// V mask.
    pub mask_v: Vec<f64>,
    /// W mask.
    pub mask_w: Vec<f64>,
    /// Vorticity mask.
    pub mask_z: Vec<f64>,
}

/// Masks derived from a bottom-index map.
struct Masks {
    t: Vec<f64>,
    u: Vec<f64>,
    v: Vec<f64>,
    w: Vec<f64>,
    z: Vec<f64>,
}

fn derive_masks(shape: &Shape, kbot: &[usize], boundary: ZonalBoundary) -> Masks {
    let (nxt, nyt, nz) = (shape.nxt(), shape.nyt(), shape.nz);
    let n = shape.cells();
    let mut t = vec![0.0f64; n];
    for i in 0..nxt {
        for j in 0..nyt {
            let kb = kbot[shape.col(i, j)];
            if kb == 0 {
                continue;
            }
            for k in kb - 1..nz {
                t[shape.idx(i, j, k)] = 1.0;
            }
        }
    }
    let mut u = vec![0.0; n];
    let mut v = vec![0.0; n];
    let mut z = vec![0.0; n];
    let mut w = vec![0.0; n];
    for i in 0..nxt {
        for j in 0..nyt {
            for k in 0..nz {
                let c = shape.idx(i, j, k);
                if i + 1 < nxt {
                    u[c] = t[c].min(t[shape.idx(i + 1, j, k)]);
                }
                if j + 1 < nyt {
                    v[c] = t[c].min(t[shape.idx(i, j + 1, k)]);
                }
                if i + 1 < nxt && j + 1 < nyt {
                    z[c] = t[c]
                        .min(t[shape.idx(i + 1, j, k)])
                        .min(t[shape.idx(i, j + 1, k)])
                        .min(t[shape.idx(i + 1, j + 1, k)]);
                }
                w[c] = if k + 1 < nz {
                    t[c].min(t[c + 1])
                } else {
                    t[c]
                };
            }
        }
    }
    let ex = CyclicExchange::new(boundary);
    for m in [&mut t, &mut u, &mut v, &mut w, &mut z] {
        ex.exchange(shape, m, nz);
    }
    Masks { t, u, v, w, z }
}

impl Grid {
    /// Array shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Horizontal coordinate system.
    pub fn coordinates(&self) -> CoordinateSystem {
        self.coords
    }

    /// Zonal boundary condition.
    pub fn boundary(&self) -> ZonalBoundary {
        self.boundary
    }

    /// Flat cell index shortcut.
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        self.shape.idx(i, j, k)
    }

    /// Flat column index shortcut.
    #[inline]
    pub fn col(&self, i: usize, j: usize) -> usize {
        self.shape.col(i, j)
    }

    /// Volume of the tracer cell `(i, j, k)`.
    pub fn volume_t(&self, i: usize, j: usize, k: usize) -> f64 {
        self.area_t[self.col(i, j)] * self.dzt[k]
    }

    /// Volume of the w cell `(i, j, k)`.
    pub fn volume_w(&self, i: usize, j: usize, k: usize) -> f64 {
        self.area_t[self.col(i, j)] * self.dzw[k]
    }

    /// Sum of `f(i, j, k) * volume` over wet interior tracer cells.
    pub fn integrate_t(&self, mut f: impl FnMut(usize) -> f64) -> f64 {
        let s = &self.shape;
        let mut sum = 0.0;
        for i in s.interior_i() {
            for j in s.interior_j() {
                for k in 0..s.nz {
                    let c = s.idx(i, j, k);
                    if self.mask_t[c] > 0.0 {
                        sum += f(c) * self.volume_t(i, j, k);
                    }
                }
            }
        }
        sum
    }

    /// Sum of `f(i, j, k) * volume` over wet interior w cells.
    pub fn integrate_w(&self, mut f: impl FnMut(usize) -> f64) -> f64 {
        let s = &self.shape;
        let mut sum = 0.0;
        for i in s.interior_i() {
            for j in s.interior_j() {
                for k in 0..s.nz {
                    let c = s.idx(i, j, k);
                    if self.mask_w[c] > 0.0 {
                        sum += f(c) * self.volume_w(i, j, k);
                    }
                }
            }
        }
        sum
    }

    /// Sum of `f(col) * area` over wet interior columns.
    pub fn integrate_surface(&self, mut f: impl FnMut(usize) -> f64) -> f64 {
        let s = &self.shape;
        let mut sum = 0.0;
        for i in s.interior_i() {
            for j in s.interior_j() {
                let c = s.col(i, j);
                if self.kbot[c] > 0 {
                    sum += f(c) * self.area_t[c];
                }
            }
        }
        sum
    }

    /// Re-derive every mask from `kbot` and compare with the stored masks.
    pub fn check_mask_consistency(&self) -> Result<(), GridError> {
        let m = derive_masks(&self.shape, &self.kbot, self.boundary);
        let pairs: [(&'static str, &[f64], &[f64]); 5] = [
            ("mask_t", &m.t, &self.mask_t),
            ("mask_u", &m.u, &self.mask_u),
            ("mask_v", &m.v, &self.mask_v),
            ("mask_w", &m.w, &self.mask_w),
            ("mask_z", &m.z, &self.mask_z),
        ];
        for (mask, derived, stored) in pairs {
            if let Some(index) = derived.iter().zip(stored).position(|(a, b)| a != b) {
                return Err(GridError::MaskInconsistent { mask, index });
            }
        }
        Ok(())
    }
}

/// Builder for [`Grid`], the grid/topography provider interface.
///
/// Spacings are given for interior cells only and extended into the halo.
/// Vertical spacings are listed bottom to top.
#[derive(Clone, Debug)]
pub struct GridBuilder {
    shape: Shape,
    coords: CoordinateSystem,
    boundary: ZonalBoundary,
    x_origin: f64,
    y_origin: f64,
    dxt: Vec<f64>,
    dyt: Vec<f64>,
    dzt: Vec<f64>,
    coriolis: Coriolis,
    kbot: Option<Vec<usize>>,
    hrms_k0: Option<Vec<f64>>,
}

impl GridBuilder {
    /// Start a builder with uniform unit spacing, flat bottom at full depth,
    /// closed boundaries and no rotation.
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            shape: Shape::new(nx, ny, nz),
            coords: CoordinateSystem::Cartesian,
            boundary: ZonalBoundary::Closed,
            x_origin: 0.0,
            y_origin: 0.0,
            dxt: vec![1.0; nx],
            dyt: vec![1.0; ny],
            dzt: vec![1.0; nz],
            coriolis: Coriolis::BetaPlane { f0: 0.0, beta: 0.0 },
            kbot: None,
            hrms_k0: None,
        }
    }

    /// Horizontal coordinate system (default Cartesian).
    pub fn coordinates(mut self, coords: CoordinateSystem) -> Self {
        self.coords = coords;
        self
    }

    /// Zonal boundary (default closed).
    pub fn boundary(mut self, boundary: ZonalBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Position of the south-western tracer point.
    pub fn origin(mut self, x: f64, y: f64) -> Self {
        self.x_origin = x;
        self.y_origin = y;
        self
    }

    /// Zonal spacing of each interior column.
    pub fn dxt(mut self, dxt: Vec<f64>) -> Self {
        self.dxt = dxt;
        self
    }

    /// Meridional spacing of each interior row.
    pub fn dyt(mut self, dyt: Vec<f64>) -> Self {
        self.dyt = dyt;
        self
    }

    /// Layer thicknesses from the bottom level up.
    pub fn dzt(mut self, dzt: Vec<f64>) -> Self {
        self.dzt = dzt;
        self
    }

    /// Uniform horizontal spacing.
    pub fn uniform_spacing(self, dx: f64, dy: f64) -> Self {
        let (nx, ny) = (self.shape.nx, self.shape.ny);
        self.dxt(vec![dx; nx]).dyt(vec![dy; ny])
    }

    /// Coriolis specification.
    pub fn coriolis(mut self, coriolis: Coriolis) -> Self {
        self.coriolis = coriolis;
        self
    }

    /// Bottom-index map for interior columns, indexed `i * ny + j`.
    pub fn kbot(mut self, kbot: Vec<usize>) -> Self {
        self.kbot = Some(kbot);
        self
    }

    /// Lee-wave roughness for interior columns, indexed `i * ny + j`.
    pub fn hrms_k0(mut self, hrms: Vec<f64>) -> Self {
        self.hrms_k0 = Some(hrms);
        self
    }

    /// Validate inputs, compute metrics and derive masks.
    pub fn build(self) -> Result<Grid, GridError> {
        let shape = self.shape;
        let (nx, ny, nz) = (shape.nx, shape.ny, shape.nz);
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(GridError::EmptyGrid);
        }
        check_spacing("dxt", &self.dxt, nx)?;
        check_spacing("dyt", &self.dyt, ny)?;
        check_spacing("dzt", &self.dzt, nz)?;

        let scale = match self.coords {
            CoordinateSystem::Cartesian => 1.0,
            CoordinateSystem::Spherical => DEG_TO_M,
        };
        let cyclic = self.boundary == ZonalBoundary::Cyclic;

        // ── Horizontal axes ──
        let dx_in = extend(&self.dxt, cyclic);
        let dy_in = extend(&self.dyt, false);
        let (xt, xu, dxu_in) = axis(&dx_in, self.x_origin);
        let (yt, yu, dyu_in) = axis(&dy_in, self.y_origin);
        let dxt: Vec<f64> = dx_in.iter().map(|d| d * scale).collect();
        let dxu: Vec<f64> = dxu_in.iter().map(|d| d * scale).collect();
        let dyt: Vec<f64> = dy_in.iter().map(|d| d * scale).collect();
        let dyu: Vec<f64> = dyu_in.iter().map(|d| d * scale).collect();

        let (cost, cosu, tantr) = match self.coords {
            CoordinateSystem::Cartesian => {
                let n = shape.nyt();
                (vec![1.0; n], vec![1.0; n], vec![0.0; n])
            }
            CoordinateSystem::Spherical => (
                yt.iter().map(|y| y.to_radians().cos()).collect(),
                yu.iter().map(|y| y.to_radians().cos()).collect(),
                yt.iter()
                    .map(|y| y.to_radians().tan() / gyre_core::constants::RADIUS)
                    .collect(),
            ),
        };

        // ── Vertical axis ──
        let dzt = self.dzt.clone();
        let mut zw = vec![0.0; nz];
        for k in (0..nz - 1).rev() {
            zw[k] = zw[k + 1] - dzt[k + 1];
        }
        let zt: Vec<f64> = (0..nz).map(|k| zw[k] - 0.5 * dzt[k]).collect();
        let mut dzw = vec![0.0; nz];
        for k in 0..nz - 1 {
            dzw[k] = zt[k + 1] - zt[k];
        }
        dzw[nz - 1] = 0.5 * dzt[nz - 1];

        // ── Coriolis ──
        let columns = shape.columns();
        let mut coriolis_t = vec![0.0; columns];
        let mut coriolis_h = vec![0.0; columns];
        let f_row: Vec<f64> = match self.coriolis {
            Coriolis::BetaPlane { f0, beta } => {
                let y0 = yt[HALO];
                yt.iter().map(|y| f0 + beta * (y - y0) * scale).collect()
            }
            Coriolis::Spherical => yt
                .iter()
                .map(|y| 2.0 * OMEGA * y.to_radians().sin())
                .collect(),
        };
        let fh_row: Vec<f64> = match self.coriolis {
            Coriolis::BetaPlane { .. } => vec![0.0; shape.nyt()],
            Coriolis::Spherical => yt
                .iter()
                .map(|y| 2.0 * OMEGA * y.to_radians().cos())
                .collect(),
        };
        let mut beta = vec![0.0; columns];
        for i in 0..shape.nxt() {
            for j in 0..shape.nyt() {
                let c = shape.col(i, j);
                coriolis_t[c] = f_row[j];
                coriolis_h[c] = fh_row[j];
                if j >= 1 && j + 1 < shape.nyt() {
                    beta[c] = 0.5
                        * ((f_row[j + 1] - f_row[j]) / dyu[j]
                            + (f_row[j] - f_row[j - 1]) / dyu[j - 1]);
                }
            }
        }

        // ── Topography ──
        let interior_kbot = self.kbot.unwrap_or_else(|| vec![1; nx * ny]);
        if interior_kbot.len() != nx * ny {
            return Err(GridError::LengthMismatch {
                name: "kbot",
                expected: nx * ny,
                actual: interior_kbot.len(),
            });
        }
        let mut kbot = vec![0usize; columns];
        for (n, &kb) in interior_kbot.iter().enumerate() {
            let (i, j) = (n / ny, n % ny);
            if kb > nz {
                return Err(GridError::BottomIndexOutOfRange {
                    column: (i, j),
                    kbot: kb,
                    nz,
                });
            }
            kbot[shape.col(i + HALO, j + HALO)] = kb;
        }
        let mut hrms_k0 = vec![0.0; columns];
        if let Some(h) = self.hrms_k0 {
            if h.len() != nx * ny {
                return Err(GridError::LengthMismatch {
                    name: "hrms_k0",
                    expected: nx * ny,
                    actual: h.len(),
                });
            }
            for (n, v) in h.into_iter().enumerate() {
                hrms_k0[shape.col(n / ny + HALO, n % ny + HALO)] = v;
            }
        }
        if cyclic {
            let ex = CyclicExchange::new(self.boundary);
            let mut kb_f: Vec<f64> = kbot.iter().map(|&k| k as f64).collect();
            ex.exchange(&shape, &mut kb_f, 1);
            kbot = kb_f.iter().map(|&k| k as usize).collect();
            ex.exchange(&shape, &mut hrms_k0, 1);
        }

        let masks = derive_masks(&shape, &kbot, self.boundary);
        let depth = |mask: &[f64], c: usize| -> f64 {
            (0..nz).map(|k| mask[c * nz + k] * dzt[k]).sum()
        };
        let mut ht = vec![0.0; columns];
        let mut hu = vec![0.0; columns];
        let mut hv = vec![0.0; columns];
        let mut area_t = vec![0.0; columns];
        let mut area_u = vec![0.0; columns];
        let mut area_v = vec![0.0; columns];
        for i in 0..shape.nxt() {
            for j in 0..shape.nyt() {
                let c = shape.col(i, j);
                ht[c] = depth(&masks.t, c);
                hu[c] = depth(&masks.u, c);
                hv[c] = depth(&masks.v, c);
                area_t[c] = dxt[i] * cost[j] * dyt[j];
                area_u[c] = dxu[i] * cost[j] * dyt[j];
                area_v[c] = dxt[i] * cosu[j] * dyu[j];
            }
        }

        Ok(Grid {
            shape,
            coords: self.coords,
            boundary: self.boundary,
            xt,
            xu,
            dxt,
            dxu,
            yt,
            yu,
            dyt,
            dyu,
            zt,
            zw,
            dzt,
            dzw,
            cost,
            cosu,
            tantr,
            coriolis_t,
            coriolis_h,
            beta,
            kbot,
            hrms_k0,
            ht,
            hu,
            hv,
            area_t,
            area_u,
            area_v,
            mask_t: masks.t,
            mask_u: masks.u,
            mask_v: masks.v,
            mask_w: masks.w,
            mask_z: masks.z,
        })
    }
}

fn check_spacing(name: &'static str, d: &[f64], n: usize) -> Result<(), GridError> {
    if d.len() != n {
        return Err(GridError::LengthMismatch {
            name,
            expected: n,
            actual: d.len(),
        });
    }
    match d.iter().position(|v| !v.is_finite() || *v <= 0.0) {
        Some(index) => Err(GridError::NonPositiveSpacing { name, index }),
        None => Ok(()),
    }
}

/// Extend interior spacings into the halo, wrapping when cyclic.
fn extend(interior: &[f64], cyclic: bool) -> Vec<f64> {
    let n = interior.len();
    (0..n + 2 * HALO)
        .map(|i| {
            let src = i as isize - HALO as isize;
            let src = if cyclic {
                src.rem_euclid(n as isize) as usize
            } else {
                src.clamp(0, n as isize - 1) as usize
            };
            interior[src]
        })
        .collect()
}

/// Tracer positions, face positions and tracer-point distances along an axis.
fn axis(d: &[f64], origin: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = d.len();
    let mut t = vec![0.0f64; n];
    t[HALO] = origin;
    for i in HALO + 1..n {
        t[i] = t[i - 1] + 0.5 * (d[i - 1] + d[i]);
    }
    for i in (0..HALO).rev() {
        t[i] = t[i + 1] - 0.5 * (d[i + 1] + d[i]);
    }
    let faces: Vec<f64> = (0..n).map(|i| t[i] + 0.5 * d[i]).collect();
    let du: Vec<f64> = (0..n)
        .map(|i| if i + 1 < n { t[i + 1] - t[i] } else { d[i] })
        .collect();
    (t, faces, du)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basin() -> Grid {
        // 4x3 basin, 3 levels; one land column and one shallow column.
        let kbot = vec![
            1, 1, 1, //
            1, 0, 1, //
            1, 3, 1, //
            1, 1, 1,
        ];
        GridBuilder::new(4, 3, 3)
            .uniform_spacing(1e4, 1e4)
            .dzt(vec![100.0, 50.0, 25.0])
            .kbot(kbot)
            .build()
            .unwrap()
    }

    #[test]
    fn vertical_axis_is_stacked_from_bottom() {
        let g = basin();
        assert_eq!(g.zw[2], 0.0);
        assert_eq!(g.zw[1], -25.0);
        assert_eq!(g.zw[0], -75.0);
        assert_eq!(g.zt[2], -12.5);
        assert_eq!(g.dzw[2], 12.5);
        assert!((g.dzw[0] - (g.zt[1] - g.zt[0])).abs() < 1e-12);
    }

    #[test]
    fn masks_follow_bottom_index() {
        let g = basin();
        let s = *g.shape();
        let land = s.col(1 + HALO, 1 + HALO);
        assert_eq!(g.kbot[land], 0);
        for k in 0..3 {
            assert_eq!(g.mask_t[land * 3 + k], 0.0);
        }
        let shallow = s.col(2 + HALO, 1 + HALO);
        assert_eq!(g.mask_t[shallow * 3], 0.0);
        assert_eq!(g.mask_t[shallow * 3 + 1], 0.0);
        assert_eq!(g.mask_t[shallow * 3 + 2], 1.0);
        assert_eq!(g.ht[shallow], 25.0);
        assert_eq!(g.ht[s.col(HALO, HALO)], 175.0);
        // Face between the shallow column and its western neighbour is only
        // open at the surface.
        let west = s.col(1 + HALO, 1 + HALO);
        assert_eq!(g.mask_u[west * 3 + 2], 0.0, "land to the west");
        assert!(g.check_mask_consistency().is_ok());
    }

    #[test]
    fn halo_columns_are_land_when_closed() {
        let g = basin();
        let s = *g.shape();
        for j in 0..s.nyt() {
            assert_eq!(g.kbot[s.col(0, j)], 0);
            assert_eq!(g.kbot[s.col(s.nxt() - 1, j)], 0);
        }
    }

    #[test]
    fn cyclic_halo_copies_topography() {
        let g = GridBuilder::new(4, 2, 2)
            .boundary(ZonalBoundary::Cyclic)
            .kbot(vec![1, 1, 2, 2, 1, 0, 1, 1])
            .build()
            .unwrap();
        let s = *g.shape();
        for j in 0..s.nyt() {
            assert_eq!(g.kbot[s.col(0, j)], g.kbot[s.col(s.nx, j)]);
            assert_eq!(g.kbot[s.col(s.nx + 2, j)], g.kbot[s.col(HALO, j)]);
        }
        assert!(g.check_mask_consistency().is_ok());
    }

    #[test]
    fn spherical_metrics() {
        let g = GridBuilder::new(2, 2, 1)
            .coordinates(CoordinateSystem::Spherical)
            .coriolis(Coriolis::Spherical)
            .origin(0.0, 60.0)
            .uniform_spacing(1.0, 1.0)
            .build()
            .unwrap();
        let j = HALO;
        assert!((g.cost[j] - 0.5).abs() < 1e-12);
        assert!((g.dxt[HALO] - DEG_TO_M).abs() < 1e-6);
        let c = g.col(HALO, j);
        assert!((g.area_t[c] - DEG_TO_M * DEG_TO_M * 0.5).abs() / g.area_t[c] < 1e-12);
        assert!(g.coriolis_t[c] > 0.0);
        assert!(g.beta[c] > 0.0);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(GridBuilder::new(0, 2, 2).build().unwrap_err(), GridError::EmptyGrid);
        assert!(matches!(
            GridBuilder::new(2, 2, 2).dzt(vec![1.0]).build(),
            Err(GridError::LengthMismatch { name: "dzt", .. })
        ));
        assert!(matches!(
            GridBuilder::new(2, 2, 2).dxt(vec![1.0, -1.0]).build(),
            Err(GridError::NonPositiveSpacing { name: "dxt", index: 1 })
        ));
        assert!(matches!(
            GridBuilder::new(2, 1, 2).kbot(vec![1, 3]).build(),
            Err(GridError::BottomIndexOutOfRange { kbot: 3, .. })
        ));
    }
}
