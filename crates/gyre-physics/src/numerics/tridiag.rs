//! Tridiagonal systems for implicit vertical mixing.

use smallvec::SmallVec;

/// Solve `a[k] x[k-1] + b[k] x[k] + c[k] x[k+1] = d[k]` in place.
///
/// `a[0]` and `c[n-1]` are ignored. On return `d` holds `x`. The systems
/// built by the mixing schemes are diagonally dominant, so no pivoting is
/// done; a zero pivot leaves the corresponding entries untouched and
/// returns `false`.
pub fn solve(a: &[f64], b: &[f64], c: &[f64], d: &mut [f64]) -> bool {
    let n = d.len();
    debug_assert!(a.len() >= n && b.len() >= n && c.len() >= n);
    if n == 0 {
        return true;
    }
    let mut cp: SmallVec<[f64; 64]> = SmallVec::from_elem(0.0, n);
    let mut dp: SmallVec<[f64; 64]> = SmallVec::from_elem(0.0, n);
    if b[0] == 0.0 {
        return false;
    }
    cp[0] = c[0] / b[0];
    dp[0] = d[0] / b[0];
    for k in 1..n {
        let m = b[k] - a[k] * cp[k - 1];
        if m == 0.0 {
            return false;
        }
        cp[k] = c[k] / m;
        dp[k] = (d[k] - a[k] * dp[k - 1]) / m;
    }
    d[n - 1] = dp[n - 1];
    for k in (0..n - 1).rev() {
        d[k] = dp[k] - cp[k] * d[k + 1];
    }
    true
}

/// Vertical geometry of one implicit column solve.
///
/// Cells `k` and `k + 1` meet at interface `k`; `dz_iface[k]` is the
/// distance between their centres.
#[derive(Clone, Copy, Debug)]
pub struct ColumnGeometry<'a> {
    /// Cell thickness per level.
    pub dz: &'a [f64],
    /// Distance across interface `k`.
    pub dz_iface: &'a [f64],
}

impl<'a> ColumnGeometry<'a> {
    /// Tracer cells: interfaces are w points.
    pub fn t_cells(dzt: &'a [f64], dzw: &'a [f64]) -> Self {
        Self {
            dz: dzt,
            dz_iface: dzw,
        }
    }
}

/// Backward-Euler vertical diffusion with a linear sink on levels
/// `ks..x.len()` of one column.
///
/// Solves
/// `x' - dt * d/dz(K d/dz x') + dt * sink * x' = x + dt * source`
/// with no-flux boundaries. `kappa(k)` is the diffusivity on interface
/// `k`, `sink(k)` a non-negative rate and `source(k)` an explicit forcing
/// already divided by the cell thickness. Levels below `ks` are untouched.
pub fn implicit_column(
    x: &mut [f64],
    ks: usize,
    dt: f64,
    geom: ColumnGeometry<'_>,
    kappa: impl Fn(usize) -> f64,
    sink: impl Fn(usize) -> f64,
    source: impl Fn(usize) -> f64,
) -> bool {
    let nz = x.len();
    if ks >= nz {
        return true;
    }
    let n = nz - ks;
    let mut a: SmallVec<[f64; 64]> = SmallVec::from_elem(0.0, n);
    let mut b: SmallVec<[f64; 64]> = SmallVec::from_elem(0.0, n);
    let mut c: SmallVec<[f64; 64]> = SmallVec::from_elem(0.0, n);
    for (m, k) in (ks..nz).enumerate() {
        let below = if k > ks {
            dt * kappa(k - 1) / (geom.dz_iface[k - 1] * geom.dz[k])
        } else {
            0.0
        };
        let above = if k + 1 < nz {
            dt * kappa(k) / (geom.dz_iface[k] * geom.dz[k])
        } else {
            0.0
        };
        a[m] = -below;
        c[m] = -above;
        b[m] = 1.0 + below + above + dt * sink(k);
        x[k] += dt * source(k);
    }
    solve(&a, &b, &c, &mut x[ks..])
}
