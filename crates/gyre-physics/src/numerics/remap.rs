//! Conservative transfer between the T and W vertical grids.

/// Map T-cell values of one column onto W cells so that
/// `Σ out·dzw == Σ t·dzt` over the wet levels `ks..`.
///
/// Each T cell gives half of its content to the W cell below and half to
/// the one above; the bottom cell has no wet W cell below and gives all of
/// its lower half to W cell `ks`. Levels below `ks` are zeroed.
pub fn t_to_w(t: &[f64], ks: usize, dzt: &[f64], dzw: &[f64], out: &mut [f64]) {
    let nz = t.len();
    out[..ks.min(nz)].fill(0.0);
    for k in ks..nz {
        let lower = if k == ks { 1.0 } else { 0.5 };
        let mut content = lower * dzt[k] * t[k];
        if k + 1 < nz {
            content += 0.5 * dzt[k + 1] * t[k + 1];
        }
        out[k] = content / dzw[k];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DZT: [f64; 4] = [40.0, 30.0, 20.0, 10.0];

    fn dzw() -> [f64; 4] {
        [35.0, 25.0, 15.0, 5.0]
    }

    #[test]
    fn remap_conserves_column_integral() {
        let t = [0.0, 3.0, -1.0, 2.0];
        let mut w = [9.0; 4];
        t_to_w(&t, 1, &DZT, &dzw(), &mut w);
        let ti: f64 = (1..4).map(|k| t[k] * DZT[k]).sum();
        let wi: f64 = (1..4).map(|k| w[k] * dzw()[k]).sum();
        assert!((ti - wi).abs() < 1e-12);
        assert_eq!(w[0], 0.0);
    }

    #[test]
    fn uniform_profile_is_not_uniform_at_the_bottom() {
        let t = [1.0; 4];
        let mut w = [0.0; 4];
        t_to_w(&t, 0, &DZT, &dzw(), &mut w);
        assert!((w[3] - 1.0).abs() < 1e-15, "top half cell");
        assert!((w[1] - 1.0).abs() < 1e-15);
        assert!(w[0] > 1.0, "bottom W cell collects the lower half cell");
    }

    #[test]
    fn single_level_column() {
        let t = [0.0, 0.0, 0.0, 4.0];
        let mut w = [0.0; 4];
        t_to_w(&t, 3, &DZT, &dzw(), &mut w);
        assert!((w[3] * dzw()[3] - 4.0 * DZT[3]).abs() < 1e-12);
    }
}
