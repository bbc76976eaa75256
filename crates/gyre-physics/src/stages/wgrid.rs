//! Velocities on the W grid.

use gyre_core::{FieldKey, FieldSet, StageError};
use gyre_stage::{Stage, StepContext, WriteList};
use rayon::prelude::*;

/// Interpolates the new velocity onto W cells for closure advection.
///
/// Horizontal components are thickness-weighted averages of the two T
/// levels a W cell straddles; the vertical component follows from
/// continuity on the W cells, integrated up from the bottom.
#[derive(Clone, Copy, Debug, Default)]
pub struct WGridStage;

impl WGridStage {
    /// Create the stage.
    pub fn new() -> Self {
        Self
    }
}

impl Stage for WGridStage {
    fn name(&self) -> &str {
        "wgrid_velocity"
    }

    fn reads(&self) -> FieldSet {
        [FieldKey::U, FieldKey::V].into_iter().collect()
    }

    fn writes(&self) -> WriteList {
        [FieldKey::UWgrid, FieldKey::VWgrid, FieldKey::WWgrid]
            .into_iter()
            .collect()
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), StageError> {
        let grid = ctx.grid();
        let exchange = ctx.exchange();
        let lv = ctx.levels();
        let s = *grid.shape();
        let nz = s.nz;
        let slab = s.nyt() * nz;

        let st = ctx.state_mut();
        let u = st.u.next(lv);
        let v = st.v.next(lv);
        let wg = st.wgrid.as_mut().ok_or_else(|| StageError::ExecutionFailed {
            reason: "W-grid velocity not allocated".into(),
        })?;

        let average = |f: &[f64], c: usize, k: usize| -> f64 {
            if k + 1 < nz {
                0.5 * (grid.dzt[k] * f[c] + grid.dzt[k + 1] * f[c + 1]) / grid.dzw[k]
            } else {
                0.5 * grid.dzt[k] * f[c] / grid.dzw[k]
            }
        };
        wg.u.par_chunks_mut(slab)
            .zip(wg.v.par_chunks_mut(slab))
            .enumerate()
            .for_each(|(i, (up, vp))| {
                for j in 0..s.nyt() {
                    for k in 0..nz {
                        let c = s.idx(i, j, k);
                        let l = j * nz + k;
                        up[l] = if i + 1 < s.nxt() {
                            average(u, c, k) * grid.mask_w[c] * grid.mask_w[s.idx(i + 1, j, k)]
                        } else {
                            0.0
                        };
                        vp[l] = if j + 1 < s.nyt() {
                            average(v, c, k) * grid.mask_w[c] * grid.mask_w[s.idx(i, j + 1, k)]
                        } else {
                            0.0
                        };
                    }
                }
            });

        let (uw, vw) = (&wg.u, &wg.v);
        wg.w.par_chunks_mut(slab).enumerate().for_each(|(i, wp)| {
            wp.fill(0.0);
            for j in 0..s.nyt() {
                if !s.has_neighbours(i, j) {
                    continue;
                }
                let mut below = 0.0;
                for k in 0..nz {
                    let c = s.idx(i, j, k);
                    if grid.mask_w[c] == 0.0 {
                        continue;
                    }
                    let div = (uw[c] - uw[s.idx(i - 1, j, k)]) / (grid.cost[j] * grid.dxt[i])
                        + (grid.cosu[j] * vw[c] - grid.cosu[j - 1] * vw[s.idx(i, j - 1, k)])
                            / (grid.cost[j] * grid.dyt[j]);
                    let top = below - grid.dzw[k] * div;
                    wp[j * nz + k] = if k + 1 < nz { top } else { 0.0 };
                    below = top;
                }
            }
        });

        for f in [&mut wg.u, &mut wg.v, &mut wg.w] {
            exchange.exchange(&s, f, nz);
        }
        log::trace!("wgrid_velocity: interpolated {} columns", s.columns());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyre_core::NoForcing;
    use gyre_grid::{CyclicExchange, GridBuilder, ZonalBoundary, HALO};
    use gyre_state::{Allocation, ModelState};

    #[test]
    fn uniform_flow_stays_uniform_and_non_divergent() {
        let grid = GridBuilder::new(4, 3, 3)
            .boundary(ZonalBoundary::Cyclic)
            .dzt(vec![30.0, 20.0, 10.0])
            .build()
            .unwrap();
        let s = *grid.shape();
        let alloc = Allocation {
            wgrid: true,
            ..Allocation::default()
        };
        let mut state = ModelState::new(&grid, alloc);
        let lv = state.levels;
        for (c, u) in state.u.next_mut(lv).iter_mut().enumerate() {
            *u = 0.2 * grid.mask_u[c];
        }
        let ex = CyclicExchange::new(ZonalBoundary::Cyclic);
        let mut ctx = StepContext::new(&grid, &mut state, &ex, &NoForcing, 60.0);
        WGridStage::new().step(&mut ctx).unwrap();
        let wg = state.wgrid.as_ref().unwrap();
        let c = s.idx(HALO + 1, HALO + 1, 1);
        assert!((wg.u[c] - 0.2).abs() < 1e-14);
        assert!(wg.w.iter().all(|w| w.abs() < 1e-14));
    }
}
