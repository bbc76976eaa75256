//! Masks derived from arbitrary bottom-index maps stay consistent.

use gyre_grid::{GridBuilder, ZonalBoundary, HALO};
use proptest::prelude::*;

const NX: usize = 6;
const NY: usize = 5;
const NZ: usize = 4;

fn arb_kbot() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..=NZ, NX * NY)
}

proptest! {
    #[test]
    fn derived_masks_are_consistent(kbot in arb_kbot(), cyclic in any::<bool>()) {
        let boundary = if cyclic { ZonalBoundary::Cyclic } else { ZonalBoundary::Closed };
        let grid = GridBuilder::new(NX, NY, NZ)
            .boundary(boundary)
            .kbot(kbot)
            .build()
            .unwrap();
        prop_assert!(grid.check_mask_consistency().is_ok());
    }

    #[test]
    fn velocity_masks_never_exceed_tracer_mask(kbot in arb_kbot()) {
        let grid = GridBuilder::new(NX, NY, NZ).kbot(kbot).build().unwrap();
        let s = *grid.shape();
        for i in 0..s.nxt() - 1 {
            for j in 0..s.nyt() - 1 {
                for k in 0..NZ {
                    let c = s.idx(i, j, k);
                    prop_assert!(grid.mask_u[c] <= grid.mask_t[c]);
                    prop_assert!(grid.mask_u[c] <= grid.mask_t[s.idx(i + 1, j, k)]);
                    prop_assert!(grid.mask_v[c] <= grid.mask_t[s.idx(i, j + 1, k)]);
                    prop_assert!(grid.mask_w[c] <= grid.mask_t[c]);
                }
            }
        }
    }

    #[test]
    fn depth_matches_bottom_index(kbot in arb_kbot()) {
        let grid = GridBuilder::new(NX, NY, NZ)
            .dzt(vec![40.0, 30.0, 20.0, 10.0])
            .kbot(kbot.clone())
            .build()
            .unwrap();
        let dz = [40.0, 30.0, 20.0, 10.0];
        for (n, &kb) in kbot.iter().enumerate() {
            let c = grid.col(n / NY + HALO, n % NY + HALO);
            let expected: f64 = if kb == 0 { 0.0 } else { dz[kb - 1..].iter().sum() };
            prop_assert!((grid.ht[c] - expected).abs() < 1e-12);
        }
    }
}

#[test]
fn tampered_mask_is_detected() {
    let mut grid = GridBuilder::new(NX, NY, NZ).build().unwrap();
    let c = grid.idx(HALO + 1, HALO + 1, 0);
    grid.mask_u[c] = 0.0;
    let err = grid.check_mask_consistency().unwrap_err();
    assert!(err.to_string().contains("mask_u"));
}
