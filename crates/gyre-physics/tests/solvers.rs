//! Property tests of the two linear solvers every step depends on.

use gyre_physics::elliptic::BarotropicOperator;
use gyre_physics::numerics::tridiag;
use gyre_test_utils::{channel, closed_basin};
use proptest::prelude::*;

fn diagonally_dominant(n: usize) -> impl Strategy<Value = (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>)> {
    (
        prop::collection::vec(-1.0f64..1.0, n),
        prop::collection::vec(-1.0f64..1.0, n),
        prop::collection::vec(0.0f64..1.0, n),
        prop::collection::vec(-10.0f64..10.0, n),
    )
        .prop_map(|(a, c, extra, d)| {
            let b = (0..a.len())
                .map(|k| a[k].abs() + c[k].abs() + 1.0 + extra[k])
                .collect();
            (a, b, c, d)
        })
}

proptest! {
    #[test]
    fn tridiagonal_solution_satisfies_the_system(
        (a, b, c, d) in (1usize..40).prop_flat_map(diagonally_dominant)
    ) {
        let n = d.len();
        let mut x = d.clone();
        prop_assert!(tridiag::solve(&a, &b, &c, &mut x));
        for k in 0..n {
            let mut lhs = b[k] * x[k];
            if k > 0 {
                lhs += a[k] * x[k - 1];
            }
            if k + 1 < n {
                lhs += c[k] * x[k + 1];
            }
            prop_assert!((lhs - d[k]).abs() < 1e-9 * (1.0 + d[k].abs()));
        }
    }

    #[test]
    fn barotropic_solve_converges_for_any_right_hand_side(
        seed in prop::collection::vec(-1.0f64..1.0, 36)
    ) {
        let grid = closed_basin(6, 6, 3);
        let op = BarotropicOperator::new(&grid, false, 600.0);
        let stencil = op.stencil();
        prop_assert_eq!(stencil.len(), 36);
        prop_assert!(stencil.is_singular());

        let guess = vec![0.0; stencil.len()];
        let sol = stencil.solve(&seed, &guess, 1e-12, 1000);
        prop_assert!(sol.converged);

        // Only the mean-free part of the right-hand side is reachable.
        let mut b = seed.clone();
        stencil.basins().remove_mean(&mut b);
        let mut ax = vec![0.0; stencil.len()];
        stencil.apply(&sol.solution, &mut ax);
        let norm = b.iter().map(|v| v * v).sum::<f64>().sqrt();
        for (lhs, rhs) in ax.iter().zip(&b) {
            prop_assert!((lhs - rhs).abs() <= 1e-9 * norm.max(1e-300));
        }
    }
}

#[test]
fn channel_operator_wraps_zonally() {
    let grid = channel(5, 4, 2);
    let op = BarotropicOperator::new(&grid, false, 600.0);
    assert_eq!(op.columns().len(), 20);
    assert_eq!(op.stencil().basins().count(), 1);
}

#[test]
fn iteration_cap_is_reported_not_panicked() {
    let grid = closed_basin(8, 8, 2);
    let op = BarotropicOperator::new(&grid, false, 600.0);
    let n = op.stencil().len();
    let rhs: Vec<f64> = (0..n).map(|r| if r % 3 == 0 { 1.0 } else { -0.5 }).collect();
    let sol = op.stencil().solve(&rhs, &vec![0.0; n], 1e-14, 1);
    assert!(!sol.converged);
    assert_eq!(sol.iterations, 1);
    assert!(sol.residual_norm > 1e-14);
}

#[test]
fn constant_offset_of_the_guess_is_irrelevant() {
    let grid = closed_basin(7, 5, 2);
    let op = BarotropicOperator::new(&grid, false, 600.0);
    let stencil = op.stencil();
    let n = stencil.len();
    let rhs: Vec<f64> = (0..n).map(|r| ((r * 31) % 11) as f64 - 5.0).collect();

    let plain = stencil.solve(&rhs, &vec![0.0; n], 1e-12, 1000);
    let shifted = stencil.solve(&rhs, &vec![3.7; n], 1e-12, 1000);
    assert!(plain.converged && shifted.converged);
    assert!(plain.iterations.abs_diff(shifted.iterations) <= 1);
    for (a, b) in plain.solution.iter().zip(&shifted.solution) {
        assert!((a - b).abs() < 1e-8, "{a} vs {b}");
    }
    let mean = plain.solution.iter().sum::<f64>() / n as f64;
    assert!(mean.abs() < 1e-12);
}
