//! Jacobi-preconditioned conjugate gradient.

use log::trace;

use super::stencil::Stencil;

/// Result of one elliptic solve.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    /// Solution vector, one value per unknown.
    pub solution: Vec<f64>,
    /// Whether the relative residual fell below the tolerance.
    pub converged: bool,
    /// Iterations performed.
    pub iterations: usize,
    /// Final residual norm relative to the right-hand side norm.
    pub residual_norm: f64,
}

/// Sequential dot product; the summation order is fixed so repeated
/// solves are bit-reproducible.
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).fold(0.0, |acc, (x, y)| acc + x * y)
}

impl Stencil {
    /// Solve `A x = rhs` starting from `initial_guess`.
    ///
    /// For singular operators the right-hand side is first projected onto
    /// the range of `A` by removing its mean in every basin, and iterates
    /// are kept mean-free, so any constant offset of the initial guess is
    /// irrelevant. Non-convergence is reported through
    /// [`Solution::converged`], never by panicking.
    pub fn solve(
        &self,
        rhs: &[f64],
        initial_guess: &[f64],
        tolerance: f64,
        max_iterations: usize,
    ) -> Solution {
        let n = self.len();
        debug_assert_eq!(rhs.len(), n);
        debug_assert_eq!(initial_guess.len(), n);

        let mut b = rhs.to_vec();
        let mut x = initial_guess.to_vec();
        if self.is_singular() {
            self.basins().remove_mean(&mut b);
            self.basins().remove_mean(&mut x);
        }
        let b_norm = dot(&b, &b).sqrt();
        if b_norm == 0.0 {
            return Solution {
                solution: vec![0.0; n],
                converged: true,
                iterations: 0,
                residual_norm: 0.0,
            };
        }

        let mut r = vec![0.0; n];
        let mut z = vec![0.0; n];
        let mut ap = vec![0.0; n];
        self.apply(&x, &mut ap);
        for i in 0..n {
            r[i] = b[i] - ap[i];
        }
        let mut rel = dot(&r, &r).sqrt() / b_norm;
        if rel <= tolerance {
            return Solution {
                solution: x,
                converged: true,
                iterations: 0,
                residual_norm: rel,
            };
        }
        self.precondition(&r, &mut z);
        let mut p = z.clone();
        let mut rz = dot(&r, &z);

        for iteration in 1..=max_iterations {
            self.apply(&p, &mut ap);
            let pap = dot(&p, &ap);
            if pap <= 0.0 || !pap.is_finite() {
                trace!("CG breakdown at iteration {iteration}: p.Ap = {pap:.6e}");
                if self.is_singular() {
                    self.basins().remove_mean(&mut x);
                }
                return Solution {
                    solution: x,
                    converged: false,
                    iterations: iteration,
                    residual_norm: rel,
                };
            }
            let alpha = rz / pap;
            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }
            rel = dot(&r, &r).sqrt() / b_norm;
            trace!("CG iter {iteration}: residual = {rel:.6e}");
            if rel <= tolerance {
                if self.is_singular() {
                    self.basins().remove_mean(&mut x);
                }
                return Solution {
                    solution: x,
                    converged: true,
                    iterations: iteration,
                    residual_norm: rel,
                };
            }
            self.precondition(&r, &mut z);
            let rz_new = dot(&r, &z);
            let beta = rz_new / rz;
            rz = rz_new;
            for i in 0..n {
                p[i] = z[i] + beta * p[i];
            }
        }
        if self.is_singular() {
            self.basins().remove_mean(&mut x);
        }
        Solution {
            solution: x,
            converged: false,
            iterations: max_iterations,
            residual_norm: rel,
        }
    }

    /// `z = D⁻¹ r`, projected onto mean-free vectors for singular operators.
    fn precondition(&self, r: &[f64], z: &mut [f64]) {
        for ((zi, ri), d) in z.iter_mut().zip(r).zip(self.diagonal()) {
            *zi = if *d > 0.0 { ri / d } else { 0.0 };
        }
        if self.is_singular() {
            self.basins().remove_mean(z);
        }
    }
}
