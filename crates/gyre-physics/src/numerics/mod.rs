//! Discrete operators shared by the stages.

pub mod advection;
pub mod lateral;
pub mod remap;
pub mod tridiag;

/// Adams-Bashforth weights `(current, past)` for off-centring `eps`.
///
/// The first step of a run has no past tendency and falls back to forward
/// Euler.
pub fn ab_weights(eps: f64, first_step: bool) -> (f64, f64) {
    if first_step {
        (1.0, 0.0)
    } else {
        (1.5 + eps, -(0.5 + eps))
    }
}

/// Apply `next = current + dt * (wc * tend_current + wp * tend_past)`
/// scaled by `mask`.
pub fn ab_step(
    next: &mut [f64],
    current: &[f64],
    tend_current: &[f64],
    tend_past: &[f64],
    mask: &[f64],
    dt: f64,
    (wc, wp): (f64, f64),
) {
    for (c, n) in next.iter_mut().enumerate() {
        *n = (current[c] + dt * (wc * tend_current[c] + wp * tend_past[c])) * mask[c];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let (a, b) = ab_weights(0.1, false);
        assert!((a + b - 1.0).abs() < 1e-15);
        assert_eq!(a, 1.6);
        assert_eq!(ab_weights(0.1, true), (1.0, 0.0));
    }

    #[test]
    fn constant_tendency_is_integrated_exactly() {
        let mut next = [0.0; 3];
        ab_step(
            &mut next,
            &[1.0, 1.0, 1.0],
            &[2.0; 3],
            &[2.0; 3],
            &[1.0, 0.0, 1.0],
            0.5,
            ab_weights(0.1, false),
        );
        assert!((next[0] - 2.0).abs() < 1e-15);
        assert_eq!(next[1], 0.0);
    }
}
