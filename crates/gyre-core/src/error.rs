//! Error types shared across the workspace.
//!
//! Stage failures are fatal for the step that raised them; the engine wraps
//! them with the failing stage's name and a panic snapshot.

use std::error::Error;
use std::fmt;

use crate::field::FieldKey;

/// Errors from a single pipeline stage.
#[derive(Clone, Debug, PartialEq)]
pub enum StageError {
    /// An iterative solver exceeded its iteration cap.
    NotConverged {
        /// Which solve failed (e.g. `"barotropic"`).
        solver: &'static str,
        /// Iterations performed.
        iterations: usize,
        /// Relative residual at the last iteration.
        residual: f64,
    },
    /// The forcing provider could not supply this step's forcing.
    Forcing(ForcingError),
    /// A field written by the stage contains NaN or infinity.
    NonFinite {
        /// The offending field.
        field: FieldKey,
        /// Flat index of the first bad value.
        index: usize,
    },
    /// Any other stage failure.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConverged {
                solver,
                iterations,
                residual,
            } => write!(
                f,
                "{solver} solver did not converge after {iterations} iterations \
                 (relative residual {residual:.3e})"
            ),
            Self::Forcing(e) => write!(f, "forcing: {e}"),
            Self::NonFinite { field, index } => {
                write!(f, "non-finite value in field '{field}' at index {index}")
            }
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
        }
    }
}

impl Error for StageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Forcing(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ForcingError> for StageError {
    fn from(e: ForcingError) -> Self {
        Self::Forcing(e)
    }
}

/// Errors from a [`ForcingProvider`](crate::ForcingProvider).
#[derive(Clone, Debug, PartialEq)]
pub enum ForcingError {
    /// No forcing is defined for the requested model time.
    Unavailable {
        /// Model time in seconds.
        time: f64,
    },
    /// A forcing array has the wrong number of columns.
    InvalidShape {
        /// Name of the forcing array.
        field: &'static str,
        /// Expected length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },
    /// A forcing array contains NaN or infinity.
    NonFinite {
        /// Name of the forcing array.
        field: &'static str,
        /// Flat column index of the first bad value.
        index: usize,
    },
}

impl fmt::Display for ForcingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { time } => write!(f, "no forcing defined at t = {time} s"),
            Self::InvalidShape {
                field,
                expected,
                actual,
            } => write!(f, "forcing '{field}' has {actual} columns, expected {expected}"),
            Self::NonFinite { field, index } => {
                write!(f, "forcing '{field}' is non-finite at column {index}")
            }
        }
    }
}

impl Error for ForcingError {}
