//! Error types for grid construction.

use std::fmt;

/// Errors raised while building or validating a [`Grid`](crate::Grid).
#[derive(Clone, Debug, PartialEq)]
pub enum GridError {
    /// One of `nx`, `ny`, `nz` is zero.
    EmptyGrid,
    /// An input array has the wrong length.
    LengthMismatch {
        /// Name of the input.
        name: &'static str,
        /// Expected length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },
    /// A spacing is zero, negative or non-finite.
    NonPositiveSpacing {
        /// Name of the spacing array.
        name: &'static str,
        /// Index of the bad entry.
        index: usize,
    },
    /// A bottom index exceeds the number of levels.
    BottomIndexOutOfRange {
        /// Interior column `(i, j)` without halo offset.
        column: (usize, usize),
        /// The offending bottom index.
        kbot: usize,
        /// Number of levels.
        nz: usize,
    },
    /// A mask disagrees with the masks derived from the bottom-index map.
    MaskInconsistent {
        /// Which mask.
        mask: &'static str,
        /// Flat index of the first mismatch.
        index: usize,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyGrid => write!(f, "grid must have at least one cell in each direction"),
            Self::LengthMismatch {
                name,
                expected,
                actual,
            } => write!(f, "'{name}' has length {actual}, expected {expected}"),
            Self::NonPositiveSpacing { name, index } => {
                write!(f, "'{name}' must be finite and positive (entry {index})")
            }
            Self::BottomIndexOutOfRange { column, kbot, nz } => write!(
                f,
                "bottom index {kbot} at column {column:?} exceeds {nz} levels"
            ),
            Self::MaskInconsistent { mask, index } => write!(
                f,
                "{mask} disagrees with the bottom-index map at index {index}"
            ),
        }
    }
}

impl std::error::Error for GridError {}
