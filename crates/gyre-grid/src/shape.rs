//! Array shapes and flat indexing.

use std::ops::Range;

/// Number of halo cells on each horizontal side.
pub const HALO: usize = 2;

/// Interior extent of the grid plus indexing helpers.
///
/// Horizontal indices `i`, `j` include the halo: the interior runs over
/// `HALO..HALO + nx` and `HALO..HALO + ny`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Shape {
    /// Interior cells in x.
    pub nx: usize,
    /// Interior cells in y.
    pub ny: usize,
    /// Vertical levels.
    pub nz: usize,
}

impl Shape {
    /// Create a shape.
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    /// Cells in x including the halo.
    pub fn nxt(&self) -> usize {
        self.nx + 2 * HALO
    }

    /// Cells in y including the halo.
    pub fn nyt(&self) -> usize {
        self.ny + 2 * HALO
    }

    /// Number of horizontal columns including the halo.
    pub fn columns(&self) -> usize {
        self.nxt() * self.nyt()
    }

    /// Number of cells of a volume field including the halo.
    pub fn cells(&self) -> usize {
        self.columns() * self.nz
    }

    /// Flat column index.
    #[inline]
    pub fn col(&self, i: usize, j: usize) -> usize {
        i * self.nyt() + j
    }

    /// Flat cell index.
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        self.col(i, j) * self.nz + k
    }

    /// Horizontal position of a flat column index.
    #[inline]
    pub fn ij(&self, col: usize) -> (usize, usize) {
        (col / self.nyt(), col % self.nyt())
    }

    /// Interior range in x.
    pub fn interior_i(&self) -> Range<usize> {
        HALO..HALO + self.nx
    }

    /// Interior range in y.
    pub fn interior_j(&self) -> Range<usize> {
        HALO..HALO + self.ny
    }

    /// Whether a column lies in the interior.
    pub fn is_interior(&self, i: usize, j: usize) -> bool {
        self.interior_i().contains(&i) && self.interior_j().contains(&j)
    }

    /// Whether a column has both neighbours in each direction, i.e. a
    /// one-cell stencil around it stays in bounds.
    pub fn has_neighbours(&self, i: usize, j: usize) -> bool {
        i >= 1 && j >= 1 && i + 1 < self.nxt() && j + 1 < self.nyt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_is_contiguous() {
        let s = Shape::new(3, 4, 5);
        assert_eq!(s.idx(0, 0, 1), 1);
        assert_eq!(s.idx(0, 1, 0), 5);
        assert_eq!(s.idx(1, 0, 0), s.nyt() * 5);
        assert_eq!(s.cells(), 7 * 8 * 5);
    }

    #[test]
    fn ij_inverts_col() {
        let s = Shape::new(6, 3, 2);
        for i in 0..s.nxt() {
            for j in 0..s.nyt() {
                assert_eq!(s.ij(s.col(i, j)), (i, j));
            }
        }
    }

    #[test]
    fn interior_excludes_halo() {
        let s = Shape::new(4, 4, 1);
        assert!(s.is_interior(2, 2));
        assert!(s.is_interior(5, 5));
        assert!(!s.is_interior(1, 3));
        assert!(!s.is_interior(3, 6));
    }
}
