//! Sparse symmetric operators over a compact list of ocean unknowns.

use rayon::prelude::*;
use smallvec::SmallVec;

/// Connected components of the stencil graph.
///
/// A basin without any diagonal term carries its own constant null
/// vector, so means are removed basin by basin and only where the
/// operator is singular.
#[derive(Clone, Debug, PartialEq)]
pub struct Basins {
    label: Vec<usize>,
    sizes: Vec<usize>,
    singular: Vec<bool>,
}

impl Basins {
    /// Number of basins.
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    /// Basin label of each unknown.
    pub fn labels(&self) -> &[usize] {
        &self.label
    }

    /// Whether basin `b` annihilates constants.
    pub fn is_singular(&self, b: usize) -> bool {
        self.singular[b]
    }

    /// Subtract the mean of every singular basin from `v`; entries of
    /// other basins are left alone.
    ///
    /// Sums are accumulated sequentially in row order so the result is
    /// reproducible bit for bit.
    pub fn remove_mean(&self, v: &mut [f64]) {
        let mut sums = vec![0.0f64; self.sizes.len()];
        for (x, &b) in v.iter().zip(&self.label) {
            sums[b] += x;
        }
        for ((s, &n), &singular) in sums.iter_mut().zip(&self.sizes).zip(&self.singular) {
            *s = if singular { *s / n as f64 } else { 0.0 };
        }
        for (x, &b) in v.iter_mut().zip(&self.label) {
            *x -= sums[b];
        }
    }
}

/// Symmetric operator `(A p)_r = diag_r p_r - Σ_n w_rn p_n` in compressed
/// sparse row form.
///
/// Built once at setup and shared read-only by every solve.
#[derive(Clone, Debug)]
pub struct Stencil {
    diag: Vec<f64>,
    row_ptr: Vec<usize>,
    cols: Vec<usize>,
    coefs: Vec<f64>,
    basins: Basins,
    singular: bool,
}

impl Stencil {
    /// Number of unknowns.
    pub fn len(&self) -> usize {
        self.diag.len()
    }

    /// Whether the operator has no unknowns.
    pub fn is_empty(&self) -> bool {
        self.diag.is_empty()
    }

    /// Diagonal entries.
    pub fn diagonal(&self) -> &[f64] {
        &self.diag
    }

    /// Connected components.
    pub fn basins(&self) -> &Basins {
        &self.basins
    }

    /// Whether any basin annihilates constants.
    pub fn is_singular(&self) -> bool {
        self.singular
    }

    /// `out = A p`, data-parallel over rows.
    pub fn apply(&self, p: &[f64], out: &mut [f64]) {
        out.par_iter_mut().enumerate().for_each(|(r, o)| {
            let mut acc = self.diag[r] * p[r];
            for n in self.row_ptr[r]..self.row_ptr[r + 1] {
                acc -= self.coefs[n] * p[self.cols[n]];
            }
            *o = acc;
        });
    }
}

/// Assembles a [`Stencil`] from face couplings.
#[derive(Clone, Debug)]
pub struct StencilBuilder {
    rows: Vec<SmallVec<[(usize, f64); 6]>>,
    diag: Vec<f64>,
    pinned: Vec<bool>,
}

impl StencilBuilder {
    /// Start an operator over `n` unknowns with no couplings.
    pub fn new(n: usize) -> Self {
        Self {
            rows: vec![SmallVec::new(); n],
            diag: vec![0.0; n],
            pinned: vec![false; n],
        }
    }

    /// Couple unknowns `a` and `b` through a face of conductance `coef`.
    ///
    /// Zero couplings and self-couplings are ignored; repeated faces (e.g.
    /// both zonal neighbours wrapping onto the same unknown) accumulate.
    pub fn add_face(&mut self, a: usize, b: usize, coef: f64) {
        if coef == 0.0 || a == b {
            return;
        }
        self.diag[a] += coef;
        self.diag[b] += coef;
        Self::push(&mut self.rows[a], b, coef);
        Self::push(&mut self.rows[b], a, coef);
    }

    /// Add a positive diagonal term, removing the null space of the basin
    /// that contains `r`.
    pub fn add_diagonal(&mut self, r: usize, value: f64) {
        if value > 0.0 {
            self.diag[r] += value;
            self.pinned[r] = true;
        }
    }

    fn push(row: &mut SmallVec<[(usize, f64); 6]>, col: usize, coef: f64) {
        match row.iter_mut().find(|(c, _)| *c == col) {
            Some(entry) => entry.1 += coef,
            None => row.push((col, coef)),
        }
    }

    /// Freeze into CSR form and label the basins.
    pub fn build(self) -> Stencil {
        let n = self.rows.len();
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut cols = Vec::new();
        let mut coefs = Vec::new();
        row_ptr.push(0);
        for row in &self.rows {
            let mut sorted = row.clone();
            sorted.sort_by_key(|(c, _)| *c);
            for (c, w) in sorted {
                cols.push(c);
                coefs.push(w);
            }
            row_ptr.push(cols.len());
        }
        let basins = label_basins(n, &row_ptr, &cols, &self.pinned);
        let singular = basins.singular.iter().any(|&s| s);
        Stencil {
            diag: self.diag,
            row_ptr,
            cols,
            coefs,
            basins,
            singular,
        }
    }
}

fn label_basins(n: usize, row_ptr: &[usize], cols: &[usize], pinned: &[bool]) -> Basins {
    const UNSET: usize = usize::MAX;
    let mut label = vec![UNSET; n];
    let mut sizes = Vec::new();
    let mut stack = Vec::new();
    for seed in 0..n {
        if label[seed] != UNSET {
            continue;
        }
        let id = sizes.len();
        let mut size = 0;
        label[seed] = id;
        stack.push(seed);
        while let Some(r) = stack.pop() {
            size += 1;
            for &c in &cols[row_ptr[r]..row_ptr[r + 1]] {
                if label[c] == UNSET {
                    label[c] = id;
                    stack.push(c);
                }
            }
        }
        sizes.push(size);
    }
    let mut singular = vec![true; sizes.len()];
    for (&b, &p) in label.iter().zip(pinned) {
        if p {
            singular[b] = false;
        }
    }
    Basins {
        label,
        sizes,
        singular,
    }
}
