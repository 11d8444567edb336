//! Sparse matrix assembly and the algebraic operations the limiters need.

use crate::error::SparsityError;

/// Triplet matrix used during assembly.
#[derive(Debug, Default, Clone)]
pub struct SparseMatrix {
  nrows: usize,
  ncols: usize,
  triplets: Vec<(usize, usize, f64)>,
}

impl SparseMatrix {
  pub fn zeros(nrows: usize, ncols: usize) -> Self {
    Self::new(nrows, ncols, Vec::new())
  }
  pub fn new(nrows: usize, ncols: usize, triplets: Vec<(usize, usize, f64)>) -> Self {
    Self {
      nrows,
      ncols,
      triplets,
    }
  }

  pub fn nrows(&self) -> usize {
    self.nrows
  }
  pub fn ncols(&self) -> usize {
    self.ncols
  }
  pub fn triplets(&self) -> &[(usize, usize, f64)] {
    &self.triplets
  }

  pub fn push(&mut self, r: usize, c: usize, v: f64) {
    if v != 0.0 {
      self.triplets.push((r, c, v));
    }
  }

  /// Pushes an entry even if it is zero, making it part of the sparsity
  /// pattern.
  pub fn push_structural(&mut self, r: usize, c: usize, v: f64) {
    self.triplets.push((r, c, v));
  }

  pub fn to_nalgebra_coo(&self) -> nas::CooMatrix<f64> {
    let mut coo = nas::CooMatrix::new(self.nrows, self.ncols);
    for &(r, c, v) in &self.triplets {
      coo.push(r, c, v);
    }
    coo
  }

  /// Compressed row matrix with duplicates summed.
  /// Explicit zeros are kept in the pattern.
  pub fn to_nalgebra_csr(&self) -> nas::CsrMatrix<f64> {
    let mut sorted = self.triplets.clone();
    sorted.sort_by_key(|&(r, c, _)| (r, c));

    let mut row_offsets = vec![0; self.nrows + 1];
    let mut col_indices = Vec::with_capacity(sorted.len());
    let mut values: Vec<f64> = Vec::with_capacity(sorted.len());
    let mut last = None;
    for (r, c, v) in sorted {
      if last == Some((r, c)) {
        if let Some(value) = values.last_mut() {
          *value += v;
        }
      } else {
        row_offsets[r + 1] += 1;
        col_indices.push(c);
        values.push(v);
        last = Some((r, c));
      }
    }
    for r in 0..self.nrows {
      row_offsets[r + 1] += row_offsets[r];
    }

    nas::CsrMatrix::try_from_csr_data(self.nrows, self.ncols, row_offsets, col_indices, values)
      .expect("sorted and deduplicated triplets form valid csr data")
  }

  pub fn to_nalgebra_dense(&self) -> na::DMatrix<f64> {
    (&self.to_nalgebra_coo()).into()
  }
}

/// $y = A x$
pub fn csr_mul(a: &nas::CsrMatrix<f64>, x: &na::DVector<f64>) -> na::DVector<f64> {
  assert_eq!(a.ncols(), x.len());
  na::DVector::from_iterator(
    a.nrows(),
    a.row_iter().map(|row| {
      row
        .col_indices()
        .iter()
        .zip(row.values())
        .map(|(&c, &v)| v * x[c])
        .sum::<f64>()
    }),
  )
}

/// Row sums, the lumped version of a matrix.
pub fn row_sums(a: &nas::CsrMatrix<f64>) -> na::DVector<f64> {
  na::DVector::from_iterator(a.nrows(), a.row_iter().map(|row| row.values().iter().sum()))
}

/// For every stored entry `(i,j)` the offset of the entry `(j,i)`, together
/// with the offset of every diagonal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetricOffsets {
  smap: Vec<usize>,
  diagonal: Vec<usize>,
}
impl SymmetricOffsets {
  pub fn new(a: &nas::CsrMatrix<f64>) -> Result<Self, SparsityError> {
    let offsets = a.row_offsets();
    let cols = a.col_indices();

    let find = |row: usize, col: usize| {
      cols[offsets[row]..offsets[row + 1]]
        .binary_search(&col)
        .ok()
        .map(|i| offsets[row] + i)
    };

    let mut smap = vec![0; cols.len()];
    let mut diagonal = vec![0; a.nrows()];
    for row in 0..a.nrows() {
      for k in offsets[row]..offsets[row + 1] {
        let col = cols[k];
        smap[k] = find(col, row).ok_or(SparsityError::MissingSymmetricEntry { row, col })?;
      }
      diagonal[row] = find(row, row).ok_or(SparsityError::MissingDiagonal(row))?;
    }
    Ok(Self { smap, diagonal })
  }

  pub fn smap(&self) -> &[usize] {
    &self.smap
  }
  pub fn diagonal(&self) -> &[usize] {
    &self.diagonal
  }
  pub fn nnz(&self) -> usize {
    self.smap.len()
  }
}

/// Discrete upwinding of `k` into `d`, which must share the sparsity pattern
/// of `k`.
///
/// With $d_(i j) = max(0, -k_(i j), -k_(j i))$ the off-diagonal entries become
/// $k_(i j) + d_(i j) >= 0$ and the diagonal $k_(i i) - sum_(j != i) d_(i j)$,
/// so that the row sums of `d` equal those of `k`.
pub fn compute_discrete_upwinding(
  k: &nas::CsrMatrix<f64>,
  offsets: &SymmetricOffsets,
  d: &mut nas::CsrMatrix<f64>,
) {
  assert_eq!(k.nnz(), offsets.nnz());
  assert_eq!(k.row_offsets(), d.row_offsets());

  let row_offsets = k.row_offsets().to_vec();
  let cols = k.col_indices();
  let kvals = k.values();
  let smap = offsets.smap();
  let dvals = d.values_mut();

  for i in 0..k.nrows() {
    let mut rowsum = 0.0;
    for e in row_offsets[i]..row_offsets[i + 1] {
      let j = cols[e];
      let kij = kvals[e];
      let kji = kvals[smap[e]];
      let dij = 0f64.max(-kij).max(-kji);
      dvals[e] = kij + dij;
      dvals[smap[e]] = kji + dij;
      if i != j {
        rowsum += dij;
      }
    }
    let diag = offsets.diagonal()[i];
    dvals[diag] = kvals[diag] - rowsum;
  }
}

#[cfg(test)]
mod test {
  use super::{compute_discrete_upwinding, csr_mul, row_sums, SparseMatrix, SymmetricOffsets};
  use crate::error::SparsityError;

  use approx::assert_relative_eq;

  fn convection_like() -> SparseMatrix {
    // skew part plus zero row sums, as from a convection operator
    #[rustfmt::skip]
    let triplets = vec![
      (0, 0, -1.0), (0, 1, 1.0), (0, 2, 0.0),
      (1, 0, -2.0), (1, 1, 0.5), (1, 2, 1.5),
      (2, 0, 0.0), (2, 1, -0.5), (2, 2, 0.5),
    ];
    SparseMatrix::new(3, 3, triplets)
  }

  #[test]
  fn csr_keeps_explicit_zeros_and_sums_duplicates() {
    let mut mat = SparseMatrix::zeros(2, 2);
    mat.push_structural(1, 0, 0.0);
    mat.push(0, 0, 1.0);
    mat.push(0, 0, 2.0);
    mat.push(0, 1, 0.0);
    let csr = mat.to_nalgebra_csr();
    assert_eq!(csr.nnz(), 2);
    assert_eq!(csr.row_offsets(), &[0, 1, 2]);
    assert_eq!(csr.values(), &[3.0, 0.0]);
  }

  #[test]
  fn symmetric_offsets_of_pattern() {
    let csr = convection_like().to_nalgebra_csr();
    let offsets = SymmetricOffsets::new(&csr).unwrap();
    assert_eq!(offsets.smap(), &[0, 3, 6, 1, 4, 7, 2, 5, 8]);
    assert_eq!(offsets.diagonal(), &[0, 4, 8]);

    let mut mat = SparseMatrix::zeros(2, 2);
    mat.push(0, 0, 1.0);
    mat.push(0, 1, 1.0);
    mat.push(1, 1, 1.0);
    let err = SymmetricOffsets::new(&mat.to_nalgebra_csr()).unwrap_err();
    assert_eq!(err, SparsityError::MissingSymmetricEntry { row: 0, col: 1 });
  }

  #[test]
  fn upwinding_is_monotone_and_consistent() {
    let k = convection_like().to_nalgebra_csr();
    let offsets = SymmetricOffsets::new(&k).unwrap();
    let mut d = k.clone();
    compute_discrete_upwinding(&k, &offsets, &mut d);

    let dense: na::DMatrix<f64> = (&d).into();
    for i in 0..3 {
      for j in 0..3 {
        if i != j {
          assert!(dense[(i, j)] >= 0.0);
        }
      }
    }
    assert_relative_eq!(row_sums(&d), row_sums(&k), epsilon = 1e-14);
    let ones = na::DVector::from_element(3, 1.0);
    assert_relative_eq!(csr_mul(&d, &ones), na::DVector::zeros(3), epsilon = 1e-14);
    // d_01 = max(0, -1, 2) = 2
    assert_relative_eq!(dense[(0, 1)], 3.0);
    assert_relative_eq!(dense[(1, 0)], 0.0);
  }
}
