use crate::sparse::csr_mul;

/// Stopping rule of the mass matrix solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeumannParams {
  pub max_iter: usize,
  /// Absolute tolerance on the euclidean norm of the residual.
  pub abs_tol: f64,
}
impl Default for NeumannParams {
  fn default() -> Self {
    Self {
      max_iter: 20,
      abs_tol: 1e-4,
    }
  }
}

/// Approximately solves $M x = f$ by a Richardson iteration preconditioned
/// with the lumped mass, starting from $x = 0$.
///
/// This avoids inverting the ill-conditioned consistent mass matrix of the
/// Bernstein basis. Hitting the iteration cap is not an error, the last
/// iterate is returned.
pub fn neumann_solve(
  mass: &nas::CsrMatrix<f64>,
  lumped_mass: &na::DVector<f64>,
  f: &na::DVector<f64>,
  params: NeumannParams,
) -> na::DVector<f64> {
  let mut x = na::DVector::zeros(f.len());
  for iter in 1..=params.max_iter {
    let residual = csr_mul(mass, &x) - f;
    let norm = residual.norm();
    if norm <= params.abs_tol {
      tracing::trace!("mass solve converged after {iter} iteration(s), residual {norm:.3e}");
      return x;
    }
    x -= residual.component_div(lumped_mass);
  }
  tracing::warn!(
    "mass solve stopped at the iteration cap {} without reaching tolerance {:.1e}",
    params.max_iter,
    params.abs_tol
  );
  x
}

#[cfg(test)]
mod test {
  use super::{neumann_solve, NeumannParams};
  use crate::sparse::{csr_mul, row_sums, SparseMatrix};

  /// Mass matrix of a linear Bernstein segment of length `h`.
  fn segment_mass(nelems: usize, h: f64) -> nas::CsrMatrix<f64> {
    let mut mat = SparseMatrix::zeros(2 * nelems, 2 * nelems);
    for e in 0..nelems {
      let (i, j) = (2 * e, 2 * e + 1);
      mat.push(i, i, h / 3.0);
      mat.push(j, j, h / 3.0);
      mat.push(i, j, h / 6.0);
      mat.push(j, i, h / 6.0);
    }
    mat.to_nalgebra_csr()
  }

  #[test]
  fn recovers_known_solution() {
    let mass = segment_mass(4, 0.25);
    let lumped = row_sums(&mass);
    let known = na::DVector::from_iterator(8, (0..8).map(|i| (i as f64 * 0.7).sin()));
    let f = csr_mul(&mass, &known);
    let params = NeumannParams::default();
    let x = neumann_solve(&mass, &lumped, &f, params);
    assert!((&csr_mul(&mass, &x) - &f).norm() <= params.abs_tol);
    assert!((x - known).norm() < 1e-2);
  }

  #[test]
  fn zero_rhs_returns_zero() {
    let mass = segment_mass(2, 1.0);
    let lumped = row_sums(&mass);
    let x = neumann_solve(&mass, &lumped, &na::DVector::zeros(4), NeumannParams::default());
    assert_eq!(x, na::DVector::zeros(4));
  }

  #[test]
  fn cap_returns_last_iterate() {
    let mass = segment_mass(1, 1.0);
    let lumped = row_sums(&mass);
    let f = na::DVector::from_column_slice(&[1.0, -1.0]);
    let params = NeumannParams {
      max_iter: 1,
      abs_tol: 0.0,
    };
    // the single update is f / lumped
    let x = neumann_solve(&mass, &lumped, &f, params);
    assert_eq!(x, na::DVector::from_column_slice(&[2.0, -2.0]));
  }
}
