use crate::{mesh::Slot, Dim};

use itertools::Itertools;

/// A quadrature rule defined on the reference box $[0,1]^d$,
/// or on one of its facets.
#[derive(Debug, Clone)]
pub struct QuadRule {
  /// Quadrature points in the columns, given in cell reference coordinates.
  nodes: na::DMatrix<f64>,
  weights: na::DVector<f64>,
}
impl QuadRule {
  pub fn new(nodes: na::DMatrix<f64>, weights: na::DVector<f64>) -> Self {
    assert_eq!(nodes.ncols(), weights.len());
    Self { nodes, weights }
  }

  /// Gauss-Legendre rule with `npoints` points on $[0,1]$.
  /// Exact for polynomials up to degree `2 npoints - 1`.
  pub fn gauss_segment(npoints: usize) -> Self {
    let (nodes, weights) = gauss_legendre(npoints);
    Self::new(na::DMatrix::from_row_slice(1, npoints, &nodes), weights.into())
  }

  /// Tensor product Gauss-Legendre rule on $[0,1]^d$.
  pub fn gauss_box(dim: Dim, npoints_axis: usize) -> Self {
    let (nodes_1d, weights_1d) = gauss_legendre(npoints_axis);
    let npoints = npoints_axis.pow(dim as u32);

    let mut nodes = na::DMatrix::zeros(dim, npoints);
    let mut weights = na::DVector::zeros(npoints);
    for ipoint in 0..npoints {
      let mut rem = ipoint;
      let mut weight = 1.0;
      for axis in 0..dim {
        let i = rem % npoints_axis;
        rem /= npoints_axis;
        nodes[(axis, ipoint)] = nodes_1d[i];
        weight *= weights_1d[i];
      }
      weights[ipoint] = weight;
    }
    Self::new(nodes, weights)
  }

  /// Tensor product Gauss-Legendre rule on the facet `slot` of $[0,1]^d$,
  /// with the points embedded into the cell reference coordinates.
  ///
  /// The weights integrate over the reference facet, which has unit measure.
  pub fn gauss_facet(dim: Dim, npoints_axis: usize, slot: Slot) -> Self {
    let facet = Self::gauss_box(dim - 1, npoints_axis);
    let fixed = match slot.side {
      crate::mesh::Side::Lower => 0.0,
      crate::mesh::Side::Upper => 1.0,
    };
    let tangential = (0..dim).filter(|&a| a != slot.axis).collect_vec();

    let mut nodes = na::DMatrix::zeros(dim, facet.npoints());
    for (ipoint, facet_node) in facet.nodes.column_iter().enumerate() {
      nodes[(slot.axis, ipoint)] = fixed;
      for (k, &axis) in tangential.iter().enumerate() {
        nodes[(axis, ipoint)] = facet_node[k];
      }
    }
    Self::new(nodes, facet.weights)
  }

  pub fn dim(&self) -> Dim {
    self.nodes.nrows()
  }
  pub fn npoints(&self) -> usize {
    self.weights.len()
  }
  pub fn nodes(&self) -> &na::DMatrix<f64> {
    &self.nodes
  }
  pub fn weights(&self) -> &na::DVector<f64> {
    &self.weights
  }

  pub fn iter(&self) -> impl Iterator<Item = (na::DVectorView<f64>, f64)> {
    self.nodes.column_iter().zip(self.weights.iter().copied())
  }

  pub fn apply_ref<F>(&self, f: F) -> f64
  where
    F: Fn(na::DVectorView<f64>) -> f64,
  {
    self.iter().map(|(n, w)| w * f(n)).sum()
  }
}

/// Gauss-Legendre nodes and weights on $[0,1]$, computed by Newton iteration
/// on the Legendre polynomial $P_n$.
pub fn gauss_legendre(npoints: usize) -> (Vec<f64>, Vec<f64>) {
  assert!(npoints > 0);
  let n = npoints;
  let mut nodes = vec![0.0; n];
  let mut weights = vec![0.0; n];

  for i in 0..n {
    let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
    let mut dp = 1.0;
    for _ in 0..100 {
      let (p, dpx) = legendre_with_derivative(n, x);
      dp = dpx;
      let dx = p / dp;
      x -= dx;
      if dx.abs() < 1e-15 {
        break;
      }
    }
    let (_, dpx) = legendre_with_derivative(n, x);
    if dpx != 0.0 {
      dp = dpx;
    }
    // map from [-1,1] to [0,1], nodes in increasing order
    nodes[n - 1 - i] = 0.5 * (x + 1.0);
    weights[n - 1 - i] = 1.0 / ((1.0 - x * x) * dp * dp);
  }
  (nodes, weights)
}

fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
  let mut p0 = 1.0;
  let mut p1 = x;
  if n == 0 {
    return (1.0, 0.0);
  }
  for k in 2..=n {
    let k = k as f64;
    let p2 = ((2.0 * k - 1.0) * x * p1 - (k - 1.0) * p0) / k;
    p0 = p1;
    p1 = p2;
  }
  let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
  (p1, dp)
}

#[cfg(test)]
mod test {
  use super::{gauss_legendre, QuadRule};
  use crate::mesh::{Side, Slot};

  use approx::assert_relative_eq;

  #[test]
  fn gauss_legendre_exactness() {
    for n in 1..=8 {
      let (nodes, weights) = gauss_legendre(n);
      assert_relative_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-13);
      for deg in 0..2 * n {
        let integral: f64 = nodes
          .iter()
          .zip(&weights)
          .map(|(x, w)| w * x.powi(deg as i32))
          .sum();
        assert_relative_eq!(integral, 1.0 / (deg + 1) as f64, epsilon = 1e-13);
      }
      assert!(nodes.windows(2).all(|w| w[0] < w[1]));
    }
  }

  #[test]
  fn box_rule_integrates_monomials() {
    let qr = QuadRule::gauss_box(3, 3);
    assert_eq!(qr.npoints(), 27);
    let integral = qr.apply_ref(|x| x[0].powi(2) * x[1] * x[2].powi(5));
    assert_relative_eq!(integral, 1.0 / 3.0 * 0.5 / 6.0, epsilon = 1e-14);
  }

  #[test]
  fn facet_rule_lies_on_facet() {
    let slot = Slot::new(1, Side::Upper);
    let qr = QuadRule::gauss_facet(3, 2, slot);
    assert_eq!(qr.npoints(), 4);
    assert!(qr.nodes().row(1).iter().all(|&y| y == 1.0));
    assert_relative_eq!(qr.apply_ref(|x| x[0] * x[2]), 0.25, epsilon = 1e-14);

    let point = QuadRule::gauss_facet(1, 3, Slot::new(0, Side::Lower));
    assert_eq!(point.npoints(), 1);
    assert_eq!(point.nodes()[(0, 0)], 0.0);
    assert_eq!(point.weights()[0], 1.0);
  }
}
