//! Element geometry given by the multilinear map of the element corners.
//!
//! Every element is the image of the reference box `[0,1]^d` under
//! $x(xi) = sum_v N_v (xi) X_v$, where the $N_v$ are the tensor-product linear
//! shape functions of the `2^d` lexicographically ordered corners $X_v$.

use crate::{mesh::Slot, Dim, ElemIdx};

/// Corner positions of every element, stored per element.
///
/// Storing corners per element (instead of per mesh vertex) makes periodic
/// identification and mesh motion purely local.
#[derive(Debug, Clone, PartialEq)]
pub struct CornerCoords {
  dim: Dim,
  /// The corner coordinates in the columns of a matrix,
  /// element after element.
  matrix: na::DMatrix<f64>,
}
impl CornerCoords {
  pub fn new(dim: Dim, matrix: na::DMatrix<f64>) -> Self {
    assert_eq!(matrix.nrows(), dim);
    assert_eq!(matrix.ncols() % (1 << dim), 0);
    Self { dim, matrix }
  }

  pub fn dim(&self) -> Dim {
    self.dim
  }
  pub fn ncorners(&self) -> usize {
    1 << self.dim
  }
  pub fn nelems(&self) -> usize {
    self.matrix.ncols() / self.ncorners()
  }
  pub fn matrix(&self) -> &na::DMatrix<f64> {
    &self.matrix
  }
  pub fn matrix_mut(&mut self) -> &mut na::DMatrix<f64> {
    &mut self.matrix
  }

  pub fn element(&self, ielem: ElemIdx) -> na::DMatrix<f64> {
    let n = self.ncorners();
    self.matrix.columns(ielem * n, n).into_owned()
  }

  pub fn element_geometry(&self, ielem: ElemIdx) -> ElementGeometry {
    ElementGeometry::new(self.element(ielem))
  }

  /// Evaluates a vector valued function at every corner.
  pub fn eval_coord_fn<F>(&self, f: F) -> na::DMatrix<f64>
  where
    F: Fn(na::DVectorView<f64>) -> na::DVector<f64>,
  {
    let mut values = na::DMatrix::zeros(self.dim, self.matrix.ncols());
    for (icol, coord) in self.matrix.column_iter().enumerate() {
      values.set_column(icol, &f(coord));
    }
    values
  }

  /// Sets the corners to $X_0 + t V$.
  pub fn set_displaced(&mut self, start: &CornerCoords, t: f64, velocity: &na::DMatrix<f64>) {
    self.matrix = &start.matrix + t * velocity;
  }
}

/// Tensor-product linear shape functions of the `2^d` box corners.
pub fn corner_shapes(xi: na::DVectorView<f64>) -> na::DVector<f64> {
  let dim = xi.len();
  na::DVector::from_iterator(
    1 << dim,
    (0..1 << dim).map(|icorner| {
      (0..dim)
        .map(|axis| {
          if (icorner >> axis) & 1 == 1 {
            xi[axis]
          } else {
            1.0 - xi[axis]
          }
        })
        .product::<f64>()
    }),
  )
}

/// Reference gradients of the corner shape functions, one column per corner.
pub fn corner_shape_grads(xi: na::DVectorView<f64>) -> na::DMatrix<f64> {
  let dim = xi.len();
  let mut grads = na::DMatrix::zeros(dim, 1 << dim);
  for icorner in 0..1 << dim {
    for dir in 0..dim {
      grads[(dir, icorner)] = (0..dim)
        .map(|axis| {
          let upper = (icorner >> axis) & 1 == 1;
          match (axis == dir, upper) {
            (true, true) => 1.0,
            (true, false) => -1.0,
            (false, true) => xi[axis],
            (false, false) => 1.0 - xi[axis],
          }
        })
        .product::<f64>();
    }
  }
  grads
}

/// Cofactor matrix $"cof"(J) = det(J) J^(-T)$, well defined for singular $J$.
pub fn cofactor(jacobian: &na::DMatrix<f64>) -> na::DMatrix<f64> {
  match jacobian.nrows() {
    1 => na::DMatrix::from_element(1, 1, 1.0),
    2 => {
      let (a, b, c, d) = (
        jacobian[(0, 0)],
        jacobian[(0, 1)],
        jacobian[(1, 0)],
        jacobian[(1, 1)],
      );
      na::DMatrix::from_row_slice(2, 2, &[d, -c, -b, a])
    }
    3 => {
      let col = |i: usize| na::Vector3::from_iterator(jacobian.column(i).iter().copied());
      let (j0, j1, j2) = (col(0), col(1), col(2));
      let columns = [j1.cross(&j2), j2.cross(&j0), j0.cross(&j1)];
      na::DMatrix::from_fn(3, 3, |r, c| columns[c][r])
    }
    d => panic!("no cofactor for dimension {d}"),
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementGeometry {
  /// `dim x 2^dim` corner coordinates.
  corners: na::DMatrix<f64>,
}
impl ElementGeometry {
  pub fn new(corners: na::DMatrix<f64>) -> Self {
    assert_eq!(corners.ncols(), 1 << corners.nrows());
    Self { corners }
  }

  pub fn dim(&self) -> Dim {
    self.corners.nrows()
  }
  pub fn corners(&self) -> &na::DMatrix<f64> {
    &self.corners
  }

  pub fn map(&self, xi: na::DVectorView<f64>) -> na::DVector<f64> {
    &self.corners * corner_shapes(xi)
  }

  pub fn jacobian(&self, xi: na::DVectorView<f64>) -> na::DMatrix<f64> {
    &self.corners * corner_shape_grads(xi).transpose()
  }

  pub fn det(&self, xi: na::DVectorView<f64>) -> f64 {
    self.jacobian(xi).determinant()
  }

  /// $|det J| J^(-T)$, mapping reference gradients to physical gradients
  /// premultiplied with the volume element.
  pub fn scaled_inverse_transpose(&self, xi: na::DVectorView<f64>) -> na::DMatrix<f64> {
    let jacobian = self.jacobian(xi);
    jacobian.determinant().signum() * cofactor(&jacobian)
  }

  /// Outward normal of boundary slot `slot` at reference point `xi`, scaled
  /// with the surface element (Nanson's formula).
  pub fn scaled_face_normal(&self, xi: na::DVectorView<f64>, slot: Slot) -> na::DVector<f64> {
    slot.side.sign() * self.scaled_inverse_transpose(xi).column(slot.axis).into_owned()
  }

  /// The geometry of the sub-box `[lower, lower + width]` of the reference
  /// element, which is again multilinear.
  pub fn sub_geometry(&self, lower: &na::DVector<f64>, width: f64) -> ElementGeometry {
    let dim = self.dim();
    let mut corners = na::DMatrix::zeros(dim, 1 << dim);
    for icorner in 0..1 << dim {
      let xi = na::DVector::from_iterator(
        dim,
        (0..dim).map(|axis| lower[axis] + width * ((icorner >> axis) & 1) as f64),
      );
      corners.set_column(icorner, &self.map(xi.as_view()));
    }
    ElementGeometry::new(corners)
  }

  /// Volume by tensor Gauss quadrature, exact for multilinear maps.
  pub fn vol(&self) -> f64 {
    let qr = crate::quadrature::QuadRule::gauss_box(self.dim(), 2);
    qr.apply_ref(|xi| self.det(xi).abs())
  }
}

#[cfg(test)]
mod test {
  use super::{cofactor, corner_shapes, ElementGeometry};
  use crate::mesh::{Side, Slot};

  use approx::assert_relative_eq;

  fn skewed_quad() -> ElementGeometry {
    #[rustfmt::skip]
    let corners = na::DMatrix::from_column_slice(2, 4, &[
      0.0, 0.0,
      2.0, 0.0,
      0.5, 1.0,
      2.5, 1.0,
    ]);
    ElementGeometry::new(corners)
  }

  #[test]
  fn corner_shapes_partition_unity() {
    let xi = na::DVector::from_column_slice(&[0.3, 0.8, 0.1]);
    let shapes = corner_shapes(xi.as_view());
    assert_relative_eq!(shapes.sum(), 1.0, epsilon = 1e-14);
    assert_relative_eq!(shapes[0], 0.7 * 0.2 * 0.9, epsilon = 1e-14);
  }

  #[test]
  fn parallelogram_volume() {
    let geo = skewed_quad();
    assert_relative_eq!(geo.vol(), 2.0, epsilon = 1e-12);
    let xi = na::DVector::from_column_slice(&[0.5, 0.5]);
    assert_relative_eq!(geo.map(xi.as_view())[0], 1.25, epsilon = 1e-14);
  }

  #[test]
  fn cofactor_is_scaled_inverse_transpose() {
    #[rustfmt::skip]
    let jac = na::DMatrix::from_row_slice(3, 3, &[
      2.0, 0.1, 0.0,
      0.3, 1.0, 0.2,
      0.0, 0.4, 3.0,
    ]);
    let expected = jac.determinant() * jac.clone().try_inverse().unwrap().transpose();
    assert_relative_eq!(cofactor(&jac), expected, epsilon = 1e-12);
  }

  #[test]
  fn face_normals_of_skewed_quad() {
    let geo = skewed_quad();
    let xi = na::DVector::from_column_slice(&[0.5, 0.0]);
    // bottom edge has length 2, outward normal points down
    let bottom = geo.scaled_face_normal(xi.as_view(), Slot::new(1, Side::Lower));
    assert_relative_eq!(bottom, na::DVector::from_column_slice(&[0.0, -2.0]), epsilon = 1e-14);
    // left edge runs from (0,0) to (0.5,1), length sqrt(1.25)
    let xi = na::DVector::from_column_slice(&[0.0, 0.5]);
    let left = geo.scaled_face_normal(xi.as_view(), Slot::new(0, Side::Lower));
    assert_relative_eq!(left.norm(), 1.25f64.sqrt(), epsilon = 1e-14);
    assert!(left[0] < 0.0);
  }

  #[test]
  fn sub_geometry_of_segment() {
    let geo = ElementGeometry::new(na::DMatrix::from_column_slice(1, 2, &[1.0, 3.0]));
    let sub = geo.sub_geometry(&na::DVector::from_element(1, 0.5), 0.25);
    assert_eq!(sub.corners(), &na::DMatrix::from_column_slice(1, 2, &[2.0, 2.5]));
  }
}
