//! The velocity field that advects the solution.

use crate::{
  geometry::{corner_shapes, CornerCoords, ElementGeometry},
  ElemIdx,
};

pub type VelocityFn = Box<dyn Fn(na::DVectorView<f64>) -> na::DVector<f64>>;

pub enum AdvectionField {
  /// A prescribed velocity on a fixed mesh.
  Transport(VelocityFn),
  /// The mesh moves with the velocity given at every element corner, while the
  /// solution stays fixed in space. In the frame of the moving mesh the
  /// solution is advected with the negated mesh velocity.
  Remap {
    /// `dim x (nelems * 2^dim)`, laid out like [`CornerCoords`].
    corner_velocity: na::DMatrix<f64>,
  },
}

impl AdvectionField {
  pub fn transport<F>(f: F) -> Self
  where
    F: Fn(na::DVectorView<f64>) -> na::DVector<f64> + 'static,
  {
    Self::Transport(Box::new(f))
  }

  /// Mesh velocity sampled at the corners, with the corners on a non-periodic
  /// domain boundary held fixed.
  pub fn remap<F>(corners: &CornerCoords, boundary_corners: &[bool], f: F) -> Self
  where
    F: Fn(na::DVectorView<f64>) -> na::DVector<f64>,
  {
    let mut corner_velocity = corners.eval_coord_fn(f);
    for (mut column, &fixed) in corner_velocity.column_iter_mut().zip(boundary_corners) {
      if fixed {
        column.fill(0.0);
      }
    }
    Self::Remap { corner_velocity }
  }

  pub fn is_remap(&self) -> bool {
    matches!(self, Self::Remap { .. })
  }

  pub fn mesh_velocity(&self) -> Option<&na::DMatrix<f64>> {
    match self {
      Self::Transport(_) => None,
      Self::Remap { corner_velocity } => Some(corner_velocity),
    }
  }

  /// Advection velocity at the reference point `xi` of element `ielem`.
  pub fn eval(
    &self,
    ielem: ElemIdx,
    geometry: &ElementGeometry,
    xi: na::DVectorView<f64>,
  ) -> na::DVector<f64> {
    match self {
      Self::Transport(f) => f(geometry.map(xi).as_view()),
      Self::Remap { corner_velocity } => {
        let ncorners = geometry.corners().ncols();
        -(corner_velocity.columns(ielem * ncorners, ncorners) * corner_shapes(xi))
      }
    }
  }
}

impl std::fmt::Debug for AdvectionField {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Transport(_) => f.write_str("Transport"),
      Self::Remap { corner_velocity } => f
        .debug_struct("Remap")
        .field("ncorners", &corner_velocity.ncols())
        .finish(),
    }
  }
}
