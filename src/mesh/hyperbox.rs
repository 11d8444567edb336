//! Structured meshes of axis-aligned boxes made of segments, quads or hexes.

use super::{reference_slots, FaceIdx, MeshTopology, Side, Topology};
use crate::{error::TopologyError, geometry::CornerCoords, Dim, ElemIdx};

/// converts linear index to cartesian index
///
/// converts linear index in 0..dim_len^d to cartesian index in (0)^d..(dim_len)^d
pub fn linear_index2cartesian_index(
  mut lin_idx: usize,
  dim_len: usize,
  dim: usize,
) -> na::DVector<usize> {
  let mut cart_idx = na::DVector::zeros(dim);
  for icomp in 0..dim {
    cart_idx[icomp] = lin_idx % dim_len;
    lin_idx /= dim_len;
  }
  cart_idx
}

/// converts cartesian index to linear index
///
/// converts cartesian index in (0)^d..(dim_len)^d to linear index in 0..dim_len^d
pub fn cartesian_index2linear_index(cart_idx: na::DVector<usize>, dim_len: usize) -> usize {
  let dim = cart_idx.len();
  let mut lin_idx = 0;
  for icomp in (0..dim).rev() {
    lin_idx *= dim_len;
    lin_idx += cart_idx[icomp];
  }
  lin_idx
}

pub struct HyperBox {
  min: na::DVector<f64>,
  max: na::DVector<f64>,
}

// constructors
impl HyperBox {
  pub fn new_min_max(min: na::DVector<f64>, max: na::DVector<f64>) -> Self {
    assert!(min.len() == max.len());
    Self { min, max }
  }
  pub fn new_unit(dim: Dim) -> Self {
    let min = na::DVector::zeros(dim);
    let max = na::DVector::from_element(dim, 1.0);
    Self { min, max }
  }
  pub fn new_unit_scaled(dim: Dim, scale: f64) -> Self {
    let min = na::DVector::zeros(dim);
    let max = na::DVector::from_element(dim, scale);
    Self { min, max }
  }
}

// getters
impl HyperBox {
  pub fn dim(&self) -> usize {
    self.min.len()
  }
  pub fn min(&self) -> &na::DVector<f64> {
    &self.min
  }
  pub fn max(&self) -> &na::DVector<f64> {
    &self.max
  }
  pub fn side_lengths(&self) -> na::DVector<f64> {
    &self.max - &self.min
  }
}

/// helper struct
pub struct HyperBoxMeshInfo {
  hyperbox: HyperBox,
  nboxes_per_dim: usize,
  periodic: bool,
}
// constructors
impl HyperBoxMeshInfo {
  pub fn new_min_max(min: na::DVector<f64>, max: na::DVector<f64>, nboxes_per_dim: usize) -> Self {
    let hyperbox = HyperBox::new_min_max(min, max);
    Self {
      hyperbox,
      nboxes_per_dim,
      periodic: false,
    }
  }
  pub fn new_unit(dim: Dim, nboxes_per_dim: usize) -> Self {
    let hyperbox = HyperBox::new_unit(dim);
    Self {
      hyperbox,
      nboxes_per_dim,
      periodic: false,
    }
  }
  pub fn new_unit_scaled(dim: Dim, nboxes_per_dim: usize, scale: f64) -> Self {
    let hyperbox = HyperBox::new_unit_scaled(dim, scale);
    Self {
      hyperbox,
      nboxes_per_dim,
      periodic: false,
    }
  }
  /// Identify opposite faces of the box in every direction.
  pub fn with_periodic(mut self, periodic: bool) -> Self {
    self.periodic = periodic;
    self
  }
}
// getters
impl HyperBoxMeshInfo {
  pub fn hyperbox(&self) -> &HyperBox {
    &self.hyperbox
  }
  pub fn dim(&self) -> usize {
    self.hyperbox.dim()
  }
  pub fn is_periodic(&self) -> bool {
    self.periodic
  }
  pub fn nboxes_per_dim(&self) -> usize {
    self.nboxes_per_dim
  }
  pub fn nnodes_per_dim(&self) -> usize {
    self.nboxes_per_dim + 1
  }
  pub fn nboxes(&self) -> usize {
    self.nboxes_per_dim.pow(self.dim() as u32)
  }
  pub fn box_cart_idx(&self, ibox: ElemIdx) -> na::DVector<usize> {
    linear_index2cartesian_index(ibox, self.nboxes_per_dim, self.dim())
  }
  pub fn node_pos(&self, node_icart: &na::DVector<usize>) -> na::DVector<f64> {
    let fraction = node_icart.clone().cast::<f64>() / self.nboxes_per_dim as f64;
    fraction.component_mul(&self.hyperbox.side_lengths())
      + self.hyperbox.min()
  }
  pub fn is_node_on_boundary(&self, node_icart: &na::DVector<usize>) -> bool {
    !self.periodic
      && node_icart
        .iter()
        .any(|&c| c == 0 || c == self.nboxes_per_dim)
  }
}

impl HyperBoxMeshInfo {
  /// Global index of the face orthogonal to `axis` through the node layer
  /// `layer` of the box with cartesian index `box_icart`.
  ///
  /// Faces are numbered axis by axis. Along their own axis there are
  /// `nboxes_per_dim + 1` layers, or `nboxes_per_dim` for a periodic mesh.
  fn face_idx(&self, axis: Dim, box_icart: &na::DVector<usize>, layer: usize) -> FaceIdx {
    let n = self.nboxes_per_dim;
    let nlayers = if self.periodic { n } else { n + 1 };
    let nfaces_axis = nlayers * n.pow(self.dim() as u32 - 1);

    let mut lin_idx = 0;
    for icomp in (0..self.dim()).rev() {
      if icomp == axis {
        lin_idx = lin_idx * nlayers + layer % nlayers;
      } else {
        lin_idx = lin_idx * n + box_icart[icomp];
      }
    }
    axis * nfaces_axis + lin_idx
  }

  pub fn compute_topology(&self) -> Result<Topology, TopologyError> {
    let slots = reference_slots(self.dim())?;
    let element_faces = (0..self.nboxes())
      .map(|ibox| {
        let box_icart = self.box_cart_idx(ibox);
        slots
          .iter()
          .map(|slot| {
            let layer = match slot.side {
              Side::Lower => box_icart[slot.axis],
              Side::Upper => box_icart[slot.axis] + 1,
            };
            self.face_idx(slot.axis, &box_icart, layer)
          })
          .collect()
      })
      .collect();
    Topology::from_element_faces(self.dim(), element_faces)
  }

  /// The `2^d` corners of every box, lexicographically ordered.
  pub fn compute_corner_coords(&self) -> CornerCoords {
    let dim = self.dim();
    let ncorners = 1 << dim;
    let mut coords = na::DMatrix::zeros(dim, self.nboxes() * ncorners);
    for ibox in 0..self.nboxes() {
      let box_icart = self.box_cart_idx(ibox);
      for icorner in 0..ncorners {
        let node_icart = corner_offset(&box_icart, icorner);
        coords
          .column_mut(ibox * ncorners + icorner)
          .copy_from(&self.node_pos(&node_icart));
      }
    }
    CornerCoords::new(dim, coords)
  }

  /// Flags the element corners that lie on a non-periodic domain boundary.
  pub fn compute_boundary_corners(&self) -> Vec<bool> {
    let ncorners = 1 << self.dim();
    (0..self.nboxes())
      .flat_map(|ibox| {
        let box_icart = self.box_cart_idx(ibox);
        (0..ncorners)
          .map(|icorner| self.is_node_on_boundary(&corner_offset(&box_icart, icorner)))
          .collect::<Vec<_>>()
      })
      .collect()
  }

  pub fn build(&self) -> Result<HyperBoxMesh, TopologyError> {
    let topology = self.compute_topology()?;
    let corners = self.compute_corner_coords();
    let boundary_corners = self.compute_boundary_corners();
    Ok(HyperBoxMesh {
      topology,
      corners,
      boundary_corners,
      periodic: self.periodic,
    })
  }
}

fn corner_offset(box_icart: &na::DVector<usize>, icorner: usize) -> na::DVector<usize> {
  let mut node_icart = box_icart.clone();
  for (axis, c) in node_icart.iter_mut().enumerate() {
    *c += (icorner >> axis) & 1;
  }
  node_icart
}

/// A structured mesh: topology plus the initial corner positions of every
/// element.
pub struct HyperBoxMesh {
  topology: Topology,
  corners: CornerCoords,
  boundary_corners: Vec<bool>,
  periodic: bool,
}
impl HyperBoxMesh {
  pub fn topology(&self) -> &Topology {
    &self.topology
  }
  pub fn corners(&self) -> &CornerCoords {
    &self.corners
  }
  pub fn boundary_corners(&self) -> &[bool] {
    &self.boundary_corners
  }
  pub fn is_periodic(&self) -> bool {
    self.periodic
  }
  pub fn dim(&self) -> Dim {
    self.topology.dim()
  }
  pub fn nelems(&self) -> usize {
    self.topology.nelems()
  }

  /// Componentwise bounding box of all element corners.
  pub fn bounding_box(&self) -> (na::DVector<f64>, na::DVector<f64>) {
    let coords = self.corners.matrix();
    let min = na::DVector::from_iterator(coords.nrows(), coords.row_iter().map(|r| r.min()));
    let max = na::DVector::from_iterator(coords.nrows(), coords.row_iter().map(|r| r.max()));
    (min, max)
  }
}
