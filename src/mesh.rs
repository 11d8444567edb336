//! Mesh topology as seen by the limiter.
//!
//! Elements are segments, quads or hexes. Every element has `2 * dim`
//! boundary slots, each referencing one global face. A face is shared by at
//! most two elements; a face with a single element lies on the exterior of
//! the domain.
//!
//! All connectivity is expressed through integer tables, there are no pointers
//! between mesh entities.

pub mod hyperbox;

use crate::{error::TopologyError, Dim, ElemIdx};

pub type FaceIdx = usize;
pub type SlotIdx = usize;

/// Lower or upper end of a reference axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
  Lower,
  Upper,
}
impl Side {
  pub fn opposite(self) -> Self {
    match self {
      Side::Lower => Side::Upper,
      Side::Upper => Side::Lower,
    }
  }
  /// Sign of the outward reference normal.
  pub fn sign(self) -> f64 {
    match self {
      Side::Lower => -1.0,
      Side::Upper => 1.0,
    }
  }
}

/// A boundary slot of the reference element `[0,1]^d`: the facet orthogonal
/// to `axis` at the given `side`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
  pub axis: Dim,
  pub side: Side,
}
impl Slot {
  pub const fn new(axis: Dim, side: Side) -> Self {
    Self { axis, side }
  }
}

const SLOTS_1D: [Slot; 2] = [Slot::new(0, Side::Lower), Slot::new(0, Side::Upper)];
const SLOTS_2D: [Slot; 4] = [
  Slot::new(1, Side::Lower),
  Slot::new(0, Side::Upper),
  Slot::new(1, Side::Upper),
  Slot::new(0, Side::Lower),
];
const SLOTS_3D: [Slot; 6] = [
  Slot::new(2, Side::Lower),
  Slot::new(1, Side::Lower),
  Slot::new(0, Side::Upper),
  Slot::new(1, Side::Upper),
  Slot::new(0, Side::Lower),
  Slot::new(2, Side::Upper),
];

/// Element-local boundary slot numbering.
///
/// 1D: left, right.
/// 2D: bottom, right, top, left (counter-clockwise).
/// 3D: bottom, front, right, back, left, top.
pub fn reference_slots(dim: Dim) -> Result<&'static [Slot], TopologyError> {
  match dim {
    1 => Ok(&SLOTS_1D),
    2 => Ok(&SLOTS_2D),
    3 => Ok(&SLOTS_3D),
    _ => Err(TopologyError::UnsupportedDimension(dim)),
  }
}

/// The elements on both sides of a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceElements {
  pub elem1: ElemIdx,
  /// `None` on the exterior boundary.
  pub elem2: Option<ElemIdx>,
}

/// Topology queries the dof tables are built from.
pub trait MeshTopology {
  fn dim(&self) -> Dim;
  fn nelems(&self) -> usize;
  fn element_faces(&self, elem: ElemIdx) -> &[FaceIdx];
  fn face_elements(&self, face: FaceIdx) -> FaceElements;

  fn nslots(&self) -> usize {
    2 * self.dim()
  }

  /// The element across boundary slot `slot` of `elem`.
  fn face_neighbor(&self, elem: ElemIdx, slot: SlotIdx) -> Option<ElemIdx> {
    let face = self.element_faces(elem)[slot];
    let FaceElements { elem1, elem2 } = self.face_elements(face);
    if elem1 == elem {
      elem2
    } else {
      Some(elem1)
    }
  }

  /// All face neighbors of `elem`, indexed by slot.
  fn face_neighbors(&self, elem: ElemIdx) -> Vec<Option<ElemIdx>> {
    (0..self.nslots())
      .map(|slot| self.face_neighbor(elem, slot))
      .collect()
  }
}

/// Element-to-face and face-to-element incidence.
#[derive(Debug, Clone)]
pub struct Topology {
  dim: Dim,
  element_faces: Vec<Vec<FaceIdx>>,
  faces: Vec<FaceElements>,
}

impl Topology {
  /// Builds the face-to-element table from the element-to-face table.
  ///
  /// Every face must be referenced by one (exterior) or two (interior) element
  /// slots. Anything else indicates a non-conforming mesh.
  pub fn from_element_faces(
    dim: Dim,
    element_faces: Vec<Vec<FaceIdx>>,
  ) -> Result<Self, TopologyError> {
    reference_slots(dim)?;
    if element_faces.is_empty() {
      return Err(TopologyError::EmptyMesh);
    }
    let nslots = 2 * dim;

    let nfaces = element_faces.iter().flatten().max().map_or(0, |&f| f + 1);
    let mut incidence: Vec<Vec<ElemIdx>> = vec![Vec::new(); nfaces];
    for (ielem, faces) in element_faces.iter().enumerate() {
      if faces.len() != nslots {
        return Err(TopologyError::InconsistentSlotCount {
          elem: ielem,
          expected: nslots,
          actual: faces.len(),
        });
      }
      for &face in faces {
        incidence[face].push(ielem);
      }
    }

    let faces = incidence
      .into_iter()
      .enumerate()
      .map(|(face, elems)| match elems[..] {
        [elem1] => Ok(FaceElements { elem1, elem2: None }),
        [elem1, elem2] => Ok(FaceElements {
          elem1,
          elem2: Some(elem2),
        }),
        _ => Err(TopologyError::NonConformingFace {
          face,
          count: elems.len(),
        }),
      })
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Self {
      dim,
      element_faces,
      faces,
    })
  }

  pub fn nfaces(&self) -> usize {
    self.faces.len()
  }

  pub fn boundary_faces(&self) -> Vec<FaceIdx> {
    self
      .faces
      .iter()
      .enumerate()
      .filter(|(_, f)| f.elem2.is_none())
      .map(|(i, _)| i)
      .collect()
  }
}

impl MeshTopology for Topology {
  fn dim(&self) -> Dim {
    self.dim
  }
  fn nelems(&self) -> usize {
    self.element_faces.len()
  }
  fn element_faces(&self, elem: ElemIdx) -> &[FaceIdx] {
    &self.element_faces[elem]
  }
  fn face_elements(&self, face: FaceIdx) -> FaceElements {
    self.faces[face]
  }
}

#[cfg(test)]
mod test {
  use super::{reference_slots, MeshTopology, Side, Topology};
  use crate::error::TopologyError;

  #[test]
  fn two_segments() {
    let topology = Topology::from_element_faces(1, vec![vec![0, 1], vec![1, 2]]).unwrap();
    assert_eq!(topology.nelems(), 2);
    assert_eq!(topology.nfaces(), 3);
    assert_eq!(topology.face_neighbor(0, 0), None);
    assert_eq!(topology.face_neighbor(0, 1), Some(1));
    assert_eq!(topology.face_neighbor(1, 0), Some(0));
    assert_eq!(topology.face_neighbor(1, 1), None);
    assert_eq!(topology.boundary_faces(), vec![0, 2]);
  }

  #[test]
  fn opposite_slots_are_paired() {
    for dim in 1..=3 {
      let slots = reference_slots(dim).unwrap();
      for slot in slots {
        let count = slots
          .iter()
          .filter(|s| s.axis == slot.axis && s.side == slot.side.opposite())
          .count();
        assert_eq!(count, 1);
      }
    }
    assert_eq!(Side::Lower.sign(), -1.0);
  }

  #[test]
  fn non_conforming_face_is_rejected() {
    let err = Topology::from_element_faces(1, vec![vec![0, 1], vec![1, 2], vec![1, 3]]).unwrap_err();
    assert_eq!(err, TopologyError::NonConformingFace { face: 1, count: 3 });
  }

  #[test]
  fn unsupported_dimension() {
    let err = Topology::from_element_faces(4, vec![vec![0; 8]]).unwrap_err();
    assert_eq!(err, TopologyError::UnsupportedDimension(4));
  }
}
