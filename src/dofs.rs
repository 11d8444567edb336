//! Topological dof tables of the discontinuous layout.
//!
//! Global dof `elem * ndofs + local`. Nothing is shared between elements, all
//! cross-element connectivity lives in the integer tables built here once.

use crate::{
  error::TopologyError,
  fe::{LocalDofIdx, ReferenceElement},
  mesh::{reference_slots, MeshTopology, Side, SlotIdx},
  DofIdx, ElemIdx,
};

use itertools::Itertools;

#[derive(Debug, Clone)]
pub struct DofInfo {
  order: usize,
  nelems: usize,
  ndofs: usize,
  nslots: usize,
  nbdr_dofs: usize,

  bdr_dofs: Vec<Vec<LocalDofIdx>>,
  /// `[elem][slot][j]`, flattened.
  nbr_dof: Vec<Option<DofIdx>>,
  /// Elements whose range bounds a dof.
  bounds_of: Vec<Vec<ElemIdx>>,
  sub2ind: Vec<Vec<LocalDofIdx>>,

  pub xi_min: na::DVector<f64>,
  pub xi_max: na::DVector<f64>,
  pub xe_min: na::DVector<f64>,
  pub xe_max: na::DVector<f64>,
}

impl DofInfo {
  pub fn new(topology: &impl MeshTopology, refelem: &ReferenceElement) -> Result<Self, TopologyError> {
    let dim = topology.dim();
    if topology.nelems() == 0 {
      return Err(TopologyError::EmptyMesh);
    }
    if refelem.dim() != dim {
      return Err(TopologyError::UnsupportedDimension(refelem.dim()));
    }

    let nelems = topology.nelems();
    let ndofs = refelem.ndofs();
    let bdr_dofs = refelem.bdr_dofs()?;

    let mut this = Self {
      order: refelem.order(),
      nelems,
      ndofs,
      nslots: refelem.nslots(),
      nbdr_dofs: refelem.nbdr_dofs(),
      bdr_dofs,
      nbr_dof: Vec::new(),
      bounds_of: Vec::new(),
      sub2ind: Vec::new(),
      xi_min: na::DVector::zeros(nelems * ndofs),
      xi_max: na::DVector::zeros(nelems * ndofs),
      xe_min: na::DVector::zeros(nelems),
      xe_max: na::DVector::zeros(nelems),
    };
    this.bounds_of = this.build_bounds_map(topology, refelem)?;
    this.nbr_dof = this.build_neighbor_dofs(topology)?;
    this.sub2ind = build_subcell_map(refelem);

    tracing::debug!(
      "dof tables built: {} elements, {} dofs per element, {} subcells per element",
      nelems,
      ndofs,
      this.sub2ind.len()
    );
    Ok(this)
  }

  /// Every dof is bounded by its own element, the face neighbors across all
  /// slots it lies on, and the elements reached diagonally across the edges and
  /// corners it lies on.
  fn build_bounds_map(
    &self,
    topology: &impl MeshTopology,
    refelem: &ReferenceElement,
  ) -> Result<Vec<Vec<ElemIdx>>, TopologyError> {
    let slots = reference_slots(topology.dim())?;
    let p = self.order;

    let mut bounds_of = vec![Vec::new(); self.nelems * self.ndofs];
    for ielem in 0..self.nelems {
      let nbrs = topology.face_neighbors(ielem);

      // diagonal neighbors across the edge between two slots
      let mut edge_nbrs = vec![vec![None; self.nslots]; self.nslots];
      for (s1, s2) in (0..self.nslots).tuple_combinations() {
        if slots[s1].axis == slots[s2].axis {
          continue;
        }
        let nbr = common_neighbor(topology, ielem, nbrs[s1], nbrs[s2])?;
        edge_nbrs[s1][s2] = nbr;
        edge_nbrs[s2][s1] = nbr;
      }

      for ildof in 0..self.ndofs {
        let multi = refelem.dof_multi_index(ildof);
        let touched = (0..self.nslots)
          .filter(|&s| {
            let slot = slots[s];
            match slot.side {
              Side::Lower => multi[slot.axis] == 0,
              Side::Upper => multi[slot.axis] == p,
            }
          })
          .collect_vec();

        let mut contributors = vec![ielem];
        let mut add = |elem: Option<ElemIdx>| {
          if let Some(elem) = elem {
            if !contributors.contains(&elem) {
              contributors.push(elem);
            }
          }
        };

        for &s in &touched {
          add(nbrs[s]);
        }
        for (&s1, &s2) in touched.iter().tuple_combinations() {
          if slots[s1].axis != slots[s2].axis {
            add(edge_nbrs[s1][s2]);
          }
        }
        for (&s1, &s2, &s3) in touched.iter().tuple_combinations() {
          let axes = [slots[s1].axis, slots[s2].axis, slots[s3].axis];
          if axes.iter().all_unique() {
            // pivot on the slot normal to the last axis
            let mut triple = [s1, s2, s3];
            triple.sort_by_key(|&s| std::cmp::Reverse(slots[s].axis));
            let [pivot, a, b] = triple;
            if let Some(pivot_nbr) = nbrs[pivot] {
              add(common_neighbor(
                topology,
                pivot_nbr,
                edge_nbrs[pivot][a],
                edge_nbrs[pivot][b],
              )?);
            }
          }
        }

        bounds_of[ielem * self.ndofs + ildof] = contributors;
      }
    }
    Ok(bounds_of)
  }

  /// The dof of the neighbor coinciding with boundary dof `j` of a slot is the
  /// dof `nbdr_dofs - 1 - j` on the matching slot of the neighbor, since the two
  /// elements traverse the shared face in opposite directions.
  fn build_neighbor_dofs(
    &self,
    topology: &impl MeshTopology,
  ) -> Result<Vec<Option<DofIdx>>, TopologyError> {
    let mut nbr_dof = vec![None; self.nelems * self.nslots * self.nbdr_dofs];
    for ielem in 0..self.nelems {
      for islot in 0..self.nslots {
        let Some(nbr) = topology.face_neighbor(ielem, islot) else {
          continue;
        };
        let face = topology.element_faces(ielem)[islot];
        let nbr_slot = topology
          .element_faces(nbr)
          .iter()
          .enumerate()
          .position(|(s, &f)| f == face && (nbr != ielem || s != islot))
          .ok_or(TopologyError::MissingSharedFace {
            elem: ielem,
            neighbor: nbr,
            face,
          })?;

        for j in 0..self.nbdr_dofs {
          let ldof = self.bdr_dofs[nbr_slot][self.nbdr_dofs - 1 - j];
          nbr_dof[self.nbr_dof_idx(ielem, islot, j)] = Some(nbr * self.ndofs + ldof);
        }
      }
    }
    Ok(nbr_dof)
  }

  fn nbr_dof_idx(&self, ielem: ElemIdx, islot: SlotIdx, j: usize) -> usize {
    (ielem * self.nslots + islot) * self.nbdr_dofs + j
  }
}

// getters
impl DofInfo {
  pub fn order(&self) -> usize {
    self.order
  }
  pub fn nelems(&self) -> usize {
    self.nelems
  }
  /// Dofs per element.
  pub fn ndofs(&self) -> usize {
    self.ndofs
  }
  pub fn ndofs_global(&self) -> usize {
    self.nelems * self.ndofs
  }
  pub fn nslots(&self) -> usize {
    self.nslots
  }
  /// Dofs per boundary slot.
  pub fn nbdr_dofs(&self) -> usize {
    self.nbdr_dofs
  }
  pub fn nsubcells(&self) -> usize {
    self.sub2ind.len()
  }
  pub fn ndofs_subcell(&self) -> usize {
    self.sub2ind.first().map_or(0, |s| s.len())
  }
  pub fn bdr_dofs(&self) -> &[Vec<LocalDofIdx>] {
    &self.bdr_dofs
  }
  pub fn bdr_dof(&self, islot: SlotIdx, j: usize) -> LocalDofIdx {
    self.bdr_dofs[islot][j]
  }
  /// `None` on the exterior boundary.
  pub fn nbr_dof(&self, ielem: ElemIdx, islot: SlotIdx, j: usize) -> Option<DofIdx> {
    self.nbr_dof[self.nbr_dof_idx(ielem, islot, j)]
  }
  pub fn bounds_of(&self, idof: DofIdx) -> &[ElemIdx] {
    &self.bounds_of[idof]
  }
  pub fn sub2ind(&self, isubcell: usize) -> &[LocalDofIdx] {
    &self.sub2ind[isubcell]
  }
  pub fn global_dof(&self, ielem: ElemIdx, ildof: LocalDofIdx) -> DofIdx {
    ielem * self.ndofs + ildof
  }
}

impl DofInfo {
  /// Records the range of the element's own dof values.
  pub fn set_element_bounds(&mut self, ielem: ElemIdx, x: &na::DVector<f64>) {
    let values = x.rows(ielem * self.ndofs, self.ndofs);
    self.xe_min[ielem] = values.min();
    self.xe_max[ielem] = values.max();
  }

  /// Admissible range of dof `idof` from the element ranges of all its
  /// contributors. The element ranges must be current.
  pub fn compute_vertex_bounds(&mut self, idof: DofIdx) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &ielem in &self.bounds_of[idof] {
      min = min.min(self.xe_min[ielem]);
      max = max.max(self.xe_max[ielem]);
    }
    self.xi_min[idof] = min;
    self.xi_max[idof] = max;
  }

  /// Reference coordinates of the lower corner of a subcell.
  pub fn subcell_lower(&self, isubcell: usize, dim: usize) -> na::DVector<f64> {
    let lower_dof = self.sub2ind[isubcell][0];
    let n = self.order + 1;
    na::DVector::from_fn(dim, |axis, _| {
      ((lower_dof / n.pow(axis as u32)) % n) as f64 / self.order as f64
    })
  }
}

/// The unique element other than `exclude` that is a face neighbor of both
/// `elem1` and `elem2`.
///
/// `None` if there is no such element, which happens at the exterior boundary.
/// Several distinct candidates indicate a mesh that is not a conforming grid of
/// segments, quads or hexes.
pub fn common_neighbor(
  topology: &impl MeshTopology,
  exclude: ElemIdx,
  elem1: Option<ElemIdx>,
  elem2: Option<ElemIdx>,
) -> Result<Option<ElemIdx>, TopologyError> {
  let (Some(elem1), Some(elem2)) = (elem1, elem2) else {
    return Ok(None);
  };
  let nbrs1 = topology.face_neighbors(elem1);
  let nbrs2 = topology.face_neighbors(elem2);

  let candidates = nbrs1
    .iter()
    .flatten()
    .filter(|&&c| c != exclude && nbrs2.contains(&Some(c)))
    .unique()
    .collect_vec();

  match candidates[..] {
    [] => Ok(None),
    [&c] => Ok(Some(c)),
    _ => Err(TopologyError::MultipleCommonNeighbors {
      elem: exclude,
      elem1,
      elem2,
    }),
  }
}

/// Corner dofs of the `p^d` uniform subcells, subcell corners ordered
/// lexicographically like the element corners.
fn build_subcell_map(refelem: &ReferenceElement) -> Vec<Vec<LocalDofIdx>> {
  let dim = refelem.dim();
  let p = refelem.order();
  let n = p + 1;
  let nsubcells = p.pow(dim as u32);

  (0..nsubcells)
    .map(|isubcell| {
      (0..1usize << dim)
        .map(|icorner| {
          let mut rem = isubcell;
          let mut ildof = 0;
          for axis in 0..dim {
            let m = rem % p;
            rem /= p;
            ildof += (m + ((icorner >> axis) & 1)) * n.pow(axis as u32);
          }
          ildof
        })
        .collect()
    })
    .collect()
}

#[cfg(test)]
mod test {
  use super::{common_neighbor, DofInfo};
  use crate::{
    error::TopologyError,
    fe::{BasisKind, ReferenceElement},
    mesh::{hyperbox::HyperBoxMeshInfo, Topology},
  };

  fn dof_info(dim: usize, nboxes: usize, order: usize, periodic: bool) -> DofInfo {
    let mesh = HyperBoxMeshInfo::new_unit(dim, nboxes)
      .with_periodic(periodic)
      .build()
      .unwrap();
    let refelem = ReferenceElement::new(dim, order, BasisKind::Bernstein).unwrap();
    DofInfo::new(mesh.topology(), &refelem).unwrap()
  }

  fn sorted(elems: &[usize]) -> Vec<usize> {
    let mut elems = elems.to_vec();
    elems.sort();
    elems
  }

  #[test]
  fn two_segments() {
    let dofs = dof_info(1, 2, 1, false);
    assert_eq!(dofs.ndofs_global(), 4);
    assert_eq!(dofs.bounds_of(0), &[0]);
    assert_eq!(dofs.bounds_of(1), &[0, 1]);
    assert_eq!(dofs.bounds_of(2), &[1, 0]);
    assert_eq!(dofs.bounds_of(3), &[1]);

    assert_eq!(dofs.nbr_dof(0, 0, 0), None);
    assert_eq!(dofs.nbr_dof(0, 1, 0), Some(2));
    assert_eq!(dofs.nbr_dof(1, 0, 0), Some(1));
    assert_eq!(dofs.nbr_dof(1, 1, 0), None);

    assert_eq!(dofs.nsubcells(), 1);
    assert_eq!(dofs.sub2ind(0), &[0, 1]);
  }

  #[test]
  fn quad_corner_sees_diagonal_neighbor() {
    let dofs = dof_info(2, 2, 2, false);
    let nd = dofs.ndofs();
    // element 0 is the lower left box, its upper right dof touches all four
    assert_eq!(sorted(dofs.bounds_of(nd - 1)), vec![0, 1, 2, 3]);
    // an edge dof only sees the face neighbor
    assert_eq!(sorted(dofs.bounds_of(5)), vec![0, 1]);
    assert_eq!(dofs.bounds_of(4), &[0]);
    // element 3, lower left dof
    assert_eq!(sorted(dofs.bounds_of(3 * nd)), vec![0, 1, 2, 3]);
  }

  #[test]
  fn neighbor_dofs_coincide() {
    let p = 2;
    let dofs = dof_info(2, 2, p, false);
    let nd = dofs.ndofs();
    // right slot of element 0 against left slot of element 1
    for j in 0..=p {
      let own = dofs.bdr_dof(1, j);
      let nbr = dofs.nbr_dof(0, 1, j).unwrap() - nd;
      // same row, own dof at x = p, neighbor dof at x = 0
      assert_eq!(own / (p + 1), nbr / (p + 1));
      assert_eq!(own % (p + 1), p);
      assert_eq!(nbr % (p + 1), 0);
    }
    // the correspondence is an involution
    for ielem in 0..4 {
      for islot in 0..4 {
        for j in 0..=p {
          if let Some(nbr) = dofs.nbr_dof(ielem, islot, j) {
            let own = dofs.global_dof(ielem, dofs.bdr_dof(islot, j));
            let nbr_elem = nbr / nd;
            let back = (0..4)
              .flat_map(|s| (0..=p).map(move |k| (s, k)))
              .find(|&(s, k)| nbr_elem * nd + dofs.bdr_dof(s, k) == nbr && dofs.nbr_dof(nbr_elem, s, k) == Some(own));
            assert!(back.is_some());
          }
        }
      }
    }
  }

  #[test]
  fn hex_corner_sees_all_eight() {
    let dofs = dof_info(3, 2, 1, false);
    let nd = dofs.ndofs();
    assert_eq!(sorted(dofs.bounds_of(nd - 1)), (0..8).collect::<Vec<_>>());
    // dof on the edge x = 1, y = 1, z = 0 of element 0
    assert_eq!(sorted(dofs.bounds_of(3)), vec![0, 1, 2, 3]);
    // bottom face neighbor dofs lie on the top face of the element below
    let dofs = dof_info(3, 2, 1, true);
    assert_eq!(dofs.nbr_dof(0, 0, 0), Some(4 * nd + 4));
    assert_eq!(dofs.nsubcells(), 1);
    assert_eq!(dofs.sub2ind(0), &[0, 1, 2, 3, 4, 5, 6, 7]);
  }

  #[test]
  fn periodic_two_cells_is_not_ambiguous() {
    let dofs = dof_info(2, 2, 1, true);
    assert_eq!(sorted(dofs.bounds_of(0)), vec![0, 1, 2, 3]);
    let single = dof_info(1, 1, 2, true);
    assert_eq!(single.nbr_dof(0, 0, 0), Some(2));
    assert_eq!(single.nbr_dof(0, 1, 0), Some(0));
  }

  #[test]
  fn subcell_map_of_quad() {
    let dofs = dof_info(2, 1, 3, false);
    assert_eq!(dofs.nsubcells(), 9);
    assert_eq!(dofs.ndofs_subcell(), 4);
    assert_eq!(dofs.sub2ind(0), &[0, 1, 4, 5]);
    assert_eq!(dofs.sub2ind(4), &[5, 6, 9, 10]);
    assert_eq!(dofs.sub2ind(8), &[10, 11, 14, 15]);
    let lower = dofs.subcell_lower(5, 2);
    assert_eq!(lower, na::DVector::from_column_slice(&[2.0 / 3.0, 1.0 / 3.0]));
  }

  #[test]
  fn vertex_bounds_span_contributors() {
    let mut dofs = dof_info(2, 2, 1, false);
    let x = na::DVector::from_iterator(16, (0..16).map(|i| ((i * 7) % 5) as f64 - 2.0));
    for ielem in 0..4 {
      dofs.set_element_bounds(ielem, &x);
    }
    for idof in 0..16 {
      dofs.compute_vertex_bounds(idof);
      let contributors = dofs.bounds_of(idof).to_vec();
      let min = contributors.iter().map(|&e| dofs.xe_min[e]).fold(f64::INFINITY, f64::min);
      let max = contributors.iter().map(|&e| dofs.xe_max[e]).fold(f64::NEG_INFINITY, f64::max);
      assert_eq!(dofs.xi_min[idof], min);
      assert_eq!(dofs.xi_max[idof], max);
      assert!(dofs.xi_min[idof] <= x[idof] && x[idof] <= dofs.xi_max[idof]);
    }
  }

  #[test]
  fn ambiguous_common_neighbor_is_fatal() {
    // elements 1 and 2 are both attached to elements 3 and 4
    let element_faces = vec![
      vec![0, 6, 7, 1],
      vec![0, 2, 3, 8],
      vec![1, 4, 5, 9],
      vec![2, 4, 10, 11],
      vec![3, 5, 12, 13],
    ];
    let topology = Topology::from_element_faces(2, element_faces).unwrap();
    assert_eq!(
      common_neighbor(&topology, 0, Some(1), Some(2)),
      Err(TopologyError::MultipleCommonNeighbors {
        elem: 0,
        elem1: 1,
        elem2: 2
      })
    );
    let refelem = ReferenceElement::new(2, 1, BasisKind::Bernstein).unwrap();
    let err = DofInfo::new(&topology, &refelem).unwrap_err();
    assert_eq!(
      err,
      TopologyError::MultipleCommonNeighbors {
        elem: 0,
        elem1: 1,
        elem2: 2
      }
    );
  }
}
