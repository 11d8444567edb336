//! Galerkin forms of the discontinuous discretization and the face and
//! subcell stencils of the low order schemes.

use crate::{
  dofs::DofInfo,
  fe::ReferenceElement,
  geometry::{corner_shape_grads, CornerCoords, ElementGeometry},
  mesh::{reference_slots, Slot, SlotIdx},
  quadrature::QuadRule,
  sparse::{row_sums, SparseMatrix},
  velocity::AdvectionField,
  ElemIdx,
};

pub type InflowFn = Box<dyn Fn(na::DVectorView<f64>) -> f64>;

/// Basis functions tabulated at the points of a quadrature rule.
#[derive(Debug, Clone)]
pub struct TabulatedBasis {
  qr: QuadRule,
  shapes: Vec<na::DVector<f64>>,
  ref_grads: Vec<na::DMatrix<f64>>,
}
impl TabulatedBasis {
  pub fn new(refelem: &ReferenceElement, qr: QuadRule) -> Self {
    let shapes = qr.nodes().column_iter().map(|xi| refelem.shapes(xi)).collect();
    let ref_grads = qr.nodes().column_iter().map(|xi| refelem.ref_grads(xi)).collect();
    Self {
      qr,
      shapes,
      ref_grads,
    }
  }

  pub fn qr(&self) -> &QuadRule {
    &self.qr
  }
  pub fn shapes(&self, ipoint: usize) -> &na::DVector<f64> {
    &self.shapes[ipoint]
  }
  pub fn ref_grads(&self, ipoint: usize) -> &na::DMatrix<f64> {
    &self.ref_grads[ipoint]
  }
}

pub trait ElmatProvider {
  fn eval(&self, ielem: ElemIdx, geometry: &ElementGeometry) -> na::DMatrix<f64>;
}
impl<F> ElmatProvider for F
where
  F: Fn(ElemIdx, &ElementGeometry) -> na::DMatrix<f64>,
{
  fn eval(&self, ielem: ElemIdx, geometry: &ElementGeometry) -> na::DMatrix<f64> {
    self(ielem, geometry)
  }
}

/// Block diagonal Galerkin matrix. Every element block is fully part of the
/// sparsity pattern, zero or not.
pub fn assemble_galmat(
  corners: &CornerCoords,
  ndofs: usize,
  elmat_provider: impl ElmatProvider,
) -> SparseMatrix {
  let nelems = corners.nelems();
  let mut galmat = SparseMatrix::zeros(nelems * ndofs, nelems * ndofs);
  for ielem in 0..nelems {
    let geometry = corners.element_geometry(ielem);
    let elmat = elmat_provider.eval(ielem, &geometry);
    for (ilocal, iglobal) in (ielem * ndofs..(ielem + 1) * ndofs).enumerate() {
      for (jlocal, jglobal) in (ielem * ndofs..(ielem + 1) * ndofs).enumerate() {
        galmat.push_structural(iglobal, jglobal, elmat[(ilocal, jlocal)]);
      }
    }
  }
  galmat
}

/// $M_(i j) = integral phi_i phi_j dif x$
pub fn mass_elmat(basis: &TabulatedBasis, geometry: &ElementGeometry) -> na::DMatrix<f64> {
  let ndofs = basis.shapes(0).len();
  let mut elmat = na::DMatrix::zeros(ndofs, ndofs);
  for (ipoint, (xi, weight)) in basis.qr().iter().enumerate() {
    let shapes = basis.shapes(ipoint);
    elmat += (weight * geometry.det(xi).abs()) * shapes * shapes.transpose();
  }
  elmat
}

/// $K_(i j) = -integral (a dot nabla phi_j) phi_i dif x$
pub fn convection_elmat(
  basis: &TabulatedBasis,
  geometry: &ElementGeometry,
  ielem: ElemIdx,
  field: &AdvectionField,
) -> na::DMatrix<f64> {
  let ndofs = basis.shapes(0).len();
  let mut elmat = na::DMatrix::zeros(ndofs, ndofs);
  for (ipoint, (xi, weight)) in basis.qr().iter().enumerate() {
    let velocity = field.eval(ielem, geometry, xi);
    // |det J| a^T J^(-T) nabla phi_j
    let transported = geometry.scaled_inverse_transpose(xi).transpose() * velocity;
    let advective = basis.ref_grads(ipoint).transpose() * transported;
    elmat -= weight * basis.shapes(ipoint) * advective.transpose();
  }
  elmat
}

/// The global forms on the current geometry.
#[derive(Debug, Clone)]
pub struct Forms {
  pub mass: nas::CsrMatrix<f64>,
  pub lumped_mass: na::DVector<f64>,
  /// The discretization matrix `K`.
  pub convection: nas::CsrMatrix<f64>,
  /// The inflow load `b`.
  pub inflow: na::DVector<f64>,
}

/// Reference element and tabulations shared by all assembly routines.
#[derive(Debug, Clone)]
pub struct Discretization {
  refelem: ReferenceElement,
  cell: TabulatedBasis,
  facets: Vec<(Slot, TabulatedBasis)>,
  subcell_qr: QuadRule,
}

impl Discretization {
  pub fn new(refelem: ReferenceElement) -> Self {
    let npoints = refelem.order() + 2;
    let cell = TabulatedBasis::new(&refelem, QuadRule::gauss_box(refelem.dim(), npoints));
    let facets = reference_slots(refelem.dim())
      .map(|slots| {
        slots
          .iter()
          .map(|&slot| {
            let qr = QuadRule::gauss_facet(refelem.dim(), npoints, slot);
            (slot, TabulatedBasis::new(&refelem, qr))
          })
          .collect()
      })
      .unwrap_or_default();
    let subcell_qr = QuadRule::gauss_box(refelem.dim(), 3);
    Self {
      refelem,
      cell,
      facets,
      subcell_qr,
    }
  }

  pub fn refelem(&self) -> &ReferenceElement {
    &self.refelem
  }

  pub fn assemble_mass(&self, corners: &CornerCoords) -> nas::CsrMatrix<f64> {
    let elmat = |_: ElemIdx, geometry: &ElementGeometry| mass_elmat(&self.cell, geometry);
    assemble_galmat(corners, self.refelem.ndofs(), elmat).to_nalgebra_csr()
  }

  /// Volume convection terms, plus the upwind face coupling when `faces` is
  /// given.
  ///
  /// The face coupling of row $i$ on a slot is
  /// $sum_j "bdrInt"_(i j) (u_("nbr"(j)) - u_j)$, which is added with a
  /// structurally symmetric pattern.
  pub fn assemble_convection(
    &self,
    corners: &CornerCoords,
    field: &AdvectionField,
    faces: Option<(&DofInfo, &Assembly)>,
  ) -> nas::CsrMatrix<f64> {
    let elmat = |ielem: ElemIdx, geometry: &ElementGeometry| {
      convection_elmat(&self.cell, geometry, ielem, field)
    };
    let mut galmat = assemble_galmat(corners, self.refelem.ndofs(), elmat);

    if let Some((dofs, assembly)) = faces {
      for ielem in 0..dofs.nelems() {
        for islot in 0..dofs.nslots() {
          for i in 0..dofs.nbdr_dofs() {
            let row = dofs.global_dof(ielem, dofs.bdr_dof(islot, i));
            for j in 0..dofs.nbdr_dofs() {
              let value = assembly.bdr_int(ielem, islot, i, j);
              let own = dofs.global_dof(ielem, dofs.bdr_dof(islot, j));
              galmat.push_structural(row, own, -value);
              if let Some(nbr) = dofs.nbr_dof(ielem, islot, j) {
                galmat.push_structural(row, nbr, value);
              }
            }
          }
        }
      }
    }
    galmat.to_nalgebra_csr()
  }

  /// $b_i = -integral_(partial Omega) min(0, a dot n) g phi_i dif s$
  pub fn assemble_inflow(
    &self,
    corners: &CornerCoords,
    field: &AdvectionField,
    dofs: &DofInfo,
    inflow: &dyn Fn(na::DVectorView<f64>) -> f64,
  ) -> na::DVector<f64> {
    let ndofs = self.refelem.ndofs();
    let mut galvec = na::DVector::zeros(dofs.ndofs_global());
    for ielem in 0..dofs.nelems() {
      let geometry = corners.element_geometry(ielem);
      for (islot, (slot, basis)) in self.facets.iter().enumerate() {
        if dofs.nbr_dof(ielem, islot, 0).is_some() {
          continue;
        }
        for (ipoint, (xi, weight)) in basis.qr().iter().enumerate() {
          let normal = geometry.scaled_face_normal(xi, *slot);
          let vn = field.eval(ielem, &geometry, xi).dot(&normal).min(0.0);
          if vn == 0.0 {
            continue;
          }
          let g = inflow(geometry.map(xi).as_view());
          let mut rows = galvec.rows_mut(ielem * ndofs, ndofs);
          rows -= (weight * vn * g) * basis.shapes(ipoint);
        }
      }
    }
    galvec
  }

  pub fn assemble_forms(
    &self,
    corners: &CornerCoords,
    field: &AdvectionField,
    dofs: &DofInfo,
    faces: Option<&Assembly>,
    inflow: &dyn Fn(na::DVectorView<f64>) -> f64,
  ) -> Forms {
    let mass = self.assemble_mass(corners);
    let lumped_mass = row_sums(&mass);
    let convection = self.assemble_convection(corners, field, faces.map(|a| (dofs, a)));
    let inflow = self.assemble_inflow(corners, field, dofs, inflow);
    Forms {
      mass,
      lumped_mass,
      convection,
      inflow,
    }
  }
}

/// Face flux stencils and subcell weights of every element.
///
/// Fixed for transport, recomputed on every evaluation when the mesh moves.
#[derive(Debug, Clone)]
pub struct Assembly {
  nslots: usize,
  nbdr_dofs: usize,
  nsubcells: usize,
  ndofs_subcell: usize,
  /// `[elem][slot][i * nbdr_dofs + j]`, flattened.
  bdr_int: Vec<f64>,
  /// `[elem][subcell][corner]`, flattened. Empty without subcells.
  subcell_weights: Vec<f64>,
}

impl Assembly {
  pub fn new(dofs: &DofInfo, with_subcells: bool) -> Self {
    let nslots = dofs.nslots();
    let nbdr_dofs = dofs.nbdr_dofs();
    let (nsubcells, ndofs_subcell) = if with_subcells {
      (dofs.nsubcells(), dofs.ndofs_subcell())
    } else {
      (0, 0)
    };
    Self {
      nslots,
      nbdr_dofs,
      nsubcells,
      ndofs_subcell,
      bdr_int: vec![0.0; dofs.nelems() * nslots * nbdr_dofs * nbdr_dofs],
      subcell_weights: vec![0.0; dofs.nelems() * nsubcells * ndofs_subcell],
    }
  }

  pub fn has_subcells(&self) -> bool {
    self.nsubcells > 0
  }

  pub fn bdr_int(&self, ielem: ElemIdx, islot: SlotIdx, i: usize, j: usize) -> f64 {
    self.bdr_int[self.bdr_offset(ielem, islot) + i * self.nbdr_dofs + j]
  }

  pub fn subcell_weight(&self, ielem: ElemIdx, isubcell: usize, icorner: usize) -> f64 {
    self.subcell_weights[(ielem * self.nsubcells + isubcell) * self.ndofs_subcell + icorner]
  }

  fn bdr_offset(&self, ielem: ElemIdx, islot: SlotIdx) -> usize {
    (ielem * self.nslots + islot) * self.nbdr_dofs * self.nbdr_dofs
  }

  /// Flux stencil of one slot,
  /// $"bdrInt"_(i j) = -integral min(0, a dot n) phi_i phi_j dif s >= 0$
  /// over the boundary dofs `i,j` of the slot, with the velocity taken from
  /// inside the element.
  pub fn compute_flux_terms(
    &mut self,
    ielem: ElemIdx,
    islot: SlotIdx,
    geometry: &ElementGeometry,
    discretization: &Discretization,
    dofs: &DofInfo,
    field: &AdvectionField,
  ) {
    let n = self.nbdr_dofs;
    let offset = self.bdr_offset(ielem, islot);
    let stencil = &mut self.bdr_int[offset..offset + n * n];
    stencil.fill(0.0);

    let (slot, basis) = &discretization.facets[islot];
    for (ipoint, (xi, weight)) in basis.qr().iter().enumerate() {
      let normal = geometry.scaled_face_normal(xi, *slot);
      let vn = field.eval(ielem, geometry, xi).dot(&normal).min(0.0);
      if vn == 0.0 {
        continue;
      }
      let shapes = basis.shapes(ipoint);
      for i in 0..n {
        let aux = weight * shapes[dofs.bdr_dof(islot, i)] * vn;
        for j in 0..n {
          stencil[i * n + j] -= aux * shapes[dofs.bdr_dof(islot, j)];
        }
      }
    }
  }

  /// Galerkin fluctuation weights of one subcell,
  /// $w_j = -integral_("subcell") a dot nabla psi_j dif x$
  /// with $psi_j$ the multilinear corner functions of the subcell.
  pub fn compute_subcell_weights(
    &mut self,
    ielem: ElemIdx,
    isubcell: usize,
    geometry: &ElementGeometry,
    discretization: &Discretization,
    dofs: &DofInfo,
    field: &AdvectionField,
  ) {
    let dim = geometry.dim();
    let width = 1.0 / dofs.order() as f64;
    let lower = dofs.subcell_lower(isubcell, dim);
    let subgeometry = geometry.sub_geometry(&lower, width);

    let offset = (ielem * self.nsubcells + isubcell) * self.ndofs_subcell;
    let weights = &mut self.subcell_weights[offset..offset + self.ndofs_subcell];
    weights.fill(0.0);

    for (eta, weight) in discretization.subcell_qr.iter() {
      let xi = &lower + width * eta;
      let velocity = field.eval(ielem, geometry, xi.as_view());
      let transported = subgeometry.scaled_inverse_transpose(eta).transpose() * velocity;
      let advective = corner_shape_grads(eta).transpose() * transported;
      for (w, adv) in weights.iter_mut().zip(advective.iter()) {
        *w -= weight * adv;
      }
    }
  }

  /// Recomputes every stencil on the given geometry.
  pub fn refresh(
    &mut self,
    corners: &CornerCoords,
    discretization: &Discretization,
    dofs: &DofInfo,
    field: &AdvectionField,
  ) {
    for ielem in 0..dofs.nelems() {
      let geometry = corners.element_geometry(ielem);
      for islot in 0..self.nslots {
        self.compute_flux_terms(ielem, islot, &geometry, discretization, dofs, field);
      }
      for isubcell in 0..self.nsubcells {
        self.compute_subcell_weights(ielem, isubcell, &geometry, discretization, dofs, field);
      }
    }
  }
}

#[cfg(test)]
mod test {
  use super::{Assembly, Discretization};
  use crate::{
    dofs::DofInfo,
    fe::{BasisKind, ReferenceElement},
    mesh::hyperbox::HyperBoxMeshInfo,
    sparse::{csr_mul, row_sums},
    velocity::AdvectionField,
  };

  use approx::assert_relative_eq;

  fn setup(
    dim: usize,
    nboxes: usize,
    order: usize,
  ) -> (
    crate::mesh::hyperbox::HyperBoxMesh,
    Discretization,
    DofInfo,
  ) {
    let mesh = HyperBoxMeshInfo::new_unit(dim, nboxes).build().unwrap();
    let refelem = ReferenceElement::new(dim, order, BasisKind::Bernstein).unwrap();
    let dofs = DofInfo::new(mesh.topology(), &refelem).unwrap();
    (mesh, Discretization::new(refelem), dofs)
  }

  #[test]
  fn mass_integrates_domain() {
    let (mesh, disc, _) = setup(2, 3, 2);
    let mass = disc.assemble_mass(mesh.corners());
    let lumped = row_sums(&mass);
    assert_relative_eq!(lumped.sum(), 1.0, epsilon = 1e-12);
    assert!(lumped.iter().all(|&m| m > 0.0));
  }

  #[test]
  fn convection_annihilates_constants() {
    let (mesh, disc, _) = setup(2, 2, 3);
    let field = AdvectionField::transport(|x| na::DVector::from_column_slice(&[-x[1], x[0]]));
    let k = disc.assemble_convection(mesh.corners(), &field, None);
    let ones = na::DVector::from_element(k.ncols(), 1.0);
    assert_relative_eq!(csr_mul(&k, &ones), na::DVector::zeros(k.nrows()), epsilon = 1e-12);
  }

  #[test]
  fn segment_flux_terms() {
    let (mesh, disc, dofs) = setup(1, 2, 1);
    let field = AdvectionField::transport(|_| na::DVector::from_element(1, 2.0));
    let mut assembly = Assembly::new(&dofs, false);
    assembly.refresh(mesh.corners(), &disc, &dofs, &field);
    // inflow through the left point of each element, |a n| = 2
    assert_relative_eq!(assembly.bdr_int(0, 0, 0, 0), 2.0);
    assert_relative_eq!(assembly.bdr_int(1, 0, 0, 0), 2.0);
    assert_eq!(assembly.bdr_int(0, 1, 0, 0), 0.0);

    let inflow = disc.assemble_inflow(mesh.corners(), &field, &dofs, &|_| 3.0);
    assert_relative_eq!(inflow, na::DVector::from_column_slice(&[6.0, 0.0, 0.0, 0.0]));
  }

  #[test]
  fn quad_flux_terms_integrate_inflow() {
    let (mesh, disc, dofs) = setup(2, 2, 2);
    let field = AdvectionField::transport(|_| na::DVector::from_column_slice(&[1.0, 0.5]));
    let mut assembly = Assembly::new(&dofs, true);
    assembly.refresh(mesh.corners(), &disc, &dofs, &field);
    let nbdr = dofs.nbdr_dofs();
    let total = |islot: usize| -> f64 {
      (0..nbdr)
        .flat_map(|i| (0..nbdr).map(move |j| (i, j)))
        .map(|(i, j)| assembly.bdr_int(0, islot, i, j))
        .sum()
    };
    // left edge has length 0.5 and a.n = -1, bottom edge a.n = -0.5
    assert_relative_eq!(total(3), 0.5, epsilon = 1e-12);
    assert_relative_eq!(total(0), 0.25, epsilon = 1e-12);
    assert_relative_eq!(total(1), 0.0);
    assert_relative_eq!(total(2), 0.0);
  }

  #[test]
  fn subcell_weights_sum_to_zero() {
    let (mesh, disc, dofs) = setup(2, 1, 2);
    let field = AdvectionField::transport(|_| na::DVector::from_column_slice(&[1.0, 0.0]));
    let mut assembly = Assembly::new(&dofs, true);
    assembly.refresh(mesh.corners(), &disc, &dofs, &field);
    for isubcell in 0..dofs.nsubcells() {
      let weights: Vec<f64> = (0..4).map(|c| assembly.subcell_weight(0, isubcell, c)).collect();
      assert_relative_eq!(weights.iter().sum::<f64>(), 0.0, epsilon = 1e-14);
      // -integral d/dx psi_j over a subcell of width 1/2: -+ 1/4
      assert_relative_eq!(weights[0], 0.25, epsilon = 1e-14);
      assert_relative_eq!(weights[1], -0.25, epsilon = 1e-14);
    }
  }

  #[test]
  fn face_coupling_is_structurally_symmetric() {
    let (mesh, disc, dofs) = setup(2, 2, 1);
    let field = AdvectionField::transport(|_| na::DVector::from_column_slice(&[1.0, 1.0]));
    let mut assembly = Assembly::new(&dofs, false);
    assembly.refresh(mesh.corners(), &disc, &dofs, &field);
    let k = disc.assemble_convection(mesh.corners(), &field, Some((&dofs, &assembly)));
    assert!(crate::sparse::SymmetricOffsets::new(&k).is_ok());
    // interior rows conserve constants, the inflow rows lose the inflow share
    let ones = na::DVector::from_element(k.ncols(), 1.0);
    let k1 = csr_mul(&k, &ones);
    let nd = dofs.ndofs();
    assert_relative_eq!(k1[3 * nd], 0.0, epsilon = 1e-12);
    assert!(k1[0] < 0.0);
  }
}
