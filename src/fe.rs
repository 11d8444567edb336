//! Tensor-product reference element on $[0,1]^d$.
//!
//! The `(p+1)^d` local dofs are ordered lexicographically with the first
//! axis running fastest.

use crate::{
  error::TopologyError,
  mesh::{hyperbox::linear_index2cartesian_index, reference_slots, Side},
  Dim,
};

use num_integer::binomial;

pub type LocalDofIdx = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BasisKind {
  /// Positive basis, required for every monotone scheme.
  #[default]
  Bernstein,
  /// Nodal basis on uniformly spaced closed nodes.
  Lagrange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceElement {
  dim: Dim,
  order: usize,
  basis: BasisKind,
}

// constructors
impl ReferenceElement {
  pub fn new(dim: Dim, order: usize, basis: BasisKind) -> Result<Self, TopologyError> {
    reference_slots(dim)?;
    Ok(Self { dim, order, basis })
  }
}

// getters
impl ReferenceElement {
  pub fn dim(&self) -> Dim {
    self.dim
  }
  pub fn order(&self) -> usize {
    self.order
  }
  pub fn basis(&self) -> BasisKind {
    self.basis
  }
  pub fn nnodes_per_dim(&self) -> usize {
    self.order + 1
  }
  pub fn ndofs(&self) -> usize {
    self.nnodes_per_dim().pow(self.dim as u32)
  }
  /// Number of dofs on every boundary slot.
  pub fn nbdr_dofs(&self) -> usize {
    self.nnodes_per_dim().pow(self.dim as u32 - 1)
  }
  pub fn nslots(&self) -> usize {
    2 * self.dim
  }
  pub fn dof_multi_index(&self, idof: LocalDofIdx) -> na::DVector<usize> {
    linear_index2cartesian_index(idof, self.nnodes_per_dim(), self.dim)
  }
  /// The uniformly spaced reference point of a dof, the center for order 0.
  pub fn dof_node(&self, idof: LocalDofIdx) -> na::DVector<f64> {
    if self.order == 0 {
      return na::DVector::from_element(self.dim, 0.5);
    }
    self.dof_multi_index(idof).map(|i| i as f64 / self.order as f64)
  }
}

impl ReferenceElement {
  pub fn basis_1d(&self, i: usize, t: f64) -> f64 {
    let p = self.order;
    match self.basis {
      BasisKind::Bernstein => bernstein(p, i, t),
      BasisKind::Lagrange => {
        if p == 0 {
          return 1.0;
        }
        let ti = i as f64 / p as f64;
        (0..=p)
          .filter(|&k| k != i)
          .map(|k| {
            let tk = k as f64 / p as f64;
            (t - tk) / (ti - tk)
          })
          .product()
      }
    }
  }

  pub fn basis_1d_deriv(&self, i: usize, t: f64) -> f64 {
    let p = self.order;
    if p == 0 {
      return 0.0;
    }
    match self.basis {
      BasisKind::Bernstein => {
        let lower = if i > 0 { bernstein(p - 1, i - 1, t) } else { 0.0 };
        let upper = if i < p { bernstein(p - 1, i, t) } else { 0.0 };
        p as f64 * (lower - upper)
      }
      BasisKind::Lagrange => {
        let node = |k: usize| k as f64 / p as f64;
        let ti = node(i);
        (0..=p)
          .filter(|&m| m != i)
          .map(|m| {
            let rest: f64 = (0..=p)
              .filter(|&k| k != i && k != m)
              .map(|k| (t - node(k)) / (ti - node(k)))
              .product();
            rest / (ti - node(m))
          })
          .sum()
      }
    }
  }

  /// All basis functions evaluated at the reference point `xi`.
  pub fn shapes(&self, xi: na::DVectorView<f64>) -> na::DVector<f64> {
    let n = self.nnodes_per_dim();
    let values_1d = na::DMatrix::from_fn(self.dim, n, |axis, i| self.basis_1d(i, xi[axis]));
    na::DVector::from_iterator(
      self.ndofs(),
      (0..self.ndofs()).map(|idof| {
        let multi = self.dof_multi_index(idof);
        (0..self.dim).map(|axis| values_1d[(axis, multi[axis])]).product::<f64>()
      }),
    )
  }

  /// Reference gradients of all basis functions, one column per dof.
  pub fn ref_grads(&self, xi: na::DVectorView<f64>) -> na::DMatrix<f64> {
    let n = self.nnodes_per_dim();
    let values_1d = na::DMatrix::from_fn(self.dim, n, |axis, i| self.basis_1d(i, xi[axis]));
    let derivs_1d = na::DMatrix::from_fn(self.dim, n, |axis, i| self.basis_1d_deriv(i, xi[axis]));

    let mut grads = na::DMatrix::zeros(self.dim, self.ndofs());
    for idof in 0..self.ndofs() {
      let multi = self.dof_multi_index(idof);
      for dir in 0..self.dim {
        grads[(dir, idof)] = (0..self.dim)
          .map(|axis| {
            if axis == dir {
              derivs_1d[(axis, multi[axis])]
            } else {
              values_1d[(axis, multi[axis])]
            }
          })
          .product();
      }
    }
    grads
  }

  /// The local dofs on each boundary slot, `bdr_dofs[slot][j]`.
  ///
  /// Opposite slots traverse their facet in opposite directions, so the dof
  /// `j` of a slot coincides with the dof `nbdr_dofs - 1 - j` of the matching
  /// slot of the neighbor. In 2D this is a counter-clockwise traversal.
  pub fn bdr_dofs(&self) -> Result<Vec<Vec<LocalDofIdx>>, TopologyError> {
    let slots = reference_slots(self.dim)?;
    let n = self.nnodes_per_dim();
    let p = self.order;
    let nbdr = self.nbdr_dofs();

    let table = slots
      .iter()
      .map(|slot| {
        let descending = match self.dim {
          2 => (slot.axis == 0) == (slot.side == Side::Lower),
          _ => slot.side == Side::Upper,
        };
        let fixed = match slot.side {
          Side::Lower => 0,
          Side::Upper => p,
        };
        let tangential: Vec<Dim> = (0..self.dim).filter(|&a| a != slot.axis).collect();

        (0..nbdr)
          .map(|j| {
            let jt = if descending { nbdr - 1 - j } else { j };
            let facet_multi = linear_index2cartesian_index(jt, n, self.dim - 1);
            let mut idof = fixed * n.pow(slot.axis as u32);
            for (k, &axis) in tangential.iter().enumerate() {
              idof += facet_multi[k] * n.pow(axis as u32);
            }
            idof
          })
          .collect()
      })
      .collect();
    Ok(table)
  }
}

pub fn bernstein(p: usize, i: usize, t: f64) -> f64 {
  binomial(p, i) as f64 * t.powi(i as i32) * (1.0 - t).powi((p - i) as i32)
}
