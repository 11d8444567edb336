//! Discretization options and their resolution into a limiting scheme.

use crate::{error::ConfigError, fe::BasisKind, lse::NeumannParams};

/// Monotonicity treatment, with the classic integer codes `0..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonotonicityMode {
  None,
  DiscreteUpwind,
  DiscreteUpwindFct,
  ResidualDistribution,
  #[default]
  ResidualDistributionFct,
}
impl TryFrom<usize> for MonotonicityMode {
  type Error = ConfigError;
  fn try_from(code: usize) -> Result<Self, Self::Error> {
    match code {
      0 => Ok(Self::None),
      1 => Ok(Self::DiscreteUpwind),
      2 => Ok(Self::DiscreteUpwindFct),
      3 => Ok(Self::ResidualDistribution),
      4 => Ok(Self::ResidualDistributionFct),
      _ => Err(ConfigError::UnknownMonotonicityMode(code)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
  /// Fixed mesh, prescribed velocity.
  #[default]
  Transport,
  /// Moving mesh, fixed solution.
  Remap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OdeSolverKind {
  ForwardEuler,
  Rk2,
  #[default]
  SspRk3,
  Rk4,
  Rk6,
}
impl TryFrom<usize> for OdeSolverKind {
  type Error = ConfigError;
  fn try_from(code: usize) -> Result<Self, Self::Error> {
    match code {
      1 => Ok(Self::ForwardEuler),
      2 => Ok(Self::Rk2),
      3 => Ok(Self::SspRk3),
      4 => Ok(Self::Rk4),
      6 => Ok(Self::Rk6),
      _ => Err(ConfigError::UnknownOdeSolver(code)),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
  pub order: usize,
  pub monotonicity: MonotonicityMode,
  /// Partitioned discrete upwinding, or the subcell residual distribution.
  pub optimized_scheme: bool,
  pub exec_mode: ExecMode,
  pub basis: BasisKind,
  pub ode_solver: OdeSolverKind,
  pub dt: f64,
  pub t_final: f64,
  pub mass_solve: NeumannParams,
}
impl Default for Config {
  fn default() -> Self {
    Self {
      order: 3,
      monotonicity: MonotonicityMode::default(),
      optimized_scheme: true,
      exec_mode: ExecMode::default(),
      basis: BasisKind::default(),
      ode_solver: OdeSolverKind::default(),
      dt: 0.0025,
      t_final: 2.0,
      mass_solve: NeumannParams::default(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowOrderKind {
  DiscreteUpwind,
  ResidualDistribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowOrder {
  pub kind: LowOrderKind,
  /// Partitioned discrete upwinding with lumped face fluxes, or subcell
  /// residual distribution.
  pub optimized: bool,
}
impl LowOrder {
  /// Face terms enter through flux lumping instead of the discretization
  /// matrix.
  pub fn needs_flux_lumping(&self) -> bool {
    self.optimized || self.kind == LowOrderKind::ResidualDistribution
  }
  pub fn needs_subcells(&self) -> bool {
    self.optimized && self.kind == LowOrderKind::ResidualDistribution
  }
}

/// How a right-hand side evaluation combines the updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
  HighOrderOnly,
  LowOrderOnly(LowOrder),
  Blended(LowOrder),
}
impl Scheme {
  pub fn low_order(&self) -> Option<LowOrder> {
    match *self {
      Scheme::HighOrderOnly => None,
      Scheme::LowOrderOnly(lo) | Scheme::Blended(lo) => Some(lo),
    }
  }

  /// The discretization matrix carries the upwind face coupling itself.
  pub fn face_terms_in_matrix(&self) -> bool {
    self
      .low_order()
      .is_some_and(|lo| !lo.needs_flux_lumping())
  }

  pub fn needs_subcells(&self) -> bool {
    self.low_order().is_some_and(|lo| lo.needs_subcells())
  }
}

impl Config {
  /// Validates the options and selects the scheme, downgrading where the
  /// polynomial order does not support the requested treatment.
  pub fn resolve(&self) -> Result<Scheme, ConfigError> {
    if self.dt <= 0.0 || !self.dt.is_finite() {
      return Err(ConfigError::NonPositiveTimeStep(self.dt));
    }
    if self.t_final < 0.0 {
      return Err(ConfigError::NegativeFinalTime(self.t_final));
    }

    let kind = match self.monotonicity {
      MonotonicityMode::None => return Ok(Scheme::HighOrderOnly),
      MonotonicityMode::DiscreteUpwind | MonotonicityMode::DiscreteUpwindFct => {
        LowOrderKind::DiscreteUpwind
      }
      MonotonicityMode::ResidualDistribution | MonotonicityMode::ResidualDistributionFct => {
        LowOrderKind::ResidualDistribution
      }
    };
    if self.basis != BasisKind::Bernstein {
      return Err(ConfigError::NonBernsteinBasis);
    }
    if self.order == 0 {
      tracing::warn!("monotonicity treatment is disabled for piecewise constants");
      return Ok(Scheme::HighOrderOnly);
    }

    let mut optimized = self.optimized_scheme;
    if kind == LowOrderKind::ResidualDistribution && self.order == 1 && optimized {
      tracing::warn!("subcell scheme is disabled for linear elements");
      optimized = false;
    }

    let low_order = LowOrder { kind, optimized };
    Ok(match self.monotonicity {
      MonotonicityMode::DiscreteUpwind | MonotonicityMode::ResidualDistribution => {
        Scheme::LowOrderOnly(low_order)
      }
      _ => Scheme::Blended(low_order),
    })
  }
}
