use crate::{config::ExecMode, mesh::FaceIdx, Dim, ElemIdx};

use thiserror::Error;

/// Inconsistencies in the mesh connectivity.
///
/// These are detected once, while the dof tables are built, and are fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
  #[error("found multiple common neighbors of elements {elem1} and {elem2} (excluding {elem})")]
  MultipleCommonNeighbors {
    elem: ElemIdx,
    elem1: ElemIdx,
    elem2: ElemIdx,
  },
  #[error("element {neighbor} does not share face {face} with element {elem}")]
  MissingSharedFace {
    elem: ElemIdx,
    neighbor: ElemIdx,
    face: FaceIdx,
  },
  #[error("element {elem} has {actual} boundary slots, expected {expected}")]
  InconsistentSlotCount {
    elem: ElemIdx,
    expected: usize,
    actual: usize,
  },
  #[error("face {face} is referenced by {count} element slots, expected 1 or 2")]
  NonConformingFace { face: FaceIdx, count: usize },
  #[error("mesh has no elements")]
  EmptyMesh,
  #[error("unsupported mesh dimension {0}, only segments, quads and hexes are supported")]
  UnsupportedDimension(Dim),
}

/// Incompatible combinations of discretization options.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("monotonicity treatment requires a Bernstein basis")]
  NonBernsteinBasis,
  #[error("unsupported monotonicity mode code {0}")]
  UnknownMonotonicityMode(usize),
  #[error("unsupported ode solver code {0}")]
  UnknownOdeSolver(usize),
  #[error("time step must be positive, got {0}")]
  NonPositiveTimeStep(f64),
  #[error("final time must be non-negative, got {0}")]
  NegativeFinalTime(f64),
  #[error("reference element dimension {refelem} does not match mesh dimension {mesh}")]
  DimensionMismatch { refelem: Dim, mesh: Dim },
  #[error("remap mode needs a mesh velocity at every element corner")]
  RemapVelocityMissing,
  #[error("problem {0} is not defined in {1} dimension(s)")]
  UnsupportedProblem(usize, Dim),
  #[error("problem {problem} runs in {expected:?} mode, configured for {configured:?}")]
  ExecModeMismatch {
    problem: usize,
    expected: ExecMode,
    configured: ExecMode,
  },
}

/// Sparsity patterns the discrete upwinding cannot operate on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SparsityError {
  #[error("entry ({row},{col}) has no symmetric counterpart ({col},{row})")]
  MissingSymmetricEntry { row: usize, col: usize },
  #[error("row {0} has no diagonal entry")]
  MissingDiagonal(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
  #[error(transparent)]
  Topology(#[from] TopologyError),
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Sparsity(#[from] SparsityError),
}

pub type Result<T> = std::result::Result<T, Error>;
