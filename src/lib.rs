extern crate nalgebra as na;
extern crate nalgebra_sparse as nas;

pub mod assemble;
pub mod config;
pub mod dofs;
pub mod error;
pub mod evolution;
pub mod fe;
pub mod geometry;
pub mod lse;
pub mod mesh;
pub mod problems;
pub mod quadrature;
pub mod simulation;
pub mod sparse;
pub mod time;
pub mod velocity;

pub use error::{Error, Result};

pub type Dim = usize;
pub type ElemIdx = usize;
pub type DofIdx = usize;
