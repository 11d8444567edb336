//! Time stepping of a benchmark problem to the final time.

use crate::{
  assemble::Discretization,
  config::{Config, ExecMode},
  dofs::DofInfo,
  error::{ConfigError, Result},
  evolution::EvolutionOperator,
  fe::ReferenceElement,
  geometry::CornerCoords,
  mesh::hyperbox::HyperBoxMesh,
  problems::Problem,
  quadrature::QuadRule,
  time::{self, TimeDependentOperator},
  velocity::AdvectionField,
};

/// Steps between two progress messages.
const LOG_INTERVAL: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LpErrors {
  pub l1: f64,
  /// Sampled at the quadrature points.
  pub linf: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MassReport {
  pub nsteps: usize,
  pub final_time: f64,
  pub initial_mass: f64,
  pub final_mass: f64,
  pub mass_loss: f64,
  pub max_value: f64,
  /// Distance to the initial condition, for the problems that return to it.
  pub errors: Option<LpErrors>,
}

#[derive(Debug)]
pub struct Simulation {
  config: Config,
  problem: Problem,
  refelem: ReferenceElement,
  operator: EvolutionOperator,
  solution: na::DVector<f64>,
  time: f64,
}

impl Simulation {
  pub fn new(config: Config, mesh: &HyperBoxMesh, problem: Problem) -> Result<Self> {
    let scheme = config.resolve()?;
    if problem.exec_mode() != config.exec_mode {
      return Err(
        ConfigError::ExecModeMismatch {
          problem: problem.number(),
          expected: problem.exec_mode(),
          configured: config.exec_mode,
        }
        .into(),
      );
    }
    if problem.dim() != mesh.dim() {
      return Err(
        ConfigError::DimensionMismatch {
          refelem: problem.dim(),
          mesh: mesh.dim(),
        }
        .into(),
      );
    }

    let refelem = ReferenceElement::new(mesh.dim(), config.order, config.basis)?;
    let dofs = DofInfo::new(mesh.topology(), &refelem)?;
    let field = match config.exec_mode {
      ExecMode::Transport => AdvectionField::Transport(problem.velocity_fn()),
      ExecMode::Remap => {
        AdvectionField::remap(mesh.corners(), mesh.boundary_corners(), |x| {
          problem.velocity(x)
        })
      }
    };
    let solution = project_nodal(&refelem, mesh.corners(), |x| problem.initial(x));

    let operator = EvolutionOperator::new(
      scheme,
      dofs,
      Discretization::new(refelem.clone()),
      mesh.corners().clone(),
      field,
      problem.inflow_fn(),
      config.dt,
    )?
    .with_mass_solve(config.mass_solve);

    tracing::info!(
      "problem {} on {} elements of order {}, {:?} with dt={}",
      problem.number(),
      mesh.nelems(),
      config.order,
      config.ode_solver,
      config.dt
    );

    Ok(Self {
      config,
      problem,
      refelem,
      operator,
      solution,
      time: 0.0,
    })
  }

  pub fn solution(&self) -> &na::DVector<f64> {
    &self.solution
  }
  pub fn time(&self) -> f64 {
    self.time
  }
  pub fn operator(&self) -> &EvolutionOperator {
    &self.operator
  }

  fn is_done(&self) -> bool {
    self.time >= self.config.t_final - 1e-8 * self.config.dt
  }

  /// Advances by one step of at most `dt`, without passing the final time.
  pub fn step(&mut self) {
    let dt = self.config.dt.min(self.config.t_final - self.time);
    self.operator.set_dt(dt);
    time::step(
      self.config.ode_solver,
      &mut self.operator,
      &mut self.solution,
      &mut self.time,
      dt,
    );
  }

  pub fn run(&mut self) -> MassReport {
    let initial_mass = self.operator.total_mass(&self.solution);

    let mut nsteps = 0;
    while !self.is_done() {
      self.step();
      nsteps += 1;
      if self.is_done() || nsteps % LOG_INTERVAL == 0 {
        tracing::debug!("time step: {nsteps}, time: {:.6}", self.time);
      }
    }

    if self.problem.exec_mode() == ExecMode::Remap {
      // the last stage may have left the mesh at an intermediate time
      self.operator.set_time(self.time);
      self.operator.update_geometry();
    }
    let final_mass = self.operator.total_mass(&self.solution);
    let errors = self
      .problem
      .is_periodic_in_time()
      .then(|| self.errors_to_initial());

    let report = MassReport {
      nsteps,
      final_time: self.time,
      initial_mass,
      final_mass,
      mass_loss: (initial_mass - final_mass).abs(),
      max_value: self.solution.max(),
      errors,
    };
    tracing::info!(
      "final mass: {:.10}, max value: {:.10}, mass loss: {:.6e}",
      report.final_mass,
      report.max_value,
      report.mass_loss
    );
    if let Some(errors) = report.errors {
      tracing::info!("L1-error: {:.6e}, L-Inf-error: {:.6e}", errors.l1, errors.linf);
    }
    report
  }

  /// Distance of the current solution to the initial condition.
  pub fn errors_to_initial(&self) -> LpErrors {
    let qr = QuadRule::gauss_box(self.refelem.dim(), self.refelem.order() + 2);
    let ndofs = self.refelem.ndofs();
    let corners = self.operator.corners();

    let mut errors = LpErrors { l1: 0.0, linf: 0.0 };
    for ielem in 0..corners.nelems() {
      let geometry = corners.element_geometry(ielem);
      let coeffs = self.solution.rows(ielem * ndofs, ndofs);
      for (xi, weight) in qr.iter() {
        let uh = self.refelem.shapes(xi).dot(&coeffs);
        let diff = (uh - self.problem.initial(geometry.map(xi).as_view())).abs();
        errors.l1 += weight * geometry.det(xi).abs() * diff;
        errors.linf = errors.linf.max(diff);
      }
    }
    errors
  }
}

/// Sets every coefficient to the function value at the reference node of the
/// dof. For the Bernstein basis this is a positivity and bound preserving
/// quasi-interpolation.
pub fn project_nodal<F>(refelem: &ReferenceElement, corners: &CornerCoords, f: F) -> na::DVector<f64>
where
  F: Fn(na::DVectorView<f64>) -> f64,
{
  let ndofs = refelem.ndofs();
  let nodes: Vec<_> = (0..ndofs).map(|idof| refelem.dof_node(idof)).collect();
  let mut coeffs = na::DVector::zeros(corners.nelems() * ndofs);
  for ielem in 0..corners.nelems() {
    let geometry = corners.element_geometry(ielem);
    for (idof, node) in nodes.iter().enumerate() {
      coeffs[ielem * ndofs + idof] = f(geometry.map(node.as_view()).as_view());
    }
  }
  coeffs
}
