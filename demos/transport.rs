//! Solid body rotation of the slotted cylinder, cone and hump on the unit
//! square, limited with the subcell residual distribution.

use dgfct::{
  config::{Config, MonotonicityMode},
  mesh::hyperbox::HyperBoxMeshInfo,
  problems::Problem,
  simulation::Simulation,
};

fn main() -> dgfct::Result<()> {
  tracing_subscriber::fmt::init();

  let dim = 2;
  let nboxes_per_dim = 16;
  let problem_number = 4;

  let mesh = HyperBoxMeshInfo::new_unit(dim, nboxes_per_dim).build()?;
  let (bb_min, bb_max) = mesh.bounding_box();
  let problem = Problem::new(problem_number, bb_min, bb_max)?;

  let config = Config {
    order: 2,
    monotonicity: MonotonicityMode::ResidualDistributionFct,
    dt: 0.002,
    t_final: 4.0,
    ..Config::default()
  };
  println!(
    "Transport problem {problem_number} in {dim}D, order {}, {:?}",
    config.order, config.monotonicity
  );

  let mut simulation = Simulation::new(config, &mesh, problem)?;
  let initial_min = simulation.solution().min();
  let initial_max = simulation.solution().max();
  let report = simulation.run();

  println!("steps:        {}", report.nsteps);
  println!("final mass:   {:.10}", report.final_mass);
  println!("mass loss:    {:.3e}", report.mass_loss);
  println!(
    "range:        [{:.6}, {:.6}] (initially [{initial_min:.6}, {initial_max:.6}])",
    simulation.solution().min(),
    report.max_value
  );
  if let Some(errors) = report.errors {
    println!("L1 error:     {:.6e}", errors.l1);
    println!("L-Inf error:  {:.6e}", errors.linf);
  }
  Ok(())
}
