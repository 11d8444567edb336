//! Remaps the smooth bump onto a mesh deformed by a Taylor-Green motion.

use dgfct::{
  config::{Config, ExecMode, MonotonicityMode},
  mesh::hyperbox::HyperBoxMeshInfo,
  problems::Problem,
  simulation::Simulation,
};

fn main() -> dgfct::Result<()> {
  tracing_subscriber::fmt::init();

  let mesh = HyperBoxMeshInfo::new_unit(2, 8).build()?;
  let (bb_min, bb_max) = mesh.bounding_box();
  let problem = Problem::new(11, bb_min, bb_max)?;

  for monotonicity in [
    MonotonicityMode::None,
    MonotonicityMode::DiscreteUpwindFct,
    MonotonicityMode::ResidualDistributionFct,
  ] {
    let config = Config {
      order: 2,
      monotonicity,
      exec_mode: ExecMode::Remap,
      dt: 0.005,
      t_final: 0.5,
      ..Config::default()
    };
    let mut simulation = Simulation::new(config, &mesh, problem.clone())?;
    let report = simulation.run();
    println!(
      "{monotonicity:?}: mass loss {:.3e}, range [{:.6}, {:.6}]",
      report.mass_loss,
      simulation.solution().min(),
      report.max_value,
    );
  }
  Ok(())
}
