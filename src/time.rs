//! Explicit Runge-Kutta integration of $dot(u) = f(u, t)$.

use crate::config::OdeSolverKind;

/// The right-hand side of an autonomous-in-form ODE, with the time of the
/// evaluation set beforehand.
pub trait TimeDependentOperator {
  fn set_time(&mut self, t: f64);
  fn time(&self) -> f64;
  fn mult(&mut self, x: &na::DVector<f64>) -> na::DVector<f64>;

  /// Evaluates the right-hand side at time `t`.
  fn eval_at(&mut self, x: &na::DVector<f64>, t: f64) -> na::DVector<f64> {
    self.set_time(t);
    self.mult(x)
  }
}

/// Advances `x` from `t` to `t + dt`, passing the stage times to the operator.
pub fn step(
  kind: OdeSolverKind,
  op: &mut dyn TimeDependentOperator,
  x: &mut na::DVector<f64>,
  t: &mut f64,
  dt: f64,
) {
  match kind {
    OdeSolverKind::ForwardEuler => forward_euler_step(op, x, *t, dt),
    OdeSolverKind::Rk2 => rk2_step(op, x, *t, dt),
    OdeSolverKind::SspRk3 => ssp_rk3_step(op, x, *t, dt),
    OdeSolverKind::Rk4 => rk4_step(op, x, *t, dt),
    OdeSolverKind::Rk6 => rk6_step(op, x, *t, dt),
  }
  *t += dt;
  op.set_time(*t);
}

pub fn forward_euler_step(
  op: &mut dyn TimeDependentOperator,
  x: &mut na::DVector<f64>,
  t: f64,
  dt: f64,
) {
  let k = op.eval_at(x, t);
  x.axpy(dt, &k, 1.0);
}

/// Heun's method, the second order SSP scheme.
pub fn rk2_step(op: &mut dyn TimeDependentOperator, x: &mut na::DVector<f64>, t: f64, dt: f64) {
  let k1 = op.eval_at(x, t);
  let x1 = &*x + dt * &k1;
  let k2 = op.eval_at(&x1, t + dt);
  x.axpy(0.5 * dt, &k1, 1.0);
  x.axpy(0.5 * dt, &k2, 1.0);
}

/// Shu-Osher form with stage times `t`, `t + dt` and `t + dt/2`.
pub fn ssp_rk3_step(
  op: &mut dyn TimeDependentOperator,
  x: &mut na::DVector<f64>,
  t: f64,
  dt: f64,
) {
  let k = op.eval_at(x, t);
  let mut y = &*x + dt * k;

  let k = op.eval_at(&y, t + dt);
  y = 0.75 * &*x + 0.25 * (y + dt * k);

  let k = op.eval_at(&y, t + 0.5 * dt);
  *x = (1.0 / 3.0) * &*x + (2.0 / 3.0) * (y + dt * k);
}

pub fn rk4_step(op: &mut dyn TimeDependentOperator, x: &mut na::DVector<f64>, t: f64, dt: f64) {
  let k1 = op.eval_at(x, t);
  let k2 = op.eval_at(&(&*x + 0.5 * dt * &k1), t + 0.5 * dt);
  let k3 = op.eval_at(&(&*x + 0.5 * dt * &k2), t + 0.5 * dt);
  let k4 = op.eval_at(&(&*x + dt * &k3), t + dt);
  *x += (dt / 6.0) * (k1 + 2.0 * k2 + 2.0 * k3 + k4);
}

/// Verner's eight stage, sixth order pair, the sixth order weights.
pub fn rk6_step(op: &mut dyn TimeDependentOperator, x: &mut na::DVector<f64>, t: f64, dt: f64) {
  const A: [&[f64]; 7] = [
    &[0.06],
    &[0.019239962962962962, 0.07669337037037037],
    &[0.035975, 0.0, 0.107925],
    &[1.3186834152331483, 0.0, -5.042058063628562, 4.220674648395414],
    &[
      -41.87259166432751,
      0.0,
      159.43256216313749,
      -122.11921356501003,
      5.531743066200054,
    ],
    &[
      -54.430156935316504,
      0.0,
      207.06725136501846,
      -158.610813784590,
      6.991816585950242,
      -0.018597231062203234,
    ],
    &[
      -54.66374178728198,
      0.0,
      207.95280625538937,
      -159.2889574744995,
      7.018743740796944,
      -0.018338785905045723,
      -0.0005119484997882099,
    ],
  ];
  const B: [f64; 8] = [
    0.03438957868357036,
    0.0,
    0.0,
    0.25826245556335034,
    0.42093711896735373,
    4.40539646966931,
    -176.48311902429866,
    172.36413340141507,
  ];
  const C: [f64; 7] = [0.06, 0.09593333333333333, 0.1439, 0.4973, 0.9725, 0.9995, 1.0];

  let mut ks = Vec::with_capacity(B.len());
  ks.push(op.eval_at(x, t));
  for (row, c) in A.iter().zip(C) {
    let mut stage = x.clone();
    for (a, k) in row.iter().zip(&ks) {
      stage.axpy(dt * a, k, 1.0);
    }
    ks.push(op.eval_at(&stage, t + c * dt));
  }
  for (b, k) in B.iter().zip(&ks) {
    x.axpy(dt * b, k, 1.0);
  }
}

#[cfg(test)]
mod test {
  use super::{step, TimeDependentOperator};
  use crate::config::OdeSolverKind;

  use approx::assert_relative_eq;

  /// $dot(u) = lambda u + t$
  struct Linear {
    lambda: f64,
    t: f64,
  }
  impl TimeDependentOperator for Linear {
    fn set_time(&mut self, t: f64) {
      self.t = t;
    }
    fn time(&self) -> f64 {
      self.t
    }
    fn mult(&mut self, x: &na::DVector<f64>) -> na::DVector<f64> {
      x.map(|v| self.lambda * v + self.t)
    }
  }

  fn solve(kind: OdeSolverKind, nsteps: usize) -> f64 {
    let mut op = Linear { lambda: -1.0, t: 0.0 };
    let mut x = na::DVector::from_element(1, 1.0);
    let mut t = 0.0;
    let dt = 1.0 / nsteps as f64;
    for _ in 0..nsteps {
      step(kind, &mut op, &mut x, &mut t, dt);
    }
    assert_relative_eq!(t, 1.0, epsilon = 1e-12);
    assert_relative_eq!(op.time(), t);
    x[0]
  }

  #[test]
  fn convergence_orders() {
    // u(t) = t - 1 + 2 e^(-t)
    let exact = 2.0 * (-1.0f64).exp();
    let cases = [
      (OdeSolverKind::ForwardEuler, 1),
      (OdeSolverKind::Rk2, 2),
      (OdeSolverKind::SspRk3, 3),
      (OdeSolverKind::Rk4, 4),
    ];
    for (kind, order) in cases {
      let coarse = (solve(kind, 20) - exact).abs();
      let fine = (solve(kind, 40) - exact).abs();
      let rate = (coarse / fine).log2();
      assert!((rate - order as f64).abs() < 0.3, "{kind:?}: rate {rate}");
    }
  }

  #[test]
  fn sixth_order_on_coarse_steps() {
    let exact = 2.0 * (-1.0f64).exp();
    let coarse = (solve(OdeSolverKind::Rk6, 3) - exact).abs();
    let fine = (solve(OdeSolverKind::Rk6, 6) - exact).abs();
    let rate = (coarse / fine).log2();
    assert!((rate - 6.0).abs() < 0.5, "rate {rate}");
  }
}
