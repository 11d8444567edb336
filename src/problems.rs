//! The benchmark problems: velocity fields, initial conditions and inflow.
//!
//! All fields are given on the reference domain $[-1,1]^d$, to which the
//! bounding box of the mesh is mapped. Problems `0..=5` are transport
//! problems, `10..=15` remap the initial condition of problem `n - 10` on a
//! mesh moving with a Taylor-Green velocity.

use crate::{config::ExecMode, error::ConfigError, velocity::VelocityFn, Dim};

use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
  number: usize,
  dim: Dim,
  bb_min: na::DVector<f64>,
  bb_max: na::DVector<f64>,
}

impl Problem {
  pub fn new(
    number: usize,
    bb_min: na::DVector<f64>,
    bb_max: na::DVector<f64>,
  ) -> Result<Self, ConfigError> {
    let dim = bb_min.len();
    assert_eq!(bb_max.len(), dim);

    let initial = number % 10;
    let supported = matches!(number, 0..=5 | 10..=15)
      && (1..=3).contains(&dim)
      && (dim > 1 || (number < 10 && initial <= 1));
    if !supported {
      return Err(ConfigError::UnsupportedProblem(number, dim));
    }
    Ok(Self {
      number,
      dim,
      bb_min,
      bb_max,
    })
  }

  pub fn number(&self) -> usize {
    self.number
  }
  pub fn dim(&self) -> Dim {
    self.dim
  }
  pub fn exec_mode(&self) -> ExecMode {
    if self.number < 10 {
      ExecMode::Transport
    } else {
      ExecMode::Remap
    }
  }

  /// The final state equals the initial one, after a full revolution.
  pub fn is_periodic_in_time(&self) -> bool {
    self.number == 4
  }

  fn to_reference(&self, x: na::DVectorView<f64>) -> na::DVector<f64> {
    na::DVector::from_fn(self.dim, |i, _| {
      let center = 0.5 * (self.bb_min[i] + self.bb_max[i]);
      2.0 * (x[i] - center) / (self.bb_max[i] - self.bb_min[i])
    })
  }

  /// Transport velocity, or mesh velocity for the remap problems.
  pub fn velocity(&self, x: na::DVectorView<f64>) -> na::DVector<f64> {
    let xr = self.to_reference(x);
    let dim = self.dim;
    let mut v = na::DVector::zeros(dim);
    if dim == 1 && self.number < 10 {
      v[0] = 1.0;
      return v;
    }

    match self.number {
      0 => {
        let weights: &[f64] = match dim {
          2 => &[2.0 / 3.0, 1.0 / 3.0],
          _ => &[3.0 / 6.0, 2.0 / 6.0, 1.0 / 6.0],
        };
        for (vi, w) in v.iter_mut().zip(weights) {
          *vi = w.sqrt();
        }
      }
      1 | 2 | 4 => {
        let w = PI / 2.0;
        v[0] = -w * xr[1];
        v[1] = w * xr[0];
      }
      3 => {
        let w = PI / 2.0;
        let d = ((xr[0] + 1.0) * (1.0 - xr[0])).max(0.0) * ((xr[1] + 1.0) * (1.0 - xr[1])).max(0.0);
        let d = d * d;
        v[0] = d * w * xr[1];
        v[1] = -d * w * xr[0];
      }
      5 => v.fill(1.0),
      _ => {
        // Taylor-Green on [0,1]^d
        let xs = xr.map(|c| 0.5 * c + 0.5);
        v[0] = (PI * xs[0]).sin() * (PI * xs[1]).cos();
        v[1] = -(PI * xs[0]).cos() * (PI * xs[1]).sin();
        if dim == 3 {
          let cz = (PI * xs[2]).cos();
          v[0] *= cz;
          v[1] *= cz;
        }
      }
    }
    v
  }

  pub fn velocity_fn(&self) -> VelocityFn {
    let problem = self.clone();
    Box::new(move |x: na::DVectorView<f64>| problem.velocity(x))
  }

  pub fn initial(&self, x: na::DVectorView<f64>) -> f64 {
    let xr = self.to_reference(x);
    match self.number % 10 {
      0 | 1 => smooth_bump(&xr),
      2 => {
        let rho = xr[0].hypot(xr[1]);
        let phi = xr[1].atan2(xr[0]);
        (PI * rho).sin().powi(2) * (3.0 * phi).sin()
      }
      3 => 0.5 * ((PI * xr[0]).sin() * (PI * xr[1]).sin() + 1.0),
      4 => slotted_cylinder_cone_hump(xr[0], xr[1]),
      _ => {
        let y = xr.map(|c| 50.0 * (c + 1.0));
        if self.dim == 2 {
          cross_and_rings(&y)
        } else {
          cross_and_shells(&y)
        }
      }
    }
  }

  pub fn initial_fn(&self) -> Box<dyn Fn(na::DVectorView<f64>) -> f64> {
    let problem = self.clone();
    Box::new(move |x: na::DVectorView<f64>| problem.initial(x))
  }

  /// Inflow boundary data, zero for every problem.
  pub fn inflow(&self, _x: na::DVectorView<f64>) -> f64 {
    0.0
  }

  pub fn inflow_fn(&self) -> crate::assemble::InflowFn {
    let problem = self.clone();
    Box::new(move |x: na::DVectorView<f64>| problem.inflow(x))
  }
}

fn smooth_bump(x: &na::DVector<f64>) -> f64 {
  if x.len() == 1 {
    return (-40.0 * (x[0] - 0.5).powi(2)).exp();
  }
  let (mut rx, mut ry, cx, cy, w) = (0.45, 0.25, 0.0, -0.2, 10.0);
  if x.len() == 3 {
    let s = 1.0 + 0.25 * (2.0 * PI * x[2]).cos();
    rx *= s;
    ry *= s;
  }
  erfc(w * (x[0] - cx - rx))
    * erfc(-w * (x[0] - cx + rx))
    * erfc(w * (x[1] - cy - ry))
    * erfc(-w * (x[1] - cy + ry))
    / 16.0
}

/// Zalesak's slotted cylinder, a cone and a smooth hump.
fn slotted_cylinder_cone_hump(x: f64, y: f64) -> f64 {
  let scale: f64 = 0.0225;
  let coef = 0.5 / scale.sqrt();
  let inside = |cx: f64, cy: f64| (x - cx).powi(2) + (y - cy).powi(2) <= 4.0 * scale;

  let slit = x <= -0.05 || x >= 0.05 || y >= 0.7;
  if slit && inside(0.0, 0.5) {
    return 1.0;
  }
  let mut value = 0.0;
  if inside(0.0, -0.5) {
    value += 1.0 - coef * x.hypot(y + 0.5);
  }
  if inside(-0.5, 0.0) {
    value += 0.25 * (1.0 + (PI * coef * (x + 0.5).hypot(y)).cos());
  }
  value
}

/// Indicator of the rotated rectangle `[min, max]`, rotated by `theta` degrees
/// around `origin`.
fn rotated_box(min: [f64; 2], max: [f64; 2], theta: f64, origin: [f64; 2], p: [f64; 2]) -> f64 {
  let (s, c) = theta.to_radians().sin_cos();
  let (dx, dy) = (p[0] - origin[0], p[1] - origin[1]);
  let xn = c * dx - s * dy + origin[0];
  let yn = s * dx + c * dy + origin[1];
  let inside = xn > min[0] && xn < max[0] && yn > min[1] && yn < max[1];
  inside as u8 as f64
}

fn rotated_box3(
  min: [f64; 3],
  max: [f64; 3],
  theta: f64,
  origin: [f64; 2],
  p: &na::DVector<f64>,
) -> f64 {
  let in_z = p[2] > min[2] && p[2] < max[2];
  in_z as u8 as f64 * rotated_box([min[0], min[1]], [max[0], max[1]], theta, origin, [p[0], p[1]])
}

fn union(a: f64, b: f64) -> f64 {
  a + b - a * b
}

fn annulus(rin: f64, rout: f64, center: &[f64], p: &na::DVector<f64>) -> f64 {
  let r = p
    .iter()
    .zip(center)
    .map(|(a, b)| (a - b).powi(2))
    .sum::<f64>()
    .sqrt();
  (r > rin && r < rout) as u8 as f64
}

fn cross_and_rings(y: &na::DVector<f64>) -> f64 {
  let p = [y[0], y[1]];
  let origin = [15.5, 11.5];
  let rect1 = rotated_box([14.0, 3.0], [17.0, 26.0], -45.0, origin, p);
  let rect2 = rotated_box([7.0, 10.0], [32.0, 13.0], -45.0, origin, p);
  let ring1 = annulus(7.0, 10.0, &[40.0, 40.0], y);
  let ring2 = annulus(3.0, 7.0, &[40.0, 20.0], y);
  union(rect1, rect2) + ring1 + ring2
}

fn cross_and_shells(y: &na::DVector<f64>) -> f64 {
  let origin = [15.5, 11.5];
  let rect1 = rotated_box3([7.0, 10.0, 10.0], [32.0, 13.0, 13.0], -45.0, origin, y);
  let rect2 = rotated_box3([14.0, 3.0, 10.0], [17.0, 26.0, 13.0], -45.0, origin, y);
  let rect3 = rotated_box3([14.0, 10.0, 3.0], [17.0, 13.0, 26.0], -45.0, origin, y);
  let cross = union(union(rect1, rect2), rect3);

  let c1 = [40.0, 40.0, 40.0];
  let c2 = [40.0, 20.0, 20.0];
  let dom2 = cross + annulus(7.0, 10.0, &c1, y) + annulus(3.0, 7.0, &c2, y);

  let rect1 = rotated_box3([2.0, 30.0, 30.0], [27.0, 33.0, 33.0], 0.0, [0.0, 0.0], y);
  let rect2 = rotated_box3([9.0, 23.0, 30.0], [12.0, 46.0, 33.0], 0.0, [0.0, 0.0], y);
  let rect3 = rotated_box3([9.0, 30.0, 23.0], [12.0, 33.0, 46.0], 0.0, [0.0, 0.0], y);
  let cross = union(union(rect1, rect2), rect3);
  let dom3 = cross
    + annulus(0.0, 7.0, &c1, y)
    + annulus(0.0, 3.0, &c2, y)
    + annulus(7.0, 10.0, &c2, y);

  let dom1 = 1.0 - union(dom2, dom3);
  dom1 + 2.0 * dom2 + 3.0 * dom3
}

/// Complementary error function, with a relative error below `1.2e-7`
/// (Chebyshev fit of Numerical Recipes).
pub fn erfc(x: f64) -> f64 {
  let z = x.abs();
  let t = 1.0 / (1.0 + 0.5 * z);
  let poly = -z * z - 1.26551223
    + t * (1.00002368
      + t * (0.37409196
        + t * (0.09678418
          + t * (-0.18628806
            + t * (0.27886807
              + t * (-1.13520398 + t * (1.48851587 + t * (-0.82215223 + t * 0.17087277))))))));
  let value = t * poly.exp();
  if x >= 0.0 {
    value
  } else {
    2.0 - value
  }
}
