// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use super::Point;
use crate::RawcodecError;
use crate::Result;

/// Number of entries of a calculated curve
pub const CURVE_SIZE: usize = u16::MAX as usize + 1;

// These are the constant factors for each segment of the curve.
// Each segment i will have the formula:
// f(x) = a[i] + b[i]*(x - x[i]) + c[i]*(x - x[i])^2 + d[i]*(x - x[i])^3
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Segment {
  pub a: f64,
  pub b: f64,
  pub c: f64,
  pub d: f64,
}

impl Segment {
  #[inline(always)]
  fn eval(&self, diff: f64) -> f64 {
    self.a + self.b * diff + self.c * diff * diff + self.d * diff * diff * diff
  }
}

// This is a Natural Cubic Spline. The second derivative at curve ends are zero.
// See https://en.wikipedia.org/wiki/Spline_(mathematics)
// section "Algorithm for computing natural cubic splines"
#[derive(Clone, Debug)]
pub struct Spline {
  xcp: Vec<usize>,
  segments: Vec<Segment>,
}

impl Spline {
  /// Validate the control points and solve the segment coefficients.
  ///
  /// X coordinates must be strictly increasing and span the full 0..=65535
  /// range, Y coordinates must fit into u16.
  pub fn new(control_points: &[Point]) -> Result<Self> {
    if control_points.len() < 2 {
      return Err(RawcodecError::InvalidCurve(format!(
        "Need at least two points to interpolate between, got {}",
        control_points.len()
      )));
    }
    if control_points.first().map(|p| p.x) != Some(0) {
      return Err(RawcodecError::InvalidCurve("First control point must be at x = 0".into()));
    }
    if control_points.last().map(|p| p.x) != Some(u16::MAX as usize) {
      return Err(RawcodecError::InvalidCurve("Last control point must be at x = 65535".into()));
    }
    for pair in control_points.windows(2) {
      if pair[1].x <= pair[0].x {
        return Err(RawcodecError::InvalidCurve(format!("X coordinates must be strictly increasing: {} after {}", pair[1].x, pair[0].x)));
      }
    }
    if let Some(p) = control_points.iter().find(|p| p.y > u16::MAX as usize) {
      return Err(RawcodecError::InvalidCurve(format!("Y coordinate {} out of range", p.y)));
    }

    let num_coords = control_points.len();
    let num_segments = num_coords - 1;

    let xcp: Vec<usize> = control_points.iter().map(|p| p.x).collect();
    let a: Vec<f64> = control_points.iter().map(|p| p.y as f64).collect();
    let mut b = vec![0.0; num_segments];
    let mut c = vec![0.0; num_coords];
    let mut d = vec![0.0; num_segments];

    // Extra values used during computation
    let h: Vec<f64> = xcp.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let mut alpha = vec![0.0; num_segments];
    let mut l = vec![0.0; num_coords];
    let mut mu = vec![0.0; num_coords];
    let mut z = vec![0.0; num_coords];

    for i in 1..num_segments {
      alpha[i] = (3. / h[i]) * (a[i + 1] - a[i]) - (3. / h[i - 1]) * (a[i] - a[i - 1]);
    }

    for i in 1..num_segments {
      l[i] = 2. * (xcp[i + 1] - xcp[i - 1]) as f64 - h[i - 1] * mu[i - 1];
      mu[i] = h[i] / l[i];
      z[i] = (alpha[i] - h[i - 1] * z[i - 1]) / l[i];
    }

    l[num_segments] = 1.;
    z[num_segments] = 0.;
    c[num_segments] = 0.;

    for i in (0..num_segments).rev() {
      c[i] = z[i] - mu[i] * c[i + 1];
      b[i] = (a[i + 1] - a[i]) / h[i] - h[i] * (c[i + 1] + 2. * c[i]) / 3.;
      d[i] = (c[i + 1] - c[i]) / (3. * h[i]);
    }

    let segments = (0..num_segments)
      .map(|i| Segment {
        a: a[i],
        b: b[i],
        c: c[i],
        d: d[i],
      })
      .collect();

    Ok(Self { xcp, segments })
  }

  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  /// Evaluate the spline for every input value 0..=65535.
  pub fn calculate_curve(&self) -> Vec<u16> {
    let mut curve = vec![0; CURVE_SIZE];

    for (i, s) in self.segments.iter().enumerate() {
      for x in self.xcp[i]..=self.xcp[i + 1] {
        let interpolated = s.eval((x - self.xcp[i]) as f64);
        curve[x] = interpolated.round().clamp(0.0, u16::MAX as f64) as u16;
      }
    }

    curve
  }
}
