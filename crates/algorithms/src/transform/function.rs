//! Piecewise transform functions
//!
//! A transform maps a raw criterion measurement (slope, HAND, distance)
//! to a normalized evidence value, interpolating between ordered control
//! points. Values outside the control-point range evaluate to a constant
//! fill (0.0 unless configured otherwise); NaN inputs stay NaN.

use riparia_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Interpolation kind between control points.
///
/// `Polynomial` is recognized by the configuration schema but has no
/// evaluator; the store loader rejects it before a function is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    Linear,
    Nearest,
    Cubic,
    Polynomial,
}

impl TransformKind {
    /// Parse the configuration store's type name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "linear" => Some(TransformKind::Linear),
            "nearest" => Some(TransformKind::Nearest),
            "cubic" => Some(TransformKind::Cubic),
            "polynomial" => Some(TransformKind::Polynomial),
            _ => None,
        }
    }
}

/// A piecewise interpolation function over ordered control points.
///
/// Control points must be strictly increasing in input value. Inside the
/// range, the configured interpolation kind applies and declared control
/// points evaluate exactly to their outputs; outside, the fill constant.
#[derive(Debug, Clone)]
pub struct TransformFunction {
    kind: TransformKind,
    xs: Vec<f64>,
    ys: Vec<f64>,
    fill: f64,
    /// Second derivatives at the knots (cubic only, natural boundary)
    second_derivs: Vec<f64>,
}

impl TransformFunction {
    /// Build a transform from (input, output) control points.
    ///
    /// Errors if there are fewer than 2 points, inputs are not strictly
    /// increasing, the kind is `Polynomial`, or a cubic transform has
    /// fewer than 4 points.
    pub fn new(kind: TransformKind, points: &[(f64, f64)]) -> Result<Self> {
        Self::with_fill(kind, points, 0.0)
    }

    /// Like [`Self::new`] with an explicit out-of-range fill constant
    pub fn with_fill(kind: TransformKind, points: &[(f64, f64)], fill: f64) -> Result<Self> {
        if kind == TransformKind::Polynomial {
            return Err(Error::Configuration(
                "transform kind 'Polynomial' is recognized but not implemented".to_string(),
            ));
        }
        if points.len() < 2 {
            return Err(Error::Configuration(format!(
                "transform needs at least 2 control points, got {}",
                points.len()
            )));
        }
        if kind == TransformKind::Cubic && points.len() < 4 {
            return Err(Error::Configuration(format!(
                "cubic transform needs at least 4 control points, got {}",
                points.len()
            )));
        }
        for pair in points.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(Error::Configuration(format!(
                    "transform control points must be strictly increasing in input value \
                     ({} then {})",
                    pair[0].0, pair[1].0
                )));
            }
        }

        let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
        let second_derivs = if kind == TransformKind::Cubic {
            natural_spline_second_derivs(&xs, &ys)
        } else {
            Vec::new()
        };

        Ok(Self {
            kind,
            xs,
            ys,
            fill,
            second_derivs,
        })
    }

    /// Interpolation kind of this transform
    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    /// Out-of-range fill constant
    pub fn fill(&self) -> f64 {
        self.fill
    }

    /// Evaluate at one input value. NaN propagates; values outside the
    /// control-point range return the fill constant.
    pub fn evaluate(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let n = self.xs.len();
        if x < self.xs[0] || x > self.xs[n - 1] {
            return self.fill;
        }

        // Rightmost interval i with xs[i] <= x
        let i = match self
            .xs
            .binary_search_by(|probe| probe.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Less))
        {
            Ok(exact) => return self.ys[exact],
            Err(ins) => ins - 1,
        };
        let i = i.min(n - 2);

        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        let t = (x - x0) / (x1 - x0);

        match self.kind {
            TransformKind::Linear => y0 + t * (y1 - y0),
            TransformKind::Nearest => {
                if t < 0.5 {
                    y0
                } else {
                    y1
                }
            }
            TransformKind::Cubic => {
                let h = x1 - x0;
                let a = 1.0 - t;
                let b = t;
                a * y0
                    + b * y1
                    + ((a * a * a - a) * self.second_derivs[i]
                        + (b * b * b - b) * self.second_derivs[i + 1])
                        * (h * h)
                        / 6.0
            }
            TransformKind::Polynomial => unreachable!("rejected at construction"),
        }
    }

    /// Evaluate over a whole array, element-wise
    pub fn evaluate_array(&self, values: &Array2<f64>) -> Array2<f64> {
        values.mapv(|v| self.evaluate(v))
    }
}

/// Second derivatives of the natural cubic spline through the knots
/// (tridiagonal solve, zero curvature at both ends)
fn natural_spline_second_derivs(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut m = vec![0.0; n];
    let mut u = vec![0.0; n];

    for i in 1..n - 1 {
        let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
        let p = sig * m[i - 1] + 2.0;
        m[i] = (sig - 1.0) / p;
        let d = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
            - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
        u[i] = (6.0 * d / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
    }

    for i in (1..n - 1).rev() {
        m[i] = m[i] * m[i + 1] + u[i];
    }
    m[0] = 0.0;
    m[n - 1] = 0.0;
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_0_10() -> TransformFunction {
        TransformFunction::new(TransformKind::Linear, &[(0.0, 0.0), (10.0, 1.0)]).unwrap()
    }

    #[test]
    fn test_control_points_evaluate_exactly() {
        let points = [(0.0, 1.0), (5.0, 0.5), (12.0, 0.1), (20.0, 0.0)];
        for kind in [TransformKind::Linear, TransformKind::Nearest, TransformKind::Cubic] {
            let f = TransformFunction::new(kind, &points).unwrap();
            for &(x, y) in &points {
                assert_relative_eq!(f.evaluate(x), y, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_linear_interpolation_between_points() {
        let f = linear_0_10();
        assert_relative_eq!(f.evaluate(5.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(f.evaluate(2.5), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_range_is_fill() {
        let f = linear_0_10();
        assert_eq!(f.evaluate(-0.001), 0.0);
        assert_eq!(f.evaluate(10.001), 0.0);

        let g =
            TransformFunction::with_fill(TransformKind::Linear, &[(0.0, 0.0), (10.0, 1.0)], 0.25)
                .unwrap();
        assert_eq!(g.evaluate(-5.0), 0.25);
    }

    #[test]
    fn test_boundary_value_is_inside_range() {
        // Exactly at the last control point is in range, not fill
        let f = linear_0_10();
        assert_relative_eq!(f.evaluate(10.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(f.evaluate(0.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(linear_0_10().evaluate(f64::NAN).is_nan());
    }

    #[test]
    fn test_nearest_picks_closest_knot() {
        let f = TransformFunction::new(TransformKind::Nearest, &[(0.0, 0.0), (10.0, 1.0)]).unwrap();
        assert_eq!(f.evaluate(2.0), 0.0);
        assert_eq!(f.evaluate(8.0), 1.0);
    }

    #[test]
    fn test_cubic_monotone_inputs_stay_bounded_near_knots() {
        let f = TransformFunction::new(
            TransformKind::Cubic,
            &[(0.0, 1.0), (2.0, 0.8), (6.0, 0.3), (12.0, 0.0)],
        )
        .unwrap();
        // Natural spline interpolates the knots and stays finite in between
        for x in [0.5, 1.0, 3.0, 5.0, 8.0, 11.0] {
            let y = f.evaluate(x);
            assert!(y.is_finite());
            assert!(y > -0.5 && y < 1.5, "cubic ran away at x={}: {}", x, y);
        }
    }

    #[test]
    fn test_rejects_bad_definitions() {
        assert!(TransformFunction::new(TransformKind::Linear, &[(0.0, 0.0)]).is_err());
        assert!(
            TransformFunction::new(TransformKind::Linear, &[(0.0, 0.0), (0.0, 1.0)]).is_err()
        );
        assert!(
            TransformFunction::new(TransformKind::Linear, &[(5.0, 0.0), (1.0, 1.0)]).is_err()
        );
        assert!(
            TransformFunction::new(TransformKind::Cubic, &[(0.0, 0.0), (1.0, 1.0)]).is_err()
        );
        assert!(
            TransformFunction::new(TransformKind::Polynomial, &[(0.0, 0.0), (1.0, 1.0)]).is_err()
        );
    }

    #[test]
    fn test_evaluate_array_masks_nan() {
        let f = linear_0_10();
        let mut input = Array2::from_elem((2, 2), 5.0);
        input[[1, 1]] = f64::NAN;
        let out = f.evaluate_array(&input);
        assert_relative_eq!(out[[0, 0]], 0.5, epsilon = 1e-12);
        assert!(out[[1, 1]].is_nan());
    }
}
