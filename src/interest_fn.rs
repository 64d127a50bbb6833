use serde::{Deserialize, Serialize};

use crate::errors::{ModeError, Result};

/// Piecewise-linear fuzzy membership function mapping a raw attribute distance into [0,1].
///
/// Breakpoints are `[x, y]` pairs with strictly increasing `x`. Inputs left of the first
/// breakpoint take its `y`, inputs right of the last take the last `y`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PiecewiseLinear {
    points: Vec<[f64; 2]>,
}

impl PiecewiseLinear {
    pub fn new(points: Vec<[f64; 2]>) -> Result<Self> {
        let f = Self { points };
        f.validate("interest function")?;
        Ok(f)
    }

    /// Constructor for the built-in defaults, which are known to be well formed
    pub(crate) fn from_points(points: &[(f64, f64)]) -> Self {
        Self {
            points: points.iter().map(|&(x, y)| [x, y]).collect(),
        }
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    /// Check breakpoint ordering and range
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.points.is_empty() {
            return Err(ModeError::Config(format!(
                "{} must have at least one breakpoint",
                name
            )));
        }

        for [x, y] in &self.points {
            if !x.is_finite() || !y.is_finite() {
                return Err(ModeError::Config(format!(
                    "{} has a non-finite breakpoint",
                    name
                )));
            }
            if !(0.0..=1.0).contains(y) {
                return Err(ModeError::Config(format!(
                    "{} breakpoint value {} is outside [0, 1]",
                    name, y
                )));
            }
        }

        if self.points.windows(2).any(|w| w[1][0] <= w[0][0]) {
            return Err(ModeError::Config(format!(
                "{} breakpoints must be strictly increasing in x",
                name
            )));
        }

        Ok(())
    }

    pub fn eval(&self, x: f64) -> f64 {
        let first = match self.points.first() {
            Some(p) => p,
            None => return 0.0,
        };
        if x <= first[0] {
            return first[1];
        }

        for w in self.points.windows(2) {
            let [x0, y0] = w[0];
            let [x1, y1] = w[1];
            if x <= x1 {
                let t = (x - x0) / (x1 - x0);
                return y0 + t * (y1 - y0);
            }
        }

        self.points[self.points.len() - 1][1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_eval_interpolates_and_clamps() {
        let f = PiecewiseLinear::new(vec![[0.0, 1.0], [15.0, 1.0], [150.0, 0.0]]).unwrap();
        assert_approx_eq!(f.eval(-3.0), 1.0);
        assert_approx_eq!(f.eval(10.0), 1.0);
        assert_approx_eq!(f.eval(82.5), 0.5);
        assert_approx_eq!(f.eval(400.0), 0.0);
    }

    #[test]
    fn test_single_point_is_constant() {
        let f = PiecewiseLinear::new(vec![[0.5, 0.25]]).unwrap();
        assert_approx_eq!(f.eval(-1.0), 0.25);
        assert_approx_eq!(f.eval(9.0), 0.25);
    }

    #[test]
    fn test_rejects_unsorted_breakpoints() {
        assert!(PiecewiseLinear::new(vec![[1.0, 0.0], [1.0, 1.0]]).is_err());
        assert!(PiecewiseLinear::new(vec![[0.0, 1.5]]).is_err());
        assert!(PiecewiseLinear::new(vec![]).is_err());
    }

    #[test]
    fn test_deserializes_from_pairs() {
        let f: PiecewiseLinear = toml::from_str::<toml::Value>("f = [[0.0, 0.0], [1.0, 1.0]]")
            .unwrap()
            .get("f")
            .cloned()
            .unwrap()
            .try_into()
            .unwrap();
        assert_approx_eq!(f.eval(0.25), 0.25);
    }
}
