use serde::Serialize;

use crate::config::IntensityStat;
use crate::field::RawField;

/// Sorted raw values of an object's pixels, bad data excluded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntensityDistribution {
    values: Vec<f64>,
    sum: f64,
}

/// Percentiles reported for every object
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntensitySummary {
    pub p10: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    /// The configured statistic
    pub user: Option<f64>,
    pub sum: Option<f64>,
}

impl IntensityDistribution {
    pub fn from_pixels(raw: &RawField, pixels: &[usize]) -> Self {
        let mut values: Vec<f64> = pixels.iter().filter_map(|&idx| raw.valid_at(idx)).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        let sum = values.iter().sum();
        Self { values, sum }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Linear interpolation between order statistics at rank `p/100 * (n-1)`
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let n = self.values.len();
        if n == 0 {
            return None;
        }

        let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        let t = rank - lo as f64;

        Some(self.values[lo] + t * (self.values[hi] - self.values[lo]))
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.sum / self.values.len() as f64)
        }
    }

    pub fn sum(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.sum)
        }
    }

    pub fn stat(&self, stat: IntensityStat) -> Option<f64> {
        match stat {
            IntensityStat::Percentile(p) => self.percentile(p as f64),
            IntensityStat::Mean => self.mean(),
            IntensityStat::Sum => self.sum(),
        }
    }

    pub fn summary(&self, user: IntensityStat) -> IntensitySummary {
        IntensitySummary {
            p10: self.percentile(10.0),
            p25: self.percentile(25.0),
            p50: self.percentile(50.0),
            p75: self.percentile(75.0),
            p90: self.percentile(90.0),
            user: self.stat(user),
            sum: self.sum(),
        }
    }
}
