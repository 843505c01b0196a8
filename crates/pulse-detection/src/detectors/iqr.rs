//! IQR fence detection (non-parametric, robust to skew).

use super::{flat_series_vote, DetectionStrategy, MethodVote};
use pulse_core::stats;
use pulse_core::types::{DetectionMethod, Granularity};
use serde::{Deserialize, Serialize};

/// Flags values outside `[Q1 - k*IQR, Q3 + k*IQR]` with quartiles by linear
/// interpolation. A degenerate IQR (zero spread between the quartiles)
/// falls back to the flat-series percentage rule around the median.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IqrStrategy {
    /// Fence multiplier.
    pub multiplier: f64,
    /// IQR floor below which the spread is treated as degenerate.
    pub flat_epsilon: f64,
    /// Percentage deviation required on a degenerate spread.
    pub flat_percent: f64,
}

impl Default for IqrStrategy {
    fn default() -> Self {
        Self {
            multiplier: 1.5,
            flat_epsilon: 1e-9,
            flat_percent: 50.0,
        }
    }
}

impl DetectionStrategy for IqrStrategy {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Iqr
    }

    fn evaluate(
        &self,
        history: &[f64],
        value: f64,
        _granularity: Granularity,
    ) -> Option<MethodVote> {
        let (q1, q3) = stats::quartiles(history);
        let iqr = q3 - q1;
        let median = stats::median(history);

        if iqr < self.flat_epsilon {
            return flat_series_vote(self.method(), median, value, self.flat_percent);
        }

        let lower = q1 - self.multiplier * iqr;
        let upper = q3 + self.multiplier * iqr;

        let beyond = if value > upper {
            value - upper
        } else if value < lower {
            lower - value
        } else {
            return None;
        };

        Some(MethodVote {
            method: self.method(),
            expected: median,
            excess: beyond / iqr,
        })
    }
}
