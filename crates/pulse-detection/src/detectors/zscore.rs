//! Z-score detection (parametric, normal distribution assumption).

use super::{flat_series_vote, DetectionStrategy, MethodVote};
use pulse_core::stats;
use pulse_core::types::{DetectionMethod, Granularity};
use serde::{Deserialize, Serialize};

/// Flags values more than `threshold` standard deviations from the history
/// mean. A flat series (stddev under the floor) falls back to an absolute
/// percentage rule so division by zero never decides an anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZScoreStrategy {
    /// Threshold in standard deviations.
    pub threshold: f64,
    /// Stddev floor below which the series is treated as flat.
    pub flat_epsilon: f64,
    /// Percentage deviation required on a flat series.
    pub flat_percent: f64,
}

impl Default for ZScoreStrategy {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            flat_epsilon: 1e-9,
            flat_percent: 50.0,
        }
    }
}

impl DetectionStrategy for ZScoreStrategy {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::ZScore
    }

    fn evaluate(
        &self,
        history: &[f64],
        value: f64,
        _granularity: Granularity,
    ) -> Option<MethodVote> {
        let mean = stats::mean(history);
        let std_dev = stats::population_std_dev(history);

        if std_dev < self.flat_epsilon {
            return flat_series_vote(self.method(), mean, value, self.flat_percent);
        }

        let z = (value - mean).abs() / std_dev;
        if z > self.threshold {
            Some(MethodVote {
                method: self.method(),
                expected: mean,
                excess: (z - self.threshold) / self.threshold,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> ZScoreStrategy {
        ZScoreStrategy::default()
    }

    #[test]
    fn test_fires_beyond_three_sigma() {
        // mean 100, stddev 2: 110 is five sigma out
        let history: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 98.0 } else { 102.0 })
            .collect();
        let vote = strategy()
            .evaluate(&history, 110.0, Granularity::Daily)
            .unwrap();
        assert!((vote.expected - 100.0).abs() < 1e-9);
        assert!(vote.excess > 0.0);
    }

    #[test]
    fn test_silent_inside_three_sigma() {
        let history: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 98.0 } else { 102.0 })
            .collect();
        assert!(strategy()
            .evaluate(&history, 104.0, Granularity::Daily)
            .is_none());
    }

    #[test]
    fn test_flat_series_uses_percentage_rule() {
        let history = vec![5.0; 30];
        // 5.2 is only a 4% move on a flat series
        assert!(strategy()
            .evaluate(&history, 5.2, Granularity::Daily)
            .is_none());
        // 9.0 is an 80% move
        let vote = strategy()
            .evaluate(&history, 9.0, Granularity::Daily)
            .unwrap();
        assert!((vote.excess - 0.6).abs() < 1e-9);
    }
}
