//! Trend / seasonal residual detection.
//!
//! The third ensemble vote projects where the series was heading and flags
//! values whose residual against the projection is out of line with the
//! residuals the fit produced in-sample.
//!
//! Chosen formula (the method is swappable behind
//! [`super::DetectionStrategy`]):
//! 1. With at least two full seasonal cycles of history (cycle length from
//!    the granularity), subtract per-position seasonal means first (a naive
//!    seasonal decomposition).
//! 2. Fit an ordinary least-squares line over the (deseasonalized) history
//!    with the observation index as x.
//! 3. Project the next index, adding the seasonal component back.
//! 4. Fire when `|value - projection|` exceeds `threshold` times the
//!    population stddev of the in-sample residuals.
//!
//! Degenerate residual variance disables the vote: a method that cannot
//! evaluate never counts toward ensemble agreement.

use super::{DetectionStrategy, MethodVote};
use pulse_core::stats;
use pulse_core::types::{DetectionMethod, Granularity};
use serde::{Deserialize, Serialize};

/// Trend-projection residual detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendStrategy {
    /// Threshold in residual standard deviations.
    pub residual_threshold: f64,
    /// Residual-stddev floor below which the fit is degenerate.
    pub flat_epsilon: f64,
}

impl Default for TrendStrategy {
    fn default() -> Self {
        Self {
            residual_threshold: 2.5,
            flat_epsilon: 1e-9,
        }
    }
}

impl TrendStrategy {
    /// Per-position seasonal means when enough full cycles exist.
    fn seasonal_means(history: &[f64], cycle: usize) -> Vec<f64> {
        let mut sums = vec![0.0; cycle];
        let mut counts = vec![0usize; cycle];
        for (i, v) in history.iter().enumerate() {
            sums[i % cycle] += v;
            counts[i % cycle] += 1;
        }
        sums.iter()
            .zip(&counts)
            .map(|(s, c)| if *c > 0 { s / *c as f64 } else { 0.0 })
            .collect()
    }
}

impl DetectionStrategy for TrendStrategy {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Trend
    }

    fn evaluate(
        &self,
        history: &[f64],
        value: f64,
        granularity: Granularity,
    ) -> Option<MethodVote> {
        if history.len() < 3 {
            return None;
        }

        let cycle = granularity
            .seasonal_cycle()
            .filter(|c| history.len() >= 2 * c);

        let (seasonal, working): (Option<Vec<f64>>, Vec<f64>) = match cycle {
            Some(c) => {
                let means = Self::seasonal_means(history, c);
                let deseasonalized = history
                    .iter()
                    .enumerate()
                    .map(|(i, v)| v - means[i % c])
                    .collect();
                (Some(means), deseasonalized)
            }
            None => (None, history.to_vec()),
        };

        let (slope, intercept) = stats::linear_fit(&working);
        let seasonal_at = |index: usize| -> f64 {
            match (&seasonal, cycle) {
                (Some(means), Some(c)) => means[index % c],
                _ => 0.0,
            }
        };

        let residuals: Vec<f64> = history
            .iter()
            .enumerate()
            .map(|(i, v)| v - (slope * i as f64 + intercept + seasonal_at(i)))
            .collect();
        let sigma = stats::population_std_dev(&residuals);
        if sigma < self.flat_epsilon {
            return None;
        }

        let next = history.len();
        let projection = slope * next as f64 + intercept + seasonal_at(next);
        let normalized = (value - projection).abs() / sigma;
        if normalized > self.residual_threshold {
            Some(MethodVote {
                method: self.method(),
                expected: projection,
                excess: (normalized - self.residual_threshold) / self.residual_threshold,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follows_a_trend_without_firing() {
        // steady growth with small noise: the next on-trend value is fine
        let history: Vec<f64> = (0..30)
            .map(|i| 100.0 + 5.0 * i as f64 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let strategy = TrendStrategy::default();
        assert!(strategy
            .evaluate(&history, 250.0, Granularity::Quarterly)
            .is_none());
    }

    #[test]
    fn test_fires_on_trend_break() {
        let history: Vec<f64> = (0..30)
            .map(|i| 100.0 + 5.0 * i as f64 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let strategy = TrendStrategy::default();
        // projection is ~250; 400 breaks the trend hard
        let vote = strategy
            .evaluate(&history, 400.0, Granularity::Quarterly)
            .unwrap();
        assert!(vote.excess > 1.0);
        assert!((vote.expected - 250.0).abs() < 2.0);
    }

    #[test]
    fn test_seasonal_series_projects_with_cycle() {
        // weekly shape over daily data with noise: weekends dip, three full
        // cycles of history
        let weekly_shape = [10.0, 12.0, 12.0, 12.0, 11.0, 4.0, 3.0];
        let history: Vec<f64> = (0..21)
            .map(|i| weekly_shape[i % 7] + if i % 2 == 0 { 0.3 } else { -0.3 })
            .collect();
        let strategy = TrendStrategy::default();

        // index 21 lands on a Monday-equivalent: ~10 is expected, a weekend
        // -level value is not explained by the weekly shape there
        assert!(strategy
            .evaluate(&history, 10.0, Granularity::Daily)
            .is_none());
        assert!(strategy
            .evaluate(&history, 30.0, Granularity::Daily)
            .is_some());
    }

    #[test]
    fn test_perfectly_linear_history_is_degenerate() {
        let history: Vec<f64> = (0..30).map(|i| 10.0 + 2.0 * i as f64).collect();
        // zero residual variance: the vote is disabled, not fired
        assert!(TrendStrategy::default()
            .evaluate(&history, 1_000.0, Granularity::Quarterly)
            .is_none());
    }

    #[test]
    fn test_short_history_disables_vote() {
        assert!(TrendStrategy::default()
            .evaluate(&[1.0, 2.0], 100.0, Granularity::Daily)
            .is_none());
    }
}
