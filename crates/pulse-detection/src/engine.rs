//! Ensemble anomaly detection engine.
//!
//! Three independent methods vote on every new observation; an anomaly is
//! emitted only when at least two agree. Agreement is a count, never a
//! magnitude comparison: magnitude feeds confidence, and confidence feeds
//! the severity tier.

use crate::detectors::{
    iqr::IqrStrategy, trend::TrendStrategy, zscore::ZScoreStrategy, DetectionStrategy,
    MethodVote,
};
use chrono::Utc;
use pulse_core::config::DetectionConfig;
use pulse_core::observation::MetricObservation;
use pulse_core::record::Anomaly;
use pulse_core::types::{AnomalyStatus, Severity};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

/// Minimum number of agreeing methods for an anomaly to fire.
const MIN_AGREEMENT: usize = 2;

/// Ensemble anomaly detector.
///
/// Stateless between calls: history arrives with every invocation, so the
/// detector is independently testable and safely re-runnable over the same
/// window.
#[derive(Debug)]
pub struct AnomalyDetector {
    config: DetectionConfig,
    strategies: Vec<Box<dyn DetectionStrategy>>,
}

impl AnomalyDetector {
    /// Create a detector with the standard three methods configured from
    /// `config`.
    pub fn new(config: DetectionConfig) -> Self {
        let strategies: Vec<Box<dyn DetectionStrategy>> = vec![
            Box::new(ZScoreStrategy {
                threshold: config.zscore_threshold,
                flat_epsilon: config.flat_series_epsilon,
                flat_percent: config.flat_series_percent,
            }),
            Box::new(IqrStrategy {
                multiplier: config.iqr_multiplier,
                flat_epsilon: config.flat_series_epsilon,
                flat_percent: config.flat_series_percent,
            }),
            Box::new(TrendStrategy {
                residual_threshold: config.trend_residual_threshold,
                flat_epsilon: config.flat_series_epsilon,
            }),
        ];
        Self { config, strategies }
    }

    /// Create a detector with a custom strategy set. The trend method in
    /// particular is a swappable strategy; replacing it never changes the
    /// agreement rule.
    pub fn with_strategies(
        config: DetectionConfig,
        strategies: Vec<Box<dyn DetectionStrategy>>,
    ) -> Self {
        Self { config, strategies }
    }

    /// Evaluate one new observation against its rolling history.
    ///
    /// `history` holds the most recent non-forecast observations strictly
    /// older than the new one, newest first. Fewer than the configured
    /// minimum disables detection for this call (insufficient data, not an
    /// error).
    pub fn detect(
        &self,
        observation: &MetricObservation,
        history: &[MetricObservation],
    ) -> Option<Anomaly> {
        let mut window: Vec<&MetricObservation> = history
            .iter()
            .filter(|o| !o.is_forecast && o.timestamp < observation.timestamp)
            .take(self.config.history_window)
            .collect();

        if window.len() < self.config.min_history {
            debug!(
                tenant = %observation.tenant_id,
                metric = %observation.metric_name,
                history_len = window.len(),
                min = self.config.min_history,
                "insufficient history, detection disabled for this call"
            );
            return None;
        }

        // strategies work in chronological order
        window.reverse();
        let values: Vec<f64> = window.iter().map(|o| o.value).collect();

        let votes: Vec<MethodVote> = self
            .strategies
            .iter()
            .filter_map(|s| s.evaluate(&values, observation.value, observation.granularity))
            .collect();

        if votes.len() < MIN_AGREEMENT {
            return None;
        }

        let confidence = ensemble_confidence(&votes, self.strategies.len());
        let severity = severity_for(confidence);
        let expected =
            votes.iter().map(|v| v.expected).sum::<f64>() / votes.len() as f64;
        let deviation = observation.value - expected;
        let deviation_percent = if expected.abs() > f64::EPSILON {
            deviation.abs() / expected.abs() * 100.0
        } else {
            0.0
        };

        let anomaly = Anomaly {
            id: Uuid::new_v4(),
            tenant_id: observation.tenant_id.clone(),
            metric_name: observation.metric_name.clone(),
            occurred_at: observation.timestamp,
            current_value: observation.value,
            expected_value: expected,
            deviation,
            deviation_percent,
            methods: votes.iter().map(|v| v.method).collect(),
            confidence,
            severity,
            status: AnomalyStatus::Active,
            detected_at: Utc::now(),
            inputs_hash: inputs_hash(observation, &values),
            acknowledged_by: None,
            resolution_notes: None,
        };

        info!(
            tenant = %anomaly.tenant_id,
            metric = %anomaly.metric_name,
            value = anomaly.current_value,
            expected = anomaly.expected_value,
            confidence = anomaly.confidence,
            severity = %anomaly.severity,
            methods = votes.len(),
            "anomaly detected"
        );
        metrics::counter!(
            "pulse_anomalies_total",
            "severity" => anomaly.severity.to_string()
        )
        .increment(1);

        Some(anomaly)
    }
}

/// Ensemble confidence: the agreement fraction, weighted upward by the
/// magnitude of the agreeing methods' normalized deviations, clamped to
/// [0,1]. Weak agreement lands just above the bare fraction; magnitude never
/// decides whether the ensemble fires.
pub fn ensemble_confidence(votes: &[MethodVote], total_methods: usize) -> f64 {
    if votes.is_empty() || total_methods == 0 {
        return 0.0;
    }
    let agreement = votes.len() as f64 / total_methods as f64;
    let magnitude = votes
        .iter()
        .map(|v| v.excess / (1.0 + v.excess))
        .sum::<f64>()
        / votes.len() as f64;
    (agreement + 0.25 * magnitude).clamp(0.0, 1.0)
}

/// Severity tier for an ensemble confidence.
pub fn severity_for(confidence: f64) -> Severity {
    if confidence >= 0.9 {
        Severity::Critical
    } else if confidence >= 0.75 {
        Severity::High
    } else if confidence >= 0.5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// SHA-256 over the detection inputs, recorded for the audit trail.
fn inputs_hash(observation: &MetricObservation, history: &[f64]) -> String {
    let payload = serde_json::json!({
        "tenant": observation.tenant_id,
        "metric": observation.metric_name,
        "timestamp": observation.timestamp,
        "value": observation.value,
        "history": history,
    });
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::types::{DetectionMethod, Granularity, MetricName, TenantId};

    fn observation(value: f64, hours_after_history: i64) -> MetricObservation {
        MetricObservation::new(
            TenantId::new("t1"),
            MetricName::new("mrr"),
            value,
            "usd",
            Utc::now() + chrono::Duration::hours(hours_after_history),
            Granularity::Daily,
            "crm",
        )
    }

    /// newest-first history of `values` (oldest value first in the slice)
    fn history(values: &[f64]) -> Vec<MetricObservation> {
        let n = values.len() as i64;
        values
            .iter()
            .enumerate()
            .map(|(i, v)| observation(*v, i as i64 - n))
            .rev()
            .collect()
    }

    #[derive(Debug)]
    struct FixedVote(Option<f64>);

    impl DetectionStrategy for FixedVote {
        fn method(&self) -> DetectionMethod {
            DetectionMethod::Trend
        }
        fn evaluate(
            &self,
            _history: &[f64],
            _value: f64,
            _granularity: Granularity,
        ) -> Option<MethodVote> {
            self.0.map(|excess| MethodVote {
                method: DetectionMethod::Trend,
                expected: 100.0,
                excess,
            })
        }
    }

    fn stub_detector(excesses: [Option<f64>; 3]) -> AnomalyDetector {
        AnomalyDetector::with_strategies(
            DetectionConfig::default(),
            excesses.into_iter().map(|e| {
                Box::new(FixedVote(e)) as Box<dyn DetectionStrategy>
            }).collect(),
        )
    }

    #[test]
    fn test_mrr_spike_fires_at_least_two_methods() {
        // Scenario: 30 daily MRR values hovering at $100k +/- $2k, then $180k
        let values: Vec<f64> = (0..30)
            .map(|i| 100_000.0 + if i % 2 == 0 { 2_000.0 } else { -2_000.0 })
            .collect();
        let detector = AnomalyDetector::new(DetectionConfig::default());

        let anomaly = detector
            .detect(&observation(180_000.0, 1), &history(&values))
            .expect("spike must be detected");

        assert!(anomaly.methods.len() >= 2);
        assert!(anomaly.confidence >= 0.66);
        assert!(anomaly.severity >= Severity::High);
        assert!(anomaly.methods.contains(&DetectionMethod::ZScore));
        assert!(anomaly.methods.contains(&DetectionMethod::Iqr));
        assert!(!anomaly.inputs_hash.is_empty());
    }

    #[test]
    fn test_small_churn_move_is_not_an_anomaly() {
        // Scenario: churn_rate flat at 5% +/- 0.3%, new value 5.2%
        let values: Vec<f64> = (0..30)
            .map(|i| 5.0 + if i % 2 == 0 { 0.3 } else { -0.3 })
            .collect();
        let detector = AnomalyDetector::new(DetectionConfig::default());
        assert!(detector
            .detect(&observation(5.2, 1), &history(&values))
            .is_none());
    }

    #[test]
    fn test_short_history_disables_detection() {
        let values = [100.0; 6];
        let detector = AnomalyDetector::new(DetectionConfig::default());
        assert!(detector
            .detect(&observation(1_000_000.0, 1), &history(&values))
            .is_none());
    }

    #[test]
    fn test_single_method_never_fires() {
        let detector = stub_detector([Some(10.0), None, None]);
        assert!(detector
            .detect(&observation(200.0, 1), &history(&[100.0; 10]))
            .is_none());
    }

    #[test]
    fn test_two_weak_methods_fire_with_bounded_confidence() {
        let detector = stub_detector([Some(0.01), Some(0.02), None]);
        let anomaly = detector
            .detect(&observation(200.0, 1), &history(&[100.0; 10]))
            .expect("two agreeing methods must fire");
        assert!(anomaly.confidence > 0.5);
        assert!(anomaly.confidence < 0.9);
        assert_eq!(anomaly.severity, Severity::Medium);
    }

    #[test]
    fn test_three_strong_methods_reach_critical() {
        let detector = stub_detector([Some(5.0), Some(8.0), Some(12.0)]);
        let anomaly = detector
            .detect(&observation(200.0, 1), &history(&[100.0; 10]))
            .unwrap();
        assert!(anomaly.confidence >= 0.9);
        assert_eq!(anomaly.severity, Severity::Critical);
    }

    #[test]
    fn test_forecast_rows_excluded_from_history() {
        let values: Vec<f64> = (0..30)
            .map(|i| 100_000.0 + if i % 2 == 0 { 2_000.0 } else { -2_000.0 })
            .collect();
        let mut hist = history(&values);
        // poison the history with forecast rows at an absurd level
        for mut fake in history(&[500_000.0; 10]) {
            fake.is_forecast = true;
            hist.insert(0, fake);
        }
        let detector = AnomalyDetector::new(DetectionConfig::default());
        let anomaly = detector.detect(&observation(180_000.0, 1), &hist);
        assert!(anomaly.is_some());
    }

    #[test]
    fn test_severity_tiers() {
        assert_eq!(severity_for(0.95), Severity::Critical);
        assert_eq!(severity_for(0.8), Severity::High);
        assert_eq!(severity_for(0.6), Severity::Medium);
        assert_eq!(severity_for(0.4), Severity::Low);
    }
}
