//! Metric observations and derived daily aggregates.

use crate::types::{Granularity, MetricName, TenantId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relative tolerance under which two observation values are considered
/// identical (benign duplicate rather than a correction).
pub const VALUE_TOLERANCE: f64 = 1e-9;

/// True when `a` and `b` are equal within [`VALUE_TOLERANCE`], scaled by
/// magnitude so large KPI values (revenue in cents) compare sensibly.
pub fn values_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= VALUE_TOLERANCE * f64::max(1.0, a.abs().max(b.abs()))
}

/// Uniqueness key for an observation: one value per
/// (tenant, metric, timestamp, granularity, source).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservationKey {
    pub tenant_id: TenantId,
    pub metric_name: MetricName,
    pub timestamp: DateTime<Utc>,
    pub granularity: Granularity,
    pub source: String,
}

/// One measured value of one named metric at one instant.
///
/// Immutable once written except for a late-arriving value correction (which
/// records the prior value) and forecast/target flag corrections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricObservation {
    /// Unique row identifier.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Metric name, e.g. `mrr`.
    pub metric_name: MetricName,
    /// Measured value. Never NaN or infinite once stored.
    pub value: f64,
    /// Unit string, e.g. `usd`, `percent`, `count`.
    pub unit: String,
    /// Instant the value was measured at.
    pub timestamp: DateTime<Utc>,
    /// Declared time bucket size.
    pub granularity: Granularity,
    /// Source system that produced the value.
    pub source: String,
    /// Forecast values are excluded from detection history.
    pub is_forecast: bool,
    /// Target values are goals, not measurements.
    pub is_target: bool,
    /// Prior value when this row overwrote a late-arriving correction.
    pub previous_value: Option<f64>,
    /// Percent change versus `previous_value`, for downstream consumers.
    pub change_percent: Option<f64>,
    /// When the engine stored the row.
    pub ingested_at: DateTime<Utc>,
}

impl MetricObservation {
    /// Create a new observation with generated id and ingestion timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: TenantId,
        metric_name: MetricName,
        value: f64,
        unit: impl Into<String>,
        timestamp: DateTime<Utc>,
        granularity: Granularity,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            metric_name,
            value,
            unit: unit.into(),
            timestamp,
            granularity,
            source: source.into(),
            is_forecast: false,
            is_target: false,
            previous_value: None,
            change_percent: None,
            ingested_at: Utc::now(),
        }
    }

    /// Mark the observation as a forecast value.
    pub fn forecast(mut self) -> Self {
        self.is_forecast = true;
        self
    }

    /// Mark the observation as a target value.
    pub fn target(mut self) -> Self {
        self.is_target = true;
        self
    }

    /// The uniqueness key for this observation.
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            tenant_id: self.tenant_id.clone(),
            metric_name: self.metric_name.clone(),
            timestamp: self.timestamp,
            granularity: self.granularity,
            source: self.source.clone(),
        }
    }

    /// Calendar day of the observation (UTC).
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Record a correction: keep the new value, remember what it replaced.
    pub fn with_correction_of(mut self, prior: f64) -> Self {
        self.previous_value = Some(prior);
        self.change_percent = if prior != 0.0 {
            Some((self.value - prior) / prior.abs() * 100.0)
        } else {
            None
        };
        self
    }
}

/// Derived per-day summary statistics for one (tenant, metric).
///
/// Fully derivable from the observations of that day; recomputation is
/// deterministic, so replace semantics keep repeated aggregation idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub tenant_id: TenantId,
    pub metric_name: MetricName,
    pub day: NaiveDate,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Median by linear interpolation.
    pub median: f64,
    pub sample_count: usize,
    /// Most frequent unit string among the day's observations.
    pub unit: String,
    pub computed_at: DateTime<Utc>,
}

impl DailyAggregate {
    /// Field-wise equality ignoring `computed_at`, used for idempotence and
    /// consistency checks against a cached row.
    pub fn same_stats(&self, other: &DailyAggregate) -> bool {
        self.sample_count == other.sample_count
            && self.unit == other.unit
            && values_equal(self.mean, other.mean)
            && values_equal(self.min, other.min)
            && values_equal(self.max, other.max)
            && values_equal(self.sum, other.sum)
            && values_equal(self.std_dev, other.std_dev)
            && values_equal(self.median, other.median)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(value: f64) -> MetricObservation {
        MetricObservation::new(
            TenantId::new("t1"),
            MetricName::new("mrr"),
            value,
            "usd",
            Utc::now(),
            Granularity::Daily,
            "crm",
        )
    }

    #[test]
    fn test_values_equal_tolerance() {
        assert!(values_equal(100_000.0, 100_000.0));
        assert!(values_equal(100_000.0, 100_000.0 + 1e-6));
        assert!(!values_equal(100_000.0, 100_001.0));
        assert!(!values_equal(0.05, 0.052));
    }

    #[test]
    fn test_correction_records_prior_value() {
        let corrected = obs(120_000.0).with_correction_of(100_000.0);
        assert_eq!(corrected.previous_value, Some(100_000.0));
        let change = corrected.change_percent.unwrap();
        assert!((change - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_correction_of_zero_prior_has_no_percent() {
        let corrected = obs(50.0).with_correction_of(0.0);
        assert_eq!(corrected.previous_value, Some(0.0));
        assert!(corrected.change_percent.is_none());
    }

    #[test]
    fn test_key_distinguishes_source() {
        let a = obs(1.0);
        let mut b = a.clone();
        b.source = "billing".to_string();
        assert_ne!(a.key(), b.key());
    }
}
