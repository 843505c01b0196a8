//! Pattern correlation across signal series.
//!
//! Looks for co-occurring shifts across two signal series (KPI, sentiment,
//! meeting outcome) inside a shared time window. The output is a
//! correlation, never a causal claim: direction is descriptive and the
//! record carries no cause/effect ordering.

use chrono::{DateTime, Utc};
use pulse_core::config::CorrelationConfig;
use pulse_core::record::{Pattern, PatternDirection};
use pulse_core::stats;
use pulse_core::types::{PatternStatus, TenantId, TimeRange};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// A named series of (timestamp, value) points already aligned to one
/// granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSeries {
    pub name: String,
    pub points: Vec<(DateTime<Utc>, f64)>,
}

impl SignalSeries {
    /// Create a series from aligned points.
    pub fn new(name: impl Into<String>, points: Vec<(DateTime<Utc>, f64)>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

/// Pearson correlator over aligned series pairs.
#[derive(Debug)]
pub struct PatternCorrelator {
    config: CorrelationConfig,
}

impl PatternCorrelator {
    /// Create a correlator with the given configuration.
    pub fn new(config: CorrelationConfig) -> Self {
        Self { config }
    }

    /// Correlate two aligned series inside `window`.
    ///
    /// Returns `None` when fewer than the configured minimum of points
    /// overlap, when either overlapping slice has zero variance (r is
    /// undefined), or when |r| stays under the strength gate.
    pub fn correlate(
        &self,
        tenant_id: &TenantId,
        series_a: &SignalSeries,
        series_b: &SignalSeries,
        window: TimeRange,
    ) -> Option<Pattern> {
        let (xs, ys) = overlap(series_a, series_b, window);

        if xs.len() < self.config.min_overlap {
            debug!(
                tenant = %tenant_id,
                a = %series_a.name,
                b = %series_b.name,
                overlap = xs.len(),
                min = self.config.min_overlap,
                "not enough overlapping points to correlate"
            );
            return None;
        }

        let r = stats::pearson(&xs, &ys)?;
        if r.abs() < self.config.min_strength {
            return None;
        }

        let sample_count = xs.len();
        let saturation = self.config.saturation_points.max(1);
        let confidence = (sample_count.min(saturation)) as f64 / saturation as f64;

        let pattern = Pattern {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.clone(),
            series: vec![series_a.name.clone(), series_b.name.clone()],
            window_start: window.start,
            window_end: window.end,
            correlation_strength: r.abs(),
            direction: if r >= 0.0 {
                PatternDirection::Positive
            } else {
                PatternDirection::Negative
            },
            confidence,
            sample_count,
            status: PatternStatus::Active,
            detected_at: Utc::now(),
        };

        info!(
            tenant = %tenant_id,
            a = %series_a.name,
            b = %series_b.name,
            strength = pattern.correlation_strength,
            points = sample_count,
            "pattern detected"
        );
        metrics::counter!("pulse_patterns_total").increment(1);

        Some(pattern)
    }
}

/// Values at timestamps present in both series inside the window, in
/// timestamp order.
fn overlap(
    series_a: &SignalSeries,
    series_b: &SignalSeries,
    window: TimeRange,
) -> (Vec<f64>, Vec<f64>) {
    let mut by_ts: std::collections::BTreeMap<DateTime<Utc>, f64> = series_a
        .points
        .iter()
        .filter(|(ts, _)| window.contains(*ts))
        .map(|(ts, v)| (*ts, *v))
        .collect();

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut pairs: Vec<(DateTime<Utc>, f64)> = series_b
        .points
        .iter()
        .filter(|(ts, _)| window.contains(*ts))
        .map(|(ts, v)| (*ts, *v))
        .collect();
    pairs.sort_by_key(|(ts, _)| *ts);

    for (ts, b_value) in pairs {
        if let Some(a_value) = by_ts.remove(&ts) {
            xs.push(a_value);
            ys.push(b_value);
        }
    }
    (xs, ys)
}
