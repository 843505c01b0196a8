//! Daily aggregation of raw observations.
//!
//! `aggregate` recomputes the per-day summary deterministically from the
//! day's observations and replaces any cached row (upsert-by-replace, never
//! accumulate), so repeated runs over the same day are idempotent. A cached
//! row that disagrees with the recomputation beyond tolerance is a
//! consistency violation: logged as a warning, then overwritten by the
//! recomputed value.

use chrono::{NaiveDate, TimeZone, Utc};
use pulse_core::config::AggregationConfig;
use pulse_core::observation::DailyAggregate;
use pulse_core::stats;
use pulse_core::types::{MetricName, TenantId};
use pulse_core::Result;
use pulse_storage::query::{ObservationQuery, TimeRange};
use pulse_storage::Storage;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Computes and caches per-day summary statistics.
#[derive(Debug)]
pub struct Aggregator {
    storage: Arc<dyn Storage>,
    config: AggregationConfig,
}

impl Aggregator {
    /// Create an aggregator over the given storage backend.
    pub fn new(storage: Arc<dyn Storage>, config: AggregationConfig) -> Self {
        Self { storage, config }
    }

    /// Recompute the aggregate for one (tenant, metric, day).
    ///
    /// Returns `None` when the day holds no non-forecast observations.
    /// Replace semantics: safe to call any number of times.
    pub async fn aggregate(
        &self,
        tenant_id: &TenantId,
        metric_name: &MetricName,
        day: NaiveDate,
    ) -> Result<Option<DailyAggregate>> {
        let midnight = day
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| pulse_core::Error::consistency("invalid day"))?;
        let start = Utc.from_utc_datetime(&midnight);
        let end = start + chrono::Duration::days(1);

        let mut query = ObservationQuery::all(tenant_id.clone(), metric_name.clone());
        query.range = Some(TimeRange::new(start, end));
        query.include_forecasts = false;
        let observations = self.storage.query_observations(query).await?;

        if observations.is_empty() {
            debug!(
                tenant = %tenant_id,
                metric = %metric_name,
                %day,
                "no observations for day, skipping aggregate"
            );
            return Ok(None);
        }

        let values: Vec<f64> = observations.iter().map(|o| o.value).collect();
        let aggregate = DailyAggregate {
            tenant_id: tenant_id.clone(),
            metric_name: metric_name.clone(),
            day,
            mean: stats::mean(&values),
            min: values.iter().cloned().fold(f64::INFINITY, f64::min),
            max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            sum: values.iter().sum(),
            std_dev: stats::population_std_dev(&values),
            median: stats::median(&values),
            sample_count: values.len(),
            unit: modal_unit(observations.iter().map(|o| o.unit.as_str())),
            computed_at: Utc::now(),
        };

        if let Some(cached) = self
            .storage
            .get_daily_aggregate(tenant_id, metric_name, day)
            .await?
        {
            if !self.within_tolerance(&cached, &aggregate) {
                warn!(
                    tenant = %tenant_id,
                    metric = %metric_name,
                    %day,
                    cached_mean = cached.mean,
                    recomputed_mean = aggregate.mean,
                    "cached aggregate disagrees with recomputation, replacing"
                );
                metrics::counter!("pulse_aggregate_consistency_violations_total")
                    .increment(1);
            }
        }

        self.storage
            .upsert_daily_aggregate(aggregate.clone())
            .await?;
        Ok(Some(aggregate))
    }

    fn within_tolerance(&self, cached: &DailyAggregate, fresh: &DailyAggregate) -> bool {
        let tol = self.config.consistency_tolerance;
        let close = |a: f64, b: f64| (a - b).abs() <= tol * f64::max(1.0, a.abs());
        cached.sample_count == fresh.sample_count
            && close(cached.mean, fresh.mean)
            && close(cached.std_dev, fresh.std_dev)
            && close(cached.median, fresh.median)
            && close(cached.min, fresh.min)
            && close(cached.max, fresh.max)
            && close(cached.sum, fresh.sum)
    }
}

/// Most frequent unit string; ties break lexicographically for determinism.
fn modal_unit<'a>(units: impl Iterator<Item = &'a str>) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for unit in units {
        *counts.entry(unit).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(unit, _)| unit.to_string())
        .unwrap_or_default()
}
