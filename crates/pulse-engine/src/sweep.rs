//! Scheduled sweep orchestration.
//!
//! Detection, correlation, and synthesis run as periodic sweeps over newly
//! arrived data, invoked by an external scheduler. Each metric's pipeline is
//! an independent unit of work: a failure is caught, logged with enough
//! context to reproduce (tenant, metric, window), counted in the report, and
//! never aborts the remaining metrics or rolls back committed writes.
//!
//! Aggregation and detection for one (tenant, metric) are serialized through
//! the keyed locks; different keys proceed in parallel with concurrent
//! ingestion.

use crate::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use pulse_core::record::{Anomaly, Pattern};
use pulse_core::types::{MetricName, PatternStatus, TenantId, TimeRange};
use pulse_core::{Error, Result};
use pulse_detection::SignalSeries;
use pulse_storage::query::{ObservationQuery, PatternQuery, RecommendationQuery};
use pulse_synthesis::SynthesisOutcome;
use std::time::Instant;
use tracing::{debug, error, info};

/// One sweep invocation.
#[derive(Debug, Clone)]
pub struct SweepRequest {
    pub tenant_id: TenantId,
    /// Metrics to aggregate and detect on.
    pub metrics: Vec<MetricName>,
    /// Series pairs to correlate, by metric name.
    pub correlation_pairs: Vec<(MetricName, MetricName)>,
    /// Trailing window for correlation series, in days.
    pub correlation_window_days: i64,
}

impl SweepRequest {
    /// Sweep the given metrics with no correlation pairs.
    pub fn metrics_only(tenant_id: TenantId, metrics: Vec<MetricName>) -> Self {
        Self {
            tenant_id,
            metrics,
            correlation_pairs: Vec::new(),
            correlation_window_days: 90,
        }
    }
}

/// A contained per-metric failure.
#[derive(Debug, Clone)]
pub struct SweepFailure {
    pub metric_name: MetricName,
    pub error: String,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub metrics_processed: usize,
    pub anomalies_emitted: usize,
    pub patterns_emitted: usize,
    pub recommendations_created: usize,
    pub recommendations_deduplicated: usize,
    pub patterns_expired: usize,
    pub recommendations_expired: usize,
    pub failures: Vec<SweepFailure>,
}

impl Engine {
    /// Run one full sweep: per-metric aggregation + detection, pairwise
    /// correlation, synthesis, and expiry.
    pub async fn run_sweep(
        &self,
        request: &SweepRequest,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();
        let mut fresh_anomalies: Vec<Anomaly> = Vec::new();
        let mut fresh_patterns: Vec<Pattern> = Vec::new();

        for metric_name in &request.metrics {
            match self.sweep_metric(&request.tenant_id, metric_name).await {
                Ok(anomaly) => {
                    report.metrics_processed += 1;
                    if let Some(anomaly) = anomaly {
                        report.anomalies_emitted += 1;
                        fresh_anomalies.push(anomaly);
                    }
                }
                Err(err) => {
                    error!(
                        tenant = %request.tenant_id,
                        metric = %metric_name,
                        window = ?now,
                        error = %err,
                        "metric sweep failed, continuing with remaining metrics"
                    );
                    report.failures.push(SweepFailure {
                        metric_name: metric_name.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        for (metric_a, metric_b) in &request.correlation_pairs {
            match self
                .correlate_pair(
                    &request.tenant_id,
                    metric_a,
                    metric_b,
                    request.correlation_window_days,
                    now,
                )
                .await
            {
                Ok(Some(pattern)) => {
                    report.patterns_emitted += 1;
                    fresh_patterns.push(pattern);
                }
                Ok(None) => {}
                Err(err) => {
                    error!(
                        tenant = %request.tenant_id,
                        a = %metric_a,
                        b = %metric_b,
                        error = %err,
                        "correlation failed, continuing"
                    );
                    report.failures.push(SweepFailure {
                        metric_name: metric_a.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        if !fresh_anomalies.is_empty() || !fresh_patterns.is_empty() {
            match self
                .synthesizer
                .synthesize(&request.tenant_id, &fresh_anomalies, &fresh_patterns, now)
                .await
            {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        match outcome {
                            SynthesisOutcome::Created(_) => {
                                report.recommendations_created += 1
                            }
                            SynthesisOutcome::Deduplicated { .. } => {
                                report.recommendations_deduplicated += 1
                            }
                        }
                    }
                }
                Err(err) => {
                    error!(
                        tenant = %request.tenant_id,
                        error = %err,
                        "synthesis failed for this sweep"
                    );
                    report.failures.push(SweepFailure {
                        metric_name: MetricName::new("synthesis"),
                        error: err.to_string(),
                    });
                }
            }
        }

        if let Err(err) = self.expire_stale(&request.tenant_id, now, &mut report).await {
            error!(tenant = %request.tenant_id, error = %err, "expiry sweep failed");
        }

        metrics::histogram!("pulse_sweep_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        info!(
            tenant = %request.tenant_id,
            metrics = report.metrics_processed,
            anomalies = report.anomalies_emitted,
            patterns = report.patterns_emitted,
            recommendations = report.recommendations_created,
            deduplicated = report.recommendations_deduplicated,
            failures = report.failures.len(),
            "sweep complete"
        );
        report
    }

    /// Aggregate and detect for one metric, serialized against concurrent
    /// work on the same key.
    async fn sweep_metric(
        &self,
        tenant_id: &TenantId,
        metric_name: &MetricName,
    ) -> Result<Option<Anomaly>> {
        let _guard = self.locks.acquire(tenant_id, metric_name).await;

        let mut newest_query =
            ObservationQuery::all(tenant_id.clone(), metric_name.clone());
        newest_query.include_forecasts = false;
        newest_query.newest_first = true;
        newest_query.limit = Some(1);
        let Some(newest) = self
            .storage
            .query_observations(newest_query)
            .await?
            .into_iter()
            .next()
        else {
            debug!(
                tenant = %tenant_id,
                metric = %metric_name,
                "no observations, skipping metric"
            );
            return Ok(None);
        };

        self.aggregator
            .aggregate(tenant_id, metric_name, newest.day())
            .await?;

        let history = self
            .storage
            .query_observations(ObservationQuery::history(
                tenant_id.clone(),
                metric_name.clone(),
                newest.timestamp,
                self.config.detection.history_window,
            ))
            .await?;

        let Some(anomaly) = self.detector.detect(&newest, &history) else {
            return Ok(None);
        };

        // re-detection of the same observation must not duplicate the audit
        // trail
        let existing = self
            .storage
            .query_anomalies(pulse_storage::query::AnomalyQuery {
                tenant_id: Some(tenant_id.clone()),
                metric_name: Some(metric_name.clone()),
                status: None,
                limit: None,
            })
            .await?;
        if existing
            .iter()
            .any(|a| a.occurred_at == anomaly.occurred_at && a.inputs_hash == anomaly.inputs_hash)
        {
            debug!(
                tenant = %tenant_id,
                metric = %metric_name,
                "anomaly already recorded for this observation"
            );
            return Ok(None);
        }

        self.storage.insert_anomaly(anomaly.clone()).await?;
        Ok(Some(anomaly))
    }

    /// Correlate one pair of metrics over their daily aggregate means.
    async fn correlate_pair(
        &self,
        tenant_id: &TenantId,
        metric_a: &MetricName,
        metric_b: &MetricName,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Pattern>> {
        let window = TimeRange::new(now - Duration::days(window_days), now);
        let series_a = self.daily_series(tenant_id, metric_a, window).await?;
        let series_b = self.daily_series(tenant_id, metric_b, window).await?;

        let Some(pattern) =
            self.correlator
                .correlate(tenant_id, &series_a, &series_b, window)
        else {
            return Ok(None);
        };

        self.storage.insert_pattern(pattern.clone()).await?;
        Ok(Some(pattern))
    }

    /// Per-day mean series for one metric inside the window.
    async fn daily_series(
        &self,
        tenant_id: &TenantId,
        metric_name: &MetricName,
        window: TimeRange,
    ) -> Result<SignalSeries> {
        let mut points = Vec::new();
        let mut day = window.start.date_naive();
        let last = window.end.date_naive();
        while day <= last {
            if let Some(aggregate) = self
                .storage
                .get_daily_aggregate(tenant_id, metric_name, day)
                .await?
            {
                let midnight = day
                    .and_hms_opt(0, 0, 0)
                    .ok_or_else(|| Error::consistency("invalid day"))?;
                points.push((Utc.from_utc_datetime(&midnight), aggregate.mean));
            }
            day = day
                .succ_opt()
                .ok_or_else(|| Error::consistency("day overflow"))?;
        }
        Ok(SignalSeries::new(metric_name.as_str(), points))
    }

    /// Expire stale patterns and recommendations left unmodified past their
    /// windows.
    async fn expire_stale(
        &self,
        tenant_id: &TenantId,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let patterns = self
            .storage
            .query_patterns(PatternQuery {
                tenant_id: Some(tenant_id.clone()),
                status: Some(PatternStatus::Active),
            })
            .await?;
        for mut pattern in patterns {
            if pattern.is_expirable(now, self.config.correlation.pattern_expiry_days) {
                pattern.transition(PatternStatus::Expired)?;
                self.storage.update_pattern(pattern).await?;
                report.patterns_expired += 1;
            }
        }

        let recommendations = self
            .storage
            .query_recommendations(RecommendationQuery {
                tenant_id: Some(tenant_id.clone()),
                statuses: vec![],
                created_after: None,
                limit: None,
            })
            .await?;
        for mut recommendation in recommendations {
            if recommendation
                .is_expirable(now, self.config.synthesis.recommendation_expiry_days)
            {
                recommendation.transition(
                    pulse_core::types::RecommendationStatus::Expired,
                    now,
                )?;
                self.storage.update_recommendation(recommendation).await?;
                report.recommendations_expired += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pulse_core::config::EngineConfig;
    use pulse_core::observation::{DailyAggregate, MetricObservation, ObservationKey};
    use pulse_core::record::Recommendation;
    use pulse_core::types::{Granularity, Impact, RecommendationStatus, Urgency};
    use pulse_storage::query::AnomalyQuery;
    use pulse_storage::{MemoryStorage, ObservationWrite, Storage};
    use pulse_synthesis::HashingEmbedder;
    use std::sync::Arc;
    use uuid::Uuid;

    fn engine_over(storage: Arc<dyn Storage>) -> crate::Engine {
        crate::Engine::new(
            storage,
            Arc::new(HashingEmbedder::new()),
            EngineConfig::default(),
        )
        .unwrap()
    }

    fn daily_obs(metric: &str, value: f64, days_ago: i64, now: DateTime<Utc>) -> MetricObservation {
        MetricObservation::new(
            TenantId::new("t1"),
            MetricName::new(metric),
            value,
            "usd",
            now - Duration::days(days_ago),
            Granularity::Daily,
            "crm",
        )
    }

    async fn seed_mrr_spike(engine: &crate::Engine, now: DateTime<Utc>) {
        for i in 1..=30 {
            let wiggle = if i % 2 == 0 { 2_000.0 } else { -2_000.0 };
            engine
                .ingest(daily_obs("mrr", 100_000.0 + wiggle, i, now))
                .await
                .unwrap();
        }
        engine
            .ingest(daily_obs("mrr", 180_000.0, 0, now))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_pipeline_emits_anomaly_and_recommendation() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_over(storage.clone());
        let now = Utc::now();
        seed_mrr_spike(&engine, now).await;

        let request = SweepRequest::metrics_only(
            TenantId::new("t1"),
            vec![MetricName::new("mrr")],
        );
        let report = engine.run_sweep(&request, now).await;

        assert_eq!(report.metrics_processed, 1);
        assert_eq!(report.anomalies_emitted, 1);
        assert_eq!(report.recommendations_created, 1);
        assert!(report.failures.is_empty());

        let anomalies = storage
            .query_anomalies(AnomalyQuery::default())
            .await
            .unwrap();
        assert_eq!(anomalies.len(), 1);
        assert!(anomalies[0].confidence >= 0.66);
    }

    #[tokio::test]
    async fn test_rerunning_the_sweep_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_over(storage.clone());
        let now = Utc::now();
        seed_mrr_spike(&engine, now).await;

        let request = SweepRequest::metrics_only(
            TenantId::new("t1"),
            vec![MetricName::new("mrr")],
        );
        engine.run_sweep(&request, now).await;
        let second = engine.run_sweep(&request, now).await;

        assert_eq!(second.anomalies_emitted, 0);
        assert_eq!(second.recommendations_created, 0);
        let anomalies = storage
            .query_anomalies(AnomalyQuery::default())
            .await
            .unwrap();
        assert_eq!(anomalies.len(), 1);
    }

    #[tokio::test]
    async fn test_correlated_aggregates_emit_pattern() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_over(storage.clone());
        let now = Utc::now();

        for i in 0..10 {
            let day = (now - Duration::days(10 - i)).date_naive();
            for (metric, value) in
                [("nps", 60.0 - i as f64 * 2.0), ("churn_rate", 4.0 + i as f64 * 0.3)]
            {
                storage
                    .upsert_daily_aggregate(DailyAggregate {
                        tenant_id: TenantId::new("t1"),
                        metric_name: MetricName::new(metric),
                        day,
                        mean: value,
                        min: value,
                        max: value,
                        sum: value,
                        std_dev: 0.0,
                        median: value,
                        sample_count: 1,
                        unit: "score".to_string(),
                        computed_at: now,
                    })
                    .await
                    .unwrap();
            }
        }

        let request = SweepRequest {
            tenant_id: TenantId::new("t1"),
            metrics: vec![],
            correlation_pairs: vec![(MetricName::new("nps"), MetricName::new("churn_rate"))],
            correlation_window_days: 30,
        };
        let report = engine.run_sweep(&request, now).await;

        assert_eq!(report.patterns_emitted, 1);
        // a fresh pattern synthesizes a recommendation too
        assert_eq!(report.recommendations_created, 1);
    }

    /// Storage wrapper that fails observation queries for one metric.
    #[derive(Debug)]
    struct FlakyStorage {
        inner: MemoryStorage,
        cursed_metric: MetricName,
    }

    #[async_trait]
    impl Storage for FlakyStorage {
        async fn upsert_observation(
            &self,
            observation: MetricObservation,
        ) -> pulse_core::Result<ObservationWrite> {
            self.inner.upsert_observation(observation).await
        }
        async fn get_observation(
            &self,
            key: &ObservationKey,
        ) -> pulse_core::Result<Option<MetricObservation>> {
            self.inner.get_observation(key).await
        }
        async fn query_observations(
            &self,
            query: ObservationQuery,
        ) -> pulse_core::Result<Vec<MetricObservation>> {
            if query.metric_name == self.cursed_metric {
                return Err(Error::storage("simulated backend outage"));
            }
            self.inner.query_observations(query).await
        }
        async fn upsert_daily_aggregate(
            &self,
            aggregate: DailyAggregate,
        ) -> pulse_core::Result<()> {
            self.inner.upsert_daily_aggregate(aggregate).await
        }
        async fn get_daily_aggregate(
            &self,
            tenant_id: &TenantId,
            metric_name: &MetricName,
            day: chrono::NaiveDate,
        ) -> pulse_core::Result<Option<DailyAggregate>> {
            self.inner.get_daily_aggregate(tenant_id, metric_name, day).await
        }
        async fn insert_anomaly(&self, anomaly: Anomaly) -> pulse_core::Result<()> {
            self.inner.insert_anomaly(anomaly).await
        }
        async fn get_anomaly(&self, id: Uuid) -> pulse_core::Result<Option<Anomaly>> {
            self.inner.get_anomaly(id).await
        }
        async fn update_anomaly(&self, anomaly: Anomaly) -> pulse_core::Result<()> {
            self.inner.update_anomaly(anomaly).await
        }
        async fn query_anomalies(
            &self,
            query: AnomalyQuery,
        ) -> pulse_core::Result<Vec<Anomaly>> {
            self.inner.query_anomalies(query).await
        }
        async fn insert_pattern(&self, pattern: Pattern) -> pulse_core::Result<()> {
            self.inner.insert_pattern(pattern).await
        }
        async fn update_pattern(&self, pattern: Pattern) -> pulse_core::Result<()> {
            self.inner.update_pattern(pattern).await
        }
        async fn query_patterns(
            &self,
            query: PatternQuery,
        ) -> pulse_core::Result<Vec<Pattern>> {
            self.inner.query_patterns(query).await
        }
        async fn insert_recommendation(
            &self,
            recommendation: Recommendation,
        ) -> pulse_core::Result<()> {
            self.inner.insert_recommendation(recommendation).await
        }
        async fn get_recommendation(
            &self,
            id: Uuid,
        ) -> pulse_core::Result<Option<Recommendation>> {
            self.inner.get_recommendation(id).await
        }
        async fn update_recommendation(
            &self,
            recommendation: Recommendation,
        ) -> pulse_core::Result<()> {
            self.inner.update_recommendation(recommendation).await
        }
        async fn query_recommendations(
            &self,
            query: RecommendationQuery,
        ) -> pulse_core::Result<Vec<Recommendation>> {
            self.inner.query_recommendations(query).await
        }
        async fn health_check(&self) -> pulse_core::Result<()> {
            self.inner.health_check().await
        }
    }

    #[tokio::test]
    async fn test_poisoned_metric_does_not_abort_the_sweep() {
        let storage = Arc::new(FlakyStorage {
            inner: MemoryStorage::new(),
            cursed_metric: MetricName::new("pipeline"),
        });
        let engine = engine_over(storage.clone());
        let now = Utc::now();
        seed_mrr_spike(&engine, now).await;

        let request = SweepRequest::metrics_only(
            TenantId::new("t1"),
            vec![MetricName::new("pipeline"), MetricName::new("mrr")],
        );
        let report = engine.run_sweep(&request, now).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].metric_name, MetricName::new("pipeline"));
        // the healthy metric still went all the way through
        assert_eq!(report.anomalies_emitted, 1);
        assert_eq!(report.recommendations_created, 1);
    }

    #[tokio::test]
    async fn test_expiry_sweep_expires_stale_rows() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_over(storage.clone());
        let now = Utc::now();

        let stale = Recommendation {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new("t1"),
            title: "old".to_string(),
            summary: "old".to_string(),
            action_items: vec![],
            impact: Impact::Low,
            urgency: Urgency::Low,
            confidence: 0.5,
            actionability_score: 0.4,
            source_anomalies: vec![],
            source_patterns: vec![],
            metric_names: vec!["mrr".to_string()],
            embedding: None,
            dedup_skipped: false,
            status: RecommendationStatus::Active,
            created_at: now - Duration::days(20),
            status_changed_at: now - Duration::days(20),
            outcome_notes: None,
        };
        storage.insert_recommendation(stale.clone()).await.unwrap();

        let request =
            SweepRequest::metrics_only(TenantId::new("t1"), vec![]);
        let report = engine.run_sweep(&request, now).await;

        assert_eq!(report.recommendations_expired, 1);
        let stored = storage
            .get_recommendation(stale.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, RecommendationStatus::Expired);
    }
}
