//! Read-only delivery projections.
//!
//! Consumed by the briefing/notification layer. No mutation path is exposed
//! here; priority scores are computed on read and never persisted.

use chrono::{DateTime, Utc};
use pulse_core::config::EngineConfig;
use pulse_core::record::{Anomaly, Recommendation};
use pulse_core::types::{AnomalyStatus, MetricName, RecommendationStatus, TenantId};
use pulse_core::Result;
use pulse_storage::query::{AnomalyQuery, ObservationQuery, RecommendationQuery};
use pulse_storage::Storage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Latest value and week-over-week movement for one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub metric_name: MetricName,
    pub latest_value: f64,
    pub unit: String,
    pub as_of: DateTime<Utc>,
    /// Percent change versus the nearest observation at least seven days
    /// older, when one exists.
    pub week_over_week_percent: Option<f64>,
}

/// A recommendation with its read-time priority score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedRecommendation {
    pub recommendation: Recommendation,
    pub priority_score: f64,
}

/// Read-only query surface over the four collections.
#[derive(Debug)]
pub struct DeliveryView {
    storage: Arc<dyn Storage>,
    config: EngineConfig,
}

impl DeliveryView {
    /// Create a view over the given storage backend.
    pub fn new(storage: Arc<dyn Storage>, config: EngineConfig) -> Self {
        Self { storage, config }
    }

    /// Latest non-forecast value plus week-over-week percent change.
    pub async fn metric_snapshot(
        &self,
        tenant_id: &TenantId,
        metric_name: &MetricName,
    ) -> Result<Option<MetricSnapshot>> {
        let mut query = ObservationQuery::all(tenant_id.clone(), metric_name.clone());
        query.include_forecasts = false;
        query.newest_first = true;
        query.limit = Some(1);
        let Some(latest) = self
            .storage
            .query_observations(query)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let week_ago = latest.timestamp - chrono::Duration::days(7);
        let mut baseline_query =
            ObservationQuery::all(tenant_id.clone(), metric_name.clone());
        baseline_query.include_forecasts = false;
        baseline_query.newest_first = true;
        baseline_query.range = Some(pulse_core::types::TimeRange::new(
            DateTime::<Utc>::MIN_UTC,
            week_ago + chrono::Duration::seconds(1),
        ));
        baseline_query.limit = Some(1);
        let baseline = self
            .storage
            .query_observations(baseline_query)
            .await?
            .into_iter()
            .next();

        let week_over_week_percent = baseline.and_then(|b| {
            if b.value.abs() > f64::EPSILON {
                Some((latest.value - b.value) / b.value.abs() * 100.0)
            } else {
                None
            }
        });

        Ok(Some(MetricSnapshot {
            metric_name: metric_name.clone(),
            latest_value: latest.value,
            unit: latest.unit,
            as_of: latest.timestamp,
            week_over_week_percent,
        }))
    }

    /// Active anomalies ordered by severity, then recency.
    pub async fn active_anomalies(&self, tenant_id: &TenantId) -> Result<Vec<Anomaly>> {
        let mut anomalies = self
            .storage
            .query_anomalies(AnomalyQuery {
                tenant_id: Some(tenant_id.clone()),
                metric_name: None,
                status: Some(AnomalyStatus::Active),
                limit: None,
            })
            .await?;

        anomalies.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.occurred_at.cmp(&a.occurred_at))
        });
        Ok(anomalies)
    }

    /// Actionable recommendations ordered by priority score, ties broken by
    /// recency. Lower-actionability rows persist but are filtered from this
    /// default list.
    pub async fn ranked_recommendations(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<RankedRecommendation>> {
        let recommendations = self
            .storage
            .query_recommendations(RecommendationQuery {
                tenant_id: Some(tenant_id.clone()),
                statuses: vec![
                    RecommendationStatus::Active,
                    RecommendationStatus::Viewed,
                ],
                created_after: None,
                limit: None,
            })
            .await?;

        let floor = self.config.synthesis.actionability_floor;
        let mut ranked: Vec<RankedRecommendation> = recommendations
            .into_iter()
            .filter(|r| r.is_actionable(floor))
            .map(|r| {
                let priority_score = r.priority_score();
                RankedRecommendation {
                    recommendation: r,
                    priority_score,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.recommendation
                        .created_at
                        .cmp(&a.recommendation.created_at)
                })
        });
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::observation::MetricObservation;
    use pulse_core::types::{DetectionMethod, Granularity, Impact, Severity, Urgency};
    use pulse_storage::{MemoryStorage, Storage};
    use uuid::Uuid;

    fn view_over(storage: Arc<MemoryStorage>) -> DeliveryView {
        DeliveryView::new(storage, EngineConfig::default())
    }

    fn obs(metric: &str, value: f64, days_ago: i64, now: DateTime<Utc>) -> MetricObservation {
        MetricObservation::new(
            TenantId::new("t1"),
            MetricName::new(metric),
            value,
            "usd",
            now - chrono::Duration::days(days_ago),
            Granularity::Daily,
            "crm",
        )
    }

    fn anomaly(severity: Severity, days_ago: i64, now: DateTime<Utc>) -> Anomaly {
        Anomaly {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new("t1"),
            metric_name: MetricName::new("mrr"),
            occurred_at: now - chrono::Duration::days(days_ago),
            current_value: 1.0,
            expected_value: 2.0,
            deviation: -1.0,
            deviation_percent: 50.0,
            methods: vec![DetectionMethod::ZScore, DetectionMethod::Iqr],
            confidence: 0.8,
            severity,
            status: AnomalyStatus::Active,
            detected_at: now,
            inputs_hash: "h".to_string(),
            acknowledged_by: None,
            resolution_notes: None,
        }
    }

    fn recommendation(
        actionability: f64,
        impact: Impact,
        urgency: Urgency,
        now: DateTime<Utc>,
    ) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new("t1"),
            title: "t".to_string(),
            summary: "s".to_string(),
            action_items: vec!["Review data".to_string()],
            impact,
            urgency,
            confidence: 0.8,
            actionability_score: actionability,
            source_anomalies: vec![],
            source_patterns: vec![],
            metric_names: vec!["mrr".to_string()],
            embedding: None,
            dedup_skipped: false,
            status: RecommendationStatus::Active,
            created_at: now,
            status_changed_at: now,
            outcome_notes: None,
        }
    }

    #[tokio::test]
    async fn test_snapshot_week_over_week() {
        let storage = Arc::new(MemoryStorage::new());
        let now = Utc::now();
        storage.upsert_observation(obs("mrr", 100.0, 7, now)).await.unwrap();
        storage.upsert_observation(obs("mrr", 110.0, 0, now)).await.unwrap();

        let snapshot = view_over(storage)
            .metric_snapshot(&TenantId::new("t1"), &MetricName::new("mrr"))
            .await
            .unwrap()
            .unwrap();

        assert!((snapshot.latest_value - 110.0).abs() < 1e-12);
        assert!((snapshot.week_over_week_percent.unwrap() - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_snapshot_without_weekly_baseline() {
        let storage = Arc::new(MemoryStorage::new());
        let now = Utc::now();
        storage.upsert_observation(obs("mrr", 100.0, 2, now)).await.unwrap();
        storage.upsert_observation(obs("mrr", 110.0, 0, now)).await.unwrap();

        let snapshot = view_over(storage)
            .metric_snapshot(&TenantId::new("t1"), &MetricName::new("mrr"))
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.week_over_week_percent.is_none());
    }

    #[tokio::test]
    async fn test_active_anomalies_ordered_by_severity_then_recency() {
        let storage = Arc::new(MemoryStorage::new());
        let now = Utc::now();
        storage.insert_anomaly(anomaly(Severity::Medium, 1, now)).await.unwrap();
        storage.insert_anomaly(anomaly(Severity::Critical, 5, now)).await.unwrap();
        storage.insert_anomaly(anomaly(Severity::Critical, 2, now)).await.unwrap();

        let mut resolved = anomaly(Severity::Critical, 0, now);
        resolved.status = AnomalyStatus::Resolved;
        storage.insert_anomaly(resolved).await.unwrap();

        let anomalies = view_over(storage)
            .active_anomalies(&TenantId::new("t1"))
            .await
            .unwrap();

        assert_eq!(anomalies.len(), 3);
        assert_eq!(anomalies[0].severity, Severity::Critical);
        assert_eq!(anomalies[1].severity, Severity::Critical);
        assert!(anomalies[0].occurred_at > anomalies[1].occurred_at);
        assert_eq!(anomalies[2].severity, Severity::Medium);
    }

    #[tokio::test]
    async fn test_ranked_recommendations_filter_and_order() {
        let storage = Arc::new(MemoryStorage::new());
        let now = Utc::now();
        storage
            .insert_recommendation(recommendation(0.9, Impact::Low, Urgency::Low, now))
            .await
            .unwrap();
        storage
            .insert_recommendation(recommendation(0.9, Impact::High, Urgency::Urgent, now))
            .await
            .unwrap();
        // below the actionability floor: persisted but not surfaced
        storage
            .insert_recommendation(recommendation(0.3, Impact::High, Urgency::Urgent, now))
            .await
            .unwrap();

        let ranked = view_over(storage)
            .ranked_recommendations(&TenantId::new("t1"))
            .await
            .unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].recommendation.impact, Impact::High);
        // 0.5 + 0.4 + 0.08
        assert!((ranked[0].priority_score - 0.98).abs() < 1e-9);
        assert!(ranked[0].priority_score > ranked[1].priority_score);
    }
}
