//! Human status actions.
//!
//! The only mutation paths into anomalies and recommendations after
//! creation. Every change is validated against the entity state machines;
//! an illegal transition returns [`Error::InvalidTransition`] and leaves the
//! stored entity unchanged.

use crate::Engine;
use chrono::Utc;
use pulse_core::record::{Anomaly, Recommendation};
use pulse_core::types::{AnomalyStatus, RecommendationStatus};
use pulse_core::{Error, Result};
use tracing::info;
use uuid::Uuid;

impl Engine {
    /// Acknowledge an active anomaly, recording the actor.
    pub async fn acknowledge_anomaly(
        &self,
        anomaly_id: Uuid,
        actor: &str,
    ) -> Result<Anomaly> {
        let mut anomaly = self.load_anomaly(anomaly_id).await?;
        anomaly.acknowledge(actor)?;
        self.storage.update_anomaly(anomaly.clone()).await?;
        info!(anomaly = %anomaly_id, actor, "anomaly acknowledged");
        Ok(anomaly)
    }

    /// Resolve an anomaly, recording notes.
    pub async fn resolve_anomaly(&self, anomaly_id: Uuid, notes: &str) -> Result<Anomaly> {
        let mut anomaly = self.load_anomaly(anomaly_id).await?;
        anomaly.resolve(notes)?;
        self.storage.update_anomaly(anomaly.clone()).await?;
        info!(anomaly = %anomaly_id, "anomaly resolved");
        Ok(anomaly)
    }

    /// Mark an anomaly as a false positive.
    pub async fn mark_anomaly_false_positive(&self, anomaly_id: Uuid) -> Result<Anomaly> {
        self.transition_anomaly(anomaly_id, AnomalyStatus::FalsePositive)
            .await
    }

    /// Suppress an active anomaly.
    pub async fn suppress_anomaly(&self, anomaly_id: Uuid) -> Result<Anomaly> {
        self.transition_anomaly(anomaly_id, AnomalyStatus::Suppressed)
            .await
    }

    /// Reopen a suppressed anomaly.
    pub async fn reopen_anomaly(&self, anomaly_id: Uuid) -> Result<Anomaly> {
        self.transition_anomaly(anomaly_id, AnomalyStatus::Active)
            .await
    }

    /// Apply a validated status change to a recommendation, optionally
    /// recording a reason into the outcome notes.
    pub async fn mark_recommendation(
        &self,
        recommendation_id: Uuid,
        status: RecommendationStatus,
        reason: Option<&str>,
    ) -> Result<Recommendation> {
        let mut recommendation = self
            .storage
            .get_recommendation(recommendation_id)
            .await?
            .ok_or_else(|| {
                Error::validation(format!("unknown recommendation {}", recommendation_id))
            })?;

        recommendation.transition(status, Utc::now())?;
        if let Some(reason) = reason {
            recommendation.outcome_notes = Some(reason.to_string());
        }
        self.storage
            .update_recommendation(recommendation.clone())
            .await?;
        info!(
            recommendation = %recommendation_id,
            status = %status,
            "recommendation status changed"
        );
        Ok(recommendation)
    }

    async fn transition_anomaly(
        &self,
        anomaly_id: Uuid,
        to: AnomalyStatus,
    ) -> Result<Anomaly> {
        let mut anomaly = self.load_anomaly(anomaly_id).await?;
        anomaly.transition(to)?;
        self.storage.update_anomaly(anomaly.clone()).await?;
        info!(anomaly = %anomaly_id, status = %to, "anomaly status changed");
        Ok(anomaly)
    }

    async fn load_anomaly(&self, anomaly_id: Uuid) -> Result<Anomaly> {
        self.storage
            .get_anomaly(anomaly_id)
            .await?
            .ok_or_else(|| Error::validation(format!("unknown anomaly {}", anomaly_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::config::EngineConfig;
    use pulse_core::types::{
        DetectionMethod, Impact, MetricName, Severity, TenantId, Urgency,
    };
    use pulse_storage::{MemoryStorage, Storage};
    use pulse_synthesis::HashingEmbedder;
    use std::sync::Arc;

    fn engine() -> (Engine, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let engine = Engine::new(
            storage.clone(),
            Arc::new(HashingEmbedder::new()),
            EngineConfig::default(),
        )
        .unwrap();
        (engine, storage)
    }

    async fn seeded_anomaly(storage: &MemoryStorage) -> Anomaly {
        let anomaly = Anomaly {
            id: uuid::Uuid::new_v4(),
            tenant_id: TenantId::new("t1"),
            metric_name: MetricName::new("mrr"),
            occurred_at: Utc::now(),
            current_value: 1.0,
            expected_value: 2.0,
            deviation: -1.0,
            deviation_percent: 50.0,
            methods: vec![DetectionMethod::ZScore, DetectionMethod::Iqr],
            confidence: 0.8,
            severity: Severity::High,
            status: AnomalyStatus::Active,
            detected_at: Utc::now(),
            inputs_hash: "h".to_string(),
            acknowledged_by: None,
            resolution_notes: None,
        };
        storage.insert_anomaly(anomaly.clone()).await.unwrap();
        anomaly
    }

    async fn seeded_recommendation(storage: &MemoryStorage) -> Recommendation {
        let now = Utc::now();
        let rec = Recommendation {
            id: uuid::Uuid::new_v4(),
            tenant_id: TenantId::new("t1"),
            title: "t".to_string(),
            summary: "s".to_string(),
            action_items: vec![],
            impact: Impact::High,
            urgency: Urgency::High,
            confidence: 0.7,
            actionability_score: 0.8,
            source_anomalies: vec![],
            source_patterns: vec![],
            metric_names: vec!["mrr".to_string()],
            embedding: None,
            dedup_skipped: false,
            status: RecommendationStatus::Active,
            created_at: now,
            status_changed_at: now,
            outcome_notes: None,
        };
        storage.insert_recommendation(rec.clone()).await.unwrap();
        rec
    }

    #[tokio::test]
    async fn test_acknowledge_then_resolve() {
        let (engine, storage) = engine();
        let anomaly = seeded_anomaly(&storage).await;

        let acked = engine
            .acknowledge_anomaly(anomaly.id, "ops@example.com")
            .await
            .unwrap();
        assert_eq!(acked.status, AnomalyStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("ops@example.com"));

        let resolved = engine
            .resolve_anomaly(anomaly.id, "billing export fixed")
            .await
            .unwrap();
        assert_eq!(resolved.status, AnomalyStatus::Resolved);

        // terminal: no further mutation, stored row unchanged
        let err = engine.suppress_anomaly(anomaly.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        let stored = storage.get_anomaly(anomaly.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnomalyStatus::Resolved);
    }

    #[tokio::test]
    async fn test_suppress_and_reopen() {
        let (engine, storage) = engine();
        let anomaly = seeded_anomaly(&storage).await;

        engine.suppress_anomaly(anomaly.id).await.unwrap();
        let reopened = engine.reopen_anomaly(anomaly.id).await.unwrap();
        assert_eq!(reopened.status, AnomalyStatus::Active);
    }

    #[tokio::test]
    async fn test_recommendation_lifecycle_and_terminal_guard() {
        let (engine, storage) = engine();
        let rec = seeded_recommendation(&storage).await;

        engine
            .mark_recommendation(rec.id, RecommendationStatus::Viewed, None)
            .await
            .unwrap();
        let acted = engine
            .mark_recommendation(
                rec.id,
                RecommendationStatus::ActedOn,
                Some("paused the campaign"),
            )
            .await
            .unwrap();
        assert_eq!(acted.status, RecommendationStatus::ActedOn);
        assert_eq!(acted.outcome_notes.as_deref(), Some("paused the campaign"));

        for target in [
            RecommendationStatus::Active,
            RecommendationStatus::Viewed,
            RecommendationStatus::Dismissed,
            RecommendationStatus::Expired,
        ] {
            let err = engine
                .mark_recommendation(rec.id, target, None)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidTransition { .. }));
        }
        let stored = storage.get_recommendation(rec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecommendationStatus::ActedOn);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_validation_errors() {
        let (engine, _storage) = engine();
        let err = engine
            .acknowledge_anomaly(uuid::Uuid::new_v4(), "nobody")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
