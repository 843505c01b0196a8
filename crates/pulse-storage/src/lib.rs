//! # Pulse Storage
//!
//! Data persistence layer for the Pulse KPI engine.
//!
//! This crate provides:
//! - The storage-agnostic [`Storage`] trait over the four logical
//!   collections: observations (append-mostly), daily aggregates
//!   (upsert-by-replace), anomalies and patterns (append + status mutation),
//!   recommendations (append + status mutation)
//! - [`MemoryStorage`], an in-memory reference backend
//! - [`locks::KeyedLocks`] for single-writer-per-(tenant, metric)
//!   serialization
//!
//! Observation writes are atomic upserts: a concurrent write to an existing
//! key resolves last-write-wins and reports the replaced row, so callers can
//! translate uniqueness conflicts into duplicate/correction outcomes instead
//! of crashing.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod locks;
pub mod query;

use async_trait::async_trait;
use chrono::NaiveDate;
use pulse_core::observation::{DailyAggregate, MetricObservation, ObservationKey};
use pulse_core::record::{Anomaly, Pattern, Recommendation};
use pulse_core::types::{MetricName, TenantId};
use pulse_core::{Error, Result};
use query::{AnomalyQuery, ObservationQuery, PatternQuery, RecommendationQuery};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Result of an observation upsert.
#[derive(Debug, Clone)]
pub enum ObservationWrite {
    /// No row existed for the key.
    Inserted,
    /// A row existed and was replaced (last-write-wins).
    Replaced {
        /// The row that was overwritten.
        previous: MetricObservation,
    },
}

/// Trait for storage backends.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Atomically insert or replace the observation for its uniqueness key.
    async fn upsert_observation(
        &self,
        observation: MetricObservation,
    ) -> Result<ObservationWrite>;

    /// Fetch one observation by uniqueness key.
    async fn get_observation(
        &self,
        key: &ObservationKey,
    ) -> Result<Option<MetricObservation>>;

    /// Query observations for one (tenant, metric).
    async fn query_observations(
        &self,
        query: ObservationQuery,
    ) -> Result<Vec<MetricObservation>>;

    /// Replace the daily aggregate for its (tenant, metric, day) key.
    async fn upsert_daily_aggregate(&self, aggregate: DailyAggregate) -> Result<()>;

    /// Fetch the cached daily aggregate, if any.
    async fn get_daily_aggregate(
        &self,
        tenant_id: &TenantId,
        metric_name: &MetricName,
        day: NaiveDate,
    ) -> Result<Option<DailyAggregate>>;

    /// Append a new anomaly.
    async fn insert_anomaly(&self, anomaly: Anomaly) -> Result<()>;

    /// Fetch an anomaly by id.
    async fn get_anomaly(&self, id: Uuid) -> Result<Option<Anomaly>>;

    /// Replace an existing anomaly (status mutation only; anomalies are
    /// never deleted).
    async fn update_anomaly(&self, anomaly: Anomaly) -> Result<()>;

    /// Query anomalies.
    async fn query_anomalies(&self, query: AnomalyQuery) -> Result<Vec<Anomaly>>;

    /// Append a new pattern.
    async fn insert_pattern(&self, pattern: Pattern) -> Result<()>;

    /// Replace an existing pattern.
    async fn update_pattern(&self, pattern: Pattern) -> Result<()>;

    /// Query patterns.
    async fn query_patterns(&self, query: PatternQuery) -> Result<Vec<Pattern>>;

    /// Append a new recommendation.
    async fn insert_recommendation(&self, recommendation: Recommendation) -> Result<()>;

    /// Fetch a recommendation by id.
    async fn get_recommendation(&self, id: Uuid) -> Result<Option<Recommendation>>;

    /// Replace an existing recommendation.
    async fn update_recommendation(&self, recommendation: Recommendation) -> Result<()>;

    /// Query recommendations.
    async fn query_recommendations(
        &self,
        query: RecommendationQuery,
    ) -> Result<Vec<Recommendation>>;

    /// Health check.
    async fn health_check(&self) -> Result<()>;
}

/// In-memory reference backend.
///
/// Suitable for tests and small single-process deployments; the trait is the
/// integration point for index-backed stores.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    observations: RwLock<HashMap<ObservationKey, MetricObservation>>,
    aggregates: RwLock<HashMap<(TenantId, MetricName, NaiveDate), DailyAggregate>>,
    anomalies: RwLock<HashMap<Uuid, Anomaly>>,
    patterns: RwLock<HashMap<Uuid, Pattern>>,
    recommendations: RwLock<HashMap<Uuid, Recommendation>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upsert_observation(
        &self,
        observation: MetricObservation,
    ) -> Result<ObservationWrite> {
        let key = observation.key();
        let mut observations = self.observations.write().await;
        match observations.insert(key, observation) {
            None => Ok(ObservationWrite::Inserted),
            Some(previous) => Ok(ObservationWrite::Replaced { previous }),
        }
    }

    async fn get_observation(
        &self,
        key: &ObservationKey,
    ) -> Result<Option<MetricObservation>> {
        Ok(self.observations.read().await.get(key).cloned())
    }

    async fn query_observations(
        &self,
        query: ObservationQuery,
    ) -> Result<Vec<MetricObservation>> {
        let observations = self.observations.read().await;
        let mut rows: Vec<MetricObservation> = observations
            .values()
            .filter(|o| o.tenant_id == query.tenant_id)
            .filter(|o| o.metric_name == query.metric_name)
            .filter(|o| query.include_forecasts || !o.is_forecast)
            .filter(|o| query.granularity.map_or(true, |g| o.granularity == g))
            .filter(|o| query.source.as_deref().map_or(true, |s| o.source == s))
            .filter(|o| query.range.map_or(true, |r| r.contains(o.timestamp)))
            .cloned()
            .collect();

        rows.sort_by_key(|o| o.timestamp);
        if query.newest_first {
            rows.reverse();
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn upsert_daily_aggregate(&self, aggregate: DailyAggregate) -> Result<()> {
        let key = (
            aggregate.tenant_id.clone(),
            aggregate.metric_name.clone(),
            aggregate.day,
        );
        self.aggregates.write().await.insert(key, aggregate);
        Ok(())
    }

    async fn get_daily_aggregate(
        &self,
        tenant_id: &TenantId,
        metric_name: &MetricName,
        day: NaiveDate,
    ) -> Result<Option<DailyAggregate>> {
        let key = (tenant_id.clone(), metric_name.clone(), day);
        Ok(self.aggregates.read().await.get(&key).cloned())
    }

    async fn insert_anomaly(&self, anomaly: Anomaly) -> Result<()> {
        self.anomalies.write().await.insert(anomaly.id, anomaly);
        Ok(())
    }

    async fn get_anomaly(&self, id: Uuid) -> Result<Option<Anomaly>> {
        Ok(self.anomalies.read().await.get(&id).cloned())
    }

    async fn update_anomaly(&self, anomaly: Anomaly) -> Result<()> {
        let mut anomalies = self.anomalies.write().await;
        if !anomalies.contains_key(&anomaly.id) {
            return Err(Error::storage(format!("unknown anomaly {}", anomaly.id)));
        }
        anomalies.insert(anomaly.id, anomaly);
        Ok(())
    }

    async fn query_anomalies(&self, query: AnomalyQuery) -> Result<Vec<Anomaly>> {
        let anomalies = self.anomalies.read().await;
        let mut rows: Vec<Anomaly> = anomalies
            .values()
            .filter(|a| query.tenant_id.as_ref().map_or(true, |t| &a.tenant_id == t))
            .filter(|a| {
                query
                    .metric_name
                    .as_ref()
                    .map_or(true, |m| &a.metric_name == m)
            })
            .filter(|a| query.status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert_pattern(&self, pattern: Pattern) -> Result<()> {
        self.patterns.write().await.insert(pattern.id, pattern);
        Ok(())
    }

    async fn update_pattern(&self, pattern: Pattern) -> Result<()> {
        let mut patterns = self.patterns.write().await;
        if !patterns.contains_key(&pattern.id) {
            return Err(Error::storage(format!("unknown pattern {}", pattern.id)));
        }
        patterns.insert(pattern.id, pattern);
        Ok(())
    }

    async fn query_patterns(&self, query: PatternQuery) -> Result<Vec<Pattern>> {
        let patterns = self.patterns.read().await;
        let mut rows: Vec<Pattern> = patterns
            .values()
            .filter(|p| query.tenant_id.as_ref().map_or(true, |t| &p.tenant_id == t))
            .filter(|p| query.status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(rows)
    }

    async fn insert_recommendation(&self, recommendation: Recommendation) -> Result<()> {
        self.recommendations
            .write()
            .await
            .insert(recommendation.id, recommendation);
        Ok(())
    }

    async fn get_recommendation(&self, id: Uuid) -> Result<Option<Recommendation>> {
        Ok(self.recommendations.read().await.get(&id).cloned())
    }

    async fn update_recommendation(&self, recommendation: Recommendation) -> Result<()> {
        let mut recommendations = self.recommendations.write().await;
        if !recommendations.contains_key(&recommendation.id) {
            return Err(Error::storage(format!(
                "unknown recommendation {}",
                recommendation.id
            )));
        }
        recommendations.insert(recommendation.id, recommendation);
        Ok(())
    }

    async fn query_recommendations(
        &self,
        query: RecommendationQuery,
    ) -> Result<Vec<Recommendation>> {
        let recommendations = self.recommendations.read().await;
        let mut rows: Vec<Recommendation> = recommendations
            .values()
            .filter(|r| query.tenant_id.as_ref().map_or(true, |t| &r.tenant_id == t))
            .filter(|r| query.statuses.is_empty() || query.statuses.contains(&r.status))
            .filter(|r| query.created_after.map_or(true, |t| r.created_at >= t))
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::locks::KeyedLocks;
    pub use crate::query::{
        AnomalyQuery, ObservationQuery, PatternQuery, RecommendationQuery, TimeRange,
    };
    pub use crate::{MemoryStorage, ObservationWrite, Storage};
}
