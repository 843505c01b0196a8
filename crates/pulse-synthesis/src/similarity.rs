//! Embedding similarity search.
//!
//! Abstracted as a capability so the synthesizer's contract never changes
//! between a proper vector index and the brute-force cosine scan shipped
//! here for smaller tenants.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_core::types::{EntityRef, RecommendationStatus, TenantId};
use pulse_core::Result;
use pulse_storage::query::RecommendationQuery;
use pulse_storage::Storage;
use std::sync::Arc;
use tracing::debug;

/// Cosine similarity of two equal-length vectors, in [-1, 1].
/// Mismatched or zero-norm inputs score 0.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.is_empty() || left.len() != right.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut left_norm_sq = 0.0f64;
    let mut right_norm_sq = 0.0f64;
    for (l, r) in left.iter().zip(right.iter()) {
        dot += (*l as f64) * (*r as f64);
        left_norm_sq += (*l as f64) * (*l as f64);
        right_norm_sq += (*r as f64) * (*r as f64);
    }
    if left_norm_sq <= f64::EPSILON || right_norm_sq <= f64::EPSILON {
        return 0.0;
    }
    dot / (left_norm_sq.sqrt() * right_norm_sq.sqrt())
}

/// Nearest-neighbor lookup over recently issued recommendations.
#[async_trait]
pub trait SimilaritySearch: Send + Sync + std::fmt::Debug {
    /// Find the most similar `active`/`viewed` recommendation of the tenant
    /// created within the trailing `within_days`, if any clears `threshold`.
    async fn find_nearest(
        &self,
        tenant_id: &TenantId,
        embedding: &[f32],
        within_days: i64,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<(EntityRef, f64)>>;
}

/// Brute-force cosine scan over the storage layer.
#[derive(Debug)]
pub struct BruteForceSimilarity {
    storage: Arc<dyn Storage>,
}

impl BruteForceSimilarity {
    /// Create a scan over the given storage backend.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SimilaritySearch for BruteForceSimilarity {
    async fn find_nearest(
        &self,
        tenant_id: &TenantId,
        embedding: &[f32],
        within_days: i64,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<(EntityRef, f64)>> {
        let query = RecommendationQuery {
            tenant_id: Some(tenant_id.clone()),
            statuses: vec![RecommendationStatus::Active, RecommendationStatus::Viewed],
            created_after: Some(now - chrono::Duration::days(within_days)),
            limit: None,
        };
        let candidates = self.storage.query_recommendations(query).await?;

        let mut best: Option<(EntityRef, f64)> = None;
        for candidate in &candidates {
            let Some(existing) = candidate.embedding.as_deref() else {
                continue;
            };
            let similarity = cosine_similarity(embedding, existing);
            if similarity >= threshold
                && best.as_ref().map_or(true, |(_, s)| similarity > *s)
            {
                best = Some((EntityRef::recommendation(candidate.id), similarity));
            }
        }

        if let Some((entity, similarity)) = &best {
            debug!(
                tenant = %tenant_id,
                existing = %entity.id,
                similarity,
                "near-duplicate recommendation found"
            );
        }
        Ok(best)
    }
}
