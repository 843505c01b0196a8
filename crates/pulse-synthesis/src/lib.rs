//! # Pulse Synthesis
//!
//! Converts anomalies and patterns into actionable, deduplicated
//! recommendations.
//!
//! Pipeline per tenant:
//! 1. Group signals by the metric set they reference
//! 2. Build one candidate per group (title, summary, action items, impact
//!    from worst severity, urgency from trigger recency, mean confidence)
//! 3. Embed title+summary via the external embedding provider (bounded
//!    timeout)
//! 4. Deduplicate against `active`/`viewed` recommendations of the trailing
//!    window by cosine similarity; a hit returns a reference to the
//!    existing row instead of creating a duplicate
//! 5. Persist survivors
//!
//! A provider failure never fails the batch: the candidate is persisted with
//! `dedup_skipped = true` and a warning.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod embedding;
pub mod similarity;

use chrono::{DateTime, Utc};
use embedding::EmbeddingProvider;
use pulse_core::config::SynthesisConfig;
use pulse_core::record::{Anomaly, Pattern, Recommendation};
use pulse_core::types::{EntityRef, Impact, RecommendationStatus, TenantId, Urgency};
use pulse_core::Result;
use pulse_storage::Storage;
use similarity::{BruteForceSimilarity, SimilaritySearch};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use embedding::{HashingEmbedder, HttpEmbeddingProvider, EMBEDDING_DIM};
pub use similarity::cosine_similarity;

/// Result of synthesizing one candidate.
#[derive(Debug, Clone)]
pub enum SynthesisOutcome {
    /// A new recommendation was persisted.
    Created(Recommendation),
    /// A near-duplicate already exists; no new row was created.
    Deduplicated {
        /// The existing recommendation.
        existing: EntityRef,
        /// Cosine similarity that triggered the suppression.
        similarity: f64,
    },
}

/// One group of signals referencing the same metric set.
#[derive(Debug, Default)]
struct SignalGroup<'a> {
    anomalies: Vec<&'a Anomaly>,
    patterns: Vec<&'a Pattern>,
}

/// Recommendation synthesizer.
#[derive(Debug)]
pub struct Synthesizer {
    storage: Arc<dyn Storage>,
    embedder: Arc<dyn EmbeddingProvider>,
    similarity: Arc<dyn SimilaritySearch>,
    config: SynthesisConfig,
}

impl Synthesizer {
    /// Create a synthesizer with the brute-force similarity scan.
    pub fn new(
        storage: Arc<dyn Storage>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: SynthesisConfig,
    ) -> Self {
        let similarity = Arc::new(BruteForceSimilarity::new(storage.clone()));
        Self {
            storage,
            embedder,
            similarity,
            config,
        }
    }

    /// Swap in a different similarity backend (e.g. an index-backed one).
    pub fn with_similarity(mut self, similarity: Arc<dyn SimilaritySearch>) -> Self {
        self.similarity = similarity;
        self
    }

    /// Synthesize recommendations from the given signals.
    ///
    /// Each returned outcome is either a persisted recommendation or a
    /// pointer to the existing near-duplicate that suppressed the candidate.
    pub async fn synthesize(
        &self,
        tenant_id: &TenantId,
        anomalies: &[Anomaly],
        patterns: &[Pattern],
        now: DateTime<Utc>,
    ) -> Result<Vec<SynthesisOutcome>> {
        let groups = group_signals(anomalies, patterns);
        let mut outcomes = Vec::with_capacity(groups.len());

        for (metric_set, group) in groups {
            let candidate = self.build_candidate(tenant_id, &metric_set, &group, now);
            let outcome = self.dedup_and_persist(tenant_id, candidate, now).await?;

            let label = match &outcome {
                SynthesisOutcome::Created(r) if r.dedup_skipped => "dedup_skipped",
                SynthesisOutcome::Created(_) => "created",
                SynthesisOutcome::Deduplicated { .. } => "deduplicated",
            };
            metrics::counter!("pulse_recommendations_total", "outcome" => label)
                .increment(1);
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    fn build_candidate(
        &self,
        tenant_id: &TenantId,
        metrics: &[String],
        group: &SignalGroup<'_>,
        now: DateTime<Utc>,
    ) -> Recommendation {
        let title = group_title(metrics, group);
        let summary = group_summary(metrics, group);
        let action_items = group_action_items(metrics, group);

        let impact = group_impact(group);
        let urgency = group_urgency(group, now);
        let confidence = group_confidence(group);
        let has_deviation = !group.anomalies.is_empty();
        let actionability_score = actionability(&action_items, has_deviation);

        Recommendation {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.clone(),
            title,
            summary,
            action_items,
            impact,
            urgency,
            confidence,
            actionability_score,
            source_anomalies: group.anomalies.iter().map(|a| a.id).collect(),
            source_patterns: group.patterns.iter().map(|p| p.id).collect(),
            metric_names: metrics.to_vec(),
            embedding: None,
            dedup_skipped: false,
            status: RecommendationStatus::Active,
            created_at: now,
            status_changed_at: now,
            outcome_notes: None,
        }
    }

    async fn dedup_and_persist(
        &self,
        tenant_id: &TenantId,
        mut candidate: Recommendation,
        now: DateTime<Utc>,
    ) -> Result<SynthesisOutcome> {
        let text = format!("{} {}", candidate.title, candidate.summary);
        let timeout = Duration::from_millis(self.config.embed_timeout_ms);

        let embedding =
            match tokio::time::timeout(timeout, self.embedder.embed(&text)).await {
                Ok(Ok(embedding)) => Some(embedding),
                Ok(Err(error)) => {
                    warn!(
                        tenant = %tenant_id,
                        %error,
                        "embedding provider failed, persisting without dedup"
                    );
                    None
                }
                Err(_) => {
                    warn!(
                        tenant = %tenant_id,
                        timeout_ms = self.config.embed_timeout_ms,
                        "embedding provider timed out, persisting without dedup"
                    );
                    None
                }
            };

        match embedding {
            Some(embedding) => {
                if let Some((existing, similarity)) = self
                    .similarity
                    .find_nearest(
                        tenant_id,
                        &embedding,
                        self.config.dedup_window_days,
                        self.config.similarity_threshold,
                        now,
                    )
                    .await?
                {
                    debug!(
                        tenant = %tenant_id,
                        existing = %existing.id,
                        similarity,
                        "candidate suppressed as near-duplicate"
                    );
                    return Ok(SynthesisOutcome::Deduplicated {
                        existing,
                        similarity,
                    });
                }
                candidate.embedding = Some(embedding);
            }
            None => {
                candidate.dedup_skipped = true;
            }
        }

        self.storage
            .insert_recommendation(candidate.clone())
            .await?;
        info!(
            tenant = %tenant_id,
            recommendation = %candidate.id,
            impact = ?candidate.impact,
            urgency = ?candidate.urgency,
            confidence = candidate.confidence,
            dedup_skipped = candidate.dedup_skipped,
            "recommendation created"
        );
        Ok(SynthesisOutcome::Created(candidate))
    }
}

/// Group signals by the sorted metric set they reference.
fn group_signals<'a>(
    anomalies: &'a [Anomaly],
    patterns: &'a [Pattern],
) -> BTreeMap<Vec<String>, SignalGroup<'a>> {
    let mut groups: BTreeMap<Vec<String>, SignalGroup<'a>> = BTreeMap::new();

    for anomaly in anomalies {
        let key = vec![anomaly.metric_name.as_str().to_string()];
        groups.entry(key).or_default().anomalies.push(anomaly);
    }
    for pattern in patterns {
        let mut key = pattern.series.clone();
        key.sort();
        groups.entry(key).or_default().patterns.push(pattern);
    }
    groups
}

fn group_title(metrics: &[String], group: &SignalGroup<'_>) -> String {
    if !group.anomalies.is_empty() {
        format!("Investigate unusual {} movement", metrics.join(", "))
    } else {
        format!("Review correlated movement across {}", metrics.join(" and "))
    }
}

fn group_summary(metrics: &[String], group: &SignalGroup<'_>) -> String {
    if let Some(worst) = group
        .anomalies
        .iter()
        .max_by(|a, b| a.severity.cmp(&b.severity))
    {
        format!(
            "{} moved to {:.2} against an expected {:.2}, a {:.1}% deviation \
             flagged by {} detection methods.",
            worst.metric_name,
            worst.current_value,
            worst.expected_value,
            worst.deviation_percent,
            worst.methods.len()
        )
    } else if let Some(strongest) = group.patterns.iter().max_by(|a, b| {
        a.correlation_strength
            .partial_cmp(&b.correlation_strength)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        format!(
            "{} co-moved with correlation strength {:.2} over {} aligned points. \
             The co-movement is correlational; no causal direction is implied.",
            metrics.join(" and "),
            strongest.correlation_strength,
            strongest.sample_count
        )
    } else {
        format!("Signals referencing {} warrant review.", metrics.join(", "))
    }
}

fn group_action_items(metrics: &[String], group: &SignalGroup<'_>) -> Vec<String> {
    let joined = metrics.join(" and ");
    if !group.anomalies.is_empty() {
        vec![
            format!("Review {} source data for reporting errors", joined),
            format!("Compare {} against its trailing 30-day history", joined),
            "Confirm whether recent launches or pricing changes explain the shift"
                .to_string(),
        ]
    } else {
        vec![
            format!("Review the overlap window between {}", joined),
            "Validate both series against their source systems".to_string(),
            "Escalate to the metric owners if the co-movement persists".to_string(),
        ]
    }
}

fn group_impact(group: &SignalGroup<'_>) -> Impact {
    if let Some(worst) = group.anomalies.iter().map(|a| a.severity).max() {
        Impact::from_severity(worst)
    } else {
        let strongest = group
            .patterns
            .iter()
            .map(|p| p.correlation_strength)
            .fold(0.0, f64::max);
        if strongest >= 0.8 {
            Impact::Medium
        } else {
            Impact::Low
        }
    }
}

fn group_urgency(group: &SignalGroup<'_>, now: DateTime<Utc>) -> Urgency {
    let latest_trigger = group
        .anomalies
        .iter()
        .map(|a| a.occurred_at)
        .chain(group.patterns.iter().map(|p| p.window_end))
        .max();

    match latest_trigger {
        Some(trigger) => Urgency::from_trigger_age_hours((now - trigger).num_hours()),
        None => Urgency::Low,
    }
}

fn group_confidence(group: &SignalGroup<'_>) -> f64 {
    let confidences: Vec<f64> = group
        .anomalies
        .iter()
        .map(|a| a.confidence)
        .chain(group.patterns.iter().map(|p| p.confidence))
        .collect();
    if confidences.is_empty() {
        return 0.0;
    }
    confidences.iter().sum::<f64>() / confidences.len() as f64
}

/// How concrete/executable the action items are, in [0,1].
///
/// 0.3 base, up to 0.45 for item count, 0.25 when every item leads with an
/// imperative verb, 0.1 when the group carries a concrete deviation.
fn actionability(items: &[String], has_deviation: bool) -> f64 {
    const VERBS: [&str; 8] = [
        "review",
        "check",
        "compare",
        "investigate",
        "confirm",
        "escalate",
        "audit",
        "validate",
    ];

    let base = 0.3;
    let per_item = 0.15 * items.len().min(3) as f64;
    let imperative = !items.is_empty()
        && items.iter().all(|item| {
            let first = item
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_lowercase();
            VERBS.contains(&first.as_str())
        });

    let score = base
        + per_item
        + if imperative { 0.25 } else { 0.0 }
        + if has_deviation { 0.1 } else { 0.0 };
    score.clamp(0.0, 1.0)
}

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::embedding::{
        EmbeddingProvider, HashingEmbedder, HttpEmbeddingProvider, EMBEDDING_DIM,
    };
    pub use crate::similarity::{
        cosine_similarity, BruteForceSimilarity, SimilaritySearch,
    };
    pub use crate::{SynthesisOutcome, Synthesizer};
}
