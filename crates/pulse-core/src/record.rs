//! Detected anomalies, correlation patterns, and synthesized
//! recommendations.
//!
//! All three records keep an audit trail: status changes go through the
//! transition tables in [`crate::types`] and illegal changes return
//! [`Error::InvalidTransition`] with the entity unchanged. Nothing here is
//! ever silently deleted.

use crate::error::{Error, Result};
use crate::types::{
    AnomalyStatus, DetectionMethod, Impact, MetricName, PatternStatus,
    RecommendationStatus, Severity, TenantId, Urgency,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a co-movement. Descriptive only; a pattern is a correlation,
/// never a causal claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternDirection {
    Positive,
    Negative,
}

/// A detected deviation for one metric at one occurrence time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub metric_name: MetricName,
    /// When the deviating observation occurred.
    pub occurred_at: DateTime<Utc>,
    pub current_value: f64,
    /// Method-derived baseline the value was expected near.
    pub expected_value: f64,
    /// Absolute deviation from the expected value.
    pub deviation: f64,
    /// Deviation as a percentage of the expected value.
    pub deviation_percent: f64,
    /// Detection methods that flagged the value.
    pub methods: Vec<DetectionMethod>,
    /// Ensemble confidence in [0,1]. A function only of method agreement and
    /// deviation magnitude, never hand-set.
    pub confidence: f64,
    pub severity: Severity,
    pub status: AnomalyStatus,
    pub detected_at: DateTime<Utc>,
    /// SHA-256 of the detection inputs, for the audit trail.
    pub inputs_hash: String,
    /// Actor that acknowledged the anomaly, if any.
    pub acknowledged_by: Option<String>,
    /// Notes captured on resolution.
    pub resolution_notes: Option<String>,
}

impl Anomaly {
    /// Apply a status transition, rejecting illegal changes.
    pub fn transition(&mut self, to: AnomalyStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(Error::invalid_transition(self.status, to));
        }
        self.status = to;
        Ok(())
    }

    /// Acknowledge the anomaly, recording the actor.
    pub fn acknowledge(&mut self, actor: impl Into<String>) -> Result<()> {
        self.transition(AnomalyStatus::Acknowledged)?;
        self.acknowledged_by = Some(actor.into());
        Ok(())
    }

    /// Resolve the anomaly, recording notes.
    pub fn resolve(&mut self, notes: impl Into<String>) -> Result<()> {
        self.transition(AnomalyStatus::Resolved)?;
        self.resolution_notes = Some(notes.into());
        Ok(())
    }
}

/// A detected co-movement between two or more signal series over a declared
/// period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Uuid,
    pub tenant_id: TenantId,
    /// Names of the correlated series, in input order.
    pub series: Vec<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// |Pearson r| over the overlapping points.
    pub correlation_strength: f64,
    pub direction: PatternDirection,
    /// Confidence in [0,1], scaling with overlap size.
    pub confidence: f64,
    /// Number of overlapping aligned points.
    pub sample_count: usize,
    pub status: PatternStatus,
    pub detected_at: DateTime<Utc>,
}

impl Pattern {
    /// Apply a status transition, rejecting illegal changes.
    pub fn transition(&mut self, to: PatternStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(Error::invalid_transition(self.status, to));
        }
        self.status = to;
        Ok(())
    }

    /// True once the pattern has sat unacted-on past the expiry window.
    pub fn is_expirable(&self, now: DateTime<Utc>, expiry_days: i64) -> bool {
        self.status == PatternStatus::Active
            && now - self.detected_at >= chrono::Duration::days(expiry_days)
    }
}

/// A synthesized, human-actionable suggestion referencing the signals that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub title: String,
    /// One to two sentence summary.
    pub summary: String,
    /// Ordered, concrete action items.
    pub action_items: Vec<String>,
    pub impact: Impact,
    pub urgency: Urgency,
    /// Mean of constituent anomaly/pattern confidences.
    pub confidence: f64,
    /// How concrete/executable the action items are, in [0,1].
    pub actionability_score: f64,
    pub source_anomalies: Vec<Uuid>,
    pub source_patterns: Vec<Uuid>,
    pub metric_names: Vec<String>,
    /// Embedding of title+summary, used solely for deduplication.
    pub embedding: Option<Vec<f32>>,
    /// Set when the embedding provider was unavailable and dedup was skipped.
    pub dedup_skipped: bool,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
    /// After-the-fact outcome feedback.
    pub outcome_notes: Option<String>,
}

impl Recommendation {
    /// Apply a status transition, rejecting illegal changes.
    pub fn transition(&mut self, to: RecommendationStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(Error::invalid_transition(self.status, to));
        }
        self.status = to;
        self.status_changed_at = now;
        Ok(())
    }

    /// True once the row has sat unmodified in a non-terminal status past the
    /// expiry window.
    pub fn is_expirable(&self, now: DateTime<Utc>, expiry_days: i64) -> bool {
        !self.status.is_terminal()
            && self.status.can_transition(RecommendationStatus::Expired)
            && now - self.status_changed_at >= chrono::Duration::days(expiry_days)
    }

    /// Read-time ranking score: never persisted.
    pub fn priority_score(&self) -> f64 {
        self.impact.weight() + self.urgency.weight() + self.confidence * 0.1
    }

    /// Whether the row is surfaced in the default ranked list.
    pub fn is_actionable(&self, floor: f64) -> bool {
        self.actionability_score >= floor
    }
}
