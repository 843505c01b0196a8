//! Shared identifier newtypes and closed enumerations.
//!
//! Statuses and severities are closed enums rather than strings so illegal
//! states are unrepresentable and the transition tables live in exactly one
//! place. Every entity belongs to one tenant; the engine never reads or
//! writes across tenant boundaries and assumes the caller enforces scoping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inclusive-start, exclusive-end time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a new range. `start` must precede `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether `ts` falls inside the range.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Tenant identifier. Opaque to the engine; issued by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create a new tenant ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the tenant ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is empty after trimming.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metric name, e.g. `mrr`, `churn_rate`, `burn_rate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricName(String);

impl MetricName {
    /// Create a new metric name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the metric name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the name is empty after trimming.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time bucket size of a metric observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Granularity {
    /// String representation used in logs and storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Quarterly => "quarterly",
            Granularity::Yearly => "yearly",
        }
    }

    /// Length of one full seasonal cycle in observations, where a cycle is
    /// meaningful for the bucket size. Quarterly/yearly series are too short
    /// for seasonal treatment.
    pub fn seasonal_cycle(&self) -> Option<usize> {
        match self {
            Granularity::Hourly => Some(24),
            Granularity::Daily => Some(7),
            Granularity::Weekly => Some(52),
            Granularity::Monthly => Some(12),
            Granularity::Quarterly | Granularity::Yearly => None,
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Statistical method that flagged a deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ZScore,
    Iqr,
    Trend,
}

impl DetectionMethod {
    /// String representation used in logs and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::ZScore => "zscore",
            DetectionMethod::Iqr => "iqr",
            DetectionMethod::Trend => "trend",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity tier derived from ensemble confidence.
///
/// Ordered so `Critical > High > Medium > Low` for view sorting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Business impact of a recommendation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    /// Weight used in the read-time priority score.
    pub fn weight(&self) -> f64 {
        match self {
            Impact::High => 0.5,
            Impact::Medium => 0.3,
            Impact::Low => 0.1,
        }
    }

    /// Derive impact from the worst severity tier in a signal group.
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical | Severity::High => Impact::High,
            Severity::Medium => Impact::Medium,
            Severity::Low => Impact::Low,
        }
    }
}

/// Urgency of a recommendation, derived from trigger recency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Urgent,
}

impl Urgency {
    /// Weight used in the read-time priority score.
    pub fn weight(&self) -> f64 {
        match self {
            Urgency::Urgent => 0.4,
            Urgency::High => 0.3,
            Urgency::Medium => 0.2,
            Urgency::Low => 0.1,
        }
    }

    /// Derive urgency from the age of the most recent triggering signal.
    pub fn from_trigger_age_hours(age_hours: i64) -> Self {
        if age_hours <= 24 {
            Urgency::Urgent
        } else if age_hours <= 72 {
            Urgency::High
        } else if age_hours <= 24 * 7 {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }
}

// =============================================================================
// STATUS MACHINES
// =============================================================================

/// Lifecycle status of an anomaly. Mutated only by human action; anomalies
/// are never silently deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    Active,
    Acknowledged,
    Resolved,
    FalsePositive,
    Suppressed,
}

impl AnomalyStatus {
    /// Whether a transition to `to` is legal.
    pub fn can_transition(&self, to: AnomalyStatus) -> bool {
        use AnomalyStatus::*;
        matches!(
            (*self, to),
            (Active, Acknowledged)
                | (Active, Resolved)
                | (Active, FalsePositive)
                | (Active, Suppressed)
                | (Acknowledged, Resolved)
                | (Acknowledged, FalsePositive)
                | (Suppressed, Active)
        )
    }

    /// Terminal statuses permit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnomalyStatus::Resolved | AnomalyStatus::FalsePositive)
    }
}

impl std::fmt::Display for AnomalyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnomalyStatus::Active => "active",
            AnomalyStatus::Acknowledged => "acknowledged",
            AnomalyStatus::Resolved => "resolved",
            AnomalyStatus::FalsePositive => "false_positive",
            AnomalyStatus::Suppressed => "suppressed",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle status of a detected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Active,
    Expired,
}

impl PatternStatus {
    /// Whether a transition to `to` is legal.
    pub fn can_transition(&self, to: PatternStatus) -> bool {
        matches!(
            (*self, to),
            (PatternStatus::Active, PatternStatus::Expired)
        )
    }
}

impl std::fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PatternStatus::Active => "active",
            PatternStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle status of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Active,
    Viewed,
    ActedOn,
    Dismissed,
    Expired,
}

impl RecommendationStatus {
    /// Whether a transition to `to` is legal.
    pub fn can_transition(&self, to: RecommendationStatus) -> bool {
        use RecommendationStatus::*;
        matches!(
            (*self, to),
            (Active, Viewed)
                | (Active, Dismissed)
                | (Active, Expired)
                | (Viewed, ActedOn)
                | (Viewed, Dismissed)
                | (Viewed, Expired)
        )
    }

    /// Terminal statuses permit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecommendationStatus::ActedOn
                | RecommendationStatus::Dismissed
                | RecommendationStatus::Expired
        )
    }
}

impl std::fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecommendationStatus::Active => "active",
            RecommendationStatus::Viewed => "viewed",
            RecommendationStatus::ActedOn => "acted_on",
            RecommendationStatus::Dismissed => "dismissed",
            RecommendationStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Kind of entity a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Anomaly,
    Pattern,
    Recommendation,
}

/// Typed pointer to an existing entity, returned instead of creating a
/// near-duplicate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    /// Reference an existing recommendation.
    pub fn recommendation(id: Uuid) -> Self {
        Self {
            kind: EntityKind::Recommendation,
            id,
        }
    }
}
