//! Typed query parameters for the storage layer.
//!
//! Queries are plain structs consumed by [`crate::Storage`] implementations;
//! nothing here constructs query strings at runtime.

use chrono::{DateTime, Utc};
use pulse_core::types::{
    AnomalyStatus, Granularity, MetricName, PatternStatus, RecommendationStatus,
    TenantId,
};

pub use pulse_core::types::TimeRange;

/// Observation query parameters.
#[derive(Debug, Clone)]
pub struct ObservationQuery {
    pub tenant_id: TenantId,
    pub metric_name: MetricName,
    /// Restrict to a time range, if set.
    pub range: Option<TimeRange>,
    /// Restrict to one granularity, if set.
    pub granularity: Option<Granularity>,
    /// Restrict to one source system, if set.
    pub source: Option<String>,
    /// Include forecast rows. Detection history excludes them.
    pub include_forecasts: bool,
    /// Maximum rows to return after ordering.
    pub limit: Option<usize>,
    /// Order newest-first when true, oldest-first otherwise.
    pub newest_first: bool,
}

impl ObservationQuery {
    /// Query everything for one (tenant, metric), oldest first.
    pub fn all(tenant_id: TenantId, metric_name: MetricName) -> Self {
        Self {
            tenant_id,
            metric_name,
            range: None,
            granularity: None,
            source: None,
            include_forecasts: true,
            limit: None,
            newest_first: false,
        }
    }

    /// Detection history: non-forecast rows strictly older than `before`,
    /// newest first, capped at `limit`.
    pub fn history(
        tenant_id: TenantId,
        metric_name: MetricName,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Self {
        Self {
            tenant_id,
            metric_name,
            range: Some(TimeRange::new(DateTime::<Utc>::MIN_UTC, before)),
            granularity: None,
            source: None,
            include_forecasts: false,
            limit: Some(limit),
            newest_first: true,
        }
    }
}

/// Anomaly query parameters.
#[derive(Debug, Clone, Default)]
pub struct AnomalyQuery {
    pub tenant_id: Option<TenantId>,
    pub metric_name: Option<MetricName>,
    pub status: Option<AnomalyStatus>,
    pub limit: Option<usize>,
}

/// Pattern query parameters.
#[derive(Debug, Clone, Default)]
pub struct PatternQuery {
    pub tenant_id: Option<TenantId>,
    pub status: Option<PatternStatus>,
}

/// Recommendation query parameters.
#[derive(Debug, Clone, Default)]
pub struct RecommendationQuery {
    pub tenant_id: Option<TenantId>,
    /// Restrict to these statuses, if non-empty.
    pub statuses: Vec<RecommendationStatus>,
    /// Restrict to rows created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_is_half_open() {
        let start = Utc::now();
        let end = start + chrono::Duration::hours(1);
        let range = TimeRange::new(start, end);
        assert!(range.contains(start));
        assert!(!range.contains(end));
    }

    #[test]
    fn test_history_query_excludes_forecasts() {
        let q = ObservationQuery::history(
            TenantId::new("t1"),
            MetricName::new("mrr"),
            Utc::now(),
            30,
        );
        assert!(!q.include_forecasts);
        assert!(q.newest_first);
        assert_eq!(q.limit, Some(30));
    }
}
