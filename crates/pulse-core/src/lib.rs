//! # Pulse Core
//!
//! Shared types for the Pulse KPI anomaly detection and recommendation
//! synthesis engine.
//!
//! This crate provides:
//! - Identifier newtypes and closed status/severity enumerations
//! - The four persisted entities: observations, daily aggregates, anomalies
//!   and patterns, recommendations
//! - The engine-wide error taxonomy
//! - Component configuration with YAML loading and env overrides

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod error;
pub mod observation;
pub mod record;
pub mod stats;
pub mod types;

pub use error::{Error, Result};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::config::{
        AggregationConfig, CorrelationConfig, DetectionConfig, EngineConfig,
        SynthesisConfig,
    };
    pub use crate::error::{Error, Result};
    pub use crate::observation::{DailyAggregate, MetricObservation, ObservationKey};
    pub use crate::record::{Anomaly, Pattern, PatternDirection, Recommendation};
    pub use crate::types::{
        AnomalyStatus, DetectionMethod, EntityKind, EntityRef, Granularity, Impact,
        MetricName, PatternStatus, RecommendationStatus, Severity, TenantId, TimeRange,
        Urgency,
    };
}
