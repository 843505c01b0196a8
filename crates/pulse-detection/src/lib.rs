//! # Pulse Detection
//!
//! Ensemble anomaly detection and pattern correlation for the Pulse KPI
//! engine.
//!
//! This crate provides:
//! - **AnomalyDetector**: three independent statistical methods (z-score,
//!   IQR, trend/seasonal residual) vote on every new observation; an anomaly
//!   fires only on >=2-of-3 agreement, with magnitude-weighted ensemble
//!   confidence and severity tiering
//! - **PatternCorrelator**: Pearson correlation over aligned signal series
//!   pairs, emitting directional-agnostic patterns
//!
//! Both entry points are pure functions over their inputs: no hidden global
//! state, safely re-runnable over the same time window.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod correlate;
pub mod detectors;
pub mod engine;

pub use correlate::{PatternCorrelator, SignalSeries};
pub use detectors::{DetectionStrategy, MethodVote};
pub use engine::AnomalyDetector;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::correlate::{PatternCorrelator, SignalSeries};
    pub use crate::detectors::{
        iqr::IqrStrategy, trend::TrendStrategy, zscore::ZScoreStrategy,
        DetectionStrategy, MethodVote,
    };
    pub use crate::engine::AnomalyDetector;
}
