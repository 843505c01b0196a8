//! Detection method implementations.
//!
//! Each method is an independent [`DetectionStrategy`] producing at most one
//! [`MethodVote`]. The ensemble rule in [`crate::engine`] counts votes;
//! magnitude only ever influences confidence, never whether an anomaly
//! fires.

pub mod iqr;
pub mod trend;
pub mod zscore;

use pulse_core::types::{DetectionMethod, Granularity};

/// One method's verdict on a new value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodVote {
    /// Which method fired.
    pub method: DetectionMethod,
    /// The baseline the method expected the value near.
    pub expected: f64,
    /// How far beyond the method's own threshold the value landed,
    /// normalized by that threshold. Always >= 0 for a fired vote.
    pub excess: f64,
}

/// A pluggable detection method.
///
/// `history` arrives in chronological order (oldest first) and contains only
/// non-forecast values strictly older than `value`. A strategy returns
/// `None` both when the value is unremarkable and when the method cannot
/// evaluate the series (degenerate variance); an unevaluable method never
/// counts toward ensemble agreement.
pub trait DetectionStrategy: Send + Sync + std::fmt::Debug {
    /// Which method this strategy implements.
    fn method(&self) -> DetectionMethod;

    /// Evaluate `value` against `history`.
    fn evaluate(
        &self,
        history: &[f64],
        value: f64,
        granularity: Granularity,
    ) -> Option<MethodVote>;
}

/// Shared flat-series rule: with no spread to normalize by, require an
/// absolute percentage deviation above `percent_threshold` instead.
pub(crate) fn flat_series_vote(
    method: DetectionMethod,
    baseline: f64,
    value: f64,
    percent_threshold: f64,
) -> Option<MethodVote> {
    let denom = f64::max(baseline.abs(), f64::EPSILON);
    let percent = (value - baseline).abs() / denom * 100.0;
    if percent > percent_threshold {
        Some(MethodVote {
            method,
            expected: baseline,
            excess: (percent - percent_threshold) / percent_threshold,
        })
    } else {
        None
    }
}
