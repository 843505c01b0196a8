//! Engine configuration.
//!
//! Each component owns a config struct with production defaults; the
//! top-level [`EngineConfig`] aggregates them and can be loaded from a YAML
//! file with environment-variable overrides for the handful of knobs
//! operators actually turn.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Anomaly detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Rolling history window the detector evaluates against.
    pub history_window: usize,
    /// Below this many history points detection is disabled for the call.
    pub min_history: usize,
    /// Z-score threshold in standard deviations.
    pub zscore_threshold: f64,
    /// Stddev floor below which a series is treated as flat.
    pub flat_series_epsilon: f64,
    /// Absolute percentage deviation required on a flat series.
    pub flat_series_percent: f64,
    /// IQR fence multiplier.
    pub iqr_multiplier: f64,
    /// Trend residual threshold in residual standard deviations.
    pub trend_residual_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            history_window: 30,
            min_history: 7,
            zscore_threshold: 3.0,
            flat_series_epsilon: 1e-9,
            flat_series_percent: 50.0,
            iqr_multiplier: 1.5,
            trend_residual_threshold: 2.5,
        }
    }
}

/// Pattern correlation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Minimum overlapping aligned points required.
    pub min_overlap: usize,
    /// Minimum |r| to emit a pattern.
    pub min_strength: f64,
    /// Overlap size at which confidence saturates.
    pub saturation_points: usize,
    /// Days after which an unacted-on pattern expires.
    pub pattern_expiry_days: i64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            min_overlap: 5,
            min_strength: 0.6,
            saturation_points: 20,
            pattern_expiry_days: 14,
        }
    }
}

/// Recommendation synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Trailing window queried for deduplication, in days.
    pub dedup_window_days: i64,
    /// Cosine similarity above which a candidate is a duplicate.
    pub similarity_threshold: f64,
    /// Actionability floor for the default ranked list.
    pub actionability_floor: f64,
    /// Days after which an unmodified recommendation expires.
    pub recommendation_expiry_days: i64,
    /// Bounded timeout for the embedding provider call, in milliseconds.
    pub embed_timeout_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            dedup_window_days: 7,
            similarity_threshold: 0.85,
            actionability_floor: 0.5,
            recommendation_expiry_days: 14,
            embed_timeout_ms: 5_000,
        }
    }
}

/// Aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Float tolerance for the cached-aggregate consistency check.
    pub consistency_tolerance: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            consistency_tolerance: 1e-9,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub detection: DetectionConfig,
    pub correlation: CorrelationConfig,
    pub synthesis: SynthesisConfig,
    pub aggregation: AggregationConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("failed to read config file: {}", e)))?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| Error::config(format!("failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-variable overrides on top of the current values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("PULSE_HISTORY_WINDOW") {
            self.detection.history_window = v;
        }
        if let Some(v) = env_parse("PULSE_ZSCORE_THRESHOLD") {
            self.detection.zscore_threshold = v;
        }
        if let Some(v) = env_parse("PULSE_SIMILARITY_THRESHOLD") {
            self.synthesis.similarity_threshold = v;
        }
        if let Some(v) = env_parse("PULSE_EMBED_TIMEOUT_MS") {
            self.synthesis.embed_timeout_ms = v;
        }
        self
    }

    /// Validate cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.detection.min_history < 2 {
            return Err(Error::config("min_history must be at least 2"));
        }
        if self.detection.history_window < self.detection.min_history {
            return Err(Error::config(
                "history_window must be at least min_history",
            ));
        }
        if self.detection.zscore_threshold <= 0.0 {
            return Err(Error::config("zscore_threshold must be positive"));
        }
        if !(0.0..=1.0).contains(&self.correlation.min_strength) {
            return Err(Error::config("min_strength must be within [0, 1]"));
        }
        if self.correlation.min_overlap < 2 {
            return Err(Error::config("min_overlap must be at least 2"));
        }
        if !(0.0..=1.0).contains(&self.synthesis.similarity_threshold) {
            return Err(Error::config(
                "similarity_threshold must be within [0, 1]",
            ));
        }
        if self.synthesis.embed_timeout_ms == 0 {
            return Err(Error::config("embed_timeout_ms must be positive"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
