//! # Pulse Ingestion
//!
//! Validated intake of KPI observations, plus the daily aggregator.
//!
//! Ingestion is the only write path into the metric store. It:
//! - rejects malformed observations (NaN/Infinity, blank unit or
//!   identifiers, granularity mismatch with existing history)
//! - resolves duplicates: an identical (key, value) pair is a benign
//!   duplicate, not an error and not a second row
//! - accepts late-arriving corrections, recording the replaced value in
//!   `previous_value`/`change_percent` for downstream consumers
//!
//! Ingestion may run concurrently from multiple source adapters; uniqueness
//! conflicts at the storage layer resolve last-write-wins and are translated
//! into outcomes here, never into crashes.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod aggregate;

use pulse_core::observation::{values_equal, MetricObservation};
use pulse_core::{Error, Result};
use pulse_storage::query::ObservationQuery;
use pulse_storage::{ObservationWrite, Storage};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use aggregate::Aggregator;

/// Outcome of one ingest call.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    /// New observation stored.
    Accepted,
    /// Identical key and value already stored; nothing written.
    Duplicate,
    /// Key existed with a different value; replaced last-write-wins.
    Corrected {
        /// Value that was overwritten.
        previous_value: f64,
        /// Percent change versus the prior value, when defined.
        change_percent: Option<f64>,
    },
}

impl IngestOutcome {
    /// Metrics label for the outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Accepted => "accepted",
            IngestOutcome::Duplicate => "duplicate",
            IngestOutcome::Corrected { .. } => "corrected",
        }
    }
}

/// Validated intake into the metric store.
#[derive(Debug)]
pub struct Ingestor {
    storage: Arc<dyn Storage>,
}

impl Ingestor {
    /// Create an ingestor over the given storage backend.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Validate and store one observation.
    ///
    /// Validation failures return [`Error::Validation`] and store nothing.
    pub async fn ingest(&self, observation: MetricObservation) -> Result<IngestOutcome> {
        self.validate(&observation).await?;

        let key = observation.key();
        let outcome = match self.storage.get_observation(&key).await? {
            Some(existing) if values_equal(existing.value, observation.value) => {
                // flag corrections are the one permitted mutation on an
                // otherwise-identical row
                if existing.is_forecast != observation.is_forecast
                    || existing.is_target != observation.is_target
                {
                    let mut updated = existing;
                    updated.is_forecast = observation.is_forecast;
                    updated.is_target = observation.is_target;
                    self.storage.upsert_observation(updated).await?;
                    info!(
                        tenant = %key.tenant_id,
                        metric = %key.metric_name,
                        "forecast/target flag correction applied"
                    );
                    IngestOutcome::Accepted
                } else {
                    debug!(
                        tenant = %observation.tenant_id,
                        metric = %observation.metric_name,
                        value = observation.value,
                        "duplicate observation ignored"
                    );
                    IngestOutcome::Duplicate
                }
            }
            Some(existing) => {
                let corrected = observation.with_correction_of(existing.value);
                let previous_value = existing.value;
                let change_percent = corrected.change_percent;
                self.storage.upsert_observation(corrected).await?;
                info!(
                    tenant = %key.tenant_id,
                    metric = %key.metric_name,
                    previous = previous_value,
                    "late-arriving correction applied"
                );
                IngestOutcome::Corrected {
                    previous_value,
                    change_percent,
                }
            }
            None => match self.storage.upsert_observation(observation).await? {
                ObservationWrite::Inserted => IngestOutcome::Accepted,
                // Lost a race with a concurrent writer for the same key.
                // Uniqueness conflicts resolve last-write-wins; translate
                // into the correction outcome instead of failing.
                ObservationWrite::Replaced { previous } => {
                    warn!(
                        tenant = %key.tenant_id,
                        metric = %key.metric_name,
                        "concurrent write to the same observation key"
                    );
                    self.annotate_race(&key, previous.value).await?
                }
            },
        };

        metrics::counter!(
            "pulse_ingest_total",
            "outcome" => outcome.as_str()
        )
        .increment(1);

        Ok(outcome)
    }

    /// Re-annotate the stored row after a lost upsert race so the correction
    /// fields reflect the value that was actually replaced.
    async fn annotate_race(
        &self,
        key: &pulse_core::observation::ObservationKey,
        prior_value: f64,
    ) -> Result<IngestOutcome> {
        let Some(stored) = self.storage.get_observation(key).await? else {
            return Ok(IngestOutcome::Accepted);
        };
        if values_equal(stored.value, prior_value) {
            return Ok(IngestOutcome::Duplicate);
        }
        let annotated = stored.with_correction_of(prior_value);
        let change_percent = annotated.change_percent;
        self.storage.upsert_observation(annotated).await?;
        Ok(IngestOutcome::Corrected {
            previous_value: prior_value,
            change_percent,
        })
    }

    async fn validate(&self, observation: &MetricObservation) -> Result<()> {
        if !observation.value.is_finite() {
            return Err(Error::validation(format!(
                "non-finite value {} for metric {}",
                observation.value, observation.metric_name
            )));
        }
        if observation.unit.trim().is_empty() {
            return Err(Error::validation(format!(
                "missing unit for metric {}",
                observation.metric_name
            )));
        }
        if observation.tenant_id.is_blank() {
            return Err(Error::validation("blank tenant id"));
        }
        if observation.metric_name.is_blank() {
            return Err(Error::validation("blank metric name"));
        }

        // One granularity per (tenant, metric, source). A mismatch against
        // existing history is a caller error, not a new series.
        let mut query = ObservationQuery::all(
            observation.tenant_id.clone(),
            observation.metric_name.clone(),
        );
        query.source = Some(observation.source.clone());
        query.limit = Some(1);
        if let Some(existing) = self.storage.query_observations(query).await?.first() {
            if existing.granularity != observation.granularity {
                return Err(Error::validation(format!(
                    "granularity {} does not match existing {} history for metric {}",
                    observation.granularity, existing.granularity, observation.metric_name
                )));
            }
        }
        Ok(())
    }
}
