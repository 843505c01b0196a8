//! # Pulse Engine
//!
//! Orchestrates the Pulse pipeline end to end:
//! - **Ingestion**: validated intake into the metric store
//! - **Sweeps**: externally-scheduled batch jobs running aggregation,
//!   detection, correlation, and synthesis per metric, with per-metric
//!   failure isolation
//! - **Delivery view**: read-only projections for the briefing layer
//! - **Human actions**: status mutations validated against the entity state
//!   machines
//!
//! The engine exposes no scheduler of its own: an external scheduler
//! collaborator invokes [`Engine::run_sweep`], keeping every entry point a
//! plain function over explicit inputs.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod actions;
pub mod sweep;
pub mod view;

use pulse_core::config::EngineConfig;
use pulse_core::observation::MetricObservation;
use pulse_core::Result;
use pulse_detection::{AnomalyDetector, PatternCorrelator};
use pulse_ingestion::{Aggregator, IngestOutcome, Ingestor};
use pulse_storage::locks::KeyedLocks;
use pulse_storage::Storage;
use pulse_synthesis::embedding::EmbeddingProvider;
use pulse_synthesis::Synthesizer;
use std::sync::Arc;

pub use sweep::{SweepFailure, SweepReport, SweepRequest};
pub use view::{DeliveryView, MetricSnapshot, RankedRecommendation};

/// The assembled Pulse engine.
#[derive(Debug)]
pub struct Engine {
    storage: Arc<dyn Storage>,
    locks: KeyedLocks,
    config: EngineConfig,
    ingestor: Ingestor,
    aggregator: Aggregator,
    detector: AnomalyDetector,
    correlator: PatternCorrelator,
    synthesizer: Synthesizer,
}

impl Engine {
    /// Assemble an engine over the given storage backend and embedding
    /// provider.
    pub fn new(
        storage: Arc<dyn Storage>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            ingestor: Ingestor::new(storage.clone()),
            aggregator: Aggregator::new(storage.clone(), config.aggregation.clone()),
            detector: AnomalyDetector::new(config.detection.clone()),
            correlator: PatternCorrelator::new(config.correlation.clone()),
            synthesizer: Synthesizer::new(
                storage.clone(),
                embedder,
                config.synthesis.clone(),
            ),
            locks: KeyedLocks::new(),
            storage,
            config,
        })
    }

    /// Validate and store one observation.
    pub async fn ingest(&self, observation: MetricObservation) -> Result<IngestOutcome> {
        self.ingestor.ingest(observation).await
    }

    /// Read-only projections for the briefing/notification layer.
    pub fn view(&self) -> DeliveryView {
        DeliveryView::new(self.storage.clone(), self.config.clone())
    }

    /// The engine's storage handle.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
