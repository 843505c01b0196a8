//! Per-key write serialization.
//!
//! Aggregation and detection for a given (tenant, metric) must not interleave,
//! or a reader can observe a half-updated daily aggregate. Distinct keys run
//! fully in parallel.

use dashmap::DashMap;
use pulse_core::types::{MetricName, TenantId};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of per-(tenant, metric) async locks.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<(TenantId, MetricName), Arc<Mutex<()>>>,
}

impl KeyedLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one (tenant, metric) pair. The guard is owned so
    /// it can be held across await points for the duration of a pipeline
    /// stage.
    pub async fn acquire(
        &self,
        tenant_id: &TenantId,
        metric_name: &MetricName,
    ) -> OwnedMutexGuard<()> {
        let key = (tenant_id.clone(), metric_name.clone());
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
