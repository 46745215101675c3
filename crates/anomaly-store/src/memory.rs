//! In-process anomaly store.
//!
//! The primary map and both indexes sit behind a single lock so every
//! operation observes and leaves them consistent. Expiry is evaluated lazily
//! on read; [`AnomalyStore::purge_expired`] reclaims memory on demand.

use crate::clock::{is_expired, Clock, SystemClock};
use crate::model::{
    Anomaly, AnomalyOverview, AnomalyRecord, AnomalyType, BulkResolvedAnomaly, ResolveAction,
    ResolvedAnomaly, Variant,
};
use crate::overview::build_overview;
use crate::selection::{select_variant, SelectionError};
use crate::settings::StoreSettings;
use crate::traits::AnomalyStore;
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
struct Entry {
    seq: u64,
    anomaly: Anomaly,
}

#[derive(Debug, Default)]
struct Registry {
    next_seq: u64,
    anomalies: HashMap<String, Entry>,
    by_batch: HashMap<String, HashSet<String>>,
    by_task: HashMap<i64, HashSet<String>>,
}

impl Registry {
    fn insert(&mut self, anomaly: Anomaly, ttl: Duration) {
        // Re-registering a live id keeps its position but moves the indexes.
        // An expired predecessor is gone, so the id goes to the back.
        let seq = match self.remove(&anomaly.anomaly_id) {
            Some((seq, previous)) if !is_expired(previous.created_at, anomaly.created_at, ttl) => {
                seq
            }
            _ => {
                self.next_seq += 1;
                self.next_seq
            }
        };

        self.by_batch
            .entry(anomaly.batch_id.clone())
            .or_default()
            .insert(anomaly.anomaly_id.clone());
        self.by_task
            .entry(anomaly.task_numeric_id)
            .or_default()
            .insert(anomaly.anomaly_id.clone());
        self.anomalies
            .insert(anomaly.anomaly_id.clone(), Entry { seq, anomaly });
    }

    fn remove(&mut self, anomaly_id: &str) -> Option<(u64, Anomaly)> {
        let Entry { seq, anomaly } = self.anomalies.remove(anomaly_id)?;

        if let Some(ids) = self.by_batch.get_mut(&anomaly.batch_id) {
            ids.remove(anomaly_id);
            if ids.is_empty() {
                self.by_batch.remove(&anomaly.batch_id);
            }
        }
        if let Some(ids) = self.by_task.get_mut(&anomaly.task_numeric_id) {
            ids.remove(anomaly_id);
            if ids.is_empty() {
                self.by_task.remove(&anomaly.task_numeric_id);
            }
        }
        Some((seq, anomaly))
    }

    fn live(&self, anomaly_id: &str, now: DateTime<Utc>, ttl: Duration) -> Option<&Anomaly> {
        self.anomalies
            .get(anomaly_id)
            .map(|entry| &entry.anomaly)
            .filter(|anomaly| !is_expired(anomaly.created_at, now, ttl))
    }

    fn live_in_order(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<&Anomaly> {
        let mut entries = self
            .anomalies
            .values()
            .filter(|entry| !is_expired(entry.anomaly.created_at, now, ttl))
            .collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| &entry.anomaly).collect()
    }
}

/// In-memory anomaly store.
#[derive(Debug)]
pub struct InMemoryAnomalyStore {
    registry: RwLock<Registry>,
    settings: StoreSettings,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryAnomalyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAnomalyStore {
    pub fn new() -> Self {
        Self::with_settings(StoreSettings::default())
    }

    pub fn with_settings(settings: StoreSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: StoreSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> StoreSettings {
        self.settings
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Registry>> {
        self.registry
            .read()
            .map_err(|_| StoreError::Unavailable("anomaly registry lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Registry>> {
        self.registry
            .write()
            .map_err(|_| StoreError::Unavailable("anomaly registry lock poisoned".to_string()))
    }
}

/// Select and remove in one step. Nothing is removed when selection fails.
fn take_resolved(
    registry: &mut Registry,
    anomaly_id: &str,
    action: ResolveAction,
    choose_variant_id: Option<&str>,
    now: DateTime<Utc>,
    ttl: Duration,
) -> StoreResult<(Anomaly, Option<Variant>)> {
    let anomaly = registry
        .live(anomaly_id, now, ttl)
        .ok_or_else(|| StoreError::NotFound(anomaly_id.to_string()))?;

    let variant = select_variant(&anomaly.variants, action, choose_variant_id).map_err(
        |SelectionError::UnknownVariant(variant_id)| StoreError::InvalidVariantSelection {
            anomaly_id: anomaly_id.to_string(),
            variant_id,
        },
    )?;

    let (_, anomaly) = registry
        .remove(anomaly_id)
        .ok_or_else(|| StoreError::NotFound(anomaly_id.to_string()))?;
    Ok((anomaly, variant))
}

#[async_trait]
impl AnomalyStore for InMemoryAnomalyStore {
    async fn register(
        &self,
        batch_id: &str,
        task_numeric_id: i64,
        records: Vec<AnomalyRecord>,
    ) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let created_at = self.clock.now();
        let count = records.len();
        let mut registry = self.write()?;
        for record in records {
            registry.insert(
                Anomaly::from_record(record, batch_id, task_numeric_id, created_at),
                self.settings.ttl,
            );
        }

        debug!(batch_id, task_numeric_id, count, "registered anomalies");
        Ok(())
    }

    async fn overview(&self) -> StoreResult<AnomalyOverview> {
        let now = self.clock.now();
        let registry = self.read()?;
        Ok(build_overview(registry.live_in_order(now, self.settings.ttl)))
    }

    async fn find_by_id(&self, anomaly_id: &str) -> StoreResult<Option<Anomaly>> {
        let now = self.clock.now();
        let registry = self.read()?;
        Ok(registry.live(anomaly_id, now, self.settings.ttl).cloned())
    }

    async fn resolve_one(
        &self,
        anomaly_id: &str,
        action: ResolveAction,
        choose_variant_id: Option<&str>,
    ) -> StoreResult<ResolvedAnomaly> {
        let now = self.clock.now();
        let mut registry = self.write()?;
        let (anomaly, resolved_variant) = take_resolved(
            &mut registry,
            anomaly_id,
            action,
            choose_variant_id,
            now,
            self.settings.ttl,
        )?;

        debug!(
            anomaly_id,
            %action,
            variant = resolved_variant.as_ref().map(|v| v.variant_id.as_str()),
            "resolved anomaly"
        );
        Ok(ResolvedAnomaly {
            batch_id: anomaly.batch_id,
            task_numeric_id: anomaly.task_numeric_id,
            resolved_variant,
        })
    }

    async fn bulk_resolve(
        &self,
        anomaly_type: AnomalyType,
        action: ResolveAction,
        anomaly_ids: &[String],
    ) -> StoreResult<Vec<BulkResolvedAnomaly>> {
        let now = self.clock.now();
        let ttl = self.settings.ttl;
        let mut registry = self.write()?;
        let mut resolved = Vec::new();

        for anomaly_id in anomaly_ids {
            let matches_type = registry
                .live(anomaly_id, now, ttl)
                .is_some_and(|anomaly| anomaly.anomaly_type == anomaly_type);
            if !matches_type {
                continue;
            }
            if let Ok((anomaly, resolved_variant)) =
                take_resolved(&mut registry, anomaly_id, action, None, now, ttl)
            {
                resolved.push(BulkResolvedAnomaly {
                    anomaly_id: anomaly.anomaly_id,
                    batch_id: anomaly.batch_id,
                    task_numeric_id: anomaly.task_numeric_id,
                    resolved_variant,
                });
            }
        }

        debug!(
            %anomaly_type,
            %action,
            requested = anomaly_ids.len(),
            resolved = resolved.len(),
            "bulk resolved anomalies"
        );
        Ok(resolved)
    }

    async fn pending_count_for_task(&self, task_numeric_id: i64) -> StoreResult<usize> {
        let now = self.clock.now();
        let ttl = self.settings.ttl;
        let registry = self.read()?;
        Ok(registry
            .by_task
            .get(&task_numeric_id)
            .map(|ids| {
                ids.iter()
                    .filter(|id| registry.live(id, now, ttl).is_some())
                    .count()
            })
            .unwrap_or(0))
    }

    async fn delete_batch(&self, batch_id: &str) -> StoreResult<usize> {
        let mut registry = self.write()?;
        let ids = registry.by_batch.remove(batch_id).unwrap_or_default();
        let removed = ids
            .iter()
            .filter(|id| registry.remove(id).is_some())
            .count();

        debug!(batch_id, removed, "deleted anomaly batch");
        Ok(removed)
    }

    async fn total_pending(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let ttl = self.settings.ttl;
        let registry = self.read()?;
        Ok(registry
            .anomalies
            .values()
            .filter(|entry| !is_expired(entry.anomaly.created_at, now, ttl))
            .count())
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let ttl = self.settings.ttl;
        let mut registry = self.write()?;
        let expired = registry
            .anomalies
            .values()
            .filter(|entry| is_expired(entry.anomaly.created_at, now, ttl))
            .map(|entry| entry.anomaly.anomaly_id.clone())
            .collect::<Vec<_>>();
        for anomaly_id in &expired {
            registry.remove(anomaly_id);
        }

        if !expired.is_empty() {
            info!(purged = expired.len(), "purged expired anomalies");
        }
        Ok(expired.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
