use crate::model::{
    Anomaly, AnomalyOverview, AnomalyRecord, AnomalyType, BulkResolvedAnomaly, ResolveAction,
    ResolvedAnomaly,
};
use crate::StoreResult;
use async_trait::async_trait;

/// Registry of pending import anomalies.
///
/// Every read treats an anomaly whose age has reached the TTL window as
/// absent. Multi-key mutations keep the batch and task indexes consistent
/// with the primary records.
#[async_trait]
pub trait AnomalyStore: Send + Sync {
    /// Register anomalies discovered for one batch. Accumulates; an empty
    /// list is a no-op.
    async fn register(
        &self,
        batch_id: &str,
        task_numeric_id: i64,
        records: Vec<AnomalyRecord>,
    ) -> StoreResult<()>;

    /// Area-grouped view of everything pending.
    async fn overview(&self) -> StoreResult<AnomalyOverview>;

    async fn find_by_id(&self, anomaly_id: &str) -> StoreResult<Option<Anomaly>>;

    /// Resolve one anomaly and remove it.
    ///
    /// Fails with `NotFound` when absent or expired, and with
    /// `InvalidVariantSelection` (anomaly left in place) when an explicit
    /// variant id under `overwrite` does not exist.
    async fn resolve_one(
        &self,
        anomaly_id: &str,
        action: ResolveAction,
        choose_variant_id: Option<&str>,
    ) -> StoreResult<ResolvedAnomaly>;

    /// Best-effort resolution of many anomalies of one type. Ids that are
    /// missing, expired or of another type are skipped; only successes are
    /// returned, in input order.
    async fn bulk_resolve(
        &self,
        anomaly_type: AnomalyType,
        action: ResolveAction,
        anomaly_ids: &[String],
    ) -> StoreResult<Vec<BulkResolvedAnomaly>>;

    async fn pending_count_for_task(&self, task_numeric_id: i64) -> StoreResult<usize>;

    /// Drop every anomaly of a batch, expired ones included. Returns how
    /// many primary records were removed.
    async fn delete_batch(&self, batch_id: &str) -> StoreResult<usize>;

    async fn total_pending(&self) -> StoreResult<usize>;

    /// Physically reclaim whatever expiry left behind.
    async fn purge_expired(&self) -> StoreResult<usize>;

    fn backend_name(&self) -> &'static str;
}
