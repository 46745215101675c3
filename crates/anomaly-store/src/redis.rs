//! Redis-backed anomaly store.
//!
//! Shares anomaly state between processes. Layout under a key prefix `p`:
//!
//! - `p:anomaly:{id}`: codec envelope, written with `PX ttl` so Redis drops
//!   it when the window lapses.
//! - `p:registry`: sorted set of ids scored by a registration sequence taken
//!   from the `p:seq` counter, used for overview ordering.
//! - `p:expiry`: sorted set of ids scored by creation time in milliseconds.
//! - `p:owners`: hash of id to `"{task}:{batch}"`, which outlives the anomaly
//!   key so index members can be reclaimed after native expiry.
//! - `p:batch:{batch}` / `p:task:{task}`: index sets.
//!
//! Every mutation touching more than one key runs as a Lua script and is
//! therefore applied all-or-nothing. Registration first drops every entry the
//! expiry index shows is past the window, so the index structures stay
//! bounded without a sweeper. Reads still apply the lazy TTL rule so the
//! expiry boundary matches the in-memory backend to the millisecond.
//! Payloads that fail to decode are logged and treated as absent.

use crate::clock::{is_expired, Clock, SystemClock};
use crate::codec;
use crate::model::{
    Anomaly, AnomalyOverview, AnomalyRecord, AnomalyType, BulkResolvedAnomaly, ResolveAction,
    ResolvedAnomaly, Variant,
};
use crate::overview::build_overview;
use crate::selection::{select_variant, SelectionError};
use crate::settings::StoreSettings;
use crate::traits::AnomalyStore;
use crate::{StoreError, StoreResult};
use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// Helpers prepended to every script. KEYS[1] is the registry, KEYS[2] the
// owners hash and KEYS[3] the expiry index in all of them.
const PRELUDE: &str = r#"
local function forget(prefix, id)
  local owner = redis.call('HGET', KEYS[2], id)
  if owner then
    local task, batch = string.match(owner, '^([^:]*):(.*)$')
    redis.call('SREM', prefix .. ':batch:' .. batch, id)
    redis.call('SREM', prefix .. ':task:' .. task, id)
  end
  redis.call('ZREM', KEYS[1], id)
  redis.call('ZREM', KEYS[3], id)
  redis.call('HDEL', KEYS[2], id)
  return redis.call('DEL', prefix .. ':anomaly:' .. id)
end

local function reclaim(prefix, cutoff)
  local ids = redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', '(' .. cutoff)
  for _, id in ipairs(ids) do
    forget(prefix, id)
  end
  return #ids
end
"#;

// KEYS[4] batch set, KEYS[5] task set, KEYS[6] sequence counter.
const REGISTER_SCRIPT: &str = r#"
local prefix, ttl, created, cutoff, owner = ARGV[1], ARGV[2], ARGV[3], ARGV[4], ARGV[5]
local reclaimed = reclaim(prefix, cutoff)
for i = 6, #ARGV, 2 do
  local id = ARGV[i]
  local previous = redis.call('HGET', KEYS[2], id)
  if previous and previous ~= owner then
    local task, batch = string.match(previous, '^([^:]*):(.*)$')
    redis.call('SREM', prefix .. ':batch:' .. batch, id)
    redis.call('SREM', prefix .. ':task:' .. task, id)
  end
  redis.call('SET', prefix .. ':anomaly:' .. id, ARGV[i + 1], 'PX', ttl)
  if not redis.call('ZSCORE', KEYS[1], id) then
    redis.call('ZADD', KEYS[1], redis.call('INCR', KEYS[6]), id)
  end
  redis.call('ZADD', KEYS[3], created, id)
  redis.call('HSET', KEYS[2], id, owner)
  redis.call('SADD', KEYS[4], id)
  redis.call('SADD', KEYS[5], id)
end
return reclaimed
"#;

// Compare-and-delete: an id is removed only if its payload still equals the
// one the caller resolved against.
const REMOVE_SCRIPT: &str = r#"
local prefix = ARGV[1]
local removed = {}
for i = 2, #ARGV, 2 do
  local id = ARGV[i]
  if redis.call('GET', prefix .. ':anomaly:' .. id) == ARGV[i + 1] then
    forget(prefix, id)
    removed[#removed + 1] = 1
  else
    removed[#removed + 1] = 0
  end
end
return removed
"#;

// KEYS[4] batch set.
const DELETE_BATCH_SCRIPT: &str = r#"
local prefix = ARGV[1]
local removed = 0
for _, id in ipairs(redis.call('SMEMBERS', KEYS[4])) do
  removed = removed + forget(prefix, id)
end
redis.call('DEL', KEYS[4])
return removed
"#;

const PURGE_SCRIPT: &str = r#"
local prefix, cutoff = ARGV[1], ARGV[2]
local purged = reclaim(prefix, cutoff)
for _, id in ipairs(redis.call('ZRANGE', KEYS[1], 0, -1)) do
  if redis.call('EXISTS', prefix .. ':anomaly:' .. id) == 0 then
    forget(prefix, id)
    purged = purged + 1
  end
end
return purged
"#;

pub const DEFAULT_KEY_PREFIX: &str = "import-anomaly";

/// Connection parameters for [`RedisAnomalyStore::connect`].
#[derive(Debug, Clone)]
pub struct RedisOptions {
    pub key_prefix: String,
    pub connect_timeout: Duration,
    pub retries: usize,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            connect_timeout: Duration::from_millis(500),
            retries: 1,
        }
    }
}

fn with_prelude(body: &str) -> Script {
    Script::new(&format!("{PRELUDE}{body}"))
}

struct Scripts {
    register: Script,
    remove: Script,
    delete_batch: Script,
    purge: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            register: with_prelude(REGISTER_SCRIPT),
            remove: with_prelude(REMOVE_SCRIPT),
            delete_batch: with_prelude(DELETE_BATCH_SCRIPT),
            purge: with_prelude(PURGE_SCRIPT),
        }
    }
}

/// Anomaly store shared through Redis.
#[derive(Clone)]
pub struct RedisAnomalyStore {
    conn: ConnectionManager,
    prefix: String,
    settings: StoreSettings,
    clock: Arc<dyn Clock>,
    scripts: Arc<Scripts>,
}

impl RedisAnomalyStore {
    /// Connect using the system clock.
    pub async fn connect(
        redis_url: &str,
        settings: StoreSettings,
        options: RedisOptions,
    ) -> StoreResult<Self> {
        Self::connect_with_clock(redis_url, settings, options, Arc::new(SystemClock)).await
    }

    pub async fn connect_with_clock(
        redis_url: &str,
        settings: StoreSettings,
        options: RedisOptions,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(options.retries)
            .set_connection_timeout(options.connect_timeout);

        let client = Client::open(redis_url)?;
        let conn = client.get_connection_manager_with_config(config).await?;

        Ok(Self::from_connection(conn, options.key_prefix, settings, clock))
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(
        conn: ConnectionManager,
        key_prefix: impl Into<String>,
        settings: StoreSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            conn,
            prefix: key_prefix.into(),
            settings,
            clock,
            scripts: Arc::new(Scripts::load()),
        }
    }

    fn anomaly_key(&self, anomaly_id: &str) -> String {
        format!("{}:anomaly:{}", self.prefix, anomaly_id)
    }

    fn batch_key(&self, batch_id: &str) -> String {
        format!("{}:batch:{}", self.prefix, batch_id)
    }

    fn task_key(&self, task_numeric_id: i64) -> String {
        format!("{}:task:{}", self.prefix, task_numeric_id)
    }

    fn registry_key(&self) -> String {
        format!("{}:registry", self.prefix)
    }

    fn owners_key(&self) -> String {
        format!("{}:owners", self.prefix)
    }

    fn expiry_key(&self) -> String {
        format!("{}:expiry", self.prefix)
    }

    fn seq_key(&self) -> String {
        format!("{}:seq", self.prefix)
    }

    /// Entries created strictly before this millisecond are past the window.
    fn expiry_cutoff(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis().saturating_sub(self.settings.ttl_millis())
    }

    /// Fetch raw payloads for `ids`, keeping positions aligned.
    async fn fetch_raw(&self, ids: &[String]) -> StoreResult<Vec<Option<String>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys = ids.iter().map(|id| self.anomaly_key(id)).collect::<Vec<_>>();
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = ::redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    /// Decode and drop expired or unreadable payloads, preserving order.
    fn decode_live(&self, raw: Vec<Option<String>>, now: DateTime<Utc>) -> Vec<Anomaly> {
        raw.into_iter()
            .flatten()
            .filter_map(|payload| match codec::decode(&payload) {
                Ok(anomaly) => Some(anomaly),
                Err(err) => {
                    warn!(error = %err, "skipping undecodable anomaly payload");
                    None
                }
            })
            .filter(|anomaly| !is_expired(anomaly.created_at, now, self.settings.ttl))
            .collect()
    }

    async fn live_in_order(&self) -> StoreResult<Vec<Anomaly>> {
        let now = self.clock.now();
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.zrange(self.registry_key(), 0, -1).await?;
        let raw = self.fetch_raw(&ids).await?;
        Ok(self.decode_live(raw, now))
    }

    /// Run the compare-and-delete script over `(id, payload)` pairs.
    async fn remove_exact(&self, pairs: &[(&str, &str)]) -> StoreResult<Vec<bool>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let mut invocation = self.scripts.remove.prepare_invoke();
        invocation
            .key(self.registry_key())
            .key(self.owners_key())
            .key(self.expiry_key())
            .arg(&self.prefix);
        for (id, payload) in pairs {
            invocation.arg(*id).arg(*payload);
        }

        let mut conn = self.conn.clone();
        let flags: Vec<i64> = invocation.invoke_async(&mut conn).await?;
        Ok(flags.into_iter().map(|flag| flag == 1).collect())
    }
}

fn selection_error(anomaly_id: &str, err: SelectionError) -> StoreError {
    match err {
        SelectionError::UnknownVariant(variant_id) => StoreError::InvalidVariantSelection {
            anomaly_id: anomaly_id.to_string(),
            variant_id,
        },
    }
}

#[async_trait]
impl AnomalyStore for RedisAnomalyStore {
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
        let mut invocation = self.scripts.register.prepare_invoke();
        invocation
            .key(self.registry_key())
            .key(self.owners_key())
            .key(self.expiry_key())
            .key(self.batch_key(batch_id))
            .key(self.task_key(task_numeric_id))
            .key(self.seq_key())
            .arg(&self.prefix)
            .arg(self.settings.ttl_millis())
            .arg(created_at.timestamp_millis())
            .arg(self.expiry_cutoff(created_at))
            .arg(format!("{task_numeric_id}:{batch_id}"));
        for record in records {
            let anomaly = Anomaly::from_record(record, batch_id, task_numeric_id, created_at);
            invocation
                .arg(anomaly.anomaly_id.clone())
                .arg(codec::encode(&anomaly)?);
        }

        let mut conn = self.conn.clone();
        let reclaimed: i64 = invocation.invoke_async(&mut conn).await?;

        debug!(
            batch_id,
            task_numeric_id,
            count,
            reclaimed,
            "registered anomalies"
        );
        Ok(())
    }

    async fn overview(&self) -> StoreResult<AnomalyOverview> {
        let live = self.live_in_order().await?;
        Ok(build_overview(&live))
    }

    async fn find_by_id(&self, anomaly_id: &str) -> StoreResult<Option<Anomaly>> {
        let now = self.clock.now();
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.anomaly_key(anomaly_id)).await?;
        Ok(self.decode_live(vec![raw], now).pop())
    }

    async fn resolve_one(
        &self,
        anomaly_id: &str,
        action: ResolveAction,
        choose_variant_id: Option<&str>,
    ) -> StoreResult<ResolvedAnomaly> {
        let now = self.clock.now();
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.anomaly_key(anomaly_id)).await?;
        let raw = raw.ok_or_else(|| StoreError::NotFound(anomaly_id.to_string()))?;

        let anomaly = self
            .decode_live(vec![Some(raw.clone())], now)
            .pop()
            .ok_or_else(|| StoreError::NotFound(anomaly_id.to_string()))?;
        let resolved_variant = select_variant(&anomaly.variants, action, choose_variant_id)
            .map_err(|err| selection_error(anomaly_id, err))?;

        let removed = self.remove_exact(&[(anomaly_id, raw.as_str())]).await?;
        if removed.first() != Some(&true) {
            // Resolved, deleted or replaced by someone else in the meantime.
            return Err(StoreError::NotFound(anomaly_id.to_string()));
        }

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
        let raw = self.fetch_raw(anomaly_ids).await?;

        let mut candidates: Vec<(String, Anomaly, Option<Variant>)> = Vec::new();
        for (anomaly_id, payload) in anomaly_ids.iter().zip(raw) {
            let Some(payload) = payload else { continue };
            let anomaly = match codec::decode(&payload) {
                Ok(anomaly) => anomaly,
                Err(err) => {
                    warn!(anomaly_id = %anomaly_id, error = %err, "skipping undecodable anomaly");
                    continue;
                }
            };
            if anomaly.anomaly_type != anomaly_type
                || is_expired(anomaly.created_at, now, self.settings.ttl)
            {
                continue;
            }
            if let Ok(variant) = select_variant(&anomaly.variants, action, None) {
                candidates.push((payload, anomaly, variant));
            }
        }

        let pairs = candidates
            .iter()
            .map(|(payload, anomaly, _)| (anomaly.anomaly_id.as_str(), payload.as_str()))
            .collect::<Vec<_>>();
        let removed = self.remove_exact(&pairs).await?;

        let resolved = candidates
            .into_iter()
            .zip(removed)
            .filter(|(_, removed)| *removed)
            .map(|((_, anomaly, resolved_variant), _)| BulkResolvedAnomaly {
                anomaly_id: anomaly.anomaly_id,
                batch_id: anomaly.batch_id,
                task_numeric_id: anomaly.task_numeric_id,
                resolved_variant,
            })
            .collect::<Vec<_>>();

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
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(self.task_key(task_numeric_id)).await?;
        let raw = self.fetch_raw(&ids).await?;
        Ok(self.decode_live(raw, now).len())
    }

    async fn delete_batch(&self, batch_id: &str) -> StoreResult<usize> {
        let mut invocation = self.scripts.delete_batch.prepare_invoke();
        invocation
            .key(self.registry_key())
            .key(self.owners_key())
            .key(self.expiry_key())
            .key(self.batch_key(batch_id))
            .arg(&self.prefix);

        let mut conn = self.conn.clone();
        let removed: i64 = invocation.invoke_async(&mut conn).await?;
        let removed = usize::try_from(removed).unwrap_or(0);

        debug!(batch_id, removed, "deleted anomaly batch");
        Ok(removed)
    }

    async fn total_pending(&self) -> StoreResult<usize> {
        Ok(self.live_in_order().await?.len())
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let cutoff = self.expiry_cutoff(self.clock.now());
        let mut invocation = self.scripts.purge.prepare_invoke();
        invocation
            .key(self.registry_key())
            .key(self.owners_key())
            .key(self.expiry_key())
            .arg(&self.prefix)
            .arg(cutoff);

        let mut conn = self.conn.clone();
        let purged: i64 = invocation.invoke_async(&mut conn).await?;
        let purged = usize::try_from(purged).unwrap_or(0);

        if purged > 0 {
            info!(purged, "purged expired anomalies");
        }
        Ok(purged)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
