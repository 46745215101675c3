//! Import anomaly store.
//!
//! Holds the duplicate/conflict anomalies an import run discovers until an
//! operator resolves them, the batch is discarded, or the TTL window lapses.
//!
//! - [`AnomalyStore`] is the capability every backend implements.
//! - [`memory::InMemoryAnomalyStore`] keeps state in-process.
//! - `redis::RedisAnomalyStore` (feature `redis`) shares state between
//!   processes and relies on native key expiry.
//!
//! Both backends share the variant-selection policy ([`selection`]), the
//! overview aggregation ([`overview`]) and the lazy expiry rule
//! ([`clock::is_expired`]), so their observable behavior is identical.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod clock;
pub mod codec;
mod error;
pub mod memory;
mod model;
pub mod overview;
#[cfg(feature = "redis")]
pub mod redis;
pub mod selection;
mod settings;
mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryAnomalyStore;
pub use model::{
    new_anomaly_id, Anomaly, AnomalyOverview, AnomalyRecord, AnomalyStatus, AnomalyType,
    AreaSummary, BulkResolvedAnomaly, ConflictEntry, ConflictGroup, DuplicateSummary,
    ResolveAction, ResolvedAnomaly, Variant,
};
pub use settings::{StoreSettings, DEFAULT_TTL};
pub use traits::AnomalyStore;
