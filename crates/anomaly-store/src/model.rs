use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Classification fixed when an anomaly is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyType {
    Duplicate,
    Conflict,
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyType::Duplicate => write!(f, "duplicate"),
            AnomalyType::Conflict => write!(f, "conflict"),
        }
    }
}

/// Operator decision applied when resolving an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveAction {
    /// Keep the rows already in storage.
    Skip,
    /// Replace stored rows with an import variant.
    Overwrite,
}

impl fmt::Display for ResolveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveAction::Skip => write!(f, "skip"),
            ResolveAction::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// One candidate resolution of an anomaly.
///
/// Fields the import pipeline attaches beyond the counts are kept verbatim
/// in `extra` and handed back when the variant is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub variant_id: String,
    #[serde(default)]
    pub existing_count: u64,
    #[serde(default)]
    pub new_count: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Variant {
    pub fn new(variant_id: impl Into<String>, existing_count: u64, new_count: u64) -> Self {
        Self {
            variant_id: variant_id.into(),
            existing_count,
            new_count,
            extra: Map::new(),
        }
    }
}

/// Anomaly as reported by the import pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub anomaly_id: String,
    pub area_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

/// Registered anomaly. Never mutated after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub anomaly_id: String,
    pub task_numeric_id: i64,
    pub batch_id: String,
    pub area_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub variants: Vec<Variant>,
    pub created_at: DateTime<Utc>,
}

impl Anomaly {
    pub fn from_record(
        record: AnomalyRecord,
        batch_id: &str,
        task_numeric_id: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            anomaly_id: record.anomaly_id,
            task_numeric_id,
            batch_id: batch_id.to_string(),
            area_name: record.area_name,
            timestamp: record.timestamp,
            anomaly_type: record.anomaly_type,
            variants: record.variants,
            created_at,
        }
    }

    /// Sum of `new_count` over all variants.
    pub fn new_record_count(&self) -> u64 {
        self.variants
            .iter()
            .fold(0u64, |total, v| total.saturating_add(v.new_count))
    }
}

/// Outcome of resolving a single anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAnomaly {
    pub batch_id: String,
    pub task_numeric_id: i64,
    pub resolved_variant: Option<Variant>,
}

/// One successfully resolved id from a bulk pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResolvedAnomaly {
    pub anomaly_id: String,
    pub batch_id: String,
    pub task_numeric_id: i64,
    pub resolved_variant: Option<Variant>,
}

/// Area-grouped view of everything still pending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyOverview {
    pub duplicates: DuplicateSummary,
    pub conflicts: Vec<ConflictGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateSummary {
    pub pending_count: usize,
    pub record_count: u64,
    pub anomaly_ids: Vec<String>,
    pub area_summaries: Vec<AreaSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaSummary {
    pub area_name: String,
    pub anomaly_count: usize,
    pub record_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictGroup {
    pub area_name: String,
    pub anomalies: Vec<ConflictEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEntry {
    pub anomaly_id: String,
    pub batch_id: String,
    pub task_numeric_id: i64,
    /// RFC 3339 rendering of the record time.
    pub timestamp: String,
    pub status: AnomalyStatus,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyStatus {
    Pending,
}

/// Fresh opaque anomaly id for producers without their own identifiers.
pub fn new_anomaly_id() -> String {
    format!("anomaly-{}", Uuid::new_v4())
}
