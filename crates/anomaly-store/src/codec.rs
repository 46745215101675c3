//! Versioned serialized form of a stored anomaly.
//!
//! Shared by every backend that persists anomalies outside the process. The
//! envelope repeats the batch id and task id as plain strings; [`decode`]
//! rejects a payload whose header disagrees with the anomaly it carries.

use crate::model::Anomaly;
use crate::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// Current envelope version written by [`encode`].
pub const CODEC_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    v: u32,
    batch: &'a str,
    task: String,
    anomaly: &'a Anomaly,
}

#[derive(Deserialize)]
struct Envelope {
    v: u32,
    batch: String,
    task: String,
    anomaly: Anomaly,
}

pub fn encode(anomaly: &Anomaly) -> StoreResult<String> {
    serde_json::to_string(&EnvelopeRef {
        v: CODEC_VERSION,
        batch: &anomaly.batch_id,
        task: anomaly.task_numeric_id.to_string(),
        anomaly,
    })
    .map_err(|e| StoreError::Codec(e.to_string()))
}

pub fn decode(raw: &str) -> StoreResult<Anomaly> {
    let envelope: Envelope =
        serde_json::from_str(raw).map_err(|e| StoreError::Codec(e.to_string()))?;

    if envelope.v != CODEC_VERSION {
        return Err(StoreError::Codec(format!(
            "unsupported anomaly encoding version {}",
            envelope.v
        )));
    }
    if envelope.batch != envelope.anomaly.batch_id
        || envelope.task != envelope.anomaly.task_numeric_id.to_string()
    {
        return Err(StoreError::Codec(format!(
            "envelope index fields disagree with anomaly {}",
            envelope.anomaly.anomaly_id
        )));
    }

    Ok(envelope.anomaly)
}
