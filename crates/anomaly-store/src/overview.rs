//! Area-grouped aggregation over pending anomalies.

use crate::model::{
    Anomaly, AnomalyOverview, AnomalyStatus, AnomalyType, AreaSummary, ConflictEntry,
    ConflictGroup,
};
use chrono::SecondsFormat;
use std::collections::HashMap;

/// Build the overview from live anomalies given in registration order.
///
/// Callers must already have filtered out expired entries. Areas appear in
/// the order they are first encountered. Record counts saturate at
/// `u64::MAX`.
pub fn build_overview<'a, I>(anomalies: I) -> AnomalyOverview
where
    I: IntoIterator<Item = &'a Anomaly>,
{
    let mut overview = AnomalyOverview::default();
    let mut duplicate_areas: HashMap<&'a str, usize> = HashMap::new();
    let mut conflict_areas: HashMap<&'a str, usize> = HashMap::new();

    for anomaly in anomalies {
        match anomaly.anomaly_type {
            AnomalyType::Duplicate => {
                let records = anomaly.new_record_count();
                let summary = &mut overview.duplicates;
                summary.pending_count += 1;
                summary.record_count = summary.record_count.saturating_add(records);
                summary.anomaly_ids.push(anomaly.anomaly_id.clone());

                let slot = *duplicate_areas
                    .entry(anomaly.area_name.as_str())
                    .or_insert_with(|| {
                        summary.area_summaries.push(AreaSummary {
                            area_name: anomaly.area_name.clone(),
                            anomaly_count: 0,
                            record_count: 0,
                        });
                        summary.area_summaries.len() - 1
                    });
                let area = &mut summary.area_summaries[slot];
                area.anomaly_count += 1;
                area.record_count = area.record_count.saturating_add(records);
            }
            AnomalyType::Conflict => {
                let groups = &mut overview.conflicts;
                let slot = *conflict_areas
                    .entry(anomaly.area_name.as_str())
                    .or_insert_with(|| {
                        groups.push(ConflictGroup {
                            area_name: anomaly.area_name.clone(),
                            anomalies: Vec::new(),
                        });
                        groups.len() - 1
                    });
                groups[slot].anomalies.push(ConflictEntry {
                    anomaly_id: anomaly.anomaly_id.clone(),
                    batch_id: anomaly.batch_id.clone(),
                    task_numeric_id: anomaly.task_numeric_id,
                    timestamp: anomaly.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                    status: AnomalyStatus::Pending,
                    variants: anomaly.variants.clone(),
                });
            }
        }
    }

    overview
}
