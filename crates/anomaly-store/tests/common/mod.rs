//! Behavioral contract every anomaly store backend must satisfy.
//!
//! Each check receives a fresh store whose TTL is [`TTL`] and the manual
//! clock that store reads.

#![allow(dead_code)]

use anomaly_store::{
    AnomalyRecord, AnomalyStore, AnomalyType, AreaSummary, ManualClock, ResolveAction, Variant,
};
use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

pub const TTL: Duration = Duration::from_secs(60);

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()
}

pub fn record(
    id: &str,
    area: &str,
    anomaly_type: AnomalyType,
    variants: Vec<Variant>,
) -> AnomalyRecord {
    AnomalyRecord {
        anomaly_id: id.to_string(),
        area_name: area.to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        anomaly_type,
        variants,
    }
}

pub fn duplicate(id: &str, area: &str, new_count: u64) -> AnomalyRecord {
    record(
        id,
        area,
        AnomalyType::Duplicate,
        vec![Variant::new(format!("{id}-v"), 1, new_count)],
    )
}

fn split_variants(id: &str, anomaly_type: AnomalyType) -> AnomalyRecord {
    record(
        id,
        "Warehouse-A",
        anomaly_type,
        vec![Variant::new("a", 2, 0), Variant::new("b", 0, 5)],
    )
}

pub async fn register_makes_records_visible(store: &dyn AnomalyStore, _clock: &ManualClock) {
    store
        .register("batch-1", 11, vec![duplicate("x", "A", 1)])
        .await
        .unwrap();
    let before = store.pending_count_for_task(11).await.unwrap();

    let records = vec![duplicate("d1", "A", 1), duplicate("d2", "B", 2)];
    store.register("batch-1", 11, records.clone()).await.unwrap();

    for r in &records {
        let found = store.find_by_id(&r.anomaly_id).await.unwrap().unwrap();
        assert_eq!(found.batch_id, "batch-1");
        assert_eq!(found.task_numeric_id, 11);
        assert_eq!(found.variants, r.variants);
    }
    assert_eq!(
        store.pending_count_for_task(11).await.unwrap(),
        before + records.len()
    );
    assert_eq!(store.total_pending().await.unwrap(), 3);
}

pub async fn empty_register_is_noop(store: &dyn AnomalyStore, _clock: &ManualClock) {
    store.register("batch-1", 1, Vec::new()).await.unwrap();

    assert_eq!(store.total_pending().await.unwrap(), 0);
    assert_eq!(store.pending_count_for_task(1).await.unwrap(), 0);
    let overview = store.overview().await.unwrap();
    assert_eq!(overview.duplicates.pending_count, 0);
    assert!(overview.conflicts.is_empty());
}

pub async fn duplicate_summary_for_one_area(store: &dyn AnomalyStore, _clock: &ManualClock) {
    store
        .register(
            "batch-1",
            3,
            vec![
                duplicate("d1", "Warehouse-A", 2),
                duplicate("d2", "Warehouse-A", 3),
                duplicate("d3", "Warehouse-A", 4),
            ],
        )
        .await
        .unwrap();

    let summary = store.overview().await.unwrap().duplicates;
    assert_eq!(summary.pending_count, 3);
    assert_eq!(summary.record_count, 9);
    assert_eq!(summary.anomaly_ids.len(), 3);
    assert_eq!(
        summary.area_summaries,
        vec![AreaSummary {
            area_name: "Warehouse-A".to_string(),
            anomaly_count: 3,
            record_count: 9,
        }]
    );
}

pub async fn conflicts_grouped_by_area(store: &dyn AnomalyStore, _clock: &ManualClock) {
    store
        .register(
            "batch-1",
            3,
            vec![
                split_variants("c1", AnomalyType::Conflict),
                record("c2", "Basin", AnomalyType::Conflict, vec![]),
                duplicate("d1", "Basin", 1),
            ],
        )
        .await
        .unwrap();

    let overview = store.overview().await.unwrap();
    let areas = overview
        .conflicts
        .iter()
        .map(|g| g.area_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(areas, vec!["Warehouse-A", "Basin"]);
    assert_eq!(overview.conflicts[0].anomalies[0].variants.len(), 2);
    assert_eq!(overview.duplicates.pending_count, 1);
}

pub async fn skip_and_overwrite_pick_expected_variants(
    store: &dyn AnomalyStore,
    _clock: &ManualClock,
) {
    store
        .register(
            "batch-1",
            5,
            vec![
                split_variants("s", AnomalyType::Conflict),
                split_variants("o", AnomalyType::Conflict),
            ],
        )
        .await
        .unwrap();

    let skipped = store
        .resolve_one("s", ResolveAction::Skip, None)
        .await
        .unwrap();
    assert_eq!(skipped.resolved_variant.unwrap().variant_id, "a");
    assert_eq!(skipped.batch_id, "batch-1");
    assert_eq!(skipped.task_numeric_id, 5);

    let overwritten = store
        .resolve_one("o", ResolveAction::Overwrite, None)
        .await
        .unwrap();
    assert_eq!(overwritten.resolved_variant.unwrap().variant_id, "b");
}

pub async fn unknown_explicit_variant_keeps_anomaly(
    store: &dyn AnomalyStore,
    _clock: &ManualClock,
) {
    store
        .register("batch-1", 5, vec![split_variants("c", AnomalyType::Conflict)])
        .await
        .unwrap();

    let err = store
        .resolve_one("c", ResolveAction::Overwrite, Some("nonexistent-variant"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(store.find_by_id("c").await.unwrap().is_some());
    assert_eq!(store.pending_count_for_task(5).await.unwrap(), 1);

    let chosen = store
        .resolve_one("c", ResolveAction::Overwrite, Some("a"))
        .await
        .unwrap();
    assert_eq!(chosen.resolved_variant.unwrap().variant_id, "a");
}

pub async fn resolved_anomalies_disappear(store: &dyn AnomalyStore, _clock: &ManualClock) {
    store
        .register(
            "batch-1",
            8,
            vec![
                duplicate("d1", "A", 1),
                duplicate("d2", "A", 1),
                duplicate("d3", "A", 1),
            ],
        )
        .await
        .unwrap();

    store
        .resolve_one("d1", ResolveAction::Skip, None)
        .await
        .unwrap();
    let bulk = store
        .bulk_resolve(
            AnomalyType::Duplicate,
            ResolveAction::Overwrite,
            &["d2".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(bulk.len(), 1);

    for id in ["d1", "d2"] {
        assert!(store.find_by_id(id).await.unwrap().is_none());
    }
    assert_eq!(store.pending_count_for_task(8).await.unwrap(), 1);

    let again = store.resolve_one("d1", ResolveAction::Skip, None).await;
    assert!(matches!(again, Err(e) if e.is_not_found()));

    // The batch index no longer holds resolved ids: only d3 is deleted.
    assert_eq!(store.delete_batch("batch-1").await.unwrap(), 1);
}

pub async fn resolve_without_variants_returns_none(
    store: &dyn AnomalyStore,
    _clock: &ManualClock,
) {
    store
        .register(
            "batch-1",
            2,
            vec![record("e", "A", AnomalyType::Duplicate, vec![])],
        )
        .await
        .unwrap();

    let resolved = store
        .resolve_one("e", ResolveAction::Skip, None)
        .await
        .unwrap();
    assert!(resolved.resolved_variant.is_none());
    assert!(store.find_by_id("e").await.unwrap().is_none());
}

pub async fn bulk_resolve_respects_type(store: &dyn AnomalyStore, _clock: &ManualClock) {
    store
        .register(
            "batch-1",
            4,
            vec![
                split_variants("conflict-1", AnomalyType::Conflict),
                split_variants("dup-1", AnomalyType::Duplicate),
            ],
        )
        .await
        .unwrap();

    let resolved = store
        .bulk_resolve(
            AnomalyType::Duplicate,
            ResolveAction::Skip,
            &[
                "conflict-1".to_string(),
                "missing".to_string(),
                "dup-1".to_string(),
            ],
        )
        .await
        .unwrap();

    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].anomaly_id, "dup-1");
    assert_eq!(resolved[0].batch_id, "batch-1");
    assert_eq!(resolved[0].task_numeric_id, 4);
    assert_eq!(resolved[0].resolved_variant.as_ref().unwrap().variant_id, "a");
    assert!(store.find_by_id("conflict-1").await.unwrap().is_some());
}

pub async fn bulk_resolve_preserves_input_order(store: &dyn AnomalyStore, _clock: &ManualClock) {
    store
        .register(
            "batch-1",
            4,
            vec![
                duplicate("d1", "A", 1),
                duplicate("d2", "A", 1),
                duplicate("d3", "A", 1),
            ],
        )
        .await
        .unwrap();

    let ids = ["d3", "d1", "d3", "d2"].map(String::from);
    let resolved = store
        .bulk_resolve(AnomalyType::Duplicate, ResolveAction::Overwrite, &ids)
        .await
        .unwrap();
    let order = resolved
        .iter()
        .map(|r| r.anomaly_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(order, vec!["d3", "d1", "d2"]);
    assert_eq!(store.total_pending().await.unwrap(), 0);
}

pub async fn delete_batch_purges_expired_entries(store: &dyn AnomalyStore, clock: &ManualClock) {
    store
        .register(
            "batch-1",
            6,
            vec![duplicate("d1", "A", 1), duplicate("d2", "A", 1)],
        )
        .await
        .unwrap();
    store
        .register("batch-2", 6, vec![duplicate("other", "A", 1)])
        .await
        .unwrap();

    clock.advance(TTL + Duration::from_secs(1));
    store.delete_batch("batch-1").await.unwrap();
    clock.set(start_time());

    assert!(store.find_by_id("d1").await.unwrap().is_none());
    assert!(store.find_by_id("d2").await.unwrap().is_none());
    assert!(store.find_by_id("other").await.unwrap().is_some());
    assert_eq!(store.pending_count_for_task(6).await.unwrap(), 1);
    assert_eq!(store.delete_batch("unknown-batch").await.unwrap(), 0);
}

pub async fn ttl_boundary_is_exact(store: &dyn AnomalyStore, clock: &ManualClock) {
    store
        .register("batch-1", 9, vec![duplicate("d1", "A", 3)])
        .await
        .unwrap();

    clock.advance(TTL - Duration::from_millis(1));
    assert!(store.find_by_id("d1").await.unwrap().is_some());
    assert_eq!(store.total_pending().await.unwrap(), 1);
    assert_eq!(store.pending_count_for_task(9).await.unwrap(), 1);

    clock.advance(Duration::from_millis(1));
    assert!(store.find_by_id("d1").await.unwrap().is_none());
    assert_eq!(store.total_pending().await.unwrap(), 0);
    assert_eq!(store.pending_count_for_task(9).await.unwrap(), 0);
    assert_eq!(store.overview().await.unwrap().duplicates.pending_count, 0);

    let err = store
        .resolve_one("d1", ResolveAction::Skip, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    let bulk = store
        .bulk_resolve(
            AnomalyType::Duplicate,
            ResolveAction::Skip,
            &["d1".to_string()],
        )
        .await
        .unwrap();
    assert!(bulk.is_empty());
}

pub async fn overview_follows_registration_order(store: &dyn AnomalyStore, _clock: &ManualClock) {
    store
        .register(
            "batch-1",
            1,
            vec![
                duplicate("z", "Yard", 1),
                duplicate("a", "Alpha", 1),
                record("m", "Zeta", AnomalyType::Conflict, vec![]),
                record("b", "Basin", AnomalyType::Conflict, vec![]),
            ],
        )
        .await
        .unwrap();
    store
        .register("batch-2", 2, vec![duplicate("0", "Alpha", 1)])
        .await
        .unwrap();
    // A live id registered again keeps its place.
    store
        .register("batch-2", 2, vec![duplicate("z", "Yard", 2)])
        .await
        .unwrap();

    let overview = store.overview().await.unwrap();
    assert_eq!(overview.duplicates.anomaly_ids, vec!["z", "a", "0"]);
    let areas = overview
        .duplicates
        .area_summaries
        .iter()
        .map(|a| a.area_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(areas, vec!["Yard", "Alpha"]);
    let conflict_areas = overview
        .conflicts
        .iter()
        .map(|g| g.area_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(conflict_areas, vec!["Zeta", "Basin"]);
}

pub async fn expired_id_reregistered_goes_last(store: &dyn AnomalyStore, clock: &ManualClock) {
    store
        .register("batch-1", 1, vec![duplicate("x", "A", 1)])
        .await
        .unwrap();
    clock.advance(Duration::from_secs(30));
    store
        .register("batch-1", 1, vec![duplicate("y", "B", 1)])
        .await
        .unwrap();
    clock.advance(Duration::from_secs(31));
    store
        .register("batch-1", 1, vec![duplicate("x", "A", 1)])
        .await
        .unwrap();

    let overview = store.overview().await.unwrap();
    assert_eq!(overview.duplicates.anomaly_ids, vec!["y", "x"]);
    assert_eq!(store.pending_count_for_task(1).await.unwrap(), 2);
}

pub async fn huge_record_counts_saturate(store: &dyn AnomalyStore, _clock: &ManualClock) {
    store
        .register(
            "batch-1",
            1,
            vec![duplicate("d1", "A", u64::MAX), duplicate("d2", "A", 1)],
        )
        .await
        .unwrap();

    let summary = store.overview().await.unwrap().duplicates;
    assert_eq!(summary.record_count, u64::MAX);
    assert_eq!(summary.area_summaries[0].record_count, u64::MAX);
}
