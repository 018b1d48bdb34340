//! Watermark pipeline runs against the in-memory target and source.

use analytics_sink::memory::MemoryTarget;
use analytics_sync_postgresql_watermark_source::memory::MemoryWatermarkSource;
use analytics_sync_postgresql_watermark_source::{sync_all_tables, sync_table, SyncOpts};
use checkpoint::CheckpointStatus;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sync_core::{Record, SyncError, TableSyncConfig, UniversalValue};

fn plans() -> TableSyncConfig {
    TableSyncConfig::defaults().remove(0)
}

fn transactions() -> TableSyncConfig {
    TableSyncConfig::defaults().remove(1)
}

fn t(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

fn plan(
    id: &str,
    status: &str,
    updated: Option<DateTime<Utc>>,
    deleted: Option<DateTime<Utc>>,
) -> Record {
    Record::new()
        .with("plan_id", id)
        .with("status", status)
        .with("updated_at", updated)
        .with("deleted_at", deleted)
}

fn txn(id: &str, updated: DateTime<Utc>) -> Record {
    Record::new()
        .with("txn_id", id)
        .with("amount", UniversalValue::Decimal("10.00".into()))
        .with("updated_at", updated)
        .with("deleted_at", UniversalValue::Null)
}

fn seeded_source() -> MemoryWatermarkSource {
    let source = MemoryWatermarkSource::new();
    source.put("public.savings_plan", "plan_id", plan("p1", "active", Some(t(1)), None));
    source.put("public.savings_plan", "plan_id", plan("p2", "closed", None, Some(t(2))));
    source.put("public.savings_plan", "plan_id", plan("p3", "draft", None, None));
    source
}

#[tokio::test]
async fn test_first_run_replicates_updates_and_soft_deletes() {
    let target = MemoryTarget::new();
    let source = seeded_source();

    let report = sync_table(&target, &source, &plans(), &SyncOpts::default())
        .await
        .unwrap();

    assert_eq!(report.records_read, 2);
    assert_eq!(report.upserted, 2);
    assert_eq!(report.watermark, Some(t(2)));

    let rows = target.rows("analytics.raw_savings_plan");
    assert_eq!(rows.len(), 2);
    let p2 = target.row("analytics.raw_savings_plan", "p2").unwrap();
    assert_eq!(p2.get("deleted_at"), Some(&UniversalValue::TimestampTz(t(2))));
    assert!(p2.get("extracted_at").and_then(|v| v.as_utc()).is_some());
    assert!(target.row("analytics.raw_savings_plan", "p3").is_none());

    let checkpoint = target.checkpoint("postgres_savings_plan").unwrap();
    assert_eq!(checkpoint.last_extracted, Some(t(2)));
    assert_eq!(checkpoint.last_status, Some(CheckpointStatus::Success));
    assert_eq!(checkpoint.records_extracted, 2);
}

#[tokio::test]
async fn test_rerun_without_changes_keeps_watermark() {
    let target = MemoryTarget::new();
    let source = seeded_source();
    let opts = SyncOpts::default();

    sync_table(&target, &source, &plans(), &opts).await.unwrap();
    let report = sync_table(&target, &source, &plans(), &opts).await.unwrap();

    assert_eq!(report.records_read, 0);
    assert_eq!(report.upserted, 0);
    let checkpoint = target.checkpoint("postgres_savings_plan").unwrap();
    assert_eq!(checkpoint.last_extracted, Some(t(2)));
    assert_eq!(checkpoint.records_extracted, 0);
    assert_eq!(target.rows("analytics.raw_savings_plan").len(), 2);
}

#[tokio::test]
async fn test_only_the_delta_is_replicated() {
    let target = MemoryTarget::new();
    let source = seeded_source();
    let opts = SyncOpts::default();
    sync_table(&target, &source, &plans(), &opts).await.unwrap();

    source.put("public.savings_plan", "plan_id", plan("p1", "matured", Some(t(5)), None));
    let report = sync_table(&target, &source, &plans(), &opts).await.unwrap();

    assert_eq!(report.upserted, 1);
    assert_eq!(report.watermark, Some(t(5)));
    let p1 = target.row("analytics.raw_savings_plan", "p1").unwrap();
    assert_eq!(p1.get("status"), Some(&UniversalValue::from("matured")));
}

#[tokio::test]
async fn test_watermark_is_monotonic() {
    let target = MemoryTarget::new();
    let source = seeded_source();
    let opts = SyncOpts::default();

    let mut last = None;
    for hour in [3, 4, 6] {
        source.put(
            "public.savings_plan",
            "plan_id",
            plan("p9", "active", Some(t(hour)), None),
        );
        let report = sync_table(&target, &source, &plans(), &opts).await.unwrap();
        assert!(report.watermark >= last);
        last = report.watermark;
    }
    assert_eq!(last, Some(t(6)));
}

#[tokio::test]
async fn test_upsert_failure_rolls_back_everything() {
    let target = MemoryTarget::new();
    let source = seeded_source();
    target.fail_upsert_after("analytics.raw_savings_plan", 1);

    let err = sync_table(&target, &source, &plans(), &SyncOpts::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::TargetWriteFailure { .. })
    ));
    assert!(target.rows("analytics.raw_savings_plan").is_empty());
    assert!(target.checkpoint("postgres_savings_plan").is_none());
    assert_eq!(target.rollbacks(), 1);
}

#[tokio::test]
async fn test_checkpoint_failure_rolls_back_data() {
    let target = MemoryTarget::new();
    let source = seeded_source();
    target.fail_checkpoint_write();

    let err = sync_table(&target, &source, &plans(), &SyncOpts::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::CheckpointWriteFailure { .. })
    ));
    assert!(target.rows("analytics.raw_savings_plan").is_empty());
}

#[tokio::test]
async fn test_source_failure_leaves_checkpoint_untouched() {
    let target = MemoryTarget::new();
    let source = seeded_source();
    sync_table(&target, &source, &plans(), &SyncOpts::default())
        .await
        .unwrap();

    source.make_unavailable("public.savings_plan");
    let err = sync_table(&target, &source, &plans(), &SyncOpts::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::SourceUnavailable { .. })
    ));
    assert_eq!(
        target
            .checkpoint("postgres_savings_plan")
            .unwrap()
            .last_extracted,
        Some(t(2))
    );
}

#[tokio::test]
async fn test_dry_run_commits_nothing() {
    let target = MemoryTarget::new();
    let source = seeded_source();

    let report = sync_table(&target, &source, &plans(), &SyncOpts { dry_run: true })
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.upserted, 2);
    assert!(target.rows("analytics.raw_savings_plan").is_empty());
    assert!(target.checkpoint("postgres_savings_plan").is_none());
    assert_eq!(target.commits(), 0);
}

#[tokio::test]
async fn test_failed_table_does_not_block_others() {
    let target = MemoryTarget::new();
    let source = seeded_source();
    source.put("public.savingstransaction", "txn_id", txn("x1", t(7)));
    source.make_unavailable("public.savings_plan");

    let outcomes = sync_all_tables(
        &target,
        &source,
        &[plans(), transactions()],
        &SyncOpts::default(),
    )
    .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].table, "savings_plan");
    assert!(outcomes[0].result.is_err());
    assert_eq!(outcomes[1].result.as_ref().unwrap().upserted, 1);

    assert!(target.checkpoint("postgres_savings_plan").is_none());
    let checkpoint = target.checkpoint("postgres_savingstransaction").unwrap();
    assert_eq!(checkpoint.last_extracted, Some(t(7)));
}

#[tokio::test]
async fn test_extraction_timestamp_is_refreshed() {
    let target = MemoryTarget::new();
    let source = seeded_source();
    let opts = SyncOpts::default();
    sync_table(&target, &source, &plans(), &opts).await.unwrap();
    let first = target
        .row("analytics.raw_savings_plan", "p1")
        .and_then(|r| r.get("extracted_at").and_then(|v| v.as_utc()))
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    source.put(
        "public.savings_plan",
        "plan_id",
        plan("p1", "active", Some(t(1) + Duration::hours(10)), None),
    );
    sync_table(&target, &source, &plans(), &opts).await.unwrap();
    let second = target
        .row("analytics.raw_savings_plan", "p1")
        .and_then(|r| r.get("extracted_at").and_then(|v| v.as_utc()))
        .unwrap();
    assert!(second > first);
}
