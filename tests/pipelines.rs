//! Both pipelines sharing one target and one checkpoint table.

use analytics_sink::memory::MemoryTarget;
use analytics_sync::checkpoint::{list_checkpoints, seed_checkpoints};
use analytics_sync::AppConfig;
use analytics_sync_mongodb_hash_source::memory::MemoryDocumentSource;
use analytics_sync_mongodb_hash_source::run_hash_diff_sync;
use analytics_sync_postgresql_watermark_source::memory::MemoryWatermarkSource;
use analytics_sync_postgresql_watermark_source::sync_all_tables;
use checkpoint::CheckpointStatus;
use chrono::{TimeZone, Utc};
use sync_core::{Record, UniversalValue};

#[tokio::test]
async fn test_seeded_deployment_runs_both_pipelines() {
    let config = AppConfig::default();
    let target = MemoryTarget::new();

    let seeded = seed_checkpoints(&target, &config.checkpoint_names())
        .await
        .unwrap();
    assert_eq!(seeded.len(), 3);

    let users = MemoryDocumentSource::with_documents([
        Record::new()
            .with("_id", "65f1c2a9e4b0a1b2c3d4e5f6")
            .with("Uid", "u1")
            .with("firstName", "Amaka")
            .with("lastName", "Okafor")
            .with("occupation", "Trader")
            .with("state", "Lagos"),
    ]);
    let report = run_hash_diff_sync(&target, &users, &config.mongodb, &Default::default())
        .await
        .unwrap();
    assert_eq!(report.inserted, 1);

    let t = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let tables = MemoryWatermarkSource::new();
    tables.put(
        "public.savings_plan",
        "plan_id",
        Record::new()
            .with("plan_id", "p1")
            .with("updated_at", t)
            .with("deleted_at", UniversalValue::Null),
    );
    let outcomes = sync_all_tables(&target, &tables, &config.tables, &Default::default()).await;
    assert!(outcomes.iter().all(|o| o.result.is_ok()));

    let rows = list_checkpoints(&target).await.unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.source_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "mongodb_users",
            "postgres_savings_plan",
            "postgres_savingstransaction"
        ]
    );
    assert!(rows
        .iter()
        .all(|r| r.last_status == Some(CheckpointStatus::Success)));
    assert_eq!(rows[1].last_extracted, Some(t));
    // No rows qualified, so the watermark stays at the epoch.
    assert_eq!(rows[2].records_extracted, 0);

    // Re-seeding never resets progress.
    assert!(seed_checkpoints(&target, &config.checkpoint_names())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        list_checkpoints(&target).await.unwrap()[1].last_extracted,
        Some(t)
    );
}
