//! MongoDB hash-diff run wiring.

use analytics_sync_mongodb_hash_source::{run_hash_diff_sync, MongoDocumentSource, SyncOpts};
use analytics_sync_postgresql::{new_shared_client, PostgresTarget};
use anyhow::Result;
use sync_core::SyncReport;

use crate::{AppConfig, MongoOpts, PostgresOpts};

/// Run the hash-diff pipeline once against live MongoDB and PostgreSQL.
pub async fn run_mongodb(
    mongo: &MongoOpts,
    pg: &PostgresOpts,
    config: &AppConfig,
    dry_run: bool,
) -> Result<SyncReport> {
    let mut document = config.mongodb.clone();
    mongo.apply(&mut document);

    let source =
        MongoDocumentSource::connect(&mongo.mongo_uri, &document.database, &document.collection)
            .await?;
    let client = new_shared_client(&pg.to_config()?).await?;
    let target = PostgresTarget::with_checkpoint_table(client, &config.checkpoint_table);

    run_hash_diff_sync(&target, &source, &document, &SyncOpts { dry_run }).await
}
