//! Scoped transaction completion.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::TargetTransaction;

/// Close `tx` according to the outcome of the work done inside it.
///
/// - `Ok` commits (or rolls back when `dry_run` is set) and returns the value
/// - `Err` rolls back and returns the original error
///
/// A rollback failure never hides the error that caused it; it is logged.
pub async fn finish_transaction<Tx, R>(tx: Tx, outcome: Result<R>, dry_run: bool) -> Result<R>
where
    Tx: TargetTransaction,
{
    match outcome {
        Ok(value) if dry_run => {
            debug!("Dry run: rolling back transaction");
            tx.rollback()
                .await
                .context("Failed to roll back dry-run transaction")?;
            Ok(value)
        }
        Ok(value) => {
            tx.commit().await.context("Failed to commit transaction")?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback after failed run also failed: {rollback_err:#}");
            }
            Err(e)
        }
    }
}
