//! Run outcome logging
//!
//! Appends one record per attempted run. The append is awaited — it is the
//! terminal action of a run and must not be lost.

use crate::domain::RunRecord;
use crate::error::Result;
use crate::store::RunLogStore;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct RunLogger {
    store: Arc<dyn RunLogStore>,
}

impl RunLogger {
    pub fn new(store: Arc<dyn RunLogStore>) -> Self {
        Self { store }
    }

    /// Append one run record.
    pub async fn record(&self, record: &RunRecord) -> Result<()> {
        self.store.append(record).await?;
        info!(
            "Run {} for strategy {} ({} chars of output)",
            record.status,
            record.strategy_id,
            record.output.len()
        );
        Ok(())
    }

    /// Most recent records for a user, newest first.
    pub async fn recent(
        &self,
        user_id: &str,
        limit: i64,
        strategy_id: Option<&str>,
    ) -> Result<Vec<RunRecord>> {
        self.store.recent(user_id, limit, strategy_id).await
    }
}
