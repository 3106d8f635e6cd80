//! Batch writer
//!
//! Appends merged rows to the store in one append call per slice, honoring
//! the skip-index set, with every network call wrapped in the retry
//! executor. A slice whose rows are all skip-marked short-circuits to a
//! no-op; no write call is issued.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::merge::PendingWrite;
use crate::retry::RetryExecutor;
use crate::store::Store;

/// Writes pending rows to the store
pub struct BatchWriter {
    store: Arc<dyn Store>,
    retry: RetryExecutor,
}

impl BatchWriter {
    /// Create a writer over the given store handle
    pub fn new(store: Arc<dyn Store>, retry: RetryExecutor) -> Self {
        Self { store, retry }
    }

    /// Append the writable rows of `pending` in a single store call.
    ///
    /// Returns the number of rows appended.
    pub async fn write(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        pending: PendingWrite,
    ) -> Result<u64> {
        if pending.is_empty() {
            return Ok(0);
        }
        if pending.is_all_skipped() {
            warn!(
                schema,
                table,
                rows = pending.len(),
                "every row in slice is skip-marked, nothing to append"
            );
            return Ok(0);
        }

        let skipped = pending.skipped_count();
        let rows = pending.into_write_rows();
        if skipped > 0 {
            debug!(schema, table, skipped, appending = rows.len(), "appending partial slice");
        }

        self.retry
            .run("append", || {
                self.store.append_rows(schema, table, columns, &rows)
            })
            .await
    }
}
