//! Mutation orchestrator
//!
//! Drives the Replace / Update / SoftDelete flows over decoded change
//! batches. Each top-level call executes synchronously from the caller's
//! perspective and blocks until the whole batch is durably appended or an
//! error surfaces; callers retry whole logical batches, relying on replace
//! append-idempotence and the not-found-is-skip policy of update and
//! soft-delete to make replays safe.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::CsvColumns;
use crate::error::{Error, Result};
use crate::identity::identity_from_batch_row;
use crate::merge::{merge_soft_delete, merge_update, PendingWrite};
use crate::retry::{Notice, NoticeOutcome, NoticeSink, RetryExecutor, RetryPolicy, TracingNoticeSink};
use crate::select::select_by_primary_key;
use crate::slice::group_slices;
use crate::store::Store;
use crate::types::{LogicalType, TableDescription, Value};
use crate::writer::BatchWriter;

/// Per-call batch sizing and retry budget.
///
/// Threaded explicitly through every orchestrator call; the engine keeps no
/// process-wide mutable state.
#[derive(Debug, Clone)]
pub struct MutationConfig {
    /// Rows per append call
    pub write_batch_size: usize,
    /// Rows per point-lookup query
    pub select_batch_size: usize,
    /// Concurrent point-lookup queries per group
    pub max_parallel_selects: usize,
    /// Retry budget for store operations
    pub retry: RetryPolicy,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            write_batch_size: 1000,
            select_batch_size: 1000,
            max_parallel_selects: 10,
            retry: RetryPolicy::default(),
        }
    }
}

impl MutationConfig {
    fn validate(&self) -> Result<()> {
        if self.write_batch_size == 0 {
            return Err(Error::config("write batch size must be greater than zero"));
        }
        if self.select_batch_size == 0 {
            return Err(Error::config("select batch size must be greater than zero"));
        }
        if self.max_parallel_selects == 0 {
            return Err(Error::config("max parallel selects must be greater than zero"));
        }
        Ok(())
    }
}

/// Applies change batches against a column-store table.
///
/// The store connection is the only long-lived shared resource; slices,
/// identity maps, and scan buffers are constructed fresh per call.
pub struct MutationEngine {
    store: Arc<dyn Store>,
    notices: Arc<dyn NoticeSink>,
    cancel: CancellationToken,
}

impl MutationEngine {
    /// Create an engine over the given store handle
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            notices: Arc::new(TracingNoticeSink),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the notice sink
    pub fn with_notices(mut self, notices: Arc<dyn NoticeSink>) -> Self {
        self.notices = notices;
        self
    }

    /// Attach a cancellation token; cancelling it unblocks any backoff wait
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Apply a replace batch: parse every row and append, slice by slice.
    ///
    /// No pre-read is needed; the store resolves duplicate primary-key
    /// versions itself, so replays are safe without extra de-duplication.
    pub async fn replace_batch(
        &self,
        schema: &str,
        table: &TableDescription,
        csv: &CsvColumns,
        rows: &[Vec<String>],
        null_marker: &str,
        cfg: &MutationConfig,
    ) -> Result<()> {
        let start = Instant::now();
        let result = self
            .replace_inner(schema, table, csv, rows, null_marker, cfg)
            .await;
        self.report("replace_batch", start, &result);
        result
    }

    /// Apply an update batch: fetch referenced rows, merge under the
    /// null/unmodified sentinel convention, and append.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_batch(
        &self,
        schema: &str,
        table: &TableDescription,
        csv: &CsvColumns,
        rows: &[Vec<String>],
        null_marker: &str,
        unmodified_marker: &str,
        cfg: &MutationConfig,
    ) -> Result<()> {
        let start = Instant::now();
        let result = self
            .update_inner(schema, table, csv, rows, null_marker, unmodified_marker, cfg)
            .await;
        self.report("update_batch", start, &result);
        result
    }

    /// Apply a soft-delete batch: fetch referenced rows and rewrite them
    /// with the deleted flag forced true and the synced timestamp updated.
    #[allow(clippy::too_many_arguments)]
    pub async fn soft_delete_batch(
        &self,
        schema: &str,
        table: &TableDescription,
        csv: &CsvColumns,
        rows: &[Vec<String>],
        synced_index: usize,
        deleted_index: usize,
        cfg: &MutationConfig,
    ) -> Result<()> {
        let start = Instant::now();
        let result = self
            .soft_delete_inner(schema, table, csv, rows, synced_index, deleted_index, cfg)
            .await;
        self.report("soft_delete_batch", start, &result);
        result
    }

    async fn replace_inner(
        &self,
        schema: &str,
        table: &TableDescription,
        csv: &CsvColumns,
        rows: &[Vec<String>],
        null_marker: &str,
        cfg: &MutationConfig,
    ) -> Result<()> {
        cfg.validate()?;
        check_widths(table, csv)?;
        if null_marker.is_empty() {
            return Err(Error::config("null marker must not be empty"));
        }

        let writer = self.writer(cfg);
        let columns = table.column_names();

        // Replace needs no pre-read, so slices run sequentially
        // (parallelism 1).
        for slice in group_slices(rows.len(), cfg.write_batch_size, 1)?.into_iter().flatten() {
            let mut pending = PendingWrite::with_capacity(slice.len());
            for row in &rows[slice.start..slice.end] {
                pending.push(parse_replace_row(csv, row, null_marker)?);
            }
            writer.write(schema, table.name(), &columns, pending).await?;
        }

        info!(schema, table = table.name(), rows = rows.len(), "replace batch applied");
        Ok(())
    }

    async fn update_inner(
        &self,
        schema: &str,
        table: &TableDescription,
        csv: &CsvColumns,
        rows: &[Vec<String>],
        null_marker: &str,
        unmodified_marker: &str,
        cfg: &MutationConfig,
    ) -> Result<()> {
        cfg.validate()?;
        check_widths(table, csv)?;
        if null_marker.is_empty() || unmodified_marker.is_empty() {
            return Err(Error::config("null and unmodified markers must not be empty"));
        }

        let retry = self.retry(cfg);
        let writer = BatchWriter::new(self.store.clone(), retry.clone());
        let columns = table.column_names();
        let mut skipped_total = 0usize;

        for slice in group_slices(rows.len(), cfg.write_batch_size, 1)?.into_iter().flatten() {
            let sub = &rows[slice.start..slice.end];
            let selected = select_by_primary_key(
                self.store.clone(),
                &retry,
                schema,
                table,
                csv,
                sub,
                cfg.select_batch_size,
                cfg.max_parallel_selects,
            )
            .await?;
            debug!(
                slice = slice.num,
                referenced = sub.len(),
                found = selected.found_count(),
                "point lookups complete"
            );

            let mut pending = PendingWrite::with_capacity(sub.len());
            for row in sub {
                let key = identity_from_batch_row(csv, row)?;
                match selected.by_identity.get(&key) {
                    Some(stored) => pending.push(merge_update(
                        csv,
                        stored,
                        row,
                        null_marker,
                        unmodified_marker,
                    )?),
                    None => {
                        warn!(identity = %key, "row to update not found in store, skipping");
                        pending.push_skipped();
                    }
                }
            }
            skipped_total += pending.skipped_count();
            writer.write(schema, table.name(), &columns, pending).await?;
        }

        info!(
            schema,
            table = table.name(),
            rows = rows.len(),
            skipped = skipped_total,
            "update batch applied"
        );
        Ok(())
    }

    async fn soft_delete_inner(
        &self,
        schema: &str,
        table: &TableDescription,
        csv: &CsvColumns,
        rows: &[Vec<String>],
        synced_index: usize,
        deleted_index: usize,
        cfg: &MutationConfig,
    ) -> Result<()> {
        cfg.validate()?;
        check_widths(table, csv)?;
        if synced_index >= table.width() || deleted_index >= table.width() {
            return Err(Error::config(format!(
                "soft-delete columns (synced {synced_index}, deleted {deleted_index}) \
                 out of range for width {}",
                table.width()
            )));
        }
        let synced_col = csv.by_table_index(synced_index).ok_or_else(|| {
            Error::config(format!("no batch column maps to synced index {synced_index}"))
        })?;
        if synced_col.logical_type != LogicalType::UtcDateTime {
            return Err(Error::config(format!(
                "synced column {:?} must be a UTC timestamp, got {}",
                synced_col.name, synced_col.logical_type
            )));
        }
        let synced_col = synced_col.clone();

        let retry = self.retry(cfg);
        let writer = BatchWriter::new(self.store.clone(), retry.clone());
        let columns = table.column_names();
        let mut skipped_total = 0usize;

        for slice in group_slices(rows.len(), cfg.write_batch_size, 1)?.into_iter().flatten() {
            let sub = &rows[slice.start..slice.end];
            let selected = select_by_primary_key(
                self.store.clone(),
                &retry,
                schema,
                table,
                csv,
                sub,
                cfg.select_batch_size,
                cfg.max_parallel_selects,
            )
            .await?;
            debug!(
                slice = slice.num,
                referenced = sub.len(),
                found = selected.found_count(),
                "point lookups complete"
            );

            let mut pending = PendingWrite::with_capacity(sub.len());
            for row in sub {
                let key = identity_from_batch_row(csv, row)?;
                match selected.by_identity.get(&key) {
                    Some(stored) => {
                        let text = csv.field(&synced_col, row)?;
                        let synced = synced_col.logical_type.parse_text(text)?;
                        pending.push(merge_soft_delete(stored, synced, synced_index, deleted_index)?);
                    }
                    None => {
                        warn!(identity = %key, "row to soft-delete not found in store, skipping");
                        pending.push_skipped();
                    }
                }
            }
            skipped_total += pending.skipped_count();
            writer.write(schema, table.name(), &columns, pending).await?;
        }

        info!(
            schema,
            table = table.name(),
            rows = rows.len(),
            skipped = skipped_total,
            "soft-delete batch applied"
        );
        Ok(())
    }

    fn retry(&self, cfg: &MutationConfig) -> RetryExecutor {
        RetryExecutor::new(cfg.retry.clone(), self.notices.clone(), self.cancel.clone())
    }

    fn writer(&self, cfg: &MutationConfig) -> BatchWriter {
        BatchWriter::new(self.store.clone(), self.retry(cfg))
    }

    fn report<T>(&self, operation: &str, start: Instant, result: &Result<T>) {
        let outcome = match result {
            Ok(_) => NoticeOutcome::Success,
            Err(Error::Cancelled) => NoticeOutcome::Cancelled,
            Err(e) => NoticeOutcome::Failure(e.to_string()),
        };
        self.notices.report(Notice {
            operation: operation.to_string(),
            duration: start.elapsed(),
            outcome,
        });
    }
}

fn check_widths(table: &TableDescription, csv: &CsvColumns) -> Result<()> {
    if csv.width() != table.width() {
        return Err(Error::config(format!(
            "batch maps {} columns but table {} has {}",
            csv.width(),
            table.name(),
            table.width()
        )));
    }
    Ok(())
}

/// Parse a full replace row into table-ordered values
fn parse_replace_row(csv: &CsvColumns, row: &[String], null_marker: &str) -> Result<Vec<Value>> {
    let mut out = vec![Value::Null; csv.width()];
    for col in csv.all() {
        let text = csv.field(col, row)?;
        if text != null_marker {
            out[col.table_index] = col.logical_type.parse_text(text)?;
        }
    }
    Ok(out)
}
