//! # colsink
//!
//! Destination-side mutation engine for column-store tables.
//!
//! Applies externally supplied change batches (replace / update /
//! soft-delete rows from a bulk-ETL change-data protocol) under idempotent,
//! at-least-once delivery semantics:
//!
//! - **Bounded parallelism**: batches are partitioned into globally
//!   numbered slices and executed in bounded-concurrency groups, capping
//!   in-flight reads against the store's concurrent-query ceiling
//! - **Read-before-write merges**: update and soft-delete flows fetch the
//!   referenced rows by primary key and merge them with the incoming change
//!   rows under a null/unmodified sentinel convention
//! - **Canonical row identity**: store-scanned values and raw batch text
//!   encode to byte-identical identity keys, with UTC timestamps
//!   normalized to epoch nanoseconds across sub-second precisions
//! - **Retry with backoff**: every network operation runs through a
//!   cancellable exponential-backoff executor that retries only
//!   transient/network-class failures
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use colsink::prelude::*;
//! use std::sync::Arc;
//!
//! let engine = MutationEngine::new(store);
//! let cfg = MutationConfig::default();
//!
//! engine
//!     .update_batch("prod", &table, &csv, &rows, "my-null", "my-unmod", &cfg)
//!     .await?;
//! ```
//!
//! Out of scope, handled by collaborators: batch-file decompression and
//! decryption, DDL generation, source-protocol type translation, the
//! front-end service layer, and connection-pool lifecycle.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod batch;
pub mod engine;
pub mod error;
pub mod identity;
pub mod merge;
pub mod retry;
pub mod select;
pub mod slice;
pub mod store;
pub mod types;
pub mod writer;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorCategory, Result};

    pub use crate::types::{ColumnDefinition, LogicalType, Row, TableDescription, Value};

    pub use crate::batch::{CsvColumn, CsvColumns};

    pub use crate::slice::{group_slices, Slice};

    pub use crate::retry::{
        backoff_delay, ChannelNoticeSink, Notice, NoticeOutcome, NoticeSink, NullNoticeSink,
        RetryExecutor, RetryPolicy, TracingNoticeSink,
    };

    pub use crate::identity::{
        encode_identity, identity_from_batch_row, identity_from_stored_row, KeyValue,
    };

    pub use crate::store::{qualified_name, quote_identifier, Store};

    pub use crate::select::{select_by_primary_key, RowsByIdentity, SelectedRows};

    pub use crate::merge::{merge_soft_delete, merge_update, PendingWrite};

    pub use crate::writer::BatchWriter;

    pub use crate::engine::{MutationConfig, MutationEngine};
}

// Re-export commonly used items at crate root
pub use engine::{MutationConfig, MutationEngine};
pub use error::{Error, Result};
pub use types::Value;
