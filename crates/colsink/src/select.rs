//! Parallel primary-key selector
//!
//! Issues grouped point-lookup reads for the primary keys of a change batch
//! and folds the fetched rows into an identity-keyed map. Groups run
//! strictly in sequence with up to `max_parallel_selects` concurrent slice
//! reads each, capping total in-flight queries against the store regardless
//! of batch size. Slice numbering places every scanned row at its absolute
//! batch offset independent of task completion order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future;
use tracing::warn;

use crate::batch::{CsvColumn, CsvColumns};
use crate::error::{Error, Result};
use crate::identity::identity_from_stored_row;
use crate::retry::RetryExecutor;
use crate::slice::{group_slices, Slice};
use crate::store::{qualified_name, quote_identifier, Store};
use crate::types::{Row, TableDescription, Value};

/// Stored rows keyed by canonical row identity.
///
/// Built once per merge batch and discarded after use.
pub type RowsByIdentity = HashMap<String, Row>;

/// Result of a parallel select over one batch slice
#[derive(Debug, Default)]
pub struct SelectedRows {
    /// Scan slots in original batch order; `None` where the store returned
    /// fewer rows than the slice referenced
    pub fetched: Vec<Option<Row>>,
    /// Fetched rows keyed by identity
    pub by_identity: RowsByIdentity,
}

impl SelectedRows {
    /// Number of rows the store actually returned across all slices
    pub fn found_count(&self) -> usize {
        self.fetched.iter().flatten().count()
    }
}

/// Fetch the stored rows referenced by a batch's primary keys.
///
/// Any task failure aborts the whole call; partially built maps from
/// already-completed tasks are discarded with it.
pub async fn select_by_primary_key(
    store: Arc<dyn Store>,
    retry: &RetryExecutor,
    schema: &str,
    table: &TableDescription,
    csv: &CsvColumns,
    rows: &[Vec<String>],
    select_batch_size: usize,
    max_parallel_selects: usize,
) -> Result<SelectedRows> {
    let groups = group_slices(rows.len(), select_batch_size, max_parallel_selects)?;

    // One empty scan slot per incoming row, filled at slice.num * batch_size
    // + local offset.
    let mut fetched: Vec<Option<Row>> = vec![None; rows.len()];
    let by_identity = Arc::new(Mutex::new(RowsByIdentity::new()));
    let column_names = table.column_names();

    for group in groups {
        let mut handles = Vec::with_capacity(group.len());

        for slice in group {
            let sql = point_lookup_sql(schema, table.name(), &column_names, csv.primary_keys(), slice.len());
            let params = lookup_params(csv, &rows[slice.start..slice.end])?;

            let store = store.clone();
            let retry = retry.clone();
            let csv = csv.clone();
            let by_identity = by_identity.clone();

            handles.push(tokio::spawn(async move {
                let scanned = retry.run("select", || store.query(&sql, &params)).await?;
                for row in &scanned {
                    let key = identity_from_stored_row(&csv, row)?;
                    // Coarse lock, held only for the single insert.
                    let previous = by_identity
                        .lock()
                        .map_err(|_| Error::internal("identity map poisoned"))?
                        .insert(key.clone(), row.clone());
                    if previous.is_some() {
                        warn!(identity = %key, "duplicate row identity in select batch, last write wins");
                    }
                }
                Ok::<_, Error>((slice, scanned))
            }));
        }

        // Join the whole group before starting the next; one failure
        // invalidates the group even if siblings completed.
        for result in future::join_all(handles).await {
            let (slice, scanned) = result
                .map_err(|e| Error::internal(format!("select task panicked: {e}")))??;
            place_scanned(&mut fetched, slice, select_batch_size, scanned)?;
        }
    }

    let by_identity = Arc::try_unwrap(by_identity)
        .map_err(|_| Error::internal("identity map still shared after join"))?
        .into_inner()
        .map_err(|_| Error::internal("identity map poisoned"))?;

    Ok(SelectedRows { fetched, by_identity })
}

fn place_scanned(
    fetched: &mut [Option<Row>],
    slice: Slice,
    select_batch_size: usize,
    scanned: Vec<Row>,
) -> Result<()> {
    if scanned.len() > slice.len() {
        return Err(Error::query(format!(
            "point lookup for slice {} returned {} rows for {} keys",
            slice.num,
            scanned.len(),
            slice.len()
        )));
    }
    let base = slice.num * select_batch_size;
    for (offset, row) in scanned.into_iter().enumerate() {
        fetched[base + offset] = Some(row);
    }
    Ok(())
}

/// Build the point-lookup query for one slice's primary-key tuples.
///
/// Reads against latest-version semantics (`FINAL`) so prior duplicate
/// versions resolve before matching.
fn point_lookup_sql(
    schema: &str,
    table: &str,
    column_names: &[String],
    primary_keys: &[CsvColumn],
    tuple_count: usize,
) -> String {
    let select_list: Vec<String> = column_names.iter().map(|c| quote_identifier(c)).collect();

    let (key_expr, tuple) = if primary_keys.len() == 1 {
        (quote_identifier(&primary_keys[0].name), "?".to_string())
    } else {
        let names: Vec<String> = primary_keys
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect();
        let placeholders = vec!["?"; primary_keys.len()].join(", ");
        (format!("({})", names.join(", ")), format!("({placeholders})"))
    };
    let tuples = vec![tuple; tuple_count].join(", ");

    format!(
        "SELECT {} FROM {} FINAL WHERE {} IN ({})",
        select_list.join(", "),
        qualified_name(schema, table),
        key_expr,
        tuples
    )
}

/// Parse the primary-key fields of each batch row into typed parameters
fn lookup_params(csv: &CsvColumns, rows: &[Vec<String>]) -> Result<Vec<Value>> {
    let mut params = Vec::with_capacity(rows.len() * csv.primary_keys().len());
    for row in rows {
        for col in csv.primary_keys() {
            let text = csv.field(col, row)?;
            params.push(col.logical_type.parse_text(text)?);
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogicalType;

    fn csv_single_pk() -> CsvColumns {
        CsvColumns::new(
            vec![
                CsvColumn::new("id", 0, 0, LogicalType::Long).primary_key(),
                CsvColumn::new("name", 1, 1, LogicalType::String),
            ],
            2,
        )
        .unwrap()
    }

    fn csv_compound_pk() -> CsvColumns {
        CsvColumns::new(
            vec![
                CsvColumn::new("id", 0, 0, LogicalType::Long).primary_key(),
                CsvColumn::new("region", 1, 1, LogicalType::String).primary_key(),
                CsvColumn::new("name", 2, 2, LogicalType::String),
            ],
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_point_lookup_sql_single_key() {
        let csv = csv_single_pk();
        let sql = point_lookup_sql(
            "prod",
            "users",
            &["id".to_string(), "name".to_string()],
            csv.primary_keys(),
            2,
        );
        assert_eq!(
            sql,
            "SELECT `id`, `name` FROM `prod`.`users` FINAL WHERE `id` IN (?, ?)"
        );
    }

    #[test]
    fn test_point_lookup_sql_compound_key() {
        let csv = csv_compound_pk();
        let sql = point_lookup_sql(
            "prod",
            "users",
            &["id".to_string(), "region".to_string(), "name".to_string()],
            csv.primary_keys(),
            2,
        );
        assert_eq!(
            sql,
            "SELECT `id`, `region`, `name` FROM `prod`.`users` FINAL \
             WHERE (`id`, `region`) IN ((?, ?), (?, ?))"
        );
    }

    #[test]
    fn test_lookup_params_typed_in_key_order() {
        let csv = csv_compound_pk();
        let rows = vec![
            vec!["1".to_string(), "eu".to_string(), "a".to_string()],
            vec!["2".to_string(), "us".to_string(), "b".to_string()],
        ];
        let params = lookup_params(&csv, &rows).unwrap();
        assert_eq!(
            params,
            vec![
                Value::Int64(1),
                Value::String("eu".into()),
                Value::Int64(2),
                Value::String("us".into()),
            ]
        );
    }

    #[test]
    fn test_lookup_params_data_error() {
        let csv = csv_single_pk();
        let rows = vec![vec!["not-a-long".to_string(), "a".to_string()]];
        assert!(lookup_params(&csv, &rows).is_err());
    }

    #[test]
    fn test_place_scanned_uses_absolute_offsets() {
        let mut fetched: Vec<Option<Row>> = vec![None; 5];
        let row = Row::new(vec!["id".into()], vec![Value::Int64(9)]);

        // Slice 2 with batch size 2 lands at offset 4 regardless of when
        // its task finished.
        place_scanned(
            &mut fetched,
            Slice { num: 2, start: 4, end: 5 },
            2,
            vec![row.clone()],
        )
        .unwrap();

        assert!(fetched[0].is_none());
        assert_eq!(fetched[4], Some(row));
    }

    #[test]
    fn test_found_count_skips_empty_slots() {
        let row = Row::new(vec!["id".into()], vec![Value::Int64(9)]);
        let selected = SelectedRows {
            fetched: vec![None, Some(row.clone()), None, Some(row)],
            by_identity: RowsByIdentity::new(),
        };
        assert_eq!(selected.found_count(), 2);
    }

    #[test]
    fn test_place_scanned_rejects_overflow() {
        let mut fetched: Vec<Option<Row>> = vec![None; 2];
        let row = Row::new(vec!["id".into()], vec![Value::Int64(9)]);
        let err = place_scanned(
            &mut fetched,
            Slice { num: 0, start: 0, end: 1 },
            2,
            vec![row.clone(), row],
        )
        .unwrap_err();
        assert!(err.to_string().contains("returned 2 rows"));
    }
}
