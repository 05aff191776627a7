//! Chunked insertion. Every chunk is its own transaction: a failure rolls back
//! the chunk in progress and leaves earlier chunks committed.

use indicatif::ProgressBar;
use log::{debug, info, warn};

use crate::{
    data::Value,
    error::ImportError,
    gateway::Gateway,
    reconcile::{ColumnDef, Plan, PlanAction},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkTally {
    pub rows: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub table: String,
    pub action: PlanAction,
    pub rows_inserted: usize,
    pub chunks: usize,
    pub duplicates_skipped: usize,
}

/// Executes `plan`: DDL first for create/replace plans, then the rows.
pub fn apply(
    gateway: &mut dyn Gateway,
    plan: Plan<'_>,
    chunk_size: usize,
    progress: &ProgressBar,
) -> Result<LoadReport, ImportError> {
    let action = plan.action();
    match plan {
        Plan::CreateTable {
            table,
            columns,
            ddl,
            replace_existing,
            rows,
        } => {
            if replace_existing {
                let drop = gateway.dialect().drop_table_sql(&table);
                gateway.execute(&drop, &[])?;
                info!("Dropped existing table '{table}'");
            }
            gateway.execute(&ddl, &[])?;
            info!("Created table '{table}' with {} column(s)", columns.len());
            let tally = insert_chunked(gateway, &table, &columns, rows, chunk_size, progress)?;
            Ok(report(table, action, tally, 0))
        }
        Plan::AppendRows {
            table,
            columns,
            rows,
        } => {
            let tally = insert_chunked(gateway, &table, &columns, rows, chunk_size, progress)?;
            Ok(report(table, action, tally, 0))
        }
        Plan::MergeRows {
            table,
            columns,
            rows,
            duplicates,
        } => {
            let tally = insert_chunked(gateway, &table, &columns, rows, chunk_size, progress)?;
            Ok(report(table, action, tally, duplicates.get()))
        }
    }
}

fn report(table: String, action: PlanAction, tally: ChunkTally, duplicates: usize) -> LoadReport {
    LoadReport {
        table,
        action,
        rows_inserted: tally.rows,
        chunks: tally.chunks,
        duplicates_skipped: duplicates,
    }
}

/// Inserts `rows` into `table` in transactions of at most `chunk_size` rows.
pub fn insert_chunked<I>(
    gateway: &mut dyn Gateway,
    table: &str,
    columns: &[ColumnDef],
    rows: I,
    chunk_size: usize,
    progress: &ProgressBar,
) -> Result<ChunkTally, ImportError>
where
    I: Iterator<Item = Result<Vec<Value>, ImportError>>,
{
    let sql = gateway.dialect().insert_sql(table, columns);
    let chunk_size = chunk_size.max(1);
    let mut rows = rows.peekable();
    let mut tally = ChunkTally::default();

    while rows.peek().is_some() {
        let chunk = tally.chunks + 1;
        match write_chunk(gateway, &sql, &mut rows, chunk_size, progress) {
            Ok(written) => {
                tally.rows += written;
                tally.chunks = chunk;
                debug!("Committed chunk {chunk} ({written} row(s)) into '{table}'");
            }
            Err(source) => {
                if let Err(rollback) = gateway.rollback_chunk() {
                    warn!("Rolling back chunk {chunk} failed: {rollback}");
                }
                return Err(ImportError::Interrupted {
                    chunk,
                    committed_chunks: tally.chunks,
                    committed_rows: tally.rows,
                    source: Box::new(source),
                });
            }
        }
    }
    progress.finish_and_clear();
    Ok(tally)
}

fn write_chunk<I>(
    gateway: &mut dyn Gateway,
    sql: &str,
    rows: &mut I,
    chunk_size: usize,
    progress: &ProgressBar,
) -> Result<usize, ImportError>
where
    I: Iterator<Item = Result<Vec<Value>, ImportError>>,
{
    gateway.begin_chunk()?;
    let mut written = 0;
    for row in rows.by_ref().take(chunk_size) {
        gateway.execute(sql, &row?)?;
        written += 1;
        progress.inc(1);
    }
    gateway.commit_chunk()?;
    Ok(written)
}
