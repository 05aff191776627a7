//! Error taxonomy for the import pipeline.
//!
//! Each stage owns one enum: [`InputError`] for reading the CSV file,
//! [`InferenceError`] for type decisions that cannot be honoured,
//! [`SchemaError`] for target-table reconciliation and [`GatewayError`] for
//! the database connection. [`ImportError`] aggregates them and adds
//! [`ImportError::Interrupted`] for loads that stop after some chunks were
//! already committed.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{dialect::Dialect, inference::SqlType};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Input file {path:?} does not exist")]
    NotFound { path: PathBuf },
    #[error("Opening input file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Input file {path:?} has no header row")]
    MissingHeader { path: PathBuf },
    #[error("Row {row} column {column}: bytes are not valid {encoding}")]
    Encoding {
        row: u64,
        column: usize,
        encoding: &'static str,
    },
    #[error("Row {row} has {found} field(s) but the header declares {expected}")]
    MalformedRow {
        row: u64,
        expected: usize,
        found: usize,
    },
    #[error("Reading row {row}")]
    Csv {
        row: u64,
        #[source]
        source: csv::Error,
    },
    #[error("Unknown encoding '{0}'")]
    UnknownEncoding(String),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Column '{column}' of type {sql_type} cannot be expressed in {dialect}: {reason}")]
    TypeConflict {
        column: String,
        sql_type: SqlType,
        dialect: Dialect,
        reason: String,
    },
    #[error("Row {row} column '{column}': value '{value}' does not fit type {sql_type}")]
    ValueMismatch {
        row: u64,
        column: String,
        value: String,
        sql_type: SqlType,
    },
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("No target table selected")]
    NoTableSelected,
    #[error(
        "Table '{table}' was not found; merge requires an existing table (available: {})",
        display_list(.available)
    )]
    AmbiguousTarget {
        table: String,
        available: Vec<String>,
    },
    #[error("Table '{table}' already exists (use --if-exists replace, append or merge)")]
    TableExists { table: String },
    #[error("Table '{table}' has {existing} column(s) but the CSV file provides {incoming}")]
    ColumnCountMismatch {
        table: String,
        existing: usize,
        incoming: usize,
    },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{kind} connections are not built in; use a sqlite connection")]
    UnsupportedKind { kind: Dialect },
    #[error("Connecting to {target}")]
    Connection {
        target: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Statement failed: {statement}")]
    Statement {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Statement rejected: {statement} ({reason})")]
    Rejected { statement: String, reason: String },
    #[error("Database '{name}' does not exist")]
    UnknownDatabase { name: String },
    #[error("Database '{name}' is in use by this session and cannot be dropped")]
    ActiveDatabase { name: String },
    #[error("Invalid database name '{name}': use letters, digits and underscores")]
    InvalidName { name: String },
    #[error("No database selected")]
    NoDatabaseSelected,
    #[error("Filesystem operation failed for {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(
        "Import stopped in chunk {chunk}; {committed_chunks} chunk(s) with {committed_rows} row(s) remain committed"
    )]
    Interrupted {
        chunk: usize,
        committed_chunks: usize,
        committed_rows: usize,
        #[source]
        source: Box<ImportError>,
    },
}

impl ImportError {
    /// Rows that were durably written before the failure.
    pub fn committed_rows(&self) -> usize {
        match self {
            ImportError::Interrupted { committed_rows, .. } => *committed_rows,
            _ => 0,
        }
    }
}

fn display_list(values: &[String]) -> String {
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(", ")
    }
}
