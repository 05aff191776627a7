//! CSV analysis: one streaming pass that infers a SQL type per column and
//! gathers the statistics shown before an import.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::Serialize;

use crate::{
    data::is_null_token,
    dialect::Dialect,
    error::{InferenceError, InputError},
    inference::{ColumnProfile, DEFAULT_MAX_VARCHAR_LENGTH, SqlType},
    reconcile::ColumnDef,
    rows::{RowSource, RowSourceOptions},
    sanitize::sanitize_headers,
    table,
};

const SAMPLE_VALUE_COUNT: usize = 3;
const UNIQUE_TRACKING_CAP: usize = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    pub source: RowSourceOptions,
    /// Rows fed to type inference; 0 means every row.
    pub sample_rows: usize,
    pub max_varchar_length: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            source: RowSourceOptions::default(),
            sample_rows: 0,
            max_varchar_length: DEFAULT_MAX_VARCHAR_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub original_name: String,
    pub sanitized_name: String,
    pub inferred_type: SqlType,
    pub sample_values: Vec<String>,
    pub non_null_count: usize,
    pub null_count: usize,
    /// Distinct non-null values, counted up to an internal cap.
    pub unique_values: usize,
    pub unique_capped: bool,
}

impl ColumnDescriptor {
    pub fn new(
        original_name: impl Into<String>,
        sanitized_name: impl Into<String>,
        inferred_type: SqlType,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            sanitized_name: sanitized_name.into(),
            inferred_type,
            sample_values: Vec::new(),
            non_null_count: 0,
            null_count: 0,
            unique_values: 0,
            unique_capped: false,
        }
    }

    pub fn column_def(&self) -> ColumnDef {
        ColumnDef::new(self.sanitized_name.clone(), self.inferred_type)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub file_path: PathBuf,
    pub file_size: u64,
    pub total_rows: usize,
    pub skipped_rows: usize,
    pub sampled_rows: usize,
    pub columns: Vec<ColumnDescriptor>,
}

impl Analysis {
    pub fn column_defs(&self) -> Vec<ColumnDef> {
        self.columns.iter().map(ColumnDescriptor::column_def).collect()
    }

    pub fn ddl(&self, table: &str, dialect: Dialect) -> Result<String, InferenceError> {
        dialect.create_table_sql(table, &self.column_defs())
    }

    /// Column overview with long names and samples shortened for the terminal.
    pub fn render_columns(&self) -> String {
        let headers = ["Column", "Clean Name", "SQL Type", "Non-null", "Unique", "Sample"]
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();
        let rows = self
            .columns
            .iter()
            .map(|column| {
                let unique = if column.unique_capped {
                    format!("{}+", column.unique_values)
                } else {
                    column.unique_values.to_string()
                };
                vec![
                    table::truncate(&column.original_name, 20),
                    table::truncate(&column.sanitized_name, 20),
                    column.inferred_type.to_string(),
                    column.non_null_count.to_string(),
                    unique,
                    column
                        .sample_values
                        .first()
                        .map(|sample| table::truncate(sample, 15))
                        .unwrap_or_default(),
                ]
            })
            .collect::<Vec<_>>();
        table::render_table(&headers, &rows)
    }
}

#[derive(Default)]
struct ColumnStats {
    profile: ColumnProfile,
    non_null: usize,
    nulls: usize,
    samples: Vec<String>,
    uniques: HashSet<String>,
    capped: bool,
}

impl ColumnStats {
    fn observe(&mut self, value: &str, infer: bool) {
        if infer {
            self.profile.observe(value);
        }
        let trimmed = value.trim();
        if is_null_token(trimmed) {
            self.nulls += 1;
            return;
        }
        self.non_null += 1;
        if self.samples.len() < SAMPLE_VALUE_COUNT {
            self.samples.push(trimmed.to_string());
        }
        if self.uniques.len() < UNIQUE_TRACKING_CAP {
            self.uniques.insert(trimmed.to_string());
        } else if !self.uniques.contains(trimmed) {
            self.capped = true;
        }
    }
}

/// Reads `path` once, inferring column types from the first
/// `options.sample_rows` rows (all rows when 0) and counting the rest.
pub fn analyze_csv(path: &Path, options: &AnalysisOptions) -> Result<Analysis, InputError> {
    let mut source = RowSource::open(path, options.source)?;
    let file_size = fs::metadata(path)
        .map(|metadata| metadata.len())
        .map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let headers = source.headers().to_vec();
    let sanitized = sanitize_headers(&headers);
    debug!("Sanitized headers: {:?}", sanitized);

    let mut stats = headers
        .iter()
        .map(|_| ColumnStats::default())
        .collect::<Vec<_>>();
    let mut total_rows = 0usize;
    for row in source.by_ref() {
        let row = row?;
        total_rows += 1;
        let infer = options.sample_rows == 0 || total_rows <= options.sample_rows;
        for (column, value) in stats.iter_mut().zip(&row.fields) {
            column.observe(value, infer);
        }
    }
    let sampled_rows = if options.sample_rows == 0 {
        total_rows
    } else {
        total_rows.min(options.sample_rows)
    };

    let columns = headers
        .into_iter()
        .zip(sanitized)
        .zip(stats)
        .map(|((original_name, sanitized_name), stats)| ColumnDescriptor {
            inferred_type: stats.profile.decide(options.max_varchar_length),
            original_name,
            sanitized_name,
            sample_values: stats.samples,
            non_null_count: stats.non_null,
            null_count: stats.nulls,
            unique_values: stats.uniques.len(),
            unique_capped: stats.capped,
        })
        .collect::<Vec<_>>();

    info!(
        "Analyzed {:?}: {} row(s), {} column(s); types inferred from {} row(s)",
        path,
        total_rows,
        columns.len(),
        sampled_rows
    );

    Ok(Analysis {
        file_path: path.to_path_buf(),
        file_size,
        total_rows,
        skipped_rows: source.skipped_rows(),
        sampled_rows,
        columns,
    })
}
