use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{dialect::Dialect, reconcile::ConflictPolicy, rows::MalformedRowPolicy};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Import CSV files into SQL databases with automatic type inference",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

/// Connection and CSV options shared by every command. Flags win over
/// environment variables, which win over the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// YAML or JSON settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Database type (sqlite, mysql, postgres)
    #[arg(long = "db-kind", value_enum, global = true)]
    pub db_kind: Option<Dialect>,
    /// Database host
    #[arg(long, global = true)]
    pub host: Option<String>,
    /// Database port
    #[arg(long, global = true)]
    pub port: Option<u16>,
    /// Database user
    #[arg(long, global = true)]
    pub user: Option<String>,
    /// Database password
    #[arg(long, global = true)]
    pub password: Option<String>,
    /// Database to connect to
    #[arg(long, global = true)]
    pub database: Option<String>,
    /// Directory holding sqlite database files
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter, global = true)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding", global = true)]
    pub input_encoding: Option<String>,
    /// Longest VARCHAR before a column becomes TEXT
    #[arg(long = "max-varchar-length", global = true)]
    pub max_varchar_length: Option<usize>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import a CSV file into a database table
    Import(ImportArgs),
    /// Analyze a CSV file and print the inferred schema
    Analyze(AnalyzeArgs),
    /// List databases
    ListDatabases,
    /// List tables in the current database
    ListTables,
    /// Create a database
    CreateDatabase(DatabaseNameArgs),
    /// Drop a database
    DropDatabase(DropDatabaseArgs),
    /// Start the interactive menu
    Interactive,
}

#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    /// CSV file to import
    pub csv: PathBuf,
    /// Target table name (defaults to the file name)
    #[arg(short, long)]
    pub table: Option<String>,
    /// What to do when the table already exists
    #[arg(long = "if-exists", value_enum, default_value_t = ConflictPolicy::Append)]
    pub if_exists: ConflictPolicy,
    /// Rows per insert transaction
    #[arg(long = "chunk-size")]
    pub chunk_size: Option<usize>,
    /// Rows used for type inference (0 means full scan)
    #[arg(long = "sample-rows")]
    pub sample_rows: Option<usize>,
    /// Handling of rows whose field count differs from the header
    #[arg(long = "on-malformed", value_enum, default_value_t = MalformedRowPolicy::Abort)]
    pub on_malformed: MalformedRowPolicy,
    /// Only analyze the file, do not import
    #[arg(long = "analyze-only")]
    pub analyze_only: bool,
    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Debug, Clone, Args)]
pub struct AnalyzeArgs {
    /// CSV file to analyze
    pub csv: PathBuf,
    /// Table name used in the generated DDL (defaults to the file name)
    #[arg(short, long)]
    pub table: Option<String>,
    /// Rows used for type inference (0 means full scan)
    #[arg(long = "sample-rows")]
    pub sample_rows: Option<usize>,
    /// Handling of rows whose field count differs from the header
    #[arg(long = "on-malformed", value_enum, default_value_t = MalformedRowPolicy::Abort)]
    pub on_malformed: MalformedRowPolicy,
    /// Output format
    #[arg(long, value_enum, default_value_t = AnalysisFormat::Table)]
    pub format: AnalysisFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnalysisFormat {
    /// Column table followed by CREATE TABLE DDL
    Table,
    /// Full analysis as JSON
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct DatabaseNameArgs {
    /// Database name
    pub name: String,
}

#[derive(Debug, Clone, Args)]
pub struct DropDatabaseArgs {
    /// Database name
    pub name: String,
    /// Drop without asking for confirmation
    #[arg(long)]
    pub force: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
