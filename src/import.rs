//! The import pipeline: analyze, reconcile, then load in chunks.

use std::{
    io::{self, BufRead, IsTerminal, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use log::info;

use crate::{
    analysis::{Analysis, AnalysisOptions, analyze_csv},
    cli::ImportArgs,
    config::Settings,
    console,
    dialect::Dialect,
    error::ImportError,
    gateway::Gateway,
    interactive::Prompter,
    io_utils,
    load::{self, LoadReport},
    reconcile::{self, ConflictPolicy, TableTarget},
    rows::{MalformedRowPolicy, RowSource, RowSourceOptions},
    sanitize::{derive_table_name, sanitize},
    session::Session,
};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub csv: PathBuf,
    /// Target table; derived from the file name when absent.
    pub table: Option<String>,
    pub policy: ConflictPolicy,
    pub chunk_size: usize,
    pub analysis: AnalysisOptions,
    pub analyze_only: bool,
    pub assume_yes: bool,
}

impl ImportOptions {
    pub fn from_settings(csv: PathBuf, settings: &Settings) -> Result<Self> {
        let delimiter = io_utils::resolve_input_delimiter(&csv, settings.csv.delimiter()?);
        let source = RowSourceOptions {
            delimiter,
            encoding: settings.csv.encoding()?,
            malformed: MalformedRowPolicy::Abort,
            report_skips: true,
        };
        Ok(Self {
            csv,
            table: None,
            policy: ConflictPolicy::Append,
            chunk_size: settings.csv.chunk_size,
            analysis: AnalysisOptions {
                source,
                sample_rows: settings.csv.sample_rows,
                max_varchar_length: settings.csv.max_varchar_length,
            },
            analyze_only: false,
            assume_yes: false,
        })
    }

    pub fn table_name(&self) -> String {
        target_table_name(self.table.as_deref(), &self.csv)
    }
}

pub fn default_table_name(csv: &Path) -> String {
    derive_table_name(csv)
}

/// Explicit names are sanitized; otherwise the name comes from the file.
pub fn target_table_name(requested: Option<&str>, csv: &Path) -> String {
    match requested.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => sanitize(name),
        None => derive_table_name(csv),
    }
}

/// Analyzes and imports `options.csv` without any console interaction.
pub fn import_csv(
    gateway: &mut dyn Gateway,
    options: &ImportOptions,
    progress: &ProgressBar,
) -> Result<LoadReport, ImportError> {
    let analysis = analyze_csv(&options.csv, &options.analysis)?;
    import_analyzed(gateway, &analysis, options, progress)
}

/// Imports a file that was already analyzed. The file is read a second time
/// to stream rows into the target.
pub fn import_analyzed(
    gateway: &mut dyn Gateway,
    analysis: &Analysis,
    options: &ImportOptions,
    progress: &ProgressBar,
) -> Result<LoadReport, ImportError> {
    let table = target_table_name(options.table.as_deref(), &analysis.file_path);
    let target = TableTarget::inspect(gateway, Some(&table), options.policy)?;
    let rows = RowSource::open(&analysis.file_path, load_pass_options(options.analysis.source))?;
    let plan = reconcile::plan(
        target,
        &analysis.columns,
        rows,
        options.policy,
        gateway.dialect(),
    )?;
    info!(
        "Loading {} row(s) into '{}' ({:?})",
        analysis.total_rows,
        plan.table(),
        plan.action()
    );
    load::apply(gateway, plan, options.chunk_size, progress)
}

/// Row source options for the load pass. Malformed rows were already
/// reported while analyzing.
fn load_pass_options(analysis: RowSourceOptions) -> RowSourceOptions {
    RowSourceOptions {
        report_skips: false,
        ..analysis
    }
}

pub fn print_analysis(analysis: &Analysis, table: &str, dialect: Dialect) -> Result<()> {
    console::heading(&format!("Analysis of {}", analysis.file_path.display()));
    println!("  File size: {} bytes", analysis.file_size);
    println!("  Rows: {}", analysis.total_rows);
    if analysis.skipped_rows > 0 {
        println!("  Skipped malformed rows: {}", analysis.skipped_rows);
    }
    if analysis.sampled_rows < analysis.total_rows {
        println!("  Types inferred from the first {} row(s)", analysis.sampled_rows);
    }
    println!("  Columns: {}", analysis.columns.len());
    println!();
    print!("{}", analysis.render_columns());
    println!();
    let ddl = analysis
        .ddl(table, dialect)
        .with_context(|| format!("Generating {dialect} DDL for '{table}'"))?;
    console::heading(&format!("Generated DDL ({dialect}):"));
    println!("{ddl};");
    Ok(())
}

/// Console flow: print the analysis, ask for confirmation, then import with
/// a progress bar.
pub fn run_import<R: BufRead, W: Write>(
    session: &mut Session,
    options: &ImportOptions,
    prompter: &mut Prompter<R, W>,
) -> Result<()> {
    let analysis = analyze_csv(&options.csv, &options.analysis)
        .with_context(|| format!("Analyzing {:?}", options.csv))?;
    let table = options.table_name();
    let dialect = session.gateway().dialect();
    print_analysis(&analysis, &table, dialect)?;
    if options.analyze_only {
        return Ok(());
    }

    let database = session.require_database()?.to_string();
    let question = format!(
        "Import {} row(s) into table '{table}' of database '{database}'?",
        analysis.total_rows
    );
    if !options.assume_yes && !prompter.confirm(&question)? {
        console::warning("Import cancelled");
        return Ok(());
    }

    let progress = console::insert_progress(analysis.total_rows as u64);
    let outcome = import_analyzed(session.gateway(), &analysis, options, &progress);
    progress.finish_and_clear();
    match outcome {
        Ok(report) => {
            console::success(&format!(
                "Table '{}' {}: {} row(s) inserted in {} chunk(s)",
                report.table, report.action, report.rows_inserted, report.chunks
            ));
            if report.duplicates_skipped > 0 {
                console::info(&format!(
                    "Skipped {} row(s) already present in '{}'",
                    report.duplicates_skipped, report.table
                ));
            }
            Ok(())
        }
        Err(err) => {
            if err.committed_rows() > 0 {
                console::warning(&format!(
                    "{} row(s) were committed before the failure",
                    err.committed_rows()
                ));
            }
            Err(err).with_context(|| format!("Importing {:?} into '{table}'", options.csv))
        }
    }
}

/// `import` subcommand.
pub fn execute(args: &ImportArgs, settings: &Settings) -> Result<()> {
    let mut options = ImportOptions::from_settings(args.csv.clone(), settings)?;
    options.table = args.table.clone();
    options.policy = args.if_exists;
    options.analyze_only = args.analyze_only;
    options.assume_yes = args.yes;
    options.analysis.source.malformed = args.on_malformed;
    if let Some(chunk_size) = args.chunk_size {
        anyhow::ensure!(chunk_size > 0, "--chunk-size must be greater than zero");
        options.chunk_size = chunk_size;
    }
    if let Some(sample_rows) = args.sample_rows {
        options.analysis.sample_rows = sample_rows;
    }

    if options.analyze_only {
        let analysis = analyze_csv(&options.csv, &options.analysis)
            .with_context(|| format!("Analyzing {:?}", options.csv))?;
        return print_analysis(&analysis, &options.table_name(), settings.database.kind);
    }

    let mut session = Session::connect(&settings.database)?;
    if io::stdin().is_terminal() {
        run_import(&mut session, &options, &mut Prompter::stdio())
    } else {
        // Without a terminal there is nobody to answer; confirm() sees EOF.
        run_import(&mut session, &options, &mut Prompter::new(io::empty(), io::stdout()))
    }
}
