pub mod analysis;
pub mod cli;
pub mod config;
pub mod console;
pub mod data;
pub mod databases;
pub mod dialect;
pub mod error;
pub mod gateway;
pub mod import;
pub mod inference;
pub mod interactive;
pub mod io_utils;
pub mod load;
pub mod reconcile;
pub mod rows;
pub mod sanitize;
pub mod session;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    analysis::{AnalysisOptions, analyze_csv},
    cli::{AnalysisFormat, AnalyzeArgs, Cli, Commands},
    config::Settings,
    import::ImportOptions,
    interactive::Prompter,
    session::Session,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_to_sql", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::resolve(&cli.global).context("Loading settings")?;
    debug!("Effective settings: {:?}", redacted(&settings));
    match cli.command {
        Commands::Import(args) => import::execute(&args, &settings),
        Commands::Analyze(args) => handle_analyze(&args, &settings),
        Commands::ListDatabases => {
            databases::list_databases(&mut databases::maintenance_session(&settings)?)
        }
        Commands::ListTables => databases::list_tables(&mut Session::connect(&settings.database)?),
        Commands::CreateDatabase(args) => databases::create_database(
            &mut databases::maintenance_session(&settings)?,
            &args.name,
        ),
        Commands::DropDatabase(args) => databases::execute_drop(&settings, &args.name, args.force),
        Commands::Interactive => handle_interactive(&settings),
    }
}

fn handle_analyze(args: &AnalyzeArgs, settings: &Settings) -> Result<()> {
    let defaults = ImportOptions::from_settings(args.csv.clone(), settings)?;
    let mut options: AnalysisOptions = defaults.analysis;
    options.source.malformed = args.on_malformed;
    if let Some(sample_rows) = args.sample_rows {
        options.sample_rows = sample_rows;
    }
    info!(
        "Analyzing '{}' with delimiter '{}'",
        args.csv.display(),
        printable_delimiter(options.source.delimiter)
    );
    let analysis = analyze_csv(&args.csv, &options)
        .with_context(|| format!("Analyzing {:?}", args.csv))?;
    match args.format {
        AnalysisFormat::Table => {
            let table = import::target_table_name(args.table.as_deref(), &args.csv);
            import::print_analysis(&analysis, &table, settings.database.kind)
        }
        AnalysisFormat::Json => {
            let json = serde_json::to_string_pretty(&analysis)
                .context("Serializing analysis to JSON")?;
            println!("{json}");
            Ok(())
        }
    }
}

fn handle_interactive(settings: &Settings) -> Result<()> {
    let mut session = Session::connect(&settings.database)?;
    interactive::run_menu(&mut session, settings, &mut Prompter::stdio())
}

fn redacted(settings: &Settings) -> Settings {
    let mut copy = settings.clone();
    if !copy.database.password.is_empty() {
        copy.database.password = "***".to_string();
    }
    copy
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
