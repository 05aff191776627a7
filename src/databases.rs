//! Database and table listing and maintenance commands.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};

use crate::{
    config::Settings,
    console,
    interactive::Prompter,
    session::Session,
    table,
};

pub fn list_databases(session: &mut Session) -> Result<()> {
    let active = session.active_database().map(str::to_string);
    let names = session
        .gateway()
        .list_databases()
        .context("Listing databases")?;
    if names.is_empty() {
        console::info("No databases found");
        return Ok(());
    }
    let rows = names
        .into_iter()
        .map(|name| {
            let marker = if active.as_deref() == Some(name.as_str()) {
                "*".to_string()
            } else {
                String::new()
            };
            vec![name, marker]
        })
        .collect::<Vec<_>>();
    table::print_table(&["Database".to_string(), "Active".to_string()], &rows);
    Ok(())
}

pub fn list_tables(session: &mut Session) -> Result<()> {
    let database = session.require_database()?.to_string();
    let gateway = session.gateway();
    let tables = gateway
        .list_tables()
        .with_context(|| format!("Listing tables of '{database}'"))?;
    if tables.is_empty() {
        console::info(&format!("No tables in database '{database}'"));
        return Ok(());
    }
    let mut rows = Vec::with_capacity(tables.len());
    for name in tables {
        let columns = gateway
            .table_columns(&name)
            .with_context(|| format!("Describing table '{name}'"))?;
        rows.push(vec![name, columns.len().to_string()]);
    }
    console::heading(&format!("Tables in '{database}':"));
    table::print_table(&["Table".to_string(), "Columns".to_string()], &rows);
    Ok(())
}

pub fn create_database(session: &mut Session, name: &str) -> Result<()> {
    session
        .gateway()
        .create_database(name)
        .with_context(|| format!("Creating database '{name}'"))?;
    console::success(&format!("Database '{name}' is ready"));
    Ok(())
}

/// Drops `name` after confirmation unless `force` is set.
pub fn drop_database<R: BufRead, W: Write>(
    session: &mut Session,
    name: &str,
    force: bool,
    prompter: &mut Prompter<R, W>,
) -> Result<()> {
    if !force
        && !prompter.confirm(&format!(
            "Drop database '{name}'? This cannot be undone"
        ))?
    {
        console::warning("Drop cancelled");
        return Ok(());
    }
    session
        .gateway()
        .drop_database(name)
        .with_context(|| format!("Dropping database '{name}'"))?;
    console::success(&format!("Database '{name}' dropped"));
    Ok(())
}

/// Opens a session without selecting a database, for maintenance commands
/// that must not create the configured one as a side effect.
pub fn maintenance_session(settings: &Settings) -> Result<Session> {
    let mut database = settings.database.clone();
    database.name = None;
    Ok(Session::connect(&database)?)
}

/// `drop-database` subcommand.
pub fn execute_drop(settings: &Settings, name: &str, force: bool) -> Result<()> {
    let mut session = maintenance_session(settings)?;
    if io::stdin().is_terminal() {
        drop_database(&mut session, name, force, &mut Prompter::stdio())
    } else {
        drop_database(
            &mut session,
            name,
            force,
            &mut Prompter::new(io::empty(), io::stdout()),
        )
    }
}
