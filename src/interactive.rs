//! Line-oriented prompts and the interactive menu.

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

use anyhow::Result;
use log::debug;

use crate::{
    config::Settings,
    console, databases,
    import::{self, ImportOptions},
    reconcile::ConflictPolicy,
    session::Session,
};

/// Reads answers from `input` and writes prompts to `output`.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prints `question` and returns the trimmed answer, or `None` at end of
    /// input.
    pub fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{question}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Like [`Prompter::ask`], substituting `default` for an empty answer.
    pub fn ask_or(&mut self, question: &str, default: &str) -> io::Result<Option<String>> {
        Ok(self
            .ask(&format!("{question} [{default}]: "))?
            .map(|answer| if answer.is_empty() { default.to_string() } else { answer }))
    }

    /// Yes/no question. Anything but `y`/`yes` (including end of input)
    /// counts as no.
    pub fn confirm(&mut self, question: &str) -> io::Result<bool> {
        let answer = self.ask(&format!("{question} (y/N): "))?;
        Ok(answer.is_some_and(|a| matches!(a.to_ascii_lowercase().as_str(), "y" | "yes")))
    }

    pub fn say(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{message}")
    }
}

const MENU: &[&str] = &[
    "1. Import CSV file",
    "2. Analyze CSV file",
    "3. List databases",
    "4. List tables",
    "5. Create database",
    "6. Drop database",
    "7. Switch database",
    "8. Exit",
];

/// Runs the menu loop until the user exits or input ends. Errors from a
/// single action are reported and the loop continues.
pub fn run_menu<R: BufRead, W: Write>(
    session: &mut Session,
    settings: &Settings,
    prompter: &mut Prompter<R, W>,
) -> Result<()> {
    prompter.say("CSV to SQL interactive mode")?;
    loop {
        prompter.say("")?;
        prompter.say(&format!(
            "Current database: {}",
            session.active_database().unwrap_or("none")
        ))?;
        for entry in MENU {
            prompter.say(entry)?;
        }
        let Some(choice) = prompter.ask("Select an option (1-8): ")? else {
            break;
        };
        debug!("Menu choice '{choice}'");
        let outcome = match choice.as_str() {
            "1" => menu_import(session, settings, prompter, false),
            "2" => menu_import(session, settings, prompter, true),
            "3" => databases::list_databases(session),
            "4" => databases::list_tables(session),
            "5" => match prompter.ask("Database name: ")? {
                Some(name) if !name.is_empty() => databases::create_database(session, &name),
                _ => Ok(()),
            },
            "6" => match prompter.ask("Database name: ")? {
                Some(name) if !name.is_empty() => {
                    databases::drop_database(session, &name, false, prompter)
                }
                _ => Ok(()),
            },
            "7" => match prompter.ask("Database name: ")? {
                Some(name) if !name.is_empty() => session
                    .use_database(&name)
                    .map(|_| console::success(&format!("Using database '{name}'")))
                    .map_err(anyhow::Error::from),
                _ => Ok(()),
            },
            "8" | "q" | "quit" | "exit" => break,
            other => {
                console::warning(&format!("Unknown option '{other}'"));
                Ok(())
            }
        };
        if let Err(err) = outcome {
            console::error(&format!("{err:#}"));
        }
    }
    prompter.say("Goodbye")?;
    Ok(())
}

fn menu_import<R: BufRead, W: Write>(
    session: &mut Session,
    settings: &Settings,
    prompter: &mut Prompter<R, W>,
    analyze_only: bool,
) -> Result<()> {
    let Some(path) = prompter.ask("CSV file path: ")? else {
        return Ok(());
    };
    if path.is_empty() {
        return Ok(());
    }
    let csv = PathBuf::from(path);
    let mut options = ImportOptions::from_settings(csv, settings)?;
    if !analyze_only {
        let default_table = import::default_table_name(&options.csv);
        if let Some(table) = prompter.ask_or("Table name", &default_table)? {
            options.table = Some(table);
        }
        if let Some(policy) =
            prompter.ask_or("If table exists (fail/replace/append/merge)", "append")?
        {
            options.policy = match policy.to_ascii_lowercase().as_str() {
                "fail" => ConflictPolicy::Fail,
                "replace" => ConflictPolicy::Replace,
                "merge" => ConflictPolicy::Merge,
                _ => ConflictPolicy::Append,
            };
        }
    }
    options.analyze_only = analyze_only;
    import::run_import(session, &options, prompter)
}
