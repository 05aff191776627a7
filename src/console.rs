//! Colored status lines and the insert progress bar.

use std::io::{self, IsTerminal};

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

pub fn success(message: &str) {
    println!("{}", format!("✓ {message}").green());
}

pub fn error(message: &str) {
    eprintln!("{}", format!("✗ {message}").red());
}

pub fn warning(message: &str) {
    println!("{}", format!("⚠ {message}").yellow());
}

pub fn info(message: &str) {
    println!("{}", format!("ℹ {message}").blue());
}

pub fn heading(message: &str) {
    println!("{}", message.bold());
}

/// Progress bar over `total` rows. Hidden unless stderr is a terminal.
pub fn insert_progress(total: u64) -> ProgressBar {
    if !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} rows ({per_sec})",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}
