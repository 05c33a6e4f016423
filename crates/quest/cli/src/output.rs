//! Output formatting utilities

use crate::error::CliResult;
use colored::*;
use quest_engine::{Outcome, SideEffectWarning};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a vector of items in the specified format
pub fn print_output<T: Serialize + Tabled>(data: Vec<T>, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No results".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&data)?),
    }
    Ok(())
}

/// Print a single item as JSON
pub fn print_single<T: Serialize>(data: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Print the warnings an operation collected and hand back its value
pub fn report<T>(outcome: Outcome<T>) -> T {
    for warning in &outcome.warnings {
        print_side_effect(warning);
    }
    outcome.into_value()
}

fn print_side_effect(warning: &SideEffectWarning) {
    print_warning(&warning.to_string());
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

/// Colour a signed amount: credits green, debits red.
pub fn colorize_amount(amount: i64) -> ColoredString {
    if amount >= 0 {
        format!("+{amount}").green()
    } else {
        amount.to_string().red()
    }
}
