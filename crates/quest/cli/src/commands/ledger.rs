//! Balance, history, undo and adjustment commands

use super::{timestamp, Session};
use crate::error::CliResult;
use crate::output::{self, colorize_amount, print_success};
use clap::Subcommand;
use quest_types::{EventId, GroupId, LedgerEvent, TaskCompletionRecord};
use serde::Serialize;
use tabled::Tabled;

/// Ledger subcommands
#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Show your balance in a group
    Balance {
        /// Group ID
        group_id: i64,
    },

    /// Show your ledger events in a group, newest first
    History {
        /// Group ID
        group_id: i64,
    },

    /// Show your task completions in a group
    Completions {
        /// Group ID
        group_id: i64,
    },

    /// Reverse one of your events
    Undo {
        /// Event ID
        event_id: i64,
    },

    /// Credit or debit your balance by hand
    Adjust {
        /// Group ID
        group_id: i64,

        /// Signed amount
        #[arg(allow_hyphen_values = true)]
        amount: i64,

        /// Reason shown in history
        #[arg(short, long, default_value = "")]
        description: String,
    },
}

/// Table row for event display
#[derive(Debug, Serialize, Tabled)]
struct EventRow {
    id: i64,
    amount: i64,
    source: String,
    quantity: i64,
    description: String,
    at: String,
}

impl From<LedgerEvent> for EventRow {
    fn from(e: LedgerEvent) -> Self {
        let source = match e.source_id {
            Some(id) => format!("{}:{}", e.source_type, id),
            None => e.source_type.to_string(),
        };
        Self {
            id: e.id.get(),
            amount: e.amount,
            source,
            quantity: e.quantity,
            description: e.description,
            at: timestamp(e.created_at),
        }
    }
}

/// Table row for task completion display
#[derive(Debug, Serialize, Tabled)]
struct CompletionRow {
    event: i64,
    task: String,
    amount: i64,
    quantity: i64,
    at: String,
}

impl From<TaskCompletionRecord> for CompletionRow {
    fn from(r: TaskCompletionRecord) -> Self {
        Self {
            event: r.event.id.get(),
            task: r.title,
            amount: r.event.amount,
            quantity: r.event.quantity,
            at: timestamp(r.event.created_at),
        }
    }
}

/// Execute a ledger command
pub async fn execute(command: LedgerCommands, session: &Session) -> CliResult<()> {
    let engine = &session.engine;
    let actor = session.actor()?;
    match command {
        LedgerCommands::Balance { group_id } => {
            let balance = engine.balance_of(actor, GroupId(group_id)).await?;
            match session.format {
                output::OutputFormat::Table => println!("Balance: {balance}"),
                output::OutputFormat::Json => {
                    output::print_single(&serde_json::json!({ "balance": balance }))?
                }
            }
            Ok(())
        }

        LedgerCommands::History { group_id } => {
            let events = engine.history_of(actor, GroupId(group_id)).await?;
            let rows = events.into_iter().map(EventRow::from).collect();
            output::print_output::<EventRow>(rows, session.format)
        }

        LedgerCommands::Completions { group_id } => {
            let records = engine
                .task_completion_history(actor, GroupId(group_id))
                .await?;
            let rows = records.into_iter().map(CompletionRow::from).collect();
            output::print_output::<CompletionRow>(rows, session.format)
        }

        LedgerCommands::Undo { event_id } => {
            let reversal = output::report(engine.undo(actor, EventId(event_id)).await?);
            print_success(&format!(
                "Reversed event {} ({}) as event {}",
                event_id,
                colorize_amount(reversal.amount),
                reversal.id
            ));
            Ok(())
        }

        LedgerCommands::Adjust {
            group_id,
            amount,
            description,
        } => {
            let event = engine
                .adjust(actor, GroupId(group_id), amount, &description)
                .await?;
            print_success(&format!(
                "Adjusted balance ({}) event {}",
                colorize_amount(event.amount),
                event.id
            ));
            Ok(())
        }
    }
}
