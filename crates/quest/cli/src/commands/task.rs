//! Task catalog and completion commands

use super::{optional_timestamp, Session};
use crate::error::{CliError, CliResult};
use crate::output::{self, colorize_amount, print_success};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use quest_types::{CompletionPolicy, GroupId, PolicyKind, Task, TaskDraft, TaskId};
use serde::Serialize;
use tabled::Tabled;

/// Task subcommands
#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task to a group's catalog
    Create {
        /// Group ID
        group_id: i64,

        #[command(flatten)]
        draft: TaskArgs,
    },

    /// List a group's tasks
    List {
        /// Group ID
        group_id: i64,
    },

    /// Show one task
    Show {
        /// Task ID
        task_id: i64,
    },

    /// Replace a task's attributes
    Update {
        /// Task ID
        task_id: i64,

        #[command(flatten)]
        draft: TaskArgs,
    },

    /// Remove a task (restorable for a while)
    Delete {
        /// Task ID
        task_id: i64,
    },

    /// Bring back a recently deleted task
    Restore {
        /// Task ID
        task_id: i64,
    },

    /// Complete a task and earn its reward
    Complete {
        /// Task ID
        task_id: i64,

        /// Units done (integer tasks only)
        #[arg(short, long)]
        quantity: Option<i64>,
    },
}

/// Task attributes shared by create and update
#[derive(Args)]
pub struct TaskArgs {
    /// Title
    title: String,

    /// Reward per completion (per unit for integer tasks)
    #[arg(short, long)]
    reward: i64,

    /// Completion policy (boolean, integer)
    #[arg(short, long, default_value = "boolean")]
    kind: PolicyKind,

    /// Free-form description
    #[arg(short, long, default_value = "")]
    description: String,

    /// Suggested quantity for integer tasks
    #[arg(long)]
    default_quantity: Option<i64>,

    /// Remove the task after its first completion
    #[arg(long)]
    one_time: bool,

    /// Due date (RFC 3339)
    #[arg(long)]
    due: Option<String>,
}

impl TaskArgs {
    fn into_draft(self) -> CliResult<TaskDraft> {
        let due_at = self
            .due
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|at| at.with_timezone(&Utc))
                    .map_err(|err| CliError::InvalidInput(format!("due date {raw:?}: {err}")))
            })
            .transpose()?;

        Ok(TaskDraft {
            title: self.title,
            description: self.description,
            kind: self.kind,
            reward_value: self.reward,
            default_quantity: self.default_quantity,
            is_one_time: self.one_time,
            due_at,
        })
    }
}

/// Table row for task display
#[derive(Debug, Serialize, Tabled)]
struct TaskRow {
    id: i64,
    title: String,
    policy: String,
    reward: i64,
    one_time: bool,
    due: String,
}

impl From<Task> for TaskRow {
    fn from(t: Task) -> Self {
        let policy = match t.policy {
            CompletionPolicy::Boolean => "boolean".to_string(),
            CompletionPolicy::Integer { default_quantity } => {
                format!("integer (x{default_quantity})")
            }
        };
        Self {
            id: t.id.get(),
            title: t.title,
            policy,
            reward: t.reward_value,
            one_time: t.is_one_time,
            due: optional_timestamp(t.due_at),
        }
    }
}

/// Execute a task command
pub async fn execute(command: TaskCommands, session: &Session) -> CliResult<()> {
    let catalog = session.engine.catalog();
    match command {
        TaskCommands::Create { group_id, draft } => {
            let task = catalog
                .create_task(GroupId(group_id), draft.into_draft()?)
                .await?;
            print_success(&format!("Created task {} ({})", task.title, task.id));
            Ok(())
        }

        TaskCommands::List { group_id } => {
            let tasks = catalog.list_tasks(GroupId(group_id)).await?;
            let rows = tasks.into_iter().map(TaskRow::from).collect();
            output::print_output::<TaskRow>(rows, session.format)
        }

        TaskCommands::Show { task_id } => {
            let task = catalog.get_task(TaskId(task_id)).await?;
            output::print_single(&task)
        }

        TaskCommands::Update { task_id, draft } => {
            let task = catalog
                .update_task(TaskId(task_id), draft.into_draft()?)
                .await?;
            print_success(&format!("Updated task {} ({})", task.title, task.id));
            Ok(())
        }

        TaskCommands::Delete { task_id } => {
            let task = catalog.delete_task(TaskId(task_id)).await?;
            print_success(&format!("Deleted task {} ({})", task.title, task.id));
            Ok(())
        }

        TaskCommands::Restore { task_id } => {
            let task = catalog.restore_task(TaskId(task_id)).await?;
            print_success(&format!("Restored task {} ({})", task.title, task.id));
            Ok(())
        }

        TaskCommands::Complete { task_id, quantity } => {
            let outcome = session
                .engine
                .complete(session.actor()?, TaskId(task_id), quantity)
                .await?;
            let event = output::report(outcome);
            print_success(&format!(
                "Completed {} ({}) event {}",
                event.description,
                colorize_amount(event.amount),
                event.id
            ));
            Ok(())
        }
    }
}
