//! Group commands

use super::{timestamp, Session};
use crate::error::CliResult;
use crate::output::{self, print_info, print_success};
use clap::Subcommand;
use quest_types::{Group, GroupId};
use serde::Serialize;
use tabled::Tabled;

/// Group subcommands
#[derive(Subcommand)]
pub enum GroupCommands {
    /// Create a group and join it
    Create {
        /// Group name
        name: String,
    },

    /// Join a group with its invite code
    Join {
        /// Invite code
        invite_code: String,
    },

    /// List the groups you belong to
    List,

    /// List members of a group
    Members {
        /// Group ID
        group_id: i64,
    },
}

/// Table row for group display
#[derive(Debug, Serialize, Tabled)]
struct GroupRow {
    id: i64,
    name: String,
    invite_code: String,
    created: String,
}

impl From<Group> for GroupRow {
    fn from(g: Group) -> Self {
        Self {
            id: g.id.get(),
            name: g.name,
            invite_code: g.invite_code,
            created: timestamp(g.created_at),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct MemberRow {
    user: i64,
}

/// Execute a group command
pub async fn execute(command: GroupCommands, session: &Session) -> CliResult<()> {
    let engine = &session.engine;
    match command {
        GroupCommands::Create { name } => {
            let group = engine.create_group(&name, session.actor()?).await?;
            print_success(&format!("Created group {} ({})", group.name, group.id));
            print_info(&format!("Invite code: {}", group.invite_code));
            Ok(())
        }

        GroupCommands::Join { invite_code } => {
            let group = engine.join_group(session.actor()?, &invite_code).await?;
            print_success(&format!("Joined group {} ({})", group.name, group.id));
            Ok(())
        }

        GroupCommands::List => {
            let groups = engine.groups_of(session.actor()?).await?;
            let rows = groups.into_iter().map(GroupRow::from).collect();
            output::print_output::<GroupRow>(rows, session.format)
        }

        GroupCommands::Members { group_id } => {
            let members = engine.members_of(GroupId(group_id)).await?;
            let rows = members
                .into_iter()
                .map(|user| MemberRow { user: user.get() })
                .collect();
            output::print_output::<MemberRow>(rows, session.format)
        }
    }
}
