//! Purchase fulfilment commands

use super::{optional_timestamp, timestamp, Session};
use crate::error::CliResult;
use crate::output::{self, print_success};
use clap::Subcommand;
use quest_types::{GroupId, PurchaseHistoryRecord, PurchaseId, PurchaseRecord};
use serde::Serialize;
use tabled::Tabled;

/// Purchase subcommands
#[derive(Subcommand)]
pub enum PurchaseCommands {
    /// Mark a purchase as handed over
    Fulfil {
        /// Purchase ID
        purchase_id: i64,

        /// Fulfilment notes
        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// List your purchases in a group
    List {
        /// Group ID
        group_id: i64,

        /// Every member's purchases, not just yours
        #[arg(short, long)]
        all: bool,
    },

    /// Show one purchase
    Show {
        /// Purchase ID
        purchase_id: i64,
    },
}

/// Table row for purchase display
#[derive(Debug, Serialize, Tabled)]
struct PurchaseRow {
    id: i64,
    user: i64,
    item: String,
    status: String,
    bought: String,
    fulfilled: String,
}

fn status(purchase: &PurchaseRecord) -> &'static str {
    match (purchase.is_cancelled(), purchase.fulfilled) {
        (true, _) => "cancelled",
        (false, true) => "fulfilled",
        (false, false) => "pending",
    }
}

impl From<PurchaseHistoryRecord> for PurchaseRow {
    fn from(r: PurchaseHistoryRecord) -> Self {
        let mut row = PurchaseRow::from(r.purchase);
        row.item = r.title;
        row
    }
}

impl From<PurchaseRecord> for PurchaseRow {
    fn from(p: PurchaseRecord) -> Self {
        Self {
            id: p.id.get(),
            user: p.actor.get(),
            item: p.shop_item_id.to_string(),
            status: status(&p).to_string(),
            bought: timestamp(p.created_at),
            fulfilled: optional_timestamp(p.fulfilled_at),
        }
    }
}

/// Execute a purchase command
pub async fn execute(command: PurchaseCommands, session: &Session) -> CliResult<()> {
    let engine = &session.engine;
    match command {
        PurchaseCommands::Fulfil { purchase_id, notes } => {
            let record = engine
                .mark_fulfilled(PurchaseId(purchase_id), session.actor()?, &notes)
                .await?;
            print_success(&format!("Purchase {} fulfilled", record.id));
            Ok(())
        }

        PurchaseCommands::List { group_id, all } => {
            let group_id = GroupId(group_id);
            let rows: Vec<PurchaseRow> = if all {
                engine
                    .group_purchases(group_id)
                    .await?
                    .into_iter()
                    .map(PurchaseRow::from)
                    .collect()
            } else {
                engine
                    .purchase_history(session.actor()?, group_id)
                    .await?
                    .into_iter()
                    .map(PurchaseRow::from)
                    .collect()
            };
            output::print_output(rows, session.format)
        }

        PurchaseCommands::Show { purchase_id } => {
            let record = engine.purchases().get_purchase(PurchaseId(purchase_id)).await?;
            output::print_single(&record)
        }
    }
}
