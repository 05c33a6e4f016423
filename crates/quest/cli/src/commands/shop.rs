//! Shop catalog and purchase commands

use super::Session;
use crate::error::CliResult;
use crate::output::{self, colorize_amount, print_success};
use clap::{Args, Subcommand};
use quest_types::{GroupId, ShopItem, ShopItemDraft, ShopItemId};
use serde::Serialize;
use tabled::Tabled;

/// Shop subcommands
#[derive(Subcommand)]
pub enum ShopCommands {
    /// Add an item to a group's shop
    Create {
        /// Group ID
        group_id: i64,

        #[command(flatten)]
        draft: ShopItemArgs,
    },

    /// List a group's shop items
    List {
        /// Group ID
        group_id: i64,
    },

    /// Show one shop item
    Show {
        /// Shop item ID
        item_id: i64,
    },

    /// Replace a shop item's attributes
    Update {
        /// Shop item ID
        item_id: i64,

        #[command(flatten)]
        draft: ShopItemArgs,
    },

    /// Remove a shop item (restorable for a while)
    Delete {
        /// Shop item ID
        item_id: i64,
    },

    /// Bring back a recently deleted shop item
    Restore {
        /// Shop item ID
        item_id: i64,
    },

    /// Spend points on an item
    Buy {
        /// Shop item ID
        item_id: i64,
    },
}

/// Shop item attributes shared by create and update
#[derive(Args)]
pub struct ShopItemArgs {
    /// Title
    title: String,

    /// Price in points
    #[arg(short, long)]
    cost: i64,

    /// Free-form description
    #[arg(short, long, default_value = "")]
    description: String,

    /// Remove the item after its first sale
    #[arg(long)]
    one_time: bool,
}

impl From<ShopItemArgs> for ShopItemDraft {
    fn from(args: ShopItemArgs) -> Self {
        Self {
            title: args.title,
            description: args.description,
            cost: args.cost,
            is_one_time: args.one_time,
        }
    }
}

/// Table row for shop item display
#[derive(Debug, Serialize, Tabled)]
struct ShopItemRow {
    id: i64,
    title: String,
    cost: i64,
    one_time: bool,
    description: String,
}

impl From<ShopItem> for ShopItemRow {
    fn from(i: ShopItem) -> Self {
        Self {
            id: i.id.get(),
            title: i.title,
            cost: i.cost,
            one_time: i.is_one_time,
            description: i.description,
        }
    }
}

/// Execute a shop command
pub async fn execute(command: ShopCommands, session: &Session) -> CliResult<()> {
    let catalog = session.engine.catalog();
    match command {
        ShopCommands::Create { group_id, draft } => {
            let item = catalog
                .create_shop_item(GroupId(group_id), draft.into())
                .await?;
            print_success(&format!("Created shop item {} ({})", item.title, item.id));
            Ok(())
        }

        ShopCommands::List { group_id } => {
            let items = catalog.list_shop_items(GroupId(group_id)).await?;
            let rows = items.into_iter().map(ShopItemRow::from).collect();
            output::print_output::<ShopItemRow>(rows, session.format)
        }

        ShopCommands::Show { item_id } => {
            let item = catalog.get_shop_item(ShopItemId(item_id)).await?;
            output::print_single(&item)
        }

        ShopCommands::Update { item_id, draft } => {
            let item = catalog
                .update_shop_item(ShopItemId(item_id), draft.into())
                .await?;
            print_success(&format!("Updated shop item {} ({})", item.title, item.id));
            Ok(())
        }

        ShopCommands::Delete { item_id } => {
            let item = catalog.delete_shop_item(ShopItemId(item_id)).await?;
            print_success(&format!("Deleted shop item {} ({})", item.title, item.id));
            Ok(())
        }

        ShopCommands::Restore { item_id } => {
            let item = catalog.restore_shop_item(ShopItemId(item_id)).await?;
            print_success(&format!("Restored shop item {} ({})", item.title, item.id));
            Ok(())
        }

        ShopCommands::Buy { item_id } => {
            let outcome = session
                .engine
                .buy(session.actor()?, ShopItemId(item_id))
                .await?;
            let receipt = output::report(outcome);
            print_success(&format!(
                "Bought {} ({}) purchase {}",
                receipt.event.description,
                colorize_amount(receipt.event.amount),
                receipt.purchase.id
            ));
            Ok(())
        }
    }
}
