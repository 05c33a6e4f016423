//! Quest Ledger storage abstractions.
//!
//! This crate defines the storage contract for the ledger core:
//! - an append-only event log whose fold is the balance
//! - purchase records tracking fulfilment of shop debits
//! - the task / shop item catalog
//! - group membership, the only identity question the ledger asks
//!
//! Design stance:
//! - Events are never updated or deleted by any adapter.
//! - `append_purchase` is the one compound write and must be atomic.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod config;
mod error;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod traits;

use std::sync::Arc;

pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryQuestStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteQuestStorage;
pub use traits::{
    CatalogStore, GroupStore, LedgerStore, MembershipOracle, PurchaseStore, QuestStorage,
};

/// Open the backend selected by `config`.
pub async fn connect(config: &StorageConfig) -> StorageResult<Arc<dyn QuestStorage>> {
    match config {
        StorageConfig::Memory => {
            tracing::info!("using in-memory storage");
            Ok(Arc::new(InMemoryQuestStorage::new()))
        }
        #[cfg(feature = "sqlite")]
        StorageConfig::Sqlite {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            tracing::info!(url = %url, "using sqlite storage");
            let storage =
                SqliteQuestStorage::connect_with_options(url, *max_connections, *connect_timeout_secs)
                    .await?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::InvalidInput(
            "sqlite support not compiled in (enable the `sqlite` feature)".to_string(),
        )),
    }
}
