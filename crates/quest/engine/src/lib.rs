//! Quest Ledger engines.
//!
//! Presentation layers talk to [`QuestEngine`]. Underneath it:
//! - [`Catalog`] validates and persists tasks and shop items
//! - [`CompletionEngine`] turns task completions into credit events
//! - [`PurchaseEngine`] debits shop purchases and tracks fulfilment
//! - [`ReversalEngine`] compensates events by appending their negation
//! - [`LedgerView`] answers balance and history queries
//!
//! Secondary effects that may fail after the ledger write (one-time entry
//! removal, purchase cancellation) never fail the call. They come back as
//! [`SideEffectWarning`]s on the returned [`Outcome`].

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod catalog;
mod completion;
mod config;
mod engine;
mod error;
mod groups;
pub mod journal;
mod lanes;
mod ledger;
mod outcome;
mod purchase;
mod reversal;
#[cfg(test)]
mod test_support;

pub use catalog::Catalog;
pub use completion::CompletionEngine;
pub use config::EngineConfig;
pub use engine::QuestEngine;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use groups::GroupDirectory;
pub use lanes::{LaneGuard, WriteLanes};
pub use ledger::LedgerView;
pub use outcome::{CatalogEntryRef, Outcome, SideEffectWarning};
pub use purchase::PurchaseEngine;
pub use reversal::ReversalEngine;
