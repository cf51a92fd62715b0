//! Sabot blackjack table engine.
//!
//! Each table is a single-writer actor: one task owns all mutable state
//! and consumes commands (player intents and expired deadlines alike)
//! from one queue, so no two commands for the same table ever execute
//! concurrently. Observers receive state-diff events on a per-table
//! broadcast channel; per-identity rejections travel back on the
//! command's reply channel and are never broadcast.
//!
//! External collaborators (wallet, identity) are consumed behind the
//! seams in [`wallet`] and [`sabot_types::PlayerIdentity`]; the engine
//! trusts the resolved identity and treats wallet debits as part of the
//! serialized command path.

pub mod error;
pub mod payout;
pub mod registry;
pub mod rules;
pub mod shoe;
pub mod table;
pub mod wallet;

pub use error::EngineError;
pub use payout::settle_seat;
pub use registry::{CreateTableRequest, CreatedTable, Registry};
pub use rules::{HouseRules, TableConfig};
pub use shoe::Shoe;
pub use table::{TableCommand, TableHandle};
pub use wallet::{DebitOutcome, MemoryWallet, Wallet};
