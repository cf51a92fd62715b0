//! Shared types for the sabot blackjack table engine.
//!
//! Everything in this crate is either a pure value object (cards, hands)
//! or part of the JSON wire contract consumed by the table client:
//! snapshot views, lobby summaries, the server event union and the
//! client command union. No I/O, no clocks, no randomness.

pub mod card;
pub mod events;
pub mod hand;
pub mod table;

#[cfg(test)]
mod tests;

pub use card::{Card, Rank, Suit};
pub use events::{ActionType, ClientCommand, ErrorBody, ServerEvent};
pub use hand::Hand;
pub use table::{
    DealerView, Outcome, Payout, Phase, PlayerIdentity, SeatStatus, SeatView, TableSummary,
    TableView,
};
