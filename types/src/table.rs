//! Table, seat and payout views — the snapshot half of the wire contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::hand::{hand_total, Hand};

/// Table lifecycle phases, in round order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Waiting,
    Betting,
    Playing,
    DealerTurn,
    Payout,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Waiting => "WAITING",
            Phase::Betting => "BETTING",
            Phase::Playing => "PLAYING",
            Phase::DealerTurn => "DEALER_TURN",
            Phase::Payout => "PAYOUT",
        }
    }
}

/// Seat occupancy status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Empty,
    Occupied,
    Disconnected,
}

/// Authenticated principal, as resolved by the identity collaborator.
/// The engine trusts this for seat ownership and creator checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerIdentity {
    pub user_id: u64,
    pub email: String,
}

/// One table slot as serialized to observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub index: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub status: SeatStatus,
    pub hand: Hand,
}

/// Dealer hand as serialized to observers. During PLAYING only the
/// up-card is present; the hole card appears at DEALER_TURN.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerView {
    pub cards: Vec<Card>,
    pub total: u8,
}

impl DealerView {
    pub fn from_cards(cards: Vec<Card>) -> Self {
        let total = hand_total(&cards);
        Self { cards, total }
    }
}

/// Round outcome tag for one settled seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Win,
    Lose,
    Push,
    Blackjack,
}

/// Settlement record for one seat in one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub seat: u8,
    pub bet: u64,
    pub credit: u64,
    pub total: u8,
    pub outcome: Outcome,
}

/// Full table snapshot. Seats serialize as a map keyed by seat index;
/// the client walks the object keys in ascending order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub max_seats: u8,
    pub seats: BTreeMap<u8, SeatView>,
    pub dealer: DealerView,
    pub phase: Phase,
    pub min_bet: u64,
    pub max_bet: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shoe_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_seat_index: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_payouts: Option<Vec<Payout>>,
}

/// Public lobby row. Never carries the access code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub max_seats: u8,
    pub occupied_seats: u8,
    pub is_private: bool,
    pub phase: Phase,
    pub min_bet: u64,
    pub max_bet: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_email: Option<String>,
}
