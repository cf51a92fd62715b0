//! The realtime wire contract: one closed union per direction.
//!
//! Both directions use a `{type, payload}` envelope so clients can
//! switch on a stable tag instead of sniffing payload shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::hand::Hand;
use crate::table::{DealerView, Payout, SeatView, TableSummary, TableView};

/// Server → client events, published per table (or per user for
/// private tables and error delivery).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// Full snapshot for (re)subscribers and after bulk changes.
    #[serde(rename = "TABLE_STATE")]
    TableState(TableView),
    /// New round dealt: per-seat cards plus the dealer's single up-card.
    /// The hole card exists server-side but is not serialized here.
    #[serde(rename = "HAND_START")]
    HandStart {
        players: BTreeMap<u8, SeatView>,
        #[serde(rename = "dealerUp")]
        dealer_up: Card,
        deadline: u64,
    },
    #[serde(rename = "PLAYER_TURN")]
    PlayerTurn { seat: u8, deadline: u64 },
    #[serde(rename = "BET_UPDATE")]
    BetUpdate { seat: u8, bet: u64 },
    /// Post-action hand state for one seat.
    #[serde(rename = "ACTION_RESULT")]
    ActionResult { seat: u8, hand: Hand },
    /// Hole card revealed; full dealer hand from here on.
    #[serde(rename = "DEALER_TURN_START")]
    DealerTurnStart { dealer: DealerView },
    #[serde(rename = "DEALER_TURN_END")]
    DealerTurnEnd { dealer: DealerView },
    #[serde(rename = "PAYOUTS")]
    Payouts { payouts: Vec<Payout> },
    /// Terminal. Subscribers should drop the table and return to lobby.
    #[serde(rename = "TABLE_CLOSED")]
    TableClosed {
        #[serde(rename = "tableId")]
        table_id: String,
    },
    /// Refreshed lobby listing, also sent as a snapshot on connect.
    #[serde(rename = "LOBBY")]
    Lobby(Vec<TableSummary>),
    /// Per-identity rejection; delivered only to the originating socket.
    #[serde(rename = "ERROR")]
    Error(ErrorBody),
}

/// Body of an `ERROR` event. The client reads `error`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Seat action verbs. SPLIT is part of the client union but the engine
/// rejects it (single-hand seats).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Hit,
    Stand,
    Double,
    Split,
    Surrender,
}

/// Client → server commands, one message type per verb.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientCommand {
    /// Subscribe to a table's event stream. Private tables require the
    /// correct access code.
    #[serde(rename = "join")]
    Join {
        #[serde(rename = "tableId")]
        table_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Occupy a seat.
    #[serde(rename = "sit")]
    Sit {
        #[serde(rename = "tableId")]
        table_id: String,
        #[serde(rename = "seatIndex")]
        seat_index: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Place a wager during BETTING.
    #[serde(rename = "bet")]
    Bet {
        #[serde(rename = "tableId")]
        table_id: String,
        amount: u64,
        #[serde(rename = "seatIndex", default, skip_serializing_if = "Option::is_none")]
        seat_index: Option<u8>,
    },
    /// Play the seat's turn during PLAYING.
    #[serde(rename = "action")]
    Action {
        #[serde(rename = "tableId")]
        table_id: String,
        #[serde(rename = "seatIndex")]
        seat_index: u8,
        #[serde(rename = "type")]
        action: ActionType,
    },
    /// Vacate a seat. The session keeps observing the table.
    #[serde(rename = "leave")]
    Leave {
        #[serde(rename = "tableId")]
        table_id: String,
        #[serde(rename = "seatIndex")]
        seat_index: u8,
    },
}

impl ClientCommand {
    /// Table the command addresses.
    pub fn table_id(&self) -> &str {
        match self {
            ClientCommand::Join { table_id, .. }
            | ClientCommand::Sit { table_id, .. }
            | ClientCommand::Bet { table_id, .. }
            | ClientCommand::Action { table_id, .. }
            | ClientCommand::Leave { table_id, .. } => table_id,
        }
    }
}
