//! Hand container and the soft/hard total evaluator.

use serde::{Deserialize, Serialize};

use crate::card::Card;

/// Calculate the best total of a blackjack hand.
///
/// Aces count as 11 until the sum would bust, then reduce one at a time
/// to 1. An empty hand totals 0.
pub fn hand_total(cards: &[Card]) -> u8 {
    let mut total: u16 = 0;
    let mut aces: u8 = 0;

    for card in cards {
        if card.rank.is_ace() {
            aces += 1;
        }
        total += u16::from(card.value());
    }

    while total > 21 && aces > 0 {
        total -= 10;
        aces -= 1;
    }

    total.min(255) as u8
}

/// Returns true if the hand still counts an ace as 11.
pub fn is_soft(cards: &[Card]) -> bool {
    let mut total: u16 = 0;
    let mut aces: u8 = 0;
    for card in cards {
        if card.rank.is_ace() {
            aces += 1;
        }
        total += u16::from(card.value());
    }
    while total > 21 && aces > 0 {
        total -= 10;
        aces -= 1;
    }
    aces > 0 && total <= 21
}

/// Best total above 21.
pub fn is_bust(cards: &[Card]) -> bool {
    hand_total(cards) > 21
}

/// Exactly two cards totalling 21. Only meaningful on the initial deal;
/// callers are responsible for not asking after a hit.
pub fn is_blackjack(cards: &[Card]) -> bool {
    cards.len() == 2 && hand_total(cards) == 21
}

/// A participant's dealt cards plus round-scoped status flags.
///
/// `total` is always recomputed from the cards when serializing; it is
/// never stored independently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hand {
    pub cards: Vec<Card>,
    pub standing: bool,
    pub busted: bool,
    pub surrendered: bool,
    pub bet: u64,
    #[serde(default)]
    pub total: u8,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_turn: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub can_double: bool,
}

impl Hand {
    /// Fresh empty hand with no wager.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a card and refresh the derived fields.
    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
        self.total = hand_total(&self.cards);
        self.busted = self.total > 21;
    }

    pub fn total(&self) -> u8 {
        hand_total(&self.cards)
    }

    pub fn is_bust(&self) -> bool {
        is_bust(&self.cards)
    }

    /// Natural: two-card 21 as dealt. The engine only calls this at
    /// hand start, before any hit can occur.
    pub fn is_blackjack(&self) -> bool {
        is_blackjack(&self.cards)
    }

    /// True while the hand may still act this round.
    pub fn is_live(&self) -> bool {
        self.bet > 0 && !self.standing && !self.busted && !self.surrendered
    }

    /// Reset to an empty, unwagered hand for the next round.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
