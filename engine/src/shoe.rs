//! Multi-deck dealing shoe.
//!
//! The shoe holds `decks` x 52 cards shuffled with ChaCha20 seeded from
//! OS entropy. Reshuffles normally happen at the safe boundary before a
//! deal, whenever the remaining stack has fallen under the threshold; a
//! draw from an empty stack rebuilds and reshuffles before satisfying
//! the draw so a hand can always complete.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use sabot_types::{Card, Rank, Suit};

use crate::error::EngineError;

/// Cards in one standard deck.
const CARDS_PER_DECK: usize = 52;

pub struct Shoe {
    decks: u8,
    threshold: usize,
    cards: Vec<Card>,
    rng: ChaCha20Rng,
    reshuffles: u64,
}

impl Shoe {
    /// Build a shoe of `decks` decks with the default threshold of a
    /// quarter shoe. Zero decks is a configuration error, not a runtime
    /// condition.
    pub fn new(decks: u8) -> Result<Self, EngineError> {
        let total = CARDS_PER_DECK * decks as usize;
        Self::with_threshold(decks, total / 4)
    }

    pub fn with_threshold(decks: u8, threshold: usize) -> Result<Self, EngineError> {
        if decks == 0 {
            return Err(EngineError::Fatal("shoe configured with zero decks".into()));
        }
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let mut shoe = Self {
            decks,
            threshold,
            cards: Vec::with_capacity(CARDS_PER_DECK * decks as usize),
            rng: ChaCha20Rng::from_seed(seed),
            reshuffles: 0,
        };
        shoe.reshuffle();
        Ok(shoe)
    }

    /// Shoe with a predetermined draw order, refilled randomly once the
    /// scripted cards run out.
    #[cfg(test)]
    pub(crate) fn rigged(draw_order: Vec<Card>) -> Self {
        let mut cards = draw_order;
        cards.reverse();
        Self {
            decks: 1,
            threshold: 0,
            cards,
            rng: ChaCha20Rng::from_seed([7u8; 32]),
            reshuffles: 0,
        }
    }

    /// Cards remaining before the next reshuffle point.
    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    /// Times the shoe has been rebuilt, including the initial fill.
    pub fn reshuffles(&self) -> u64 {
        self.reshuffles
    }

    /// True once the stack has fallen under the reshuffle threshold.
    pub fn needs_reshuffle(&self) -> bool {
        self.cards.len() <= self.threshold
    }

    /// Reshuffle at a safe boundary (called before dealing a new hand).
    pub fn reshuffle_if_needed(&mut self) {
        if self.needs_reshuffle() {
            self.reshuffle();
        }
    }

    /// Remove and return the next card. An exhausted stack mid-hand is
    /// refilled first; cards already dealt are unaffected.
    pub fn draw(&mut self) -> Card {
        if self.cards.is_empty() {
            self.reshuffle();
        }
        // Non-empty by construction: decks >= 1.
        match self.cards.pop() {
            Some(card) => card,
            None => unreachable!("freshly reshuffled shoe cannot be empty"),
        }
    }

    fn reshuffle(&mut self) {
        self.cards.clear();
        for _ in 0..self.decks {
            for suit in Suit::ALL {
                for rank in Rank::ALL {
                    self.cards.push(Card::new(rank, suit));
                }
            }
        }
        self.cards.shuffle(&mut self.rng);
        self.reshuffles += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_zero_decks_is_a_config_error() {
        assert!(matches!(Shoe::new(0), Err(EngineError::Fatal(_))));
    }

    #[test]
    fn test_single_deck_draws_are_exhaustive_without_repetition() {
        let mut shoe = Shoe::with_threshold(1, 0).unwrap();
        let mut seen = HashMap::new();
        for _ in 0..52 {
            *seen.entry(shoe.draw()).or_insert(0u32) += 1;
        }
        assert_eq!(seen.len(), 52);
        assert!(seen.values().all(|&count| count == 1));
        assert_eq!(shoe.reshuffles(), 1);

        // The 53rd draw must be preceded by a reshuffle.
        let _ = shoe.draw();
        assert_eq!(shoe.reshuffles(), 2);
    }

    #[test]
    fn test_multi_deck_card_counts() {
        let mut shoe = Shoe::with_threshold(6, 0).unwrap();
        let mut seen = HashMap::new();
        for _ in 0..6 * 52 {
            *seen.entry(shoe.draw()).or_insert(0u32) += 1;
        }
        assert_eq!(seen.len(), 52);
        assert!(seen.values().all(|&count| count == 6));
    }

    #[test]
    fn test_reshuffle_if_needed_respects_threshold() {
        let mut shoe = Shoe::with_threshold(1, 13).unwrap();
        for _ in 0..38 {
            let _ = shoe.draw();
        }
        assert!(!shoe.needs_reshuffle());
        shoe.reshuffle_if_needed();
        assert_eq!(shoe.reshuffles(), 1);

        let _ = shoe.draw();
        assert!(shoe.needs_reshuffle());
        shoe.reshuffle_if_needed();
        assert_eq!(shoe.reshuffles(), 2);
        assert_eq!(shoe.remaining(), 52);
    }
}
