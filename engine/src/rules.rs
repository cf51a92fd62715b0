//! Table configuration and house rules.

use std::time::Duration;

use crate::error::EngineError;

/// Hard cap on seats per table.
pub const MAX_SEATS_CAP: u8 = 7;
/// Absolute ceiling on any wager, keeps credit math i64-safe.
pub const MAX_BET_CEILING: u64 = 1_000_000;

/// House rules and phase timing for one table. Everything here is a
/// policy knob, not core blackjack; defaults match the documented
/// choices (dealer stands on all 17s, naturals return 5/2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HouseRules {
    /// Shoe size in decks.
    pub decks: u8,
    /// Dealer draws to soft 17 when true. Default false: stand on all 17s.
    pub dealer_hits_soft_17: bool,
    /// Natural blackjack total return as a ratio of the bet
    /// (numerator / denominator). Default 5/2: 3:2 win plus stake.
    pub blackjack_return_num: u64,
    pub blackjack_return_den: u64,
    /// Betting window length.
    pub betting_window: Duration,
    /// Per-turn deadline during PLAYING.
    pub turn_window: Duration,
    /// How long PAYOUT is displayed before the next BETTING opens.
    pub payout_window: Duration,
    /// Tables with no occupant for this long are closed by the registry.
    pub idle_timeout: Duration,
}

impl Default for HouseRules {
    fn default() -> Self {
        Self {
            decks: 6,
            dealer_hits_soft_17: false,
            blackjack_return_num: 5,
            blackjack_return_den: 2,
            betting_window: Duration::from_secs(15),
            turn_window: Duration::from_secs(20),
            payout_window: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl HouseRules {
    /// Validate the knobs that would otherwise corrupt a table at runtime.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.decks == 0 {
            return Err(EngineError::Fatal("rules: zero decks".into()));
        }
        if self.blackjack_return_den == 0 {
            return Err(EngineError::Fatal(
                "rules: zero blackjack return denominator".into(),
            ));
        }
        if self.betting_window.is_zero()
            || self.turn_window.is_zero()
            || self.payout_window.is_zero()
        {
            return Err(EngineError::Fatal("rules: zero phase window".into()));
        }
        Ok(())
    }

    /// Total return for a natural at `bet`, floored.
    pub fn blackjack_return(&self, bet: u64) -> u64 {
        bet.saturating_mul(self.blackjack_return_num) / self.blackjack_return_den
    }
}

/// Per-table creation parameters validated by the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableConfig {
    pub name: Option<String>,
    pub max_seats: u8,
    pub min_bet: u64,
    pub max_bet: u64,
    pub access_code: Option<String>,
    pub rules: HouseRules,
}

impl TableConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_seats == 0 || self.max_seats > MAX_SEATS_CAP {
            return Err(EngineError::validation(format!(
                "maxSeats doit être entre 1 et {MAX_SEATS_CAP}"
            )));
        }
        if self.min_bet == 0 || self.max_bet < self.min_bet {
            return Err(EngineError::validation(
                "mises invalides: minBet doit être > 0 et maxBet >= minBet",
            ));
        }
        if self.max_bet > MAX_BET_CEILING {
            return Err(EngineError::validation(format!(
                "maxBet dépasse le plafond de {MAX_BET_CEILING}"
            )));
        }
        if let Some(code) = &self.access_code {
            if code.is_empty() || code.len() > 32 {
                return Err(EngineError::validation("code d'accès invalide"));
            }
        }
        self.rules.validate()
    }

    pub fn is_private(&self) -> bool {
        self.access_code.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TableConfig {
        TableConfig {
            name: None,
            max_seats: 5,
            min_bet: 10,
            max_bet: 500,
            access_code: None,
            rules: HouseRules::default(),
        }
    }

    #[test]
    fn test_default_rules_validate() {
        assert!(HouseRules::default().validate().is_ok());
    }

    #[test]
    fn test_blackjack_return_is_five_halves_floored() {
        let rules = HouseRules::default();
        assert_eq!(rules.blackjack_return(100), 250);
        assert_eq!(rules.blackjack_return(101), 252);
    }

    #[test]
    fn test_config_rejects_inverted_bets() {
        let mut cfg = config();
        cfg.min_bet = 500;
        cfg.max_bet = 10;
        assert!(matches!(cfg.validate(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_config_rejects_seat_overflow() {
        let mut cfg = config();
        cfg.max_seats = MAX_SEATS_CAP + 1;
        assert!(matches!(cfg.validate(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_config_rejects_bet_over_ceiling() {
        let mut cfg = config();
        cfg.max_bet = MAX_BET_CEILING + 1;
        assert!(matches!(cfg.validate(), Err(EngineError::Validation(_))));
    }
}
