//! Round settlement. Pure function of (seat hand, dealer hand, bet):
//! replaying it on the same inputs always yields the same result.

use sabot_types::{hand::hand_total, Card, Hand, Outcome};

use crate::rules::HouseRules;

/// Compute one seat's credit and outcome tag against the dealer.
///
/// `natural` is the blackjack flag recorded at hand start; a 21 reached
/// by hitting never sets it. The bet was debited at placement time, so
/// `credit` is the full amount returned to the wallet (stake included
/// on wins and pushes).
pub fn settle_seat(
    hand: &Hand,
    natural: bool,
    dealer_cards: &[Card],
    rules: &HouseRules,
) -> (Outcome, u64) {
    let bet = hand.bet;
    if hand.busted {
        return (Outcome::Lose, 0);
    }
    if hand.surrendered {
        // Half the stake back, floored, regardless of the dealer.
        return (Outcome::Lose, bet / 2);
    }

    let dealer_total = hand_total(dealer_cards);
    let dealer_natural = dealer_cards.len() == 2 && dealer_total == 21;

    if natural && !dealer_natural {
        return (Outcome::Blackjack, rules.blackjack_return(bet));
    }
    if natural && dealer_natural {
        return (Outcome::Push, bet);
    }
    if dealer_total > 21 {
        return (Outcome::Win, bet.saturating_mul(2));
    }

    let seat_total = hand.total();
    if seat_total > dealer_total {
        (Outcome::Win, bet.saturating_mul(2))
    } else if seat_total == dealer_total {
        (Outcome::Push, bet)
    } else {
        (Outcome::Lose, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sabot_types::{Rank, Suit};

    fn card(rank: Rank) -> Card {
        Card::new(rank, Suit::Spades)
    }

    fn hand(bet: u64, ranks: &[Rank]) -> Hand {
        let mut hand = Hand::empty();
        hand.bet = bet;
        for &rank in ranks {
            hand.push(card(rank));
        }
        hand
    }

    fn rules() -> HouseRules {
        HouseRules::default()
    }

    #[test]
    fn test_nineteen_beats_dealer_seventeen() {
        // Seat 19 vs dealer hard 17 (stands under the house rule).
        let seat = hand(100, &[Rank::Ten, Rank::Nine]);
        let dealer = [card(Rank::Ten), card(Rank::Seven)];
        assert_eq!(
            settle_seat(&seat, false, &dealer, &rules()),
            (Outcome::Win, 200)
        );
    }

    #[test]
    fn test_natural_pays_five_halves() {
        let seat = hand(100, &[Rank::Ace, Rank::King]);
        let dealer = [card(Rank::Nine), card(Rank::Seven)];
        assert_eq!(
            settle_seat(&seat, true, &dealer, &rules()),
            (Outcome::Blackjack, 250)
        );
    }

    #[test]
    fn test_bust_loses_everything() {
        let seat = hand(100, &[Rank::Ten, Rank::Six, Rank::Eight]);
        assert!(seat.busted);
        let dealer = [card(Rank::Ten), card(Rank::Seven)];
        assert_eq!(
            settle_seat(&seat, false, &dealer, &rules()),
            (Outcome::Lose, 0)
        );
    }

    #[test]
    fn test_both_naturals_push() {
        let seat = hand(100, &[Rank::Ace, Rank::Queen]);
        let dealer = [card(Rank::Ace), card(Rank::King)];
        assert_eq!(
            settle_seat(&seat, true, &dealer, &rules()),
            (Outcome::Push, 100)
        );
    }

    #[test]
    fn test_dealer_bust_pays_even_money() {
        let seat = hand(50, &[Rank::Ten, Rank::Two]);
        let dealer = [card(Rank::Ten), card(Rank::Six), card(Rank::Nine)];
        assert_eq!(
            settle_seat(&seat, false, &dealer, &rules()),
            (Outcome::Win, 100)
        );
    }

    #[test]
    fn test_equal_totals_push() {
        let seat = hand(100, &[Rank::Ten, Rank::Eight]);
        let dealer = [card(Rank::Ten), card(Rank::Eight)];
        assert_eq!(
            settle_seat(&seat, false, &dealer, &rules()),
            (Outcome::Push, 100)
        );
    }

    #[test]
    fn test_surrender_returns_floored_half() {
        let mut seat = hand(101, &[Rank::Ten, Rank::Six]);
        seat.surrendered = true;
        let dealer = [card(Rank::Ten), card(Rank::Seven)];
        assert_eq!(
            settle_seat(&seat, false, &dealer, &rules()),
            (Outcome::Lose, 50)
        );
    }

    #[test]
    fn test_settlement_is_deterministic() {
        let seat = hand(100, &[Rank::Ten, Rank::Nine]);
        let dealer = [card(Rank::Ten), card(Rank::Seven)];
        let first = settle_seat(&seat, false, &dealer, &rules());
        for _ in 0..10 {
            assert_eq!(settle_seat(&seat, false, &dealer, &rules()), first);
        }
    }
}
