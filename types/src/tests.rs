use std::collections::BTreeMap;

use crate::card::{Card, Rank, Suit};
use crate::events::{ActionType, ClientCommand, ServerEvent};
use crate::hand::{hand_total, is_blackjack, is_bust, is_soft, Hand};
use crate::table::{DealerView, Outcome, Payout, Phase, SeatStatus, SeatView};

fn card(rank: Rank) -> Card {
    Card::new(rank, Suit::Spades)
}

#[test]
fn test_empty_hand_totals_zero() {
    assert_eq!(hand_total(&[]), 0);
    assert!(!is_bust(&[]));
    assert!(!is_blackjack(&[]));
}

#[test]
fn test_ace_king_is_blackjack() {
    let cards = [card(Rank::Ace), card(Rank::King)];
    assert_eq!(hand_total(&cards), 21);
    assert!(is_blackjack(&cards));
    assert!(is_soft(&cards));
}

#[test]
fn test_twenty_one_in_three_cards_is_not_blackjack() {
    let cards = [card(Rank::Seven), card(Rank::Seven), card(Rank::Seven)];
    assert_eq!(hand_total(&cards), 21);
    assert!(!is_blackjack(&cards));
}

#[test]
fn test_aces_reduce_one_at_a_time() {
    // A + A = 12 (one ace soft, one hard)
    assert_eq!(hand_total(&[card(Rank::Ace), card(Rank::Ace)]), 12);
    // A + A + 9 = 21
    assert_eq!(
        hand_total(&[card(Rank::Ace), card(Rank::Ace), card(Rank::Nine)]),
        21
    );
    // A + 6 = soft 17
    let soft17 = [card(Rank::Ace), card(Rank::Six)];
    assert_eq!(hand_total(&soft17), 17);
    assert!(is_soft(&soft17));
    // A + 6 + 10 = hard 17
    let hard17 = [card(Rank::Ace), card(Rank::Six), card(Rank::Ten)];
    assert_eq!(hand_total(&hard17), 17);
    assert!(!is_soft(&hard17));
}

#[test]
fn test_bust_detection() {
    let cards = [card(Rank::Ten), card(Rank::Six), card(Rank::Eight)];
    assert_eq!(hand_total(&cards), 24);
    assert!(is_bust(&cards));

    // Ten aces still resolve to a legal total.
    let aces = vec![card(Rank::Ace); 10];
    assert_eq!(hand_total(&aces), 20);
    assert!(!is_bust(&aces));
}

#[test]
fn test_hand_push_updates_derived_fields() {
    let mut hand = Hand::empty();
    hand.bet = 100;
    hand.push(card(Rank::Ten));
    hand.push(card(Rank::Six));
    assert_eq!(hand.total, 16);
    assert!(hand.is_live());
    hand.push(card(Rank::Eight));
    assert!(hand.busted);
    assert!(!hand.is_live());
}

#[test]
fn test_card_wire_shape() {
    let value = serde_json::to_value(Card::new(Rank::Ten, Suit::Hearts)).unwrap();
    assert_eq!(value["rank"], "10");
    assert_eq!(value["suit"], "♥");
    assert_eq!(value["value"], 10);

    let ace = serde_json::to_value(Card::new(Rank::Ace, Suit::Clubs)).unwrap();
    assert_eq!(ace["rank"], "A");
    assert_eq!(ace["value"], 11);
}

#[test]
fn test_event_envelope_shape() {
    let event = ServerEvent::PlayerTurn {
        seat: 2,
        deadline: 1_700_000_000_000,
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "PLAYER_TURN");
    assert_eq!(value["payload"]["seat"], 2);
    assert_eq!(value["payload"]["deadline"], 1_700_000_000_000u64);
}

#[test]
fn test_hand_start_carries_players_map_and_up_card() {
    let mut players = BTreeMap::new();
    let mut hand = Hand::empty();
    hand.bet = 50;
    hand.push(card(Rank::Ace));
    hand.push(card(Rank::King));
    players.insert(
        0,
        SeatView {
            index: 0,
            user_id: Some(7),
            email: Some("a@b.c".into()),
            status: SeatStatus::Occupied,
            hand,
        },
    );
    let event = ServerEvent::HandStart {
        players,
        dealer_up: Card::new(Rank::Nine, Suit::Diamonds),
        deadline: 42,
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "HAND_START");
    // Seats keyed by stringified index, the shape the client walks.
    assert_eq!(value["payload"]["players"]["0"]["index"], 0);
    assert_eq!(value["payload"]["dealerUp"]["rank"], "9");
}

#[test]
fn test_client_command_parsing() {
    let raw = r#"{"type":"sit","payload":{"tableId":"t-1","seatIndex":3,"code":"7421"}}"#;
    let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
    assert_eq!(
        cmd,
        ClientCommand::Sit {
            table_id: "t-1".into(),
            seat_index: 3,
            code: Some("7421".into()),
        }
    );

    let raw = r#"{"type":"action","payload":{"tableId":"t-1","seatIndex":0,"type":"DOUBLE"}}"#;
    let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
    assert_eq!(
        cmd,
        ClientCommand::Action {
            table_id: "t-1".into(),
            seat_index: 0,
            action: ActionType::Double,
        }
    );
}

#[test]
fn test_payout_round_trip() {
    let payout = Payout {
        seat: 1,
        bet: 100,
        credit: 250,
        total: 21,
        outcome: Outcome::Blackjack,
    };
    let value = serde_json::to_value(&payout).unwrap();
    assert_eq!(value["outcome"], "BLACKJACK");
    let back: Payout = serde_json::from_value(value).unwrap();
    assert_eq!(back, payout);
}

#[test]
fn test_phase_serializes_screaming_snake() {
    assert_eq!(
        serde_json::to_value(Phase::DealerTurn).unwrap(),
        serde_json::json!("DEALER_TURN")
    );
    assert_eq!(Phase::DealerTurn.as_str(), "DEALER_TURN");
}

#[test]
fn test_dealer_view_recomputes_total() {
    let view = DealerView::from_cards(vec![card(Rank::Ten), card(Rank::Seven)]);
    assert_eq!(view.total, 17);
}
