//! The per-table actor.
//!
//! One task owns the whole table state and consumes [`TableCommand`]s
//! from a single queue; deadline timers are delivered as commands
//! carrying the epoch they were armed in, so a timer that fires after
//! the phase already moved on is ignored. State diffs go out on a
//! broadcast channel, rejections travel back on the command's reply
//! channel only.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, info};

use sabot_types::hand::is_soft;
use sabot_types::{
    ActionType, Card, DealerView, Payout, Phase, PlayerIdentity, SeatStatus, SeatView, ServerEvent,
    TableView,
};

use crate::error::EngineError;
use crate::payout::settle_seat;
use crate::rules::TableConfig;
use crate::shoe::Shoe;
use crate::wallet::{DebitOutcome, Wallet};

const COMMAND_QUEUE_DEPTH: usize = 64;
const EVENT_FANOUT_DEPTH: usize = 256;

/// Commands accepted by a table actor. Player intents carry the
/// resolved identity; the actor never authenticates, it only checks
/// seat ownership against it.
pub enum TableCommand {
    Sit {
        identity: PlayerIdentity,
        seat_index: u8,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Bet {
        identity: PlayerIdentity,
        seat_index: Option<u8>,
        amount: u64,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Action {
        identity: PlayerIdentity,
        seat_index: u8,
        action: ActionType,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Leave {
        identity: PlayerIdentity,
        seat_index: u8,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Socket dropped without a leave. Mid-hand this forfeits the bet.
    Disconnect { identity: PlayerIdentity },
    Snapshot {
        reply: oneshot::Sender<TableView>,
    },
    /// `requester` is `None` for registry-initiated closes (idle sweep,
    /// shutdown); otherwise only the creator may close.
    Close {
        requester: Option<PlayerIdentity>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    IdleCheck {
        reply: oneshot::Sender<bool>,
    },
    DeadlineExpired { epoch: u64 },
}

/// Cloneable handle to a running table actor.
#[derive(Clone, Debug)]
pub struct TableHandle {
    id: String,
    commands: mpsc::Sender<TableCommand>,
    events: broadcast::Sender<ServerEvent>,
}

impl TableHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// New receiver on the table's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub async fn sit(&self, identity: PlayerIdentity, seat_index: u8) -> Result<(), EngineError> {
        self.request(|reply| TableCommand::Sit {
            identity,
            seat_index,
            reply,
        })
        .await?
    }

    pub async fn bet(
        &self,
        identity: PlayerIdentity,
        seat_index: Option<u8>,
        amount: u64,
    ) -> Result<(), EngineError> {
        self.request(|reply| TableCommand::Bet {
            identity,
            seat_index,
            amount,
            reply,
        })
        .await?
    }

    pub async fn action(
        &self,
        identity: PlayerIdentity,
        seat_index: u8,
        action: ActionType,
    ) -> Result<(), EngineError> {
        self.request(|reply| TableCommand::Action {
            identity,
            seat_index,
            action,
            reply,
        })
        .await?
    }

    pub async fn leave(&self, identity: PlayerIdentity, seat_index: u8) -> Result<(), EngineError> {
        self.request(|reply| TableCommand::Leave {
            identity,
            seat_index,
            reply,
        })
        .await?
    }

    /// Fire-and-forget; a disconnect against a closed table is a no-op.
    pub async fn disconnect(&self, identity: PlayerIdentity) {
        let _ = self.commands.send(TableCommand::Disconnect { identity }).await;
    }

    pub async fn snapshot(&self) -> Result<TableView, EngineError> {
        self.request(|reply| TableCommand::Snapshot { reply }).await
    }

    pub async fn close(&self, requester: Option<PlayerIdentity>) -> Result<(), EngineError> {
        self.request(|reply| TableCommand::Close { requester, reply })
            .await?
    }

    pub async fn is_idle(&self) -> Result<bool, EngineError> {
        self.request(|reply| TableCommand::IdleCheck { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> TableCommand,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| EngineError::table_unavailable())?;
        rx.await.map_err(|_| EngineError::table_unavailable())
    }
}

/// Spawn a table actor and return its handle. `lobby` is pinged on every
/// occupancy or phase change so the registry can refresh its listing.
pub fn spawn<W: Wallet>(
    id: String,
    config: TableConfig,
    creator: PlayerIdentity,
    wallet: Arc<W>,
    lobby: Arc<Notify>,
) -> Result<TableHandle, EngineError> {
    config.validate()?;
    let shoe = Shoe::new(config.rules.decks)?;
    Ok(spawn_inner(id, config, creator, wallet, lobby, shoe))
}

#[cfg(test)]
pub(crate) fn spawn_with_shoe<W: Wallet>(
    id: String,
    config: TableConfig,
    creator: PlayerIdentity,
    wallet: Arc<W>,
    lobby: Arc<Notify>,
    shoe: Shoe,
) -> Result<TableHandle, EngineError> {
    config.validate()?;
    Ok(spawn_inner(id, config, creator, wallet, lobby, shoe))
}

fn spawn_inner<W: Wallet>(
    id: String,
    config: TableConfig,
    creator: PlayerIdentity,
    wallet: Arc<W>,
    lobby: Arc<Notify>,
    shoe: Shoe,
) -> TableHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (event_tx, _) = broadcast::channel(EVENT_FANOUT_DEPTH);
    let seat_count = config.max_seats as usize;
    let table = Table {
        id: id.clone(),
        config,
        creator,
        wallet,
        shoe,
        seats: (0..seat_count).map(|_| Seat::default()).collect(),
        dealer: Vec::new(),
        phase: Phase::Waiting,
        epoch: 0,
        deadline_unix: None,
        current_seat: None,
        last_payouts: None,
        created_at: now_millis(),
        last_activity: Instant::now(),
        closed: false,
        events: event_tx.clone(),
        timer_tx: command_tx.clone(),
        lobby,
    };
    tokio::spawn(run(table, command_rx));
    TableHandle {
        id,
        commands: command_tx,
        events: event_tx,
    }
}

#[derive(Default)]
struct Seat {
    occupant: Option<PlayerIdentity>,
    connected: bool,
    hand: sabot_types::Hand,
    natural: bool,
    forfeited: bool,
}

struct Table<W: Wallet> {
    id: String,
    config: TableConfig,
    creator: PlayerIdentity,
    wallet: Arc<W>,
    shoe: Shoe,
    seats: Vec<Seat>,
    dealer: Vec<Card>,
    phase: Phase,
    epoch: u64,
    deadline_unix: Option<u64>,
    current_seat: Option<u8>,
    last_payouts: Option<Vec<Payout>>,
    created_at: u64,
    last_activity: Instant,
    closed: bool,
    events: broadcast::Sender<ServerEvent>,
    timer_tx: mpsc::Sender<TableCommand>,
    lobby: Arc<Notify>,
}

async fn run<W: Wallet>(mut table: Table<W>, mut commands: mpsc::Receiver<TableCommand>) {
    info!(table = %table.id, "table opened");
    while let Some(command) = commands.recv().await {
        match command {
            TableCommand::Sit {
                identity,
                seat_index,
                reply,
            } => {
                table.touch();
                let _ = reply.send(table.handle_sit(identity, seat_index));
            }
            TableCommand::Bet {
                identity,
                seat_index,
                amount,
                reply,
            } => {
                table.touch();
                let _ = reply.send(table.handle_bet(identity, seat_index, amount).await);
            }
            TableCommand::Action {
                identity,
                seat_index,
                action,
                reply,
            } => {
                table.touch();
                let _ = reply.send(table.handle_action(identity, seat_index, action).await);
            }
            TableCommand::Leave {
                identity,
                seat_index,
                reply,
            } => {
                table.touch();
                let _ = reply.send(table.handle_leave(identity, seat_index));
            }
            TableCommand::Disconnect { identity } => {
                table.handle_disconnect(identity);
            }
            TableCommand::Snapshot { reply } => {
                let _ = reply.send(table.snapshot());
            }
            TableCommand::Close { requester, reply } => {
                let _ = reply.send(table.handle_close(requester));
            }
            TableCommand::IdleCheck { reply } => {
                let _ = reply.send(table.is_idle());
            }
            TableCommand::DeadlineExpired { epoch } => {
                table.handle_deadline(epoch);
            }
        }
        if table.closed {
            break;
        }
    }
    info!(table = %table.id, "table actor stopped");
}

impl<W: Wallet> Table<W> {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn broadcast(&self, event: ServerEvent) {
        // Err means no subscribers right now, which is fine.
        let _ = self.events.send(event);
    }

    /// Phase transitions are lobby-visible, so every one pings the
    /// registry's refresh task. `Notify` coalesces bursts into one wake.
    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.lobby.notify_one();
    }

    /// Arm the phase deadline. Bumping the epoch invalidates any timer
    /// still in flight from the previous phase.
    fn arm_deadline(&mut self, window: Duration) {
        self.epoch += 1;
        self.deadline_unix = Some(now_millis() + window.as_millis() as u64);
        let epoch = self.epoch;
        let tx = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(TableCommand::DeadlineExpired { epoch }).await;
        });
    }

    fn cancel_deadline(&mut self) {
        self.epoch += 1;
        self.deadline_unix = None;
    }

    fn occupied_count(&self) -> u8 {
        self.seats.iter().filter(|s| s.occupant.is_some()).count() as u8
    }

    fn find_seat(&self, identity: &PlayerIdentity) -> Option<u8> {
        self.seats.iter().position(|seat| {
            seat.occupant
                .as_ref()
                .is_some_and(|occupant| occupant.user_id == identity.user_id)
        }).map(|index| index as u8)
    }

    fn is_idle(&self) -> bool {
        self.occupied_count() == 0
            && self.last_activity.elapsed() >= self.config.rules.idle_timeout
    }

    fn handle_sit(&mut self, identity: PlayerIdentity, seat_index: u8) -> Result<(), EngineError> {
        let index = seat_index as usize;
        if index >= self.seats.len() {
            return Err(EngineError::validation("siège inexistant"));
        }
        if let Some(existing) = self.find_seat(&identity) {
            if existing == seat_index {
                // Reconnection to an already-held seat.
                let seat = &mut self.seats[index];
                seat.connected = true;
                self.broadcast(ServerEvent::TableState(self.snapshot()));
                return Ok(());
            }
            return Err(EngineError::validation("vous occupez déjà un siège"));
        }
        if self.seats[index].occupant.is_some() {
            return Err(EngineError::validation("siège déjà occupé"));
        }
        let seat = &mut self.seats[index];
        seat.occupant = Some(identity);
        seat.connected = true;
        seat.hand.clear();
        seat.natural = false;
        seat.forfeited = false;
        self.lobby.notify_one();
        if self.phase == Phase::Waiting {
            self.enter_betting();
        } else {
            self.broadcast(ServerEvent::TableState(self.snapshot()));
        }
        Ok(())
    }

    async fn handle_bet(
        &mut self,
        identity: PlayerIdentity,
        seat_index: Option<u8>,
        amount: u64,
    ) -> Result<(), EngineError> {
        if self.phase != Phase::Betting {
            return Err(EngineError::validation("les mises sont fermées"));
        }
        let index = match seat_index {
            Some(index) => index,
            None => self
                .find_seat(&identity)
                .ok_or_else(|| EngineError::authorization("vous n'occupez aucun siège"))?,
        };
        let seat = self
            .seats
            .get(index as usize)
            .ok_or_else(|| EngineError::validation("siège inexistant"))?;
        let owns = seat
            .occupant
            .as_ref()
            .is_some_and(|occupant| occupant.user_id == identity.user_id);
        if !owns {
            return Err(EngineError::authorization("ce siège ne vous appartient pas"));
        }
        if seat.hand.bet != 0 {
            return Err(EngineError::validation("mise déjà placée pour cette main"));
        }
        if amount < self.config.min_bet || amount > self.config.max_bet {
            return Err(EngineError::validation(format!(
                "mise hors limites ({}..{})",
                self.config.min_bet, self.config.max_bet
            )));
        }
        match self.wallet.debit(&identity, amount).await {
            DebitOutcome::Debited => {}
            DebitOutcome::InsufficientFunds => return Err(EngineError::InsufficientFunds),
        }
        self.seats[index as usize].hand.bet = amount;
        self.broadcast(ServerEvent::BetUpdate {
            seat: index,
            bet: amount,
        });

        // Everyone seated and connected has wagered: no reason to wait
        // out the window.
        let all_in = self
            .seats
            .iter()
            .filter(|seat| seat.occupant.is_some() && seat.connected)
            .all(|seat| seat.hand.bet > 0);
        if all_in {
            self.start_hand();
        }
        Ok(())
    }

    async fn handle_action(
        &mut self,
        identity: PlayerIdentity,
        seat_index: u8,
        action: ActionType,
    ) -> Result<(), EngineError> {
        if self.phase != Phase::Playing {
            return Err(EngineError::validation("aucune main en cours"));
        }
        let seat = self
            .seats
            .get(seat_index as usize)
            .ok_or_else(|| EngineError::validation("siège inexistant"))?;
        let owns = seat
            .occupant
            .as_ref()
            .is_some_and(|occupant| occupant.user_id == identity.user_id);
        if !owns {
            return Err(EngineError::authorization("ce siège ne vous appartient pas"));
        }
        if self.current_seat != Some(seat_index) {
            return Err(EngineError::authorization("ce n'est pas votre tour"));
        }

        match action {
            ActionType::Split => {
                return Err(EngineError::validation(
                    "SPLIT n'est pas supporté à cette table",
                ));
            }
            ActionType::Hit => {
                let card = self.shoe.draw();
                let seat = &mut self.seats[seat_index as usize];
                seat.hand.push(card);
                if seat.hand.total == 21 {
                    seat.hand.standing = true;
                }
                let done = seat.hand.busted || seat.hand.standing;
                let mut hand = seat.hand.clone();
                // The seat keeps the turn after a live hit; doubling is
                // off the table once a third card is down.
                hand.has_turn = !done;
                self.broadcast(ServerEvent::ActionResult {
                    seat: seat_index,
                    hand,
                });
                if done {
                    self.advance_turn(seat_index);
                } else {
                    self.arm_deadline(self.config.rules.turn_window);
                    self.broadcast(ServerEvent::PlayerTurn {
                        seat: seat_index,
                        deadline: self.deadline_unix.unwrap_or_default(),
                    });
                }
            }
            ActionType::Stand => {
                let seat = &mut self.seats[seat_index as usize];
                seat.hand.standing = true;
                let hand = seat.hand.clone();
                self.broadcast(ServerEvent::ActionResult {
                    seat: seat_index,
                    hand,
                });
                self.advance_turn(seat_index);
            }
            ActionType::Double => {
                if seat.hand.cards.len() != 2 {
                    return Err(EngineError::validation(
                        "DOUBLE uniquement comme première action",
                    ));
                }
                let stake = seat.hand.bet;
                match self.wallet.debit(&identity, stake).await {
                    DebitOutcome::Debited => {}
                    DebitOutcome::InsufficientFunds => {
                        return Err(EngineError::InsufficientFunds)
                    }
                }
                let card = self.shoe.draw();
                let seat = &mut self.seats[seat_index as usize];
                seat.hand.bet = stake.saturating_mul(2);
                seat.hand.push(card);
                if !seat.hand.busted {
                    seat.hand.standing = true;
                }
                let hand = seat.hand.clone();
                self.broadcast(ServerEvent::ActionResult {
                    seat: seat_index,
                    hand,
                });
                self.advance_turn(seat_index);
            }
            ActionType::Surrender => {
                if seat.hand.cards.len() != 2 {
                    return Err(EngineError::validation(
                        "SURRENDER uniquement comme première action",
                    ));
                }
                let seat = &mut self.seats[seat_index as usize];
                seat.hand.surrendered = true;
                let hand = seat.hand.clone();
                self.broadcast(ServerEvent::ActionResult {
                    seat: seat_index,
                    hand,
                });
                self.advance_turn(seat_index);
            }
        }
        Ok(())
    }

    fn handle_leave(
        &mut self,
        identity: PlayerIdentity,
        seat_index: u8,
    ) -> Result<(), EngineError> {
        let seat = self
            .seats
            .get(seat_index as usize)
            .ok_or_else(|| EngineError::validation("siège inexistant"))?;
        let owns = seat
            .occupant
            .as_ref()
            .is_some_and(|occupant| occupant.user_id == identity.user_id);
        if !owns {
            return Err(EngineError::authorization("ce siège ne vous appartient pas"));
        }

        let bet = seat.hand.bet;
        if self.phase == Phase::Betting && bet > 0 {
            // The hand never started, so the wager goes back.
            self.spawn_credit(identity, bet);
        }
        // Mid-hand the wager is forfeit; vacating removes the hand from
        // settlement entirely.
        let was_turn = self.current_seat == Some(seat_index);
        self.vacate(seat_index as usize);
        if self.occupied_count() == 0 {
            self.abort_round();
            return Ok(());
        }
        self.broadcast(ServerEvent::TableState(self.snapshot()));
        if self.phase == Phase::Playing && was_turn {
            self.advance_turn(seat_index);
        }
        Ok(())
    }

    fn handle_disconnect(&mut self, identity: PlayerIdentity) {
        let Some(seat_index) = self.find_seat(&identity) else {
            return;
        };
        let index = seat_index as usize;
        match self.phase {
            Phase::Betting | Phase::Waiting | Phase::Payout => {
                let bet = self.seats[index].hand.bet;
                if self.phase == Phase::Betting && bet > 0 {
                    self.spawn_credit(identity, bet);
                }
                self.vacate(index);
                if self.occupied_count() == 0 {
                    self.abort_round();
                    return;
                }
                self.broadcast(ServerEvent::TableState(self.snapshot()));
            }
            Phase::Playing | Phase::DealerTurn => {
                // Keep the seat visible as disconnected until settlement;
                // the wager is forfeit and the hand stops acting.
                let was_turn = self.current_seat == Some(seat_index);
                let seat = &mut self.seats[index];
                seat.connected = false;
                if seat.hand.bet > 0 {
                    seat.forfeited = true;
                    seat.hand.standing = true;
                }
                self.broadcast(ServerEvent::TableState(self.snapshot()));
                if self.phase == Phase::Playing && was_turn {
                    self.advance_turn(seat_index);
                }
            }
        }
    }

    fn handle_close(&mut self, requester: Option<PlayerIdentity>) -> Result<(), EngineError> {
        if let Some(identity) = requester {
            if identity.user_id != self.creator.user_id {
                return Err(EngineError::authorization(
                    "seul le créateur peut fermer la table",
                ));
            }
        }
        // Unsettled wagers go back to their owners.
        if matches!(
            self.phase,
            Phase::Betting | Phase::Playing | Phase::DealerTurn
        ) {
            for seat in &self.seats {
                if seat.hand.bet > 0 && !seat.forfeited {
                    if let Some(occupant) = &seat.occupant {
                        self.spawn_credit(occupant.clone(), seat.hand.bet);
                    }
                }
            }
        }
        self.broadcast(ServerEvent::TableClosed {
            table_id: self.id.clone(),
        });
        self.closed = true;
        Ok(())
    }

    fn handle_deadline(&mut self, epoch: u64) {
        if epoch != self.epoch {
            debug!(table = %self.id, epoch, current = self.epoch, "stale deadline ignored");
            return;
        }
        match self.phase {
            Phase::Betting => {
                let any_bet = self.seats.iter().any(|seat| seat.hand.bet > 0);
                if any_bet {
                    self.start_hand();
                } else {
                    // Nobody wagered: keep the table open and restart
                    // the window.
                    self.arm_deadline(self.config.rules.betting_window);
                    self.broadcast(ServerEvent::TableState(self.snapshot()));
                }
            }
            Phase::Playing => {
                // Turn expired: implicit stand.
                if let Some(seat_index) = self.current_seat {
                    let seat = &mut self.seats[seat_index as usize];
                    seat.hand.standing = true;
                    let hand = seat.hand.clone();
                    self.broadcast(ServerEvent::ActionResult {
                        seat: seat_index,
                        hand,
                    });
                    self.advance_turn(seat_index);
                }
            }
            Phase::Payout => {
                self.end_round();
            }
            Phase::Waiting | Phase::DealerTurn => {}
        }
    }

    fn enter_betting(&mut self) {
        self.set_phase(Phase::Betting);
        self.current_seat = None;
        self.dealer.clear();
        for seat in &mut self.seats {
            seat.hand.clear();
            seat.natural = false;
            seat.forfeited = false;
        }
        self.arm_deadline(self.config.rules.betting_window);
        self.broadcast(ServerEvent::TableState(self.snapshot()));
    }

    /// Deal the round: two passes over the wagered seats in ascending
    /// order, the dealer taking the up-card after the first pass and the
    /// hole card after the second.
    fn start_hand(&mut self) {
        self.shoe.reshuffle_if_needed();
        self.last_payouts = None;
        self.dealer.clear();

        let bettors: Vec<usize> = (0..self.seats.len())
            .filter(|&index| self.seats[index].hand.bet > 0)
            .collect();
        for _ in 0..2 {
            for &index in &bettors {
                let card = self.shoe.draw();
                self.seats[index].hand.push(card);
            }
            let card = self.shoe.draw();
            self.dealer.push(card);
        }
        for &index in &bettors {
            let seat = &mut self.seats[index];
            seat.natural = seat.hand.is_blackjack();
            if seat.natural {
                // Naturals stand immediately.
                seat.hand.standing = true;
            }
        }

        self.set_phase(Phase::Playing);
        let first = self.next_live_seat(0);
        // Assigned before the players map is built so the first seat's
        // hand carries its turn hints.
        self.current_seat = first;
        if first.is_some() {
            self.arm_deadline(self.config.rules.turn_window);
        } else {
            self.deadline_unix = Some(now_millis());
        }

        let players: BTreeMap<u8, SeatView> = bettors
            .iter()
            .map(|&index| (index as u8, self.seat_view(index as u8)))
            .collect();
        self.broadcast(ServerEvent::HandStart {
            players,
            dealer_up: self.dealer[0],
            deadline: self.deadline_unix.unwrap_or_default(),
        });

        match first {
            Some(seat_index) => {
                self.broadcast(ServerEvent::PlayerTurn {
                    seat: seat_index,
                    deadline: self.deadline_unix.unwrap_or_default(),
                });
            }
            None => self.dealer_turn(),
        }
    }

    fn next_live_seat(&self, from: u8) -> Option<u8> {
        (from as usize..self.seats.len())
            .find(|&index| {
                let seat = &self.seats[index];
                seat.occupant.is_some() && seat.hand.is_live()
            })
            .map(|index| index as u8)
    }

    fn advance_turn(&mut self, after: u8) {
        match self.next_live_seat(after + 1) {
            Some(seat_index) => {
                self.current_seat = Some(seat_index);
                self.arm_deadline(self.config.rules.turn_window);
                self.broadcast(ServerEvent::PlayerTurn {
                    seat: seat_index,
                    deadline: self.deadline_unix.unwrap_or_default(),
                });
            }
            None => self.dealer_turn(),
        }
    }

    fn dealer_turn(&mut self) {
        self.set_phase(Phase::DealerTurn);
        self.current_seat = None;
        self.cancel_deadline();
        self.broadcast(ServerEvent::DealerTurnStart {
            dealer: DealerView::from_cards(self.dealer.clone()),
        });

        // The dealer only draws when someone can still beat the house:
        // against a field of busts, surrenders and naturals the outcome
        // is already decided.
        let contested = self.seats.iter().any(|seat| {
            seat.hand.bet > 0
                && !seat.forfeited
                && !seat.hand.busted
                && !seat.hand.surrendered
                && !seat.natural
        });
        if contested {
            loop {
                let total = sabot_types::hand::hand_total(&self.dealer);
                if total > 17 {
                    break;
                }
                if total == 17
                    && !(self.config.rules.dealer_hits_soft_17 && is_soft(&self.dealer))
                {
                    break;
                }
                let card = self.shoe.draw();
                self.dealer.push(card);
            }
        }
        self.broadcast(ServerEvent::DealerTurnEnd {
            dealer: DealerView::from_cards(self.dealer.clone()),
        });
        self.settle();
    }

    fn settle(&mut self) {
        self.set_phase(Phase::Payout);
        let mut payouts = Vec::new();
        for (index, seat) in self.seats.iter().enumerate() {
            if seat.hand.bet == 0 || seat.occupant.is_none() || seat.forfeited {
                continue;
            }
            let (outcome, credit) =
                settle_seat(&seat.hand, seat.natural, &self.dealer, &self.config.rules);
            payouts.push(Payout {
                seat: index as u8,
                bet: seat.hand.bet,
                credit,
                total: seat.hand.total,
                outcome,
            });
            if credit > 0 {
                if let Some(occupant) = &seat.occupant {
                    self.spawn_credit(occupant.clone(), credit);
                }
            }
        }
        self.last_payouts = Some(payouts.clone());
        self.broadcast(ServerEvent::Payouts { payouts });
        self.arm_deadline(self.config.rules.payout_window);
    }

    fn end_round(&mut self) {
        for index in 0..self.seats.len() {
            if self.seats[index].occupant.is_some() && !self.seats[index].connected {
                self.vacate(index);
            }
        }
        if self.occupied_count() > 0 {
            self.enter_betting();
        } else {
            self.abort_round();
        }
    }

    /// Back to WAITING with no round in flight.
    fn abort_round(&mut self) {
        self.set_phase(Phase::Waiting);
        self.current_seat = None;
        self.dealer.clear();
        self.cancel_deadline();
        for seat in &mut self.seats {
            seat.hand.clear();
            seat.natural = false;
            seat.forfeited = false;
        }
        self.broadcast(ServerEvent::TableState(self.snapshot()));
    }

    fn vacate(&mut self, index: usize) {
        let seat = &mut self.seats[index];
        seat.occupant = None;
        seat.connected = false;
        seat.hand.clear();
        seat.natural = false;
        seat.forfeited = false;
        self.lobby.notify_one();
    }

    fn spawn_credit(&self, identity: PlayerIdentity, amount: u64) {
        let wallet = Arc::clone(&self.wallet);
        let table = self.id.clone();
        tokio::spawn(async move {
            debug!(%table, user = identity.user_id, amount, "crediting wallet");
            wallet.credit(&identity, amount).await;
        });
    }

    fn seat_view(&self, index: u8) -> SeatView {
        let seat = &self.seats[index as usize];
        let mut hand = seat.hand.clone();
        if self.phase == Phase::Playing && self.current_seat == Some(index) {
            hand.has_turn = true;
            hand.can_double = hand.cards.len() == 2;
        }
        SeatView {
            index,
            user_id: seat.occupant.as_ref().map(|occupant| occupant.user_id),
            email: seat.occupant.as_ref().map(|occupant| occupant.email.clone()),
            status: if seat.occupant.is_none() {
                SeatStatus::Empty
            } else if seat.connected {
                SeatStatus::Occupied
            } else {
                SeatStatus::Disconnected
            },
            hand,
        }
    }

    /// Full observer snapshot. The dealer's hole card stays concealed
    /// until DEALER_TURN.
    fn snapshot(&self) -> TableView {
        let seats: BTreeMap<u8, SeatView> = (0..self.seats.len() as u8)
            .filter(|&index| self.seats[index as usize].occupant.is_some())
            .map(|index| (index, self.seat_view(index)))
            .collect();
        let dealer_cards = if self.phase == Phase::Playing && self.dealer.len() >= 2 {
            self.dealer[..1].to_vec()
        } else {
            self.dealer.clone()
        };
        TableView {
            id: self.id.clone(),
            name: self.config.name.clone(),
            max_seats: self.config.max_seats,
            seats,
            dealer: DealerView::from_cards(dealer_cards),
            phase: self.phase,
            min_bet: self.config.min_bet,
            max_bet: self.config.max_bet,
            created_at: Some(self.created_at.to_string()),
            shoe_count: Some(self.shoe.remaining() as u32),
            current_seat_index: self.current_seat,
            deadline: self.deadline_unix,
            creator_email: Some(self.creator.email.clone()),
            last_payouts: self.last_payouts.clone(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
