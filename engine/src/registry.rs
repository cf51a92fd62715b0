//! Table registry and lobby.
//!
//! Owns the id to actor-handle map, enforces the one-table-per-creator
//! rule and the private access codes, and fans lobby listings out to
//! connected clients. Everything async happens outside the map lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tracing::{info, warn};
use uuid::Uuid;

use sabot_types::{PlayerIdentity, ServerEvent, TableSummary};

use crate::error::EngineError;
use crate::rules::{HouseRules, TableConfig};
use crate::table::{self, TableHandle};
use crate::wallet::Wallet;

const LOBBY_FANOUT_DEPTH: usize = 64;

/// Creation parameters from the client. Phase timings and house rules
/// come from the registry, not the request.
#[derive(Clone, Debug)]
pub struct CreateTableRequest {
    pub name: Option<String>,
    pub max_seats: u8,
    pub min_bet: u64,
    pub max_bet: u64,
    pub access_code: Option<String>,
}

#[derive(Debug)]
pub struct CreatedTable {
    pub id: String,
    pub handle: TableHandle,
}

struct TableRecord {
    handle: TableHandle,
    creator: PlayerIdentity,
    name: Option<String>,
    access_code: Option<String>,
    max_seats: u8,
    min_bet: u64,
    max_bet: u64,
}

pub struct Registry<W: Wallet> {
    wallet: Arc<W>,
    rules: HouseRules,
    tables: Mutex<HashMap<String, TableRecord>>,
    lobby: broadcast::Sender<ServerEvent>,
    // Pinged by table actors on occupancy and phase changes; drained by
    // the refresh task in `start_sweeper`.
    lobby_changed: Arc<Notify>,
}

impl<W: Wallet> Registry<W> {
    pub fn new(wallet: Arc<W>, rules: HouseRules) -> Self {
        let (lobby, _) = broadcast::channel(LOBBY_FANOUT_DEPTH);
        Self {
            wallet,
            rules,
            tables: Mutex::new(HashMap::new()),
            lobby,
            lobby_changed: Arc::new(Notify::new()),
        }
    }

    /// Open a table. Each identity may run at most one at a time.
    pub async fn create_table(
        &self,
        creator: PlayerIdentity,
        request: CreateTableRequest,
    ) -> Result<CreatedTable, EngineError> {
        let config = TableConfig {
            name: request.name.clone(),
            max_seats: request.max_seats,
            min_bet: request.min_bet,
            max_bet: request.max_bet,
            access_code: request.access_code.clone(),
            rules: self.rules.clone(),
        };
        let id = Uuid::new_v4().to_string();
        {
            let mut tables = self.tables.lock().unwrap();
            let already_owns = tables
                .values()
                .any(|record| record.creator.user_id == creator.user_id);
            if already_owns {
                return Err(EngineError::validation("Vous possédez déjà une table"));
            }
            let handle = table::spawn(
                id.clone(),
                config,
                creator.clone(),
                Arc::clone(&self.wallet),
                Arc::clone(&self.lobby_changed),
            )?;
            tables.insert(
                id.clone(),
                TableRecord {
                    handle,
                    creator: creator.clone(),
                    name: request.name,
                    access_code: request.access_code,
                    max_seats: request.max_seats,
                    min_bet: request.min_bet,
                    max_bet: request.max_bet,
                },
            );
        }
        info!(table = %id, creator = creator.user_id, "table created");
        self.publish_lobby().await;
        let handle = self
            .table(&id)
            .map_err(|_| EngineError::Fatal("created table vanished".into()))?;
        Ok(CreatedTable { id, handle })
    }

    /// Handle lookup without an access-code check, for commands on a
    /// table the session already joined.
    pub fn table(&self, table_id: &str) -> Result<TableHandle, EngineError> {
        let tables = self.tables.lock().unwrap();
        tables
            .get(table_id)
            .map(|record| record.handle.clone())
            .ok_or_else(EngineError::table_unavailable)
    }

    /// Handle lookup gated by the access code. A wrong code and an
    /// unknown id produce the same rejection.
    pub fn join(&self, table_id: &str, code: Option<&str>) -> Result<TableHandle, EngineError> {
        let tables = self.tables.lock().unwrap();
        let record = tables
            .get(table_id)
            .ok_or_else(EngineError::table_unavailable)?;
        if let Some(expected) = &record.access_code {
            if code != Some(expected.as_str()) {
                return Err(EngineError::table_unavailable());
            }
        }
        Ok(record.handle.clone())
    }

    /// Close a table on behalf of its creator.
    pub async fn close_table(
        &self,
        requester: PlayerIdentity,
        table_id: &str,
    ) -> Result<(), EngineError> {
        let handle = self.table(table_id)?;
        handle.close(Some(requester)).await?;
        self.tables.lock().unwrap().remove(table_id);
        info!(table = %table_id, "table closed");
        self.publish_lobby().await;
        Ok(())
    }

    /// Lobby rows for every live table. Dead actors found along the way
    /// are dropped from the map.
    pub async fn list_tables(&self) -> Vec<TableSummary> {
        let records: Vec<(String, TableHandle, SummarySeed)> = {
            let tables = self.tables.lock().unwrap();
            tables
                .iter()
                .map(|(id, record)| {
                    (
                        id.clone(),
                        record.handle.clone(),
                        SummarySeed {
                            name: record.name.clone(),
                            is_private: record.access_code.is_some(),
                            max_seats: record.max_seats,
                            min_bet: record.min_bet,
                            max_bet: record.max_bet,
                            creator_email: record.creator.email.clone(),
                        },
                    )
                })
                .collect()
        };

        let mut summaries = Vec::with_capacity(records.len());
        let mut dead = Vec::new();
        for (id, handle, seed) in records {
            match handle.snapshot().await {
                Ok(view) => summaries.push(TableSummary {
                    id,
                    name: seed.name,
                    max_seats: seed.max_seats,
                    occupied_seats: view.seats.len() as u8,
                    is_private: seed.is_private,
                    phase: view.phase,
                    min_bet: seed.min_bet,
                    max_bet: seed.max_bet,
                    creator_email: Some(seed.creator_email),
                }),
                Err(_) => dead.push(id),
            }
        }
        if !dead.is_empty() {
            let mut tables = self.tables.lock().unwrap();
            for id in &dead {
                warn!(table = %id, "dropping dead table actor");
                tables.remove(id);
            }
        }
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub async fn table_summary(&self, table_id: &str) -> Result<TableSummary, EngineError> {
        self.list_tables()
            .await
            .into_iter()
            .find(|summary| summary.id == table_id)
            .ok_or_else(EngineError::table_unavailable)
    }

    pub fn subscribe_lobby(&self) -> broadcast::Receiver<ServerEvent> {
        self.lobby.subscribe()
    }

    /// Current lobby listing as an event, for the snapshot sent to a
    /// freshly connected client.
    pub async fn lobby_snapshot(&self) -> ServerEvent {
        ServerEvent::Lobby(self.list_tables().await)
    }

    pub async fn publish_lobby(&self) {
        let _ = self.lobby.send(self.lobby_snapshot().await);
    }

    /// Close tables that have sat empty past their idle timeout.
    /// Returns how many were removed.
    pub async fn sweep_idle(&self) -> usize {
        let handles: Vec<(String, TableHandle)> = {
            let tables = self.tables.lock().unwrap();
            tables
                .iter()
                .map(|(id, record)| (id.clone(), record.handle.clone()))
                .collect()
        };

        let mut removed = 0;
        for (id, handle) in handles {
            let idle = match handle.is_idle().await {
                Ok(idle) => idle,
                // Actor already gone.
                Err(_) => true,
            };
            if idle {
                let _ = handle.close(None).await;
                self.tables.lock().unwrap().remove(&id);
                info!(table = %id, "idle table closed");
                removed += 1;
            }
        }
        if removed > 0 {
            self.publish_lobby().await;
        }
        removed
    }

    /// Periodic idle sweep plus event-driven lobby refresh, for the
    /// service to run for the lifetime of the process. Table actors ping
    /// `lobby_changed` on every occupancy or phase change.
    pub fn start_sweeper(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_idle().await;
                    }
                    _ = self.lobby_changed.notified() => {
                        self.publish_lobby().await;
                    }
                }
            }
        });
    }
}

struct SummarySeed {
    name: Option<String>,
    is_private: bool,
    max_seats: u8,
    min_bet: u64,
    max_bet: u64,
    creator_email: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::MemoryWallet;
    use sabot_types::Phase;

    fn identity(user_id: u64) -> PlayerIdentity {
        PlayerIdentity {
            user_id,
            email: format!("user{user_id}@example.test"),
        }
    }

    fn request() -> CreateTableRequest {
        CreateTableRequest {
            name: Some("table haute".into()),
            max_seats: 5,
            min_bet: 10,
            max_bet: 500,
            access_code: None,
        }
    }

    fn registry() -> Registry<MemoryWallet> {
        Registry::new(Arc::new(MemoryWallet::new()), HouseRules::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_then_list_then_close() {
        let registry = registry();
        let created = registry.create_table(identity(1), request()).await.unwrap();

        let tables = registry.list_tables().await;
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].id, created.id);
        assert_eq!(tables[0].phase, Phase::Waiting);
        assert_eq!(tables[0].occupied_seats, 0);
        assert!(!tables[0].is_private);

        registry.close_table(identity(1), &created.id).await.unwrap();
        assert!(registry.list_tables().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_table_per_creator() {
        let registry = registry();
        registry.create_table(identity(1), request()).await.unwrap();

        let rejected = registry.create_table(identity(1), request()).await;
        match rejected {
            Err(EngineError::Validation(message)) => {
                assert_eq!(message, "Vous possédez déjà une table");
            }
            other => panic!("unexpected: {other:?}"),
        }

        // A different identity is free to open its own.
        registry.create_table(identity(2), request()).await.unwrap();
        assert_eq!(registry.list_tables().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_code_and_unknown_table_are_indistinguishable() {
        let registry = registry();
        let mut private = request();
        private.access_code = Some("1234".into());
        let created = registry.create_table(identity(1), private).await.unwrap();

        let wrong_code = registry.join(&created.id, Some("9999"));
        let no_code = registry.join(&created.id, None);
        let unknown = registry.join("no-such-table", Some("1234"));
        for rejected in [wrong_code, no_code, unknown] {
            match rejected {
                Err(error) => assert_eq!(error, EngineError::table_unavailable()),
                Ok(_) => panic!("expected rejection"),
            }
        }

        assert!(registry.join(&created.id, Some("1234")).is_ok());
        // Lobby advertises privacy without leaking the code.
        let tables = registry.list_tables().await;
        assert!(tables[0].is_private);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_creator_cannot_close() {
        let registry = registry();
        let created = registry.create_table(identity(1), request()).await.unwrap();

        let rejected = registry.close_table(identity(2), &created.id).await;
        assert!(matches!(rejected, Err(EngineError::Authorization(_))));
        assert_eq!(registry.list_tables().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sweep_closes_empty_tables() {
        let wallet = Arc::new(MemoryWallet::new());
        let mut rules = HouseRules::default();
        rules.idle_timeout = Duration::from_secs(60);
        let registry = Registry::new(Arc::clone(&wallet), rules);
        let created = registry.create_table(identity(1), request()).await.unwrap();

        // Fresh table is not idle yet.
        assert_eq!(registry.sweep_idle().await, 0);

        tokio::time::advance(Duration::from_secs(120)).await;
        let mut events = created.handle.subscribe();
        assert_eq!(registry.sweep_idle().await, 1);
        assert!(registry.list_tables().await.is_empty());
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("no close event")
            .expect("stream closed");
        assert!(matches!(event, ServerEvent::TableClosed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lobby_broadcast_on_create() {
        let registry = registry();
        let mut lobby = registry.subscribe_lobby();
        registry.create_table(identity(1), request()).await.unwrap();

        let event = lobby.recv().await.unwrap();
        let ServerEvent::Lobby(tables) = event else {
            panic!("expected lobby event");
        };
        assert_eq!(tables.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lobby_refreshes_on_occupancy_and_phase_change() {
        let registry = Arc::new(registry());
        Arc::clone(&registry).start_sweeper(Duration::from_secs(600));
        let created = registry.create_table(identity(1), request()).await.unwrap();

        let mut lobby = registry.subscribe_lobby();
        created.handle.sit(identity(2), 0).await.unwrap();

        // The sit pings the refresh task directly; no sweeper tick is
        // needed before the listing shows the seat taken and the table
        // in its betting window.
        for _ in 0..16 {
            let event = tokio::time::timeout(Duration::from_secs(30), lobby.recv())
                .await
                .expect("no lobby refresh after occupancy change")
                .expect("lobby stream closed");
            let ServerEvent::Lobby(tables) = event else {
                continue;
            };
            if tables.first().is_some_and(|table| table.occupied_seats == 1) {
                assert_eq!(tables[0].phase, Phase::Betting);
                return;
            }
        }
        panic!("lobby never showed the occupied seat");
    }
}
