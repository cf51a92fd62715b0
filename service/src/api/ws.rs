//! WebSocket sessions.
//!
//! One socket carries one authenticated identity. The session tracks
//! which tables it has joined (and therefore passed the access-code
//! check for); commands against tables outside that set get the same
//! generic rejection as an unknown id. Writes go through a bounded
//! queue with a send timeout so one stuck client cannot pin a table's
//! broadcast fanout.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State as AxumState, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use sabot_engine::{EngineError, TableHandle};
use sabot_types::{ClientCommand, ErrorBody, PlayerIdentity, ServerEvent};

use crate::Service;

const WS_SEND_TIMEOUT: Duration = Duration::from_secs(2);
const OUTBOUND_QUEUE_DEPTH: usize = 64;

#[derive(Deserialize)]
pub(super) struct WsParams {
    token: Option<String>,
}

pub(super) async fn table_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    AxumState(service): AxumState<Arc<Service>>,
) -> Response {
    let verified = params
        .token
        .as_deref()
        .map(|token| service.auth.verify(token));
    let identity = match verified {
        Some(Ok(identity)) => identity,
        _ => {
            service.metrics.auth_failure();
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, service, identity))
        .into_response()
}

struct Session {
    joined: HashMap<String, JoinedTable>,
}

struct JoinedTable {
    handle: TableHandle,
    forward: JoinHandle<()>,
    seated: bool,
}

async fn handle_socket(socket: WebSocket, service: Arc<Service>, identity: PlayerIdentity) {
    service.metrics.connection_opened();
    debug!(user = identity.user_id, "socket opened");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_DEPTH);

    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match timeout(WS_SEND_TIMEOUT, sink.send(message)).await {
                Ok(Ok(())) => {}
                _ => break,
            }
        }
    });

    // Lobby snapshot first, then the live lobby feed.
    let lobby_events = service.registry.subscribe_lobby();
    send_event(&service, &tx, &service.registry.lobby_snapshot().await).await;
    let lobby_task = spawn_forward(Arc::clone(&service), lobby_events, tx.clone());

    let mut session = Session {
        joined: HashMap::new(),
    };

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                service.metrics.message_in();
                match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => {
                        dispatch(&service, &identity, &mut session, &tx, command).await;
                    }
                    Err(error) => {
                        debug!(user = identity.user_id, %error, "unparseable command");
                        reject(&service, &tx, "commande invalide").await;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Seats held by this socket forfeit their hands on disconnect.
    for (_, joined) in session.joined.drain() {
        if joined.seated {
            joined.handle.disconnect(identity.clone()).await;
        }
        joined.forward.abort();
    }
    lobby_task.abort();
    drop(tx);
    let _ = write_task.await;
    service.metrics.connection_closed();
    debug!(user = identity.user_id, "socket closed");
}

async fn dispatch(
    service: &Arc<Service>,
    identity: &PlayerIdentity,
    session: &mut Session,
    tx: &mpsc::Sender<Message>,
    command: ClientCommand,
) {
    let result = match command {
        ClientCommand::Join { table_id, code } => {
            join_table(service, session, tx, &table_id, code.as_deref()).await
        }
        ClientCommand::Sit {
            table_id,
            seat_index,
            code,
        } => match ensure_joined(service, session, tx, &table_id, code.as_deref()).await {
            Ok(handle) => {
                let result = handle.sit(identity.clone(), seat_index).await;
                if result.is_ok() {
                    if let Some(joined) = session.joined.get_mut(&table_id) {
                        joined.seated = true;
                    }
                }
                result
            }
            Err(error) => Err(error),
        },
        ClientCommand::Bet {
            table_id,
            amount,
            seat_index,
        } => match session.joined.get(&table_id) {
            Some(joined) => joined.handle.bet(identity.clone(), seat_index, amount).await,
            None => Err(EngineError::table_unavailable()),
        },
        ClientCommand::Action {
            table_id,
            seat_index,
            action,
        } => match session.joined.get(&table_id) {
            Some(joined) => {
                joined
                    .handle
                    .action(identity.clone(), seat_index, action)
                    .await
            }
            None => Err(EngineError::table_unavailable()),
        },
        ClientCommand::Leave {
            table_id,
            seat_index,
        } => match session.joined.get_mut(&table_id) {
            Some(joined) => {
                let result = joined.handle.leave(identity.clone(), seat_index).await;
                if result.is_ok() {
                    joined.seated = false;
                }
                result
            }
            None => Err(EngineError::table_unavailable()),
        },
    };
    if let Err(error) = result {
        reject(service, tx, &error.to_string()).await;
    }
}

/// Join a table's event stream. Subscribes before snapshotting so no
/// event between the two is lost.
async fn join_table(
    service: &Arc<Service>,
    session: &mut Session,
    tx: &mpsc::Sender<Message>,
    table_id: &str,
    code: Option<&str>,
) -> Result<(), EngineError> {
    if let Some(joined) = session.joined.get(table_id) {
        let view = joined.handle.snapshot().await?;
        send_event(service, tx, &ServerEvent::TableState(view)).await;
        return Ok(());
    }
    let handle = service.registry.join(table_id, code)?;
    let events = handle.subscribe();
    let view = handle.snapshot().await?;
    send_event(service, tx, &ServerEvent::TableState(view)).await;
    let forward = spawn_forward(Arc::clone(service), events, tx.clone());
    session.joined.insert(
        table_id.to_string(),
        JoinedTable {
            handle,
            forward,
            seated: false,
        },
    );
    Ok(())
}

async fn ensure_joined(
    service: &Arc<Service>,
    session: &mut Session,
    tx: &mpsc::Sender<Message>,
    table_id: &str,
    code: Option<&str>,
) -> Result<TableHandle, EngineError> {
    if !session.joined.contains_key(table_id) {
        join_table(service, session, tx, table_id, code).await?;
    }
    session
        .joined
        .get(table_id)
        .map(|joined| joined.handle.clone())
        .ok_or_else(EngineError::table_unavailable)
}

fn spawn_forward(
    service: Arc<Service>,
    mut events: broadcast::Receiver<ServerEvent>,
    tx: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let terminal = matches!(event, ServerEvent::TableClosed { .. });
                    if !send_event(&service, &tx, &event).await || terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "slow consumer lagged behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Returns false once the socket writer is gone.
async fn send_event(service: &Service, tx: &mpsc::Sender<Message>, event: &ServerEvent) -> bool {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(%error, "unserializable event dropped");
            return true;
        }
    };
    if tx.send(Message::Text(payload)).await.is_err() {
        return false;
    }
    service.metrics.event_out();
    true
}

async fn reject(service: &Service, tx: &mpsc::Sender<Message>, message: &str) {
    service.metrics.command_rejected();
    send_event(
        service,
        tx,
        &ServerEvent::Error(ErrorBody::new(message)),
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authenticator;
    use crate::metrics::Metrics;
    use crate::wallet_client::WalletClient;
    use sabot_engine::{CreateTableRequest, HouseRules, Registry};
    use sabot_types::ActionType;

    fn service() -> Arc<Service> {
        Arc::new(Service {
            registry: Arc::new(Registry::new(
                Arc::new(WalletClient::memory(1_000)),
                HouseRules::default(),
            )),
            auth: Authenticator::new("test-secret"),
            metrics: Metrics::new(),
            origins: vec!["*".into()],
        })
    }

    fn identity(user_id: u64) -> PlayerIdentity {
        PlayerIdentity {
            user_id,
            email: format!("user{user_id}@example.test"),
        }
    }

    fn session() -> Session {
        Session {
            joined: HashMap::new(),
        }
    }

    async fn private_table(service: &Arc<Service>, code: &str) -> String {
        service
            .registry
            .create_table(
                identity(1),
                CreateTableRequest {
                    name: None,
                    max_seats: 5,
                    min_bet: 10,
                    max_bet: 500,
                    access_code: Some(code.into()),
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn next_event(rx: &mut mpsc::Receiver<Message>) -> ServerEvent {
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Message::Text(text))) => {
                serde_json::from_str(&text).expect("unparseable event")
            }
            other => panic!("no event on session queue: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_code_join_gets_error_and_no_state() {
        let service = service();
        let table_id = private_table(&service, "7421").await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut session = session();

        dispatch(
            &service,
            &identity(2),
            &mut session,
            &tx,
            ClientCommand::Join {
                table_id,
                code: Some("0000".into()),
            },
        )
        .await;

        assert!(session.joined.is_empty());
        let event = next_event(&mut rx).await;
        assert!(matches!(
            event,
            ServerEvent::Error(body) if body.error == "table introuvable ou code invalide"
        ));
        // No snapshot, no events: the session never subscribed.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_on_unjoined_table_get_generic_rejection() {
        let service = service();
        let table_id = private_table(&service, "7421").await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut session = session();

        let commands = [
            ClientCommand::Bet {
                table_id: table_id.clone(),
                amount: 100,
                seat_index: Some(0),
            },
            ClientCommand::Action {
                table_id: table_id.clone(),
                seat_index: 0,
                action: ActionType::Hit,
            },
            ClientCommand::Leave {
                table_id: table_id.clone(),
                seat_index: 0,
            },
        ];
        for command in commands {
            dispatch(&service, &identity(2), &mut session, &tx, command).await;
            let event = next_event(&mut rx).await;
            assert!(matches!(
                event,
                ServerEvent::Error(body) if body.error == "table introuvable ou code invalide"
            ));
        }
        assert!(session.joined.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_correct_code_join_delivers_snapshot() {
        let service = service();
        let table_id = private_table(&service, "7421").await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut session = session();

        dispatch(
            &service,
            &identity(2),
            &mut session,
            &tx,
            ClientCommand::Join {
                table_id: table_id.clone(),
                code: Some("7421".into()),
            },
        )
        .await;

        assert!(session.joined.contains_key(&table_id));
        let event = next_event(&mut rx).await;
        assert!(matches!(
            event,
            ServerEvent::TableState(view) if view.id == table_id
        ));
    }
}
