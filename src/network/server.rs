//! WebSocket Game Server
//!
//! Async WebSocket front-end for the hub.
//! Each connection gets a writer task, a viewer stream once identified, and
//! a read loop that turns JSON commands into hub calls.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::game::state::PlayerId;
use crate::network::hub::GameHub;
use crate::network::protocol::{ClientMessage, ServerReply, ErrorCode};
use crate::network::viewer::pump_viewer;

/// Outbound frames buffered per connection.
const OUTBOUND_QUEUE: usize = 64;

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Connected client state.
struct ConnectedClient {
    /// Player identifier (after identify).
    player_id: Option<PlayerId>,
    /// Connection time.
    connected_at: Instant,
}

/// Per-connection context for command handling.
struct Connection {
    addr: SocketAddr,
    player_id: Option<PlayerId>,
    outbound: mpsc::Sender<String>,
    viewer_cancel: Option<oneshot::Sender<()>>,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Shared game context.
    hub: Arc<GameHub>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, hub: Arc<GameHub>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            hub,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run the server.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let local_addr = listener.local_addr()?;
        info!("Game server v{} listening on {}", self.config.version, local_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("{}, rejecting {}", GameServerError::ConnectionLimitReached, addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let hub = self.hub.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);

            clients.write().await.insert(addr, ConnectedClient {
                player_id: None,
                connected_at: Instant::now(),
            });

            // Spawn frame writer task
            let sender_task = tokio::spawn(async move {
                while let Some(frame) = out_rx.recv().await {
                    if ws_sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
            });

            let mut conn = Connection {
                addr,
                player_id: None,
                outbound: out_tx,
                viewer_cancel: None,
            };

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        conn.reply(ServerReply::error(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(&mut conn, client_msg, &hub, &clients).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup: stop the viewer stream, then the writer
            if let Some(cancel) = conn.viewer_cancel.take() {
                let _ = cancel.send(());
            }
            drop(conn);
            sender_task.abort();

            if let Some(client) = clients.write().await.remove(&addr) {
                debug!(
                    player = ?client.player_id,
                    secs = client.connected_at.elapsed().as_secs(),
                    "connection closed"
                );
            }

            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        conn: &mut Connection,
        msg: ClientMessage,
        hub: &Arc<GameHub>,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    ) {
        if let ClientMessage::Ping { timestamp } = msg {
            conn.reply(ServerReply::Pong {
                timestamp,
                server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
            }).await;
            return;
        }

        if let ClientMessage::Identify { player_id } = msg {
            Self::handle_identify(conn, player_id, hub, clients).await;
            return;
        }

        let Some(player_id) = conn.player_id.clone() else {
            conn.reply(ServerReply::error(ErrorCode::NotIdentified, "Identify first")).await;
            return;
        };

        let reply = match msg {
            ClientMessage::Join { name } => match hub.join(&player_id, &name).await {
                Ok(()) => ServerReply::Joined { name: name.trim().to_string() },
                Err(e) => ServerReply::from(&e),
            },
            ClientMessage::Leave => match hub.leave(&player_id).await {
                Ok(name) => ServerReply::Left { name },
                Err(e) => ServerReply::from(&e),
            },
            ClientMessage::Roll => match hub.roll(&player_id).await {
                Ok(result) => ServerReply::Rolled {
                    roll: result.roll,
                    moved: result.outcome.moved,
                    teleported: result.outcome.teleported,
                    completed: result.outcome.completed,
                    cell_value: result.outcome.cell_value,
                },
                Err(e) => ServerReply::from(&e),
            },
            ClientMessage::Identify { .. } | ClientMessage::Ping { .. } => return,
        };

        conn.reply(reply).await;
    }

    /// Bind the connection to a player id and start its viewer stream.
    ///
    /// A client without an id is issued a new one.
    async fn handle_identify(
        conn: &mut Connection,
        player_id: Option<String>,
        hub: &Arc<GameHub>,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    ) {
        if conn.player_id.is_some() {
            conn.reply(ServerReply::error(ErrorCode::InvalidInput, "Already identified")).await;
            return;
        }

        let (player_id, reply) = match player_id {
            Some(id) => {
                let id = id.trim();
                if id.is_empty() {
                    conn.reply(ServerReply::error(ErrorCode::InvalidInput, "Player id required")).await;
                    return;
                }
                (PlayerId::new(id), ServerReply::Ok)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                debug!("Issued player id {} to {}", id, conn.addr);
                (PlayerId::new(id.clone()), ServerReply::Identified { player_id: id })
            }
        };

        conn.player_id = Some(player_id.clone());
        if let Some(client) = clients.write().await.get_mut(&conn.addr) {
            client.player_id = Some(player_id.clone());
        }
        conn.reply(reply).await;

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        conn.viewer_cancel = Some(cancel_tx);

        let hub = hub.clone();
        let outbound = conn.outbound.clone();
        let addr = conn.addr;
        tokio::spawn(async move {
            let sink = futures_util::sink::unfold(outbound, |tx, frame: String| async move {
                tx.send(frame).await.map(|_| tx)
            });
            let cancel = async {
                let _ = cancel_rx.await;
            };

            if let Err(e) = pump_viewer(&hub, Some(player_id), sink, cancel).await {
                debug!("Viewer stream for {} ended: {}", addr, e);
            }
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Shared game context.
    pub fn hub(&self) -> &Arc<GameHub> {
        &self.hub
    }
}

impl Connection {
    /// Queue a direct reply frame.
    async fn reply(&self, reply: ServerReply) {
        match reply.to_frame() {
            Ok(frame) => {
                let _ = self.outbound.send(frame).await;
            }
            Err(e) => error!("Failed to serialize reply: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    use crate::config::GameConfig;

    fn server() -> Arc<GameServer> {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let game = GameConfig {
            rng_seed: Some(5),
            ..Default::default()
        };
        let hub = Arc::new(GameHub::from_config(&game).unwrap());
        Arc::new(GameServer::new(config, hub))
    }

    async fn start(server: &Arc<GameServer>) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let srv = server.clone();
        let handle = tokio::spawn(async move {
            srv.serve(listener).await.unwrap();
        });
        (addr, handle)
    }

    /// Read frames until a `reply` frame arrives and decode it.
    async fn next_reply<S>(ws: &mut S) -> ServerReply
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            let Message::Text(frame) = msg else { continue };
            if let Some(data) = frame.strip_prefix("event: reply\ndata: ") {
                return ServerReply::from_json(data.trim_end()).unwrap();
            }
        }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = server();
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.hub().current_players().await.len(), 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = server();
        let (_addr, handle) = start(&server).await;

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_commands_require_identify() {
        let server = server();
        let (addr, _handle) = start(&server).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        ws.send(Message::Text(r#"{"type":"roll"}"#.into())).await.unwrap();
        let reply = next_reply(&mut ws).await;
        assert!(matches!(reply, ServerReply::Error { code: ErrorCode::NotIdentified, .. }));

        ws.send(Message::Text("not json".into())).await.unwrap();
        let reply = next_reply(&mut ws).await;
        assert!(matches!(reply, ServerReply::Error { code: ErrorCode::InvalidInput, .. }));

        server.shutdown();
    }

    #[tokio::test]
    async fn test_identify_join_roll() {
        let server = server();
        let (addr, _handle) = start(&server).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        ws.send(Message::Text(r#"{"type":"identify","player_id":"p1"}"#.into())).await.unwrap();
        assert_eq!(next_reply(&mut ws).await, ServerReply::Ok);

        ws.send(Message::Text(r#"{"type":"join","name":"Alice"}"#.into())).await.unwrap();
        assert_eq!(next_reply(&mut ws).await, ServerReply::Joined { name: "Alice".into() });

        ws.send(Message::Text(r#"{"type":"join","name":"Alice"}"#.into())).await.unwrap();
        let reply = next_reply(&mut ws).await;
        assert!(matches!(reply, ServerReply::Error { code: ErrorCode::AlreadyJoined, .. }));

        ws.send(Message::Text(r#"{"type":"roll"}"#.into())).await.unwrap();
        match next_reply(&mut ws).await {
            ServerReply::Rolled { roll, .. } => assert!((1..=6).contains(&roll)),
            other => panic!("unexpected reply {other:?}"),
        }

        assert_eq!(server.connection_count().await, 1);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_identify_without_id_issues_one() {
        let server = server();
        let (addr, _handle) = start(&server).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        ws.send(Message::Text(r#"{"type":"identify"}"#.into())).await.unwrap();
        let issued = match next_reply(&mut ws).await {
            ServerReply::Identified { player_id } => player_id,
            other => panic!("unexpected reply {other:?}"),
        };
        assert!(Uuid::parse_str(&issued).is_ok());

        ws.send(Message::Text(r#"{"type":"join","name":"Bob"}"#.into())).await.unwrap();
        assert_eq!(next_reply(&mut ws).await, ServerReply::Joined { name: "Bob".into() });

        let players = server.hub().current_players().await;
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].id.as_str(), issued);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_identified_client_receives_views() {
        let server = server();
        let (addr, _handle) = start(&server).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        ws.send(Message::Text(r#"{"type":"identify","player_id":"p1"}"#.into())).await.unwrap();

        let mut events = Vec::new();
        while events.len() < 5 {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(frame) = msg {
                let event = frame.lines().next().unwrap().to_string();
                if event != "event: reply" {
                    events.push(event);
                }
            }
        }
        assert_eq!(
            events,
            vec!["event: board", "event: players", "event: dice", "event: tokens", "event: stream"]
        );
        server.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_keeps_player() {
        let server = server();
        let (addr, _handle) = start(&server).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        ws.send(Message::Text(r#"{"type":"identify","player_id":"p1"}"#.into())).await.unwrap();
        next_reply(&mut ws).await;
        ws.send(Message::Text(r#"{"type":"join","name":"Alice"}"#.into())).await.unwrap();
        next_reply(&mut ws).await;
        ws.close(None).await.unwrap();

        // Wait for the server side to clean up
        for _ in 0..50 {
            if server.connection_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.hub().current_players().await.len(), 1);
        server.shutdown();
    }
}
