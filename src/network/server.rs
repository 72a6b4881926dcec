//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Assigns connection ids, decodes client messages, and routes them to the
//! room coordinator. All game rules run on the clients.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::network::protocol::{ClientMessage, ErrorCode, JoinRequest, ServerError, ServerMessage};
use crate::network::room::{ConnectionId, Role, RoomCoordinator, RoomError, RoomId};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

/// How long a closing connection waits for its outbound queue to drain.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound queue length per connection.
    pub channel_capacity: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            channel_capacity: 64,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    ///
    /// Reads `BIND_HOST`, `PORT`, `MAX_CONNECTIONS` and `CHANNEL_CAPACITY`;
    /// unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host: IpAddr = parse_var(&lookup, "BIND_HOST")?.unwrap_or(defaults.bind_addr.ip());
        let port: u16 = parse_var(&lookup, "PORT")?.unwrap_or(defaults.bind_addr.port());
        let max_connections = parse_var(&lookup, "MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections);
        let channel_capacity: usize = parse_var(&lookup, "CHANNEL_CAPACITY")?.unwrap_or(defaults.channel_capacity);

        if channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "CHANNEL_CAPACITY",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            max_connections,
            channel_capacity,
            ..defaults
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::Invalid { key, value }),
        },
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment value could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Room the client is seated in, if any.
    room_id: Option<RoomId>,
    /// Connection time.
    connected_at: Instant,
}

type ClientTable = Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Room registry.
    rooms: Arc<RoomCoordinator>,
    /// Connected clients.
    clients: ClientTable,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            rooms: Arc::new(RoomCoordinator::new()),
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
        info!("Game server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
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
        let rooms = self.rooms.clone();
        let config = self.config.clone();
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
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(config.channel_capacity);
            let connection_id = ConnectionId::new();

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(connection_id, ConnectedClient {
                    room_id: None,
                    connected_at: Instant::now(),
                });
            }
            info!("Client {} connected from {}", connection_id, addr);

            let _ = msg_tx.send(ServerMessage::Welcome {
                connection_id,
                server_version: config.version.clone(),
            }).await;

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let shutting_down = matches!(msg, ServerMessage::Shutdown { .. });
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                    if shutting_down {
                        let _ = ws_sender.close().await;
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", connection_id, e);
                                        send_error(&msg_tx, ErrorCode::InvalidInput, "Invalid message format");
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    connection_id,
                                    client_msg,
                                    &clients,
                                    &rooms,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", connection_id);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", connection_id, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup: leave any room, then forget the client
            Self::vacate_seat(connection_id, &clients, &rooms).await;
            let session_length = clients
                .write()
                .await
                .remove(&connection_id)
                .map(|c| c.connected_at.elapsed())
                .unwrap_or_default();

            // Let queued messages (e.g. shutdown notice) flush
            drop(msg_tx);
            let mut sender_task = sender_task;
            if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut sender_task).await.is_err() {
                sender_task.abort();
            }

            info!("Client {} cleaned up after {:?}", connection_id, session_length);
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        connection_id: ConnectionId,
        msg: ClientMessage,
        clients: &ClientTable,
        rooms: &Arc<RoomCoordinator>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let result = match msg {
            ClientMessage::JoinRoom(req) => {
                Self::handle_join(connection_id, req, clients, rooms, sender).await
            }
            ClientMessage::StartGame => {
                match current_room(connection_id, clients).await {
                    Some(room_id) => rooms.start(&room_id).await.map(|_| ()),
                    None => Err(RoomError::NotSeated),
                }
            }
            ClientMessage::PlayerMove { mv } => {
                match current_room(connection_id, clients).await {
                    Some(room_id) => match rooms.relay_move(&room_id, connection_id, mv).await {
                        Err(RoomError::NoOpponent) => {
                            warn!("Move from {} dropped: opponent gone", connection_id);
                            Ok(())
                        }
                        Err(RoomError::RelayDropped) => {
                            warn!("Lost relay of move {} from {}", mv.index, connection_id);
                            Err(RoomError::RelayDropped)
                        }
                        other => other,
                    },
                    None => Err(RoomError::NotSeated),
                }
            }
            ClientMessage::LeaveRoom => {
                Self::vacate_seat(connection_id, clients, rooms).await;
                Ok(())
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.try_send(ServerMessage::Pong {
                    timestamp,
                    server_time: SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis() as u64,
                });
                Ok(())
            }
        };

        if let Err(e) = result {
            debug!("Request from {} rejected: {}", connection_id, e);
            send_error(sender, e.code(), e.to_string());
        }
    }

    /// Handle a join request.
    ///
    /// A host with a blank room code gets a generated one. Switching rooms
    /// only releases the previous seat once the new room accepts.
    async fn handle_join(
        connection_id: ConnectionId,
        req: JoinRequest,
        clients: &ClientTable,
        rooms: &Arc<RoomCoordinator>,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Result<(), RoomError> {
        let previous = current_room(connection_id, clients).await;

        let room_id = if req.room_id.trim().is_empty() && req.role == Role::Host {
            Self::vacate_seat(connection_id, clients, rooms).await;
            let (room_id, _) = rooms.create(connection_id, &req.name, sender.clone()).await?;
            room_id
        } else {
            let room_id = RoomId::parse(&req.room_id)?;
            match previous {
                Some(previous) if previous != room_id => {
                    debug!("Client {} switching from room {}", connection_id, previous);
                    rooms
                        .switch(&previous, &room_id, connection_id, &req.name, req.role, sender.clone())
                        .await?;
                }
                _ => {
                    rooms
                        .join(&room_id, connection_id, &req.name, req.role, sender.clone())
                        .await?;
                }
            }
            room_id
        };

        let mut clients = clients.write().await;
        if let Some(client) = clients.get_mut(&connection_id) {
            client.room_id = Some(room_id);
        }
        Ok(())
    }

    /// Release the client's seat, if it holds one.
    async fn vacate_seat(
        connection_id: ConnectionId,
        clients: &ClientTable,
        rooms: &Arc<RoomCoordinator>,
    ) {
        let room_id = {
            let mut clients = clients.write().await;
            clients.get_mut(&connection_id).and_then(|c| c.room_id.take())
        };

        if let Some(room_id) = room_id {
            if let Err(e) = rooms.leave(&room_id, &connection_id).await {
                debug!("Leave for {} ignored: {}", connection_id, e);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Room registry shared by all connections.
    pub fn rooms(&self) -> &Arc<RoomCoordinator> {
        &self.rooms
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

async fn current_room(connection_id: ConnectionId, clients: &ClientTable) -> Option<RoomId> {
    clients
        .read()
        .await
        .get(&connection_id)
        .and_then(|c| c.room_id.clone())
}

fn send_error(sender: &mpsc::Sender<ServerMessage>, code: ErrorCode, message: impl Into<String>) {
    let _ = sender.try_send(ServerMessage::Error(ServerError::new(code, message)));
}
