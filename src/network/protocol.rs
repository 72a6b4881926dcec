//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON text frames, internally tagged by `type`.

use serde::{Serialize, Deserialize};

use crate::game::board::Move;
use crate::network::room::{ConnectionId, Role, SeatInfo};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Take a seat in a room, creating it if needed.
    JoinRoom(JoinRequest),

    /// Assign marks and start the match in the caller's room.
    StartGame,

    /// A move the sender has already applied locally.
    PlayerMove {
        /// Cell index and mark.
        #[serde(rename = "move")]
        mv: Move,
    },

    /// Give up the caller's seat.
    LeaveRoom,

    /// Ping for latency measurement.
    Ping {
        /// Client clock, echoed back.
        timestamp: u64,
    },
}

/// Join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Room code. A host may leave it blank to have one generated.
    #[serde(default)]
    pub room_id: String,
    /// Display name.
    pub name: String,
    /// Host or guest.
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Guest
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once on connect.
    Welcome {
        /// Identifier the server uses for this connection.
        connection_id: ConnectionId,
        /// Server version.
        server_version: String,
    },

    /// Join confirmation, sent to the joining connection only.
    RoomJoined {
        /// Room code.
        room_id: String,
        /// Roster in arrival order.
        seats: Vec<SeatInfo>,
    },

    /// Roster changed.
    RoomUpdate {
        /// Room code.
        room_id: String,
        /// Roster in arrival order.
        seats: Vec<SeatInfo>,
    },

    /// Match started; every seat carries its mark.
    StartGame {
        /// Room code.
        room_id: String,
        /// Roster with marks.
        seats: Vec<SeatInfo>,
    },

    /// Move relayed from the opponent.
    PlayerMove {
        /// Cell index and mark.
        #[serde(rename = "move")]
        mv: Move,
        /// Connection that played it.
        from_connection_id: ConnectionId,
    },

    /// Pong response.
    Pong {
        /// Echo of the ping timestamp.
        timestamp: u64,
        /// Server clock in milliseconds since the epoch.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Two other connections already hold the seats.
    RoomFull,
    /// Start requested with fewer than two seats.
    InsufficientPlayers,
    /// Caller has no seat in a room.
    NotInRoom,
    /// Move sent before the match started.
    NotStarted,
    /// Malformed message or field.
    InvalidInput,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
