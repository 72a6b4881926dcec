//! Network Layer
//!
//! WebSocket server and room coordination for human-vs-human matches.
//! Moves are relayed between seats verbatim; the server never applies them.

pub mod protocol;
pub mod room;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, JoinRequest, ServerError, ErrorCode};
pub use room::{ConnectionId, RoomId, Role, SeatInfo, RoomState, RoomCoordinator, RoomError};
pub use server::{GameServer, ServerConfig, ConfigError, GameServerError};
