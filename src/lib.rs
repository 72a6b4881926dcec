//! # Tic-Tac-Toe Server
//!
//! Game-session engine and two-seat multiplayer room coordinator.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TIC-TAC-TOE SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Match logic (pure, single owner)          │
//! │  ├── board.rs    - Cells, legality, win/draw evaluation      │
//! │  ├── engine.rs   - Easy / medium / hard move selection       │
//! │  └── session.rs  - Match state machine with rewind           │
//! │                                                              │
//! │  network/        - Multiplayer (shared, async)               │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── room.rs     - Room registry and seat assignment         │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Human-vs-computer matches use `game/` only. Human-vs-human matches run a
//! [`GameSession`] on each client and exchange moves through the room
//! coordinator, which relays but never applies them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::board::{Board, Cell, GameError, Mark, Move, Outcome};
pub use game::engine::{choose_move, Difficulty};
pub use game::session::GameSession;
pub use network::room::{ConnectionId, RoomCoordinator, RoomId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
