//! Game Logic Module
//!
//! Everything a single match needs, with no networking.
//!
//! ## Module Structure
//!
//! - `board`: Cells, moves, legality, outcome evaluation
//! - `engine`: Move selection for computer seats (easy / medium / hard)
//! - `session`: Per-match state machine with history and rewind

pub mod board;
pub mod engine;
pub mod session;

// Re-export key types
pub use board::{evaluate, Board, Cell, GameError, IllegalMove, Mark, Move, Outcome, LINES};
pub use engine::{choose_move, choose_move_with, Difficulty, EngineError};
pub use session::{GameSession, SessionState};
