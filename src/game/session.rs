//! Game Session
//!
//! Single-owner state machine for one match: the board history, the ply
//! pointer into it, and the derived outcome.
//!
//! ```text
//!   EMPTY(ply=0) --apply_move--> IN_PROGRESS(ply=k) --apply_move--> TERMINAL(outcome)
//!        ^                              |                                  |
//!        +-------------- reset / rewind -+----------------------------------+
//! ```
//!
//! Rewinding only moves the pointer. The boards after it are dropped when
//! the next move is applied.

use rand::Rng;
use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use crate::game::board::{Board, Cell, GameError, IllegalMove, Mark, Move, Outcome};
use crate::game::engine::{choose_move_with, Difficulty};

/// Coarse session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// No move played at the current ply.
    Empty,
    /// Moves played, game undecided.
    InProgress {
        /// Current ply.
        ply: usize,
    },
    /// Game decided.
    Terminal {
        /// Final outcome.
        outcome: Outcome,
    },
}

/// One match.
#[derive(Clone, Debug)]
pub struct GameSession {
    /// Index 0 is always the empty board.
    history: Vec<Board>,
    /// Index into `history`.
    ply: usize,
    /// Mark that moves at even plies.
    first: Mark,
    /// Outcome of `history[ply]`.
    outcome: Outcome,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new(Mark::X)
    }
}

impl GameSession {
    /// Create an empty session where `first` moves at ply 0.
    pub fn new(first: Mark) -> Self {
        Self {
            history: vec![Board::new()],
            ply: 0,
            first,
            outcome: Outcome::InProgress,
        }
    }

    /// Apply a move at the current ply.
    ///
    /// Drops any boards after the current ply before recording the new one.
    pub fn apply_move(&mut self, mv: Move) -> Result<Outcome, GameError> {
        if self.outcome.is_terminal() {
            return Err(GameError::IllegalMove(IllegalMove::GameOver));
        }
        if mv.mark != self.to_move() {
            return Err(GameError::IllegalMove(IllegalMove::OutOfTurn(mv.mark)));
        }

        let next = self.board().apply(mv)?;

        self.history.truncate(self.ply + 1);
        self.history.push(next);
        self.ply += 1;
        self.outcome = next.outcome();

        Ok(self.outcome)
    }

    /// Move the pointer to `ply` (0..history length). History is kept.
    pub fn rewind(&mut self, ply: usize) -> Result<Outcome, GameError> {
        let board = self.history.get(ply).ok_or(GameError::PlyOutOfRange {
            ply,
            len: self.history.len(),
        })?;

        self.outcome = board.outcome();
        self.ply = ply;
        Ok(self.outcome)
    }

    /// Return to the empty board and discard all history.
    pub fn reset(&mut self) {
        self.history.truncate(1);
        self.ply = 0;
        self.outcome = Outcome::InProgress;
    }

    /// Let the engine play for the side to move.
    ///
    /// Returns the applied move, or `None` if the game is over.
    pub fn play_engine_turn<R: Rng + ?Sized>(
        &mut self,
        difficulty: Difficulty,
        rng: &mut R,
    ) -> Result<Option<Move>, GameError> {
        if self.outcome.is_terminal() {
            return Ok(None);
        }

        let mark = self.to_move();
        let Some(index) = choose_move_with(self.board(), mark, difficulty, rng) else {
            return Ok(None);
        };

        let mv = Move::new(index, mark);
        self.apply_move(mv)?;
        Ok(Some(mv))
    }

    /// Board at the current ply.
    #[inline]
    pub fn board(&self) -> &Board {
        &self.history[self.ply]
    }

    /// Current ply.
    #[inline]
    pub fn ply(&self) -> usize {
        self.ply
    }

    /// Every recorded board, including any after the current ply.
    pub fn history(&self) -> &[Board] {
        &self.history
    }

    /// Outcome at the current ply.
    #[inline]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Mark that moves at the current ply.
    pub fn to_move(&self) -> Mark {
        mark_for_ply(self.first, self.ply)
    }

    /// Mark that moves at ply 0.
    pub fn first(&self) -> Mark {
        self.first
    }

    /// Coarse state.
    pub fn state(&self) -> SessionState {
        if self.outcome.is_terminal() {
            SessionState::Terminal { outcome: self.outcome }
        } else if self.ply == 0 {
            SessionState::Empty
        } else {
            SessionState::InProgress { ply: self.ply }
        }
    }

    /// Moves that lead from ply 0 to the current ply.
    pub fn moves(&self) -> Vec<Move> {
        self.history[..=self.ply]
            .windows(2)
            .filter_map(|pair| {
                let (before, after) = (pair[0], pair[1]);
                (0..9u8).find_map(|i| match (before.get(i), after.get(i)) {
                    (Some(Cell::Empty), Some(Cell::Marked(mark))) => Some(Move::new(i, mark)),
                    _ => None,
                })
            })
            .collect()
    }

    /// SHA-256 over every board up to the current ply.
    pub fn history_digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"tictactoe-history:");
        hasher.update([self.first as u8]);
        for board in &self.history[..=self.ply] {
            for cell in board.cells() {
                hasher.update([match cell {
                    Cell::Empty => 0u8,
                    Cell::Marked(Mark::X) => 1,
                    Cell::Marked(Mark::O) => 2,
                }]);
            }
        }
        hasher.finalize().into()
    }
}

/// Mark that moves at `ply` when `first` opens.
#[inline]
pub fn mark_for_ply(first: Mark, ply: usize) -> Mark {
    if ply % 2 == 0 {
        first
    } else {
        first.opponent()
    }
}
