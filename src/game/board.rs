//! Board Definitions
//!
//! The 3x3 grid, its cells, moves, and outcome evaluation.
//! Pure data and rules: nothing here allocates or touches I/O.

use std::fmt;
use serde::{Serialize, Deserialize};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

/// The 8 winning lines, row-major indices.
pub const LINES: [[u8; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

// =============================================================================
// MARK / CELL
// =============================================================================

/// One of the two symbols a seat plays.
///
/// `X` is the first mark (assigned to the host), `O` the second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// First mark.
    X,
    /// Second mark.
    O,
}

impl Mark {
    /// The other mark.
    #[inline]
    pub const fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

/// A single board cell.
///
/// Serializes as `null`, `"X"` or `"O"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Cell {
    /// Nobody has played here.
    #[default]
    Empty,
    /// Occupied by a mark.
    Marked(Mark),
}

impl Cell {
    /// Whether the cell is free.
    #[inline]
    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// The mark in this cell, if any.
    #[inline]
    pub fn mark(self) -> Option<Mark> {
        match self {
            Cell::Empty => None,
            Cell::Marked(mark) => Some(mark),
        }
    }
}

// =============================================================================
// MOVE / OUTCOME
// =============================================================================

/// A single mark placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// Target cell (0..8, row-major).
    pub index: u8,
    /// Mark being placed.
    pub mark: Mark,
}

impl Move {
    /// Create a new move.
    pub const fn new(index: u8, mark: Mark) -> Self {
        Self { index, mark }
    }
}

/// Result of evaluating a board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Moves remain and nobody has three in a row.
    InProgress,
    /// A mark completed a line.
    Win {
        /// Winning mark.
        mark: Mark,
        /// The completed line.
        line: [u8; 3],
    },
    /// Board full, no line completed.
    Draw,
}

impl Outcome {
    /// Whether the game is over.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::InProgress)
    }

    /// The winning mark, if any.
    pub fn winner(&self) -> Option<Mark> {
        match self {
            Outcome::Win { mark, .. } => Some(*mark),
            _ => None,
        }
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// The 3x3 grid. Index 0..8 maps to the grid row-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Board([Cell; CELL_COUNT]);

impl Board {
    /// Create an empty board.
    pub const fn new() -> Self {
        Self([Cell::Empty; CELL_COUNT])
    }

    /// Build a board from an arbitrary slice of cells.
    ///
    /// Fails with [`GameError::InvalidBoard`] unless exactly 9 cells are given.
    pub fn from_cells(cells: &[Cell]) -> Result<Self, GameError> {
        let cells: [Cell; CELL_COUNT] = cells
            .try_into()
            .map_err(|_| GameError::InvalidBoard(cells.len()))?;
        Ok(Self(cells))
    }

    /// Get a cell, or `None` if `index` is off the board.
    #[inline]
    pub fn get(&self, index: u8) -> Option<Cell> {
        self.0.get(index as usize).copied()
    }

    /// All cells in index order.
    #[inline]
    pub fn cells(&self) -> &[Cell; CELL_COUNT] {
        &self.0
    }

    /// Indices of empty cells, ascending.
    pub fn empty_cells(&self) -> impl Iterator<Item = u8> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_empty())
            .map(|(i, _)| i as u8)
    }

    /// Number of non-empty cells.
    pub fn filled_count(&self) -> usize {
        self.0.iter().filter(|cell| !cell.is_empty()).count()
    }

    /// Whether every cell is occupied.
    pub fn is_full(&self) -> bool {
        self.0.iter().all(|cell| !cell.is_empty())
    }

    /// Return a new board with `mv` applied.
    ///
    /// Only the placement rule is checked here; turn order and terminal
    /// state belong to [`GameSession`](crate::game::session::GameSession).
    pub fn apply(&self, mv: Move) -> Result<Self, GameError> {
        let slot = self
            .0
            .get(mv.index as usize)
            .ok_or(GameError::IllegalMove(IllegalMove::OutOfRange(mv.index)))?;

        if !slot.is_empty() {
            return Err(GameError::IllegalMove(IllegalMove::CellOccupied(mv.index)));
        }

        let mut next = *self;
        next.0[mv.index as usize] = Cell::Marked(mv.mark);
        Ok(next)
    }

    /// Evaluate this board. Always computed fresh.
    pub fn outcome(&self) -> Outcome {
        outcome_of(&self.0)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            for col in 0..3 {
                let c = match self.0[row * 3 + col] {
                    Cell::Empty => '.',
                    Cell::Marked(Mark::X) => 'X',
                    Cell::Marked(Mark::O) => 'O',
                };
                write!(f, "{}", c)?;
            }
            if row < 2 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Evaluate any slice of cells.
///
/// Fails with [`GameError::InvalidBoard`] if the slice is not exactly 9 cells.
pub fn evaluate(cells: &[Cell]) -> Result<Outcome, GameError> {
    let board = Board::from_cells(cells)?;
    Ok(board.outcome())
}

fn outcome_of(cells: &[Cell; CELL_COUNT]) -> Outcome {
    for line in LINES {
        let [a, b, c] = line;
        if let Cell::Marked(mark) = cells[a as usize] {
            if cells[b as usize] == Cell::Marked(mark) && cells[c as usize] == Cell::Marked(mark) {
                return Outcome::Win { mark, line };
            }
        }
    }

    if cells.iter().all(|cell| !cell.is_empty()) {
        Outcome::Draw
    } else {
        Outcome::InProgress
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Why a move was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IllegalMove {
    /// Target cell already holds a mark.
    #[error("cell {0} is already occupied")]
    CellOccupied(u8),

    /// Target index is not on the board.
    #[error("cell {0} is off the board")]
    OutOfRange(u8),

    /// The game has already been decided.
    #[error("game is already over")]
    GameOver,

    /// The mark moved out of turn.
    #[error("it is not {0}'s turn")]
    OutOfTurn(Mark),
}

/// Board and session errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Rule violation. Recoverable; the caller should re-prompt.
    #[error("illegal move: {0}")]
    IllegalMove(IllegalMove),

    /// Malformed board input.
    #[error("invalid board: expected 9 cells, got {0}")]
    InvalidBoard(usize),

    /// Rewind target is past the recorded history.
    #[error("ply {ply} is out of range (history has {len} boards)")]
    PlyOutOfRange {
        /// Requested ply.
        ply: usize,
        /// Number of boards in history.
        len: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn board_from(marks: &[(u8, Mark)]) -> Board {
        let mut board = Board::new();
        for &(index, mark) in marks {
            board = board.apply(Move::new(index, mark)).unwrap();
        }
        board
    }

    #[test]
    fn test_empty_board_in_progress() {
        assert_eq!(Board::new().outcome(), Outcome::InProgress);
        assert_eq!(Board::new().empty_cells().count(), 9);
    }

    #[test]
    fn test_apply_occupied_cell() {
        let board = board_from(&[(4, Mark::X)]);
        let result = board.apply(Move::new(4, Mark::O));
        assert_eq!(result, Err(GameError::IllegalMove(IllegalMove::CellOccupied(4))));
    }

    #[test]
    fn test_apply_out_of_range() {
        let result = Board::new().apply(Move::new(9, Mark::X));
        assert_eq!(result, Err(GameError::IllegalMove(IllegalMove::OutOfRange(9))));
    }

    #[test]
    fn test_apply_does_not_mutate_original() {
        let board = Board::new();
        let next = board.apply(Move::new(0, Mark::X)).unwrap();
        assert_eq!(board.filled_count(), 0);
        assert_eq!(next.get(0), Some(Cell::Marked(Mark::X)));
    }

    #[test]
    fn test_get_off_board() {
        let board = Board::new();
        assert_eq!(board.get(8), Some(Cell::Empty));
        assert_eq!(board.get(9), None);
        assert_eq!(board.get(u8::MAX), None);
    }

    #[test]
    fn test_column_win() {
        // X plays 0, 3, 6 with O on 1, 4 in between
        let board = board_from(&[
            (0, Mark::X),
            (1, Mark::O),
            (3, Mark::X),
            (4, Mark::O),
            (6, Mark::X),
        ]);
        assert_eq!(board.outcome(), Outcome::Win { mark: Mark::X, line: [0, 3, 6] });
    }

    #[test]
    fn test_anti_diagonal_win() {
        let board = board_from(&[(2, Mark::O), (4, Mark::O), (6, Mark::O)]);
        assert_eq!(board.outcome().winner(), Some(Mark::O));
    }

    #[test]
    fn test_full_board_draw() {
        // X O X
        // X O O
        // O X X
        let board = board_from(&[
            (0, Mark::X),
            (1, Mark::O),
            (2, Mark::X),
            (4, Mark::O),
            (3, Mark::X),
            (5, Mark::O),
            (7, Mark::X),
            (6, Mark::O),
            (8, Mark::X),
        ]);
        assert!(board.is_full());
        assert_eq!(board.outcome(), Outcome::Draw);
    }

    #[test]
    fn test_evaluate_rejects_wrong_length() {
        assert_eq!(evaluate(&[Cell::Empty; 8]), Err(GameError::InvalidBoard(8)));
        assert_eq!(evaluate(&[Cell::Empty; 10]), Err(GameError::InvalidBoard(10)));
        assert_eq!(evaluate(&[]), Err(GameError::InvalidBoard(0)));
    }

    #[test]
    fn test_evaluate_slice() {
        let mut cells = vec![Cell::Empty; 9];
        cells[2] = Cell::Marked(Mark::X);
        cells[5] = Cell::Marked(Mark::X);
        cells[8] = Cell::Marked(Mark::X);
        assert_eq!(evaluate(&cells), Ok(Outcome::Win { mark: Mark::X, line: [2, 5, 8] }));
    }

    #[test]
    fn test_cell_json() {
        let board = board_from(&[(0, Mark::X), (8, Mark::O)]);
        let json = serde_json::to_string(&board).unwrap();
        assert_eq!(json, r#"["X",null,null,null,null,null,null,null,"O"]"#);
        let parsed: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, board);
    }

    #[test]
    fn test_display() {
        let board = board_from(&[(0, Mark::X), (4, Mark::O)]);
        assert_eq!(board.to_string(), "X..\n.O.\n...");
    }

    fn arb_cell() -> impl Strategy<Value = Cell> {
        prop_oneof![
            Just(Cell::Empty),
            Just(Cell::Marked(Mark::X)),
            Just(Cell::Marked(Mark::O)),
        ]
    }

    proptest! {
        #[test]
        fn prop_evaluate_is_deterministic(cells in proptest::collection::vec(arb_cell(), 9)) {
            let before = cells.clone();
            let first = evaluate(&cells).unwrap();
            let second = evaluate(&cells).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(cells, before);
        }

        #[test]
        fn prop_apply_changes_exactly_one_cell(
            cells in proptest::collection::vec(arb_cell(), 9),
            index in 0u8..9,
        ) {
            let board = Board::from_cells(&cells).unwrap();
            match board.apply(Move::new(index, Mark::X)) {
                Ok(next) => {
                    let diff = board.cells().iter().zip(next.cells()).filter(|(a, b)| a != b).count();
                    prop_assert_eq!(diff, 1);
                    prop_assert_eq!(next.filled_count(), board.filled_count() + 1);
                }
                Err(e) => prop_assert_eq!(e, GameError::IllegalMove(IllegalMove::CellOccupied(index))),
            }
        }
    }
}
