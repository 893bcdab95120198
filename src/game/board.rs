use serde::{Deserialize, Serialize};
use std::fmt;

pub const BOARD_CELLS: usize = 9;

// Rows, columns, diagonals; checked in this order on every application
const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    pub fn opponent(self) -> Symbol {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::X => f.write_str("X"),
            Symbol::O => f.write_str("O"),
        }
    }
}

/// How a round ended; on the wire as "X", "O" or "draw"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Outcome {
    Win(Symbol),
    Draw,
}

impl TryFrom<String> for Outcome {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "X" => Ok(Outcome::Win(Symbol::X)),
            "O" => Ok(Outcome::Win(Symbol::O)),
            "draw" => Ok(Outcome::Draw),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

impl From<Outcome> for String {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Win(symbol) => symbol.to_string(),
            Outcome::Draw => "draw".to_string(),
        }
    }
}

/// Tic-tac-toe board state, identical on both peers given the same move stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub cells: [Option<Symbol>; BOARD_CELLS],
    /// Whose turn the UI should allow next (X opens every round)
    pub current: Symbol,
    pub outcome: Option<Outcome>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            cells: [None; BOARD_CELLS],
            current: Symbol::X,
            outcome: None,
        }
    }

    /// Clear the board for a new round
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Local gating: is this a legal move for `symbol` right now
    pub fn can_play(&self, position: usize, symbol: Symbol) -> bool {
        position < BOARD_CELLS
            && self.outcome.is_none()
            && self.current == symbol
            && self.cells[position].is_none()
    }

    /// Apply a move without legality checks and return the outcome if the round ended
    ///
    /// Out-of-range positions are ignored. Once the round has an outcome it is
    /// kept; later moves still land on the board but do not change the result.
    pub fn apply(&mut self, position: usize, symbol: Symbol) -> Option<Outcome> {
        if position >= BOARD_CELLS {
            return self.outcome;
        }
        self.cells[position] = Some(symbol);
        self.current = symbol.opponent();
        if self.outcome.is_none() {
            self.outcome = self.evaluate();
        }
        self.outcome
    }

    /// Deterministic end check: first complete line wins, else full board draws
    pub fn evaluate(&self) -> Option<Outcome> {
        for [a, b, c] in WINNING_LINES {
            if let Some(symbol) = self.cells[a] {
                if self.cells[b] == Some(symbol) && self.cells[c] == Some(symbol) {
                    return Some(Outcome::Win(symbol));
                }
            }
        }
        if self.cells.iter().all(Option::is_some) {
            return Some(Outcome::Draw);
        }
        None
    }

    /// Adopt a result announced by the peer if this side has not concluded
    pub fn conclude(&mut self, outcome: Outcome) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }
}
