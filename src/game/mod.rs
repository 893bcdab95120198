pub mod board;

pub use board::{Board, Outcome, Symbol, BOARD_CELLS};
