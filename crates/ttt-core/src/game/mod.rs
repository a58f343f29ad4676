//! Game domain: the tic-tac-toe board and its win/draw rules.

pub mod board;

pub use board::{Board, Cell, Symbol, CELL_COUNT};
