//! The 9-cell tic-tac-toe board and win/draw detection.
//!
//! On the wire the board is a JSON array of nine one-character strings
//! (`" "`, `"X"`, `"O"`) in row-major order, which is also how the client
//! renders it.

use std::fmt;

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

/// The 8 cell triplets that decide a game: 3 rows, 3 columns, 2 diagonals.
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

// ── Symbols and cells ─────────────────────────────────────────────────────────

/// A player's mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    pub fn as_str(self) -> &'static str {
        match self {
            Symbol::X => "X",
            Symbol::O => "O",
        }
    }

    /// The other player's mark.
    pub fn opponent(self) -> Symbol {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, ()> {
        match value {
            "X" => Ok(Symbol::X),
            "O" => Ok(Symbol::O),
            _ => Err(()),
        }
    }
}

/// One board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Taken(Symbol),
}

impl Cell {
    /// The one-character wire token for this cell.
    pub fn as_wire_str(self) -> &'static str {
        match self {
            Cell::Empty => " ",
            Cell::Taken(symbol) => symbol.as_str(),
        }
    }

    fn from_wire_str(token: &str) -> Option<Cell> {
        match token {
            " " => Some(Cell::Empty),
            "X" => Some(Cell::Taken(Symbol::X)),
            "O" => Some(Cell::Taken(Symbol::O)),
            _ => None,
        }
    }

    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }
}

// ── Board ─────────────────────────────────────────────────────────────────────

/// The tic-tac-toe board.
///
/// Strict turn alternation is enforced by the server synchronizer, not here;
/// the board itself only knows geometry and the winning lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Board {
    cells: [Cell; CELL_COUNT],
}

impl Board {
    /// A fresh, empty board.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    pub fn cells(&self) -> &[Cell; CELL_COUNT] {
        &self.cells
    }

    /// Writes `symbol` into `index`.
    ///
    /// Returns `false` when the index is outside the board. An occupied cell
    /// is overwritten; move legality is the caller's concern.
    pub fn place(&mut self, index: usize, symbol: Symbol) -> bool {
        match self.cells.get_mut(index) {
            Some(cell) => {
                *cell = Cell::Taken(symbol);
                true
            }
            None => false,
        }
    }

    /// True when `symbol` holds one of the eight winning lines.
    pub fn has_winning_line(&self, symbol: Symbol) -> bool {
        WINNING_LINES
            .iter()
            .any(|line| line.iter().all(|&i| self.cells[i] == Cell::Taken(symbol)))
    }

    pub fn has_empty_cell(&self) -> bool {
        self.cells.iter().any(|cell| cell.is_empty())
    }

    pub fn is_full(&self) -> bool {
        !self.has_empty_cell()
    }

    /// Indices of all empty cells, in board order.
    pub fn empty_cells(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_empty())
            .map(|(index, _)| index)
            .collect()
    }
}

impl Serialize for Board {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;

        let mut seq = serializer.serialize_seq(Some(CELL_COUNT))?;
        for cell in &self.cells {
            seq.serialize_element(cell.as_wire_str())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Board {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Vec<String> = Vec::deserialize(deserializer)?;
        if raw.len() != CELL_COUNT {
            return Err(de::Error::invalid_length(raw.len(), &"a 9-cell board"));
        }
        let mut cells = [Cell::Empty; CELL_COUNT];
        for (index, token) in raw.iter().enumerate() {
            cells[index] = Cell::from_wire_str(token)
                .ok_or_else(|| de::Error::custom(format!("unknown cell token {token:?}")))?;
        }
        Ok(Board { cells })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
