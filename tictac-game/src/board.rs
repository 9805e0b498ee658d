use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const CELLS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    Alice,
    Bob,
}

impl Player {
    /// Player who moves at `step`; Alice opens.
    pub fn for_step(step: usize) -> Self {
        if step % 2 == 0 {
            Player::Alice
        } else {
            Player::Bob
        }
    }

    pub fn other(self) -> Self {
        match self {
            Player::Alice => Player::Bob,
            Player::Bob => Player::Alice,
        }
    }

    pub fn mark(self) -> char {
        match self {
            Player::Alice => 'X',
            Player::Bob => 'O',
        }
    }

    /// Encoding inside the contract state.
    pub fn state_byte(self) -> u8 {
        match self {
            Player::Alice => 1,
            Player::Bob => 2,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::Alice => write!(f, "Alice"),
            Player::Bob => write!(f, "Bob"),
        }
    }
}

impl FromStr for Player {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Alice" | "alice" | "X" => Ok(Player::Alice),
            "Bob" | "bob" | "O" => Ok(Player::Bob),
            other => Err(format!("Unknown player: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Empty,
    Marked {
        player: Player,
        /// Index of the snapshot that introduced this mark.
        move_index: u8,
        /// Confirmed transaction that recorded the mark.
        txid: Option<Txid>,
    },
}

impl Cell {
    pub fn player(&self) -> Option<Player> {
        match self {
            Cell::Empty => None,
            Cell::Marked { player, .. } => Some(*player),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn state_byte(&self) -> u8 {
        self.player().map_or(0, Player::state_byte)
    }
}

/// One immutable board snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Board([Cell; CELLS]);

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<Cell> {
        self.0.get(index).copied()
    }

    pub fn cells(&self) -> &[Cell; CELLS] {
        &self.0
    }

    pub fn is_full(&self) -> bool {
        self.0.iter().all(|c| !c.is_empty())
    }

    pub fn occupied(&self) -> usize {
        self.0.iter().filter(|c| !c.is_empty()).count()
    }

    pub fn marks_of(&self, player: Player) -> usize {
        self.0
            .iter()
            .filter(|c| c.player() == Some(player))
            .count()
    }

    pub fn state_bytes(&self) -> [u8; CELLS] {
        self.0.map(|c| c.state_byte())
    }

    /// Copy of this board with `index` marked. Callers check the cell is empty.
    pub(crate) fn with_mark(&self, index: usize, player: Player, move_index: u8) -> Board {
        let mut cells = self.0;
        cells[index] = Cell::Marked {
            player,
            move_index,
            txid: None,
        };
        Board(cells)
    }

    pub(crate) fn with_txid(&self, index: usize, confirmed: Txid) -> Board {
        let mut cells = self.0;
        if let Cell::Marked { txid, .. } = &mut cells[index] {
            *txid = Some(confirmed);
        }
        Board(cells)
    }

    /// Cells that are set here but empty in `earlier`.
    pub fn added_since(&self, earlier: &Board) -> Vec<usize> {
        (0..CELLS)
            .filter(|&i| earlier.0[i].is_empty() && !self.0[i].is_empty())
            .collect()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.0.chunks(3) {
            let line: String = row
                .iter()
                .map(|c| c.player().map_or('.', Player::mark))
                .collect();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a board from a 9-char pattern of `X`, `O` and `.`, numbering
    /// marks in reading order.
    pub(crate) fn board(pattern: &str) -> Board {
        let mut board = Board::new();
        for (i, ch) in pattern.chars().enumerate() {
            let player = match ch {
                'X' => Player::Alice,
                'O' => Player::Bob,
                _ => continue,
            };
            board = board.with_mark(i, player, board.occupied() as u8 + 1);
        }
        board
    }

    #[test]
    fn test_with_mark_is_copy_on_write() {
        let empty = Board::new();
        let next = empty.with_mark(4, Player::Alice, 1);

        assert!(empty.get(4).unwrap().is_empty());
        assert_eq!(next.get(4).unwrap().player(), Some(Player::Alice));
        assert_eq!(next.added_since(&empty), vec![4]);
    }

    #[test]
    fn test_counts_and_fullness() {
        let b = board("XOXOXOOXO");
        assert!(b.is_full());
        assert_eq!(b.marks_of(Player::Alice), 4);
        assert_eq!(b.marks_of(Player::Bob), 5);
        assert!(!board("XO.......").is_full());
    }

    #[test]
    fn test_state_bytes_and_display() {
        let b = board("X...O...X");
        assert_eq!(b.state_bytes(), [1, 0, 0, 0, 2, 0, 0, 0, 1]);
        assert_eq!(b.to_string(), "X..\n.O.\n..X\n");
    }

    #[test]
    fn test_player_parsing() {
        assert_eq!("Alice".parse::<Player>().unwrap(), Player::Alice);
        assert_eq!("O".parse::<Player>().unwrap(), Player::Bob);
        assert!("Carol".parse::<Player>().is_err());
        assert_eq!(Player::for_step(3), Player::Bob);
    }
}
