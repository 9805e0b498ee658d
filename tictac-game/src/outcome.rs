//! Outcome evaluation over a single snapshot.

use crate::board::{Board, Player};
use serde::{Deserialize, Serialize};

/// Winning triples, checked in this order.
pub const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8], // rows
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8], // columns
    [0, 4, 8],
    [2, 4, 6], // diagonals
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Outcome {
    pub winner: Option<Player>,
    pub line: Option<[usize; 3]>,
}

impl Outcome {
    pub fn is_won(&self) -> bool {
        self.winner.is_some()
    }
}

/// First uniform, non-empty triple on the board. Fullness is not considered:
/// a draw is "no winner and `Board::is_full`".
pub fn evaluate(board: &Board) -> Outcome {
    for line in WINNING_LINES {
        let [a, b, c] = line.map(|i| board.cells()[i].player());
        if let Some(player) = a {
            if b == a && c == a {
                return Outcome {
                    winner: Some(player),
                    line: Some(line),
                };
            }
        }
    }

    Outcome::default()
}

pub fn has_won(board: &Board, player: Player) -> bool {
    WINNING_LINES
        .iter()
        .any(|line| line.iter().all(|&i| board.cells()[i].player() == Some(player)))
}
