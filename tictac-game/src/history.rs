use crate::board::{Board, Cell, Player, CELLS};
use crate::error::{HistoryError, MoveError};
use crate::outcome::{evaluate, Outcome};
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

/// Append-only sequence of board snapshots. Snapshot 0 is the empty board.
///
/// Every operation returns a new history; an existing value is never
/// modified, so a caller can hold on to the last confirmed history while a
/// tentative one is out for signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameHistory {
    snapshots: Vec<Board>,
    current_step: usize,
    started: bool,
}

impl Default for GameHistory {
    fn default() -> Self {
        Self {
            snapshots: vec![Board::new()],
            current_step: 0,
            started: false,
        }
    }
}

impl GameHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Self {
        Self {
            started: true,
            ..self.clone()
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn snapshots(&self) -> &[Board] {
        &self.snapshots
    }

    /// Number of snapshots, including the empty starting board.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    pub fn has_no_moves(&self) -> bool {
        self.snapshots.len() == 1
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn latest_step(&self) -> usize {
        self.snapshots.len() - 1
    }

    pub fn is_rewound(&self) -> bool {
        self.current_step != self.latest_step()
    }

    pub fn current(&self) -> &Board {
        &self.snapshots[self.current_step]
    }

    pub fn outcome(&self) -> Outcome {
        evaluate(self.current())
    }

    pub fn is_over(&self) -> bool {
        self.outcome().is_won() || self.current().is_full()
    }

    /// Player to move at the current step, derived from step parity.
    pub fn mover(&self) -> Player {
        Player::for_step(self.current_step)
    }

    /// Turn indicator for display: frozen on the winner once the game is won.
    pub fn turn(&self) -> Player {
        self.outcome().winner.unwrap_or_else(|| self.mover())
    }

    /// History viewed at an earlier (or the latest) step.
    pub fn jump_to(&self, step: usize) -> Result<Self, HistoryError> {
        if step >= self.snapshots.len() {
            return Err(HistoryError::StepOutOfRange {
                step,
                len: self.snapshots.len(),
            });
        }

        Ok(Self {
            current_step: step,
            ..self.clone()
        })
    }

    /// Tentatively play `cell` for the player whose turn it is.
    ///
    /// Snapshots after the current step are dropped from the returned
    /// history, then the new snapshot is appended and the step advanced.
    pub fn apply_move(&self, cell: usize) -> Result<PendingMove, MoveError> {
        if !self.started {
            return Err(MoveError::NotStarted);
        }

        if self.is_over() {
            return Err(MoveError::GameOver);
        }

        let current = self.current();
        if !current.get(cell).is_some_and(|c| c.is_empty()) {
            return Err(MoveError::IllegalCell(cell));
        }

        let mover = self.mover();
        let move_index = (self.current_step + 1) as u8;
        let next = current.with_mark(cell, mover, move_index);

        let mut snapshots = self.snapshots[..=self.current_step].to_vec();
        snapshots.push(next);

        Ok(PendingMove {
            history: Self {
                snapshots,
                current_step: self.current_step + 1,
                started: true,
            },
            cell,
            mover,
        })
    }

    /// Replays the history and reports the first broken invariant.
    pub fn audit(&self) -> Result<(), HistoryError> {
        let len = self.snapshots.len();
        if self.current_step >= len {
            return Err(HistoryError::StepOutOfRange {
                step: self.current_step,
                len,
            });
        }

        if self.snapshots[0] != Board::new() {
            return Err(HistoryError::NonEmptyStart);
        }

        for (step, pair) in self.snapshots.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            let index = step + 1;

            if evaluate(prev).is_won() || prev.is_full() {
                return Err(HistoryError::MoveAfterEnd { step: index });
            }

            let added = next.added_since(prev);
            let kept = (0..CELLS)
                .filter(|&i| !prev.cells()[i].is_empty())
                .all(|i| prev.cells()[i].player() == next.cells()[i].player());
            if added.len() != 1 || !kept || next.occupied() != prev.occupied() + 1 {
                return Err(HistoryError::NotSingleMove { step: index });
            }

            match next.cells()[added[0]] {
                Cell::Marked {
                    player, move_index, ..
                } => {
                    if player != Player::for_step(step) {
                        return Err(HistoryError::WrongMover { step: index });
                    }
                    if move_index as usize != index {
                        return Err(HistoryError::BadMoveIndex {
                            step: index,
                            found: move_index,
                        });
                    }
                }
                Cell::Empty => {
                    return Err(HistoryError::NotSingleMove { step: index })
                }
            }
        }

        // Fullness must agree with the length-based draw rule (9 moves + empty board)
        let last = &self.snapshots[len - 1];
        if !evaluate(last).is_won() && last.is_full() != (len == CELLS + 1) {
            return Err(HistoryError::LengthMismatch { len });
        }

        Ok(())
    }
}

/// A move that has been computed but not yet confirmed on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    history: GameHistory,
    cell: usize,
    mover: Player,
}

impl PendingMove {
    pub fn history(&self) -> &GameHistory {
        &self.history
    }

    pub fn board(&self) -> &Board {
        self.history.current()
    }

    pub fn cell(&self) -> usize {
        self.cell
    }

    pub fn mover(&self) -> Player {
        self.mover
    }

    /// Commit the move, stamping the confirmed transaction on its cell.
    pub fn confirm(self, txid: Txid) -> GameHistory {
        let mut history = self.history;
        let step = history.current_step;
        history.snapshots[step] = history.snapshots[step].with_txid(self.cell, txid);
        history
    }

    /// The move without a recorded transaction, for dry runs.
    pub fn into_history(self) -> GameHistory {
        self.history
    }
}
