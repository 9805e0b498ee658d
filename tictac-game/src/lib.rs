//! Two-player tic-tac-toe staked on a Bitcoin contract output.
//!
//! Every confirmed move spends the current contract output and either
//! re-locks the stake under the next board state or pays it out.

pub mod board;
pub mod builder;
pub mod contract;
pub mod error;
pub mod history;
pub mod outcome;
pub mod registry;
pub mod session;
pub mod settlement;

pub use board::{Board, Cell, Player, CELLS};
pub use builder::{TxBuilder, UnsignedMove};
pub use contract::{Continuation, ContractState, LockedOutput, Participants};
pub use error::{GameError, HistoryError, MoveError, Result};
pub use history::{GameHistory, PendingMove};
pub use outcome::{evaluate, Outcome, WINNING_LINES};
pub use registry::GameRegistry;
pub use session::{GameInfo, GameSession, GameStatus, MoveReceipt, PreparedMove};
pub use settlement::{Payout, SettlementPlan};

use bitcoin::OutPoint;
use tictac_core::{Amount, GameConfig};
use uuid::Uuid;

/// Create a session for a contract output that was just deployed with `stake`.
pub fn create_game(
    participants: Participants,
    deploy: OutPoint,
    stake: Amount,
    config: GameConfig,
) -> Result<GameSession> {
    GameSession::new(Uuid::new_v4(), participants, deploy, stake, config)
}
