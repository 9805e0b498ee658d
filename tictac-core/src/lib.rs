//! tictac-core - ledger plumbing for staked two-player games
//!
//! Fee policy, script helpers, the signer and broadcaster capabilities the
//! game pipeline calls out to, and SQLite storage of games and their
//! confirmed moves.

pub mod config;
pub mod error;
pub mod ledger;
pub mod signer;
pub mod storage;
pub mod types;

pub use config::{ContractCode, FeePolicy, GameConfig};
pub use error::{CoreError, Result};
pub use signer::{Broadcaster, FindSig, SignatureResponse, SignatureSelector, Signer};
pub use storage::{GameStore, MoveStore, Storage};
pub use types::{FundingUtxo, GameRecord, MoveRecord, PendingMoveRecord};

pub use ::bitcoin::Amount;
pub use ::bitcoin::Network;
