use bitcoin::{Amount, OutPoint, ScriptBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A wallet UTXO used to pay the fee of a move transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingUtxo {
    pub outpoint: OutPoint,
    pub amount: Amount,
    pub script_pubkey: ScriptBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub alice: String, // hex pubkey
    pub bob: String,   // hex pubkey
    pub config: String,
    pub started: bool,
    pub deploy_outpoint: String,
    pub stake: u64,
    pub created_at: DateTime<Utc>,
}

/// A confirmed move. Only moves whose transaction was accepted are recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub game_id: String,
    pub step: u32,
    pub cell: u8,
    pub player: String,
    pub txid: String,
    pub created_at: DateTime<Utc>,
}

/// A move whose unsigned transaction was handed out but not yet confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMoveRecord {
    pub game_id: String,
    pub step: u32,
    pub cell: u8,
    pub raw_tx: String,
    pub created_at: DateTime<Utc>,
}
