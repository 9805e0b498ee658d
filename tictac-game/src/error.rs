use bitcoin::Amount;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GameError>;

/// Rejections of a single move. None of them change any state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    #[error("Game has not been started")]
    NotStarted,

    #[error("Game is over")]
    GameOver,

    #[error("Cell {0} is occupied or out of range")]
    IllegalCell(usize),
}

/// First invariant violation found while auditing a history.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("History must begin with an empty board")]
    NonEmptyStart,

    #[error("Snapshot {step} does not add exactly one mark to its predecessor")]
    NotSingleMove { step: usize },

    #[error("Snapshot {step} was marked by the wrong player")]
    WrongMover { step: usize },

    #[error("Snapshot {step} carries move index {found}")]
    BadMoveIndex { step: usize, found: u8 },

    #[error("Snapshot {step} follows a finished game")]
    MoveAfterEnd { step: usize },

    #[error("Board fullness disagrees with history length {len}")]
    LengthMismatch { len: usize },

    #[error("Step pointer {step} is outside a history of {len} snapshots")]
    StepOutOfRange { step: usize, len: usize },
}

#[derive(Error, Debug)]
pub enum GameError {
    #[error("Core error: {0}")]
    Core(#[from] tictac_core::CoreError),

    #[error("Move rejected: {0}")]
    Move(#[from] MoveError),

    #[error("Corrupt history: {0}")]
    History(#[from] HistoryError),

    #[error("Settlement imbalance: allocated {allocated}, locked {locked}")]
    SettlementImbalance { allocated: Amount, locked: Amount },

    #[error("External signing failed: {0}")]
    ExternalSigning(String),

    #[error("Stake {0} exceeds the maximum money supply")]
    StakeTooLarge(Amount),

    #[error("Game is already settled")]
    AlreadySettled,

    #[error("History is rewound to step {step}; moves are only accepted at the latest step")]
    Rewound { step: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GameError {
    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalSigning(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
