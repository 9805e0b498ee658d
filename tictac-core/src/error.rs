use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Bitcoin error: {0}")]
    Bitcoin(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Insufficient funds: need {need}, have {available}")]
    InsufficientFunds { need: u64, available: u64 },

    #[error("Game not found: {id}")]
    GameNotFound { id: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Broadcast error: {0}")]
    Broadcast(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn bitcoin(msg: impl Into<String>) -> Self {
        Self::Bitcoin(msg.into())
    }

    pub fn signer(msg: impl Into<String>) -> Self {
        Self::Signer(msg.into())
    }

    pub fn broadcast(msg: impl Into<String>) -> Self {
        Self::Broadcast(msg.into())
    }
}
