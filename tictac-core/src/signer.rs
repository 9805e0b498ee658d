//! Capabilities the game pipeline borrows from the outside world.
//!
//! Key material, signing and broadcast all live behind these traits; the
//! core only asks for an address, fee-funding coins and signatures.

use crate::error::Result;
use crate::types::FundingUtxo;

use async_trait::async_trait;
use bitcoin::{Address, PublicKey, Transaction, Txid};
use serde::{Deserialize, Serialize};

/// One candidate signature returned by a signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub input_index: usize,
    pub pubkey: PublicKey,
    pub signature: Vec<u8>,
}

/// Picks the signature that authorizes a move out of a set of candidates.
pub trait SignatureSelector: Send + Sync {
    fn select(
        &self,
        pubkey: &PublicKey,
        candidates: &[SignatureResponse],
    ) -> Option<SignatureResponse>;
}

/// Selects the first candidate signed by the requested key.
#[derive(Debug, Default, Clone, Copy)]
pub struct FindSig;

impl SignatureSelector for FindSig {
    fn select(
        &self,
        pubkey: &PublicKey,
        candidates: &[SignatureResponse],
    ) -> Option<SignatureResponse> {
        candidates.iter().find(|c| &c.pubkey == pubkey).cloned()
    }
}

#[async_trait]
pub trait Signer: Send + Sync {
    /// Address that receives change from every move transaction.
    async fn default_address(&self) -> Result<Address>;

    /// Coins available to pay the transaction fee.
    async fn funding_utxos(&self) -> Result<Vec<FundingUtxo>>;

    /// Signs `input_index` of `tx` with every key the signer holds.
    async fn sign_move(
        &self,
        tx: &Transaction,
        input_index: usize,
    ) -> Result<Vec<SignatureResponse>>;
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Completes the unlocking script with `authorization` and publishes the
    /// transaction, returning its identifier.
    async fn broadcast(
        &self,
        tx: &Transaction,
        authorization: &SignatureResponse,
    ) -> Result<Txid>;
}
