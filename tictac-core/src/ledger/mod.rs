use crate::config::FeePolicy;
use crate::error::{CoreError, Result};
use crate::types::FundingUtxo;

use bitcoin::{Address, Amount, Network, OutPoint, PublicKey, ScriptBuf, Transaction};
use std::str::FromStr;

/// Pay-to-pubkey-hash script over `hash160(pubkey)`.
pub fn p2pkh_script(pubkey: &PublicKey) -> ScriptBuf {
    ScriptBuf::new_p2pkh(&pubkey.pubkey_hash())
}

/// Parses a hex public key. Only the 33-byte compressed form is accepted.
pub fn parse_pubkey(hex_key: &str) -> Result<PublicKey> {
    let key = PublicKey::from_str(hex_key)
        .map_err(|e| CoreError::bitcoin(format!("Invalid public key: {}", e)))?;
    if !key.compressed {
        return Err(CoreError::bitcoin("Public key must be compressed"));
    }
    Ok(key)
}

/// Parses an address and checks it belongs to `network`.
pub fn parse_address(s: &str, network: Network) -> Result<Address> {
    Address::from_str(s)
        .map_err(|e| CoreError::InvalidAddress(format!("'{}': {}", s, e)))?
        .require_network(network)
        .map_err(|e| CoreError::InvalidAddress(format!("'{}': {}", s, e)))
}

/// Parses `txid:vout`.
pub fn parse_outpoint(s: &str) -> Result<OutPoint> {
    OutPoint::from_str(s).map_err(|e| CoreError::bitcoin(format!("Invalid outpoint '{}': {}", s, e)))
}

/// Parses a funding UTXO given as `txid:vout:sats`, paying to `script_pubkey`.
pub fn parse_funding(s: &str, script_pubkey: &ScriptBuf) -> Result<FundingUtxo> {
    let (outpoint, sats) = s
        .rsplit_once(':')
        .ok_or_else(|| CoreError::bitcoin(format!("Expected txid:vout:sats, got '{}'", s)))?;
    let sats = sats
        .parse::<u64>()
        .map_err(|e| CoreError::bitcoin(format!("Invalid amount in '{}': {}", s, e)))?;

    Ok(FundingUtxo {
        outpoint: parse_outpoint(outpoint)?,
        amount: Amount::from_sat(sats),
        script_pubkey: script_pubkey.clone(),
    })
}

pub fn total_funding(utxos: &[FundingUtxo]) -> Result<Amount> {
    utxos.iter().try_fold(Amount::ZERO, |acc, utxo| {
        acc.checked_add(utxo.amount)
            .ok_or_else(|| CoreError::internal("Funding total overflows"))
    })
}

pub fn total_output(tx: &Transaction) -> Result<Amount> {
    tx.output.iter().try_fold(Amount::ZERO, |acc, out| {
        acc.checked_add(out.value)
            .ok_or_else(|| CoreError::internal("Output total overflows"))
    })
}

/// Estimated signed size: the unsigned serialization plus the unlocking
/// script allowances the policy reserves per input.
pub fn estimate_signed_size(tx: &Transaction, contract_inputs: usize, policy: &FeePolicy) -> usize {
    let funding_inputs = tx.input.len().saturating_sub(contract_inputs);
    tx.total_size()
        + contract_inputs * policy.contract_unlock_allowance
        + funding_inputs * policy.funding_unlock_allowance
}

pub fn tx_hex(tx: &Transaction) -> String {
    bitcoin::consensus::encode::serialize_hex(tx)
}
