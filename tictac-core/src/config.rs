use crate::error::{CoreError, Result};
use bitcoin::{Amount, Network};
use serde::{Deserialize, Serialize};

/// Opaque compiled contract code. The core prepends it to the embedded state
/// when deriving a locking script and never looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCode(Vec<u8>);

impl ContractCode {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(code: &str) -> Result<Self> {
        let bytes = hex::decode(code)
            .map_err(|e| CoreError::config(format!("Invalid contract code hex: {}", e)))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 1000 sat/vB.
pub const MAX_SAT_PER_KB: u64 = 1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub network: Network,
    pub fee_policy: FeePolicy,
    pub contract_code: String, // hex
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeePolicy {
    pub sat_per_kb: u64,
    pub min_fee: u64,
    /// Bytes reserved for the unlocking script of the contract input.
    pub contract_unlock_allowance: usize,
    /// Bytes reserved for a P2PKH signature + pubkey per funding input.
    pub funding_unlock_allowance: usize,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            sat_per_kb: 50,
            min_fee: 135,
            contract_unlock_allowance: 1_500,
            funding_unlock_allowance: 107,
        }
    }
}

impl FeePolicy {
    /// Fee for a transaction of `size` bytes, rounded up and floored at `min_fee`.
    pub fn fee_for(&self, size: usize) -> Amount {
        let rate_fee = (size as u64).saturating_mul(self.sat_per_kb).div_ceil(1000);
        Amount::from_sat(rate_fee.max(self.min_fee))
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            network: Network::Regtest,
            fee_policy: FeePolicy::default(),
            contract_code: "61".to_string(), // OP_NOP placeholder
        }
    }
}

impl GameConfig {
    pub fn new(network: Network) -> Self {
        let mut config = Self::default();
        config.network = network;
        config
    }

    pub fn with_contract_code(mut self, code_hex: impl Into<String>) -> Self {
        self.contract_code = code_hex.into();
        self
    }

    pub fn contract_code(&self) -> Result<ContractCode> {
        ContractCode::from_hex(&self.contract_code)
    }

    pub fn validate(&self) -> Result<()> {
        if self.contract_code()?.is_empty() {
            return Err(CoreError::config("Contract code cannot be empty"));
        }

        if self.fee_policy.sat_per_kb == 0 {
            return Err(CoreError::config("Fee rate must be greater than 0"));
        }

        if self.fee_policy.sat_per_kb > MAX_SAT_PER_KB {
            return Err(CoreError::config(format!(
                "Fee rate {} sat/kB exceeds the maximum of {}",
                self.fee_policy.sat_per_kb, MAX_SAT_PER_KB
            )));
        }

        Ok(())
    }
}
