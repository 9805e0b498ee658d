use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tictac_core::{CoreError, FeePolicy, GameConfig};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub data_dir: PathBuf,
    pub default_network: String,
    pub contract_code: Option<String>,
    pub fee_policy: FeePolicy,
    pub verbose: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tictactoe"),
            default_network: "regtest".to_string(),
            contract_code: None,
            fee_policy: FeePolicy::default(),
            verbose: false,
        }
    }
}

impl CliConfig {
    /// Reads `config.json` from the data directory, falling back to defaults.
    pub async fn load(data_dir: &Path) -> Result<Self, CoreError> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self {
                data_dir: data_dir.to_path_buf(),
                ..Self::default()
            });
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let mut config: CliConfig = serde_json::from_str(&content)?;
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    /// Game settings for a new game, command line flags taking precedence.
    pub fn game_config(
        &self,
        network: Option<&str>,
        contract_code: Option<String>,
    ) -> Result<GameConfig, CoreError> {
        let network = Network::from_str(network.unwrap_or(&self.default_network))
            .map_err(|e| CoreError::config(format!("Invalid network: {}", e)))?;

        let mut config = GameConfig::new(network);
        config.fee_policy = self.fee_policy.clone();
        if let Some(code) = contract_code.or_else(|| self.contract_code.clone()) {
            config = config.with_contract_code(code);
        }
        config.validate()?;
        Ok(config)
    }
}
