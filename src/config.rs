//! Runtime configuration: defaults, then `peg.toml`, then `PEG_*` environment variables

use crate::constants::*;
use crate::error::{Result, PegError};
use crate::network::Network;
use crate::types::*;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    /// RPC username for basic auth
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    /// Satoshis locked in the redemption script
    pub funding_amount: Integer,
    pub funding_fee: Integer,
    pub claim_fee: Integer,
    /// Blocks mined to the sender before its first coinbase is spendable
    pub maturity_blocks: u32,
    /// Blocks mined after each submission
    pub confirm_blocks: u32,
    /// Data carried in the redemption script, hex encoded
    pub payload_hex: String,
}

impl FlowConfig {
    pub fn payload(&self) -> Result<ByteString> {
        hex::decode(&self.payload_hex)
            .map_err(|e| PegError::Serialization(format!("invalid payload hex: {}", e)))
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            funding_amount: DEFAULT_FUNDING_AMOUNT,
            funding_fee: FUNDING_FEE,
            claim_fee: CLAIM_FEE,
            maturity_blocks: (COINBASE_MATURITY + 1) as u32,
            confirm_blocks: 5,
            payload_hex: hex::encode([0u8; 20]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PegConfig {
    pub network: Network,
    pub rpc: RpcConfig,
    pub flow: FlowConfig,
}

impl PegConfig {
    pub fn load() -> std::result::Result<Self, ConfigError> {
        // PEG_RPC__URL -> rpc.url
        Self::load_with(Environment::with_prefix("PEG").prefix_separator("_").separator("__"))
    }

    /// Defaults, then `peg.toml` if present, then `env`.
    ///
    /// Environment values stay strings so hex payloads and passwords keep
    /// their leading zeros; numeric fields are parsed on deserialization.
    pub fn load_with(env: Environment) -> std::result::Result<Self, ConfigError> {
        let peg_config: PegConfig = Self::defaults()?
            .add_source(File::with_name("peg").required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;
        peg_config.validate()?;
        Ok(peg_config)
    }

    /// Defaults overlaid with a TOML document
    pub fn from_toml_str(toml: &str) -> std::result::Result<Self, ConfigError> {
        let peg_config: PegConfig = Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        peg_config.validate()?;
        Ok(peg_config)
    }

    fn defaults() -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
        let flow = FlowConfig::default();
        Config::builder()
            .set_default("network", "regtest")?
            .set_default("rpc.url", "http://127.0.0.1:18443")?
            .set_default("rpc.user", Option::<String>::None)?
            .set_default("rpc.password", Option::<String>::None)?
            .set_default("flow.funding_amount", flow.funding_amount)?
            .set_default("flow.funding_fee", flow.funding_fee)?
            .set_default("flow.claim_fee", flow.claim_fee)?
            .set_default("flow.maturity_blocks", flow.maturity_blocks)?
            .set_default("flow.confirm_blocks", flow.confirm_blocks)?
            .set_default("flow.payload_hex", flow.payload_hex)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.flow.payload().is_err() {
            return Err(ConfigError::Message("flow.payload_hex must be valid hex".to_string()));
        }
        if self.flow.funding_amount <= 0 || self.flow.funding_fee < 0 || self.flow.claim_fee < 0 {
            return Err(ConfigError::Message("flow amounts must not be negative".to_string()));
        }
        if self.flow.claim_fee > self.flow.funding_amount {
            return Err(ConfigError::Message(
                "flow.claim_fee cannot exceed flow.funding_amount".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PegConfig::from_toml_str("").unwrap();
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.rpc.url, "http://127.0.0.1:18443");
        assert!(config.rpc.user.is_none());
        assert_eq!(config.flow.funding_amount, 100_000_000);
        assert_eq!(config.flow.funding_fee, 10_000);
        assert_eq!(config.flow.claim_fee, 936);
        assert_eq!(config.flow.maturity_blocks, 101);
        assert_eq!(config.flow.payload().unwrap(), vec![0u8; 20]);
    }

    #[test]
    fn test_toml_overrides() {
        let config = PegConfig::from_toml_str(
            r#"
            network = "testnet"

            [rpc]
            url = "http://node:18332"
            user = "alice"
            password = "secret"

            [flow]
            funding_amount = 5000000
            payload_hex = "deadbeef"
            "#,
        ).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.rpc.user.as_deref(), Some("alice"));
        assert_eq!(config.flow.funding_amount, 5_000_000);
        assert_eq!(config.flow.claim_fee, 936);
        assert_eq!(config.flow.payload().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    fn peg_env(vars: &[(&str, &str)]) -> Environment {
        let map: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix("PEG")
            .prefix_separator("_")
            .separator("__")
            .source(Some(map))
    }

    #[test]
    fn test_env_keeps_string_values_verbatim() {
        let zeros = "0".repeat(40);
        let config = PegConfig::load_with(peg_env(&[
            ("PEG_FLOW__PAYLOAD_HEX", zeros.as_str()),
            ("PEG_RPC__USER", "007"),
            ("PEG_RPC__PASSWORD", "0123"),
        ])).unwrap();
        assert_eq!(config.flow.payload_hex, zeros);
        assert_eq!(config.flow.payload().unwrap(), vec![0u8; 20]);
        assert_eq!(config.rpc.user.as_deref(), Some("007"));
        assert_eq!(config.rpc.password.as_deref(), Some("0123"));
    }

    #[test]
    fn test_env_numbers_and_network() {
        let config = PegConfig::load_with(peg_env(&[
            ("PEG_NETWORK", "testnet"),
            ("PEG_RPC__URL", "http://node:18332"),
            ("PEG_FLOW__FUNDING_AMOUNT", "250000"),
            ("PEG_FLOW__CONFIRM_BLOCKS", "2"),
        ])).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.rpc.url, "http://node:18332");
        assert_eq!(config.flow.funding_amount, 250_000);
        assert_eq!(config.flow.confirm_blocks, 2);
        assert_eq!(config.flow.claim_fee, 936);
    }

    #[test]
    fn test_rejects_bad_payload() {
        assert!(PegConfig::from_toml_str("[flow]\npayload_hex = \"zz\"").is_err());
    }

    #[test]
    fn test_rejects_unknown_network() {
        assert!(PegConfig::from_toml_str("network = \"signet\"").is_err());
    }
}
