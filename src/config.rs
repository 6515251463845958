use alloy::primitives::Address;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::str::FromStr;
use toml::map::Map;

const COMMON_CONFIG_PATH: &str = "configs/common.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeeperConfig {
    pub chain: ChainSettings,
    pub contracts: ContractAddresses,
    #[serde(default)]
    pub signer: SignerSettings,
    pub gas: GasSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub monitoring: MonitoringSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainSettings {
    pub chain_id: u64,
    pub rpc_url: String,
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractAddresses {
    pub strategy_address: String,
    /// Optional; when set it must match the address derived from the key.
    pub sender_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignerSettings {
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GasSettings {
    pub oracle_url: String,
    #[serde(default)]
    pub fallback_urls: Vec<String>,
    #[serde(default = "default_gas_tier")]
    pub tier: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_true")]
    pub refresh_each_cycle: bool,
    pub max_price_gwei: Option<f64>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_seconds: u64,
    pub max_delay_seconds: u64,
    pub backoff_multiplier: f64,
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringSettings {
    pub wait_for_receipt: bool,
    pub transaction_timeout_seconds: u64,
    pub poll_interval_seconds: u64,
}

fn default_rpc_timeout() -> u64 {
    30
}

fn default_private_key_env() -> String {
    "PRIVATE_KEY".to_string()
}

fn default_gas_tier() -> String {
    "standard".to_string()
}

fn default_gas_limit() -> u64 {
    900_000
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    10
}

fn default_interval() -> u64 {
    240
}

impl Default for SignerSettings {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
        }
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_seconds: 5,
            max_delay_seconds: 300,
            backoff_multiplier: 2.0,
            max_consecutive_failures: 20,
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            wait_for_receipt: false,
            transaction_timeout_seconds: 120,
            poll_interval_seconds: 5,
        }
    }
}

impl KeeperConfig {
    pub fn load(path: &str) -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let common_content = Self::load_common_config()?;
        let specific_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;

        // Specific config overrides common
        let merged_content = Self::merge_configs(common_content, specific_content)?;

        Self::from_toml_str(&merged_content)
    }

    /// Parse a single TOML document, substituting `${VAR}` placeholders.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let content = Self::substitute_env_vars(content.to_string())?;
        let config: KeeperConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Address::from_str(&self.contracts.strategy_address).with_context(|| {
            format!("Invalid strategy_address {}", self.contracts.strategy_address)
        })?;
        if let Some(sender) = &self.contracts.sender_address {
            Address::from_str(sender)
                .with_context(|| format!("Invalid sender_address {}", sender))?;
        }
        if self.gas.gas_limit == 0 {
            anyhow::bail!("gas.gas_limit must be greater than zero");
        }
        if let Some(max) = self.gas.max_price_gwei {
            if !(max.is_finite() && max > 0.0) {
                anyhow::bail!("gas.max_price_gwei must be a positive number, got {}", max);
            }
        }
        if self.schedule.interval_seconds == 0 {
            anyhow::bail!("schedule.interval_seconds must be greater than zero");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.max_consecutive_failures == 0 {
            anyhow::bail!("retry.max_consecutive_failures must be at least 1");
        }
        let multiplier = self.retry.backoff_multiplier;
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            anyhow::bail!(
                "retry.backoff_multiplier must be a finite number >= 1.0, got {}",
                multiplier
            );
        }
        if self.retry.max_delay_seconds < self.retry.base_delay_seconds {
            anyhow::bail!("retry.max_delay_seconds must be >= retry.base_delay_seconds");
        }
        if self.monitoring.wait_for_receipt && self.monitoring.poll_interval_seconds == 0 {
            anyhow::bail!("monitoring.poll_interval_seconds must be greater than zero");
        }
        Ok(())
    }

    /// All gas station endpoints in the order they are tried.
    pub fn oracle_urls(&self) -> Vec<String> {
        let mut urls = vec![self.gas.oracle_url.clone()];
        urls.extend(self.gas.fallback_urls.iter().cloned());
        urls
    }

    fn load_common_config() -> Result<String> {
        // A missing common.toml just means no shared defaults
        Ok(fs::read_to_string(COMMON_CONFIG_PATH).unwrap_or_default())
    }

    fn merge_configs(common: String, specific: String) -> Result<String> {
        if common.is_empty() {
            return Ok(specific);
        }

        let common_toml: toml::Value = toml::from_str(&common)?;
        let specific_toml: toml::Value = toml::from_str(&specific)?;

        let merged = Self::merge_toml_values(common_toml, specific_toml);
        Ok(toml::to_string_pretty(&merged)?)
    }

    fn merge_toml_values(mut base: toml::Value, override_val: toml::Value) -> toml::Value {
        match (&mut base, override_val) {
            (toml::Value::Table(base_map), toml::Value::Table(override_map)) => {
                for (key, value) in override_map {
                    let merged = Self::merge_toml_values(
                        base_map
                            .get(&key)
                            .cloned()
                            .unwrap_or(toml::Value::Table(Map::new())),
                        value,
                    );
                    base_map.insert(key, merged);
                }
                base
            }
            (_, override_val) => override_val,
        }
    }

    fn substitute_env_vars(content: String) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;
        let mut result = content.clone();

        for cap in re.captures_iter(&content) {
            let var_name = &cap[1];
            if let Ok(value) = env::var(var_name) {
                result = result.replace(&cap[0], &value);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[chain]
chain_id = 137
rpc_url = "https://polygon-rpc.com"

[contracts]
strategy_address = "0x11774a954ad130025380F518a7C0B5a63Abc320E"

[gas]
oracle_url = "https://gasstation-mainnet.matic.network"
"#;

    #[test]
    fn test_defaults_match_legacy_constants() {
        let config = KeeperConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.gas.gas_limit, 900_000);
        assert_eq!(config.schedule.interval_seconds, 240);
        assert_eq!(config.gas.tier, "standard");
        assert!(config.gas.refresh_each_cycle);
        assert_eq!(config.signer.private_key_env, "PRIVATE_KEY");
        assert!(!config.monitoring.wait_for_receipt);
        assert_eq!(config.retry.max_consecutive_failures, 20);
    }

    #[test]
    fn test_merge_specific_overrides_common() {
        let common = r#"
[schedule]
interval_seconds = 600

[retry]
max_attempts = 3
base_delay_seconds = 5
max_delay_seconds = 300
backoff_multiplier = 2.0
max_consecutive_failures = 10
"#;
        let specific = format!("{}\n[schedule]\ninterval_seconds = 120\n", MINIMAL);

        let merged = KeeperConfig::merge_configs(common.to_string(), specific).unwrap();
        let config = KeeperConfig::from_toml_str(&merged).unwrap();

        assert_eq!(config.schedule.interval_seconds, 120);
        assert_eq!(config.retry.max_consecutive_failures, 10);
        assert_eq!(config.chain.chain_id, 137);
    }

    #[test]
    fn test_invalid_strategy_address_rejected() {
        let content = MINIMAL.replace(
            "0x11774a954ad130025380F518a7C0B5a63Abc320E",
            "not-an-address",
        );
        assert!(KeeperConfig::from_toml_str(&content).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let content = format!("{}\n[schedule]\ninterval_seconds = 0\n", MINIMAL);
        let err = KeeperConfig::from_toml_str(&content).unwrap_err();
        assert!(err.to_string().contains("interval_seconds"));
    }

    #[test]
    fn test_oracle_urls_keep_failover_order() {
        let content = MINIMAL.replace(
            "oracle_url = \"https://gasstation-mainnet.matic.network\"",
            "oracle_url = \"https://a.example\"\nfallback_urls = [\"https://b.example\", \"https://c.example\"]",
        );
        let config = KeeperConfig::from_toml_str(&content).unwrap();
        assert_eq!(
            config.oracle_urls(),
            vec!["https://a.example", "https://b.example", "https://c.example"]
        );
    }

    #[test]
    fn test_non_finite_backoff_multiplier_rejected() {
        for multiplier in ["nan", "inf", "0.5"] {
            let content = format!(
                "{}\n[retry]\nmax_attempts = 3\nbase_delay_seconds = 5\nmax_delay_seconds = 300\nbackoff_multiplier = {}\nmax_consecutive_failures = 20\n",
                MINIMAL, multiplier
            );
            let err = KeeperConfig::from_toml_str(&content).unwrap_err();
            assert!(
                err.to_string().contains("backoff_multiplier"),
                "{} accepted: {}",
                multiplier,
                err
            );
        }
    }
}
