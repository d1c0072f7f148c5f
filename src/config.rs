//! Configuration management for the disburser
//!
//! Loads configuration from an optional TOML file with environment variable
//! substitution, then applies the well-known environment overrides
//! (`RPC_URL`, `MIN_AMOUNT`, `MAX_AMOUNT`, `RETRIES`, `DELAY`, `TX_DELAY`,
//! `SERVER_RETRY_DELAY`, `DEFAULT_GAS_PRICE`).

use crate::disburse::AmountRange;

use anyhow::{anyhow, Context, Result};
use ethers::types::U256;
use ethers::utils::parse_units;
use serde::Deserialize;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub network: NetworkConfig,
    pub disbursement: DisbursementConfig,
    pub submission: SubmissionConfig,
    pub confirmation: ConfirmationConfig,
    pub inputs: InputsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: String,
    /// Skips the `eth_chainId` lookup when set
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisbursementConfig {
    pub min_amount: f64,
    pub max_amount: f64,
    pub amount_decimals: u32,
    pub tx_delay_ms: u64,
    pub token_symbol: String,
}

impl Default for DisbursementConfig {
    fn default() -> Self {
        Self {
            min_amount: 0.001,
            max_amount: 0.005,
            amount_decimals: 3,
            tx_delay_ms: 2000,
            token_symbol: "TEA".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    pub max_retries: u32,
    pub contention_retry_delay_ms: u64,
    pub server_retry_delay_ms: u64,
    pub default_gas_price_gwei: f64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            contention_retry_delay_ms: 1000,
            server_retry_delay_ms: 5000,
            default_gas_price_gwei: 10.0,
        }
    }
}

impl SubmissionConfig {
    /// Fee floor in wei
    pub fn default_gas_price(&self) -> Result<U256> {
        if !self.default_gas_price_gwei.is_finite() || self.default_gas_price_gwei < 0.0 {
            anyhow::bail!(
                "default_gas_price_gwei must be a non-negative number, got {}",
                self.default_gas_price_gwei
            );
        }
        let units = parse_units(self.default_gas_price_gwei.to_string(), "gwei")
            .with_context(|| "Failed to convert default gas price to wei")?;
        Ok(units.into())
    }

    pub fn contention_retry_delay(&self) -> Duration {
        Duration::from_millis(self.contention_retry_delay_ms)
    }

    pub fn server_retry_delay(&self) -> Duration {
        Duration::from_millis(self.server_retry_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub retries: u32,
    pub delay_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            retries: 10,
            delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    pub wallets_path: PathBuf,
    pub addresses_path: PathBuf,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            wallets_path: PathBuf::from("wallets.json"),
            addresses_path: PathBuf::from("addresses.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub log_file: String,
    pub error_log_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            log_file: "log.txt".to_string(),
            error_log_file: "error.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9102,
        }
    }
}

impl Settings {
    /// Load settings from the configuration file and process environment
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let explicit_path = env::var("DISBURSE_CONFIG").ok().map(PathBuf::from);
        let config_path = explicit_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        // The default file is optional, a named one is not
        let mut settings = if explicit_path.is_some() || config_path.exists() {
            let config_str = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            // Substitute environment variables
            let config_str = substitute_env_vars(&config_str);
            Self::from_toml_str(&config_str)?
        } else {
            Self::default()
        };

        settings.apply_overrides(|key| env::var(key).ok())?;
        settings.validate()?;

        Ok(settings)
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).with_context(|| "Failed to parse configuration")
    }

    /// Apply the recognized environment overrides through `lookup`
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_with(&lookup, "RPC_URL", &mut self.network.rpc_url)?;
        override_with(&lookup, "MIN_AMOUNT", &mut self.disbursement.min_amount)?;
        override_with(&lookup, "MAX_AMOUNT", &mut self.disbursement.max_amount)?;
        override_with(&lookup, "TX_DELAY", &mut self.disbursement.tx_delay_ms)?;
        override_with(&lookup, "RETRIES", &mut self.confirmation.retries)?;
        override_with(&lookup, "DELAY", &mut self.confirmation.delay_ms)?;
        override_with(
            &lookup,
            "SERVER_RETRY_DELAY",
            &mut self.submission.server_retry_delay_ms,
        )?;
        override_with(
            &lookup,
            "DEFAULT_GAS_PRICE",
            &mut self.submission.default_gas_price_gwei,
        )?;
        Ok(())
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.network.rpc_url.trim().is_empty() {
            anyhow::bail!("RPC_URL is not configured");
        }

        self.amount_range()?;

        if self.submission.max_retries == 0 {
            anyhow::bail!("submission.max_retries must be at least 1");
        }
        if self.confirmation.retries == 0 {
            anyhow::bail!("confirmation.retries must be at least 1");
        }
        self.submission.default_gas_price()?;

        Ok(())
    }

    /// Amount bounds as a validated range
    pub fn amount_range(&self) -> Result<AmountRange> {
        AmountRange::new(
            self.disbursement.min_amount,
            self.disbursement.max_amount,
            self.disbursement.amount_decimals,
        )
        .map_err(|e| anyhow!(e))
    }

    pub fn confirmation_delay(&self) -> Duration {
        Duration::from_millis(self.confirmation.delay_ms)
    }
}

fn override_with<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid value for {}: {:?} ({})", key, raw, e))?;
    }
    Ok(())
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .expect("static pattern");
    }

    let mut result = input.to_string();
    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("DISBURSE_TEST_VAR", "test_value");
        let input = "rpc_url = \"https://rpc.example.com/${DISBURSE_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(
            result,
            "rpc_url = \"https://rpc.example.com/test_value/endpoint\""
        );
    }

    #[test]
    fn test_defaults_match_reference_run() {
        let settings = Settings::default();
        assert_eq!(settings.disbursement.min_amount, 0.001);
        assert_eq!(settings.disbursement.max_amount, 0.005);
        assert_eq!(settings.disbursement.tx_delay_ms, 2000);
        assert_eq!(settings.submission.max_retries, 3);
        assert_eq!(settings.submission.server_retry_delay_ms, 5000);
        assert_eq!(settings.confirmation.retries, 10);
        assert_eq!(settings.confirmation.delay_ms, 5000);
        assert_eq!(
            settings.submission.default_gas_price().unwrap(),
            U256::from(10_000_000_000u64)
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [network]
            rpc_url = "http://localhost:8545"

            [submission]
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(settings.network.rpc_url, "http://localhost:8545");
        assert_eq!(settings.submission.max_retries, 5);
        assert_eq!(settings.submission.contention_retry_delay_ms, 1000);
        assert_eq!(settings.inputs.wallets_path, PathBuf::from("wallets.json"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_overrides_apply_and_validate() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(lookup_from(&[
                ("RPC_URL", "https://tea.example/rpc"),
                ("MIN_AMOUNT", "0.01"),
                ("MAX_AMOUNT", "0.02"),
                ("RETRIES", "4"),
                ("DEFAULT_GAS_PRICE", "2.5"),
            ]))
            .unwrap();

        assert_eq!(settings.network.rpc_url, "https://tea.example/rpc");
        assert_eq!(settings.disbursement.min_amount, 0.01);
        assert_eq!(settings.confirmation.retries, 4);
        assert_eq!(
            settings.submission.default_gas_price().unwrap(),
            U256::from(2_500_000_000u64)
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_rpc_url_is_fatal() {
        let settings = Settings::default();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("RPC_URL"));
    }

    #[test]
    fn test_unparsable_override_is_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_overrides(lookup_from(&[("TX_DELAY", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("TX_DELAY"));
    }

    #[test]
    fn test_inverted_amount_range_is_rejected() {
        let mut settings = Settings::default();
        settings.network.rpc_url = "http://localhost:8545".into();
        settings.disbursement.min_amount = 0.5;
        settings.disbursement.max_amount = 0.1;
        assert!(settings.validate().is_err());
    }
}
