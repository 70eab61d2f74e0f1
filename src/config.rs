//! Configuration loading (SPEC_FULL §6): a `[currencies.<code>]` table per
//! chain plus a `[transport]` table reserved for the out-of-scope
//! messaging credentials. Mirrors the teacher's `toml::from_str`-based
//! `WalletConfig` loading.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyConfig {
    pub network: String,
    pub rpc_url: String,
    pub rpc_user: String,
    pub rpc_pass: String,
    pub fee_per_kb: u64,
    pub conf_path: Option<String>,
}

/// Parsed but unused by the core engine — transport credentials are the
/// out-of-scope messaging layer's concern.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub outbox_path: Option<String>,
    #[serde(default)]
    pub inbox_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub currencies: HashMap<String, CurrencyConfig>,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub trade_store_path: Option<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn currency(&self, code: &str) -> Result<&CurrencyConfig> {
        self.currencies
            .get(&code.to_ascii_uppercase())
            .ok_or_else(|| crate::error::SwapError::configuration(format!("no configuration for currency {code}")))
    }
}
