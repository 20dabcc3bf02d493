//! Configuration management for chainswap
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Every section has defaults, so a missing file yields a usable configuration.

use anyhow::{Context, Result};
use ethers::types::Address;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static! {
    static ref ENV_VAR_RE: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub orchestrator: OrchestratorConfig,
    pub bridge: BridgeConfig,
    pub metrics: MetricsConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub confirmation_poll_interval_ms: u64,
    pub confirmation_max_attempts: u32,
    pub default_gas_limit: u64,
    pub deadline_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            confirmation_poll_interval_ms: 2_000,
            confirmation_max_attempts: 150,
            default_gas_limit: 300_000,
            deadline_secs: 20 * 60,
        }
    }
}

impl OrchestratorConfig {
    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_interval_ms)
    }

    pub fn deadline_window(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub readiness_poll_interval_secs: u64,
    pub readiness_max_wait_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            readiness_poll_interval_secs: 15,
            readiness_max_wait_secs: 3_600,
        }
    }
}

impl BridgeConfig {
    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_poll_interval_secs)
    }

    pub fn readiness_max_wait(&self) -> Duration {
        Duration::from_secs(self.readiness_max_wait_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus textfile written when the process exits
    pub textfile_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub router_address: Option<String>,
    pub bridge_address: Option<String>,
    #[serde(default)]
    pub fallback_rpc_urls: Vec<String>,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_requests: usize,
}

fn default_max_in_flight() -> usize {
    8
}

impl ChainConfig {
    /// Router address, required for swap and liquidity actions
    pub fn router(&self) -> crate::error::OrchestratorResult<Address> {
        parse_configured_address(&self.name, "router_address", self.router_address.as_deref())
    }

    /// Bridge address, required on both legs of a cross-chain swap
    pub fn bridge(&self) -> crate::error::OrchestratorResult<Address> {
        parse_configured_address(&self.name, "bridge_address", self.bridge_address.as_deref())
    }
}

fn parse_configured_address(
    chain: &str,
    field: &str,
    value: Option<&str>,
) -> crate::error::OrchestratorResult<Address> {
    use crate::error::OrchestratorError;

    let value = value.filter(|v| !v.is_empty()).ok_or_else(|| {
        OrchestratorError::Config(format!("chain {} has no {} configured", chain, field))
    })?;
    value
        .parse::<Address>()
        .map_err(|e| OrchestratorError::Config(format!("chain {} {}: {}", chain, field, e)))
}

impl Settings {
    /// Load settings from `path`, `CHAINSWAP_CONFIG`, or `config/default.toml`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var("CHAINSWAP_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/default.toml"));

        if !config_path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text after `${VAR}` substitution
    pub fn from_toml(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.orchestrator.confirmation_max_attempts == 0 {
            anyhow::bail!("orchestrator.confirmation_max_attempts must be greater than zero");
        }
        if self.orchestrator.default_gas_limit == 0 {
            anyhow::bail!("orchestrator.default_gas_limit must be greater than zero");
        }
        if self.bridge.readiness_poll_interval_secs == 0 {
            anyhow::bail!("bridge.readiness_poll_interval_secs must be greater than zero");
        }

        for (name, chain) in &self.chains {
            if chain.max_in_flight_requests == 0 {
                anyhow::bail!("Chain {} must allow at least one in-flight request", name);
            }
            if chain.router_address.is_none() && chain.bridge_address.is_none() {
                tracing::warn!("Chain {} has neither router nor bridge address", name);
            }
        }

        Ok(())
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    /// Like [`Settings::get_chain_by_id`] but a missing chain is a config error
    pub fn require_chain(&self, chain_id: u64) -> crate::error::OrchestratorResult<&ChainConfig> {
        self.get_chain_by_id(chain_id).ok_or_else(|| {
            crate::error::OrchestratorError::Config(format!(
                "chain {} is not configured",
                chain_id
            ))
        })
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
