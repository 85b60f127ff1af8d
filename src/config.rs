//! Application configuration
//!
//! All environment lookups happen here, once, at startup. Services receive
//! the parsed values through constructors and never read the environment
//! themselves.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;

/// Default service fee charged on top of the airtime cost, in USDC
const DEFAULT_SERVICE_FEE_USDC: Decimal = dec!(0.05);

/// Default receipt wait budget for deposit verification (seconds)
const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 60;

/// Default receipt polling interval (milliseconds)
const DEFAULT_RECEIPT_POLL_MS: u64 = 2000;

/// Default price cache TTL, doubling as the oracle freshness tolerance
const DEFAULT_PRICE_TTL_SECS: u64 = 300;

/// Base mainnet chain ID
const DEFAULT_CHAIN_ID: u64 = 8453;

/// Staleness policy when the upstream price fetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMode {
    /// Fail order creation when no fresh rate is available
    Strict,
    /// Serve the last recorded snapshot instead
    Fallback,
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "{} must be set", var),
            ConfigError::Invalid(var, value) => {
                write!(f, "{} has invalid value: {}", var, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub payment_contract_address: String,
    /// Absent key means refunds need manual treasury action
    pub treasury_private_key: Option<String>,
    pub confirmations: u64,
    pub receipt_timeout_secs: u64,
    pub receipt_poll_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub username: String,
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub base_url: String,
    pub mode: PriceMode,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub chain: ChainConfig,
    pub provider: ProviderConfig,
    pub price: PriceConfig,
    pub service_fee_usdc: Decimal,
    /// Source IPs allowed to call the validation callback. Empty disables
    /// the check (logged loudly at startup).
    pub callback_trusted_ips: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require("DATABASE_URL")?;
        let bind_addr =
            env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let chain = ChainConfig {
            rpc_url: require("BASE_RPC_URL")?,
            chain_id: parse_or("CHAIN_ID", DEFAULT_CHAIN_ID)?,
            payment_contract_address: require("AIRTIME_CONTRACT_ADDRESS")?,
            treasury_private_key: env::var("TREASURY_PRIVATE_KEY").ok().filter(|k| !k.is_empty()),
            confirmations: parse_or("DEPOSIT_CONFIRMATIONS", 1)?,
            receipt_timeout_secs: parse_or("RECEIPT_TIMEOUT_SECS", DEFAULT_RECEIPT_TIMEOUT_SECS)?,
            receipt_poll_ms: parse_or("RECEIPT_POLL_MS", DEFAULT_RECEIPT_POLL_MS)?,
        };

        let provider = ProviderConfig {
            username: require("AIRTIME_PROVIDER_USERNAME")?,
            api_key: require("AIRTIME_PROVIDER_API_KEY")?,
            base_url: require("AIRTIME_PROVIDER_URL")?,
        };

        let price = PriceConfig {
            base_url: env::var("COINGECKO_URL")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            mode: match env::var("PRICE_MODE").as_deref() {
                Ok("strict") => PriceMode::Strict,
                Ok("fallback") | Err(_) => PriceMode::Fallback,
                Ok(other) => {
                    return Err(ConfigError::Invalid("PRICE_MODE", other.to_string()));
                }
            },
            cache_ttl_secs: parse_or("PRICE_TTL_SECS", DEFAULT_PRICE_TTL_SECS)?,
        };

        let service_fee_usdc = match env::var("SERVICE_FEE_USDC") {
            Ok(raw) => raw
                .parse::<Decimal>()
                .map_err(|_| ConfigError::Invalid("SERVICE_FEE_USDC", raw))?,
            Err(_) => DEFAULT_SERVICE_FEE_USDC,
        };

        let callback_trusted_ips = env::var("CALLBACK_TRUSTED_IPS")
            .map(|raw| {
                raw.split(',')
                    .map(|ip| ip.trim().to_string())
                    .filter(|ip| !ip.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(AppConfig {
            database_url,
            bind_addr,
            chain,
            provider,
            price,
            service_fee_usdc,
            callback_trusted_ips,
        })
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(var))
}

fn parse_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(var, raw)),
        Err(_) => Ok(default),
    }
}
