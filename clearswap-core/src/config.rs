//! Relay configuration.
//!
//! Configuration is environment-driven. A missing private key is a fatal
//! startup error; everything else has sandbox defaults.

use serde::{Deserialize, Serialize};

use crate::constants::SESSION_TTL_SECS;
use crate::error::{Result, SwapError};

const DEFAULT_WS_URL: &str = "wss://clearnet-sandbox.yellow.com/ws";
const DEFAULT_APP_NAME: &str = "clearswap";
const DEFAULT_SCOPE: &str = "clearswap.swaps";
const DEFAULT_ALLOWANCE_ASSET: &str = "ytest.usd";
const DEFAULT_ALLOWANCE_AMOUNT: &str = "1000000000";
const DEFAULT_HTTP_PORT: u16 = 3100;

/// Connection and handshake parameters for the remote coordination node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClearnodeConfig {
    /// WebSocket URL of the clearnode
    pub ws_url: String,
    /// Application name sent in the auth handshake
    pub app_name: String,
    /// Scope string sent in the auth handshake
    pub scope: String,
    /// Asset identifier for the session allowance
    pub allowance_asset: String,
    /// Allowance amount, decimal string in smallest units
    pub allowance_amount: String,
    /// Authenticated-session lifetime in seconds
    pub session_ttl_secs: u64,
}

impl Default for ClearnodeConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.into(),
            app_name: DEFAULT_APP_NAME.into(),
            scope: DEFAULT_SCOPE.into(),
            allowance_asset: DEFAULT_ALLOWANCE_ASSET.into(),
            allowance_amount: DEFAULT_ALLOWANCE_AMOUNT.into(),
            session_ttl_secs: SESSION_TTL_SECS,
        }
    }
}

/// Full relay configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Main wallet private key, hex (with or without 0x prefix)
    pub private_key: String,
    /// Clearnode connection parameters
    pub clearnode: ClearnodeConfig,
    /// Port the HTTP API listens on
    pub http_port: u16,
}

impl RelayConfig {
    /// Loads configuration from the environment.
    ///
    /// `CLEARSWAP_PRIVATE_KEY` is required; all other variables fall back to
    /// sandbox defaults. Returns [`SwapError::Config`] when the key is absent
    /// so startup can fail fast.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let private_key = std::env::var("CLEARSWAP_PRIVATE_KEY")
            .map_err(|_| SwapError::Config("CLEARSWAP_PRIVATE_KEY is not set".into()))?;
        if private_key.trim().is_empty() {
            return Err(SwapError::Config("CLEARSWAP_PRIVATE_KEY is empty".into()));
        }

        let clearnode = ClearnodeConfig {
            ws_url: env_or("CLEARSWAP_WS_URL", DEFAULT_WS_URL),
            app_name: env_or("CLEARSWAP_APP_NAME", DEFAULT_APP_NAME),
            scope: env_or("CLEARSWAP_SCOPE", DEFAULT_SCOPE),
            allowance_asset: env_or("CLEARSWAP_ALLOWANCE_ASSET", DEFAULT_ALLOWANCE_ASSET),
            allowance_amount: env_or("CLEARSWAP_ALLOWANCE_AMOUNT", DEFAULT_ALLOWANCE_AMOUNT),
            session_ttl_secs: SESSION_TTL_SECS,
        };

        let http_port = match std::env::var("CLEARSWAP_HTTP_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| SwapError::Config(format!("invalid CLEARSWAP_HTTP_PORT: {raw}")))?,
            Err(_) => DEFAULT_HTTP_PORT,
        };

        Ok(Self {
            private_key,
            clearnode,
            http_port,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}
