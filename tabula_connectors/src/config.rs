use std::time::Duration;

use log::*;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

//--------------------------------------  MeridianConfig     ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct MeridianConfig {
    pub base_url: String,
    pub http_timeout: Duration,
}

impl Default for MeridianConfig {
    fn default() -> Self {
        Self { base_url: "https://api.meridianpay.example".to_string(), http_timeout: DEFAULT_HTTP_TIMEOUT }
    }
}

impl MeridianConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("TAB_MERIDIAN_BASE_URL").unwrap_or_else(|_| {
            warn!("TAB_MERIDIAN_BASE_URL not set, using (probably useless) default");
            Self::default().base_url
        });
        Self { base_url, http_timeout: DEFAULT_HTTP_TIMEOUT }
    }
}

//--------------------------------------   VantageConfig     ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct VantageConfig {
    pub base_url: String,
    /// The OAuth2 token endpoint. Separate host from the payments API at most deployments.
    pub token_url: String,
    pub http_timeout: Duration,
}

impl Default for VantageConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.vantage.example".to_string(),
            token_url: "https://auth.vantage.example/oauth2/token".to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl VantageConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("TAB_VANTAGE_BASE_URL").unwrap_or_else(|_| {
            warn!("TAB_VANTAGE_BASE_URL not set, using (probably useless) default");
            Self::default().base_url
        });
        let token_url = std::env::var("TAB_VANTAGE_TOKEN_URL").unwrap_or_else(|_| {
            warn!("TAB_VANTAGE_TOKEN_URL not set, using (probably useless) default");
            Self::default().token_url
        });
        Self { base_url, token_url, http_timeout: DEFAULT_HTTP_TIMEOUT }
    }
}

//--------------------------------------  BridgePayConfig    ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct BridgePayConfig {
    pub base_url: String,
    pub http_timeout: Duration,
}

impl Default for BridgePayConfig {
    fn default() -> Self {
        Self { base_url: "https://gateway.bridgepay.example".to_string(), http_timeout: DEFAULT_HTTP_TIMEOUT }
    }
}

impl BridgePayConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("TAB_BRIDGEPAY_BASE_URL").unwrap_or_else(|_| {
            warn!("TAB_BRIDGEPAY_BASE_URL not set, using (probably useless) default");
            Self::default().base_url
        });
        Self { base_url, http_timeout: DEFAULT_HTTP_TIMEOUT }
    }
}
