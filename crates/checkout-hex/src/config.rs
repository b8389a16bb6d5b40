use serde::Deserialize;
use std::env;

/// Payment-gateway settings. Injected into the signer explicitly so tests
/// can supply deterministic fixtures; the signing secret and the gateway
/// base URL are distinct values on purpose.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub merchant_code: String,
    pub hash_secret: String,
    pub base_url: String,
    pub return_url: String,
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            merchant_code: require("VNP_TMN_CODE")?,
            hash_secret: require("VNP_HASH_SECRET")?,
            base_url: require("VNP_BASE_URL")?,
            return_url: require("VNP_RETURN_URL")?,
        })
    }
}

fn require(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("missing env var {key}"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: String,
    pub database_url: Option<String>,
    pub gateway: GatewayConfig,
    pub open_hour: u32,
    pub close_hour: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let server_port = env::var("SERVER_PORT").unwrap_or_else(|_| "3000".into());
        let database_url = env::var("DATABASE_URL").ok();
        let open_hour = env::var("SHOP_OPEN_HOUR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8);
        let close_hour = env::var("SHOP_CLOSE_HOUR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(18);
        Ok(Self {
            server_port,
            database_url,
            gateway: GatewayConfig::from_env()?,
            open_hour,
            close_hour,
        })
    }
}
