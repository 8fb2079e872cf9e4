use std::time::Duration;

use vdesk_broker::BrokerConfig;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. In
/// production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// JWT token configuration (secret, expiry).
    pub jwt: JwtConfig,
    /// Base64 32-byte key sealing RDP credentials and gateway tokens.
    pub sealing_key: String,
    /// Browser gateway entry point handed out in grants.
    pub gateway_url: String,
    /// Endpoint native RDP clients tunnel through.
    pub native_gateway_host: String,
    pub native_gateway_port: u16,
    /// Cloud provider account.
    pub provider_api_url: String,
    pub provider_client_id: String,
    pub provider_secret: String,
    /// Interval of the reconciliation sweep (default: `45`).
    pub reconcile_interval_secs: u64,
    /// Interval of the idle-policy sweep (default: `60`).
    pub idle_sweep_interval_secs: u64,
    /// Bound on waiting for a desktop to power on (default: `180`).
    pub start_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                   |
    /// |-----------------------------|---------------------------|
    /// | `HOST`                      | `0.0.0.0`                 |
    /// | `PORT`                      | `3000`                    |
    /// | `CORS_ORIGINS`              | `http://localhost:5173`   |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                      |
    /// | `SEALING_KEY`               | (required)                |
    /// | `GATEWAY_URL`               | `http://localhost/gateway`|
    /// | `NATIVE_GATEWAY_HOST`       | `localhost`               |
    /// | `NATIVE_GATEWAY_PORT`       | `9443`                    |
    /// | `PROVIDER_API_URL`          | (required)                |
    /// | `PROVIDER_CLIENT_ID`        | (required)                |
    /// | `PROVIDER_SECRET`           | (required)                |
    /// | `RECONCILE_INTERVAL_SECS`   | `45`                      |
    /// | `IDLE_SWEEP_INTERVAL_SECS`  | `60`                      |
    /// | `START_TIMEOUT_SECS`        | `180`                     |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env_u64("REQUEST_TIMEOUT_SECS", 30);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_env(),
            sealing_key: std::env::var("SEALING_KEY").expect("SEALING_KEY must be set"),
            gateway_url: std::env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost/gateway".into()),
            native_gateway_host: std::env::var("NATIVE_GATEWAY_HOST")
                .unwrap_or_else(|_| "localhost".into()),
            native_gateway_port: std::env::var("NATIVE_GATEWAY_PORT")
                .unwrap_or_else(|_| "9443".into())
                .parse()
                .expect("NATIVE_GATEWAY_PORT must be a valid u16"),
            provider_api_url: std::env::var("PROVIDER_API_URL")
                .expect("PROVIDER_API_URL must be set"),
            provider_client_id: std::env::var("PROVIDER_CLIENT_ID")
                .expect("PROVIDER_CLIENT_ID must be set"),
            provider_secret: std::env::var("PROVIDER_SECRET")
                .expect("PROVIDER_SECRET must be set"),
            reconcile_interval_secs: env_u64("RECONCILE_INTERVAL_SECS", 45),
            idle_sweep_interval_secs: env_u64("IDLE_SWEEP_INTERVAL_SECS", 60),
            start_timeout_secs: env_u64("START_TIMEOUT_SECS", 180),
        }
    }

    /// Broker bounds derived from this configuration.
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            start_timeout: Duration::from_secs(self.start_timeout_secs),
            ..BrokerConfig::default()
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
