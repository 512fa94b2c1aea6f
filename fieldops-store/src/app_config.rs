use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// No URL means the in-memory store.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Signing secrets. Deliveries for a gateway without one are refused.
    pub stripe_secret: Option<String>,
    pub paypal_secret: Option<String>,
    #[serde(default = "default_tolerance")]
    pub tolerance_seconds: i64,
    /// Local development only: accept unsigned deliveries for gateways
    /// that have no secret.
    #[serde(default)]
    pub allow_unsigned: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            stripe_secret: None,
            paypal_secret: None,
            tolerance_seconds: default_tolerance(),
            allow_unsigned: false,
        }
    }
}

fn default_tolerance() -> i64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_money_scale")]
    pub money_scale: u32,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            money_scale: default_money_scale(),
        }
    }
}

fn default_money_scale() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Consecutive capture failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_seconds: default_reset_timeout(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout() -> u64 {
    30
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `FIELDOPS_DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("FIELDOPS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 8080

                [auth]
                jwt_secret = "dev-secret"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.database.url.is_none());
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.webhooks.tolerance_seconds, 300);
        assert!(!config.webhooks.allow_unsigned);
        assert!(config.webhooks.stripe_secret.is_none());
        assert_eq!(config.business_rules.money_scale, 2);
        assert_eq!(config.gateway.failure_threshold, 5);
    }
}
