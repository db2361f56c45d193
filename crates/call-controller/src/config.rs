//! Call-controller configuration.
//!
//! Configuration is loaded from environment variables. Sensitive fields are
//! redacted in Debug output. The sweep interval is validated against the
//! invite timeout at load time: the periodic sweep is the crash-safety net
//! behind the in-memory invite timers, so it must tick at least once per
//! timeout window.

use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default invite timeout in seconds.
pub const DEFAULT_INVITE_TIMEOUT_SECONDS: u64 = 60;

/// Default sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 10;

/// Default room capacity when the create request does not specify one.
pub const DEFAULT_MAX_PARTICIPANTS: i32 = 2;

/// Default per-endpoint business webhook timeout in seconds.
pub const DEFAULT_BUSINESS_WEBHOOK_TIMEOUT_SECONDS: u64 = 10;

/// One outbound business-event endpoint.
#[derive(Clone, Deserialize)]
pub struct WebhookEndpoint {
    pub url: String,
    pub secret: SecretString,
    /// Per-endpoint request timeout in seconds; the global default applies
    /// when absent or zero.
    #[serde(default)]
    pub timeout: u64,
}

impl fmt::Debug for WebhookEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookEndpoint")
            .field("url", &self.url)
            .field("secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Call-controller configuration, loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: SecretString,

    /// HTTP bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Redis URL for the coordination store.
    pub redis_url: SecretString,

    /// SFU API base URL (server side).
    pub sfu_url: String,

    /// SFU URL handed to clients alongside minted tokens.
    pub sfu_client_url: String,

    /// SFU API key (token issuer).
    pub sfu_api_key: String,

    /// SFU API secret: signs minted access tokens and verifies inbound
    /// webhook bearer tokens.
    pub sfu_api_secret: SecretString,

    /// Seconds a participant may stay in `Inviting` before being missed.
    pub invite_timeout_seconds: u64,

    /// Interval of the timeout sweep task. Must not exceed the invite
    /// timeout.
    pub sweep_interval_seconds: u64,

    /// Room capacity applied when a create request omits it.
    pub default_max_participants: i32,

    /// Outbound business-event endpoints.
    pub business_webhook_endpoints: Vec<WebhookEndpoint>,

    /// Fallback per-endpoint timeout in seconds.
    pub business_webhook_timeout_seconds: u64,

    /// Language used when the request carries none of the selectors.
    pub default_language: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("redis_url", &"[REDACTED]")
            .field("sfu_url", &self.sfu_url)
            .field("sfu_client_url", &self.sfu_client_url)
            .field("sfu_api_key", &self.sfu_api_key)
            .field("sfu_api_secret", &"[REDACTED]")
            .field("invite_timeout_seconds", &self.invite_timeout_seconds)
            .field("sweep_interval_seconds", &self.sweep_interval_seconds)
            .field("default_max_participants", &self.default_max_participants)
            .field(
                "business_webhook_endpoints",
                &self.business_webhook_endpoints,
            )
            .field(
                "business_webhook_timeout_seconds",
                &self.business_webhook_timeout_seconds,
            )
            .field("default_language", &self.default_language)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Invalid BUSINESS_WEBHOOK_ENDPOINTS: {0}")]
    InvalidEndpoints(String),

    #[error("SWEEP_INTERVAL_SECONDS ({0}) must not exceed INVITE_TIMEOUT_SECONDS ({1})")]
    SweepSlowerThanTimeout(u64, u64),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let redis_url = vars
            .get("REDIS_URL")
            .cloned()
            .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

        let sfu_url = vars
            .get("SFU_URL")
            .cloned()
            .unwrap_or_else(|| "http://localhost:7880".to_string());

        let sfu_client_url = vars
            .get("SFU_CLIENT_URL")
            .cloned()
            .unwrap_or_else(|| sfu_url.clone());

        let sfu_api_key = vars.get("SFU_API_KEY").cloned().unwrap_or_default();
        let sfu_api_secret = vars.get("SFU_API_SECRET").cloned().unwrap_or_default();

        let invite_timeout_seconds = parse_positive_u64(
            vars,
            "INVITE_TIMEOUT_SECONDS",
            DEFAULT_INVITE_TIMEOUT_SECONDS,
        )?;
        let sweep_interval_seconds = parse_positive_u64(
            vars,
            "SWEEP_INTERVAL_SECONDS",
            DEFAULT_SWEEP_INTERVAL_SECONDS,
        )?;

        if sweep_interval_seconds > invite_timeout_seconds {
            return Err(ConfigError::SweepSlowerThanTimeout(
                sweep_interval_seconds,
                invite_timeout_seconds,
            ));
        }

        let default_max_participants =
            match vars.get("DEFAULT_MAX_PARTICIPANTS") {
                Some(raw) => {
                    let value: i32 = raw.parse().map_err(|e| {
                        ConfigError::InvalidValue(
                            "DEFAULT_MAX_PARTICIPANTS".to_string(),
                            format!("'{raw}' is not an integer: {e}"),
                        )
                    })?;
                    if value < 2 {
                        return Err(ConfigError::InvalidValue(
                            "DEFAULT_MAX_PARTICIPANTS".to_string(),
                            format!("must be at least 2, got {value}"),
                        ));
                    }
                    value
                }
                None => DEFAULT_MAX_PARTICIPANTS,
            };

        let business_webhook_timeout_seconds = parse_positive_u64(
            vars,
            "BUSINESS_WEBHOOK_TIMEOUT_SECONDS",
            DEFAULT_BUSINESS_WEBHOOK_TIMEOUT_SECONDS,
        )?;

        let mut business_webhook_endpoints: Vec<WebhookEndpoint> =
            match vars.get("BUSINESS_WEBHOOK_ENDPOINTS") {
                Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
                    .map_err(|e| ConfigError::InvalidEndpoints(e.to_string()))?,
                _ => Vec::new(),
            };

        for endpoint in &mut business_webhook_endpoints {
            if endpoint.timeout == 0 {
                endpoint.timeout = business_webhook_timeout_seconds;
            }
        }

        let default_language = vars
            .get("DEFAULT_LANGUAGE")
            .cloned()
            .unwrap_or_else(|| crate::i18n::DEFAULT_LANGUAGE.to_string());

        Ok(Config {
            database_url: SecretString::from(database_url),
            bind_address,
            redis_url: SecretString::from(redis_url),
            sfu_url,
            sfu_client_url,
            sfu_api_key,
            sfu_api_secret: SecretString::from(sfu_api_secret),
            invite_timeout_seconds,
            sweep_interval_seconds,
            default_max_participants,
            business_webhook_endpoints,
            business_webhook_timeout_seconds,
            default_language,
        })
    }

    /// True when SFU credentials are present.
    #[must_use]
    pub fn has_sfu_credentials(&self) -> bool {
        !self.sfu_api_key.is_empty() && !self.sfu_api_secret.expose_secret().is_empty()
    }
}

fn parse_positive_u64(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = raw.parse().map_err(|e| {
        ConfigError::InvalidValue(name.to_string(), format!("'{raw}' is not an integer: {e}"))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than 0".to_string(),
        ));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "DATABASE_URL".to_string(),
            "postgresql://localhost/call_test".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.sfu_url, "http://localhost:7880");
        assert_eq!(config.sfu_client_url, "http://localhost:7880");
        assert_eq!(
            config.invite_timeout_seconds,
            DEFAULT_INVITE_TIMEOUT_SECONDS
        );
        assert_eq!(
            config.sweep_interval_seconds,
            DEFAULT_SWEEP_INTERVAL_SECONDS
        );
        assert_eq!(config.default_max_participants, DEFAULT_MAX_PARTICIPANTS);
        assert!(config.business_webhook_endpoints.is_empty());
        assert_eq!(config.default_language, "en-US");
        assert!(!config.has_sfu_credentials());
    }

    #[test]
    fn test_missing_database_url() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_sfu_client_url_falls_back_to_sfu_url() {
        let mut vars = base_vars();
        vars.insert("SFU_URL".to_string(), "https://sfu.internal:7880".to_string());

        let config = Config::from_vars(&vars).expect("Config should load");
        assert_eq!(config.sfu_client_url, "https://sfu.internal:7880");
    }

    #[test]
    fn test_sweep_interval_must_not_exceed_invite_timeout() {
        let mut vars = base_vars();
        vars.insert("INVITE_TIMEOUT_SECONDS".to_string(), "30".to_string());
        vars.insert("SWEEP_INTERVAL_SECONDS".to_string(), "31".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(
            result,
            Err(ConfigError::SweepSlowerThanTimeout(31, 30))
        ));
    }

    #[test]
    fn test_sweep_interval_equal_to_timeout_is_allowed() {
        let mut vars = base_vars();
        vars.insert("INVITE_TIMEOUT_SECONDS".to_string(), "30".to_string());
        vars.insert("SWEEP_INTERVAL_SECONDS".to_string(), "30".to_string());

        let config = Config::from_vars(&vars).expect("Config should load");
        assert_eq!(config.sweep_interval_seconds, 30);
    }

    #[test]
    fn test_invite_timeout_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("INVITE_TIMEOUT_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(name, _)) if name == "INVITE_TIMEOUT_SECONDS"));
    }

    #[test]
    fn test_invite_timeout_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("INVITE_TIMEOUT_SECONDS".to_string(), "soon".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(name, _)) if name == "INVITE_TIMEOUT_SECONDS"));
    }

    #[test]
    fn test_max_participants_rejects_below_two() {
        let mut vars = base_vars();
        vars.insert("DEFAULT_MAX_PARTICIPANTS".to_string(), "1".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(name, _)) if name == "DEFAULT_MAX_PARTICIPANTS"));
    }

    #[test]
    fn test_endpoints_json_with_per_endpoint_timeout() {
        let mut vars = base_vars();
        vars.insert(
            "BUSINESS_WEBHOOK_ENDPOINTS".to_string(),
            r#"[
                {"url": "https://a.example.com/hook", "secret": "sa", "timeout": 3},
                {"url": "https://b.example.com/hook", "secret": "sb"}
            ]"#
            .to_string(),
        );
        vars.insert(
            "BUSINESS_WEBHOOK_TIMEOUT_SECONDS".to_string(),
            "7".to_string(),
        );

        let config = Config::from_vars(&vars).expect("Config should load");
        assert_eq!(config.business_webhook_endpoints.len(), 2);
        assert_eq!(config.business_webhook_endpoints[0].timeout, 3);
        // Missing per-endpoint timeout falls back to the global default
        assert_eq!(config.business_webhook_endpoints[1].timeout, 7);
    }

    #[test]
    fn test_endpoints_json_invalid() {
        let mut vars = base_vars();
        vars.insert(
            "BUSINESS_WEBHOOK_ENDPOINTS".to_string(),
            "not json".to_string(),
        );

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidEndpoints(_))));
    }

    #[test]
    fn test_has_sfu_credentials() {
        let mut vars = base_vars();
        vars.insert("SFU_API_KEY".to_string(), "APIkey".to_string());
        vars.insert("SFU_API_SECRET".to_string(), "s3cret".to_string());

        let config = Config::from_vars(&vars).expect("Config should load");
        assert!(config.has_sfu_credentials());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut vars = base_vars();
        vars.insert("SFU_API_SECRET".to_string(), "super-secret".to_string());
        vars.insert(
            "BUSINESS_WEBHOOK_ENDPOINTS".to_string(),
            r#"[{"url": "https://a.example.com/hook", "secret": "endpoint-secret"}]"#.to_string(),
        );

        let config = Config::from_vars(&vars).expect("Config should load");
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("postgresql://"));
        assert!(!debug_output.contains("super-secret"));
        assert!(!debug_output.contains("endpoint-secret"));
    }
}
