//! Process configuration, read once from the environment at startup.

use secrecy::SecretString;
use strum_macros::{Display, EnumString};
use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://site-builder.db";
pub const DEFAULT_APP_URL: &str = "http://localhost:3000";
pub const DEFAULT_DAILY_CREDITS: i64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum CashfreeEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl CashfreeEnvironment {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.cashfree.com/pg",
            Self::Production => "https://api.cashfree.com/pg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<SecretString>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct CashfreeConfig {
    pub app_id: String,
    pub secret_key: SecretString,
    pub environment: CashfreeEnvironment,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// PEM-encoded RSA public key of the identity provider (RS256).
    pub jwt_public_key: Option<String>,
    /// Shared secret for HS256 tokens.
    pub jwt_secret: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub app_url: String,
    pub gemini: GeminiConfig,
    pub daily_credits: i64,
    pub admin_email: Option<String>,
    pub cashfree: Option<CashfreeConfig>,
    pub auth: AuthConfig,
    pub sentry_dsn: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Blank values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = match get("PORT") {
            Some(value) => value.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                value: value.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let daily_credits = match get("DAILY_CREDITS") {
            Some(value) => match value.parse::<i64>() {
                Ok(n) if n >= 0 => n,
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        key: "DAILY_CREDITS",
                        value,
                        reason: "must not be negative".to_string(),
                    });
                }
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        key: "DAILY_CREDITS",
                        reason: e.to_string(),
                        value,
                    });
                }
            },
            None => DEFAULT_DAILY_CREDITS,
        };

        let environment = match get("CASHFREE_ENV") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "CASHFREE_ENV",
                value: value.clone(),
                reason: "expected SANDBOX or PRODUCTION".to_string(),
            })?,
            None => CashfreeEnvironment::default(),
        };
        let cashfree = match (get("CASHFREE_APP_ID"), get("CASHFREE_SECRET_KEY")) {
            (Some(app_id), Some(secret_key)) => Some(CashfreeConfig {
                app_id,
                secret_key: SecretString::from(secret_key),
                environment,
            }),
            _ => None,
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            app_url: get("APP_URL")
                .unwrap_or_else(|| DEFAULT_APP_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            gemini: GeminiConfig {
                api_key: get("GEMINI_API_KEY").map(SecretString::from),
                model: get("GEMINI_MODEL")
                    .unwrap_or_else(|| super::gemini_api::DEFAULT_MODEL.to_string()),
                base_url: get("GEMINI_BASE_URL")
                    .unwrap_or_else(|| super::gemini_api::DEFAULT_BASE_URL.to_string()),
            },
            daily_credits,
            admin_email: get("ADMIN_EMAIL"),
            cashfree,
            auth: AuthConfig {
                jwt_public_key: get("AUTH_JWT_PUBLIC_KEY").map(|pem| pem.replace("\\n", "\n")),
                jwt_secret: get("AUTH_JWT_SECRET").map(SecretString::from),
            },
            sentry_dsn: get("SENTRY_DSN"),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.daily_credits, 5);
        assert!(config.cashfree.is_none());
        assert!(config.gemini.api_key.is_none());
        assert_eq!(config.app_url, DEFAULT_APP_URL);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "9000"),
            ("DAILY_CREDITS", "10"),
            ("ADMIN_EMAIL", "owner@example.com"),
            ("CASHFREE_APP_ID", "app"),
            ("CASHFREE_SECRET_KEY", "secret"),
            ("CASHFREE_ENV", "production"),
            ("APP_URL", "https://builder.example.com/"),
            ("GEMINI_API_KEY", "  key  "),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.daily_credits, 10);
        assert_eq!(config.admin_email.as_deref(), Some("owner@example.com"));
        let cashfree = config.cashfree.unwrap();
        assert_eq!(cashfree.environment, CashfreeEnvironment::Production);
        assert_eq!(config.app_url, "https://builder.example.com");
        assert_eq!(config.gemini.api_key.unwrap().expose_secret(), "key");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("PORT", "http")]),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("DAILY_CREDITS", "-1")]),
            Err(ConfigError::Invalid { key: "DAILY_CREDITS", .. })
        ));
        assert!(matches!(
            config(&[("CASHFREE_ENV", "staging")]),
            Err(ConfigError::Invalid { key: "CASHFREE_ENV", .. })
        ));
    }
}
