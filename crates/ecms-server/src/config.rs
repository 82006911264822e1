//! Process configuration loaded from `ECMS_*` environment variables.
//!
//! A `.env` file in the working directory is read first when present.
//! Loading fails fast on missing or malformed values.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `ECMS_DB_ENDPOINT` | `ws://127.0.0.1:8000` |
//! | `ECMS_DB_NAMESPACE` | `ecms` |
//! | `ECMS_DB_DATABASE` | `main` |
//! | `ECMS_DB_USER` / `ECMS_DB_PASSWORD` | `root` / `root` |
//! | `ECMS_PLATFORM_DOMAIN` | `ecms.cm` |
//! | `ECMS_PUBLIC_SCHEME` | `https` |
//! | `ECMS_PASSWORD_PEPPER` | unset |
//! | `ECMS_OPERATOR_EMAIL` / `ECMS_OPERATOR_PASSWORD` / `ECMS_OPERATOR_NAME` | unset |
//! | `ECMS_TOKEN_PURGE_INTERVAL_SECS` | `3600` |

use std::env;
use std::fmt;
use std::str::FromStr;

use ecms_auth::AuthConfig;
use ecms_core::config::PlatformConfig;
use ecms_db::DbConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Platform operator account ensured at startup.
#[derive(Clone)]
pub struct OperatorBootstrap {
    pub email: String,
    pub full_name: String,
    pub password: String,
}

impl fmt::Debug for OperatorBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorBootstrap")
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub platform: PlatformConfig,
    pub auth: AuthConfig,
    pub operator: Option<OperatorBootstrap>,
    pub token_purge_interval_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let db_defaults = DbConfig::default();
        let platform_defaults = PlatformConfig::default();
        let auth_defaults = AuthConfig::default();

        let db = DbConfig {
            endpoint: var("ECMS_DB_ENDPOINT", &db_defaults.endpoint),
            namespace: var("ECMS_DB_NAMESPACE", &db_defaults.namespace),
            database: var("ECMS_DB_DATABASE", &db_defaults.database),
            username: var("ECMS_DB_USER", &db_defaults.username),
            password: var("ECMS_DB_PASSWORD", &db_defaults.password),
        };

        let platform_domain = var("ECMS_PLATFORM_DOMAIN", &platform_defaults.platform_domain)
            .trim()
            .trim_end_matches('.')
            .to_ascii_lowercase();
        let is_domain = platform_domain.contains('.') || platform_domain == "localhost";
        if platform_domain.is_empty() || !is_domain {
            return Err(ConfigError::InvalidValue {
                var: "ECMS_PLATFORM_DOMAIN".into(),
                message: format!("'{platform_domain}' is not a domain name"),
            });
        }
        let public_scheme = var("ECMS_PUBLIC_SCHEME", &platform_defaults.public_scheme);
        if !matches!(public_scheme.as_str(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                var: "ECMS_PUBLIC_SCHEME".into(),
                message: "must be http or https".into(),
            });
        }
        let platform = PlatformConfig {
            platform_domain,
            public_scheme,
            ..platform_defaults
        };

        let auth = AuthConfig {
            pepper: lookup("ECMS_PASSWORD_PEPPER").filter(|p| !p.is_empty()),
            ..auth_defaults
        };

        let operator = match lookup("ECMS_OPERATOR_EMAIL").filter(|e| !e.trim().is_empty()) {
            None => None,
            Some(email) => {
                let password = lookup("ECMS_OPERATOR_PASSWORD")
                    .ok_or_else(|| ConfigError::MissingVar("ECMS_OPERATOR_PASSWORD".into()))?;
                if password.chars().count() < auth.min_password_length {
                    return Err(ConfigError::InvalidValue {
                        var: "ECMS_OPERATOR_PASSWORD".into(),
                        message: format!(
                            "must be at least {} characters",
                            auth.min_password_length
                        ),
                    });
                }
                Some(OperatorBootstrap {
                    email: email.trim().to_lowercase(),
                    full_name: var("ECMS_OPERATOR_NAME", "Platform Operator"),
                    password,
                })
            }
        };

        let token_purge_interval_secs = parse(&lookup, "ECMS_TOKEN_PURGE_INTERVAL_SECS", 3_600u64)?;
        if token_purge_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                var: "ECMS_TOKEN_PURGE_INTERVAL_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            db,
            platform,
            auth,
            operator,
            token_purge_interval_secs,
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: key.into(),
            message: e.to_string(),
        }),
    }
}
