//! Configuration management for taskpad.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `DEV_MODE` - Optional. Enables the local identity provider and a random JWT secret.
//! - `JWT_SECRET` - Required unless `DEV_MODE=true`. Secret used to sign session tokens.
//! - `JWT_TTL_DAYS` - Optional. Session lifetime in days. Defaults to `30`.
//! - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` - Google OAuth client credentials.
//! - `PUBLIC_URL` - Optional. Externally visible base URL, used for the OAuth redirect.
//! - `TASK_STORE` - Optional. `memory`, `file` or `sqlite`. Defaults to `sqlite`.
//! - `DATA_DIR` - Optional. Directory for persistent stores. Defaults to `./data`.
//! - `PAGE_SIZE` - Optional. Tasks per dashboard page. Defaults to `6`.

use std::path::PathBuf;
use thiserror::Error;

use crate::api::task_store::TaskStoreType;
use crate::util::env_var_bool;

/// Number of tasks shown per dashboard page.
pub const DEFAULT_PAGE_SIZE: usize = 6;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Google OAuth client settings.
#[derive(Debug, Clone, Default)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl GoogleConfig {
    /// Whether both client credentials are present.
    pub fn is_configured(&self) -> bool {
        self.client_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Session token settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for session JWTs
    pub jwt_secret: String,

    /// Session lifetime in days
    pub jwt_ttl_days: i64,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Dev mode: local sign-in without Google
    pub dev_mode: bool,

    /// Externally visible base URL (no trailing slash)
    pub public_url: String,

    pub auth: AuthConfig,

    pub google: GoogleConfig,

    /// Which task store backend to use
    pub store_type: TaskStoreType,

    /// Directory for file/sqlite stores
    pub data_dir: PathBuf,

    /// Tasks per dashboard page
    pub page_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `JWT_SECRET` is not set outside dev mode,
    /// and `ConfigError::InvalidValue` for unparsable numbers.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        let dev_mode = env_var_bool("DEV_MODE", false);

        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if dev_mode => {
                tracing::warn!("JWT_SECRET not set; using a random secret (sessions reset on restart)");
                random_secret()
            }
            _ => return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string())),
        };

        let jwt_ttl_days = std::env::var("JWT_TTL_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("JWT_TTL_DAYS".to_string(), format!("{}", e)))?;

        let public_url = std::env::var("PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        let google = GoogleConfig {
            client_id: std::env::var("GOOGLE_CLIENT_ID").ok(),
            client_secret: std::env::var("GOOGLE_CLIENT_SECRET").ok(),
        };

        let store_type = std::env::var("TASK_STORE")
            .map(|s| TaskStoreType::from_str(&s))
            .unwrap_or_default();

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let page_size: usize = std::env::var("PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PAGE_SIZE".to_string(), format!("{}", e)))?;
        if page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "PAGE_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            dev_mode,
            public_url,
            auth: AuthConfig {
                jwt_secret,
                jwt_ttl_days,
            },
            google,
            store_type,
            data_dir,
            page_size,
        })
    }

    /// Create a config with an in-memory store (useful for testing).
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            dev_mode: true,
            public_url: "http://127.0.0.1:3000".to_string(),
            auth: AuthConfig {
                jwt_secret: "test-secret".to_string(),
                jwt_ttl_days: 30,
            },
            google: GoogleConfig::default(),
            store_type: TaskStoreType::Memory,
            data_dir: PathBuf::from("./data"),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Redirect URI registered with the identity provider.
    pub fn oauth_redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.public_url)
    }
}

fn random_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_config_requires_both_credentials() {
        let mut google = GoogleConfig::default();
        assert!(!google.is_configured());

        google.client_id = Some("id".to_string());
        assert!(!google.is_configured());

        google.client_secret = Some(String::new());
        assert!(!google.is_configured());

        google.client_secret = Some("secret".to_string());
        assert!(google.is_configured());
    }

    #[test]
    fn test_redirect_uri_uses_public_url() {
        let mut config = Config::for_testing();
        config.public_url = "https://tasks.example.com".to_string();
        assert_eq!(
            config.oauth_redirect_uri(),
            "https://tasks.example.com/auth/callback"
        );
    }

    #[test]
    fn test_random_secret_is_hex() {
        let secret = random_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
