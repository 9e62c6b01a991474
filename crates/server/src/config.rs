use serde::Deserialize;
use std::net::SocketAddr;
use thiserror::Error;

/// Minimum length of the configured key material.
const MIN_SECRET_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Token lifetimes, in seconds. A lifetime of 0 never expires.
#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    #[serde(default = "default_grant_token_lifetime")]
    pub grant_token_lifetime: i64,
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    #[serde(default = "default_action_token_lifetime")]
    pub action_token_lifetime: i64,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            grant_token_lifetime: default_grant_token_lifetime(),
            access_token_lifetime: default_access_token_lifetime(),
            action_token_lifetime: default_action_token_lifetime(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Master key for TOTP seed encryption
    pub storage_secret: String,
    /// Key material for signed session cookies
    pub session_secret: String,
    #[serde(default = "default_application_uri")]
    pub application_uri: String,
    /// Name of the client the dashboard and sign-in pages act as
    #[serde(default = "default_first_party_client")]
    pub first_party_client: String,
    #[serde(default = "default_totp_issuer")]
    pub totp_issuer: String,
    #[serde(default)]
    pub secure_cookies: bool,
    /// Take the client address from `X-Forwarded-For`; only behind a proxy
    /// that sets it
    #[serde(default)]
    pub trust_forwarded_for: bool,
    #[serde(default)]
    pub oauth2: OAuth2Config,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url)
            .field("listen_addr", &self.listen_addr)
            .field("application_uri", &self.application_uri)
            .field("first_party_client", &self.first_party_client)
            .field("totp_issuer", &self.totp_issuer)
            .field("secure_cookies", &self.secure_cookies)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("oauth2", &self.oauth2)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Validation(format!(
                "storage_secret must be at least {MIN_SECRET_LENGTH} characters"
            )));
        }
        if self.session_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Validation(format!(
                "session_secret must be at least {MIN_SECRET_LENGTH} characters"
            )));
        }
        if self.first_party_client.trim().is_empty() {
            return Err(ConfigError::Validation(
                "first_party_client must not be empty".into(),
            ));
        }
        let lifetimes = [
            ("grant_token_lifetime", self.oauth2.grant_token_lifetime),
            ("access_token_lifetime", self.oauth2.access_token_lifetime),
            ("action_token_lifetime", self.oauth2.action_token_lifetime),
        ];
        for (name, value) in lifetimes {
            if value < 0 {
                return Err(ConfigError::Validation(format!(
                    "oauth2.{name} must not be negative"
                )));
            }
        }
        Ok(())
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_application_uri() -> String {
    "http://localhost:8080".to_owned()
}

fn default_first_party_client() -> String {
    "Jupiter".to_owned()
}

fn default_totp_issuer() -> String {
    "Space".to_owned()
}

fn default_grant_token_lifetime() -> i64 {
    300
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_action_token_lifetime() -> i64 {
    3600
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any variable matching the key path separated by double underscores
/// (e.g. `OAUTH2__ACCESS_TOKEN_LIFETIME`) overrides the file value. The file
/// itself is optional.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn parse(yaml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    const MINIMAL: &str = r#"
database_url: "sqlite::memory:"
storage_secret: "0123456789abcdef0123456789abcdef"
session_secret: "fedcba9876543210fedcba9876543210"
"#;

    #[test]
    fn defaults_fill_optional_keys() {
        let cfg = parse(MINIMAL);
        assert_eq!(cfg.listen_addr, default_listen_addr());
        assert_eq!(cfg.first_party_client, "Jupiter");
        assert_eq!(cfg.totp_issuer, "Space");
        assert!(!cfg.secure_cookies);
        assert!(!cfg.trust_forwarded_for);
        assert_eq!(cfg.oauth2.grant_token_lifetime, 300);
        assert_eq!(cfg.oauth2.access_token_lifetime, 3600);
        assert_eq!(cfg.oauth2.action_token_lifetime, 3600);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn nested_lifetimes_override() {
        let cfg = parse(&format!("{MINIMAL}oauth2:\n  access_token_lifetime: 600\n"));
        assert_eq!(cfg.oauth2.access_token_lifetime, 600);
        assert_eq!(cfg.oauth2.grant_token_lifetime, 300);
    }

    #[test]
    fn short_secrets_are_rejected() {
        let mut cfg = parse(MINIMAL);
        cfg.storage_secret = "short".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let mut cfg = parse(MINIMAL);
        cfg.session_secret = "short".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn negative_lifetime_is_rejected() {
        let mut cfg = parse(MINIMAL);
        cfg.oauth2.action_token_lifetime = -1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_hides_secrets() {
        let cfg = parse(MINIMAL);
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("0123456789abcdef"));
        assert!(rendered.contains("Jupiter"));
    }
}
