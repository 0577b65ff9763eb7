use http::header::HeaderValue;
use serde::Deserialize;
use std::fs::File;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("port cannot be 0")]
    InvalidPort,

    #[error("shared_token must not be empty")]
    EmptyToken,

    #[error("allowed_origin is not a valid header value: {0}")]
    InvalidOrigin(String),
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// External parameter store holding the service's secrets
#[derive(Clone, Debug, Deserialize)]
pub struct ParameterStoreConfig {
    /// Batched-fetch endpoint
    ///
    /// Note: Uses the `url::Url` type for compile-time URL validation.
    /// Invalid URLs will be rejected during config deserialization.
    pub url: Url,
}

/// Identities used for operational notification emails
#[derive(Clone, Debug, Deserialize)]
pub struct NotificationsConfig {
    /// Recipient of operational notifications
    pub to: String,
    pub from_email: String,
    pub from_name: String,
}

/// Mailing-list provider settings
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AudienceConfig {
    /// Overrides the API base URL derived from the account's server prefix.
    /// Intended for local development against a mock server.
    #[serde(default)]
    pub api_base: Option<Url>,
}

/// Outbound email provider settings
#[derive(Clone, Debug, Deserialize)]
pub struct MailerConfig {
    #[serde(default = "default_mailer_base")]
    pub api_base: Url,
}

impl Default for MailerConfig {
    fn default() -> Self {
        MailerConfig {
            api_base: default_mailer_base(),
        }
    }
}

fn default_mailer_base() -> Url {
    Url::parse("https://api.sendgrid.com").expect("static URL")
}

#[derive(Clone, Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    /// Shared-secret token every inbound request must carry
    pub shared_token: String,
    /// Origin allowed by the fixed cross-origin response policy
    pub allowed_origin: String,
    pub parameter_store: ParameterStoreConfig,
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub audience: AudienceConfig,
    #[serde(default)]
    pub mailer: MailerConfig,
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.listener.port == 0 {
            return Err(ValidationError::InvalidPort);
        }

        if self.shared_token.is_empty() {
            return Err(ValidationError::EmptyToken);
        }

        if HeaderValue::from_str(&self.allowed_origin).is_err() {
            return Err(ValidationError::InvalidOrigin(self.allowed_origin.clone()));
        }

        Ok(())
    }
}
