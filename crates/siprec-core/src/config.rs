//! Configuration for the recording B2BUA
//!
//! Loaded from a TOML file with environment overrides. Variables are
//! `SIPREC_` followed by the section and key joined with `__`, e.g.
//! `SIPREC_SIPREC__SERVER=sip:srs@10.0.0.9` or `SIPREC_CALL__SETUP_TIMEOUT_SECS=60`.
//!
//! ```toml
//! [media_server]
//! address = "127.0.0.1"
//! port = 8021
//! secret = "ClueCon"
//!
//! [siprec]
//! server = "sip:recorder@10.0.0.9"
//!
//! [ingress]
//! local_dns_names = ["sbc.example.com"]
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::errors::ConfigError;
use crate::logging::parse_log_level;
use crate::signaling::SipUri;

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "SIPREC";

// SIPREC_<SECTION>__<KEY>
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

/// Main configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub media_server: MediaServerConfig,
    pub siprec: SiprecConfig,
    pub ingress: IngressConfig,
    pub call: CallConfig,
    pub logging: LogSettings,
}

/// Media server control connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaServerConfig {
    pub address: String,
    pub port: u16,
    pub secret: String,
}

/// Recording server
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiprecConfig {
    /// SIP URI the recording INVITE is sent to
    pub server: String,
    /// Prefix of the per-call multipart boundary token
    pub boundary_prefix: String,
}

/// Identity of this node, used to refuse requests addressed to it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    pub local_dns_names: Vec<String>,
}

/// Per-call limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Bound on connect-through-answer setup; 0 disables it
    pub setup_timeout_secs: u64,
}

/// Logging section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
}

impl Default for MediaServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8021,
            secret: "ClueCon".to_string(),
        }
    }
}

impl Default for SiprecConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            boundary_prefix: "siprec".to_string(),
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            setup_timeout_secs: 120,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
        }
    }
}

impl CallConfig {
    pub fn setup_timeout(&self) -> Option<Duration> {
        (self.setup_timeout_secs > 0).then(|| Duration::from_secs(self.setup_timeout_secs))
    }
}

impl RecorderConfig {
    /// Load configuration from a TOML file, applying environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = File::from(path.as_ref()).format(FileFormat::Toml);
        Self::build(source, environment())
    }

    /// Load configuration from TOML text, applying environment overrides
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::build(File::from_str(toml, FileFormat::Toml), environment())
    }

    fn build<S>(source: S, environment: Environment) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = Config::builder()
            .add_source(source)
            .add_source(environment)
            .build()?;
        let config: RecorderConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values the orchestrator depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.siprec.server.trim().is_empty() {
            return Err(ConfigError::Invalid("siprec.server is required".to_string()));
        }
        self.siprec
            .server
            .parse::<SipUri>()
            .map_err(|e| ConfigError::Invalid(format!("siprec.server: {}", e)))?;
        if self.siprec.boundary_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "siprec.boundary_prefix must not be empty".to_string(),
            ));
        }
        parse_log_level(&self.logging.level)?;
        if self.media_server.address.is_empty() {
            return Err(ConfigError::Invalid(
                "media_server.address is required".to_string(),
            ));
        }
        Ok(())
    }
}
