//! Application configuration
//!
//! Everything is optional: a missing file or missing keys fall back to the
//! defaults below, which include the three demo users.
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! session_ttl_secs = 3600
//!
//! [pipeline]
//! max_classifier_chars = 512
//! classifier_input = "raw"
//!
//! [[users]]
//! username = "admin"
//! password_hash = "8c6976e5b5410415bde908bd4dee15dfb167a9c873fc4bb8a81f6f2ab448a918"
//! ```

use crate::login::{Credential, CredentialStore, SESSION_DURATION, hash_password};
use crate::pipeline::PipelineConfig;
use crate::topics::TopicConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default results file written by the offline analyzer
pub const DEFAULT_RESULTS_PATH: &str = "data/resultados.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("password hash for user '{username}' is not a SHA-256 hex digest")]
    InvalidPasswordHash { username: String },

    #[error("user '{0}' is configured more than once")]
    DuplicateUser(String),

    #[error("no users configured")]
    NoUsers,

    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the web server listens on
    pub bind: String,

    /// Session lifetime in seconds
    pub session_ttl_secs: u64,

    /// Largest accepted upload, in bytes
    pub max_upload_bytes: usize,

    /// Where the offline analyzer writes its CSV
    pub results_path: PathBuf,

    /// Rows included in the JSON preview of a batch
    pub preview_rows: usize,

    pub pipeline: PipelineConfig,

    pub topics: TopicConfig,

    pub users: Vec<Credential>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            session_ttl_secs: SESSION_DURATION,
            max_upload_bytes: 20 * 1024 * 1024,
            results_path: PathBuf::from(DEFAULT_RESULTS_PATH),
            preview_rows: 50,
            pipeline: PipelineConfig::default(),
            topics: TopicConfig::default(),
            users: default_users(),
        }
    }
}

/// Demo accounts: admin/admin, usuario/1234 and convidado/guest
fn default_users() -> Vec<Credential> {
    [("admin", "admin"), ("usuario", "1234"), ("convidado", "guest")]
        .into_iter()
        .map(|(user, password)| Credential::new(user, hash_password(password)))
        .collect()
}

impl AppConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limits that would make every text unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_classifier_chars == 0 {
            return Err(ConfigError::ZeroLimit("pipeline.max_classifier_chars"));
        }
        Ok(())
    }

    /// Load the configuration file, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            log::info!("No config file given, using defaults");
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&contents)?;
        log::info!(
            "Loaded config from {} ({} users)",
            path.display(),
            config.users.len()
        );

        Ok(config)
    }

    /// Build the read-only credential table
    pub fn credential_store(&self) -> Result<CredentialStore, ConfigError> {
        if self.users.is_empty() {
            return Err(ConfigError::NoUsers);
        }
        CredentialStore::new(self.users.iter().cloned())
    }
}
