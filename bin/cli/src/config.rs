//! CLI configuration.
//!
//! Loaded via the `config` crate from an optional TOML file layered under
//! environment variables prefixed with `FLOWSHIFT`, using `__` as the
//! nesting separator:
//!
//! ```text
//! FLOWSHIFT__DESTINATION__BASE_URL=https://new.example.com
//! FLOWSHIFT__DESTINATION__API_KEY=...
//! FLOWSHIFT__TRANSFER__CONCURRENCY=8
//! ```

use flowshift_http::HttpTransportConfig;
use flowshift_migration::{StoragePaths, TransferOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "flowshift.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FLOWSHIFT";

/// Complete CLI configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    /// Instance workflows are read from when no export file is given.
    #[serde(default)]
    pub source: Option<HttpTransportConfig>,

    /// Instance workflows are migrated to.
    #[serde(default)]
    pub destination: Option<HttpTransportConfig>,

    /// Transfer knobs; CLI flags override these.
    #[serde(default)]
    pub transfer: TransferOptions,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where run state is persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_mapping_path")]
    pub mapping_path: PathBuf,

    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
}

fn default_mapping_path() -> PathBuf {
    PathBuf::from("id_mapping.json")
}

fn default_history_path() -> PathBuf {
    PathBuf::from("upload_history.jsonl")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mapping_path: default_mapping_path(),
            history_path: default_history_path(),
        }
    }
}

impl StorageConfig {
    pub fn paths(&self) -> StoragePaths {
        StoragePaths {
            mapping: self.mapping_path.clone(),
            history: self.history_path.clone(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from the optional file and the process environment.
    ///
    /// An explicitly given file must exist; the default file is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value is invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::load_with(file, Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with(
        file: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let file_source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE)
                .format(config::FileFormat::Toml)
                .required(false),
        };

        config::Config::builder()
            .add_source(file_source)
            .add_source(environment)
            .build()?
            .try_deserialize()
    }
}
