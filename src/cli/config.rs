//! zkmpa configuration file handling
//!
//! Provides default configuration generation and loading for the zkmpa CLI.
//! Configuration files are TOML format and live in the platform data
//! directory unless `--config` points elsewhere.
//!
//! ## Protocol vs Operator Settings
//!
//! `[protocol]` holds approval policy (tree depth, proof timeout, root ages)
//! and maps onto [`zkmpa::ProtocolConfig`]. `[storage]` and `[logging]` are
//! deployment settings the operator controls.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use zkmpa::ProtocolConfig;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZkmpaConfig {
    /// Approval policy
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Where groups, roots, proposals and credentials are kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Nothing survives the process
    #[default]
    Memory,
    /// CBOR documents on disk
    File,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Store directory for the file backend (default: data dir/store)
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_store_path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl ZkmpaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: ZkmpaConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    #[allow(dead_code)]
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(store_path: &Path) -> String {
        format!(
            r#"# zkmpa Configuration
#
# [protocol] is approval policy. Durations are human-readable ("30s",
# "30days"); "none" disables an age bound.

[protocol]
# Merkle tree depth for new groups (capacity 2^depth members, 1..=32)
default_tree_depth = 20

# Ceiling on each proof generation or verification call
proof_timeout = "30s"

# Oldest group root a credential's evidence may cite
max_root_age = "30days"

# Oldest group root a vote may be proven against
vote_max_root_age = "none"

# Root records published in group documents and checked first on lookup
recent_root_window = 10

[storage]
# "memory" (nothing persists) or "file" (CBOR documents under path)
backend = "memory"
path = "{store_path}"

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG takes precedence)
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/zkmpa/zkmpa.log"
"#,
            store_path = store_path.display()
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        store_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(store_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Base directory for zkmpa data: `<data dir>/zkmpa`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zkmpa")
}

/// `<data dir>/zkmpa/config.toml`
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

/// `<data dir>/zkmpa/store`
pub fn default_store_path() -> PathBuf {
    default_data_dir().join("store")
}
