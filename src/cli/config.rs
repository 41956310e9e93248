//! CLI Configuration.
//!
//! Where the ledger lives, who deployed it, and the parameters it was
//! deployed with. Loaded from `config.json` in the data directory, with
//! `CRYPTOFIAT_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::config::{ProtocolParams, StakeBasis};
use crate::storage::FileEncoding;

// ═══════════════════════════════════════════════════════════════════════════════
// CLI CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// File name of the configuration inside the data directory
pub const CONFIG_FILE: &str = "config.json";

/// CLI Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Data directory holding the ledger file
    pub data_dir: PathBuf,
    /// Deployer identity (label or hex address)
    pub deployer: String,
    /// Oracle callback identity (label or hex address)
    pub oracle: String,
    /// Encoding of the ledger file
    pub storage: FileEncoding,
    /// Deployment parameters
    pub params: ProtocolParams,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            deployer: "deployer".into(),
            oracle: "oracle".into(),
            storage: FileEncoding::default(),
            params: ProtocolParams::default(),
        }
    }
}

impl CliConfig {
    /// Configuration rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Load from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Load `config.json` from `data_dir` if present, otherwise defaults
    pub fn load_or_default(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    /// Apply `CRYPTOFIAT_*` environment overrides
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(dir) = std::env::var("CRYPTOFIAT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(deployer) = std::env::var("CRYPTOFIAT_DEPLOYER") {
            self.deployer = deployer;
        }

        if let Ok(oracle) = std::env::var("CRYPTOFIAT_ORACLE") {
            self.oracle = oracle;
        }

        if let Ok(storage) = std::env::var("CRYPTOFIAT_STORAGE") {
            self.storage = storage
                .parse::<FileEncoding>()
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }

        if let Ok(fee) = std::env::var("CRYPTOFIAT_ORACLE_FEE") {
            self.params.oracle_fee = parse_env("CRYPTOFIAT_ORACLE_FEE", &fee)?;
        }

        if let Ok(ttl) = std::env::var("CRYPTOFIAT_QUERY_TTL") {
            self.params.query_ttl_blocks = Some(parse_env("CRYPTOFIAT_QUERY_TTL", &ttl)?);
        }

        if let Ok(basis) = std::env::var("CRYPTOFIAT_STAKE_BASIS") {
            self.params.stake_basis = basis
                .parse::<StakeBasis>()
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }

        Ok(self)
    }

    /// Path of the config file inside the data directory
    pub fn path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deployer.is_empty() {
            return Err(ConfigError::Validation("deployer cannot be empty".into()));
        }

        if self.oracle.is_empty() {
            return Err(ConfigError::Validation("oracle cannot be empty".into()));
        }

        if self.deployer == self.oracle {
            return Err(ConfigError::Validation(
                "deployer and oracle must be distinct".into(),
            ));
        }

        self.params
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{} is not a valid number: {}", name, value)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// IO error
    Io(String),
    /// Parse error
    Parse(String),
    /// Serialization error
    Serialize(String),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::Serialize(msg) => write!(f, "Serialization error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Get default data directory
fn default_data_dir() -> PathBuf {
    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".cryptofiat");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("CryptoFiat");
        }
    }

    PathBuf::from(".cryptofiat")
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
