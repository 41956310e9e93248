//! CryptoFiat Command Line Interface.
//!
//! Drives a protocol persisted in a JSON ledger file. Each command opens the
//! ledger, executes one operation atomically, and reports the result.

pub mod commands;
pub mod config;

pub use commands::*;
pub use config::*;

use serde::Serialize;
use tracing::debug;

use crate::protocol::{EventLog, Protocol};
use crate::storage::DiskStore;
use crate::utils::constants::ADDRESS_LENGTH;
use crate::utils::crypto::Address;

// ═══════════════════════════════════════════════════════════════════════════════
// CLI APPLICATION
// ═══════════════════════════════════════════════════════════════════════════════

/// CLI Application state
#[derive(Debug, Clone)]
pub struct CliApp {
    /// Configuration
    config: CliConfig,
    /// Verbose mode
    verbose: bool,
}

impl CliApp {
    /// Create new CLI application
    pub fn new(config: CliConfig) -> Self {
        Self {
            config,
            verbose: false,
        }
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Get configuration
    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    /// Check if verbose
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Resolve an identity argument: a 40-digit hex address, or a label
    /// hashed into one
    pub fn resolve(&self, identity: &str) -> CliResult<Address> {
        let hex = identity.strip_prefix("0x").unwrap_or(identity);
        if hex.len() == 2 * ADDRESS_LENGTH && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Address::from_hex(hex).map_err(CliError::from);
        }
        if identity.is_empty() {
            return Err(CliError::InvalidArgument("identity cannot be empty".into()));
        }
        Ok(Address::derive(identity))
    }

    /// Open the ledger under the data directory, deploying over it
    pub fn open(&self) -> CliResult<Protocol<DiskStore>> {
        self.config.validate()?;
        let deployer = self.resolve(&self.config.deployer)?;
        let oracle = self.resolve(&self.config.oracle)?;
        let store = DiskStore::open(&self.config.data_dir, self.config.storage)?;
        debug!(data_dir = %self.config.data_dir.display(), "ledger opened");
        Ok(Protocol::deploy(store, deployer, oracle, self.config.params.clone())?)
    }

    /// Highest block committed to the ledger, zero for a fresh one
    pub fn last_block(&self) -> CliResult<u64> {
        Ok(self.open()?.last_block()?)
    }

    /// Execute a command
    pub fn execute(&self, command: Command) -> CliResult<CommandOutput> {
        if self.verbose {
            debug!(?command, "executing");
        }
        command.execute(self)
    }
}

impl Default for CliApp {
    fn default() -> Self {
        Self::new(CliConfig::default())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLI RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// CLI Error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    /// Configuration error
    Config(String),
    /// Protocol operation failed
    Protocol(crate::error::Error),
    /// Invalid argument
    InvalidArgument(String),
    /// Output could not be rendered
    Output(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Protocol(err) => write!(f, "{} (code {})", err, err.code()),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Output(msg) => write!(f, "Output error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<crate::error::Error> for CliError {
    fn from(err: crate::error::Error) -> Self {
        CliError::Protocol(err)
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

/// CLI Result type
pub type CliResult<T> = std::result::Result<T, CliError>;

// ═══════════════════════════════════════════════════════════════════════════════
// COMMAND OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Command execution output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Output message
    pub message: String,
    /// Structured data, rendered as pretty JSON
    pub data: Option<String>,
    /// Events committed by the command, rendered as pretty JSON
    pub events: Option<String>,
    /// Warnings
    pub warnings: Vec<String>,
}

impl CommandOutput {
    /// Create success output
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
            events: None,
            warnings: Vec::new(),
        }
    }

    /// Create success with data.
    ///
    /// Rendered straight to text: wei amounts routinely exceed what a JSON
    /// value tree can hold.
    pub fn success_with_data<T: Serialize>(message: impl Into<String>, data: &T) -> CliResult<Self> {
        let rendered = serde_json::to_string_pretty(data).map_err(|e| CliError::Output(e.to_string()))?;
        Ok(Self {
            data: Some(rendered),
            ..Self::success(message)
        })
    }

    /// Attach the events a command committed
    pub fn with_events(mut self, events: &EventLog) -> CliResult<Self> {
        if !events.is_empty() {
            let rendered =
                serde_json::to_string_pretty(events.events()).map_err(|e| CliError::Output(e.to_string()))?;
            self.events = Some(rendered);
        }
        Ok(self)
    }

    /// Add warning
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMAND TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for executable commands
pub trait Executable {
    /// Execute the command
    fn execute(&self, app: &CliApp) -> CliResult<CommandOutput>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vault::CollateralAmount;

    #[test]
    fn test_cli_app_verbose() {
        let app = CliApp::default().with_verbose(true);
        assert!(app.is_verbose());
    }

    #[test]
    fn test_resolve_identity() {
        let app = CliApp::default();
        let alice = Address::derive("alice");
        assert_eq!(app.resolve("alice").unwrap(), alice);
        assert_eq!(app.resolve(&alice.to_hex()).unwrap(), alice);
        assert_eq!(app.resolve(&alice.to_string()).unwrap(), alice);
        assert!(app.resolve("").is_err());
    }

    #[test]
    fn test_output_renders_large_amounts() {
        let amount = CollateralAmount::from_ether(100);
        let output = CommandOutput::success_with_data("ok", &amount).unwrap();
        assert_eq!(output.data.as_deref(), Some("100000000000000000000"));
    }

    #[test]
    fn test_command_output_with_warning() {
        let output = CommandOutput::success("OK")
            .with_warning("Warning 1")
            .with_warning("Warning 2");
        assert_eq!(output.warnings.len(), 2);
    }

    #[test]
    fn test_cli_error_display() {
        let err = CliError::from(crate::error::Error::NothingToClaim);
        assert!(err.to_string().contains("4003"));
    }
}
