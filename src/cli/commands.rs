//! CLI Commands.
//!
//! Every command opens the ledger, runs against it, and reports what it did.
//! Mutating commands also report the events they committed.

use serde::Serialize;

use super::{CliApp, CliError, CliResult, CommandOutput, Executable};
use crate::core::token::{ExchangeRate, TokenAmount};
use crate::core::vault::CollateralAmount;
use crate::protocol::{OperationResult, Protocol, ProtocolOperation};
use crate::storage::DiskStore;
use crate::utils::constants::TOKEN_DECIMALS;
use crate::utils::crypto::{Address, QueryId};

// ═══════════════════════════════════════════════════════════════════════════════
// COMMAND ENUM
// ═══════════════════════════════════════════════════════════════════════════════

/// All available commands
#[derive(Debug, Clone)]
pub enum Command {
    /// Write the config file and start the epoch clock
    Init {
        /// Epoch length; the configured default when absent
        blocks_per_epoch: Option<u64>,
        /// Overwrite an existing config file
        force: bool,
        /// Current block
        block: u64,
    },
    /// Credit genesis collateral
    Endow {
        /// Recipient
        to: String,
        /// Amount
        amount: CollateralAmount,
    },
    /// Add collateral to the buffer
    Capitalize {
        /// Funder
        from: String,
        /// Amount
        amount: CollateralAmount,
        /// Current block
        block: u64,
    },
    /// Pay collateral in for tokens
    Buy {
        /// Buyer
        from: String,
        /// Payment
        payment: CollateralAmount,
        /// Current block
        block: u64,
    },
    /// Offer tokens for collateral
    Sell {
        /// Seller
        from: String,
        /// Tokens offered
        amount: TokenAmount,
        /// Current block
        block: u64,
    },
    /// Deliver a price as the oracle
    Settle {
        /// Query id in hex
        query_id: String,
        /// Cents per ether
        price: u64,
        /// Current block
        block: u64,
    },
    /// Drop a query whose deadline has passed
    Expire {
        /// Caller
        caller: String,
        /// Query id in hex
        query_id: String,
        /// Current block
        block: u64,
    },
    /// Rewards pool operations
    Rewards(RewardsCommand),
    /// Stake token operations
    Stake(StakeCommand),
    /// Aggregate protocol state
    Status {
        /// Block to evaluate epochs at
        block: u64,
        /// Price for the buffer figures
        price: Option<u64>,
    },
    /// Balances of one identity
    Balance {
        /// Identity
        holder: String,
    },
    /// Queries awaiting the oracle
    Queries,
}

impl Executable for Command {
    fn execute(&self, app: &CliApp) -> CliResult<CommandOutput> {
        match self {
            Command::Init {
                blocks_per_epoch,
                force,
                block,
            } => init(app, *blocks_per_epoch, *force, *block),
            Command::Endow { to, amount } => {
                let to = app.resolve(to)?;
                let deployer = app.resolve(&app.config().deployer)?;
                let op = ProtocolOperation::Endow { to, amount: *amount };
                run(app, &deployer, op, 0, format!("Endowed {} with {}", to, amount))
            }
            Command::Capitalize { from, amount, block } => {
                let caller = app.resolve(from)?;
                let op = ProtocolOperation::Capitalize { amount: *amount };
                run(app, &caller, op, *block, format!("Capitalized {}", amount))
            }
            Command::Buy { from, payment, block } => {
                let caller = app.resolve(from)?;
                let op = ProtocolOperation::Buy { payment: *payment };
                run(app, &caller, op, *block, "Buy requested; awaiting price".to_string())
            }
            Command::Sell { from, amount, block } => {
                let caller = app.resolve(from)?;
                let op = ProtocolOperation::Sell { amount: *amount };
                run(app, &caller, op, *block, "Sell requested; awaiting price".to_string())
            }
            Command::Settle {
                query_id,
                price,
                block,
            } => {
                let oracle = app.resolve(&app.config().oracle)?;
                let op = ProtocolOperation::Settle {
                    query_id: QueryId::from_hex(query_id)?,
                    price: ExchangeRate::from_cents_per_ether(*price),
                };
                run(app, &oracle, op, *block, "Query settled".to_string())
            }
            Command::Expire {
                caller,
                query_id,
                block,
            } => {
                let caller = app.resolve(caller)?;
                let op = ProtocolOperation::ExpireQuery {
                    query_id: QueryId::from_hex(query_id)?,
                };
                run(app, &caller, op, *block, "Query expired".to_string())
            }
            Command::Rewards(cmd) => cmd.execute(app),
            Command::Stake(cmd) => cmd.execute(app),
            Command::Status { block, price } => {
                let protocol = app.open()?;
                let status = protocol.status(*block, price.map(ExchangeRate::from_cents_per_ether))?;
                let mut output = CommandOutput::success_with_data("Protocol status", &status)?;
                if let Some(buffer) = status.buffer {
                    if buffer < 0 {
                        output = output.with_warning(format!(
                            "Collateral buffer is negative: {} wei short",
                            buffer.unsigned_abs()
                        ));
                    }
                }
                Ok(output)
            }
            Command::Balance { holder } => {
                let protocol = app.open()?;
                let holder = app.resolve(holder)?;
                let report = balance_report(&protocol, &holder)?;
                CommandOutput::success_with_data(format!("Balances of {}", holder), &report)
            }
            Command::Queries => {
                let protocol = app.open()?;
                let queries = protocol.pending_queries()?;
                CommandOutput::success_with_data(format!("{} pending queries", queries.len()), &queries)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWARDS COMMAND
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewards command variants
#[derive(Debug, Clone)]
pub enum RewardsCommand {
    /// Fund the current epoch pool
    Deposit {
        /// Funder
        from: String,
        /// Amount
        amount: CollateralAmount,
        /// Current block
        block: u64,
    },
    /// Claim every sealed epoch
    Withdraw {
        /// Stake holder
        holder: String,
        /// Current block
        block: u64,
    },
    /// Preview a withdrawal
    Claimable {
        /// Stake holder
        holder: String,
        /// Current block
        block: u64,
    },
}

impl Executable for RewardsCommand {
    fn execute(&self, app: &CliApp) -> CliResult<CommandOutput> {
        match self {
            RewardsCommand::Deposit { from, amount, block } => {
                let caller = app.resolve(from)?;
                let op = ProtocolOperation::DepositRewards { amount: *amount };
                run(app, &caller, op, *block, format!("Deposited {}", amount))
            }
            RewardsCommand::Withdraw { holder, block } => {
                let caller = app.resolve(holder)?;
                run(
                    app,
                    &caller,
                    ProtocolOperation::WithdrawRewards,
                    *block,
                    "Rewards withdrawn".to_string(),
                )
            }
            RewardsCommand::Claimable { holder, block } => {
                let protocol = app.open()?;
                let holder = app.resolve(holder)?;
                let claim = protocol.claimable(&holder, *block)?;
                CommandOutput::success_with_data(format!("Claimable by {}", holder), &claim)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAKE COMMAND
// ═══════════════════════════════════════════════════════════════════════════════

/// Stake command variants
#[derive(Debug, Clone)]
pub enum StakeCommand {
    /// Create stake as the deployer
    Mint {
        /// Recipient
        to: String,
        /// Stake units
        amount: u128,
        /// Current block
        block: u64,
    },
    /// Move stake
    Transfer {
        /// Sender
        from: String,
        /// Recipient
        to: String,
        /// Stake units
        amount: u128,
        /// Current block
        block: u64,
    },
}

impl Executable for StakeCommand {
    fn execute(&self, app: &CliApp) -> CliResult<CommandOutput> {
        match self {
            StakeCommand::Mint { to, amount, block } => {
                let deployer = app.resolve(&app.config().deployer)?;
                let to = app.resolve(to)?;
                let op = ProtocolOperation::MintStake { to, amount: *amount };
                run(app, &deployer, op, *block, format!("Minted {} stake to {}", amount, to))
            }
            StakeCommand::Transfer {
                from,
                to,
                amount,
                block,
            } => {
                let caller = app.resolve(from)?;
                let to = app.resolve(to)?;
                let op = ProtocolOperation::TransferStake { to, amount: *amount };
                run(app, &caller, op, *block, format!("Transferred {} stake to {}", amount, to))
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXECUTION HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn run(
    app: &CliApp,
    caller: &Address,
    op: ProtocolOperation,
    block: u64,
    message: String,
) -> CliResult<CommandOutput> {
    let mut protocol = app.open()?;
    let result = protocol.execute(caller, op, block)?;
    let events = protocol.drain_events();

    let mut output = CommandOutput::success_with_data(message, &result)?.with_events(&events)?;
    if let Err(e) = protocol.verify_invariants() {
        output = output.with_warning(e.to_string());
    }
    Ok(output)
}

fn init(app: &CliApp, blocks_per_epoch: Option<u64>, force: bool, block: u64) -> CliResult<CommandOutput> {
    let config = app.config();
    let path = config.path();
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists; use --force to overwrite",
            path.display()
        )));
    }
    let deployer = app.resolve(&config.deployer)?;
    let op = ProtocolOperation::Initialize { blocks_per_epoch };
    let mut protocol = app.open()?;
    let schedule = match protocol.execute(&deployer, op, block)? {
        OperationResult::Initialized(schedule) => schedule,
        other => {
            return Err(CliError::Output(format!("unexpected result: {:?}", other)));
        }
    };
    // Only a ledger this config initialized gets to replace the file
    config.save(&path)?;
    CommandOutput::success_with_data(format!("Initialized ledger in {}", config.data_dir.display()), &schedule)
}

/// Collateral and token balances of one identity
#[derive(Debug, Clone, Serialize)]
pub struct BalanceReport {
    /// Identity
    pub holder: Address,
    /// Native collateral held
    pub collateral: CollateralAmount,
    /// Tokens held
    pub tokens: TokenAmount,
    /// Collateral reserved against the tokens
    pub reserved: CollateralAmount,
    /// Current stake
    pub stake: u128,
    /// Last epoch paid out, if any
    pub last_withdrawal_epoch: Option<u64>,
}

fn balance_report(protocol: &Protocol<DiskStore>, holder: &Address) -> CliResult<BalanceReport> {
    Ok(BalanceReport {
        holder: *holder,
        collateral: protocol.collateral_of(holder)?,
        tokens: protocol.balance_of(holder)?,
        reserved: protocol.reserved_collateral(holder)?,
        stake: protocol.stake_of(holder)?,
        last_withdrawal_epoch: protocol.last_withdrawal_epoch(holder)?,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARGUMENT PARSING
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a collateral amount: plain wei (`1500`) or ether with a suffix
/// (`1.5eth`, `2 ether`)
pub fn parse_collateral(input: &str) -> CliResult<CollateralAmount> {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();
    let ether = lower
        .strip_suffix("ether")
        .or_else(|| lower.strip_suffix("eth"))
        .map(str::trim_end);

    match ether {
        Some(value) => parse_decimal(value, ETHER_DECIMALS).map(CollateralAmount::from_wei),
        None => parse_integer(trimmed).map(CollateralAmount::from_wei),
    }
}

/// Parse a token amount: plain cents (`1050`) or dollars with a `$` prefix
/// (`$10.50`)
pub fn parse_tokens(input: &str) -> CliResult<TokenAmount> {
    let trimmed = input.trim();
    match trimmed.strip_prefix('$') {
        Some(value) => parse_decimal(value, u32::from(TOKEN_DECIMALS)).map(TokenAmount::from_cents),
        None => parse_integer(trimmed).map(TokenAmount::from_cents),
    }
}

const ETHER_DECIMALS: u32 = 18;

fn parse_integer(input: &str) -> CliResult<u128> {
    input
        .replace('_', "")
        .parse::<u128>()
        .map_err(|_| CliError::InvalidArgument(format!("not an amount: '{}'", input)))
}

fn parse_decimal(input: &str, decimals: u32) -> CliResult<u128> {
    let invalid = || CliError::InvalidArgument(format!("not an amount: '{}'", input));
    let (whole, fraction) = match input.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (input, ""),
    };
    if fraction.len() > decimals as usize || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole = if whole.is_empty() { 0 } else { parse_integer(whole)? };
    let padded = format!("{:0<width$}", fraction, width = decimals as usize);
    let fraction = if padded.is_empty() {
        0
    } else {
        padded.parse::<u128>().map_err(|_| invalid())?
    };

    let scale = 10u128.pow(decimals);
    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(invalid)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliConfig;

    fn app() -> (tempfile::TempDir, CliApp) {
        let dir = tempfile::tempdir().unwrap();
        let app = CliApp::new(CliConfig::with_data_dir(dir.path()));
        (dir, app)
    }

    #[test]
    fn test_parse_collateral() {
        assert_eq!(parse_collateral("1500").unwrap().wei(), 1_500);
        assert_eq!(parse_collateral("1.5eth").unwrap().wei(), 1_500_000_000_000_000_000);
        assert_eq!(parse_collateral("2 ether").unwrap(), CollateralAmount::from_ether(2));
        assert_eq!(parse_collateral(".01ETH").unwrap().wei(), 10_000_000_000_000_000);
        assert!(parse_collateral("1.0000000000000000001eth").is_err());
        assert!(parse_collateral("abc").is_err());
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!(parse_tokens("1050").unwrap().cents(), 1_050);
        assert_eq!(parse_tokens("$10.5").unwrap().cents(), 1_050);
        assert_eq!(parse_tokens("$3").unwrap().cents(), 300);
        assert!(parse_tokens("$1.005").is_err());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let (_dir, app) = app();
        let init = Command::Init {
            blocks_per_epoch: Some(20),
            force: false,
            block: 0,
        };
        app.execute(init.clone()).unwrap();
        assert!(matches!(app.execute(init), Err(CliError::Config(_))));
    }

    #[test]
    fn test_forced_init_keeps_config_of_initialized_ledger() {
        let (dir, app) = app();
        app.execute(Command::Init {
            blocks_per_epoch: Some(20),
            force: false,
            block: 0,
        })
        .unwrap();

        let mut changed = CliConfig::with_data_dir(dir.path());
        changed.params.oracle_fee = 1;
        let err = CliApp::new(changed)
            .execute(Command::Init {
                blocks_per_epoch: Some(20),
                force: true,
                block: 5,
            })
            .unwrap_err();
        assert_eq!(err, CliError::Protocol(crate::error::Error::AlreadyInitialized));

        let saved = CliConfig::load(&app.config().path()).unwrap();
        assert_eq!(saved.params, app.config().params);
    }

    #[test]
    fn test_buy_settle_across_invocations() {
        let (_dir, app) = app();
        app.execute(Command::Init {
            blocks_per_epoch: Some(20),
            force: false,
            block: 0,
        })
        .unwrap();
        app.execute(Command::Endow {
            to: "alice".into(),
            amount: CollateralAmount::from_ether(1),
        })
        .unwrap();
        let output = app
            .execute(Command::Buy {
                from: "alice".into(),
                payment: CollateralAmount::from_ether(1),
                block: 1,
            })
            .unwrap();
        assert!(output.events.is_some());

        let pending = app.open().unwrap().pending_queries().unwrap();
        assert_eq!(pending.len(), 1);

        app.execute(Command::Settle {
            query_id: pending[0].id.to_hex(),
            price: 100_000,
            block: 2,
        })
        .unwrap();

        let protocol = app.open().unwrap();
        let alice = Address::derive("alice");
        assert_eq!(protocol.balance_of(&alice).unwrap().cents(), 98_461);
        assert!(protocol.pending_queries().unwrap().is_empty());
        assert_eq!(app.last_block().unwrap(), 2);

        let stale = app.execute(Command::Capitalize {
            from: "alice".into(),
            amount: CollateralAmount::from_wei(1),
            block: 1,
        });
        assert!(matches!(
            stale,
            Err(CliError::Protocol(crate::error::Error::InvalidParameter { .. }))
        ));
    }

    #[test]
    fn test_bincode_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CliConfig::with_data_dir(dir.path());
        config.storage = crate::storage::FileEncoding::Bincode;
        let app = CliApp::new(config);
        app.execute(Command::Init {
            blocks_per_epoch: Some(20),
            force: false,
            block: 3,
        })
        .unwrap();

        assert!(dir.path().join("ledger.bin").exists());
        assert!(!dir.path().join("ledger.json").exists());
        assert_eq!(app.last_block().unwrap(), 3);
    }

    #[test]
    fn test_failed_command_reports_protocol_error() {
        let (_dir, app) = app();
        let err = app
            .execute(Command::Buy {
                from: "alice".into(),
                payment: CollateralAmount::from_ether(1),
                block: 1,
            })
            .unwrap_err();
        assert_eq!(err, CliError::Protocol(crate::error::Error::NotInitialized));
    }
}
