//! CryptoFiat Protocol CLI
//!
//! Command-line interface for driving a CryptoFiat ledger stored on disk.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::{style, Term};

use cryptofiat::cli::{
    parse_collateral, parse_tokens, CliApp, CliConfig, Command, CommandOutput, RewardsCommand,
    StakeCommand,
};
use cryptofiat::core::token::TokenAmount;
use cryptofiat::core::vault::CollateralAmount;

/// CryptoFiat Protocol CLI - fiat-pegged tokens backed by native collateral
#[derive(Parser)]
#[command(name = "cryptofiat")]
#[command(author = "CryptoFiat Team")]
#[command(version = cryptofiat::VERSION)]
#[command(about = "Command-line interface for the CryptoFiat protocol", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to data directory
    #[arg(short, long, env = "CRYPTOFIAT_DATA_DIR", default_value = "~/.cryptofiat")]
    data_dir: PathBuf,

    /// Current block height; defaults to the last block the ledger committed
    #[arg(short, long, global = true)]
    block: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the configuration and start the epoch clock
    Init {
        /// Epoch length in blocks
        #[arg(long)]
        blocks_per_epoch: Option<u64>,

        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Credit genesis collateral (deployer)
    Endow {
        /// Recipient label or address
        to: String,

        /// Amount: wei, or ether with an `eth` suffix
        #[arg(value_parser = collateral_arg)]
        amount: CollateralAmount,
    },

    /// Add collateral to the buffer
    Capitalize {
        /// Funder label or address
        #[arg(short, long)]
        from: String,

        /// Amount: wei, or ether with an `eth` suffix
        #[arg(value_parser = collateral_arg)]
        amount: CollateralAmount,
    },

    /// Pay collateral for tokens
    Buy {
        /// Buyer label or address
        #[arg(short, long)]
        from: String,

        /// Payment: wei, or ether with an `eth` suffix
        #[arg(value_parser = collateral_arg)]
        payment: CollateralAmount,
    },

    /// Offer tokens for collateral
    Sell {
        /// Seller label or address
        #[arg(short, long)]
        from: String,

        /// Tokens: cents, or dollars with a `$` prefix
        #[arg(value_parser = tokens_arg)]
        amount: TokenAmount,
    },

    /// Deliver a price for a pending query (oracle)
    Settle {
        /// Query id in hex
        query_id: String,

        /// Price in cents per ether
        price: u64,
    },

    /// Expire a query whose deadline has passed
    Expire {
        /// Query id in hex
        query_id: String,

        /// Caller label or address
        #[arg(short, long, default_value = "keeper")]
        caller: String,
    },

    /// Rewards pool operations
    #[command(subcommand)]
    Rewards(RewardsCommands),

    /// Stake token operations
    #[command(subcommand)]
    Stake(StakeCommands),

    /// Protocol status
    Status {
        /// Price in cents per ether for the buffer figures
        #[arg(short, long)]
        price: Option<u64>,
    },

    /// Balances of an identity
    Balance {
        /// Label or address
        holder: String,
    },

    /// Queries awaiting the oracle
    Queries,
}

#[derive(Subcommand)]
enum RewardsCommands {
    /// Fund the current epoch pool
    Deposit {
        /// Funder label or address
        #[arg(short, long)]
        from: String,

        /// Amount: wei, or ether with an `eth` suffix
        #[arg(value_parser = collateral_arg)]
        amount: CollateralAmount,
    },

    /// Claim every sealed epoch
    Withdraw {
        /// Stake holder label or address
        holder: String,
    },

    /// Preview a withdrawal
    Claimable {
        /// Stake holder label or address
        holder: String,
    },
}

#[derive(Subcommand)]
enum StakeCommands {
    /// Create stake (deployer)
    Mint {
        /// Recipient label or address
        to: String,

        /// Stake units
        amount: u128,
    },

    /// Move stake
    Transfer {
        /// Sender label or address
        #[arg(short, long)]
        from: String,

        /// Recipient label or address
        to: String,

        /// Stake units
        amount: u128,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let term = Term::stdout();

    if let Err(e) = run_command(cli, &term) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(cli: Cli, term: &Term) -> anyhow::Result<()> {
    let data_dir = expand_path(&cli.data_dir)?;
    let config = CliConfig::load_or_default(&data_dir)?.apply_env()?;
    let app = CliApp::new(config).with_verbose(cli.verbose);

    let block = match cli.block {
        Some(block) => block,
        None => app.last_block()?,
    };
    let command = into_command(cli.command, block);
    let output = app.execute(command)?;
    print_output(term, &output)?;
    Ok(())
}

fn into_command(command: Commands, block: u64) -> Command {
    match command {
        Commands::Init {
            blocks_per_epoch,
            force,
        } => Command::Init {
            blocks_per_epoch,
            force,
            block,
        },
        Commands::Endow { to, amount } => Command::Endow { to, amount },
        Commands::Capitalize { from, amount } => Command::Capitalize { from, amount, block },
        Commands::Buy { from, payment } => Command::Buy { from, payment, block },
        Commands::Sell { from, amount } => Command::Sell { from, amount, block },
        Commands::Settle { query_id, price } => Command::Settle {
            query_id,
            price,
            block,
        },
        Commands::Expire { query_id, caller } => Command::Expire {
            caller,
            query_id,
            block,
        },
        Commands::Rewards(cmd) => Command::Rewards(match cmd {
            RewardsCommands::Deposit { from, amount } => RewardsCommand::Deposit { from, amount, block },
            RewardsCommands::Withdraw { holder } => RewardsCommand::Withdraw { holder, block },
            RewardsCommands::Claimable { holder } => RewardsCommand::Claimable { holder, block },
        }),
        Commands::Stake(cmd) => Command::Stake(match cmd {
            StakeCommands::Mint { to, amount } => StakeCommand::Mint { to, amount, block },
            StakeCommands::Transfer { from, to, amount } => StakeCommand::Transfer {
                from,
                to,
                amount,
                block,
            },
        }),
        Commands::Status { price } => Command::Status { block, price },
        Commands::Balance { holder } => Command::Balance { holder },
        Commands::Queries => Command::Queries,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

fn print_output(term: &Term, output: &CommandOutput) -> anyhow::Result<()> {
    term.write_line(&format!("{} {}", style("✓").green().bold(), output.message))?;

    if let Some(data) = &output.data {
        term.write_line(data)?;
    }

    if let Some(events) = &output.events {
        term.write_line(&format!("{}", style("Events:").cyan().bold()))?;
        term.write_line(events)?;
    }

    for warning in &output.warnings {
        term.write_line(&format!("{} {}", style("⚠").yellow().bold(), warning))?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn collateral_arg(s: &str) -> Result<CollateralAmount, String> {
    parse_collateral(s).map_err(|e| e.to_string())
}

fn tokens_arg(s: &str) -> Result<TokenAmount, String> {
    parse_tokens(s).map_err(|e| e.to_string())
}

fn expand_path(path: &PathBuf) -> anyhow::Result<PathBuf> {
    let path_str = path.to_string_lossy();
    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = std::env::var("HOME")
            .map_err(|_| anyhow::anyhow!("HOME is not set; cannot expand {}", path_str))?;
        Ok(PathBuf::from(home).join(rest))
    } else {
        Ok(path.clone())
    }
}
