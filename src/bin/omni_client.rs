//! Omni client CLI
//!
//! Small operational tool over the library:
//! - `status`: node status and the configured account's access keys
//! - `balance <account>`: liquid balance of an account
//! - `quote <from> <to>`: best swap route through the solver network
//!
//! ## Usage
//!
//! ```bash
//! omni-client --config omni-client.toml quote nep141:wrap.near nep141:usdt.tether-token.near --amount-in 1000000000000000000000000
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! OMNI_CLIENT_CONFIG_PATH=omni-client.toml omni-client status
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use omni_client::{
    config::ClientConfig,
    router::{QuoteAmount, QuoteRouter, MAX_HOPS},
    rpc::{JsonRpcClient, LedgerRpc},
    solver_client::SolverGateway,
    AccountId, TokenId,
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "omni-client")]
#[command(about = "Ledger and solver network client")]
struct Args {
    /// Path to configuration file (default: config/omni-client.toml or OMNI_CLIENT_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show node status and the configured account's access keys
    Status,
    /// Show the liquid balance of an account
    Balance {
        account: String,
    },
    /// Find the best route between two assets
    Quote {
        from: String,
        to: String,
        /// Sell exactly this amount of `from`
        #[arg(long, conflicts_with = "exact_out", required_unless_present = "exact_out")]
        amount_in: Option<u128>,
        /// Buy exactly this amount of `to`
        #[arg(long)]
        exact_out: Option<u128>,
        #[arg(long, default_value_t = MAX_HOPS)]
        max_hops: u8,
    },
}

fn ledger(config: &ClientConfig) -> Result<LedgerRpc> {
    let transport = JsonRpcClient::new(&config.network).context("Failed to create RPC client")?;
    Ok(LedgerRpc::new(Arc::new(transport)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    let config = ClientConfig::load_from_path(args.config.as_deref())?;
    info!("Configuration loaded, RPC endpoints: {}", config.network.rpc_urls.len());

    match args.command {
        Command::Status => {
            let rpc = ledger(&config)?;
            let status = rpc.status().await.context("Failed to fetch node status")?;
            println!("chain_id: {}", status.chain_id);
            println!("version: {}", status.version.version);
            println!(
                "latest block: {} ({})",
                status.sync_info.latest_block_height, status.sync_info.latest_block_hash
            );
            if let Ok(account_id) = config.account_id() {
                let keys = rpc
                    .view_access_key_list(&account_id)
                    .await
                    .context("Failed to fetch access keys")?;
                println!("access keys of {}:", account_id);
                for key in keys.keys {
                    let kind = if key.access_key.is_full_access() {
                        "full access"
                    } else {
                        "function call"
                    };
                    println!("  {} nonce {} ({})", key.public_key, key.access_key.nonce, kind);
                }
            }
        }
        Command::Balance { account } => {
            let account_id: AccountId = account.parse()?;
            let view = ledger(&config)?
                .view_account(&account_id)
                .await
                .context("Failed to fetch account")?;
            println!("{} {} (locked {})", account_id, view.amount, view.locked);
        }
        Command::Quote {
            from,
            to,
            amount_in,
            exact_out,
            max_hops,
        } => {
            let from: TokenId = from.parse()?;
            let to: TokenId = to.parse()?;
            let amount = match (amount_in, exact_out) {
                (Some(a), _) => QuoteAmount::ExactIn(a),
                (None, Some(a)) => QuoteAmount::ExactOut(a),
                (None, None) => anyhow::bail!("One of --amount-in or --exact-out is required"),
            };
            let gateway = Arc::new(SolverGateway::new(&config.solver)?);
            let router = QuoteRouter::from_config(gateway, &config.router)?;
            match router.find_route(&from, &to, amount, max_hops).await? {
                Some(route) => {
                    println!("hops: {}", route.hops());
                    println!("amount_in: {}", route.amount_in());
                    println!("amount_out: {}", route.amount_out());
                    for leg in &route.legs {
                        println!("  {} -> {}: {} -> {}", leg.token_in, leg.token_out, leg.amount_in, leg.amount_out);
                    }
                    println!("quote_hashes: {}", route.quote_hashes().join(","));
                    if let Some(expires_at) = route.expires_at() {
                        println!("expires_at: {}", expires_at.to_rfc3339());
                    }
                }
                None => println!("No route found"),
            }
        }
    }

    Ok(())
}
