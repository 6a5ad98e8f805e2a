//! relay_watch: subscribe to express relay chains and log what arrives
//!
//! Prints opportunities, bid status updates, chain updates and removals for
//! the chosen chains until interrupted or until the relay drops the
//! connection.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use express_relay_client::structured_logging::init_logging;
use express_relay_client::types::Opportunity;
use express_relay_client::{Client, ClientConfig, EventHandlers};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file; falls back to RELAY_* environment variables
    #[arg(short, long)]
    config: Option<String>,

    /// Chain ids to subscribe to
    #[arg(long = "chain", required = true)]
    chains: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json)?;

    let config = load_config(args.config.as_deref())?;
    info!(server_url = %config.server_url, chains = ?args.chains, "Starting relay_watch");

    let handlers = EventHandlers::new()
        .on_opportunity(|opportunity| async move {
            match &opportunity {
                Opportunity::Evm(opp) => info!(
                    chain_id = %opp.chain_id,
                    opportunity_id = %opp.opportunity_id,
                    target_contract = ?opp.target_contract,
                    sell_tokens = opp.sell_tokens.len(),
                    buy_tokens = opp.buy_tokens.len(),
                    "EVM opportunity"
                ),
                Opportunity::Svm(opp) => info!(
                    chain_id = %opp.chain_id,
                    opportunity_id = %opp.opportunity_id,
                    slot = opp.slot,
                    "SVM opportunity"
                ),
            }
        })
        .on_bid_status(|update| async move {
            info!(bid_id = %update.id, status = ?update.bid_status, "Bid status update");
        })
        .on_svm_chain_update(|update| async move {
            info!(
                chain_id = %update.chain_id,
                blockhash = %update.blockhash,
                prioritization_fee = update.latest_prioritization_fee,
                "Chain update"
            );
        })
        .on_remove_opportunities(|delete| async move {
            info!(removal = ?delete, "Opportunities removed");
        })
        .on_websocket_close(|reason| async move {
            warn!(reason = %reason, "Relay connection closed");
        });

    let client = Client::new(config, handlers).context("Failed to create relay client")?;
    client
        .subscribe_chains(&args.chains)
        .await
        .context("Failed to subscribe")?;
    info!("Subscribed, waiting for events");

    tokio::select! {
        closed = client.closed() => {
            closed.context("Relay connection lost")?;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    if let Err(e) = client.unsubscribe_chains(&args.chains).await {
        warn!(error = %e, "Unsubscribe failed");
    }
    client.close();
    info!("Shutting down gracefully...");
    Ok(())
}

/// Load configuration from file, or from the environment when no file is given
fn load_config(path: Option<&str>) -> Result<ClientConfig> {
    match path {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path)),
        None => ClientConfig::from_env().context("Failed to load config from environment"),
    }
}
