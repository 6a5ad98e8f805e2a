//! Structured logging and client context

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::errors::{ClientError, Result};

/// Structured logger for relay client events
///
/// Every event carries the `context_id` of the client that emitted it, so
/// logs from several clients in one process can be told apart.
#[derive(Debug, Clone)]
pub struct RelayLogger {
    context_id: String,
}

impl RelayLogger {
    pub fn new(context_id: String) -> Self {
        Self { context_id }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn log_subscription(&self, method: &str, chain_ids: &[String]) {
        tracing::info!(
            context_id = %self.context_id,
            method = %method,
            chain_ids = ?chain_ids,
            "Chain subscription changed"
        );
    }

    pub fn log_bid_submitted(&self, chain_id: &str, bid_id: &Uuid, via: &str) {
        tracing::info!(
            context_id = %self.context_id,
            chain_id = %chain_id,
            bid_id = %bid_id,
            via = %via,
            "Bid submitted"
        );
    }

    pub fn log_bid_cancel(&self, chain_id: &str, bid_id: &Uuid) {
        tracing::info!(
            context_id = %self.context_id,
            chain_id = %chain_id,
            bid_id = %bid_id,
            "Bid cancellation requested"
        );
    }

    pub fn log_failure(&self, operation: &str, error: &ClientError) {
        tracing::warn!(
            context_id = %self.context_id,
            operation = %operation,
            category = error.category(),
            error = %error,
            "Relay operation failed"
        );
    }
}

impl Default for RelayLogger {
    fn default() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the `verbose` default. With `json` set,
/// events are emitted as one JSON object per line.
pub fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "express_relay_client=debug,relay_watch=debug,info"
    } else {
        "express_relay_client=info,relay_watch=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    let initialised = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    initialised.map_err(|e| ClientError::Configuration(format!("logging already initialised: {e}")))
}
