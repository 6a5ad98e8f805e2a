//! Request/response correlation over the WebSocket channel
//!
//! Every outbound request gets a strictly increasing id (decimal string of a
//! counter) and an entry in the pending table. The entry is removed exactly
//! once: by its response, by channel closure, or when its
//! [`PendingRequest`] handle is dropped (timeout or an abandoned caller).
//! Responses for ids no longer in the table are dropped without error.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::errors::{ClientError, Result};

type Completion = oneshot::Sender<Result<Value>>;
type PendingTable = Arc<DashMap<String, Completion>>;

/// Handle for one in-flight request
///
/// Dropping the handle removes its entry from the pending table.
#[derive(Debug)]
pub struct PendingRequest {
    id: String,
    rx: oneshot::Receiver<Result<Value>>,
    table: PendingTable,
}

impl PendingRequest {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

#[derive(Debug)]
pub struct RequestCorrelator {
    next_id: AtomicU64,
    pending: PendingTable,
    timeout: Duration,
}

impl RequestCorrelator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            pending: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Assign the next id and open a pending entry for it
    pub fn register(&self) -> PendingRequest {
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        PendingRequest {
            id,
            rx,
            table: self.pending.clone(),
        }
    }

    /// Complete the entry for `id`; returns `false` if no entry exists
    pub fn resolve(&self, id: &str, outcome: std::result::Result<Value, String>) -> bool {
        let Some((_, tx)) = self.pending.remove(id) else {
            tracing::debug!(request_id = id, "Dropping response for unknown or expired request");
            return false;
        };
        // The waiter may have been dropped by its caller; nothing to do then
        let _ = tx.send(outcome.map_err(ClientError::Relay));
        true
    }

    /// Wait for the response for at most the configured timeout
    ///
    /// The entry is gone once this returns, whatever the outcome.
    pub async fn wait(&self, mut pending: PendingRequest) -> Result<Value> {
        match tokio::time::timeout(self.timeout, &mut pending.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::transport(format!(
                "request {} abandoned: channel closed",
                pending.id
            ))),
            Err(_) => {
                metrics::counter!("relay_ws_request_timeouts_total").increment(1);
                tracing::warn!(request_id = %pending.id, timeout_ms = self.timeout_ms(), "Request timed out");
                Err(ClientError::CorrelationTimeout {
                    request_id: pending.id.clone(),
                    timeout_ms: self.timeout_ms(),
                })
            }
        }
    }

    /// Fail every pending request, e.g. when the channel closes
    pub fn fail_all(&self, reason: &str) {
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(ClientError::transport(reason)));
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}
