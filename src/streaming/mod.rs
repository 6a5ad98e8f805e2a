//! Push channel to the relay server
//!
//! - **websocket_stream**: the duplex connection, heartbeat and dispatch tasks
//! - **correlator**: request id assignment and response matching
//!
//! Server pushes are decoded into [`ServerEvent`] values and handed, in the
//! order the server sent them, to the handlers registered in
//! [`EventHandlers`]. Pushes without a registered handler are skipped.

pub mod correlator;
pub mod websocket_stream;

use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::types::{
    decode_opportunity, from_value, BidStatusUpdate, Opportunity, OpportunityDelete,
    SvmChainUpdate,
};
use crate::types::{OpportunityDeleteWire, SvmChainUpdateWire};

pub use correlator::{PendingRequest, RequestCorrelator};
pub use websocket_stream::{ChannelState, WebSocketChannel};

/// Unsolicited message pushed by the relay
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    NewOpportunity(Opportunity),
    BidStatusUpdate(BidStatusUpdate),
    SvmChainUpdate(SvmChainUpdate),
    RemoveOpportunities(OpportunityDelete),
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewOpportunity(_) => "new_opportunity",
            Self::BidStatusUpdate(_) => "bid_status_update",
            Self::SvmChainUpdate(_) => "svm_chain_update",
            Self::RemoveOpportunities(_) => "remove_opportunities",
        }
    }
}

/// Async callback invoked for one kind of push
pub type Handler<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

fn boxed<T, F, Fut>(f: F) -> Handler<T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |value| Box::pin(f(value)))
}

/// Handler table for pushes and for channel closure
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub opportunity: Option<Handler<Opportunity>>,
    pub bid_status: Option<Handler<BidStatusUpdate>>,
    pub svm_chain_update: Option<Handler<SvmChainUpdate>>,
    pub remove_opportunities: Option<Handler<OpportunityDelete>>,
    /// Receives the close reason; fires at most once per channel
    pub websocket_close: Option<Handler<String>>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_opportunity<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Opportunity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.opportunity = Some(boxed(f));
        self
    }

    pub fn on_bid_status<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(BidStatusUpdate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.bid_status = Some(boxed(f));
        self
    }

    pub fn on_svm_chain_update<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SvmChainUpdate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.svm_chain_update = Some(boxed(f));
        self
    }

    pub fn on_remove_opportunities<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(OpportunityDelete) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.remove_opportunities = Some(boxed(f));
        self
    }

    pub fn on_websocket_close<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.websocket_close = Some(boxed(f));
        self
    }

    /// Run the handler registered for `event`, if any
    pub async fn dispatch(&self, event: ServerEvent) {
        let kind = event.kind();
        let handled = match event {
            ServerEvent::NewOpportunity(opp) => run(&self.opportunity, opp).await,
            ServerEvent::BidStatusUpdate(update) => run(&self.bid_status, update).await,
            ServerEvent::SvmChainUpdate(update) => run(&self.svm_chain_update, update).await,
            ServerEvent::RemoveOpportunities(delete) => {
                run(&self.remove_opportunities, delete).await
            }
        };
        if !handled {
            tracing::debug!(kind, "No handler registered, skipping push");
        }
    }

    /// Run the close handler
    ///
    /// With no close handler registered this logs at error level and panics
    /// the dispatch task.
    pub async fn closed(&self, reason: String) {
        match &self.websocket_close {
            Some(handler) => handler(reason).await,
            None => {
                tracing::error!(reason = %reason, "Relay websocket closed with no close handler");
                panic!("relay websocket closed: {reason}");
            }
        }
    }
}

async fn run<T>(handler: &Option<Handler<T>>, value: T) -> bool {
    match handler {
        Some(handler) => {
            handler(value).await;
            true
        }
        None => false,
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("opportunity", &self.opportunity.is_some())
            .field("bid_status", &self.bid_status.is_some())
            .field("svm_chain_update", &self.svm_chain_update.is_some())
            .field("remove_opportunities", &self.remove_opportunities.is_some())
            .field("websocket_close", &self.websocket_close.is_some())
            .finish()
    }
}

/// Classified inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Incoming {
    /// Reply to a correlated request; `Err` carries the relay's error string
    Response {
        id: String,
        outcome: Result<Value, String>,
    },
    Push(ServerEvent),
    /// Well-formed but unusable (unsupported opportunity, malformed push)
    Dropped,
    /// Neither a response nor a recognised push
    Unrecognised,
}

pub(crate) fn parse_frame(text: &str) -> Incoming {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Received non-JSON frame");
            return Incoming::Unrecognised;
        }
    };

    if let Some(id) = value.get("id").and_then(response_id) {
        let result = value.get("result").cloned().unwrap_or(Value::Null);
        let outcome = match value.get("status").and_then(Value::as_str) {
            Some("success") => Ok(result),
            _ => Err(match result {
                Value::String(message) => message,
                other => other.to_string(),
            }),
        };
        return Incoming::Response { id, outcome };
    }

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Incoming::Unrecognised;
    };
    let decoded = match kind {
        "new_opportunity" => match value.get("opportunity").map(decode_opportunity) {
            Some(Ok(Some(opp))) => Ok(Some(ServerEvent::NewOpportunity(opp))),
            Some(Ok(None)) => Ok(None),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        },
        "bid_status_update" => from_value::<BidStatusUpdate>("status", field(&value, "status"))
            .map(|update| Some(ServerEvent::BidStatusUpdate(update))),
        "svm_chain_update" => from_value::<SvmChainUpdateWire>("update", field(&value, "update"))
            .and_then(SvmChainUpdate::from_wire)
            .map(|update| Some(ServerEvent::SvmChainUpdate(update))),
        "remove_opportunities" => from_value::<OpportunityDeleteWire>(
            "opportunity_delete",
            field(&value, "opportunity_delete"),
        )
        .and_then(OpportunityDelete::from_wire)
        .map(|delete| Some(ServerEvent::RemoveOpportunities(delete))),
        _ => return Incoming::Unrecognised,
    };

    match decoded {
        Ok(Some(event)) => Incoming::Push(event),
        Ok(None) => Incoming::Dropped,
        Err(e) => {
            tracing::warn!(kind, error = %e, "Dropping malformed push");
            Incoming::Dropped
        }
    }
}

fn response_id(id: &Value) -> Option<String> {
    match id {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn field<'a>(value: &'a Value, name: &str) -> &'a Value {
    value.get(name).unwrap_or(&Value::Null)
}
