//! Client facade
//!
//! The one object callers construct. It owns the HTTP client, the WebSocket
//! channel and the handler table; the channel is opened lazily by the first
//! request that needs it.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{json, Value};
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::errors::{ClientError, Result};
use crate::http_client::HttpClient;
use crate::streaming::{ChannelState, EventHandlers, WebSocketChannel};
use crate::structured_logging::RelayLogger;
use crate::types::bid::BidResponseWire;
use crate::types::{
    from_value, BidCreate, BidId, BidStatus, BidStatusUpdate, BidSummary, Opportunity,
    OpportunityCreate, OpportunityDelete, OpportunityParams, Quote, QuoteRequest, SvmChainUpdate,
};

pub struct Client {
    config: ClientConfig,
    http: HttpClient,
    handlers: Arc<RwLock<EventHandlers>>,
    channel: WebSocketChannel,
    logger: RelayLogger,
}

impl Client {
    pub fn new(config: ClientConfig, handlers: EventHandlers) -> Result<Self> {
        config.validate()?;
        let handlers = Arc::new(RwLock::new(handlers));
        let http = HttpClient::new(&config)?;
        let channel = WebSocketChannel::from_config(&config, handlers.clone())?;
        let logger = RelayLogger::default();
        tracing::debug!(
            context_id = logger.context_id(),
            server_url = %config.server_url,
            handlers = ?*handlers.read(),
            "Relay client created"
        );

        Ok(Self {
            config,
            http,
            handlers,
            channel,
            logger,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    fn update_handlers(&self, update: impl FnOnce(EventHandlers) -> EventHandlers) {
        let mut handlers = self.handlers.write();
        *handlers = update(std::mem::take(&mut *handlers));
    }

    pub fn on_opportunity<F, Fut>(&self, f: F)
    where
        F: Fn(Opportunity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.update_handlers(|handlers| handlers.on_opportunity(f));
    }

    pub fn on_bid_status<F, Fut>(&self, f: F)
    where
        F: Fn(BidStatusUpdate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.update_handlers(|handlers| handlers.on_bid_status(f));
    }

    pub fn on_svm_chain_update<F, Fut>(&self, f: F)
    where
        F: Fn(SvmChainUpdate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.update_handlers(|handlers| handlers.on_svm_chain_update(f));
    }

    pub fn on_remove_opportunities<F, Fut>(&self, f: F)
    where
        F: Fn(OpportunityDelete) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.update_handlers(|handlers| handlers.on_remove_opportunities(f));
    }

    pub fn on_websocket_close<F, Fut>(&self, f: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.update_handlers(|handlers| handlers.on_websocket_close(f));
    }

    /// Open the WebSocket channel ahead of the first request
    pub async fn connect(&self) -> Result<()> {
        self.channel.connect().await
    }

    fn observe<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.logger.log_failure(operation, e);
        }
        result
    }

    fn require_opportunity_handler(&self, method: &str) -> Result<()> {
        if self.handlers.read().opportunity.is_none() {
            return Err(ClientError::CallerContract(format!(
                "{method} requires an opportunity handler"
            )));
        }
        Ok(())
    }

    async fn update_subscription(&self, method: &str, chain_ids: &[String]) -> Result<()> {
        self.require_opportunity_handler(method)?;
        let result = self
            .channel
            .request(method, json!({ "chain_ids": chain_ids }))
            .await
            .map(|_| ());
        if result.is_ok() {
            self.logger.log_subscription(method, chain_ids);
        }
        self.observe(method, result)
    }

    /// Start receiving opportunities for `chain_ids`
    pub async fn subscribe_chains(&self, chain_ids: &[String]) -> Result<()> {
        self.update_subscription("subscribe", chain_ids).await
    }

    pub async fn unsubscribe_chains(&self, chain_ids: &[String]) -> Result<()> {
        self.update_subscription("unsubscribe", chain_ids).await
    }

    /// Submit a bid
    ///
    /// With `subscribe_to_updates` the bid goes over the WebSocket and its
    /// status pushes reach the bid status handler; otherwise it is a plain
    /// HTTP POST. The bid is validated before anything is sent.
    pub async fn submit_bid(&self, bid: &BidCreate, subscribe_to_updates: bool) -> Result<BidId> {
        let result = if subscribe_to_updates {
            self.submit_bid_ws(bid).await
        } else {
            self.http.submit_bid(bid).await
        };
        if let Ok(bid_id) = &result {
            let via = if subscribe_to_updates { "ws" } else { "http" };
            self.logger.log_bid_submitted(bid.chain_id(), bid_id, via);
        }
        self.observe("submit_bid", result)
    }

    async fn submit_bid_ws(&self, bid: &BidCreate) -> Result<BidId> {
        bid.validate()?;
        let wire = bid.to_wire()?;
        let value = self.channel.request("post_bid", json!({ "bid": wire })).await?;
        let response: BidResponseWire = from_value("bid", &value)?;
        Ok(response.id)
    }

    /// Ask the relay to cancel a bid that has not been signed yet
    pub async fn cancel_bid(&self, bid_id: BidId, chain_id: &str) -> Result<()> {
        self.logger.log_bid_cancel(chain_id, &bid_id);
        let params = json!({ "data": { "bid_id": bid_id, "chain_id": chain_id } });
        let result = self.channel.request("cancel_bid", params).await.map(|_: Value| ());
        self.observe("cancel_bid", result)
    }

    pub async fn get_opportunities(&self, params: &OpportunityParams) -> Result<Vec<Opportunity>> {
        let result = self.http.get_opportunities(params).await;
        self.observe("get_opportunities", result)
    }

    pub async fn submit_opportunity(&self, opportunity: &OpportunityCreate) -> Result<Opportunity> {
        let result = self.http.submit_opportunity(opportunity).await;
        self.observe("submit_opportunity", result)
    }

    pub async fn remove_opportunities(&self, delete: &OpportunityDelete) -> Result<()> {
        let result = self.http.remove_opportunities(delete).await;
        self.observe("remove_opportunities", result)
    }

    pub async fn get_bids(&self, from_time: Option<DateTime<Utc>>) -> Result<Vec<BidSummary>> {
        let result = self.http.get_bids(from_time).await;
        self.observe("get_bids", result)
    }

    pub async fn get_bid_status(&self, bid_id: BidId) -> Result<BidStatus> {
        let result = self.http.get_bid_status(bid_id).await;
        self.observe("get_bid_status", result)
    }

    pub async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let result = self.http.get_quote(request).await;
        self.observe("get_quote", result)
    }

    pub async fn submit_quote(
        &self,
        chain_id: &str,
        reference_id: Uuid,
        user_signature: &Signature,
    ) -> Result<VersionedTransaction> {
        let result = self.http.submit_quote(chain_id, reference_id, user_signature).await;
        self.observe("submit_quote", result)
    }

    /// Close the WebSocket channel; HTTP calls keep working
    pub fn close(&self) {
        self.channel.close();
    }

    /// Resolve once the WebSocket channel has closed
    ///
    /// `Ok` after [`Client::close`], otherwise the transport error that ended
    /// the channel. A new `Client` is needed to reconnect.
    pub async fn closed(&self) -> Result<()> {
        self.channel.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BidSvm;
    use solana_sdk::{hash::Hash, transaction::Transaction};

    fn client(handlers: EventHandlers) -> Client {
        // Port 1 refuses connections; tests below must never dial it
        Client::new(ClientConfig::new("http://127.0.0.1:1"), handlers).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_without_opportunity_handler_is_caller_error() {
        let client = client(EventHandlers::new());
        let result = client.subscribe_chains(&["solana".to_string()]).await;
        assert!(matches!(result, Err(ClientError::CallerContract(_))));
        assert_eq!(client.channel_state(), ChannelState::Disconnected);

        let result = client.unsubscribe_chains(&["solana".to_string()]).await;
        assert!(matches!(result, Err(ClientError::CallerContract(_))));
    }

    #[tokio::test]
    async fn test_invalid_bid_rejected_before_connecting() {
        let client = client(EventHandlers::new());
        let mut transaction = Transaction::default();
        transaction.message.recent_blockhash = Hash::new_unique();
        let bid = BidCreate::Svm(BidSvm::OnChain {
            chain_id: "solana".to_string(),
            transaction,
            slot: None,
        });

        let result = client.submit_bid(&bid, true).await;
        assert!(matches!(result, Err(ClientError::Validation { .. })));
        assert_eq!(client.channel_state(), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn test_closed_resolves_after_caller_close() {
        let client = client(EventHandlers::new());
        client.close();
        assert!(client.closed().await.is_ok());
        assert_eq!(client.channel_state(), ChannelState::Closed);
    }

    #[test]
    fn test_handlers_registered_after_construction() {
        let client = client(EventHandlers::new());
        assert!(client.require_opportunity_handler("subscribe").is_err());
        client.on_opportunity(|_| async {});
        assert!(client.require_opportunity_handler("subscribe").is_ok());
    }
}
