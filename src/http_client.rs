//! HTTP client for the relay REST API
//!
//! Stateless request/response calls. Non-2xx answers surface as
//! [`ClientError::Http`] with the status and the raw response body; an empty
//! or `null` body where data is expected surfaces as [`ClientError::NoData`].

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::errors::{ClientError, Result};
use crate::types::bid::{BidResponseWire, BidsPageWire};
use crate::types::quote::{
    decode_versioned_transaction, QuoteWire, SubmitQuoteResponseWire, SubmitQuoteWire,
};
use crate::types::{
    decode_opportunities, from_value, BidCreate, BidId, BidStatus, BidSummary, Opportunity,
    OpportunityCreate, OpportunityDelete, OpportunityParams, Quote, QuoteRequest,
};

#[derive(Debug, Clone)]
pub struct HttpClient {
    base: String,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| ClientError::Configuration(format!("invalid api key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| ClientError::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            base: config.http_base().to_string(),
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base, path))
    }

    /// `{base}/v1/{chain_id}/quotes/submit` with `chain_id` escaped as one
    /// path segment
    fn quote_submit_url(&self, chain_id: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base)
            .map_err(|e| ClientError::Configuration(format!("invalid server_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Configuration("server_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["v1", chain_id, "quotes", "submit"]);
        Ok(url)
    }

    /// Send and return the raw body of a 2xx response
    async fn send(&self, builder: RequestBuilder, route: &str) -> Result<(StatusCode, String)> {
        let response = builder.send().await.map_err(|e| {
            metrics::counter!("relay_http_errors_total", "route" => route.to_string()).increment(1);
            ClientError::from(e)
        })?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(route, status = status.as_u16(), len = body.len(), "Relay HTTP response");

        if !status.is_success() {
            metrics::counter!("relay_http_errors_total", "route" => route.to_string()).increment(1);
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok((status, body))
    }

    /// Send and parse a JSON body that must be present
    async fn send_json(&self, builder: RequestBuilder, route: &str) -> Result<Value> {
        let (_, body) = self.send(builder, route).await?;
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Err(ClientError::NoData(route.to_string()));
        }
        serde_json::from_str(trimmed).map_err(|e| ClientError::invalid(route, e))
    }

    /// `GET /v1/opportunities`; malformed or unsupported items are skipped
    pub async fn get_opportunities(&self, params: &OpportunityParams) -> Result<Vec<Opportunity>> {
        let builder = self
            .request(Method::GET, "/v1/opportunities")
            .query(&params.to_query());
        let value = self.send_json(builder, "get_opportunities").await?;
        let items: Vec<Value> = from_value("opportunities", &value)?;
        Ok(decode_opportunities(&items))
    }

    /// `POST /v1/opportunities`
    pub async fn submit_opportunity(&self, opportunity: &OpportunityCreate) -> Result<Opportunity> {
        let builder = self
            .request(Method::POST, "/v1/opportunities")
            .json(&opportunity.to_wire());
        let value = self.send_json(builder, "submit_opportunity").await?;
        crate::types::decode_opportunity(&value)?
            .ok_or_else(|| ClientError::invalid("opportunity", "unsupported opportunity in response"))
    }

    /// `DELETE /v1/opportunities`; the relay answers 204
    pub async fn remove_opportunities(&self, delete: &OpportunityDelete) -> Result<()> {
        let builder = self
            .request(Method::DELETE, "/v1/opportunities")
            .json(&delete.to_wire());
        let (status, _) = self.send(builder, "remove_opportunities").await?;
        if status != StatusCode::NO_CONTENT {
            tracing::debug!(status = status.as_u16(), "Unexpected success status on opportunity removal");
        }
        Ok(())
    }

    /// `POST /v1/bids`
    pub async fn submit_bid(&self, bid: &BidCreate) -> Result<BidId> {
        bid.validate()?;
        let builder = self
            .request(Method::POST, "/v1/bids")
            .json(&bid.to_wire()?);
        let value = self.send_json(builder, "submit_bid").await?;
        let response: BidResponseWire = from_value("bid", &value)?;
        Ok(response.id)
    }

    /// `GET /v1/bids?from_time=...`
    pub async fn get_bids(&self, from_time: Option<DateTime<Utc>>) -> Result<Vec<BidSummary>> {
        let mut builder = self.request(Method::GET, "/v1/bids");
        if let Some(from_time) = from_time {
            builder = builder.query(&[("from_time", from_time.to_rfc3339())]);
        }
        let value = self.send_json(builder, "get_bids").await?;
        let page: BidsPageWire = from_value("items", &value)?;
        Ok(page.items)
    }

    /// `GET /v1/bids/{bid_id}`
    pub async fn get_bid_status(&self, bid_id: BidId) -> Result<BidStatus> {
        let builder = self.request(Method::GET, &format!("/v1/bids/{bid_id}"));
        let value = self.send_json(builder, "get_bid_status").await?;
        // Either the bare status or a full bid record carrying it
        match value.get("status") {
            Some(status) if status.is_object() => BidStatus::from_wire(status),
            _ => BidStatus::from_wire(&value),
        }
    }

    /// `POST /v1/opportunities/quote`
    pub async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let builder = self
            .request(Method::POST, "/v1/opportunities/quote")
            .json(&request.to_wire());
        let value = self.send_json(builder, "get_quote").await?;
        let wire: QuoteWire = from_value("quote", &value)?;
        Quote::from_wire(wire)
    }

    /// `POST /v1/{chain_id}/quotes/submit`; returns the fully signed transaction
    pub async fn submit_quote(
        &self,
        chain_id: &str,
        reference_id: Uuid,
        user_signature: &Signature,
    ) -> Result<VersionedTransaction> {
        let url = self.quote_submit_url(chain_id)?;
        let builder = self
            .client
            .request(Method::POST, url)
            .json(&SubmitQuoteWire::new(reference_id, user_signature));
        let value = self.send_json(builder, "submit_quote").await?;
        let response: SubmitQuoteResponseWire = from_value("transaction", &value)?;
        decode_versioned_transaction("transaction", &response.transaction)
    }
}
