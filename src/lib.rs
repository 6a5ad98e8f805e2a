//! Express relay client
//!
//! Typed client for an express relay auction server: opportunity and bid
//! codecs, a WebSocket push channel with request correlation, an HTTP client,
//! and EVM/SVM bid construction.

pub mod client;
pub mod config;
pub mod errors;
pub mod http_client;
pub mod streaming;
pub mod structured_logging;
pub mod tx_builder;
pub mod types;

pub use client::Client;
pub use config::{ClientConfig, WsConfig};
pub use errors::{ClientError, Result};
pub use http_client::HttpClient;
pub use streaming::{ChannelState, EventHandlers, ServerEvent, WebSocketChannel};

// Re-export commonly used chain types
pub use ethers::types::{Address, Bytes, U256};
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
