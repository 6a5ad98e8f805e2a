//! Bid submission and bid status types
//!
//! Bids are authored by the caller, so unlike opportunities they are never
//! forward compatible: unknown discriminators are validation errors.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::transaction::Transaction;

use super::{address_string, from_value, hex_string, BidId, ChainId, OpportunityId};
use crate::errors::{ClientError, Result};

/// Bid on an EVM permission key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidEvm {
    pub chain_id: ChainId,
    pub amount: U256,
    pub permission_key: Bytes,
    pub target_contract: Address,
    pub target_calldata: Bytes,
}

/// Bid on an SVM chain
///
/// Exactly one shape is selected by the wire `type` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidSvm {
    /// Transaction embedding its own `submit_bid` permission instruction
    OnChain {
        chain_id: ChainId,
        transaction: Transaction,
        slot: Option<u64>,
    },
    /// Transaction for a swap opportunity; the relay resolves permissioning
    /// from the opportunity id
    Swap {
        chain_id: ChainId,
        transaction: Transaction,
        opportunity_id: OpportunityId,
    },
}

impl BidSvm {
    pub fn chain_id(&self) -> &str {
        match self {
            Self::OnChain { chain_id, .. } | Self::Swap { chain_id, .. } => chain_id,
        }
    }

    pub fn transaction(&self) -> &Transaction {
        match self {
            Self::OnChain { transaction, .. } | Self::Swap { transaction, .. } => transaction,
        }
    }

    pub fn transaction_mut(&mut self) -> &mut Transaction {
        match self {
            Self::OnChain { transaction, .. } | Self::Swap { transaction, .. } => transaction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidCreate {
    Evm(BidEvm),
    Svm(BidSvm),
}

impl BidCreate {
    pub fn chain_id(&self) -> &str {
        match self {
            Self::Evm(bid) => &bid.chain_id,
            Self::Svm(bid) => bid.chain_id(),
        }
    }

    /// Pre-flight checks run before any frame or request is sent
    pub fn validate(&self) -> Result<()> {
        if self.chain_id().is_empty() {
            return Err(ClientError::invalid("chain_id", "must not be empty"));
        }
        match self {
            Self::Evm(bid) => {
                if bid.permission_key.is_empty() {
                    return Err(ClientError::invalid("permission_key", "must not be empty"));
                }
                if bid.target_contract.is_zero() {
                    return Err(ClientError::invalid("target_contract", "zero address"));
                }
            }
            Self::Svm(bid) => {
                let message = &bid.transaction().message;
                if message.account_keys.is_empty() {
                    return Err(ClientError::invalid("transaction", "missing fee payer"));
                }
                if message.instructions.is_empty() {
                    return Err(ClientError::invalid("transaction", "no instructions"));
                }
            }
        }
        Ok(())
    }

    pub fn to_wire(&self) -> Result<Value> {
        Ok(match self {
            Self::Evm(bid) => json!({
                "chain_id": bid.chain_id,
                "amount": bid.amount.to_string(),
                "permission_key": hex_string(&bid.permission_key),
                "target_contract": address_string(&bid.target_contract),
                "target_calldata": hex_string(&bid.target_calldata),
            }),
            Self::Svm(BidSvm::OnChain {
                chain_id,
                transaction,
                slot,
            }) => json!({
                "type": "onchain",
                "chain_id": chain_id,
                "transaction": encode_transaction(transaction)?,
                "slot": slot,
            }),
            Self::Svm(BidSvm::Swap {
                chain_id,
                transaction,
                opportunity_id,
            }) => json!({
                "type": "swap",
                "chain_id": chain_id,
                "transaction": encode_transaction(transaction)?,
                "opportunity_id": opportunity_id,
            }),
        })
    }
}

pub(crate) fn encode_transaction(transaction: &Transaction) -> Result<String> {
    let bytes = bincode::serialize(transaction).map_err(|e| ClientError::invalid("transaction", e))?;
    Ok(BASE64.encode(bytes))
}

/// Per-bid auction state
///
/// `result` carries the transaction hash (EVM) or signature (SVM); `index`
/// is the position inside a landed EVM multicall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    AwaitingSignature {
        result: String,
    },
    Submitted {
        result: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u32>,
    },
    Won {
        result: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u32>,
    },
    Lost {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u32>,
    },
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    Expired {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    Cancelled,
}

impl BidStatus {
    pub fn from_wire(value: &Value) -> Result<Self> {
        from_value("bid_status", value)
    }

    /// No further transitions are possible
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Won { .. }
                | Self::Lost { .. }
                | Self::Failed { .. }
                | Self::Expired { .. }
                | Self::Cancelled
        )
    }
}

/// Payload of a `bid_status_update` push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidStatusUpdate {
    pub id: BidId,
    pub bid_status: BidStatus,
}

/// Response to a bid submission
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BidResponseWire {
    pub id: BidId,
}

/// Bid amount as reported by `GET /v1/bids`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BidAmount {
    /// SVM lamports
    Native(u64),
    /// EVM wei, decimal string
    Decimal(String),
}

/// Entry of the bid history listing
#[derive(Debug, Clone, Deserialize)]
pub struct BidSummary {
    pub id: BidId,
    pub chain_id: ChainId,
    pub bid_amount: BidAmount,
    pub status: BidStatus,
    pub initiation_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BidsPageWire {
    pub items: Vec<BidSummary>,
}
