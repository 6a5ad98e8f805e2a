//! Typed domain model and wire codec
//!
//! Wire payloads arrive as JSON. Each payload is first deserialised into a
//! `*Wire` shape that mirrors the server schema with plain strings, then
//! validated into the typed model (`Address`, `U256`, `Pubkey`, ...). The
//! conversion is lossless: typed values can be re-encoded into the same wire
//! shape.
//!
//! ## Forward compatibility
//!
//! Opportunities are server-authored and the server may start emitting
//! versions or programs this client does not know. Those are dropped with a
//! warning (`Ok(None)`) instead of failing the batch. Bids and bid statuses
//! are strict: an unknown discriminator there is a `Validation` error.

pub mod bid;
pub mod evm;
pub mod quote;
pub mod svm;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::{hash::Hash, pubkey::Pubkey};
use uuid::Uuid;

use crate::errors::{ClientError, Result};

pub use bid::{BidCreate, BidEvm, BidStatus, BidStatusUpdate, BidSummary, BidSvm};
pub use evm::{OpportunityCreateEvm, OpportunityEvm, TokenAmountEvm};
pub use quote::{Quote, QuoteRequest, ReferralFeeInfo, SpecifiedTokenAmount, TokenAmountSvm};
pub use svm::{
    FeeToken, OpportunityCreateSvm, OpportunitySvm, OpportunitySvmLimo, OpportunitySvmProgram,
    OpportunitySvmSwap, ProgramSvm, SpecifiedAmount, SwapTokens, TokenAccountInitializationConfig,
    TokenAccountInitializationConfigs,
};

/// Chain identifier as used by the relay (`"solana"`, `"op_sepolia"`, ...)
pub type ChainId = String;

/// Server-assigned opportunity id
pub type OpportunityId = Uuid;

/// Server-assigned bid id
pub type BidId = Uuid;

/// The only opportunity wire version this client understands
pub const SUPPORTED_OPPORTUNITY_VERSION: &str = "v1";

/// An executable intent discovered off-chain
#[derive(Debug, Clone, PartialEq)]
pub enum Opportunity {
    Evm(OpportunityEvm),
    Svm(OpportunitySvm),
}

impl Opportunity {
    pub fn chain_id(&self) -> &str {
        match self {
            Self::Evm(opp) => &opp.chain_id,
            Self::Svm(opp) => &opp.chain_id,
        }
    }

    pub fn opportunity_id(&self) -> OpportunityId {
        match self {
            Self::Evm(opp) => opp.opportunity_id,
            Self::Svm(opp) => opp.opportunity_id,
        }
    }
}

/// Decode one opportunity wire payload
///
/// Returns `Ok(None)` for payloads this client cannot represent: an
/// unsupported `version`, an unknown `program`, or any other unknown
/// discriminator. Returns `Err` only when a known shape carries malformed
/// data.
pub fn decode_opportunity(value: &Value) -> Result<Option<Opportunity>> {
    let version = value.get("version").and_then(Value::as_str);
    if version != Some(SUPPORTED_OPPORTUNITY_VERSION) {
        tracing::warn!(
            version = ?version,
            supported = SUPPORTED_OPPORTUNITY_VERSION,
            "Dropping opportunity with unsupported version"
        );
        return Ok(None);
    }

    if value.get("program").is_some() {
        return Ok(svm::decode_svm_opportunity(value)?.map(Opportunity::Svm));
    }
    if value.get("target_contract").is_some() {
        let wire: evm::OpportunityEvmWire = from_value("opportunity", value)?;
        return OpportunityEvm::from_wire(wire).map(|opp| Some(Opportunity::Evm(opp)));
    }

    tracing::warn!("Dropping opportunity with unrecognised shape");
    Ok(None)
}

/// Decode a batch, skipping malformed or unsupported items
pub fn decode_opportunities(values: &[Value]) -> Vec<Opportunity> {
    values
        .iter()
        .filter_map(|value| match decode_opportunity(value) {
            Ok(opp) => opp,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed opportunity");
                None
            }
        })
        .collect()
}

/// Payload of a `remove_opportunities` push and body of `DELETE /v1/opportunities`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpportunityDelete {
    Evm {
        chain_id: ChainId,
        permission_key: Bytes,
    },
    Svm {
        chain_id: ChainId,
        program: ProgramSvm,
        permission_account: Pubkey,
        router: Pubkey,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "chain_type", rename_all = "snake_case")]
pub enum OpportunityDeleteWire {
    Evm {
        chain_id: String,
        permission_key: String,
    },
    Svm {
        chain_id: String,
        program: ProgramSvm,
        permission_account: String,
        router: String,
    },
}

impl OpportunityDelete {
    pub fn from_wire(wire: OpportunityDeleteWire) -> Result<Self> {
        Ok(match wire {
            OpportunityDeleteWire::Evm {
                chain_id,
                permission_key,
            } => Self::Evm {
                chain_id,
                permission_key: parse_hex_bytes("permission_key", &permission_key)?,
            },
            OpportunityDeleteWire::Svm {
                chain_id,
                program,
                permission_account,
                router,
            } => Self::Svm {
                chain_id,
                program,
                permission_account: parse_pubkey("permission_account", &permission_account)?,
                router: parse_pubkey("router", &router)?,
            },
        })
    }

    pub fn to_wire(&self) -> OpportunityDeleteWire {
        match self {
            Self::Evm {
                chain_id,
                permission_key,
            } => OpportunityDeleteWire::Evm {
                chain_id: chain_id.clone(),
                permission_key: hex_string(permission_key),
            },
            Self::Svm {
                chain_id,
                program,
                permission_account,
                router,
            } => OpportunityDeleteWire::Svm {
                chain_id: chain_id.clone(),
                program: *program,
                permission_account: permission_account.to_string(),
                router: router.to_string(),
            },
        }
    }
}

/// Opportunity to publish through `POST /v1/opportunities`
#[derive(Debug, Clone, PartialEq)]
pub enum OpportunityCreate {
    Evm(OpportunityCreateEvm),
    Svm(OpportunityCreateSvm),
}

impl OpportunityCreate {
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Evm(opp) => opp.to_wire(),
            Self::Svm(opp) => opp.to_wire(),
        }
    }
}

/// Periodic per-chain state pushed to SVM subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvmChainUpdate {
    pub chain_id: ChainId,
    pub blockhash: Hash,
    pub latest_prioritization_fee: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmChainUpdateWire {
    pub chain_id: String,
    pub blockhash: String,
    pub latest_prioritization_fee: u64,
}

impl SvmChainUpdate {
    pub fn from_wire(wire: SvmChainUpdateWire) -> Result<Self> {
        let blockhash =
            Hash::from_str(&wire.blockhash).map_err(|e| ClientError::invalid("blockhash", e))?;
        Ok(Self {
            chain_id: wire.chain_id,
            blockhash,
            latest_prioritization_fee: wire.latest_prioritization_fee,
        })
    }
}

/// Live or historical opportunity listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityMode {
    Live,
    Historical,
}

/// Query for `GET /v1/opportunities`
#[derive(Debug, Clone, Default)]
pub struct OpportunityParams {
    pub chain_id: Option<ChainId>,
    pub mode: Option<OpportunityMode>,
    pub permission_key: Option<Bytes>,
    pub from_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl OpportunityParams {
    /// Server-side cap on `limit`
    pub const MAX_LIMIT: usize = 100;

    pub fn for_chain(chain_id: impl Into<ChainId>) -> Self {
        Self {
            chain_id: Some(chain_id.into()),
            ..Default::default()
        }
    }

    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(chain_id) = &self.chain_id {
            query.push(("chain_id", chain_id.clone()));
        }
        if let Some(mode) = self.mode {
            let mode = match mode {
                OpportunityMode::Live => "live",
                OpportunityMode::Historical => "historical",
            };
            query.push(("mode", mode.to_string()));
        }
        if let Some(key) = &self.permission_key {
            query.push(("permission_key", hex_string(key)));
        }
        if let Some(from_time) = &self.from_time {
            query.push(("from_time", from_time.to_rfc3339()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.min(Self::MAX_LIMIT).to_string()));
        }
        query
    }
}

// Field-level parsers shared by the codec

pub(crate) fn from_value<T: serde::de::DeserializeOwned>(field: &str, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| ClientError::invalid(field, e))
}

pub(crate) fn parse_evm_address(field: &str, value: &str) -> Result<Address> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| ClientError::invalid(field, "missing 0x prefix"))?;
    if digits.len() != 40 {
        return Err(ClientError::invalid(
            field,
            format!("expected 40 hex chars, got {}", digits.len()),
        ));
    }
    let bytes = hex::decode(digits).map_err(|e| ClientError::invalid(field, e))?;
    Ok(Address::from_slice(&bytes))
}

pub(crate) fn parse_hex_bytes(field: &str, value: &str) -> Result<Bytes> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| ClientError::invalid(field, "missing 0x prefix"))?;
    let bytes = hex::decode(digits).map_err(|e| ClientError::invalid(field, e))?;
    Ok(Bytes::from(bytes))
}

pub(crate) fn parse_u256(field: &str, value: &str) -> Result<U256> {
    U256::from_dec_str(value)
        .map_err(|_| ClientError::invalid(field, format!("invalid decimal amount {value:?}")))
}

pub(crate) fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value).map_err(|e| ClientError::invalid(field, e))
}

pub(crate) fn hex_string(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub(crate) fn address_string(address: &Address) -> String {
    format!("{address:?}")
}
