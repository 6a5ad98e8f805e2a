//! Swap quote request/response types

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use uuid::Uuid;

use super::{parse_pubkey, ChainId};
use crate::errors::{ClientError, Result};

/// Which side of the swap the requested amount refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "side", content = "amount", rename_all = "snake_case")]
pub enum SpecifiedTokenAmount {
    Input(u64),
    Output(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralFeeInfo {
    pub router: Pubkey,
    pub referral_fee_bps: u16,
}

/// Request for a swap quote
///
/// Without `user_wallet_address` the relay only returns an indicative price
/// and no signable transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub chain_id: ChainId,
    pub input_token_mint: Pubkey,
    pub output_token_mint: Pubkey,
    pub specified_token_amount: SpecifiedTokenAmount,
    pub referral_fee_info: Option<ReferralFeeInfo>,
    pub user_wallet_address: Option<Pubkey>,
    pub memo: Option<String>,
    /// Minimum lifetime of the quote in seconds
    pub minimum_lifetime: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
struct ReferralFeeInfoWire {
    router: String,
    referral_fee_bps: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteRequestWire {
    version: &'static str,
    chain_id: String,
    input_token_mint: String,
    output_token_mint: String,
    specified_token_amount: SpecifiedTokenAmount,
    referral_fee_info: Option<ReferralFeeInfoWire>,
    user_wallet_address: Option<String>,
    memo: Option<String>,
    minimum_lifetime: Option<u32>,
}

impl QuoteRequest {
    pub fn to_wire(&self) -> QuoteRequestWire {
        QuoteRequestWire {
            version: "v1",
            chain_id: self.chain_id.clone(),
            input_token_mint: self.input_token_mint.to_string(),
            output_token_mint: self.output_token_mint.to_string(),
            specified_token_amount: self.specified_token_amount,
            referral_fee_info: self.referral_fee_info.map(|info| ReferralFeeInfoWire {
                router: info.router.to_string(),
                referral_fee_bps: info.referral_fee_bps,
            }),
            user_wallet_address: self.user_wallet_address.map(|wallet| wallet.to_string()),
            memo: self.memo.clone(),
            minimum_lifetime: self.minimum_lifetime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmountSvm {
    pub token: Pubkey,
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenAmountSvmWire {
    pub token: String,
    pub amount: u64,
}

impl TokenAmountSvm {
    fn from_wire(field: &str, wire: &TokenAmountSvmWire) -> Result<Self> {
        Ok(Self {
            token: parse_pubkey(&format!("{field}.token"), &wire.token)?,
            amount: wire.amount,
        })
    }
}

/// Quote returned by the relay
#[derive(Debug, Clone)]
pub struct Quote {
    pub chain_id: ChainId,
    pub expiration_time: DateTime<Utc>,
    pub input_token: TokenAmountSvm,
    pub output_token: TokenAmountSvm,
    /// Absent for indicative-only quotes
    pub transaction: Option<VersionedTransaction>,
    /// Used to submit the user's signature later
    pub reference_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteWire {
    pub chain_id: String,
    /// Unix seconds
    pub expiration_time: i64,
    pub input_token: TokenAmountSvmWire,
    pub output_token: TokenAmountSvmWire,
    #[serde(default)]
    pub transaction: Option<String>,
    pub reference_id: Uuid,
}

impl Quote {
    pub fn from_wire(wire: QuoteWire) -> Result<Self> {
        let expiration_time = DateTime::from_timestamp(wire.expiration_time, 0)
            .ok_or_else(|| ClientError::invalid("expiration_time", "out of range"))?;
        let transaction = wire
            .transaction
            .as_deref()
            .map(|encoded| decode_versioned_transaction("transaction", encoded))
            .transpose()?;
        Ok(Self {
            chain_id: wire.chain_id,
            expiration_time,
            input_token: TokenAmountSvm::from_wire("input_token", &wire.input_token)?,
            output_token: TokenAmountSvm::from_wire("output_token", &wire.output_token)?,
            transaction,
            reference_id: wire.reference_id,
        })
    }

    /// Whether the quote only carries a price
    pub fn is_indicative(&self) -> bool {
        self.transaction.is_none()
    }
}

/// Body of `POST /v1/{chain_id}/quotes/submit`
#[derive(Debug, Clone, Serialize)]
pub struct SubmitQuoteWire {
    pub reference_id: Uuid,
    pub user_signature: String,
}

impl SubmitQuoteWire {
    pub fn new(reference_id: Uuid, user_signature: &Signature) -> Self {
        Self {
            reference_id,
            user_signature: user_signature.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitQuoteResponseWire {
    pub transaction: String,
}

pub(crate) fn decode_versioned_transaction(
    field: &str,
    encoded: &str,
) -> Result<VersionedTransaction> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| ClientError::invalid(field, e))?;
    bincode::deserialize(&bytes).map_err(|e| ClientError::invalid(field, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let router = Pubkey::new_unique();
        let request = QuoteRequest {
            chain_id: "solana".to_string(),
            input_token_mint: Pubkey::new_unique(),
            output_token_mint: Pubkey::new_unique(),
            specified_token_amount: SpecifiedTokenAmount::Input(10_000),
            referral_fee_info: Some(ReferralFeeInfo {
                router,
                referral_fee_bps: 10,
            }),
            user_wallet_address: None,
            memo: None,
            minimum_lifetime: Some(30),
        };
        let wire = serde_json::to_value(request.to_wire()).unwrap();
        assert_eq!(
            wire["specified_token_amount"],
            json!({ "side": "input", "amount": 10_000 })
        );
        assert_eq!(wire["referral_fee_info"]["router"], router.to_string());
        assert_eq!(wire["user_wallet_address"], json!(null));
        assert_eq!(wire["minimum_lifetime"], 30);
        assert_eq!(wire["version"], "v1");
    }

    #[test]
    fn test_indicative_quote() {
        let wire: QuoteWire = serde_json::from_value(json!({
            "chain_id": "solana",
            "expiration_time": 1_700_000_030i64,
            "input_token": { "token": Pubkey::new_unique().to_string(), "amount": 10_000u64 },
            "output_token": { "token": Pubkey::new_unique().to_string(), "amount": 1_503u64 },
            "reference_id": "7f3a4f5e-3c2b-4d1e-8f9a-0b1c2d3e4f50",
        }))
        .unwrap();
        let quote = Quote::from_wire(wire).unwrap();
        assert!(quote.is_indicative());
        assert_eq!(quote.output_token.amount, 1_503);
        assert_eq!(quote.expiration_time.timestamp(), 1_700_000_030);
    }

    #[test]
    fn test_bad_transaction_is_validation_error() {
        let err = decode_versioned_transaction("transaction", "@@@").unwrap_err();
        assert!(matches!(err, ClientError::Validation { .. }));
    }
}
