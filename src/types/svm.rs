//! SVM opportunity types and their wire encoding
//!
//! SVM opportunities carry one of two program payloads, selected by the
//! `program` field. Swap opportunities additionally select their token
//! amount layout through `tokens.side_specified`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

use super::{from_value, parse_pubkey, ChainId, OpportunityId, SUPPORTED_OPPORTUNITY_VERSION};
use crate::errors::{ClientError, Result};

/// Express relay programs an SVM opportunity can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramSvm {
    Limo,
    Swap,
}

/// Which side of the swap the relay fee is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeToken {
    SearcherToken,
    UserToken,
}

impl FeeToken {
    /// Borsh discriminant of the on-chain `FeeToken` enum
    pub fn discriminant(self) -> u8 {
        match self {
            Self::SearcherToken => 0,
            Self::UserToken => 1,
        }
    }
}

/// Who pays to initialise a token account needed by a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenAccountInitializationConfig {
    Unneeded,
    #[default]
    SearcherPayer,
    UserPayer,
}

/// Per-account initialisation hints attached to a swap opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenAccountInitializationConfigs {
    pub user_ata_mint_searcher: TokenAccountInitializationConfig,
    pub user_ata_mint_user: TokenAccountInitializationConfig,
    pub router_fee_receiver_ta: TokenAccountInitializationConfig,
    pub relayer_fee_receiver_ata: TokenAccountInitializationConfig,
    pub express_relay_fee_receiver_ata: TokenAccountInitializationConfig,
}

/// The one amount fixed by the opportunity; the other side is the bid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifiedAmount {
    /// The searcher's input amount is fixed; the bid is what the user gets
    Searcher(u64),
    /// The user's output amount is fixed (fees included); the bid is what the
    /// searcher receives
    User(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapTokens {
    pub searcher_token: Pubkey,
    pub user_token: Pubkey,
    pub token_program_searcher: Pubkey,
    pub token_program_user: Pubkey,
    pub specified: SpecifiedAmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpportunitySvmLimo {
    /// Raw order account state
    pub order: Vec<u8>,
    pub order_address: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpportunitySvmSwap {
    pub permission_account: Pubkey,
    pub router_account: Pubkey,
    pub user_wallet_address: Pubkey,
    pub fee_token: FeeToken,
    pub referral_fee_bps: u16,
    pub platform_fee_bps: u64,
    pub tokens: SwapTokens,
    pub token_account_initialization_configs: TokenAccountInitializationConfigs,
    pub memo: Option<String>,
    pub cancellable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpportunitySvmProgram {
    Limo(OpportunitySvmLimo),
    Swap(OpportunitySvmSwap),
}

/// Opportunity on an account-model chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpportunitySvm {
    pub chain_id: ChainId,
    pub opportunity_id: OpportunityId,
    pub creation_time: i64,
    /// Slot at which the opportunity parameters were read
    pub slot: u64,
    pub program: OpportunitySvmProgram,
}

impl OpportunitySvm {
    pub fn as_swap(&self) -> Option<&OpportunitySvmSwap> {
        match &self.program {
            OpportunitySvmProgram::Swap(swap) => Some(swap),
            OpportunitySvmProgram::Limo(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CommonWire {
    chain_id: String,
    opportunity_id: OpportunityId,
    #[serde(default)]
    creation_time: i64,
    slot: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct LimoWire {
    order: String,
    order_address: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SwapWire {
    permission_account: String,
    router_account: String,
    user_wallet_address: String,
    fee_token: String,
    referral_fee_bps: u16,
    #[serde(default)]
    platform_fee_bps: u64,
    tokens: Value,
    #[serde(default)]
    token_account_initialization_configs: TokenAccountInitializationConfigs,
    #[serde(default)]
    memo: Option<String>,
    #[serde(default = "default_true")]
    cancellable: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct SwapTokensWire {
    searcher_token: String,
    user_token: String,
    #[serde(default)]
    searcher_amount: Option<u64>,
    #[serde(default)]
    user_amount: Option<u64>,
    #[serde(default)]
    token_program_searcher: Option<String>,
    #[serde(default)]
    token_program_user: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Decode an SVM opportunity; `Ok(None)` for unknown discriminators
pub(crate) fn decode_svm_opportunity(value: &Value) -> Result<Option<OpportunitySvm>> {
    let program = value.get("program").and_then(Value::as_str);
    let program = match program {
        Some("limo") => ProgramSvm::Limo,
        Some("swap") => ProgramSvm::Swap,
        other => {
            tracing::warn!(program = ?other, "Dropping opportunity for unknown program");
            return Ok(None);
        }
    };

    let common: CommonWire = from_value("opportunity", value)?;
    let program = match program {
        ProgramSvm::Limo => {
            let wire: LimoWire = from_value("opportunity", value)?;
            OpportunitySvmProgram::Limo(OpportunitySvmLimo {
                order: BASE64
                    .decode(&wire.order)
                    .map_err(|e| ClientError::invalid("order", e))?,
                order_address: parse_pubkey("order_address", &wire.order_address)?,
            })
        }
        ProgramSvm::Swap => match decode_swap(value)? {
            Some(swap) => OpportunitySvmProgram::Swap(swap),
            None => return Ok(None),
        },
    };

    Ok(Some(OpportunitySvm {
        chain_id: common.chain_id,
        opportunity_id: common.opportunity_id,
        creation_time: common.creation_time,
        slot: common.slot,
        program,
    }))
}

fn decode_swap(value: &Value) -> Result<Option<OpportunitySvmSwap>> {
    let wire: SwapWire = from_value("opportunity", value)?;

    let fee_token = match wire.fee_token.as_str() {
        "searcher_token" => FeeToken::SearcherToken,
        "user_token" => FeeToken::UserToken,
        other => {
            tracing::warn!(fee_token = other, "Dropping swap opportunity with unknown fee token");
            return Ok(None);
        }
    };

    let Some(tokens) = decode_swap_tokens(&wire.tokens)? else {
        return Ok(None);
    };

    Ok(Some(OpportunitySvmSwap {
        permission_account: parse_pubkey("permission_account", &wire.permission_account)?,
        router_account: parse_pubkey("router_account", &wire.router_account)?,
        user_wallet_address: parse_pubkey("user_wallet_address", &wire.user_wallet_address)?,
        fee_token,
        referral_fee_bps: wire.referral_fee_bps,
        platform_fee_bps: wire.platform_fee_bps,
        tokens,
        token_account_initialization_configs: wire.token_account_initialization_configs,
        memo: wire.memo,
        cancellable: wire.cancellable,
    }))
}

fn decode_swap_tokens(value: &Value) -> Result<Option<SwapTokens>> {
    let side = value.get("side_specified").and_then(Value::as_str);
    let wire: SwapTokensWire = from_value("tokens", value)?;

    let specified = match side {
        Some("searcher") => SpecifiedAmount::Searcher(
            wire.searcher_amount
                .ok_or_else(|| ClientError::invalid("tokens.searcher_amount", "missing"))?,
        ),
        Some("user") => SpecifiedAmount::User(
            wire.user_amount
                .ok_or_else(|| ClientError::invalid("tokens.user_amount", "missing"))?,
        ),
        other => {
            tracing::warn!(side_specified = ?other, "Dropping swap opportunity with unknown side");
            return Ok(None);
        }
    };

    let token_program = |field: &str, value: &Option<String>| match value {
        Some(program) => parse_pubkey(field, program),
        None => Ok(spl_token::id()),
    };

    Ok(Some(SwapTokens {
        searcher_token: parse_pubkey("tokens.searcher_token", &wire.searcher_token)?,
        user_token: parse_pubkey("tokens.user_token", &wire.user_token)?,
        token_program_searcher: token_program(
            "tokens.token_program_searcher",
            &wire.token_program_searcher,
        )?,
        token_program_user: token_program("tokens.token_program_user", &wire.token_program_user)?,
        specified,
    }))
}

/// Limo order opportunity submitted by a protocol monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpportunityCreateSvm {
    pub chain_id: ChainId,
    pub slot: u64,
    pub order: Vec<u8>,
    pub order_address: Pubkey,
    pub permission_account: Pubkey,
    pub router: Pubkey,
}

impl OpportunityCreateSvm {
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "version": SUPPORTED_OPPORTUNITY_VERSION,
            "program": "limo",
            "chain_id": self.chain_id,
            "slot": self.slot,
            "order": BASE64.encode(&self.order),
            "order_address": self.order_address.to_string(),
            "permission_account": self.permission_account.to_string(),
            "router": self.router.to_string(),
        })
    }
}
