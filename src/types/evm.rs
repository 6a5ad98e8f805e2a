//! EVM opportunity types and their wire encoding

use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    address_string, hex_string, parse_evm_address, parse_hex_bytes, parse_u256, ChainId,
    OpportunityId, SUPPORTED_OPPORTUNITY_VERSION,
};
use crate::errors::Result;

/// A token and an exact amount of it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmountEvm {
    pub token: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenAmountEvmWire {
    pub token: String,
    pub amount: String,
}

impl TokenAmountEvm {
    fn from_wire(field: &str, wire: &TokenAmountEvmWire) -> Result<Self> {
        Ok(Self {
            token: parse_evm_address(&format!("{field}.token"), &wire.token)?,
            amount: parse_u256(&format!("{field}.amount"), &wire.amount)?,
        })
    }

    fn to_wire(self) -> TokenAmountEvmWire {
        TokenAmountEvmWire {
            token: address_string(&self.token),
            amount: self.amount.to_string(),
        }
    }
}

fn tokens_from_wire(field: &str, wire: &[TokenAmountEvmWire]) -> Result<Vec<TokenAmountEvm>> {
    wire.iter()
        .enumerate()
        .map(|(i, token)| TokenAmountEvm::from_wire(&format!("{field}[{i}]"), token))
        .collect()
}

fn tokens_to_wire(tokens: &[TokenAmountEvm]) -> Vec<TokenAmountEvmWire> {
    tokens.iter().map(|token| token.to_wire()).collect()
}

/// Opportunity executed by calling `target_contract` on an EVM chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpportunityEvm {
    pub chain_id: ChainId,
    pub opportunity_id: OpportunityId,
    /// Microseconds since the unix epoch
    pub creation_time: i64,
    pub permission_key: Bytes,
    pub target_contract: Address,
    pub target_calldata: Bytes,
    pub target_call_value: U256,
    pub sell_tokens: Vec<TokenAmountEvm>,
    pub buy_tokens: Vec<TokenAmountEvm>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpportunityEvmWire {
    pub version: String,
    pub chain_id: String,
    pub opportunity_id: OpportunityId,
    #[serde(default)]
    pub creation_time: i64,
    pub permission_key: String,
    pub target_contract: String,
    pub target_calldata: String,
    pub target_call_value: String,
    pub sell_tokens: Vec<TokenAmountEvmWire>,
    pub buy_tokens: Vec<TokenAmountEvmWire>,
}

impl OpportunityEvm {
    pub fn from_wire(wire: OpportunityEvmWire) -> Result<Self> {
        Ok(Self {
            permission_key: parse_hex_bytes("permission_key", &wire.permission_key)?,
            target_contract: parse_evm_address("target_contract", &wire.target_contract)?,
            target_calldata: parse_hex_bytes("target_calldata", &wire.target_calldata)?,
            target_call_value: parse_u256("target_call_value", &wire.target_call_value)?,
            sell_tokens: tokens_from_wire("sell_tokens", &wire.sell_tokens)?,
            buy_tokens: tokens_from_wire("buy_tokens", &wire.buy_tokens)?,
            chain_id: wire.chain_id,
            opportunity_id: wire.opportunity_id,
            creation_time: wire.creation_time,
        })
    }

    pub fn to_wire(&self) -> OpportunityEvmWire {
        OpportunityEvmWire {
            version: SUPPORTED_OPPORTUNITY_VERSION.to_string(),
            chain_id: self.chain_id.clone(),
            opportunity_id: self.opportunity_id,
            creation_time: self.creation_time,
            permission_key: hex_string(&self.permission_key),
            target_contract: address_string(&self.target_contract),
            target_calldata: hex_string(&self.target_calldata),
            target_call_value: self.target_call_value.to_string(),
            sell_tokens: tokens_to_wire(&self.sell_tokens),
            buy_tokens: tokens_to_wire(&self.buy_tokens),
        }
    }
}

/// EVM opportunity submitted by a protocol monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpportunityCreateEvm {
    pub chain_id: ChainId,
    pub permission_key: Bytes,
    pub target_contract: Address,
    pub target_calldata: Bytes,
    pub target_call_value: U256,
    pub sell_tokens: Vec<TokenAmountEvm>,
    pub buy_tokens: Vec<TokenAmountEvm>,
}

impl OpportunityCreateEvm {
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "version": SUPPORTED_OPPORTUNITY_VERSION,
            "chain_id": self.chain_id,
            "permission_key": hex_string(&self.permission_key),
            "target_contract": address_string(&self.target_contract),
            "target_calldata": hex_string(&self.target_calldata),
            "target_call_value": self.target_call_value.to_string(),
            "sell_tokens": tokens_to_wire(&self.sell_tokens),
            "buy_tokens": tokens_to_wire(&self.buy_tokens),
        })
    }
}
