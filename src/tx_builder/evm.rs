//! EVM bid construction through the opportunity adapter
//!
//! The searcher signs a Permit2 `PermitBatchWitnessTransferFrom` whose
//! witness commits to the opportunity and the bid. The bid itself calls
//! `executeOpportunity` on the adapter factory, which deploys (or reuses) the
//! searcher's adapter at a CREATE2 address and pulls the permitted tokens.

use ethers::abi::{self, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::{Eip712, TypedData};
use ethers::types::{Address, Bytes, Signature, H256, U256};
use ethers::utils::{get_create2_address_from_hash, id};
use serde_json::json;

use super::chains::{opportunity_adapter_config, OpportunityAdapterConfig};
use crate::errors::{ClientError, Result};
use crate::types::{address_string, hex_string, BidEvm, OpportunityEvm, TokenAmountEvm};

const EXECUTE_OPPORTUNITY: &str = "executeOpportunity((((address,uint256)[],uint256,uint256),((address,uint256)[],address,address,bytes,uint256,uint256)),bytes)";

/// Searcher-chosen parameters of an EVM bid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidParams {
    /// Paid in WETH on top of `target_call_value`
    pub amount: U256,
    /// Permit2 nonce; must be unused for the executor
    pub nonce: U256,
    /// Unix seconds
    pub deadline: U256,
}

/// Tokens the adapter may pull from the executor
///
/// The sell tokens, plus WETH covering `target_call_value + bid amount`
/// (merged into an existing WETH entry if there is one). A total that does
/// not fit in a uint256 is a validation error.
pub fn permitted_tokens(
    opportunity: &OpportunityEvm,
    bid: &BidParams,
    weth: Address,
) -> Result<Vec<TokenAmountEvm>> {
    let mut permitted = opportunity.sell_tokens.clone();
    let extra_weth = opportunity
        .target_call_value
        .checked_add(bid.amount)
        .ok_or_else(|| ClientError::invalid("amount", "target_call_value + bid amount overflows uint256"))?;
    match permitted.iter_mut().find(|token| token.token == weth) {
        Some(existing) => {
            existing.amount = existing
                .amount
                .checked_add(extra_weth)
                .ok_or_else(|| ClientError::invalid("permitted", "WETH amount overflows uint256"))?;
        }
        None if !extra_weth.is_zero() => permitted.push(TokenAmountEvm {
            token: weth,
            amount: extra_weth,
        }),
        None => {}
    }
    Ok(permitted)
}

/// CREATE2 address of the executor's adapter
pub fn opportunity_adapter_address(config: &OpportunityAdapterConfig, executor: Address) -> Address {
    let salt = H256::from(executor);
    get_create2_address_from_hash(
        config.opportunity_adapter_factory,
        salt.as_bytes(),
        config.opportunity_adapter_init_bytecode_hash.as_bytes(),
    )
}

fn tokens_json(tokens: &[TokenAmountEvm]) -> serde_json::Value {
    tokens
        .iter()
        .map(|token| json!({ "token": address_string(&token.token), "amount": token.amount.to_string() }))
        .collect()
}

/// EIP-712 payload the executor signs
pub fn permit_typed_data(
    opportunity: &OpportunityEvm,
    bid: &BidParams,
    executor: Address,
    config: &OpportunityAdapterConfig,
) -> Result<TypedData> {
    let permitted = permitted_tokens(opportunity, bid, config.weth)?;
    let payload = json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" },
            ],
            "PermitBatchWitnessTransferFrom": [
                { "name": "permitted", "type": "TokenPermissions[]" },
                { "name": "spender", "type": "address" },
                { "name": "nonce", "type": "uint256" },
                { "name": "deadline", "type": "uint256" },
                { "name": "witness", "type": "OpportunityWitness" },
            ],
            "TokenPermissions": [
                { "name": "token", "type": "address" },
                { "name": "amount", "type": "uint256" },
            ],
            "OpportunityWitness": [
                { "name": "buyTokens", "type": "TokenAmount[]" },
                { "name": "executor", "type": "address" },
                { "name": "targetContract", "type": "address" },
                { "name": "targetCalldata", "type": "bytes" },
                { "name": "targetCallValue", "type": "uint256" },
                { "name": "bidAmount", "type": "uint256" },
            ],
            "TokenAmount": [
                { "name": "token", "type": "address" },
                { "name": "amount", "type": "uint256" },
            ],
        },
        "primaryType": "PermitBatchWitnessTransferFrom",
        "domain": {
            "name": "Permit2",
            "chainId": config.chain_id,
            "verifyingContract": address_string(&config.permit2),
        },
        "message": {
            "permitted": tokens_json(&permitted),
            "spender": address_string(&opportunity_adapter_address(config, executor)),
            "nonce": bid.nonce.to_string(),
            "deadline": bid.deadline.to_string(),
            "witness": {
                "buyTokens": tokens_json(&opportunity.buy_tokens),
                "executor": address_string(&executor),
                "targetContract": address_string(&opportunity.target_contract),
                "targetCalldata": hex_string(&opportunity.target_calldata),
                "targetCallValue": opportunity.target_call_value.to_string(),
                "bidAmount": bid.amount.to_string(),
            },
        },
    });
    serde_json::from_value(payload).map_err(|e| ClientError::invalid("typed_data", e))
}

/// Sign the permit with the executor's key
pub fn sign_permit(
    opportunity: &OpportunityEvm,
    bid: &BidParams,
    wallet: &LocalWallet,
    config: &OpportunityAdapterConfig,
) -> Result<Signature> {
    let typed_data = permit_typed_data(opportunity, bid, wallet.address(), config)?;
    let digest = typed_data
        .encode_eip712()
        .map_err(|e| ClientError::invalid("typed_data", e))?;
    wallet
        .sign_hash(H256::from(digest))
        .map_err(|e| ClientError::invalid("signature", e))
}

fn token_amounts(tokens: &[TokenAmountEvm]) -> Token {
    Token::Array(
        tokens
            .iter()
            .map(|token| Token::Tuple(vec![Token::Address(token.token), Token::Uint(token.amount)]))
            .collect(),
    )
}

/// Assemble the bid from an already produced permit signature
pub fn make_adapter_bid(
    opportunity: &OpportunityEvm,
    bid: &BidParams,
    executor: Address,
    signature: &Signature,
    config: &OpportunityAdapterConfig,
) -> Result<BidEvm> {
    let permitted = permitted_tokens(opportunity, bid, config.weth)?;
    let permit = Token::Tuple(vec![
        token_amounts(&permitted),
        Token::Uint(bid.nonce),
        Token::Uint(bid.deadline),
    ]);
    let witness = Token::Tuple(vec![
        token_amounts(&opportunity.buy_tokens),
        Token::Address(executor),
        Token::Address(opportunity.target_contract),
        Token::Bytes(opportunity.target_calldata.to_vec()),
        Token::Uint(opportunity.target_call_value),
        Token::Uint(bid.amount),
    ]);

    let mut calldata = id(EXECUTE_OPPORTUNITY).to_vec();
    calldata.extend(abi::encode(&[
        Token::Tuple(vec![permit, witness]),
        Token::Bytes(signature.to_vec()),
    ]));

    Ok(BidEvm {
        chain_id: opportunity.chain_id.clone(),
        amount: bid.amount,
        permission_key: opportunity.permission_key.clone(),
        target_contract: config.opportunity_adapter_factory,
        target_calldata: Bytes::from(calldata),
    })
}

/// Sign and assemble a bid on `opportunity` for the wallet's address
pub fn sign_bid(opportunity: &OpportunityEvm, bid: &BidParams, wallet: &LocalWallet) -> Result<BidEvm> {
    let config = opportunity_adapter_config(&opportunity.chain_id)?;
    let signature = sign_permit(opportunity, bid, wallet, &config)?;
    tracing::debug!(
        chain_id = %opportunity.chain_id,
        opportunity_id = %opportunity.opportunity_id,
        executor = ?wallet.address(),
        "Signed EVM bid"
    );
    make_adapter_bid(opportunity, bid, wallet.address(), &signature, &config)
}
