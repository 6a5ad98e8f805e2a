//! Per-chain adapter configuration
//!
//! Lookups fail with [`ClientError::Configuration`] for chain ids that have
//! no deployment; nothing falls back to a default chain.

use std::str::FromStr;

use ethers::types::{Address, H256};
use solana_sdk::pubkey::Pubkey;

use crate::errors::{ClientError, Result};

const EXPRESS_RELAY_PROGRAM: Pubkey =
    solana_sdk::pubkey!("PytERJFhAKuNNuaiXkApLfWzwNwSNDACpigT3LwQfou");
const PERMIT2: &str = "0x000000000022D473030F116dDEE9F6B43aC78BA3";

/// SVM deployment of the express relay program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvmChainConfig {
    pub express_relay_program: Pubkey,
}

/// EVM deployment of the opportunity adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpportunityAdapterConfig {
    /// Numeric EIP-155 chain id, used in the permit domain
    pub chain_id: u64,
    /// Factory that deploys per-executor adapters and receives bids
    pub opportunity_adapter_factory: Address,
    /// keccak256 of the adapter init code, for CREATE2 derivation
    pub opportunity_adapter_init_bytecode_hash: H256,
    pub permit2: Address,
    pub weth: Address,
}

pub fn svm_chain_config(chain_id: &str) -> Result<SvmChainConfig> {
    match chain_id {
        "solana" | "development-solana" => Ok(SvmChainConfig {
            express_relay_program: EXPRESS_RELAY_PROGRAM,
        }),
        _ => Err(ClientError::unsupported_chain(chain_id)),
    }
}

pub fn opportunity_adapter_config(chain_id: &str) -> Result<OpportunityAdapterConfig> {
    let (numeric_id, factory, init_hash, weth) = match chain_id {
        "op_sepolia" => (
            11_155_420,
            "0xfA119693864b2F185742A409c66f04865c787754",
            "0x3d71516d94b96a8fdca4e3a5825a6b41c9268a8e94610367e69a8462cc543533",
            "0x74A4A85C611679B73F402B36c0F84A7D2CcdFDa3",
        ),
        "mode" => (
            34_443,
            "0x59F78DE21a0b05d96Ae00c547BA951a3B905602f",
            "0xd53b8e32ab2ecba07c3e3a17c3c5e492c62e2f7051b89e5154f52e6bfeb0e38f",
            "0x4200000000000000000000000000000000000006",
        ),
        _ => return Err(ClientError::unsupported_chain(chain_id)),
    };

    Ok(OpportunityAdapterConfig {
        chain_id: numeric_id,
        opportunity_adapter_factory: parse_address(factory)?,
        opportunity_adapter_init_bytecode_hash: H256::from_str(init_hash)
            .map_err(|e| ClientError::Configuration(format!("init bytecode hash: {e}")))?,
        permit2: parse_address(PERMIT2)?,
        weth: parse_address(weth)?,
    })
}

fn parse_address(value: &str) -> Result<Address> {
    Address::from_str(value).map_err(|e| ClientError::Configuration(format!("address {value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_svm_chains_share_program() {
        let mainnet = svm_chain_config("solana").unwrap();
        let dev = svm_chain_config("development-solana").unwrap();
        assert_eq!(mainnet, dev);
        assert_eq!(
            mainnet.express_relay_program.to_string(),
            "PytERJFhAKuNNuaiXkApLfWzwNwSNDACpigT3LwQfou"
        );
    }

    #[test]
    fn test_unknown_chains_are_configuration_errors() {
        assert!(matches!(
            svm_chain_config("eclipse"),
            Err(ClientError::Configuration(_))
        ));
        assert!(matches!(
            opportunity_adapter_config("solana"),
            Err(ClientError::Configuration(_))
        ));
    }

    #[test]
    fn test_evm_configs_parse() {
        let config = opportunity_adapter_config("mode").unwrap();
        assert_eq!(config.chain_id, 34_443);
        assert_eq!(config.permit2, Address::from_str(PERMIT2).unwrap());
        assert_eq!(opportunity_adapter_config("op_sepolia").unwrap().chain_id, 11_155_420);
    }
}
