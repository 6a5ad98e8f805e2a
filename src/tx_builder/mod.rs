//! Chain adapters: bid construction for EVM and SVM chains
//!
//! The adapters are pure functions over typed opportunities. They derive
//! every address they need and perform no network I/O; signing material is
//! supplied by the caller.
//!
//! - **chains**: per-chain deployment addresses
//! - **instructions**: SVM instruction planning and ordering validation
//! - **evm**: Permit2 witness signature and adapter bid calldata
//! - **svm**: express relay PDAs, `submit_bid` and `swap` instructions

pub mod chains;
pub mod evm;
pub mod instructions;
pub mod svm;

pub use chains::{opportunity_adapter_config, svm_chain_config, OpportunityAdapterConfig, SvmChainConfig};
pub use evm::{sign_bid, BidParams};
pub use instructions::{plan_bid_instructions, sanity_check_ix_order, InstructionPlan};
pub use svm::{
    construct_onchain_bid, construct_submit_bid_instruction, construct_swap_bid,
    construct_swap_instructions, get_config_router_pda, get_express_relay_metadata_pda,
    swap_amounts, SubmitBidParams, SwapBidParams, SwapInstructions,
};
