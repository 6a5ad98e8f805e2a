//! SVM bid construction for the express relay program
//!
//! Everything here is pure: addresses are derived, never looked up, and the
//! resulting transactions are unsigned. Callers sign with the searcher key
//! (`BidSvm::transaction_mut().partial_sign(..)`) before submitting.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    system_program, sysvar,
    transaction::Transaction,
};
use spl_associated_token_account::{
    get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};

use super::chains::svm_chain_config;
use super::instructions::{anchor_discriminator, plan_bid_instructions, sanity_check_ix_order};
use crate::errors::{ClientError, Result};
use crate::types::{
    BidSvm, FeeToken, OpportunitySvm, OpportunitySvmSwap, SpecifiedAmount, SvmChainUpdate,
    TokenAccountInitializationConfig,
};

pub const CONFIG_ROUTER_SEED: &[u8] = b"config_router";
pub const METADATA_SEED: &[u8] = b"metadata";

const MEMO_PROGRAM: Pubkey = solana_sdk::pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// Per-router fee configuration PDA
pub fn get_config_router_pda(chain_id: &str, router: &Pubkey) -> Result<Pubkey> {
    let program = svm_chain_config(chain_id)?.express_relay_program;
    Ok(Pubkey::find_program_address(&[CONFIG_ROUTER_SEED, router.as_ref()], &program).0)
}

/// Global express relay metadata PDA
pub fn get_express_relay_metadata_pda(chain_id: &str) -> Result<Pubkey> {
    let program = svm_chain_config(chain_id)?.express_relay_program;
    Ok(Pubkey::find_program_address(&[METADATA_SEED], &program).0)
}

/// Inputs of the permissioning `submit_bid` instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitBidParams {
    pub searcher: Pubkey,
    pub relayer_signer: Pubkey,
    pub permission: Pubkey,
    pub router: Pubkey,
    pub fee_receiver_relayer: Pubkey,
    pub bid_amount: u64,
    /// Unix seconds
    pub deadline: i64,
}

pub fn construct_submit_bid_instruction(chain_id: &str, params: &SubmitBidParams) -> Result<Instruction> {
    let program = svm_chain_config(chain_id)?.express_relay_program;
    let config_router = get_config_router_pda(chain_id, &params.router)?;
    let metadata = get_express_relay_metadata_pda(chain_id)?;

    let mut data = anchor_discriminator("submit_bid").to_vec();
    data.extend_from_slice(&params.deadline.to_le_bytes());
    data.extend_from_slice(&params.bid_amount.to_le_bytes());

    Ok(Instruction {
        program_id: program,
        accounts: vec![
            AccountMeta::new(params.searcher, true),
            AccountMeta::new_readonly(params.relayer_signer, true),
            AccountMeta::new_readonly(params.permission, false),
            AccountMeta::new(params.router, false),
            AccountMeta::new_readonly(config_router, false),
            AccountMeta::new(metadata, false),
            AccountMeta::new(params.fee_receiver_relayer, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(sysvar::instructions::id(), false),
        ],
        data,
    })
}

/// Searcher-side inputs of a swap bid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapBidParams {
    pub searcher: Pubkey,
    pub bid_amount: u64,
    /// Unix seconds
    pub deadline: i64,
    pub fee_receiver_relayer: Pubkey,
    pub relayer_signer: Pubkey,
    /// 0 leaves the runtime default
    pub compute_unit_limit: u32,
}

/// Resolve `(amount_searcher, amount_user)` for a swap
///
/// The opportunity fixes exactly one side; the bid fills the other.
pub fn swap_amounts(swap: &OpportunitySvmSwap, bid_amount: u64) -> (u64, u64) {
    match swap.tokens.specified {
        SpecifiedAmount::Searcher(amount) => (amount, bid_amount),
        SpecifiedAmount::User(amount) => (bid_amount, amount),
    }
}

struct SwapAccounts {
    searcher: Pubkey,
    user: Pubkey,
    searcher_ta_mint_searcher: Pubkey,
    searcher_ta_mint_user: Pubkey,
    user_ata_mint_searcher: Pubkey,
    user_ata_mint_user: Pubkey,
    router_fee_receiver_ta: Pubkey,
    relayer_fee_receiver_ata: Pubkey,
    express_relay_fee_receiver_ata: Pubkey,
    mint_searcher: Pubkey,
    mint_user: Pubkey,
    mint_fee: Pubkey,
    token_program_searcher: Pubkey,
    token_program_user: Pubkey,
    token_program_fee: Pubkey,
    express_relay_metadata: Pubkey,
    relayer_signer: Pubkey,
}

impl SwapAccounts {
    fn to_account_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new_readonly(self.searcher, true),
            AccountMeta::new_readonly(self.user, true),
            AccountMeta::new(self.searcher_ta_mint_searcher, false),
            AccountMeta::new(self.searcher_ta_mint_user, false),
            AccountMeta::new(self.user_ata_mint_searcher, false),
            AccountMeta::new(self.user_ata_mint_user, false),
            AccountMeta::new(self.router_fee_receiver_ta, false),
            AccountMeta::new(self.relayer_fee_receiver_ata, false),
            AccountMeta::new(self.express_relay_fee_receiver_ata, false),
            AccountMeta::new_readonly(self.mint_searcher, false),
            AccountMeta::new_readonly(self.mint_user, false),
            AccountMeta::new_readonly(self.mint_fee, false),
            AccountMeta::new_readonly(self.token_program_searcher, false),
            AccountMeta::new_readonly(self.token_program_user, false),
            AccountMeta::new_readonly(self.token_program_fee, false),
            AccountMeta::new_readonly(self.express_relay_metadata, false),
            AccountMeta::new_readonly(self.relayer_signer, true),
        ]
    }
}

/// Instructions of a swap bid, split into token account setup and program
/// instructions
#[derive(Debug, Clone)]
pub struct SwapInstructions {
    pub setup: Vec<Instruction>,
    pub program: Vec<Instruction>,
}

/// Build the swap instruction plus everything it needs to land
///
/// Idempotent creates are emitted for every token account the swap may
/// credit, whether or not it exists yet.
pub fn construct_swap_instructions(
    opportunity: &OpportunitySvm,
    params: &SwapBidParams,
) -> Result<SwapInstructions> {
    let chain_id = opportunity.chain_id.as_str();
    let swap = opportunity
        .as_swap()
        .ok_or_else(|| ClientError::invalid("program", "not a swap opportunity"))?;
    let program = svm_chain_config(chain_id)?.express_relay_program;
    let metadata = get_express_relay_metadata_pda(chain_id)?;

    let tokens = &swap.tokens;
    let (mint_fee, token_program_fee) = match swap.fee_token {
        FeeToken::SearcherToken => (tokens.searcher_token, tokens.token_program_searcher),
        FeeToken::UserToken => (tokens.user_token, tokens.token_program_user),
    };
    let user = swap.user_wallet_address;
    let ata = |owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey| {
        get_associated_token_address_with_program_id(owner, mint, token_program)
    };

    let accounts = SwapAccounts {
        searcher: params.searcher,
        user,
        searcher_ta_mint_searcher: ata(&params.searcher, &tokens.searcher_token, &tokens.token_program_searcher),
        searcher_ta_mint_user: ata(&params.searcher, &tokens.user_token, &tokens.token_program_user),
        user_ata_mint_searcher: ata(&user, &tokens.searcher_token, &tokens.token_program_searcher),
        user_ata_mint_user: ata(&user, &tokens.user_token, &tokens.token_program_user),
        router_fee_receiver_ta: ata(&swap.router_account, &mint_fee, &token_program_fee),
        relayer_fee_receiver_ata: ata(&params.fee_receiver_relayer, &mint_fee, &token_program_fee),
        express_relay_fee_receiver_ata: ata(&metadata, &mint_fee, &token_program_fee),
        mint_searcher: tokens.searcher_token,
        mint_user: tokens.user_token,
        mint_fee,
        token_program_searcher: tokens.token_program_searcher,
        token_program_user: tokens.token_program_user,
        token_program_fee,
        express_relay_metadata: metadata,
        relayer_signer: params.relayer_signer,
    };

    let configs = &swap.token_account_initialization_configs;
    let payer = |config: TokenAccountInitializationConfig| match config {
        TokenAccountInitializationConfig::UserPayer => user,
        TokenAccountInitializationConfig::SearcherPayer | TokenAccountInitializationConfig::Unneeded => {
            params.searcher
        }
    };
    let setup = vec![
        create_associated_token_account_idempotent(
            &payer(configs.user_ata_mint_searcher),
            &user,
            &tokens.searcher_token,
            &tokens.token_program_searcher,
        ),
        create_associated_token_account_idempotent(
            &payer(configs.router_fee_receiver_ta),
            &swap.router_account,
            &mint_fee,
            &token_program_fee,
        ),
        create_associated_token_account_idempotent(
            &payer(configs.relayer_fee_receiver_ata),
            &params.fee_receiver_relayer,
            &mint_fee,
            &token_program_fee,
        ),
        create_associated_token_account_idempotent(
            &payer(configs.express_relay_fee_receiver_ata),
            &metadata,
            &mint_fee,
            &token_program_fee,
        ),
        create_associated_token_account_idempotent(
            &params.searcher,
            &params.searcher,
            &tokens.user_token,
            &tokens.token_program_user,
        ),
    ];

    let (amount_searcher, amount_user) = swap_amounts(swap, params.bid_amount);
    let mut data = anchor_discriminator("swap").to_vec();
    data.extend_from_slice(&params.deadline.to_le_bytes());
    data.extend_from_slice(&amount_searcher.to_le_bytes());
    data.extend_from_slice(&amount_user.to_le_bytes());
    data.extend_from_slice(&swap.referral_fee_bps.to_le_bytes());
    data.push(swap.fee_token.discriminant());

    // Account layout does not depend on the deployment; bind the program last
    let mut swap_ix = Instruction::new_with_bytes(Pubkey::default(), &data, accounts.to_account_metas());
    swap_ix.program_id = program;

    let mut program_ixs = Vec::with_capacity(2);
    if let Some(memo) = &swap.memo {
        program_ixs.push(Instruction::new_with_bytes(MEMO_PROGRAM, memo.as_bytes(), vec![]));
    }
    program_ixs.push(swap_ix);

    Ok(SwapInstructions {
        setup,
        program: program_ixs,
    })
}

/// Unsigned swap bid on the latest blockhash; the relayer pays fees
pub fn construct_swap_bid(
    opportunity: &OpportunitySvm,
    params: &SwapBidParams,
    chain_update: &SvmChainUpdate,
) -> Result<BidSvm> {
    ensure_same_chain(&opportunity.chain_id, chain_update)?;
    let SwapInstructions { setup, program } = construct_swap_instructions(opportunity, params)?;
    let plan = plan_bid_instructions(
        params.compute_unit_limit,
        chain_update.latest_prioritization_fee,
        setup,
        program,
    )?;
    sanity_check_ix_order(&plan.instructions)?;

    let transaction = unsigned_transaction(&plan.instructions, &params.relayer_signer, chain_update);
    tracing::debug!(
        chain_id = %opportunity.chain_id,
        opportunity_id = %opportunity.opportunity_id,
        instructions = plan.instructions.len(),
        "Constructed swap bid"
    );
    Ok(BidSvm::Swap {
        chain_id: opportunity.chain_id.clone(),
        transaction,
        opportunity_id: opportunity.opportunity_id,
    })
}

/// Unsigned on-chain bid: `submit_bid` followed by the searcher's own
/// instructions; the searcher pays fees
pub fn construct_onchain_bid(
    chain_id: &str,
    params: &SubmitBidParams,
    instructions: Vec<Instruction>,
    compute_unit_limit: u32,
    chain_update: &SvmChainUpdate,
) -> Result<BidSvm> {
    ensure_same_chain(chain_id, chain_update)?;
    let mut program = Vec::with_capacity(instructions.len() + 1);
    program.push(construct_submit_bid_instruction(chain_id, params)?);
    program.extend(instructions);

    let plan = plan_bid_instructions(
        compute_unit_limit,
        chain_update.latest_prioritization_fee,
        Vec::new(),
        program,
    )?;
    sanity_check_ix_order(&plan.instructions)?;

    Ok(BidSvm::OnChain {
        chain_id: chain_id.to_string(),
        transaction: unsigned_transaction(&plan.instructions, &params.searcher, chain_update),
        slot: None,
    })
}

fn ensure_same_chain(chain_id: &str, chain_update: &SvmChainUpdate) -> Result<()> {
    if chain_update.chain_id != chain_id {
        return Err(ClientError::invalid(
            "chain_id",
            format!("chain update is for {}, bid is for {chain_id}", chain_update.chain_id),
        ));
    }
    Ok(())
}

fn unsigned_transaction(
    instructions: &[Instruction],
    fee_payer: &Pubkey,
    chain_update: &SvmChainUpdate,
) -> Transaction {
    let mut message = Message::new(instructions, Some(fee_payer));
    message.recent_blockhash = chain_update.blockhash;
    Transaction::new_unsigned(message)
}
