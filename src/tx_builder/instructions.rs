//! Instruction planning and ordering validation
//!
//! Bid transactions are laid out as:
//! 1. Compute budget instructions (CU limit, priority fee)
//! 2. Idempotent token account creation
//! 3. Program instructions (memo, express relay, caller-supplied)

use sha2::{Digest, Sha256};
use solana_sdk::{compute_budget::ComputeBudgetInstruction, instruction::Instruction};

use crate::errors::{ClientError, Result};

/// Ordered instructions for one bid transaction
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,
}

/// Plan bid instructions in transaction order
///
/// * `cu_limit` - Compute unit limit (0 = skip this instruction)
/// * `prio_fee` - Priority fee in micro-lamports (0 = skip this instruction)
/// * `setup` - Token account creation instructions
/// * `program_ixs` - Everything else, kept in the given order
pub fn plan_bid_instructions(
    cu_limit: u32,
    prio_fee: u64,
    setup: Vec<Instruction>,
    program_ixs: Vec<Instruction>,
) -> Result<InstructionPlan> {
    if program_ixs.is_empty() {
        return Err(ClientError::invalid("instructions", "no program instructions"));
    }

    let mut instructions = Vec::with_capacity(2 + setup.len() + program_ixs.len());
    if cu_limit > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(cu_limit));
    }
    if prio_fee > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(prio_fee));
    }
    instructions.extend(setup);
    instructions.extend(program_ixs);

    Ok(InstructionPlan { instructions })
}

/// Validate instruction ordering (debug/test only)
///
/// Compute budget instructions must come first, followed by associated token
/// account instructions, followed by everything else.
#[cfg(debug_assertions)]
pub fn sanity_check_ix_order(instructions: &[Instruction]) -> Result<()> {
    if instructions.is_empty() {
        return Err(ClientError::invalid("instructions", "instruction list is empty"));
    }

    let rank = |ix: &Instruction| {
        if ix.program_id == solana_sdk::compute_budget::id() {
            0
        } else if ix.program_id == spl_associated_token_account::id() {
            1
        } else {
            2
        }
    };

    for (idx, pair) in instructions.windows(2).enumerate() {
        if rank(&pair[0]) > rank(&pair[1]) {
            return Err(ClientError::invalid(
                "instructions",
                format!(
                    "instruction at position {} (program {}) is out of order",
                    idx + 1,
                    pair[1].program_id
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(not(debug_assertions))]
#[inline]
pub fn sanity_check_ix_order(_instructions: &[Instruction]) -> Result<()> {
    Ok(())
}

/// Anchor instruction discriminator: `sha256("global:<name>")[..8]`
pub fn anchor_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{instruction::AccountMeta, pubkey::Pubkey};

    fn program_ix() -> Instruction {
        Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[1, 2, 3, 4],
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        )
    }

    fn ata_ix() -> Instruction {
        let payer = Pubkey::new_unique();
        spl_associated_token_account::instruction::create_associated_token_account_idempotent(
            &payer,
            &payer,
            &Pubkey::new_unique(),
            &spl_token::id(),
        )
    }

    #[test]
    fn test_plan_orders_budget_setup_program() {
        let program = program_ix();
        let plan = plan_bid_instructions(200_000, 10_000, vec![ata_ix()], vec![program.clone()])
            .unwrap();

        assert_eq!(plan.instructions.len(), 4);
        assert_eq!(plan.instructions[0].program_id, solana_sdk::compute_budget::id());
        assert_eq!(plan.instructions[1].program_id, solana_sdk::compute_budget::id());
        assert_eq!(plan.instructions[2].program_id, spl_associated_token_account::id());
        assert_eq!(plan.instructions[3], program);
        assert!(sanity_check_ix_order(&plan.instructions).is_ok());
    }

    #[test]
    fn test_plan_skips_zero_budget() {
        let plan = plan_bid_instructions(0, 0, vec![], vec![program_ix()]).unwrap();
        assert_eq!(plan.instructions.len(), 1);

        let plan = plan_bid_instructions(0, 5, vec![], vec![program_ix()]).unwrap();
        assert_eq!(plan.instructions.len(), 2);
    }

    #[test]
    fn test_plan_requires_program_instruction() {
        assert!(matches!(
            plan_bid_instructions(0, 0, vec![ata_ix()], vec![]),
            Err(ClientError::Validation { .. })
        ));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_sanity_check_rejects_late_budget() {
        let instructions = vec![
            program_ix(),
            ComputeBudgetInstruction::set_compute_unit_price(1),
        ];
        assert!(sanity_check_ix_order(&instructions).is_err());

        let instructions = vec![program_ix(), ata_ix()];
        assert!(sanity_check_ix_order(&instructions).is_err());

        assert!(sanity_check_ix_order(&[]).is_err());
    }

    #[test]
    fn test_anchor_discriminator() {
        // sha256("global:submit_bid")
        let digest = Sha256::digest(b"global:submit_bid");
        assert_eq!(anchor_discriminator("submit_bid"), digest[..8]);
        assert_ne!(anchor_discriminator("swap"), anchor_discriminator("submit_bid"));
    }
}
