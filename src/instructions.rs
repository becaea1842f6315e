//! Instruction and transaction assembly for an SPL token transfer.
//!
//! A transfer is at most two instructions: an optional creation of the
//! recipient's associated token account, then the token transfer itself.
//! Both are bundled into one unsigned transaction paid for by the sender.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey,
    pubkey::Pubkey,
    system_program,
    transaction::Transaction,
};

use crate::error::TransferError;
use crate::ledger::FreshnessAnchor;

/// Associated Token Account program: `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// `Create` in the associated token account program's instruction enum.
const CREATE_ASSOCIATED_ACCOUNT: u8 = 0;

/// Derive the associated token account for `owner` and `mint`.
///
/// Seeds are `[owner, token_program, mint]` under the associated token
/// account program, so the address is the same for every caller.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    let token_program = spl_token::id();
    let (address, _bump) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    );
    address
}

/// Instruction creating `owner`'s associated token account for `mint`,
/// funded by `payer`.
pub fn create_associated_token_account(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    let account = associated_token_address(owner, mint);
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(account, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data: vec![CREATE_ASSOCIATED_ACCOUNT],
    }
}

/// SPL `Transfer` of `amount` base units, authorized by `authority`.
pub fn transfer_instruction(
    source: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
) -> Result<Instruction, TransferError> {
    if amount == 0 {
        return Err(TransferError::InvalidRequest(
            "transfer amount must be greater than zero".into(),
        ));
    }
    spl_token::instruction::transfer(
        &spl_token::id(),
        source,
        destination,
        authority,
        &[],
        amount,
    )
    .map_err(|e| TransferError::InvalidRequest(e.to_string()))
}

/// Everything needed to build the instructions of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub sender: Pubkey,
    pub recipient: Pubkey,
    pub mint: Pubkey,
    pub sender_token_account: Pubkey,
    pub recipient_token_account: Pubkey,
    /// Base units, already scaled by the mint's decimals.
    pub amount: u64,
    pub create_recipient_account: bool,
}

impl TransferPlan {
    pub fn new(sender: Pubkey, recipient: Pubkey, mint: Pubkey, amount: u64) -> Self {
        Self {
            sender,
            recipient,
            mint,
            sender_token_account: associated_token_address(&sender, &mint),
            recipient_token_account: associated_token_address(&recipient, &mint),
            amount,
            create_recipient_account: false,
        }
    }

    pub fn instructions(&self) -> Result<Vec<Instruction>, TransferError> {
        let mut instructions = Vec::with_capacity(2);
        if self.create_recipient_account {
            instructions.push(create_associated_token_account(
                &self.sender,
                &self.recipient,
                &self.mint,
            ));
        }
        instructions.push(transfer_instruction(
            &self.sender_token_account,
            &self.recipient_token_account,
            &self.sender,
            self.amount,
        )?);
        Ok(instructions)
    }
}

/// Bundle `instructions` into one unsigned transaction anchored to
/// `anchor.blockhash` with `fee_payer` paying.
pub fn assemble_transaction(
    instructions: &[Instruction],
    fee_payer: &Pubkey,
    anchor: &FreshnessAnchor,
) -> Transaction {
    let message = Message::new_with_blockhash(instructions, Some(fee_payer), &anchor.blockhash);
    Transaction::new_unsigned(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::hash::Hash;
    use std::str::FromStr;

    #[test]
    fn program_ids_match_known_addresses() {
        assert_eq!(
            ASSOCIATED_TOKEN_PROGRAM_ID,
            Pubkey::from_str("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL").unwrap()
        );
        assert_eq!(
            spl_token::id().to_string(),
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        );
    }

    #[test]
    fn associated_address_is_deterministic_and_off_curve() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let a = associated_token_address(&owner, &mint);
        assert_eq!(a, associated_token_address(&owner, &mint));
        assert!(!a.is_on_curve());
    }

    #[test]
    fn associated_address_differs_per_owner_and_mint() {
        let owner = Pubkey::new_unique();
        let other = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let other_mint = Pubkey::new_unique();
        assert_ne!(
            associated_token_address(&owner, &mint),
            associated_token_address(&other, &mint)
        );
        assert_ne!(
            associated_token_address(&owner, &mint),
            associated_token_address(&owner, &other_mint)
        );
    }

    #[test]
    fn create_account_instruction_layout() {
        let payer = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ix = create_associated_token_account(&payer, &owner, &mint);

        assert_eq!(ix.program_id, ASSOCIATED_TOKEN_PROGRAM_ID);
        assert_eq!(ix.data, vec![0]);
        assert_eq!(ix.accounts.len(), 6);
        assert!(ix.accounts[0].is_signer && ix.accounts[0].is_writable);
        assert_eq!(ix.accounts[1].pubkey, associated_token_address(&owner, &mint));
        assert!(ix.accounts[1].is_writable);
        assert_eq!(ix.accounts[2].pubkey, owner);
        assert_eq!(ix.accounts[3].pubkey, mint);
    }

    #[test]
    fn transfer_instruction_encodes_amount() {
        let source = Pubkey::new_unique();
        let destination = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let ix = transfer_instruction(&source, &destination, &authority, 500_000).unwrap();

        assert_eq!(ix.program_id, spl_token::id());
        assert_eq!(ix.data[0], 3);
        assert_eq!(u64::from_le_bytes(ix.data[1..9].try_into().unwrap()), 500_000);
        assert_eq!(ix.accounts[0].pubkey, source);
        assert_eq!(ix.accounts[1].pubkey, destination);
        assert_eq!(ix.accounts[2].pubkey, authority);
        assert!(ix.accounts[2].is_signer);
    }

    #[test]
    fn zero_transfer_is_rejected() {
        let k = Pubkey::new_unique();
        assert!(transfer_instruction(&k, &k, &k, 0).is_err());
    }

    #[test]
    fn plan_without_recipient_account_has_two_instructions_in_order() {
        let mut plan = TransferPlan::new(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            100_000_000_000,
        );
        plan.create_recipient_account = true;

        let ixs = plan.instructions().unwrap();
        assert_eq!(ixs.len(), 2);
        assert_eq!(ixs[0].program_id, ASSOCIATED_TOKEN_PROGRAM_ID);
        assert_eq!(ixs[1].program_id, spl_token::id());
    }

    #[test]
    fn plan_with_recipient_account_has_only_transfer() {
        let plan = TransferPlan::new(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            1,
        );
        let ixs = plan.instructions().unwrap();
        assert_eq!(ixs.len(), 1);
        assert_eq!(ixs[0].program_id, spl_token::id());
    }

    #[test]
    fn transaction_carries_anchor_and_fee_payer() {
        let plan = TransferPlan::new(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            7,
        );
        let anchor = FreshnessAnchor {
            blockhash: Hash::new_unique(),
            last_valid_block_height: 150,
        };
        let tx = assemble_transaction(&plan.instructions().unwrap(), &plan.sender, &anchor);

        assert_eq!(tx.message.recent_blockhash, anchor.blockhash);
        assert_eq!(tx.message.account_keys[0], plan.sender);
        assert_eq!(tx.message.instructions.len(), 1);
        assert_eq!(tx.signatures.len(), 1);
    }
}
