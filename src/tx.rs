use anyhow::{Context, Result};
use solana_sdk::hash::Hash;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use spl_associated_token_account::instruction::create_associated_token_account;
use spl_token::instruction::transfer_checked;

/// The transaction shape used for both fee pricing and preflight simulation:
/// an optional create-ATA instruction followed by a checked transfer.
#[allow(clippy::too_many_arguments)]
pub fn build_distribution_message(
    payer: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
    source_ata: &Pubkey,
    recipient: &Pubkey,
    recipient_ata: &Pubkey,
    amount_raw: u64,
    decimals: u8,
    include_create_ata: bool,
) -> Result<Message> {
    let mut instructions = Vec::with_capacity(2);

    if include_create_ata {
        instructions.push(create_associated_token_account(
            payer,
            recipient,
            mint,
            token_program,
        ));
    }

    instructions.push(transfer_checked(
        token_program,
        source_ata,
        mint,
        recipient_ata,
        payer,
        &[],
        amount_raw,
        decimals,
    )?);

    Ok(Message::new(&instructions, Some(payer)))
}

/// The plan carries u128 raw amounts; the wire format is u64.
pub fn per_recipient_transfer_amount(per_recipient_raw: u128) -> Result<u64> {
    u64::try_from(per_recipient_raw).context("Per-recipient amount exceeds the u64 transfer range.")
}

/// Unsigned transaction for dry-run simulation: default signatures, no keys.
pub fn unsigned_transaction(mut message: Message, blockhash: Hash) -> VersionedTransaction {
    message.recent_blockhash = blockhash;
    let message = VersionedMessage::Legacy(message);
    VersionedTransaction {
        signatures: vec![Signature::default(); message.header().num_required_signatures as usize],
        message,
    }
}
