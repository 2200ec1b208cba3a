use anyhow::{bail, Result};
use solana_sdk::message::Message;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_token::state::Account as TokenAccount;

use crate::ata::{derive_associated_token_address, AtaInspection, AtaInspectionEntry};
use crate::rpc::PlannerRpc;
use crate::tx::build_distribution_message;

/// Spare lamports demanded beyond the computed fee and rent total.
pub const SAFETY_BUFFER_LAMPORTS: u64 = 2_000_000;
/// Used when the endpoint cannot price a message.
pub const FALLBACK_FEE_LAMPORTS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeHeadroomEstimate {
    pub payer_lamports: u64,
    pub required_lamports: u64,
    pub fee_existing_ata_lamports: u64,
    pub fee_missing_ata_lamports: u64,
    pub ata_rent_lamports_each: u64,
    pub missing_ata_count: usize,
    pub safety_buffer_lamports: u64,
    pub passes: bool,
}

/// Prices one representative transfer-only transaction and one create-and-
/// transfer transaction, then scales by the inspection counts. Recomputed
/// from scratch on every planning pass; fee schedules vary per transaction
/// shape, so nothing is cached.
pub async fn estimate_distribution_headroom<R: PlannerRpc>(
    rpc: &R,
    payer: &Pubkey,
    per_recipient_raw: u64,
    inspection: &AtaInspection,
) -> Result<FeeHeadroomEstimate> {
    if per_recipient_raw == 0 {
        bail!("Per-recipient amount must be greater than zero.");
    }
    if inspection.entries.is_empty() {
        bail!("ATA inspection has no recipients.");
    }

    let source_ata =
        derive_associated_token_address(payer, &inspection.mint, &inspection.token_program)?;

    let fallback_entry = &inspection.entries[0];
    let existing_entry = inspection
        .entries
        .iter()
        .find(|entry| !entry.needs_ata)
        .unwrap_or(fallback_entry);
    let missing_entry = inspection
        .entries
        .iter()
        .find(|entry| entry.needs_ata)
        .unwrap_or(fallback_entry);

    let transfer_only = representative_message(
        rpc,
        payer,
        &source_ata,
        inspection,
        existing_entry,
        per_recipient_raw,
        false,
    )
    .await?;
    let create_and_transfer = representative_message(
        rpc,
        payer,
        &source_ata,
        inspection,
        missing_entry,
        per_recipient_raw,
        true,
    )
    .await?;

    let payer_lamports = rpc.get_balance(payer).await?;
    let ata_rent_lamports_each = rpc
        .get_minimum_balance_for_rent_exemption(TokenAccount::LEN)
        .await?;
    let fee_existing_ata_lamports = price_message(rpc, &transfer_only).await;
    let fee_missing_ata_lamports = price_message(rpc, &create_and_transfer).await;

    let missing = inspection.missing_ata_count as u64;
    let existing = inspection.existing_ata_count as u64;
    let required_lamports = fee_existing_ata_lamports * existing
        + fee_missing_ata_lamports * missing
        + ata_rent_lamports_each * missing
        + SAFETY_BUFFER_LAMPORTS;

    Ok(FeeHeadroomEstimate {
        payer_lamports,
        required_lamports,
        fee_existing_ata_lamports,
        fee_missing_ata_lamports,
        ata_rent_lamports_each,
        missing_ata_count: inspection.missing_ata_count,
        safety_buffer_lamports: SAFETY_BUFFER_LAMPORTS,
        passes: payer_lamports >= required_lamports,
    })
}

async fn representative_message<R: PlannerRpc>(
    rpc: &R,
    payer: &Pubkey,
    source_ata: &Pubkey,
    inspection: &AtaInspection,
    entry: &AtaInspectionEntry,
    per_recipient_raw: u64,
    include_create_ata: bool,
) -> Result<Message> {
    let mut message = build_distribution_message(
        payer,
        &inspection.mint,
        &inspection.token_program,
        source_ata,
        &entry.recipient,
        &entry.recipient_ata,
        per_recipient_raw,
        inspection.decimals,
        include_create_ata,
    )?;
    message.recent_blockhash = rpc.get_latest_blockhash().await?;
    Ok(message)
}

async fn price_message<R: PlannerRpc>(rpc: &R, message: &Message) -> u64 {
    match rpc.get_fee_for_message(message).await {
        Ok(Some(fee)) => fee,
        Ok(None) | Err(_) => FALLBACK_FEE_LAMPORTS,
    }
}
