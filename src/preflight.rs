use std::num::NonZeroU32;

use anyhow::{bail, Result};
use governor::{Quota, RateLimiter};
use indicatif::{ProgressBar, ProgressStyle};
use solana_sdk::pubkey::Pubkey;

use crate::ata::{derive_associated_token_address, AtaInspection, AtaInspectionEntry};
use crate::rpc::{PlannerRpc, SimulationOutcome};
use crate::tx::{build_distribution_message, unsigned_transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightFailure {
    pub recipient: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub passed: bool,
    pub scanned_count: usize,
    pub failed_count: usize,
    pub failures: Vec<PreflightFailure>,
}

/// Dry-runs one transaction per recipient. A failure never short-circuits the
/// rest of the scan; setup errors for one recipient are recorded the same way
/// as simulation errors.
pub async fn run_distribution_preflight<R: PlannerRpc>(
    rpc: &R,
    payer: &Pubkey,
    per_recipient_raw: u64,
    inspection: &AtaInspection,
    simulations_per_second: u32,
) -> Result<PreflightReport> {
    if inspection.entries.is_empty() {
        bail!("ATA inspection has no recipients.");
    }

    let source_ata =
        derive_associated_token_address(payer, &inspection.mint, &inspection.token_program)?;

    let limiter = RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(simulations_per_second).expect("simulations_per_second must be non-zero"),
    ));

    let pb = ProgressBar::new(inspection.entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} Simulating transfers")?,
    );

    let mut failures = Vec::new();
    for entry in &inspection.entries {
        limiter.until_ready().await;

        match simulate_entry(rpc, payer, &source_ata, inspection, entry, per_recipient_raw).await {
            Ok(outcome) => {
                if let Some(error) = outcome.err {
                    failures.push(PreflightFailure {
                        recipient: entry.recipient.to_string(),
                        error: format_simulation_error(&error, &outcome.logs),
                    });
                }
            }
            Err(error) => {
                failures.push(PreflightFailure {
                    recipient: entry.recipient.to_string(),
                    error: error.to_string(),
                });
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let scanned_count = inspection.entries.len();
    let failed_count = failures.len();

    Ok(PreflightReport {
        passed: failed_count == 0 && scanned_count > 0,
        scanned_count,
        failed_count,
        failures,
    })
}

async fn simulate_entry<R: PlannerRpc>(
    rpc: &R,
    payer: &Pubkey,
    source_ata: &Pubkey,
    inspection: &AtaInspection,
    entry: &AtaInspectionEntry,
    per_recipient_raw: u64,
) -> Result<SimulationOutcome> {
    let message = build_distribution_message(
        payer,
        &inspection.mint,
        &inspection.token_program,
        source_ata,
        &entry.recipient,
        &entry.recipient_ata,
        per_recipient_raw,
        inspection.decimals,
        entry.needs_ata,
    )?;
    let blockhash = rpc.get_latest_blockhash().await?;
    let tx = unsigned_transaction(message, blockhash);
    rpc.simulate_transaction(&tx).await
}

fn format_simulation_error(error: &str, logs: &[String]) -> String {
    match logs.first() {
        Some(first_log) if !first_log.is_empty() => format!("{error} ({first_log})"),
        _ => error.to_string(),
    }
}
