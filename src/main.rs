mod ata;
mod engine;
mod fees;
mod gate;
mod inventory;
mod preflight;
mod recipients;
mod rpc;
mod split;
mod tx;
mod wallets;

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;

use crate::engine::{
    run_recipient_set, AppState, InventoryRefreshOutcome, MainnetChecklist, PlannerEngine,
};
use crate::gate::{next_action, DistributionChecks, PreflightStatus};
use crate::inventory::fetch_token_inventory;
use crate::recipients::load_imported_recipients;
use crate::rpc::{new_rpc_client, Cluster};
use crate::split::format_raw_with_decimals;
use crate::wallets::{generate_wallets, wallets_to_json, write_wallets_csv};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and validate a token distribution without sending any transfer
    Plan(PlanArgs),
    /// Generate keypairs for test distributions
    GenerateWallets(GenerateArgs),
}

#[derive(Parser)]
struct PlanArgs {
    /// SPL token mint to distribute
    #[clap(long)]
    mint: String,

    /// Payer wallet public key (no secret key is ever read)
    #[clap(long)]
    payer: String,

    /// Total amount to split equally, in UI units
    #[clap(long)]
    amount: String,

    /// Recipient CSV to import
    #[clap(long)]
    recipients_csv: Option<PathBuf>,

    /// Generate this many fresh wallets as recipients
    #[clap(long)]
    generate: Option<usize>,

    /// Target cluster: devnet, testnet, mainnet-beta
    #[clap(long, default_value = "devnet")]
    cluster: Cluster,

    /// RPC URL (defaults to the cluster's public endpoint)
    #[clap(long)]
    url: Option<String>,

    /// Run the dry-run simulation across every recipient
    #[clap(long)]
    preflight: bool,

    /// Simulations per second during preflight
    #[clap(long, default_value = "10")]
    rate_limit: u32,

    /// Acknowledge mainnet network fees
    #[clap(long)]
    ack_mainnet_fees: bool,

    /// Acknowledge that mainnet transfers are irreversible
    #[clap(long)]
    ack_mainnet_irreversible: bool,

    /// Write a JSON planning report
    #[clap(long)]
    report: Option<PathBuf>,
}

#[derive(Parser)]
struct GenerateArgs {
    /// Number of wallets (1-100)
    #[clap(long)]
    count: usize,

    /// Output file
    #[clap(long)]
    output: PathBuf,

    /// Write JSON instead of CSV
    #[clap(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan(args) => plan(args).await,
        Commands::GenerateWallets(args) => generate(args),
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    let wallets = generate_wallets(args.count)?;

    if args.json {
        fs::write(&args.output, wallets_to_json(&wallets)?)
            .with_context(|| format!("Failed to write {}", args.output.display()))?;
    } else {
        write_wallets_csv(&args.output, &wallets)?;
    }

    println!(
        "Generated {} wallet(s) in {}",
        wallets.len(),
        args.output.display()
    );
    println!("⚠️  The export contains secret keys. Store it securely.");
    Ok(())
}

async fn plan(args: PlanArgs) -> Result<()> {
    println!("\n🚀 Planning SPL token distribution...");

    let payer = Pubkey::from_str(&args.payer).context("Invalid payer address")?;
    let mint = Pubkey::from_str(&args.mint).context("Invalid mint address")?;
    let cluster = args.cluster;
    let url = args
        .url
        .clone()
        .unwrap_or_else(|| cluster.api_url().to_string());
    println!("Cluster: {} ({})", cluster, url);
    println!("Payer: {}", payer);
    println!("Token mint: {}", mint);

    let engine = PlannerEngine::new(cluster);
    engine.set_payer(Some(payer)).await;
    engine.set_total_amount(&args.amount).await;
    engine
        .set_mainnet_checklist(MainnetChecklist {
            acknowledge_fees: args.ack_mainnet_fees,
            acknowledge_irreversible: args.ack_mainnet_irreversible,
        })
        .await;

    if let Some(count) = args.generate {
        let wallets = generate_wallets(count)?;
        println!("Generated {} recipient wallet(s) in memory", wallets.len());
        engine.set_generated_wallets(wallets).await;
    }

    if let Some(path) = &args.recipients_csv {
        let imported = load_imported_recipients(path)?;
        for row in &imported.invalid_rows {
            eprintln!(
                "⚠️  Skipped line {}: {} ({})",
                row.line, row.reason, row.value
            );
        }
        if imported.duplicate_count > 0 {
            println!(
                "Skipped {} duplicate row(s) in {}",
                imported.duplicate_count,
                path.display()
            );
        }
        println!(
            "Imported {} recipient(s) from {}",
            imported.recipients.len(),
            path.display()
        );
        engine.set_imported_recipients(imported.recipients).await;
    }

    let run_set = run_recipient_set(&*engine.snapshot().await);
    println!(
        "Run set: {} unique recipient(s) ({} generated, {} imported, {} duplicate(s) skipped)",
        run_set.recipients.len(),
        run_set.generated_count,
        run_set.imported_count,
        run_set.duplicates_skipped
    );

    match engine
        .refresh_token_inventory(|| fetch_token_inventory(cluster, &url, &payer))
        .await
    {
        Ok(InventoryRefreshOutcome::Ready(count)) => {
            println!("Token inventory: {} holding(s)", count);
        }
        Ok(_) => {}
        Err(error) => eprintln!("⚠️  Token inventory load failed: {error}"),
    }
    engine.select_token(Some(mint)).await;

    let client = new_rpc_client(&url);
    let state = engine
        .recompute_distribution_plan(&client)
        .await?
        .context("planning pass was superseded")?;

    print_plan_summary(&state);

    if args.preflight {
        let gate = engine.gate_model().await;
        if gate.can_run_preflight {
            println!(
                "\nRunning preflight simulation for {} recipient(s)...",
                state
                    .distribution
                    .ata_inspection
                    .as_ref()
                    .map(|inspection| inspection.entries.len())
                    .unwrap_or(0)
            );
            if let Some(state) = engine.run_preflight(&client, args.rate_limit).await? {
                print_preflight_summary(&state);
            }
        } else {
            println!("\nDistribution preflight is blocked until all static validations pass.");
        }
    }

    let gate = engine.gate_model().await;
    if gate.can_start_distribution {
        println!("\n✅ {}", engine.start_distribution().await?);
    } else if let Some(action) = next_action(&gate.checks) {
        println!("\nNext action: {action}");
    }

    if let Some(path) = &args.report {
        let state = engine.snapshot().await;
        write_plan_report(path, &state, &url)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn print_plan_summary(state: &AppState) {
    let distribution = &state.distribution;

    if let Some(plan) = &distribution.plan {
        println!("\n📊 Split plan");
        println!("   Recipients: {}", plan.recipient_count);
        println!(
            "   Total: {} tokens ({} raw)",
            plan.total_ui_amount, plan.total_raw
        );
        println!(
            "   Per recipient: {} tokens ({} raw)",
            format_raw_with_decimals(plan.per_recipient_raw, plan.decimals),
            plan.per_recipient_raw
        );
        println!("   Remainder kept by payer: {} raw", plan.remainder_raw);
    } else if let Some(error) = &distribution.plan_error {
        println!("\n❌ Plan: {error}");
    }

    if let Some(inspection) = &distribution.ata_inspection {
        println!(
            "   Token accounts to create: {} of {}",
            inspection.missing_ata_count,
            inspection.entries.len()
        );
    }

    if let Some(estimate) = &distribution.fee_estimate {
        println!("\n💰 Fee headroom");
        println!(
            "   Required: {:.6} SOL (fees + rent + {:.3} SOL buffer)",
            lamports_to_sol(estimate.required_lamports),
            lamports_to_sol(estimate.safety_buffer_lamports)
        );
        println!(
            "   Payer balance: {:.6} SOL",
            lamports_to_sol(estimate.payer_lamports)
        );
        println!(
            "   {}",
            if estimate.passes {
                "✅ Sufficient"
            } else {
                "❌ Insufficient"
            }
        );
    } else if let Some(error) = &distribution.fee_estimate_error {
        println!("\n⚠️  Fee estimate unavailable: {error}");
    }

    println!("\nChecklist:");
    for (label, ok) in checklist_rows(&distribution.checks) {
        println!("   {} {}", if ok { "✅" } else { "❌" }, label);
    }
}

fn print_preflight_summary(state: &AppState) {
    let preflight = &state.distribution.preflight;
    match preflight.status {
        PreflightStatus::Passed => {
            println!(
                "✅ Preflight passed for {} recipient(s)",
                preflight.scanned_count
            );
        }
        PreflightStatus::Failed => {
            println!(
                "❌ Preflight failed for {} of {} recipient(s)",
                preflight.failed_count, preflight.scanned_count
            );
            for failure in &preflight.failures {
                println!("   - {}: {}", failure.recipient, failure.error);
            }
        }
        PreflightStatus::Idle | PreflightStatus::Running => {}
    }
}

fn checklist_rows(checks: &DistributionChecks) -> [(&'static str, bool); 9] {
    [
        ("wallet connected", checks.wallet_connected),
        ("token selected", checks.token_selected),
        ("token program supported", checks.token_supported),
        ("recipients ready", checks.recipients_ready),
        ("amount valid", checks.amount_valid),
        ("token balance sufficient", checks.balance_sufficient),
        ("fee headroom sufficient", checks.fee_headroom_sufficient),
        ("mainnet checklist acknowledged", checks.mainnet_acknowledged),
        ("preflight passed", checks.preflight_passed),
    ]
}

fn preflight_status_label(status: PreflightStatus) -> &'static str {
    match status {
        PreflightStatus::Idle => "idle",
        PreflightStatus::Running => "running",
        PreflightStatus::Passed => "passed",
        PreflightStatus::Failed => "failed",
    }
}

fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / 1_000_000_000.0
}

fn write_plan_report(path: &Path, state: &AppState, url: &str) -> Result<()> {
    let distribution = &state.distribution;
    let checks = &distribution.checks;

    let report = serde_json::json!({
        "created_at": chrono::Utc::now().to_rfc3339(),
        "cluster": state.cluster.name(),
        "rpc_url": url,
        "payer": state.payer.map(|p| p.to_string()),
        "run_set_size": run_recipient_set(state).recipients.len(),
        "plan": distribution.plan.as_ref().map(|plan| serde_json::json!({
            "total_ui_amount": plan.total_ui_amount,
            "decimals": plan.decimals,
            "recipient_count": plan.recipient_count,
            "total_raw": plan.total_raw.to_string(),
            "per_recipient_raw": plan.per_recipient_raw.to_string(),
            "remainder_raw": plan.remainder_raw.to_string(),
            "planned_transfer_total_raw": plan.planned_transfer_total_raw.to_string(),
        })),
        "plan_error": distribution.plan_error,
        "checks": {
            "wallet_connected": checks.wallet_connected,
            "token_selected": checks.token_selected,
            "token_supported": checks.token_supported,
            "recipients_ready": checks.recipients_ready,
            "amount_valid": checks.amount_valid,
            "balance_sufficient": checks.balance_sufficient,
            "fee_headroom_sufficient": checks.fee_headroom_sufficient,
            "mainnet_acknowledged": checks.mainnet_acknowledged,
            "preflight_passed": checks.preflight_passed,
        },
        "fee_estimate": distribution.fee_estimate.as_ref().map(|estimate| serde_json::json!({
            "payer_lamports": estimate.payer_lamports,
            "required_lamports": estimate.required_lamports,
            "fee_existing_ata_lamports": estimate.fee_existing_ata_lamports,
            "fee_missing_ata_lamports": estimate.fee_missing_ata_lamports,
            "ata_rent_lamports_each": estimate.ata_rent_lamports_each,
            "missing_ata_count": estimate.missing_ata_count,
            "safety_buffer_lamports": estimate.safety_buffer_lamports,
            "passes": estimate.passes,
        })),
        "fee_estimate_error": distribution.fee_estimate_error,
        "preflight": {
            "status": preflight_status_label(distribution.preflight.status),
            "scanned_count": distribution.preflight.scanned_count,
            "failed_count": distribution.preflight.failed_count,
            "failures": distribution.preflight.failures.iter().map(|failure| serde_json::json!({
                "recipient": failure.recipient,
                "error": failure.error,
            })).collect::<Vec<_>>(),
        },
    });

    fs::write(path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}
