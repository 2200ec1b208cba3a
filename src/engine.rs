use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::RwLock;

use crate::ata::{inspect_recipient_atas, AtaInspection};
use crate::fees::{estimate_distribution_headroom, FeeHeadroomEstimate};
use crate::gate::{derive_gate_model, DistributionChecks, DistributionGateModel, PreflightStatus};
use crate::preflight::{run_distribution_preflight, PreflightFailure};
use crate::recipients::{build_run_recipient_set, RecipientAddress, RunRecipientSet};
use crate::rpc::{Cluster, PlannerRpc};
use crate::split::{build_equal_split_plan, SplitPlan};
use crate::tx::per_recipient_transfer_amount;
use crate::wallets::GeneratedWallet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MainnetChecklist {
    pub acknowledge_fees: bool,
    pub acknowledge_irreversible: bool,
}

/// Validated record shape for one held token; the engine reads only
/// decimals, balance, and the support flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAsset {
    pub mint: Pubkey,
    pub token_program: Pubkey,
    pub decimals: u8,
    pub balance_raw: u64,
    pub is_classic_spl: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InventoryStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenInventory {
    pub status: InventoryStatus,
    pub items: Vec<TokenAsset>,
    pub selected_mint: Option<Pubkey>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightState {
    pub status: PreflightStatus,
    pub scanned_count: usize,
    pub failed_count: usize,
    pub failures: Vec<PreflightFailure>,
}

#[derive(Debug, Clone, Default)]
pub struct DistributionState {
    pub total_ui_amount: String,
    pub plan: Option<SplitPlan>,
    pub plan_error: Option<String>,
    pub checks: DistributionChecks,
    pub fee_estimate: Option<FeeHeadroomEstimate>,
    pub fee_estimate_error: Option<String>,
    pub ata_inspection: Option<AtaInspection>,
    pub preflight: PreflightState,
    pub mainnet_checklist: MainnetChecklist,
}

/// The single process-wide state container. Snapshots are immutable; every
/// transition replaces the whole `Arc`.
#[derive(Debug, Clone)]
pub struct AppState {
    pub cluster: Cluster,
    pub payer: Option<Pubkey>,
    pub generated_wallets: Vec<GeneratedWallet>,
    pub imported_recipients: Vec<RecipientAddress>,
    pub token_inventory: TokenInventory,
    pub distribution: DistributionState,
}

impl AppState {
    fn idle(cluster: Cluster) -> Self {
        AppState {
            cluster,
            payer: None,
            generated_wallets: Vec::new(),
            imported_recipients: Vec::new(),
            token_inventory: TokenInventory::default(),
            distribution: DistributionState::default(),
        }
    }
}

pub fn run_recipient_set(state: &AppState) -> RunRecipientSet {
    build_run_recipient_set(&state.generated_wallets, &state.imported_recipients)
}

pub fn selected_token(state: &AppState) -> Option<&TokenAsset> {
    let selected = state.token_inventory.selected_mint?;
    state
        .token_inventory
        .items
        .iter()
        .find(|item| item.mint == selected)
}

/// Monotonic request ids for one kind of asynchronous recompute. A resolving
/// request compares its captured id against the counter; a mismatch means a
/// newer request started and the result must be discarded unapplied.
#[derive(Debug, Default)]
pub struct RequestCounter(AtomicU64);

impl RequestCounter {
    pub fn begin(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn invalidate(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, id: u64) -> bool {
        self.0.load(Ordering::SeqCst) == id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryRefreshOutcome {
    Idle,
    Stale,
    Ready(usize),
}

/// Concurrency control for the planner: one counter per recompute kind gives
/// last-request-wins semantics without cancellation primitives. Distinct
/// kinds may be in flight simultaneously.
pub struct PlannerEngine {
    state: RwLock<Arc<AppState>>,
    inventory_requests: RequestCounter,
    planning_requests: RequestCounter,
    preflight_requests: RequestCounter,
}

impl PlannerEngine {
    pub fn new(cluster: Cluster) -> Self {
        PlannerEngine {
            state: RwLock::new(Arc::new(AppState::idle(cluster))),
            inventory_requests: RequestCounter::default(),
            planning_requests: RequestCounter::default(),
            preflight_requests: RequestCounter::default(),
        }
    }

    pub async fn snapshot(&self) -> Arc<AppState> {
        Arc::clone(&*self.state.read().await)
    }

    pub async fn gate_model(&self) -> DistributionGateModel {
        let state = self.snapshot().await;
        derive_gate_model(
            &state.distribution.checks,
            state.distribution.preflight.status,
        )
    }

    async fn update(&self, apply: impl FnOnce(&mut AppState)) -> Arc<AppState> {
        let mut guard = self.state.write().await;
        let mut next = (**guard).clone();
        apply(&mut next);
        *guard = Arc::new(next);
        Arc::clone(&*guard)
    }

    pub async fn set_payer(&self, payer: Option<Pubkey>) {
        self.update(|state| state.payer = payer).await;
    }

    /// Switching clusters abandons every in-flight recompute and resets the
    /// inventory and planner to idle.
    pub async fn set_cluster(&self, cluster: Cluster) {
        self.inventory_requests.invalidate();
        self.planning_requests.invalidate();
        self.preflight_requests.invalidate();
        self.update(|state| {
            state.cluster = cluster;
            state.token_inventory = TokenInventory::default();
            state.distribution = DistributionState::default();
        })
        .await;
    }

    pub async fn set_total_amount(&self, total_ui_amount: &str) {
        self.update(|state| state.distribution.total_ui_amount = total_ui_amount.to_string())
            .await;
    }

    pub async fn select_token(&self, mint: Option<Pubkey>) {
        self.update(|state| state.token_inventory.selected_mint = mint)
            .await;
    }

    pub async fn set_generated_wallets(&self, wallets: Vec<GeneratedWallet>) {
        self.update(|state| state.generated_wallets = wallets).await;
    }

    pub async fn set_imported_recipients(&self, recipients: Vec<RecipientAddress>) {
        self.update(|state| state.imported_recipients = recipients)
            .await;
    }

    pub async fn set_mainnet_checklist(&self, checklist: MainnetChecklist) {
        self.update(|state| state.distribution.mainnet_checklist = checklist)
            .await;
    }

    /// Loads the token inventory through the supplied loader under the
    /// inventory generation counter. Callers re-run the planning recompute
    /// once this settles; there is no implicit dependency tracking.
    pub async fn refresh_token_inventory<F, Fut>(&self, loader: F) -> Result<InventoryRefreshOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<TokenAsset>>>,
    {
        let state = self.snapshot().await;
        if state.payer.is_none() {
            self.inventory_requests.invalidate();
            self.update(|state| state.token_inventory = TokenInventory::default())
                .await;
            return Ok(InventoryRefreshOutcome::Idle);
        }

        let request_id = self.inventory_requests.begin();
        let preferred = state.token_inventory.selected_mint;
        self.update(|state| {
            state.token_inventory = TokenInventory {
                status: InventoryStatus::Loading,
                items: Vec::new(),
                selected_mint: None,
                error: None,
            };
        })
        .await;

        match loader().await {
            Ok(items) => {
                let mut guard = self.state.write().await;
                if !self.inventory_requests.is_current(request_id) {
                    return Ok(InventoryRefreshOutcome::Stale);
                }
                let count = items.len();
                let mut next = (**guard).clone();
                next.token_inventory = TokenInventory {
                    status: InventoryStatus::Ready,
                    selected_mint: pick_selected_mint(&items, preferred),
                    items,
                    error: None,
                };
                *guard = Arc::new(next);
                Ok(InventoryRefreshOutcome::Ready(count))
            }
            Err(error) => {
                let mut guard = self.state.write().await;
                if !self.inventory_requests.is_current(request_id) {
                    return Ok(InventoryRefreshOutcome::Stale);
                }
                let mut next = (**guard).clone();
                next.token_inventory = TokenInventory {
                    status: InventoryStatus::Error,
                    items: Vec::new(),
                    selected_mint: None,
                    error: Some(error.to_string()),
                };
                *guard = Arc::new(next);
                drop(guard);
                Err(error)
            }
        }
    }

    /// Recomputes the split plan, account inspection, fee headroom, and the
    /// full checklist from the current snapshot. Any earlier in-flight
    /// planning pass and any in-flight preflight are invalidated; the
    /// preflight status always returns to idle so a stale validation can
    /// never gate a start.
    ///
    /// Returns `Ok(None)` when this pass itself was superseded mid-flight.
    pub async fn recompute_distribution_plan<R: PlannerRpc>(
        &self,
        rpc: &R,
    ) -> Result<Option<Arc<AppState>>> {
        let request_id = self.planning_requests.begin();
        self.preflight_requests.invalidate();

        let state = self.snapshot().await;
        let token = selected_token(&state).cloned();
        let run_set = run_recipient_set(&state);
        let amount_text = state.distribution.total_ui_amount.clone();
        let checklist = state.distribution.mainnet_checklist;

        let mut checks = DistributionChecks::default();
        checks.wallet_connected = state.payer.is_some();
        checks.token_selected = token.is_some();
        checks.token_supported = token.as_ref().map(|t| t.is_classic_spl).unwrap_or(false);
        checks.recipients_ready = !run_set.recipients.is_empty();
        checks.mainnet_acknowledged = state.cluster != Cluster::MainnetBeta
            || (checklist.acknowledge_fees && checklist.acknowledge_irreversible);

        let mut plan: Option<SplitPlan> = None;
        let mut plan_error: Option<String> = None;
        let mut fee_estimate: Option<FeeHeadroomEstimate> = None;
        let mut fee_estimate_error: Option<String> = None;
        let mut ata_inspection: Option<AtaInspection> = None;

        if checks.token_selected && checks.recipients_ready {
            let decimals = token.as_ref().map(|t| t.decimals).unwrap_or(0);
            match build_equal_split_plan(&amount_text, decimals, run_set.recipients.len()) {
                Ok(built) => {
                    checks.amount_valid = true;
                    plan = Some(built);
                }
                Err(error) => plan_error = Some(error.to_string()),
            }
        } else if !amount_text.trim().is_empty() {
            plan_error =
                Some("Select a token and ensure at least one recipient to compute a plan.".into());
        }

        if let (Some(plan), Some(token)) = (&plan, &token) {
            checks.balance_sufficient =
                u128::from(token.balance_raw) >= plan.planned_transfer_total_raw;
        }

        let should_estimate = checks.wallet_connected
            && checks.token_selected
            && checks.token_supported
            && checks.recipients_ready
            && checks.amount_valid
            && checks.balance_sufficient;

        if should_estimate {
            // Guarded by the checks above.
            let payer = state.payer.context("payer missing despite passing checks")?;
            let token = token.as_ref().context("token missing despite passing checks")?;
            let plan_ref = plan.as_ref().context("plan missing despite passing checks")?;

            match planning_network_pass(rpc, &payer, token, plan_ref, &run_set).await {
                Ok((inspection, estimate)) => {
                    if !self.planning_requests.is_current(request_id) {
                        return Ok(None);
                    }
                    checks.fee_headroom_sufficient = estimate.passes;
                    ata_inspection = Some(inspection);
                    fee_estimate = Some(estimate);
                }
                Err(error) => {
                    if !self.planning_requests.is_current(request_id) {
                        return Ok(None);
                    }
                    fee_estimate_error = Some(error.to_string());
                }
            }
        }

        let mut guard = self.state.write().await;
        if !self.planning_requests.is_current(request_id) {
            return Ok(None);
        }
        let mut next = (**guard).clone();
        next.distribution = DistributionState {
            total_ui_amount: amount_text,
            plan,
            plan_error,
            checks,
            fee_estimate,
            fee_estimate_error,
            ata_inspection,
            preflight: PreflightState::default(),
            mainnet_checklist: checklist,
        };
        *guard = Arc::new(next);
        Ok(Some(Arc::clone(&*guard)))
    }

    /// Explicit user action, accepted only when every static check passes and
    /// no preflight is already running. Returns `Ok(None)` when superseded.
    pub async fn run_preflight<R: PlannerRpc>(
        &self,
        rpc: &R,
        simulations_per_second: u32,
    ) -> Result<Option<Arc<AppState>>> {
        let state = self.snapshot().await;
        let gate = derive_gate_model(
            &state.distribution.checks,
            state.distribution.preflight.status,
        );
        if !gate.can_run_preflight {
            bail!("Distribution preflight is blocked until all static validations pass.");
        }

        let (Some(plan), Some(inspection), Some(payer)) = (
            state.distribution.plan.clone(),
            state.distribution.ata_inspection.clone(),
            state.payer,
        ) else {
            bail!("Distribution preflight is unavailable until planning data is complete.");
        };

        let request_id = self.preflight_requests.begin();
        let target_count = inspection.entries.len();
        self.update(|state| {
            state.distribution.checks.preflight_passed = false;
            state.distribution.preflight = PreflightState {
                status: PreflightStatus::Running,
                scanned_count: target_count,
                failed_count: 0,
                failures: Vec::new(),
            };
        })
        .await;

        let outcome = async {
            let per_recipient = per_recipient_transfer_amount(plan.per_recipient_raw)?;
            run_distribution_preflight(rpc, &payer, per_recipient, &inspection, simulations_per_second)
                .await
        }
        .await;

        let mut guard = self.state.write().await;
        if !self.preflight_requests.is_current(request_id) {
            return Ok(None);
        }
        let mut next = (**guard).clone();
        match outcome {
            Ok(report) => {
                next.distribution.checks.preflight_passed = report.passed;
                next.distribution.preflight = PreflightState {
                    status: if report.passed {
                        PreflightStatus::Passed
                    } else {
                        PreflightStatus::Failed
                    },
                    scanned_count: report.scanned_count,
                    failed_count: report.failed_count,
                    failures: report.failures,
                };
            }
            Err(error) => {
                next.distribution.checks.preflight_passed = false;
                next.distribution.preflight = PreflightState {
                    status: PreflightStatus::Failed,
                    scanned_count: target_count,
                    failed_count: target_count,
                    failures: vec![PreflightFailure {
                        recipient: "preflight".to_string(),
                        error: error.to_string(),
                    }],
                };
            }
        }
        *guard = Arc::new(next);
        Ok(Some(Arc::clone(&*guard)))
    }

    /// Transfer execution is future work; this validates the gate and stops.
    pub async fn start_distribution(&self) -> Result<String> {
        let gate = self.gate_model().await;
        if !gate.can_start_distribution {
            bail!("Distribution start is blocked until all checks pass and preflight succeeds.");
        }
        Ok(
            "Distribution run is validated and ready. Transfer execution is not implemented yet."
                .to_string(),
        )
    }
}

fn pick_selected_mint(items: &[TokenAsset], preferred: Option<Pubkey>) -> Option<Pubkey> {
    if let Some(preferred) = preferred {
        if items.iter().any(|item| item.mint == preferred) {
            return Some(preferred);
        }
    }
    if items.len() == 1 {
        return Some(items[0].mint);
    }
    None
}

async fn planning_network_pass<R: PlannerRpc>(
    rpc: &R,
    payer: &Pubkey,
    token: &TokenAsset,
    plan: &SplitPlan,
    run_set: &RunRecipientSet,
) -> Result<(AtaInspection, FeeHeadroomEstimate)> {
    let recipients = run_set
        .recipients
        .iter()
        .map(|recipient| {
            Pubkey::from_str(&recipient.public_address)
                .with_context(|| format!("Invalid recipient address: {}", recipient.public_address))
        })
        .collect::<Result<Vec<Pubkey>>>()?;

    let inspection = inspect_recipient_atas(
        rpc,
        token.mint,
        token.token_program,
        token.decimals,
        &recipients,
    )
    .await?;

    let per_recipient = per_recipient_transfer_amount(plan.per_recipient_raw)?;
    let estimate = estimate_distribution_headroom(rpc, payer, per_recipient, &inspection).await?;

    Ok((inspection, estimate))
}
