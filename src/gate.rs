/// The 9 independent checklist flags. The first 8 are static checks; the
/// preflight flag is only meaningful alongside a Passed preflight status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributionChecks {
    pub wallet_connected: bool,
    pub token_selected: bool,
    pub token_supported: bool,
    pub recipients_ready: bool,
    pub amount_valid: bool,
    pub balance_sufficient: bool,
    pub fee_headroom_sufficient: bool,
    pub mainnet_acknowledged: bool,
    pub preflight_passed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PreflightStatus {
    #[default]
    Idle,
    Running,
    Passed,
    Failed,
}

/// Derived on demand from the current checks and preflight status; never
/// stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionGateModel {
    pub checks: DistributionChecks,
    pub all_static_checks_pass: bool,
    pub preflight_running: bool,
    pub can_run_preflight: bool,
    pub can_start_distribution: bool,
}

pub fn derive_gate_model(
    checks: &DistributionChecks,
    status: PreflightStatus,
) -> DistributionGateModel {
    let all_static_checks_pass = checks.wallet_connected
        && checks.token_selected
        && checks.token_supported
        && checks.recipients_ready
        && checks.amount_valid
        && checks.balance_sufficient
        && checks.fee_headroom_sufficient
        && checks.mainnet_acknowledged;
    let preflight_running = status == PreflightStatus::Running;

    DistributionGateModel {
        checks: *checks,
        all_static_checks_pass,
        preflight_running,
        can_run_preflight: all_static_checks_pass && !preflight_running,
        can_start_distribution: all_static_checks_pass
            && checks.preflight_passed
            && !preflight_running,
    }
}

/// Guidance for the first failing check, in checklist order. Returns None
/// when every check passes.
pub fn next_action(checks: &DistributionChecks) -> Option<&'static str> {
    if !checks.wallet_connected {
        return Some("Connect a wallet to continue.");
    }
    if !checks.token_selected {
        return Some("Select a token to distribute.");
    }
    if !checks.token_supported {
        return Some("Pick a classic SPL token; other token programs are not supported.");
    }
    if !checks.recipients_ready {
        return Some("Add at least one recipient (generate wallets or import a CSV).");
    }
    if !checks.amount_valid {
        return Some("Enter a valid distribution amount.");
    }
    if !checks.balance_sufficient {
        return Some("Reduce the amount or top up the token balance.");
    }
    if !checks.fee_headroom_sufficient {
        return Some("Fund the payer wallet with SOL for fees and rent.");
    }
    if !checks.mainnet_acknowledged {
        return Some("Acknowledge the mainnet fee and irreversibility checklist.");
    }
    if !checks.preflight_passed {
        return Some("Run the preflight simulation.");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_true() -> DistributionChecks {
        DistributionChecks {
            wallet_connected: true,
            token_selected: true,
            token_supported: true,
            recipients_ready: true,
            amount_valid: true,
            balance_sufficient: true,
            fee_headroom_sufficient: true,
            mainnet_acknowledged: true,
            preflight_passed: true,
        }
    }

    #[test]
    fn derives_static_and_start_gating_flags() {
        let gate = derive_gate_model(&all_true(), PreflightStatus::Passed);

        assert!(gate.all_static_checks_pass);
        assert!(gate.can_run_preflight);
        assert!(gate.can_start_distribution);
        assert!(!gate.preflight_running);
    }

    #[test]
    fn start_is_blocked_without_a_passed_preflight() {
        let mut checks = all_true();
        checks.preflight_passed = false;

        let gate = derive_gate_model(&checks, PreflightStatus::Idle);

        assert!(gate.all_static_checks_pass);
        assert!(gate.can_run_preflight);
        assert!(!gate.can_start_distribution);
    }

    #[test]
    fn start_is_blocked_when_any_static_check_fails_even_after_preflight() {
        // A passed preflight must not outlive a static check regression.
        let failing: [fn(&mut DistributionChecks); 8] = [
            |c: &mut DistributionChecks| c.wallet_connected = false,
            |c: &mut DistributionChecks| c.token_selected = false,
            |c: &mut DistributionChecks| c.token_supported = false,
            |c: &mut DistributionChecks| c.recipients_ready = false,
            |c: &mut DistributionChecks| c.amount_valid = false,
            |c: &mut DistributionChecks| c.balance_sufficient = false,
            |c: &mut DistributionChecks| c.fee_headroom_sufficient = false,
            |c: &mut DistributionChecks| c.mainnet_acknowledged = false,
        ];

        for flip in failing {
            let mut checks = all_true();
            flip(&mut checks);

            let gate = derive_gate_model(&checks, PreflightStatus::Passed);

            assert!(!gate.all_static_checks_pass);
            assert!(!gate.can_run_preflight);
            assert!(!gate.can_start_distribution);
        }
    }

    #[test]
    fn nothing_is_runnable_while_preflight_is_in_flight() {
        let gate = derive_gate_model(&all_true(), PreflightStatus::Running);

        assert!(gate.preflight_running);
        assert!(!gate.can_run_preflight);
        assert!(!gate.can_start_distribution);
    }

    #[test]
    fn guidance_names_the_first_failing_check() {
        let mut checks = DistributionChecks::default();
        assert_eq!(next_action(&checks), Some("Connect a wallet to continue."));

        checks.wallet_connected = true;
        assert_eq!(next_action(&checks), Some("Select a token to distribute."));

        checks = all_true();
        checks.fee_headroom_sufficient = false;
        assert_eq!(
            next_action(&checks),
            Some("Fund the payer wallet with SOL for fees and rent.")
        );

        checks.fee_headroom_sufficient = true;
        assert_eq!(next_action(&checks), None);
    }
}
