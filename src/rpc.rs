use std::str::FromStr;

use anyhow::{bail, Result};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSimulateTransactionConfig;
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cluster {
    Devnet,
    Testnet,
    MainnetBeta,
}

impl Cluster {
    pub fn api_url(&self) -> &'static str {
        match self {
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Cluster::Devnet => "devnet",
            Cluster::Testnet => "testnet",
            Cluster::MainnetBeta => "mainnet-beta",
        }
    }

    /// Public endpoints tried in order when the primary denies token-balance
    /// lookups (HTTP 403).
    pub fn fallback_endpoints(&self) -> &'static [&'static str] {
        match self {
            Cluster::Devnet => &["https://api.devnet.solana.com"],
            Cluster::Testnet => &["https://api.testnet.solana.com"],
            Cluster::MainnetBeta => &[
                "https://api.mainnet-beta.solana.com",
                "https://solana-rpc.publicnode.com",
                "https://rpc.ankr.com/solana",
            ],
        }
    }
}

impl FromStr for Cluster {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "mainnet-beta" => Ok(Cluster::MainnetBeta),
            other => bail!("Unsupported Solana cluster: {other}"),
        }
    }
}

impl std::fmt::Display for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub logs: Vec<String>,
}

/// The network surface the planning engine consumes. Implemented for the
/// nonblocking `RpcClient`; tests script a mock. Making this a trait turns
/// the original runtime capability probes into compile-time guarantees.
#[allow(async_fn_in_trait)]
pub trait PlannerRpc {
    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>>;
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64>;
    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64>;
    /// `Ok(None)` means the endpoint cannot price the message; callers fall
    /// back to a fixed default fee.
    async fn get_fee_for_message(&self, message: &Message) -> Result<Option<u64>>;
    async fn get_latest_blockhash(&self) -> Result<Hash>;
    async fn simulate_transaction(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome>;
}

impl PlannerRpc for RpcClient {
    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        Ok(RpcClient::get_multiple_accounts(self, pubkeys).await?)
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        Ok(RpcClient::get_balance(self, pubkey).await?)
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64> {
        Ok(RpcClient::get_minimum_balance_for_rent_exemption(self, data_len).await?)
    }

    async fn get_fee_for_message(&self, message: &Message) -> Result<Option<u64>> {
        // Endpoints that cannot price a message respond with an error; that is
        // "unsupported", not a failure of the planning pass.
        match RpcClient::get_fee_for_message(self, message).await {
            Ok(fee) => Ok(Some(fee)),
            Err(_) => Ok(None),
        }
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        Ok(RpcClient::get_latest_blockhash(self).await?)
    }

    async fn simulate_transaction(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(CommitmentConfig::confirmed()),
            ..Default::default()
        };
        let response = self.simulate_transaction_with_config(tx, config).await?;
        Ok(SimulationOutcome {
            err: response.value.err.map(|e| e.to_string()),
            logs: response.value.logs.unwrap_or_default(),
        })
    }
}

pub fn new_rpc_client(url: &str) -> RpcClient {
    RpcClient::new_with_commitment(url.to_string(), CommitmentConfig::confirmed())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use solana_sdk::account::Account;
    use tokio::sync::Semaphore;

    use super::*;

    /// Scriptable in-memory stand-in for the RPC surface. `gate` suspends
    /// `get_multiple_accounts` until a permit is added, which lets tests hold
    /// a recompute in flight while a newer one completes.
    #[derive(Default)]
    pub(crate) struct MockRpc {
        pub existing_accounts: HashSet<Pubkey>,
        pub balances: HashMap<Pubkey, u64>,
        pub rent_exempt_lamports: u64,
        pub fee_per_message: Option<u64>,
        pub sim_failures: HashMap<Pubkey, String>,
        pub sim_logs: Vec<String>,
        pub blockhash_unavailable: bool,
        pub gate: Option<Arc<Semaphore>>,
    }

    impl MockRpc {
        pub(crate) fn token_account() -> Account {
            Account {
                lamports: 2_039_280,
                data: vec![0; 165],
                owner: spl_token::id(),
                executable: false,
                rent_epoch: 0,
            }
        }
    }

    impl PlannerRpc for MockRpc {
        async fn get_multiple_accounts(
            &self,
            pubkeys: &[Pubkey],
        ) -> Result<Vec<Option<Account>>> {
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            Ok(pubkeys
                .iter()
                .map(|key| {
                    self.existing_accounts
                        .contains(key)
                        .then(Self::token_account)
                })
                .collect())
        }

        async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
            Ok(self.balances.get(pubkey).copied().unwrap_or(0))
        }

        async fn get_minimum_balance_for_rent_exemption(&self, _data_len: usize) -> Result<u64> {
            Ok(self.rent_exempt_lamports)
        }

        async fn get_fee_for_message(&self, _message: &Message) -> Result<Option<u64>> {
            Ok(self.fee_per_message)
        }

        async fn get_latest_blockhash(&self) -> Result<Hash> {
            if self.blockhash_unavailable {
                bail!("Failed to fetch a recent blockhash.");
            }
            Ok(Hash::new_unique())
        }

        async fn simulate_transaction(
            &self,
            tx: &VersionedTransaction,
        ) -> Result<SimulationOutcome> {
            for key in tx.message.static_account_keys() {
                if let Some(error) = self.sim_failures.get(key) {
                    return Ok(SimulationOutcome {
                        err: Some(error.clone()),
                        logs: self.sim_logs.clone(),
                    });
                }
            }
            Ok(SimulationOutcome {
                err: None,
                logs: self.sim_logs.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cluster_names() {
        assert_eq!(Cluster::from_str("devnet").unwrap(), Cluster::Devnet);
        assert_eq!(
            Cluster::from_str("mainnet-beta").unwrap(),
            Cluster::MainnetBeta
        );
        assert!(Cluster::from_str("localnet").is_err());
    }

    #[test]
    fn mainnet_carries_multiple_fallback_endpoints() {
        assert!(Cluster::MainnetBeta.fallback_endpoints().len() > 1);
        assert_eq!(Cluster::Devnet.fallback_endpoints().len(), 1);
    }
}
