use std::collections::HashMap;

use anyhow::{bail, Result};
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use spl_token::state::{Account as TokenAccount, Mint};

use crate::ata::ATA_LOOKUP_CHUNK_SIZE;
use crate::engine::TokenAsset;
use crate::rpc::{new_rpc_client, Cluster};

/// Loads the payer's classic SPL token holdings, aggregated per mint.
///
/// Providers are tried in priority order: the primary endpoint first, then
/// the cluster's public fallbacks. A permission-denied response moves on to
/// the next provider; any other failure from the primary stops immediately.
pub async fn fetch_token_inventory(
    cluster: Cluster,
    primary_url: &str,
    owner: &Pubkey,
) -> Result<Vec<TokenAsset>> {
    match load_owner_token_assets(&new_rpc_client(primary_url), owner).await {
        Ok(assets) => return Ok(assets),
        Err(error) if is_rpc_access_forbidden(&error) => {}
        Err(error) => return Err(error),
    }

    for endpoint in fallback_endpoints(cluster, primary_url) {
        match load_owner_token_assets(&new_rpc_client(endpoint), owner).await {
            Ok(assets) => return Ok(assets),
            Err(_) => continue,
        }
    }

    bail!(
        "RPC endpoint denied token-balance lookup (403 Access Forbidden). \
         Try again later or switch RPC endpoint."
    );
}

async fn load_owner_token_assets(client: &RpcClient, owner: &Pubkey) -> Result<Vec<TokenAsset>> {
    let config = RpcProgramAccountsConfig {
        filters: Some(vec![
            RpcFilterType::DataSize(TokenAccount::LEN as u64),
            RpcFilterType::Memcmp(Memcmp::new_base58_encoded(32, owner.as_ref())),
        ]),
        account_config: RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            ..Default::default()
        },
        ..Default::default()
    };
    let accounts = client
        .get_program_accounts_with_config(&spl_token::id(), config)
        .await?;

    // Aggregate balances per mint, keeping first-seen order.
    let mut mint_order: Vec<Pubkey> = Vec::new();
    let mut balance_by_mint: HashMap<Pubkey, u64> = HashMap::new();
    for (_address, account) in &accounts {
        let Ok(token_account) = TokenAccount::unpack(&account.data) else {
            continue;
        };
        let entry = balance_by_mint.entry(token_account.mint).or_insert_with(|| {
            mint_order.push(token_account.mint);
            0
        });
        *entry = entry.saturating_add(token_account.amount);
    }

    let mut decimals_by_mint: HashMap<Pubkey, u8> = HashMap::new();
    for chunk in mint_order.chunks(ATA_LOOKUP_CHUNK_SIZE) {
        let mint_accounts = client.get_multiple_accounts(chunk).await?;
        for (mint, account) in chunk.iter().zip(mint_accounts) {
            if let Some(account) = account {
                if let Ok(parsed) = Mint::unpack(&account.data) {
                    decimals_by_mint.insert(*mint, parsed.decimals);
                }
            }
        }
    }

    let assets = mint_order
        .into_iter()
        .filter_map(|mint| {
            let decimals = decimals_by_mint.get(&mint)?;
            Some(TokenAsset {
                mint,
                token_program: spl_token::id(),
                decimals: *decimals,
                balance_raw: balance_by_mint.get(&mint).copied().unwrap_or(0),
                is_classic_spl: true,
            })
        })
        .collect();

    Ok(assets)
}

fn fallback_endpoints(cluster: Cluster, primary_url: &str) -> Vec<&'static str> {
    cluster
        .fallback_endpoints()
        .iter()
        .copied()
        .filter(|endpoint| normalize_endpoint(endpoint) != normalize_endpoint(primary_url))
        .collect()
}

/// "Permission denied, try the next provider" vs "real failure, stop".
fn is_rpc_access_forbidden(error: &anyhow::Error) -> bool {
    let message = format!("{error:#}").to_lowercase();
    message.contains("403") && message.contains("forbidden")
}

fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_lowercase()
}
