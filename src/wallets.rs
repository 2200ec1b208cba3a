use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;

pub const MAX_GENERATED_WALLETS: usize = 100;

/// A freshly generated keypair held in memory. The secret never touches disk
/// unless the caller explicitly exports it.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedWallet {
    pub index: usize,
    pub public_address: String,
    pub private_key_base58: String,
}

pub fn generate_wallets(count: usize) -> Result<Vec<GeneratedWallet>> {
    if count < 1 || count > MAX_GENERATED_WALLETS {
        bail!("Please enter a number between 1 and {MAX_GENERATED_WALLETS}.");
    }

    let wallets = (0..count)
        .map(|offset| {
            let keypair = Keypair::new();
            GeneratedWallet {
                index: offset + 1,
                public_address: keypair.pubkey().to_string(),
                private_key_base58: keypair.to_base58_string(),
            }
        })
        .collect();

    Ok(wallets)
}

pub fn write_wallets_csv(path: &Path, wallets: &[GeneratedWallet]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["index", "address", "private_key"])?;
    for wallet in wallets {
        writer.write_record([
            wallet.index.to_string(),
            wallet.public_address.clone(),
            wallet.private_key_base58.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn wallets_to_json(wallets: &[GeneratedWallet]) -> Result<String> {
    serde_json::to_string_pretty(wallets).context("Failed to serialize wallets to JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::str::FromStr;

    use solana_sdk::pubkey::Pubkey;
    use tempfile::TempDir;

    #[test]
    fn generates_the_requested_number_of_distinct_wallets() {
        let wallets = generate_wallets(5).unwrap();

        assert_eq!(wallets.len(), 5);
        assert_eq!(wallets[0].index, 1);
        assert_eq!(wallets[4].index, 5);

        let mut addresses: Vec<&str> =
            wallets.iter().map(|w| w.public_address.as_str()).collect();
        addresses.sort_unstable();
        addresses.dedup();
        assert_eq!(addresses.len(), 5);

        for wallet in &wallets {
            assert!(Pubkey::from_str(&wallet.public_address).is_ok());
            assert!(!wallet.private_key_base58.is_empty());
        }
    }

    #[test]
    fn rejects_out_of_range_counts() {
        assert!(generate_wallets(0).is_err());
        assert!(generate_wallets(101).is_err());
    }

    #[test]
    fn exported_secret_restores_the_same_address() {
        let wallets = generate_wallets(1).unwrap();
        let restored = Keypair::from_base58_string(&wallets[0].private_key_base58);

        assert_eq!(restored.pubkey().to_string(), wallets[0].public_address);
    }

    #[test]
    fn writes_csv_with_header_and_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wallets.csv");
        let wallets = generate_wallets(3).unwrap();

        write_wallets_csv(&path, &wallets).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("index,address,private_key"));
        assert_eq!(lines.count(), 3);
        assert!(contents.contains(&wallets[0].public_address));
    }

    #[test]
    fn json_export_carries_every_wallet() {
        let wallets = generate_wallets(2).unwrap();
        let json = wallets_to_json(&wallets).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(
            parsed[0]["public_address"],
            wallets[0].public_address.as_str()
        );
    }
}
