use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use solana_sdk::hash::hashv;
use solana_sdk::pubkey::Pubkey;

use crate::rpc::PlannerRpc;

/// RPC limit for get_multiple_accounts.
pub const ATA_LOOKUP_CHUNK_SIZE: usize = 100;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";
const MAX_SEED_LENGTH: usize = 32;

/// One recipient's derived token account and whether it must be created
/// before a transfer can land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtaInspectionEntry {
    pub recipient: Pubkey,
    pub recipient_ata: Pubkey,
    pub needs_ata: bool,
}

/// Always recomputed in full; never patched incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtaInspection {
    pub mint: Pubkey,
    pub token_program: Pubkey,
    pub decimals: u8,
    pub entries: Vec<AtaInspectionEntry>,
    pub missing_ata_count: usize,
    pub existing_ata_count: usize,
}

/// sha256(seeds ‖ program_id ‖ "ProgramDerivedAddress"), rejected when the
/// digest decodes as an ed25519 curve point.
pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<Pubkey> {
    for seed in seeds {
        if seed.len() > MAX_SEED_LENGTH {
            bail!("Max seed length exceeded.");
        }
    }

    let mut preimage: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 2);
    preimage.extend_from_slice(seeds);
    preimage.push(program_id.as_ref());
    preimage.push(PDA_MARKER);

    let candidate = Pubkey::new_from_array(hashv(&preimage).to_bytes());
    if candidate.is_on_curve() {
        bail!("Invalid seeds, address must fall off the curve.");
    }
    Ok(candidate)
}

/// Tries bump 255 down to 1 and returns the first off-curve address.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8)> {
    for bump in (1..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut seeds_with_bump: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 1);
        seeds_with_bump.extend_from_slice(seeds);
        seeds_with_bump.push(&bump_seed);

        if let Ok(address) = create_program_address(&seeds_with_bump, program_id) {
            return Ok((address, bump));
        }
    }
    bail!("Unable to find a viable program address bump.");
}

/// Associated token address for (owner, mint) under the given token program.
pub fn derive_associated_token_address(
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Result<Pubkey> {
    let (address, _bump) = find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &spl_associated_token_account::id(),
    )?;
    Ok(address)
}

/// Derives every recipient's token account and batch-queries existence in
/// chunks. Output covers every input recipient exactly once, in order.
pub async fn inspect_recipient_atas<R: PlannerRpc>(
    rpc: &R,
    mint: Pubkey,
    token_program: Pubkey,
    decimals: u8,
    recipients: &[Pubkey],
) -> Result<AtaInspection> {
    if recipients.is_empty() {
        bail!("No recipients provided for ATA inspection.");
    }

    let mut entries = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let recipient_ata = derive_associated_token_address(recipient, &mint, &token_program)
            .with_context(|| format!("Failed to derive token account for {recipient}"))?;
        entries.push(AtaInspectionEntry {
            recipient: *recipient,
            recipient_ata,
            needs_ata: true,
        });
    }

    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} Checking ATAs")?,
    );

    let atas: Vec<Pubkey> = entries.iter().map(|entry| entry.recipient_ata).collect();
    for (chunk_index, chunk) in atas.chunks(ATA_LOOKUP_CHUNK_SIZE).enumerate() {
        let accounts = rpc.get_multiple_accounts(chunk).await?;

        let base = chunk_index * ATA_LOOKUP_CHUNK_SIZE;
        for (offset, account) in accounts.iter().enumerate() {
            if let Some(entry) = entries.get_mut(base + offset) {
                entry.needs_ata = account.is_none();
            }
        }
        pb.inc(chunk.len() as u64);
    }
    pb.finish_and_clear();

    let missing_ata_count = entries.iter().filter(|entry| entry.needs_ata).count();
    let existing_ata_count = entries.len() - missing_ata_count;

    Ok(AtaInspection {
        mint,
        token_program,
        decimals,
        entries,
        missing_ata_count,
        existing_ata_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::MockRpc;
    use spl_associated_token_account::get_associated_token_address;

    #[test]
    fn derivation_matches_the_reference_helper() {
        for _ in 0..8 {
            let owner = Pubkey::new_unique();
            let mint = Pubkey::new_unique();

            let derived =
                derive_associated_token_address(&owner, &mint, &spl_token::id()).unwrap();

            assert_eq!(derived, get_associated_token_address(&owner, &mint));
        }
    }

    #[test]
    fn found_address_reproduces_under_its_bump_and_is_off_curve() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let token_program = spl_token::id();
        let seeds = [owner.as_ref(), token_program.as_ref(), mint.as_ref()];

        let (address, bump) =
            find_program_address(&seeds, &spl_associated_token_account::id()).unwrap();

        let bump_seed = [bump];
        let reproduced = create_program_address(
            &[
                owner.as_ref(),
                token_program.as_ref(),
                mint.as_ref(),
                &bump_seed,
            ],
            &spl_associated_token_account::id(),
        )
        .unwrap();

        assert_eq!(address, reproduced);
        assert!(!address.is_on_curve());
    }

    #[test]
    fn rejects_oversized_seeds() {
        let long = [0u8; 33];
        let err = create_program_address(&[&long], &spl_token::id()).unwrap_err();

        assert!(err.to_string().contains("Max seed length"));
    }

    #[tokio::test]
    async fn inspection_marks_missing_and_existing_accounts() {
        let mint = Pubkey::new_unique();
        let recipients: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();

        let mut rpc = MockRpc::default();
        let existing_ata =
            derive_associated_token_address(&recipients[1], &mint, &spl_token::id()).unwrap();
        rpc.existing_accounts.insert(existing_ata);

        let inspection = inspect_recipient_atas(&rpc, mint, spl_token::id(), 6, &recipients)
            .await
            .unwrap();

        assert_eq!(inspection.entries.len(), 3);
        assert_eq!(inspection.missing_ata_count, 2);
        assert_eq!(inspection.existing_ata_count, 1);
        assert!(inspection.entries[0].needs_ata);
        assert!(!inspection.entries[1].needs_ata);
        assert!(inspection.entries[2].needs_ata);

        for (entry, recipient) in inspection.entries.iter().zip(&recipients) {
            assert_eq!(entry.recipient, *recipient);
        }
    }

    #[tokio::test]
    async fn inspection_covers_more_recipients_than_one_chunk() {
        let mint = Pubkey::new_unique();
        let recipients: Vec<Pubkey> = (0..(ATA_LOOKUP_CHUNK_SIZE + 7))
            .map(|_| Pubkey::new_unique())
            .collect();

        let rpc = MockRpc::default();
        let inspection = inspect_recipient_atas(&rpc, mint, spl_token::id(), 0, &recipients)
            .await
            .unwrap();

        assert_eq!(inspection.entries.len(), recipients.len());
        assert_eq!(inspection.missing_ata_count, recipients.len());
    }

    #[tokio::test]
    async fn inspection_fails_fast_on_empty_recipient_list() {
        let rpc = MockRpc::default();
        let err = inspect_recipient_atas(&rpc, Pubkey::new_unique(), spl_token::id(), 6, &[])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("No recipients"));
    }
}
