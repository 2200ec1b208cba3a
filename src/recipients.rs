use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;

use crate::wallets::GeneratedWallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientSource {
    Generated,
    Imported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientAddress {
    pub id: String,
    pub public_address: String,
    pub source: RecipientSource,
}

/// The deduplicated, merged recipient list actually used for planning.
/// Generated entries come first, then imported, both in original order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRecipientSet {
    pub recipients: Vec<RecipientAddress>,
    pub generated_count: usize,
    pub imported_count: usize,
    pub duplicates_skipped: usize,
}

/// First occurrence of an address wins; later occurrences from either source
/// are counted and dropped. Empty addresses are skipped without counting.
pub fn build_run_recipient_set(
    generated: &[GeneratedWallet],
    imported: &[RecipientAddress],
) -> RunRecipientSet {
    let mut seen = HashSet::new();
    let mut recipients = Vec::with_capacity(generated.len() + imported.len());
    let mut duplicates_skipped = 0;

    for wallet in generated {
        let address = wallet.public_address.trim();
        if address.is_empty() {
            continue;
        }
        if !seen.insert(address.to_string()) {
            duplicates_skipped += 1;
            continue;
        }
        recipients.push(RecipientAddress {
            id: format!("generated-{}", wallet.index),
            public_address: address.to_string(),
            source: RecipientSource::Generated,
        });
    }

    for recipient in imported {
        let address = recipient.public_address.trim();
        if address.is_empty() {
            continue;
        }
        if !seen.insert(address.to_string()) {
            duplicates_skipped += 1;
            continue;
        }
        recipients.push(RecipientAddress {
            id: recipient.id.clone(),
            public_address: address.to_string(),
            source: RecipientSource::Imported,
        });
    }

    RunRecipientSet {
        recipients,
        generated_count: generated.len(),
        imported_count: imported.len(),
        duplicates_skipped,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRow {
    pub line: usize,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportedRecipients {
    pub recipients: Vec<RecipientAddress>,
    pub invalid_rows: Vec<InvalidRow>,
    pub duplicate_count: usize,
    pub total_rows: usize,
}

const ADDRESS_HEADERS: [&str; 5] = ["address", "publicaddress", "publickey", "wallet", "recipient"];

pub fn load_imported_recipients(path: &Path) -> Result<ImportedRecipients> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read recipients CSV from {}", path.display()))?;
    parse_imported_recipients(&raw)
}

/// The address column is matched by header name when one is present;
/// otherwise the first column of a headerless file is used. Invalid and
/// duplicate rows are reported, not fatal.
pub fn parse_imported_recipients(raw_csv: &str) -> Result<ImportedRecipients> {
    let input = raw_csv.trim();
    if input.is_empty() {
        return Ok(ImportedRecipients::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record.context("Failed to parse recipients CSV")?);
    }
    if records.is_empty() {
        return Ok(ImportedRecipients::default());
    }

    let header_column = records[0]
        .iter()
        .position(|cell| ADDRESS_HEADERS.contains(&normalize_header(cell).as_str()));
    let (target_column, start_index) = match header_column {
        Some(column) => (column, 1),
        None => (0, 0),
    };

    let mut result = ImportedRecipients::default();
    let mut dedupe = HashSet::new();

    for (index, record) in records.iter().enumerate().skip(start_index) {
        let line = index + 1;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        result.total_rows += 1;

        let value = record.get(target_column).unwrap_or("").trim().to_string();
        if value.is_empty() {
            result.invalid_rows.push(InvalidRow {
                line,
                value,
                reason: "Missing recipient address.".to_string(),
            });
            continue;
        }
        if !is_valid_recipient_address(&value) {
            result.invalid_rows.push(InvalidRow {
                line,
                value,
                reason: "Invalid Solana address.".to_string(),
            });
            continue;
        }
        if !dedupe.insert(value.clone()) {
            result.duplicate_count += 1;
            continue;
        }

        result.recipients.push(RecipientAddress {
            id: format!("imported-{}", result.recipients.len() + 1),
            public_address: value,
            source: RecipientSource::Imported,
        });
    }

    Ok(result)
}

pub fn is_valid_recipient_address(raw_address: &str) -> bool {
    let address = raw_address.trim();
    if address.is_empty() {
        return false;
    }
    match Pubkey::from_str(address) {
        Ok(parsed) => parsed.to_string() == address,
        Err(_) => false,
    }
}

fn normalize_header(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .collect()
}
