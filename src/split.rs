use anyhow::{bail, Result};

/// Exact integer equal-split of a decimal UI amount across a recipient set.
///
/// All raw fields are in the token's smallest unit. The remainder stays with
/// the payer; it is never redistributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    pub total_ui_amount: String,
    pub decimals: u8,
    pub recipient_count: usize,
    pub total_raw: u128,
    pub per_recipient_raw: u128,
    pub remainder_raw: u128,
    pub planned_transfer_total_raw: u128,
}

pub fn build_equal_split_plan(
    total_ui_amount: &str,
    decimals: u8,
    recipient_count: usize,
) -> Result<SplitPlan> {
    let decimals = normalize_decimals(decimals)?;
    if recipient_count < 1 {
        bail!("Recipient count must be at least 1.");
    }

    let total_raw = parse_ui_amount_to_raw(total_ui_amount, decimals)?;
    let divisor = recipient_count as u128;
    let per_recipient_raw = total_raw / divisor;

    if per_recipient_raw == 0 {
        bail!("Total amount is too small for the recipient count at the selected token decimals.");
    }

    let remainder_raw = total_raw % divisor;
    let planned_transfer_total_raw = per_recipient_raw * divisor;

    Ok(SplitPlan {
        total_ui_amount: total_ui_amount.trim().to_string(),
        decimals,
        recipient_count,
        total_raw,
        per_recipient_raw,
        remainder_raw,
        planned_transfer_total_raw,
    })
}

/// Exact inverse of the scaling step: trailing fraction zeros are dropped and
/// the integer part is always kept.
pub fn format_raw_with_decimals(amount_raw: u128, decimals: u8) -> String {
    if decimals == 0 {
        return amount_raw.to_string();
    }

    let base = 10u128.pow(u32::from(decimals));
    let whole = amount_raw / base;
    let fraction = amount_raw % base;
    let fraction_text = format!("{:0width$}", fraction, width = usize::from(decimals));
    let fraction_text = fraction_text.trim_end_matches('0');

    if fraction_text.is_empty() {
        return whole.to_string();
    }

    format!("{whole}.{fraction_text}")
}

/// Scales decimal text to the token's smallest unit. Rejected inputs never
/// reach the network.
pub fn parse_ui_amount_to_raw(raw_amount: &str, decimals: u8) -> Result<u128> {
    let decimals = normalize_decimals(decimals)?;
    let value = raw_amount.trim();
    if value.is_empty() {
        bail!("Distribution amount is required.");
    }

    let (whole_text, fraction_text) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (value, ""),
    };
    let well_formed = !whole_text.is_empty()
        && whole_text.bytes().all(|b| b.is_ascii_digit())
        && (value.find('.').is_none()
            || (!fraction_text.is_empty() && fraction_text.bytes().all(|b| b.is_ascii_digit())));
    if !well_formed {
        bail!("Distribution amount must be a positive numeric value.");
    }

    if fraction_text.len() > usize::from(decimals) {
        bail!("Distribution amount exceeds {decimals} decimal place(s).");
    }

    let scale = 10u128.pow(u32::from(decimals));
    let whole: u128 = whole_text
        .parse()
        .map_err(|_| anyhow::anyhow!("Distribution amount is too large."))?;
    let fraction = if fraction_text.is_empty() {
        0u128
    } else {
        let padded = format!("{:0<width$}", fraction_text, width = usize::from(decimals));
        padded
            .parse()
            .map_err(|_| anyhow::anyhow!("Distribution amount is too large."))?
    };
    let total_raw = whole
        .checked_mul(scale)
        .and_then(|scaled| scaled.checked_add(fraction))
        .ok_or_else(|| anyhow::anyhow!("Distribution amount is too large."))?;

    if total_raw == 0 {
        bail!("Distribution amount must be greater than zero.");
    }

    Ok(total_raw)
}

fn normalize_decimals(decimals: u8) -> Result<u8> {
    if decimals > 18 {
        bail!("Token decimals must be an integer between 0 and 18.");
    }
    Ok(decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_ten_tokens_across_three_recipients() {
        let plan = build_equal_split_plan("10", 2, 3).unwrap();

        assert_eq!(plan.total_raw, 1000);
        assert_eq!(plan.per_recipient_raw, 333);
        assert_eq!(plan.remainder_raw, 1);
        assert_eq!(plan.planned_transfer_total_raw, 999);
    }

    #[test]
    fn splits_evenly_with_zero_decimals() {
        let plan = build_equal_split_plan("9", 0, 3).unwrap();

        assert_eq!(plan.per_recipient_raw, 3);
        assert_eq!(plan.remainder_raw, 0);
        assert_eq!(plan.planned_transfer_total_raw, 9);
    }

    #[test]
    fn rejects_amount_too_small_for_recipient_count() {
        let err = build_equal_split_plan("0.000001", 6, 2).unwrap_err();

        assert!(err.to_string().contains("too small for the recipient count"));
    }

    #[test]
    fn split_invariants_hold_for_valid_inputs() {
        for (amount, decimals, count) in [
            ("10", 2u8, 3usize),
            ("1.5", 9, 7),
            ("123456.789", 6, 11),
            ("1000000", 0, 13),
            ("0.000009", 6, 4),
        ] {
            let plan = build_equal_split_plan(amount, decimals, count).unwrap();
            let n = count as u128;

            assert_eq!(
                plan.per_recipient_raw * n + plan.remainder_raw,
                plan.total_raw,
                "{amount}/{decimals}/{count}"
            );
            assert!(plan.remainder_raw < n);
            assert_eq!(
                plan.planned_transfer_total_raw,
                plan.total_raw - plan.remainder_raw
            );
        }
    }

    #[test]
    fn format_round_trips_scaled_amounts() {
        for (text, decimals) in [
            ("10", 2u8),
            ("0.5", 2),
            ("1.25", 6),
            ("123456.789", 9),
            ("7", 0),
        ] {
            let raw = parse_ui_amount_to_raw(text, decimals).unwrap();
            assert_eq!(format_raw_with_decimals(raw, decimals), text);
        }
    }

    #[test]
    fn format_drops_trailing_fraction_zeros() {
        assert_eq!(format_raw_with_decimals(1_500_000_000, 9), "1.5");
        assert_eq!(format_raw_with_decimals(1_000_000_000, 9), "1");
        assert_eq!(format_raw_with_decimals(0, 6), "0");
        assert_eq!(format_raw_with_decimals(1, 6), "0.000001");
    }

    #[test]
    fn rejects_malformed_amount_text() {
        for bad in ["", "  ", "abc", "-1", "1.", ".5", "1.2.3", "1,5", "+3"] {
            assert!(parse_ui_amount_to_raw(bad, 6).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn rejects_fraction_longer_than_decimals() {
        let err = parse_ui_amount_to_raw("1.234", 2).unwrap_err();
        assert!(err.to_string().contains("2 decimal place(s)"));

        let err = parse_ui_amount_to_raw("1.5", 0).unwrap_err();
        assert!(err.to_string().contains("0 decimal place(s)"));
    }

    #[test]
    fn rejects_zero_amount_and_bad_bounds() {
        assert!(parse_ui_amount_to_raw("0", 6).is_err());
        assert!(parse_ui_amount_to_raw("0.0", 6).is_err());
        assert!(build_equal_split_plan("1", 19, 1).is_err());
        assert!(build_equal_split_plan("1", 6, 0).is_err());
    }

    #[test]
    fn rejects_overflowing_amounts_instead_of_wrapping() {
        let huge = "340282366920938463463374607431768211456";
        assert!(parse_ui_amount_to_raw(huge, 0).is_err());
        assert!(parse_ui_amount_to_raw("340282366920938463464", 18).is_err());
    }
}
