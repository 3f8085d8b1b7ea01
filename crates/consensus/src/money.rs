//! Monetary units, range rules, and money-string parsing.

pub type Amount = i64;

pub const COIN: Amount = 100_000_000;
pub const CENT: Amount = 1_000_000;

/// No amount larger than this (in satoshi) is valid.
pub const MAX_MONEY: Amount = 2_000_000_000 * COIN;

pub fn money_range(value: Amount) -> bool {
    (0..=MAX_MONEY).contains(&value)
}

/// Parse a decimal money string ("0.01", "12", "0.00000001") into satoshis.
///
/// This is the `-blockmintxfee` parser; it rejects anything that is not a
/// plain decimal number inside the money range.
pub fn parse_money(input: &str) -> Option<Amount> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let (whole, frac) = match input.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (input, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 8 {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };

    let mut frac_value: Amount = 0;
    let mut scale = COIN / 10;
    for c in frac.chars() {
        let digit = Amount::from(c.to_digit(10)? as u8);
        frac_value = frac_value.checked_add(digit.checked_mul(scale)?)?;
        scale /= 10;
    }

    let total = whole.checked_mul(COIN)?.checked_add(frac_value)?;
    if !money_range(total) {
        return None;
    }
    Some(total)
}
