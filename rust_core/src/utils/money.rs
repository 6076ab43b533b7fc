//! Price precision and price-text parsing utilities.
//!
//! Canonical prices carry two decimals. Rounding goes through integer cents so
//! that equal inputs always land on the same f64 and tie-breaks between
//! sources stay reproducible.
//!
//! # Usage
//!
//! ```rust
//! use goldbar_rust_core::utils::money::{parse_price_text, round_to_cents};
//!
//! assert_eq!(parse_price_text("28,40 TL"), Some(28.4));
//! assert_eq!(round_to_cents(2.8449), 2.84);
//! ```

/// Convert a price to integer cents (rounds to nearest)
#[inline]
pub fn to_cents(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

/// Convert cents back to a price
#[inline]
pub fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Round a price to the nearest cent
#[inline]
pub fn round_to_cents(price: f64) -> f64 {
    from_cents(to_cents(price))
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Parse a price as marketplaces print it.
///
/// Currency symbols and words are ignored, but the text must hold exactly one
/// number: a range ("28,40 - 30,00"), a unit ("10M 28,40") or a stock count
/// next to the price makes it ambiguous and yields `None`.
///
/// Separator rules:
/// - both `.` and `,` present: the last one is the decimal separator
/// - a single `,` or a single `.`: decimal separator
/// - the same separator repeated: thousands grouping
///
/// Returns `None` when no single finite number can be read.
pub fn parse_price_text(text: &str) -> Option<f64> {
    let runs = numeric_runs(text);
    let [(negative, body)] = runs.as_slice() else {
        return None;
    };

    let last_dot = body.rfind('.');
    let last_comma = body.rfind(',');
    let dots = body.matches('.').count();
    let commas = body.matches(',').count();

    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(_), None) if dots == 1 => Some('.'),
        (None, Some(_)) if commas == 1 => Some(','),
        _ => None,
    };

    let mut normalized = String::with_capacity(body.len() + 1);
    if *negative {
        normalized.push('-');
    }
    for c in body.chars() {
        match c {
            '.' | ',' if Some(c) == decimal_sep => normalized.push('.'),
            '.' | ',' => {}
            digit => normalized.push(digit),
        }
    }

    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Maximal runs of digits and separators holding at least one digit, each
/// with whether a `-` sits directly in front of it. Separators at either end
/// of a run are punctuation, not part of the number.
fn numeric_runs(text: &str) -> Vec<(bool, &str)> {
    let is_part = |c: char| c.is_ascii_digit() || c == '.' || c == ',';
    let is_sep = |c: char| c == '.' || c == ',';

    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        match (start, is_part(c)) {
            (None, true) => start = Some(i),
            (Some(s), false) => {
                let raw = &text[s..i];
                let leading = raw.len() - raw.trim_start_matches(is_sep).len();
                let run = raw.trim_matches(is_sep);
                if run.chars().any(|c| c.is_ascii_digit()) {
                    let negative = leading == 0 && text[..s].ends_with('-');
                    runs.push((negative, run));
                }
                start = None;
            }
            _ => {}
        }
    }
    runs
}
