//! Display formatting for order values (Brazilian Portuguese conventions).

use chrono::{DateTime, FixedOffset, Utc};

/// Convert a decimal amount to integer cents, rounding half away from zero.
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Format cents as Brazilian reais: `R$ 1.234,56`, negatives as `-R$ 1,00`.
pub fn format_currency(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}R$ {},{:02}", sign, group_thousands(abs / 100), abs % 100)
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

/// Format a quantity with a decimal comma and no trailing zeros: `2`, `1,5`.
pub fn format_quantity(quantity: f64) -> String {
    let fixed = format!("{:.3}", quantity);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" => "0".to_string(),
        other => other.replace('.', ","),
    }
}

/// Format epoch milliseconds as `dd/mm/yyyy` in UTC.
pub fn format_date(millis: i64) -> Option<String> {
    format_date_with_offset(millis, 0)
}

/// Format epoch milliseconds as `dd/mm/yyyy` at a fixed offset from UTC.
pub fn format_date_with_offset(millis: i64, utc_offset_minutes: i32) -> Option<String> {
    let offset = FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?;
    let instant = DateTime::<Utc>::from_timestamp_millis(millis)?;
    Some(instant.with_timezone(&offset).format("%d/%m/%Y").to_string())
}
