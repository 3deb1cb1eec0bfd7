//! Human-readable rendering of entry size and timestamp.

use chrono::{Local, TimeZone};

use crate::Entry;

const SUFFIXES: [&str; 4] = ["B", "KB", "MB", "GB"];

impl Entry {
    /// Size rounded to three significant digits, e.g. `"43.5 KB"`.
    pub fn format_size(&self) -> String {
        format_size(self.size)
    }

    /// Creation time in local time, e.g. `"01-Mar-22 16:43"`.
    pub fn format_time(&self) -> String {
        format_time(self.ts)
    }
}

/// Format a byte count with three significant digits and a decimal
/// B/KB/MB/GB suffix. Sizes of a terabyte and up stay in GB.
pub fn format_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }
    let (mantissa, exponent) = to_mantissa_and_exponent(size);
    let (mut mantissa, mut exponent) = round_to_three_significant_digits(mantissa, exponent);

    // Shift until the exponent is 0, 3, 6 or 9; each shift spends one
    // decimal place.
    let mut precision = exponent.min(2);
    while exponent > 9 || exponent % 3 > 0 {
        mantissa *= 10.0;
        exponent -= 1;
        precision = precision.saturating_sub(1);
    }

    format!(
        "{:.*} {}",
        precision as usize,
        mantissa,
        SUFFIXES[(exponent / 3) as usize]
    )
}

/// Format seconds since the epoch as local `dd-Mon-yy HH:MM`.
pub fn format_time(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(time) => time.format("%d-%b-%y %H:%M").to_string(),
        None => "--".to_string(),
    }
}

/// Split a positive integer into a mantissa in `[1, 10)` and a base-10
/// exponent.
fn to_mantissa_and_exponent(mut size: u64) -> (f64, u32) {
    let mut exponent = 0u32;
    let mut mantissa = 0.0;
    loop {
        mantissa /= 10.0;
        mantissa += (size % 10) as f64;
        size /= 10;
        if size == 0 {
            return (mantissa, exponent);
        }
        exponent += 1;
    }
}

fn round_to_three_significant_digits(mantissa: f64, exponent: u32) -> (f64, u32) {
    let mantissa = (mantissa * 100.0 + 0.5).floor() / 100.0;
    // Rounding can carry past 10, e.g. 9.995 -> 10.00
    if mantissa >= 10.0 {
        (mantissa / 10.0, exponent + 1)
    } else {
        (mantissa, exponent)
    }
}
