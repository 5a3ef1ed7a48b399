//! Small formatting helpers shared by the reporting layer

use std::time::Duration;

/// Thousands-separated integer, e.g. `1,234,567`.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Short human file size: `999B`, `1.5K`, `23.4M`, `1.02G`.
pub fn format_size(bytes: u64) -> String {
    const STEPS: [(u64, char); 3] = [(1_000, 'K'), (1_000_000, 'M'), (1_000_000_000, 'G')];

    if bytes < 1_000 {
        return format!("{bytes}B");
    }

    for (step, letter) in STEPS {
        let value = bytes as f64 / step as f64;
        if value < 1_000.0 || letter == 'G' {
            return if value < 10.0 {
                format!("{value:.2}{letter}")
            } else if value < 100.0 {
                format!("{value:.1}{letter}")
            } else {
                format!("{}{letter}", format_count(value.round() as u64))
            };
        }
    }

    unreachable!("size steps cover all magnitudes")
}

/// Integer percentage, zero when the denominator is zero.
pub fn percent(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        0
    } else {
        ((numerator as f64 / denominator as f64) * 100.0) as u64
    }
}

pub fn percent_string(numerator: u64, denominator: u64) -> String {
    format!("{}%", percent(numerator, denominator))
}

/// Elapsed-time formatter: sub-second durations get units, longer ones get
/// `m:ss` / `h:mm:ss`.
pub fn pretty_duration(duration: Duration) -> String {
    if duration < Duration::from_millis(1) {
        return format!("{}us", duration.as_micros());
    }
    if duration < Duration::from_secs(1) {
        return format!("{}ms", duration.as_millis());
    }
    if duration < Duration::from_secs(10) {
        return format!("{:.1}s", duration.as_secs_f64());
    }
    if duration < Duration::from_secs(60) {
        return format!("{}s", duration.as_secs());
    }

    let seconds = duration.as_secs();
    let hours = seconds / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let seconds = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
