//! Human-readable units

const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

fn trim_decimals(value: String) -> String {
    if value.contains('.') {
        value.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        value
    }
}

/// Format a byte count with decimal units, e.g. `1.5 kB`
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{} {}", trim_decimals(format!("{:.2}", value)), UNITS[unit])
}

/// Format a byte delta with an explicit sign, e.g. `+12 kB`, `-400 B`
pub fn format_signed_bytes(delta: i64) -> String {
    let sign = if delta < 0 { "-" } else { "+" };
    format!("{}{}", sign, format_bytes(delta.unsigned_abs()))
}

/// Format a duration given in milliseconds
pub fn format_duration_ms(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{} ms", trim_decimals(format!("{:.2}", ms)))
    } else if ms < 60_000.0 {
        format!("{:.2} s", ms / 1000.0)
    } else {
        let minutes = (ms / 60_000.0).floor();
        format!("{}m {:.1}s", minutes, (ms - minutes * 60_000.0) / 1000.0)
    }
}
