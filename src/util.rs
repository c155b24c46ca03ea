const MAX_LOGGED_PAYLOAD: usize = 120;

// Quote prices: cents above 1, more digits for sub-unit quotes
pub fn format_price(value: Option<f64>) -> String {
    match value {
        None => "-".to_string(),
        Some(v) if v.abs() >= 1.0 => format!("{:.2}", v),
        Some(v) => format!("{:.4}", v),
    }
}

pub fn format_count(count: u64) -> String {
    const K: u64 = 1000;
    const M: u64 = 1000 * K;
    if count >= M {
        format!("{:.1}M", count as f64 / M as f64)
    } else if count >= K {
        format!("{:.1}K", count as f64 / K as f64)
    } else {
        count.to_string()
    }
}

/// `HH:MM:SS` part of a `YYYY-MM-DD HH:MM:SS` label; other labels pass through.
pub fn clock_label(label: &str) -> &str {
    match label.split_once(' ') {
        Some((_, clock)) if !clock.is_empty() => clock,
        _ => label,
    }
}

pub fn truncate_payload(payload: &str) -> String {
    match payload.char_indices().nth(MAX_LOGGED_PAYLOAD) {
        Some((cut, _)) => format!("{}...", &payload[..cut]),
        None => payload.to_string(),
    }
}
