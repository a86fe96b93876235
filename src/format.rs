use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const UNITS: &[u8] = b"KMGTPE";

pub fn truncate_unicode(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if width + ch_width > max_width.saturating_sub(1) {
            result.push('\u{2026}');
            break;
        }
        result.push(ch);
        width += ch_width;
    }
    result
}

/// Byte count with a binary suffix and no decimals: `512`, `3K`, `1M`.
/// Values below 1024, sentinels included, are printed as is.
pub fn human_bytes(bytes: i64) -> String {
    const UNIT: i64 = 1024;
    if bytes < UNIT {
        return bytes.to_string();
    }
    let mut exp = 0;
    let mut scale = 1i64;
    while exp < UNITS.len() && bytes / scale >= UNIT {
        scale *= UNIT;
        exp += 1;
    }
    // half-up, not the half-even of `{:.0}`
    let value = (bytes as f64 / scale as f64).round();
    format!("{value:.0}{}", char::from(UNITS[exp - 1]))
}

/// Replaces control characters so an untrusted command line cannot move the
/// cursor or break the table.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}
