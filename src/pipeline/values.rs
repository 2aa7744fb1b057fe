//! Cell normalization for sensor payloads.
//!
//! Value cells split into a (numeric, text-fallback) pair with at most one
//! side populated; status cells normalize to an optional bounded string.
//! Unparseable value cells are kept as text rather than discarded, since
//! exports routinely carry sentinel strings in value columns.

/// Column width of `measurements.value_text`.
const MAX_TEXT_CHARS: usize = 255;

/// Column width of `measurements.status`.
const MAX_STATUS_CHARS: usize = 50;

// ---

/// Split a raw value cell into `(numeric, text-fallback)`.
///
/// The cell is trimmed first. Empty cells and the case-insensitive `nan`
/// literal are absent on both sides, as is anything that parses to a float
/// NaN. A parseable float comes back numeric; everything else comes back
/// as text truncated to the storage width.
pub fn normalize_value(raw: &str) -> (Option<f64>, Option<String>) {
    // ---
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return (None, None);
    }

    match s.parse::<f64>() {
        Ok(v) if v.is_nan() => (None, None),
        Ok(v) => (Some(v), None),
        Err(_) => (None, Some(truncate_chars(s, MAX_TEXT_CHARS))),
    }
}

/// Normalize a status cell: trimmed-empty and `nan` become absent,
/// anything else is kept truncated to the storage width.
pub fn normalize_status(raw: &str) -> Option<String> {
    // ---
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return None;
    }
    Some(truncate_chars(s, MAX_STATUS_CHARS))
}

/// Truncate to at most `max` characters, never splitting a char boundary.
fn truncate_chars(s: &str, max: usize) -> String {
    // ---
    s.chars().take(max).collect()
}
