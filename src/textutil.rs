//! Character-safe clipping for command output sent back to the assistant.

/// Marker placed between the kept head and tail of a clipped output.
pub const TRUNCATION_MARKER: &str = "...truncated...";

/// Keep the first `head` and last `tail` characters, joined by
/// [`TRUNCATION_MARKER`] on its own line. Text that fits is returned as is.
pub fn truncate_head_tail(text: &str, head: usize, tail: usize) -> String {
    let total = text.chars().count();
    if total <= head.saturating_add(tail) {
        return text.to_string();
    }
    let first: String = text.chars().take(head).collect();
    let last: String = text.chars().skip(total - tail).collect();
    format!("{first}\n{TRUNCATION_MARKER}\n{last}")
}
