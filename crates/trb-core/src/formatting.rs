//! Formatting utilities (Telegram HTML escaping, byte sizes).

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Wrap text in `<code>` with escaping.
pub fn code(text: &str) -> String {
    format!("<code>{}</code>", escape_html(text))
}

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable size with 1024 steps, e.g. `1.50MB`. Zero renders as `0B`.
pub fn human_bytes(size: f64) -> String {
    if size <= 0.0 || !size.is_finite() {
        return "0B".to_string();
    }
    let mut size = size;
    let mut n = 0usize;
    while size >= 1024.0 && n < UNITS.len() - 1 {
        size /= 1024.0;
        n += 1;
    }
    format!("{size:.2}{}", UNITS[n])
}
