//! Escaping helpers for the two places user-supplied mesh text ends up: log lines and the
//! HTML chat view.
//!
//! Mesh chat text is arbitrary UTF-8 typed on a phone, so it may carry newlines, control
//! characters or markup. Logs must stay single-line and the HTML history must never
//! interpret a message as markup.

use std::fmt::Write;

/// Upper bound on characters kept by [`escape_log`] before an ellipsis is appended.
const MAX_LOG_PREVIEW: usize = 300;

/// Escape a string for single-line logging.
///
/// - `\n` => `\\n`, `\r` => `\\r`, `\t` => `\\t`
/// - backslash => `\\\\`
/// - other control characters => `\xNN`
///
/// Output is capped at [`MAX_LOG_PREVIEW`] characters followed by `…`.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_LOG_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_LOG_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Escape text for embedding in HTML element content or attribute values.
///
/// Replaces `&`, `<`, `>`, `"` and `'`; everything else is passed through.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// UTF-8 safe truncation for log display; never slices inside a multi-byte char.
/// Longer inputs get `...` appended after escaping.
pub fn truncate_for_log(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return escape_log(input);
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = escape_log(&input[..cut]);
    out.push_str("...");
    out
}
