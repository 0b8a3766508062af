//! Escaping of documentation text into C string literals.

/// Escape arbitrary documentation text for embedding in a C string literal.
///
/// Backslashes, quotes, and control characters are escaped; any other
/// non-printable byte becomes a `\xNN` sequence.
pub fn escape_for_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7E => out.push(byte as char),
            _ => out.push_str(&format!("\\x{byte:02x}")),
        }
    }
    out
}
