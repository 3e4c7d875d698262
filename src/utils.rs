/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    bytes
        .iter()
        .map(|value| format!("{value:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats an optional status reading for terminal output.
pub(crate) fn format_optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}
