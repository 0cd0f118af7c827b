/// UTF-8 byte order mark some editors prepend to text files.
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Returns at most the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Decodes bytes as UTF-8, skipping a leading BOM and replacing invalid sequences.
pub fn decode_utf8_lossy(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&UTF8_BOM[..]).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
