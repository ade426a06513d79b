//! Line/context helpers shared by the textual scanners.

/// 1-based line number of a byte offset into `text`.
pub fn line_of_offset(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())]
        .bytes()
        .filter(|b| *b == b'\n')
        .count()
        + 1
}

/// A window of up to `2 * radius` lines centred on `line_number` (1-based).
pub fn context_window(text: &str, line_number: usize, radius: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let index = line_number.saturating_sub(1).min(lines.len() - 1);
    let start = index.saturating_sub(radius);
    let end = (index + radius + 1).min(lines.len());
    lines[start..end].join("\n")
}
