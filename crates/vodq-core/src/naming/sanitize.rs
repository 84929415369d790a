//! Linux-safe filename sanitization.

/// Linux NAME_MAX in bytes.
pub const NAME_MAX: usize = 255;

/// Sanitizes a rendered video name for use as a single path component.
///
/// - Replaces NUL, `/`, `\`, control characters and whitespace with `_`
/// - Replaces `: * ? " < > |` too, so files survive a copy to FAT/NTFS media
/// - Collapses consecutive underscores
/// - Trims leading/trailing dots and underscores
/// - Limits length to `max_bytes` on a char boundary
pub fn sanitize_component(name: &str, max_bytes: usize) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let replace = c == '\0'
            || c == '/'
            || c == '\\'
            || c.is_control()
            || c.is_whitespace()
            || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|');
        let c = if replace { '_' } else { c };

        if c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    truncate_on_char_boundary(trimmed, max_bytes).to_string()
}

fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut take = max_bytes;
    while take > 0 && !s.is_char_boundary(take) {
        take -= 1;
    }
    &s[..take]
}
