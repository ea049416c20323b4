//! Opt-in marker detection.

/// Whether `source` carries `marker` as one of its leading comment lines.
///
/// Scanning stops at the first line that does not start with `#`. Source
/// that is not valid UTF-8 never carries the marker.
#[must_use]
pub fn has_marker(source: &[u8], marker: &str) -> bool {
    let Ok(text) = std::str::from_utf8(source) else {
        return false;
    };
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.lines()
        .take_while(|line| line.starts_with('#'))
        .any(|line| line.trim() == marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "# COMPILE_PREFABS";

    #[test]
    fn marker_among_leading_comments() {
        assert!(has_marker(b"#!/usr/bin/env python\n# COMPILE_PREFABS\nimport x\n", MARKER));
        assert!(has_marker(b"# COMPILE_PREFABS  \r\n", MARKER));
    }

    #[test]
    fn marker_after_code_is_ignored() {
        assert!(!has_marker(b"import x\n# COMPILE_PREFABS\n", MARKER));
        assert!(!has_marker(b"\n# COMPILE_PREFABS\n", MARKER));
        assert!(!has_marker(b"# COMPILE_PREFABS_LATER\n", MARKER));
    }

    #[test]
    fn undecodable_source_has_no_marker() {
        assert!(!has_marker(b"# COMPILE_PREFABS\n\xff\xfe", MARKER));
    }
}
