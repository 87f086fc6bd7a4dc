use std::borrow::Cow;

/// Maximum length, in characters, of a single metadata value taken from a
/// remote filter list header.
pub const MAX_METADATA_LEN: usize = 1024;

/// Strip control characters and ANSI escape sequences.
///
/// Removes C0 controls except tab, newline and carriage return, DEL, CSI
/// sequences (`ESC [` ... final byte), OSC sequences (`ESC ]` ... BEL or
/// `ESC \`) and bare ESC. Clean input is returned borrowed.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_bad = |c: char| {
        c == '\u{1b}'
            || c == '\u{7f}'
            || (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r'))
    };
    if !s.chars().any(is_bad) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            if !is_bad(c) {
                out.push(c);
            }
            continue;
        }

        match chars.peek() {
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&c) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\u{07}' {
                        break;
                    }
                    if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}

/// Clean a single-line metadata value from a remote list: controls
/// stripped, whitespace trimmed, capped at [`MAX_METADATA_LEN`] characters.
pub fn sanitize_metadata(value: &str) -> String {
    let stripped = strip_control_chars(value);
    let trimmed = stripped.trim();
    if trimmed.chars().count() <= MAX_METADATA_LEN {
        return trimmed.to_owned();
    }
    trimmed.chars().take(MAX_METADATA_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_borrowed() {
        let input = "EasyList: ads & trackers";
        assert!(matches!(strip_control_chars(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_tabs_and_newlines_kept() {
        let input = "a\tb\r\nc";
        assert_eq!(strip_control_chars(input), input);
    }

    #[test]
    fn test_c0_and_del_removed() {
        assert_eq!(strip_control_chars("ti\x00tl\x07e\x7f"), "title");
    }

    #[test]
    fn test_csi_removed() {
        assert_eq!(strip_control_chars("\x1b[1;31mBold red\x1b[0m"), "Bold red");
    }

    #[test]
    fn test_osc_removed() {
        assert_eq!(strip_control_chars("\x1b]0;pwned\x07safe"), "safe");
        assert_eq!(strip_control_chars("\x1b]0;pwned\x1b\\safe"), "safe");
    }

    #[test]
    fn test_bare_esc_removed() {
        assert_eq!(strip_control_chars("a\x1bb"), "ab");
    }

    #[test]
    fn test_unicode_kept() {
        assert_eq!(strip_control_chars("Liste FR \x1b[2Aé"), "Liste FR é");
    }

    #[test]
    fn test_sanitize_metadata_trims_and_caps() {
        assert_eq!(sanitize_metadata("  My list\x00  "), "My list");
        let long = "x".repeat(MAX_METADATA_LEN + 10);
        assert_eq!(sanitize_metadata(&long).len(), MAX_METADATA_LEN);
    }
}
