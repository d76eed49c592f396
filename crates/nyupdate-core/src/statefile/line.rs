//! Line grammar for `key @ value` state files.
//!
//! ```text
//! # comment, kept verbatim
//! https://example.org/rss @ 1234
//! https://example.org/other          <- no value, means 0
//! ```

/// Separator between key and value.
pub const SEPARATOR: char = '@';

/// One classified line of a state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Empty or whitespace-only line.
    Blank,
    /// Line starting with `#`, without its line terminator.
    Comment(String),
    /// A key with its numeric value.
    Entry { key: String, value: u64 },
    /// Anything else. `raw` has whitespace removed, as it is reported.
    Invalid { raw: String },
}

/// Classify a single line.
///
/// All whitespace inside a data line is insignificant, so `a @ 1` and `a@1`
/// parse the same.
pub fn parse_line(raw: &str) -> Line {
    let compact: String = raw.split_whitespace().collect();

    if compact.is_empty() {
        return Line::Blank;
    }
    if compact.starts_with('#') {
        return Line::Comment(raw.trim_end_matches(['\r', '\n']).to_string());
    }

    let mut parts = compact.split(SEPARATOR);
    let key = parts.next().unwrap_or_default();
    let value = parts.next();

    if key.is_empty() || parts.next().is_some() {
        return Line::Invalid { raw: compact };
    }

    match value {
        None => Line::Entry {
            key: key.to_string(),
            value: 0,
        },
        Some(v) => match v.parse::<u64>() {
            Ok(value) => Line::Entry {
                key: key.to_string(),
                value,
            },
            Err(_) => Line::Invalid { raw: compact },
        },
    }
}

/// Render an entry the way it is written back to disk.
pub fn format_entry(key: &str, value: u64) -> String {
    format!("{key} {SEPARATOR} {value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: u64) -> Line {
        Line::Entry {
            key: key.to_string(),
            value,
        }
    }

    #[test]
    fn test_entry_with_value() {
        assert_eq!(
            parse_line("https://nyaa.example/rss @ 42\n"),
            entry("https://nyaa.example/rss", 42)
        );
    }

    #[test]
    fn test_whitespace_is_insignificant() {
        assert_eq!(parse_line("  a\t@  7  "), entry("a", 7));
        assert_eq!(parse_line("a@7"), entry("a", 7));
    }

    #[test]
    fn test_missing_value_defaults_to_zero() {
        assert_eq!(parse_line("https://nyaa.example/rss"), entry("https://nyaa.example/rss", 0));
    }

    #[test]
    fn test_blank_lines() {
        assert_eq!(parse_line(""), Line::Blank);
        assert_eq!(parse_line("   \t\n"), Line::Blank);
    }

    #[test]
    fn test_comment_is_kept_verbatim() {
        assert_eq!(
            parse_line("# my feeds  \n"),
            Line::Comment("# my feeds  ".to_string())
        );
        assert_eq!(
            parse_line("  # indented"),
            Line::Comment("  # indented".to_string())
        );
    }

    #[test]
    fn test_multiple_separators_are_invalid() {
        assert_eq!(
            parse_line("a @ 1 @ 2"),
            Line::Invalid {
                raw: "a@1@2".to_string()
            }
        );
    }

    #[test]
    fn test_non_integer_value_is_invalid() {
        assert!(matches!(parse_line("a @ seven"), Line::Invalid { .. }));
        assert!(matches!(parse_line("a @ -3"), Line::Invalid { .. }));
        assert!(matches!(parse_line("a @"), Line::Invalid { .. }));
    }

    #[test]
    fn test_empty_key_is_invalid() {
        assert!(matches!(parse_line("@ 3"), Line::Invalid { .. }));
    }

    #[test]
    fn test_format_entry_parses_back() {
        let line = format_entry("https://nyaa.example/1.torrent", 3);
        assert_eq!(line, "https://nyaa.example/1.torrent @ 3");
        assert_eq!(parse_line(&line), entry("https://nyaa.example/1.torrent", 3));
    }
}
