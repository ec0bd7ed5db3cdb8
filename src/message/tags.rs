//! IRCv3 message tag escaping and tag-segment parsing.

use std::fmt::{Result as FmtResult, Write};

use super::types::Tag;
use crate::error::MessageParseError;

/// Escape a tag value for serialization.
///
/// Escapes special characters according to the IRCv3 message-tags spec.
pub fn escape_tag_value(f: &mut dyn Write, value: &str) -> FmtResult {
    for c in value.chars() {
        match c {
            ';' => f.write_str("\\:")?,
            ' ' => f.write_str("\\s")?,
            '\\' => f.write_str("\\\\")?,
            '\r' => f.write_str("\\r")?,
            '\n' => f.write_str("\\n")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

/// Unescape a tag value from wire format.
///
/// Reverses the escaping applied by [`escape_tag_value`]. Unknown escapes
/// drop the backslash; a lone trailing backslash is dropped entirely.
pub fn unescape_tag_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let r = if c == '\\' {
            match iter.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(c) => c,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(r);
    }
    unescaped
}

/// Parse a raw tag segment (without the leading `@`) into tags.
///
/// Keys keep their optional `+` client prefix and `vendor/` namespace.
/// A key with no `=` gets value `None`; `key=` gets `Some("")`.
pub fn parse_tag_segment(raw: &str) -> Result<Vec<Tag>, MessageParseError> {
    let mut out = Vec::new();
    for item in raw.split(';') {
        if item.is_empty() {
            continue;
        }
        let (key, value) = match item.split_once('=') {
            Some((key, value)) => (key, Some(unescape_tag_value(value))),
            None => (item, None),
        };
        if key.is_empty() {
            return Err(MessageParseError::InvalidTags(raw.to_string()));
        }
        out.push(Tag(key.to_string(), value));
    }
    Ok(out)
}

/// Serialize tags to a wire segment (without the leading `@`).
pub fn write_tag_segment(f: &mut dyn Write, tags: &[Tag]) -> FmtResult {
    for (i, Tag(key, value)) in tags.iter().enumerate() {
        if i > 0 {
            f.write_char(';')?;
        }
        f.write_str(key)?;
        if let Some(value) = value {
            f.write_char('=')?;
            escape_tag_value(f, value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// IRCv3 specifies these escape sequences:
    /// - `\:` → `;` (semicolon)
    /// - `\s` → ` ` (space)
    /// - `\\` → `\` (backslash)
    /// - `\r` → CR (carriage return)
    /// - `\n` → LF (line feed)
    #[test]
    fn test_unescape_basics() {
        assert_eq!(unescape_tag_value("a\\:b"), "a;b");
        assert_eq!(unescape_tag_value("hello\\sworld"), "hello world");
        assert_eq!(unescape_tag_value("path\\\\file"), "path\\file");
        assert_eq!(unescape_tag_value("line\\rend"), "line\rend");
        assert_eq!(unescape_tag_value("line\\nend"), "line\nend");
    }

    #[test]
    fn test_unescape_combined() {
        assert_eq!(unescape_tag_value("a\\:b\\sc\\\\d\\re\\nf"), "a;b c\\d\re\nf");
    }

    #[test]
    fn test_unescape_trailing_backslash() {
        // Trailing backslash with no following char is dropped per IRCv3.
        assert_eq!(unescape_tag_value("test\\"), "test");
    }

    #[test]
    fn test_unescape_unknown_escape() {
        // Unknown escape sequences: \x becomes x (backslash dropped).
        assert_eq!(unescape_tag_value("a\\xb"), "axb");
    }

    #[test]
    fn test_escape_roundtrip() {
        let test_values = vec![
            "simple",
            "with space",
            "with;semicolon",
            "with\\backslash",
            "with\nnewline",
            "with\rcarriage",
            "complex; \\ \n \r all",
        ];

        for original in test_values {
            let mut escaped = String::new();
            escape_tag_value(&mut escaped, original).unwrap();
            let unescaped = unescape_tag_value(&escaped);
            assert_eq!(
                unescaped, original,
                "Roundtrip failed: '{}' -> '{}' -> '{}'",
                original, escaped, unescaped
            );
        }
    }

    #[test]
    fn test_parse_segment() {
        let tags = parse_tag_segment("time=2024-01-01T00:00:00.000Z;+vendor/x=a\\:b\\sc").unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0], Tag("time".into(), Some("2024-01-01T00:00:00.000Z".into())));
        assert_eq!(tags[1], Tag("+vendor/x".into(), Some("a;b c".into())));
    }

    #[test]
    fn test_parse_segment_flags_and_empty_values() {
        let tags = parse_tag_segment("batch;label=").unwrap();
        assert_eq!(tags[0], Tag("batch".into(), None));
        assert_eq!(tags[1], Tag("label".into(), Some(String::new())));
    }

    #[test]
    fn test_parse_segment_rejects_empty_key() {
        assert!(parse_tag_segment("=value").is_err());
    }

    #[test]
    fn test_write_segment() {
        let tags = vec![
            Tag("time".into(), Some("12:00".into())),
            Tag("batch".into(), None),
            Tag("+x".into(), Some("a b;c".into())),
        ];
        let mut out = String::new();
        write_tag_segment(&mut out, &tags).unwrap();
        assert_eq!(out, "time=12:00;batch;+x=a\\sb\\:c");
    }
}
