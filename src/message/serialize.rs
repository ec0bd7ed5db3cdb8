//! IRC message serialization.
//!
//! The [`Display`] impl writes the canonical wire form without a line
//! terminator; [`Message::to_wire`] is the checked variant the codec uses,
//! which rejects parameters that cannot be represented.

use std::fmt;

use super::tags::write_tag_segment;
use super::types::Message;
use crate::error::MessageParseError;

impl Message {
    /// Whether a parameter at the given position needs (or may carry) a
    /// leading `:` on the wire.
    fn needs_trailing_marker(param: &str) -> bool {
        param.is_empty() || param.starts_with(':') || param.contains(' ')
    }

    /// Serialize to the checked wire form (no CRLF).
    ///
    /// Fails if a parameter other than the last is empty, contains a
    /// space, or starts with `:`; such a message cannot round-trip.
    pub fn to_wire(&self) -> Result<String, MessageParseError> {
        if let Some((_, middles)) = self.params.split_last() {
            for param in middles {
                if Self::needs_trailing_marker(param) {
                    return Err(MessageParseError::InvalidArgument(param.clone()));
                }
            }
        }
        Ok(self.to_string())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            f.write_str("@")?;
            write_tag_segment(f, &self.tags)?;
            f.write_str(" ")?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;

        if let Some((last, middles)) = self.params.split_last() {
            for param in middles {
                write!(f, " {}", param)?;
            }
            if Self::needs_trailing_marker(last) {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::Prefix;

    #[test]
    fn test_display_simple() {
        assert_eq!(Message::cmd("PING", &["srv"]).to_string(), "PING srv");
        assert_eq!(
            Message::privmsg("#chan", "hi there").to_string(),
            "PRIVMSG #chan :hi there"
        );
    }

    #[test]
    fn test_trailing_marker_rules() {
        // Empty trailing keeps its colon.
        assert_eq!(
            Message::cmd("PRIVMSG", &["#c", ""]).to_string(),
            "PRIVMSG #c :"
        );
        // Leading colon in the trailing must be escaped with a marker.
        assert_eq!(
            Message::cmd("PRIVMSG", &["#c", ":)"]).to_string(),
            "PRIVMSG #c ::)"
        );
        // Single word trailing needs no marker.
        assert_eq!(
            Message::cmd("PRIVMSG", &["#c", "hi"]).to_string(),
            "PRIVMSG #c hi"
        );
    }

    #[test]
    fn test_tags_and_prefix() {
        let msg = Message::privmsg("#c", "x")
            .with_tag("time", Some("12:00"))
            .with_prefix(Prefix::parse("n!u@h"));
        assert_eq!(msg.to_string(), "@time=12\\:00 :n!u@h PRIVMSG #c x");
    }

    #[test]
    fn test_to_wire_rejects_bad_middles() {
        assert!(Message::cmd("KICK", &["#c", "bad nick", "r"]).to_wire().is_err());
        assert!(Message::cmd("KICK", &["", "n"]).to_wire().is_err());
        assert!(Message::cmd("KICK", &[":c", "n"]).to_wire().is_err());
        assert!(Message::cmd("KICK", &["#c", "n"]).to_wire().is_ok());
    }

    #[test]
    fn test_parse_serialize_round_trip() {
        for raw in [
            "PING :irc.example.com",
            ":nick!user@host PRIVMSG #channel :Hello, world!",
            ":server 001 nickname :Welcome to the IRC Network",
            "@time=2023-01-01T00:00:00.000Z;msgid=abc123 :nick!user@host PRIVMSG #channel :Tagged",
            "PRIVMSG #channel :",
        ] {
            let msg: Message = raw.parse().expect("parse");
            let reparsed: Message = msg.to_string().parse().expect("reparse");
            assert_eq!(msg, reparsed, "round-trip failed for '{}'", raw);
        }
    }
}
