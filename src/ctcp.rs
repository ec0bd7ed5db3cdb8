//! CTCP encapsulation.
//!
//! CTCP embeds structured requests inside PRIVMSG/NOTICE payloads by
//! wrapping them in `\x01` delimiters. This module only parses and builds
//! the encapsulation; responding to queries is left to the application.

const DELIMITER: char = '\x01';

/// A parsed CTCP query or reply body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctcp {
    /// The CTCP command, uppercased (`VERSION`, `ACTION`, `PING`, ...).
    pub kind: String,
    /// Everything after the command, if present.
    pub argument: Option<String>,
}

impl Ctcp {
    /// Parse a PRIVMSG/NOTICE body as CTCP, if it is one.
    ///
    /// A missing closing delimiter is tolerated, as on most networks.
    pub fn parse(text: &str) -> Option<Ctcp> {
        let body = text.strip_prefix(DELIMITER)?;
        let body = body.strip_suffix(DELIMITER).unwrap_or(body);
        if body.is_empty() {
            return None;
        }
        let (kind, argument) = match body.split_once(' ') {
            Some((kind, arg)) => (kind, Some(arg.to_string())),
            None => (body, None),
        };
        Some(Ctcp {
            kind: kind.to_ascii_uppercase(),
            argument,
        })
    }

    /// Build the encapsulated message body.
    pub fn encode(kind: &str, argument: Option<&str>) -> String {
        match argument {
            Some(arg) => format!("{}{} {}{}", DELIMITER, kind, arg, DELIMITER),
            None => format!("{}{}{}", DELIMITER, kind, DELIMITER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_argument() {
        let ctcp = Ctcp::parse("\x01PING 12345\x01").unwrap();
        assert_eq!(ctcp.kind, "PING");
        assert_eq!(ctcp.argument.as_deref(), Some("12345"));
    }

    #[test]
    fn test_parse_bare() {
        let ctcp = Ctcp::parse("\x01VERSION\x01").unwrap();
        assert_eq!(ctcp.kind, "VERSION");
        assert_eq!(ctcp.argument, None);
    }

    #[test]
    fn test_parse_unterminated() {
        let ctcp = Ctcp::parse("\x01ACTION waves").unwrap();
        assert_eq!(ctcp.kind, "ACTION");
        assert_eq!(ctcp.argument.as_deref(), Some("waves"));
    }

    #[test]
    fn test_not_ctcp() {
        assert_eq!(Ctcp::parse("plain message"), None);
        assert_eq!(Ctcp::parse("\x01\x01"), None);
    }

    #[test]
    fn test_encode() {
        assert_eq!(Ctcp::encode("VERSION", None), "\x01VERSION\x01");
        assert_eq!(Ctcp::encode("PING", Some("99")), "\x01PING 99\x01");
    }
}
