//! Owned IRC message types.

use std::str::FromStr;

use crate::error::MessageParseError;
use crate::prefix::Prefix;

/// A single IRCv3 message tag: key and optional value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag(pub String, pub Option<String>);

/// A parsed IRC wire message.
///
/// `command` is uppercased on parse, except numerics which stay as their
/// three-digit form (leading zeros preserved). The last parameter may be a
/// trailing parameter and is the only one allowed to be empty or contain
/// spaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// IRCv3 message tags, in wire order. Empty when absent.
    pub tags: Vec<Tag>,
    /// Message source, if present.
    pub prefix: Option<Prefix>,
    /// Command name or three-digit numeric.
    pub command: String,
    /// Ordered parameters, trailing last.
    pub params: Vec<String>,
}

impl Message {
    /// Build a message from a command and parameters.
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Message {
        Message {
            tags: Vec::new(),
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Shorthand for building from string slices.
    pub fn cmd(command: &str, params: &[&str]) -> Message {
        Message::new(command, params.iter().map(|s| s.to_string()).collect())
    }

    /// Attach a tag, builder-style.
    pub fn with_tag(mut self, key: &str, value: Option<&str>) -> Message {
        self.tags.push(Tag(key.to_string(), value.map(String::from)));
        self
    }

    /// Attach a prefix, builder-style.
    pub fn with_prefix(mut self, prefix: Prefix) -> Message {
        self.prefix = Some(prefix);
        self
    }

    /// Look up a tag value by key.
    ///
    /// Returns `Some(None)` for a value-less tag.
    pub fn tag(&self, key: &str) -> Option<Option<&str>> {
        self.tags
            .iter()
            .find(|Tag(k, _)| k == key)
            .map(|Tag(_, v)| v.as_deref())
    }

    /// Parameter by index, as a str.
    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// The trailing (last) parameter, if any.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Whether the command is a three-digit numeric reply.
    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }

    /// The nickname of the message source, when the source is a user.
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }

    // Constructors for the handful of commands the library itself emits.

    /// `PRIVMSG target :text`
    pub fn privmsg(target: &str, text: &str) -> Message {
        Message::cmd("PRIVMSG", &[target, text])
    }

    /// `NOTICE target :text`
    pub fn notice(target: &str, text: &str) -> Message {
        Message::cmd("NOTICE", &[target, text])
    }

    /// `JOIN channel [key]`
    pub fn join(channel: &str, key: Option<&str>) -> Message {
        match key {
            Some(key) => Message::cmd("JOIN", &[channel, key]),
            None => Message::cmd("JOIN", &[channel]),
        }
    }

    /// `PONG token...`
    pub fn pong(params: &[String]) -> Message {
        Message::new("PONG", params.to_vec())
    }
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Message, MessageParseError> {
        super::parse::parse_message(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let msg = Message::privmsg("#dev", "hi there")
            .with_tag("msgid", Some("abc123"))
            .with_prefix(Prefix::parse("bot!bot@example.com"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#dev", "hi there"]);
        assert_eq!(msg.tag("msgid"), Some(Some("abc123")));
        assert_eq!(msg.source_nick(), Some("bot"));
    }

    #[test]
    fn test_tag_lookup_flag() {
        let msg = Message::cmd("TAGMSG", &["#chan"]).with_tag("+typing", None);
        assert_eq!(msg.tag("+typing"), Some(None));
        assert_eq!(msg.tag("absent"), None);
    }

    #[test]
    fn test_is_numeric() {
        assert!(Message::cmd("001", &[]).is_numeric());
        assert!(Message::cmd("433", &[]).is_numeric());
        assert!(!Message::cmd("PRIVMSG", &[]).is_numeric());
        assert!(!Message::cmd("01", &[]).is_numeric());
    }
}
