//! IRC message prefix (source) types.

use std::fmt;

/// The source of a message: either a server name or a user mask.
///
/// A prefix containing `!` or `@` is parsed as `nick[!user][@host]`;
/// anything else is taken to be a server name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prefix {
    /// A bare server name, e.g. `irc.example.com`.
    Server(String),
    /// A user mask, e.g. `nick!user@host` (user and host optional).
    User {
        /// Nickname part.
        nick: String,
        /// Ident/username part, if present.
        user: Option<String>,
        /// Hostname part, if present.
        host: Option<String>,
    },
}

impl Prefix {
    /// Parse a prefix string (without the leading `:`).
    pub fn parse(s: &str) -> Prefix {
        if !s.contains('!') && !s.contains('@') {
            return Prefix::Server(s.to_string());
        }

        let (rest, host) = match s.split_once('@') {
            Some((rest, host)) => (rest, Some(host.to_string())),
            None => (s, None),
        };
        let (nick, user) = match rest.split_once('!') {
            Some((nick, user)) => (nick.to_string(), Some(user.to_string())),
            None => (rest.to_string(), None),
        };

        Prefix::User { nick, user, host }
    }

    /// The nickname if this is a user prefix, the server name otherwise.
    pub fn name(&self) -> &str {
        match self {
            Prefix::Server(s) => s,
            Prefix::User { nick, .. } => nick,
        }
    }

    /// The nickname, if this prefix names a user.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::Server(_) => None,
            Prefix::User { nick, .. } => Some(nick),
        }
    }

    /// Parse a target that is a bare nickname or a full `nick!user@host`
    /// mask (NAMES entries, MONITOR targets). Unlike [`Prefix::parse`],
    /// a bare word is a nickname here, never a server.
    pub fn parse_user_target(s: &str) -> Prefix {
        if s.contains('!') || s.contains('@') {
            Prefix::parse(s)
        } else {
            Prefix::User {
                nick: s.to_string(),
                user: None,
                host: None,
            }
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Server(s) => f.write_str(s),
            Prefix::User { nick, user, host } => {
                f.write_str(nick)?;
                if let Some(user) = user {
                    write!(f, "!{}", user)?;
                }
                if let Some(host) = host {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server() {
        assert_eq!(
            Prefix::parse("irc.example.com"),
            Prefix::Server("irc.example.com".into())
        );
    }

    #[test]
    fn test_parse_full_mask() {
        assert_eq!(
            Prefix::parse("nick!user@host"),
            Prefix::User {
                nick: "nick".into(),
                user: Some("user".into()),
                host: Some("host".into()),
            }
        );
    }

    #[test]
    fn test_parse_partial_masks() {
        assert_eq!(
            Prefix::parse("nick!user"),
            Prefix::User {
                nick: "nick".into(),
                user: Some("user".into()),
                host: None,
            }
        );
        assert_eq!(
            Prefix::parse("nick@host"),
            Prefix::User {
                nick: "nick".into(),
                user: None,
                host: Some("host".into()),
            }
        );
    }

    #[test]
    fn test_display_round_trip() {
        for raw in ["irc.example.com", "nick!user@host", "nick@host", "nick!user"] {
            assert_eq!(Prefix::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_parse_user_target() {
        assert_eq!(
            Prefix::parse_user_target("nick.server.like"),
            Prefix::User {
                nick: "nick.server.like".into(),
                user: None,
                host: None,
            }
        );
        assert_eq!(
            Prefix::parse_user_target("nick!u@h"),
            Prefix::parse("nick!u@h")
        );
    }

    #[test]
    fn test_name() {
        assert_eq!(Prefix::parse("nick!u@h").name(), "nick");
        assert_eq!(Prefix::parse("irc.example.com").name(), "irc.example.com");
        assert_eq!(Prefix::parse("irc.example.com").nick(), None);
    }
}
