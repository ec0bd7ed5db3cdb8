//! Nom-based IRC message parser.
//!
//! Parses a single line (with or without its CR/LF terminator) into an
//! owned [`Message`]. Line framing lives in the codec; this module only
//! sees complete lines.

use nom::{
    bytes::complete::{take_until, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    sequence::preceded,
    IResult,
};

use super::tags::parse_tag_segment;
use super::types::Message;
use crate::error::MessageParseError;
use crate::prefix::Prefix;

/// RFC 1459 limit on the number of message parameters.
pub const MAX_PARAMS: usize = 15;

/// Parse IRCv3 message tags (the part after `@` and before the first space).
fn tag_segment(input: &str) -> IResult<&str, &str> {
    preceded(char('@'), take_until(" "))(input)
}

/// Parse the message prefix (the part after `:` and before the first space).
fn prefix_segment(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

/// Parse the command word (validated and case-folded afterwards).
fn command_word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric())(input)
}

/// Normalize the raw command word: textual commands are uppercased,
/// three-digit numerics are kept verbatim. Anything else is rejected.
fn normalize_command(raw: &str) -> Result<String, MessageParseError> {
    if raw.bytes().all(|b| b.is_ascii_alphabetic()) {
        Ok(raw.to_ascii_uppercase())
    } else if raw.len() == 3 && raw.bytes().all(|b| b.is_ascii_digit()) {
        Ok(raw.to_string())
    } else {
        Err(MessageParseError::InvalidCommand)
    }
}

/// Parse one IRC line into an owned [`Message`].
///
/// IRC message format:
/// ```text
/// [@tags] [:prefix] <command> [params...] [:trailing]
/// ```
pub fn parse_message(input: &str) -> Result<Message, MessageParseError> {
    let trimmed = input.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Err(MessageParseError::EmptyMessage);
    }

    let (rest, raw_tags) =
        opt(tag_segment)(trimmed).map_err(|_| MessageParseError::InvalidTags(trimmed.into()))?;
    let (rest, _) = space0::<_, nom::error::Error<&str>>(rest).expect("space0 is infallible");

    let (rest, raw_prefix) =
        opt(prefix_segment)(rest).map_err(|_| MessageParseError::InvalidPrefix(rest.into()))?;
    let (rest, _) = space0::<_, nom::error::Error<&str>>(rest).expect("space0 is infallible");

    let (rest, raw_command) =
        command_word(rest).map_err(|_: nom::Err<nom::error::Error<&str>>| {
            MessageParseError::InvalidCommand
        })?;

    let tags = match raw_tags {
        Some(raw) => parse_tag_segment(raw)?,
        None => Vec::new(),
    };
    let prefix = raw_prefix.map(Prefix::parse);
    let command = normalize_command(raw_command)?;

    let mut params: Vec<String> = Vec::new();
    let mut rest = rest;
    loop {
        let stripped = rest.trim_start_matches(' ');
        if stripped.is_empty() {
            break;
        }
        if stripped == rest {
            // Junk directly after the command word.
            return Err(MessageParseError::InvalidCommand);
        }
        rest = stripped;

        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing.to_string());
            rest = "";
        } else {
            let end = rest.find(' ').unwrap_or(rest.len());
            params.push(rest[..end].to_string());
            rest = &rest[end..];
        }
    }

    if params.len() > MAX_PARAMS {
        return Err(MessageParseError::TooManyParameters(params.len()));
    }

    Ok(Message {
        tags,
        prefix,
        command,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::types::Tag;

    #[test]
    fn test_parse_simple_command() {
        let msg = parse_message("PING").unwrap();
        assert_eq!(msg.command, "PING");
        assert!(msg.tags.is_empty());
        assert!(msg.prefix.is_none());
        assert!(msg.params.is_empty());
    }

    #[test]
    fn test_parse_command_with_params() {
        let msg = parse_message("PRIVMSG #channel :Hello, world!").unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#channel", "Hello, world!"]);
    }

    #[test]
    fn test_parse_with_prefix() {
        let msg = parse_message(":nick!user@host PRIVMSG #channel :Hello").unwrap();
        assert_eq!(msg.prefix, Some(Prefix::parse("nick!user@host")));
        assert_eq!(msg.params, vec!["#channel", "Hello"]);
    }

    #[test]
    fn test_parse_tags_scenario() {
        // Literal scenario from the IRCv3 tag grammar.
        let msg = parse_message(
            "@time=2024-01-01T00:00:00.000Z;+vendor/x=a\\:b\\sc :nick!u@h PRIVMSG #chan :hi there",
        )
        .unwrap();
        assert_eq!(
            msg.tags,
            vec![
                Tag("time".into(), Some("2024-01-01T00:00:00.000Z".into())),
                Tag("+vendor/x".into(), Some("a;b c".into())),
            ]
        );
        assert_eq!(msg.prefix, Some(Prefix::parse("nick!u@h")));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#chan", "hi there"]);
    }

    #[test]
    fn test_command_case_folding() {
        assert_eq!(parse_message("privmsg #c :x").unwrap().command, "PRIVMSG");
        // Numerics keep their leading zeros.
        assert_eq!(parse_message(":srv 001 n :w").unwrap().command, "001");
        assert_eq!(parse_message(":srv 005 n X :are supported").unwrap().command, "005");
    }

    #[test]
    fn test_rejects_bad_commands() {
        assert_eq!(parse_message(""), Err(MessageParseError::EmptyMessage));
        assert_eq!(parse_message("\r\n"), Err(MessageParseError::EmptyMessage));
        assert!(parse_message(":prefix.only").is_err());
        // Mixed alphanumerics and short numerics are not valid commands.
        assert!(parse_message("1X2 foo").is_err());
        assert!(parse_message("01 foo").is_err());
    }

    #[test]
    fn test_rejects_too_many_params() {
        let line = format!("KICK {}", "a ".repeat(16).trim_end());
        assert_eq!(
            parse_message(&line),
            Err(MessageParseError::TooManyParameters(16))
        );
    }

    #[test]
    fn test_line_terminator_tolerance() {
        for line in ["PING :srv\r\n", "PING :srv\r", "PING :srv\n", "PING :srv"] {
            let msg = parse_message(line).unwrap();
            assert_eq!(msg.params, vec!["srv"]);
        }
    }

    #[test]
    fn test_empty_trailing() {
        let msg = parse_message("PRIVMSG #channel :").unwrap();
        assert_eq!(msg.params, vec!["#channel", ""]);
    }

    #[test]
    fn test_trailing_with_colons() {
        let msg = parse_message("PRIVMSG #channel ::-) hi").unwrap();
        assert_eq!(msg.params, vec!["#channel", ":-) hi"]);
    }

    #[test]
    fn test_multiple_middle_params() {
        let msg = parse_message("USER guest 0 * :Real Name").unwrap();
        assert_eq!(msg.params, vec!["guest", "0", "*", "Real Name"]);
    }
}
