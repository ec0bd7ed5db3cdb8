//! Integration tests for message parsing and serialization
//!
//! These tests verify that messages can be parsed from strings and then
//! serialized back to equivalent strings, ensuring round-trip
//! compatibility.

use slirc::{Message, Prefix, Tag};

fn round_trip(original: &str) -> Message {
    let message: Message = original.parse().expect("failed to parse message");
    let serialized = message.to_string();
    let reparsed: Message = serialized.parse().expect("failed to reparse message");
    assert_eq!(message, reparsed, "round-trip failed for '{}'", original);
    reparsed
}

#[test]
fn test_message_round_trip_simple() {
    round_trip("PING :irc.example.com");
}

#[test]
fn test_message_round_trip_with_prefix() {
    round_trip(":nick!user@host PRIVMSG #channel :Hello, world!");
}

#[test]
fn test_message_round_trip_with_tags() {
    round_trip(
        "@time=2023-01-01T00:00:00.000Z;msgid=abc123 :nick!user@host PRIVMSG #channel :Tagged message",
    );
}

#[test]
fn test_message_round_trip_numeric_response() {
    let msg = round_trip(":server 001 nickname :Welcome to the IRC Network");
    assert_eq!(msg.command, "001");
}

#[test]
fn test_message_round_trip_complex_tags() {
    round_trip(
        "@batch=abc123;msgid=def456;time=2023-01-01T12:00:00Z;+custom=value :nick BATCH +abc123 chathistory #channel",
    );
}

#[test]
fn test_message_construction_and_parsing() {
    let message = Message::privmsg("#test", "Integration test message")
        .with_tag("time", Some("2023-01-01T00:00:00Z"))
        .with_tag("msgid", Some("test123"))
        .with_prefix(Prefix::parse("testbot!test@example.com"));

    let serialized = message.to_string();
    let parsed: Message = serialized.parse().expect("failed to parse constructed message");
    assert_eq!(message, parsed);
}

#[test]
fn test_empty_trailing_parameter() {
    let reparsed = round_trip("PRIVMSG #channel :");
    assert_eq!(reparsed.params, vec!["#channel", ""]);
}

#[test]
fn test_special_characters_in_message() {
    round_trip(":nick!user@host PRIVMSG #channel :Message with üñíçødé and émøjí 🎉");
}

#[test]
fn test_mode_command_round_trip() {
    let msg = round_trip(":server MODE #channel +o nick");
    assert_eq!(msg.params, vec!["#channel", "+o", "nick"]);
}

#[test]
fn test_join_command_variations() {
    for original in [
        "JOIN #channel",
        "JOIN #channel key",
        ":nick!user@host JOIN #channel",
        "JOIN #channel1,#channel2 key1,key2",
    ] {
        round_trip(original);
    }
}

#[test]
fn test_tag_values_with_escapes() {
    let msg = round_trip("@+vendor/x=a\\:b\\sc :nick!u@h PRIVMSG #chan :hi there");
    assert_eq!(msg.tags, vec![Tag("+vendor/x".into(), Some("a;b c".into()))]);
}

#[test]
fn test_canonical_whitespace() {
    // Extra separator spaces collapse to the canonical single-space form.
    let message: Message = ":srv   PRIVMSG  #c :hi".parse().expect("parse");
    assert_eq!(message.to_string(), ":srv PRIVMSG #c hi");
}
