//! Tokio codec for IRC line framing.
//!
//! Splits the inbound byte stream into lines (CRLF, CR, or LF accepted),
//! decodes them with the configured encoding, and parses each into a
//! [`Message`]. Malformed lines are logged and skipped; they never
//! terminate the stream. Outbound messages are validated against the
//! protocol length budgets and terminated with CRLF.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::ProtocolError;
use crate::message::Message;

/// Maximum octets of an IRC message body (command + params + CRLF).
pub const MAX_BODY_LEN: usize = 512;

/// Maximum octets of the tag section, including the leading `@`.
pub const MAX_TAGS_LEN: usize = 8191;

/// Longest line the decoder will buffer before discarding.
pub const MAX_LINE_LEN: usize = MAX_TAGS_LEN + 1 + MAX_BODY_LEN;

/// Byte/string conversion applied at the transport boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    /// UTF-8, falling back to Latin-1 on invalid input. Never loses bytes.
    #[default]
    Utf8,
    /// Latin-1 only (each byte is one char).
    Latin1,
}

impl Encoding {
    fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => s.to_string(),
                Err(_) => latin1_to_string(bytes),
            },
            Encoding::Latin1 => latin1_to_string(bytes),
        }
    }

    fn encode(self, s: &str, dst: &mut BytesMut) {
        match self {
            Encoding::Utf8 => dst.put_slice(s.as_bytes()),
            Encoding::Latin1 => {
                for c in s.chars() {
                    dst.put_u8(if (c as u32) <= 0xFF { c as u8 } else { b'?' });
                }
            }
        }
    }
}

fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Framed IRC message codec.
#[derive(Clone, Debug, Default)]
pub struct IrcCodec {
    encoding: Encoding,
    /// Set while skipping an over-long line until its terminator.
    discarding: bool,
}

impl IrcCodec {
    pub fn new(encoding: Encoding) -> IrcCodec {
        IrcCodec {
            encoding,
            discarding: false,
        }
    }

    /// Extract the next complete line from the buffer, handling CRLF, CR,
    /// and LF terminators. Returns the line without its terminator.
    fn take_line(&mut self, src: &mut BytesMut) -> Option<BytesMut> {
        loop {
            let pos = src.iter().position(|&b| b == b'\r' || b == b'\n')?;
            let line = src.split_to(pos);
            // Consume the terminator; a CRLF pair goes together.
            let first = src[0];
            src.advance(1);
            if first == b'\r' && src.first() == Some(&b'\n') {
                src.advance(1);
            }

            if self.discarding {
                self.discarding = false;
                warn!(dropped = line.len(), "dropped over-long line");
                continue;
            }
            return Some(line);
        }
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        loop {
            match self.take_line(src) {
                Some(line) => {
                    if line.is_empty() {
                        continue;
                    }
                    let text = self.encoding.decode(&line);
                    match text.parse::<Message>() {
                        Ok(msg) => return Ok(Some(msg)),
                        Err(cause) => {
                            warn!(line = %text, %cause, "skipping malformed line");
                            continue;
                        }
                    }
                }
                None => {
                    if src.len() > MAX_LINE_LEN && !self.discarding {
                        // Nothing line-shaped within the budget; skip until
                        // the next terminator shows up.
                        self.discarding = true;
                        src.clear();
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        if let Some(msg) = self.decode(src)? {
            return Ok(Some(msg));
        }
        // A final unterminated line is still a line.
        if src.is_empty() || self.discarding {
            return Ok(None);
        }
        let line = src.split_to(src.len());
        let text = self.encoding.decode(&line);
        match text.parse::<Message>() {
            Ok(msg) => Ok(Some(msg)),
            Err(cause) => {
                warn!(line = %text, %cause, "skipping malformed line at eof");
                Ok(None)
            }
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let wire = msg.to_wire().map_err(|cause| ProtocolError::MalformedLine {
            string: msg.to_string(),
            cause,
        })?;

        let (tags_len, body_len) = match wire.split_once(' ') {
            Some((tags, body)) if tags.starts_with('@') => (tags.len(), body.len() + 2),
            _ => (0, wire.len() + 2),
        };
        if tags_len > MAX_TAGS_LEN {
            return Err(ProtocolError::MessageTooLong(tags_len));
        }
        if body_len > MAX_BODY_LEN {
            return Err(ProtocolError::MessageTooLong(body_len));
        }

        self.encoding.encode(&wire, dst);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut IrcCodec, bytes: &[u8]) -> Vec<Message> {
        let mut buf = BytesMut::from(bytes);
        let mut out = Vec::new();
        while let Some(msg) = codec.decode(&mut buf).unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_decode_multiple_lines() {
        let mut codec = IrcCodec::default();
        let msgs = decode_all(&mut codec, b"PING :a\r\nPING :b\r\n");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].params, vec!["b"]);
    }

    #[test]
    fn test_decode_partial_then_rest() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(&b"PRIVMSG #chan :hel"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"lo\r\nPING :x\r\n");
        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.params, vec!["#chan", "hello"]);
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.command, "PING");
    }

    #[test]
    fn test_decode_bare_terminators() {
        let mut codec = IrcCodec::default();
        let msgs = decode_all(&mut codec, b"PING :a\rPING :b\nPING :c\r\n");
        assert_eq!(msgs.len(), 3);
    }

    #[test]
    fn test_malformed_line_skipped() {
        let mut codec = IrcCodec::default();
        let msgs = decode_all(&mut codec, b":only.a.prefix\r\nPING :ok\r\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].command, "PING");
    }

    #[test]
    fn test_latin1_fallback() {
        let mut codec = IrcCodec::default();
        // 0xE9 is 'é' in Latin-1 and invalid UTF-8 on its own.
        let msgs = decode_all(&mut codec, b"PRIVMSG #c :caf\xe9\r\n");
        assert_eq!(msgs[0].params[1], "café");
    }

    #[test]
    fn test_overlong_line_discarded() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::new();
        buf.put_slice(&vec![b'a'; MAX_LINE_LEN + 100]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        // The next well-formed line still comes through.
        buf.put_slice(b"junktail\r\nPING :ok\r\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
    }

    #[test]
    fn test_decode_eof_flushes_unterminated() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::from(&b"PING :tail"[..]);
        let msg = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(msg.params, vec!["tail"]);
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Message::privmsg("#c", "hi"), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #c hi\r\n");
    }

    #[test]
    fn test_encode_rejects_overlong_body() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::new();
        let msg = Message::privmsg("#c", &"x".repeat(600));
        assert!(matches!(
            codec.encode(msg, &mut buf),
            Err(ProtocolError::MessageTooLong(_))
        ));
    }

    #[test]
    fn test_encode_allows_tags_beyond_body_budget() {
        let mut codec = IrcCodec::default();
        let mut buf = BytesMut::new();
        let msg = Message::privmsg("#c", "hi").with_tag("k", Some(&"v".repeat(600)));
        codec.encode(msg, &mut buf).unwrap();
        assert!(buf.len() > MAX_BODY_LEN);
    }

    #[test]
    fn test_latin1_encode() {
        let mut codec = IrcCodec::new(Encoding::Latin1);
        let mut buf = BytesMut::new();
        codec.encode(Message::privmsg("#c", "café"), &mut buf).unwrap();
        assert!(buf.ends_with(b"caf\xe9\r\n"));
    }
}
