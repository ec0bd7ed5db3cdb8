//! SASL authentication for capability negotiation.
//!
//! Provides the credential-encoding mechanisms (PLAIN, EXTERNAL) behind a
//! narrow [`Mechanism`] interface, plus the sans-IO [`SaslSession`] that
//! drives an AUTHENTICATE exchange: challenges in, base64-chunked
//! responses out.
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.2>
//! - RFC 4616 (PLAIN): <https://tools.ietf.org/html/rfc4616>

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Maximum length of a single AUTHENTICATE payload (400 bytes).
///
/// Longer responses are split across multiple AUTHENTICATE commands; a
/// response that is an exact multiple of this is terminated with `+`.
pub const SASL_CHUNK_SIZE: usize = 400;

/// The empty-payload marker.
pub const EMPTY_PAYLOAD: &str = "+";

/// The abort marker sent to cancel an exchange.
pub const ABORT_PAYLOAD: &str = "*";

/// Supported SASL mechanism names.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SaslMechanism {
    /// PLAIN (RFC 4616): username/password.
    Plain,
    /// EXTERNAL: authentication from the TLS client certificate.
    External,
    /// Unknown or unsupported mechanism.
    Unknown(String),
}

impl SaslMechanism {
    /// Parse a mechanism name string.
    pub fn parse(name: &str) -> SaslMechanism {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => SaslMechanism::Plain,
            "EXTERNAL" => SaslMechanism::External,
            _ => SaslMechanism::Unknown(name.to_owned()),
        }
    }

    /// The canonical name of this mechanism.
    pub fn as_str(&self) -> &str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::External => "EXTERNAL",
            SaslMechanism::Unknown(s) => s,
        }
    }
}

impl std::fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a comma-separated mechanism list (cap value or 908 reply).
pub fn parse_mechanisms(list: &str) -> Vec<SaslMechanism> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SaslMechanism::parse)
        .collect()
}

/// Encode credentials for the PLAIN mechanism:
/// `authzid NUL authcid NUL password`, base64.
pub fn encode_plain(authzid: &str, authcid: &str, password: &str) -> String {
    let payload = format!("{}\0{}\0{}", authzid, authcid, password);
    BASE64.encode(payload.as_bytes())
}

/// Encode an EXTERNAL response: the authorization identity, or `+` when
/// deferring to the certificate.
pub fn encode_external(authzid: Option<&str>) -> String {
    match authzid {
        Some(id) if !id.is_empty() => BASE64.encode(id.as_bytes()),
        _ => EMPTY_PAYLOAD.to_owned(),
    }
}

/// Decode a base64 AUTHENTICATE payload (`+` means empty).
pub fn decode_payload(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if encoded == EMPTY_PAYLOAD {
        return Ok(Vec::new());
    }
    BASE64.decode(encoded)
}

/// Split an encoded response into AUTHENTICATE payloads.
///
/// Produces at least one payload; appends `+` when the response length is
/// an exact non-zero multiple of [`SASL_CHUNK_SIZE`].
pub fn chunk_response(encoded: &str) -> Vec<String> {
    if encoded.is_empty() {
        return vec![EMPTY_PAYLOAD.to_owned()];
    }
    let mut chunks: Vec<String> = encoded
        .as_bytes()
        .chunks(SASL_CHUNK_SIZE)
        // base64 output is always ASCII
        .map(|chunk| std::str::from_utf8(chunk).unwrap().to_owned())
        .collect();
    if encoded.len() % SASL_CHUNK_SIZE == 0 {
        chunks.push(EMPTY_PAYLOAD.to_owned());
    }
    chunks
}

/// A credential encoder, fed the (possibly empty) server challenge.
///
/// Returning `None` aborts the exchange.
pub trait Mechanism: Send {
    /// Canonical mechanism name sent in `AUTHENTICATE <name>`.
    fn name(&self) -> &'static str;
    /// Produce the raw (pre-base64) response to a challenge.
    fn respond(&mut self, challenge: &[u8]) -> Option<Vec<u8>>;
}

/// PLAIN credentials.
pub struct Plain {
    pub authzid: String,
    pub authcid: String,
    pub password: String,
}

impl Mechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn respond(&mut self, _challenge: &[u8]) -> Option<Vec<u8>> {
        Some(format!("{}\0{}\0{}", self.authzid, self.authcid, self.password).into_bytes())
    }
}

/// EXTERNAL (TLS client certificate) identity assertion.
pub struct External {
    pub authzid: Option<String>,
}

impl Mechanism for External {
    fn name(&self) -> &'static str {
        "EXTERNAL"
    }

    fn respond(&mut self, _challenge: &[u8]) -> Option<Vec<u8>> {
        Some(
            self.authzid
                .clone()
                .map(String::into_bytes)
                .unwrap_or_default(),
        )
    }
}

/// State of an AUTHENTICATE exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaslState {
    /// `AUTHENTICATE <mech>` sent, awaiting the first challenge.
    MechanismSent,
    /// Mid-exchange: challenges and responses in flight.
    Exchanging,
    /// 903 received.
    Success,
    /// 904/905/906/907 received, or aborted.
    Failed,
}

/// What to do after feeding a server AUTHENTICATE payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaslFeed {
    /// Send these AUTHENTICATE payloads in order.
    Respond(Vec<String>),
    /// The challenge continues in further AUTHENTICATE lines; wait.
    Continue,
    /// The mechanism gave up; send [`ABORT_PAYLOAD`].
    Abort,
}

/// Sans-IO driver for one SASL exchange.
pub struct SaslSession {
    mechanism: Box<dyn Mechanism>,
    state: SaslState,
    challenge: Vec<u8>,
}

impl SaslSession {
    pub fn new(mechanism: Box<dyn Mechanism>) -> SaslSession {
        SaslSession {
            mechanism,
            state: SaslState::MechanismSent,
            challenge: Vec::new(),
        }
    }

    pub fn state(&self) -> SaslState {
        self.state
    }

    pub fn mechanism_name(&self) -> &'static str {
        self.mechanism.name()
    }

    /// Feed one server `AUTHENTICATE` payload.
    ///
    /// Payloads of exactly [`SASL_CHUNK_SIZE`] bytes signal a continued
    /// challenge; anything shorter completes it and triggers a response.
    pub fn feed(&mut self, payload: &str) -> SaslFeed {
        self.state = SaslState::Exchanging;

        if payload != EMPTY_PAYLOAD {
            match decode_payload(payload) {
                Ok(bytes) => self.challenge.extend_from_slice(&bytes),
                Err(_) => {
                    self.state = SaslState::Failed;
                    return SaslFeed::Abort;
                }
            }
        }
        if payload.len() == SASL_CHUNK_SIZE {
            return SaslFeed::Continue;
        }

        let challenge = std::mem::take(&mut self.challenge);
        match self.mechanism.respond(&challenge) {
            Some(response) => SaslFeed::Respond(chunk_response(&BASE64.encode(response))),
            None => {
                self.state = SaslState::Failed;
                SaslFeed::Abort
            }
        }
    }

    /// Mark the exchange finished from a result numeric.
    pub fn finish(&mut self, success: bool) {
        self.state = if success {
            SaslState::Success
        } else {
            SaslState::Failed
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_plain() {
        let encoded = encode_plain("", "testuser", "testpass");
        let decoded = BASE64.decode(&encoded).unwrap();
        assert_eq!(decoded, b"\0testuser\0testpass");
    }

    #[test]
    fn test_encode_plain_with_authzid() {
        let encoded = encode_plain("admin", "testuser", "testpass");
        let decoded = BASE64.decode(&encoded).unwrap();
        assert_eq!(decoded, b"admin\0testuser\0testpass");
    }

    #[test]
    fn test_encode_external() {
        assert_eq!(encode_external(None), "+");
        let encoded = encode_external(Some("myuser"));
        assert_eq!(BASE64.decode(&encoded).unwrap(), b"myuser");
    }

    #[test]
    fn test_parse_mechanisms() {
        let mechs = parse_mechanisms("PLAIN,EXTERNAL, SCRAM-SHA-256");
        assert_eq!(
            mechs,
            vec![
                SaslMechanism::Plain,
                SaslMechanism::External,
                SaslMechanism::Unknown("SCRAM-SHA-256".into()),
            ]
        );
    }

    #[test]
    fn test_chunking() {
        assert_eq!(chunk_response("abc"), vec!["abc"]);
        assert_eq!(chunk_response(""), vec!["+"]);

        let long = "a".repeat(500);
        let chunks = chunk_response(&long);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 400);
        assert_eq!(chunks[1].len(), 100);

        // An exact multiple needs the `+` terminator.
        let exact = "a".repeat(400);
        let chunks = chunk_response(&exact);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], "+");
    }

    #[test]
    fn test_decode_payload() {
        assert!(decode_payload("+").unwrap().is_empty());
        assert_eq!(decode_payload(&BASE64.encode(b"hello")).unwrap(), b"hello");
        assert!(decode_payload("!!not base64!!").is_err());
    }

    #[test]
    fn test_plain_session() {
        let mech = Plain {
            authzid: String::new(),
            authcid: "user".into(),
            password: "pass".into(),
        };
        let mut session = SaslSession::new(Box::new(mech));
        assert_eq!(session.state(), SaslState::MechanismSent);

        let feed = session.feed("+");
        let expected = encode_plain("", "user", "pass");
        assert_eq!(feed, SaslFeed::Respond(vec![expected]));

        session.finish(true);
        assert_eq!(session.state(), SaslState::Success);
    }

    #[test]
    fn test_continued_challenge() {
        let mech = External { authzid: None };
        let mut session = SaslSession::new(Box::new(mech));

        // A 400-byte payload means "more coming".
        let filler = BASE64.encode(vec![b'x'; 300]);
        assert_eq!(filler.len(), 400);
        assert_eq!(session.feed(&filler), SaslFeed::Continue);

        // The short final payload completes the challenge.
        match session.feed(&BASE64.encode(b"end")) {
            SaslFeed::Respond(chunks) => assert_eq!(chunks, vec!["+"]),
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_challenge_aborts() {
        let mech = Plain {
            authzid: String::new(),
            authcid: "u".into(),
            password: "p".into(),
        };
        let mut session = SaslSession::new(Box::new(mech));
        assert_eq!(session.feed("%%%"), SaslFeed::Abort);
        assert_eq!(session.state(), SaslState::Failed);
    }
}
