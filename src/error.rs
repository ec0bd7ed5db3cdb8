//! Error types for the IRC client library.
//!
//! Protocol-level errors, message parsing failures, and caller-facing
//! client errors live here.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Message exceeded the allowed length on encode.
    #[error("message too long: {0} bytes")]
    MessageTooLong(usize),

    /// A line could not be parsed as an IRC message.
    ///
    /// The transport loop logs and skips such lines; the stream survives.
    #[error("malformed line: {string}")]
    MalformedLine {
        /// The offending raw line.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },

    /// The peer closed the connection.
    #[error("transport closed by peer")]
    TransportClosed,

    /// TLS or transport configuration was unusable.
    #[error("transport configuration error: {0}")]
    Config(String),
}

/// Errors encountered when parsing IRC messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// Command was invalid or missing.
    #[error("invalid command")]
    InvalidCommand,

    /// More than the 15 parameters RFC 1459 allows.
    #[error("too many parameters: {0}")]
    TooManyParameters(usize),

    /// A non-trailing parameter contained a space or leading ':'.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid message prefix.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Malformed tag segment.
    #[error("invalid tags: {0}")]
    InvalidTags(String),
}

/// Caller-facing client errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Tried to act on a channel we have not joined.
    #[error("not in channel: {0}")]
    NotInChannel(String),

    /// Tried to join a channel we are already in.
    #[error("already in channel: {0}")]
    AlreadyInChannel(String),

    /// A pending request expired before the server answered.
    #[error("request timed out")]
    Timeout,

    /// The connection went away while a request was pending.
    #[error("disconnected")]
    Disconnected,

    /// The driver task is gone (client dropped or shut down).
    #[error("client is closed")]
    Closed,

    /// Registration could not complete (password, ban, nickname pool).
    #[error("registration failed: {0}")]
    RegistrationFailed(String),

    /// SASL failed and `sasl_required` was set.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Failure to linearize a feature set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeatureOrderError {
    /// The declared dependencies admit no consistent linearization.
    #[error("inconsistent feature order at {0}")]
    Inconsistent(String),

    /// A feature depends on one that was not supplied.
    #[error("unknown feature dependency: {0}")]
    UnknownDependency(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::MessageTooLong(1024);
        assert_eq!(format!("{}", err), "message too long: 1024 bytes");

        let err = MessageParseError::TooManyParameters(17);
        assert_eq!(format!("{}", err), "too many parameters: 17");

        let err = ClientError::NotInChannel("#rust".into());
        assert_eq!(format!("{}", err), "not in channel: #rust");
    }

    #[test]
    fn test_error_source_chaining() {
        let parse_err = MessageParseError::InvalidCommand;
        let protocol_err = ProtocolError::MalformedLine {
            string: "@@bogus".to_string(),
            cause: parse_err.clone(),
        };

        let source = std::error::Error::source(&protocol_err);
        assert!(source.is_some());
        assert_eq!(source.unwrap().to_string(), parse_err.to_string());
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let protocol_err: ProtocolError = io_err.into();
        assert!(matches!(protocol_err, ProtocolError::Io(_)));
    }
}
