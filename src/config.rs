//! Client configuration surface.

use std::path::PathBuf;
use std::time::Duration;

use crate::irc::Encoding;

/// Default inbound-idle threshold before a PING probe is sent.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(180);

/// Default timeout for pending WHOIS/WHOWAS requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a stalled SASL exchange.
pub const DEFAULT_SASL_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one client.
#[derive(Clone, Debug)]
pub struct Config {
    /// Primary nickname used at registration.
    pub nickname: String,
    /// Ordered alternatives tried on 433 before random suffixes.
    pub fallback_nicknames: Vec<String>,
    /// USER ident; defaults to the lowercased nickname.
    pub username: Option<String>,
    /// USER realname; defaults to the nickname.
    pub realname: Option<String>,
    /// PASS sent before NICK.
    pub password: Option<String>,
    /// Channels joined automatically after registration.
    pub autojoin: Vec<String>,
    /// QUIT message when none is given.
    pub quit_message: String,

    pub tls: bool,
    pub tls_verify: bool,
    pub tls_client_cert: Option<PathBuf>,
    pub tls_client_cert_key: Option<PathBuf>,
    pub tls_client_cert_password: Option<String>,
    pub encoding: Encoding,

    /// Explicit SASL mechanism name; inferred from the other credentials
    /// when unset.
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// Authorization identity for PLAIN/EXTERNAL; usually empty.
    pub sasl_identity: String,
    /// Disconnect instead of continuing unauthenticated when SASL fails.
    pub sasl_required: bool,

    pub ping_timeout: Duration,
    pub request_timeout: Duration,
    pub sasl_timeout: Duration,
}

impl Config {
    pub fn new(nickname: impl Into<String>) -> Config {
        Config {
            nickname: nickname.into(),
            fallback_nicknames: Vec::new(),
            username: None,
            realname: None,
            password: None,
            autojoin: Vec::new(),
            quit_message: "Quitting".to_string(),
            tls: false,
            tls_verify: true,
            tls_client_cert: None,
            tls_client_cert_key: None,
            tls_client_cert_password: None,
            encoding: Encoding::default(),
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            sasl_identity: String::new(),
            sasl_required: false,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            sasl_timeout: DEFAULT_SASL_TIMEOUT,
        }
    }

    /// The USER ident to register with.
    pub fn effective_username(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| self.nickname.to_ascii_lowercase())
    }

    /// The realname to register with.
    pub fn effective_realname(&self) -> String {
        self.realname.clone().unwrap_or_else(|| self.nickname.clone())
    }

    /// Whether enough SASL material is configured to attempt it.
    pub fn wants_sasl(&self) -> bool {
        self.sasl_mechanism.is_some()
            || (self.sasl_username.is_some() && self.sasl_password.is_some())
            || self.tls_client_cert.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_derive_from_nickname() {
        let config = Config::new("MyBot");
        assert_eq!(config.effective_username(), "mybot");
        assert_eq!(config.effective_realname(), "MyBot");
        assert!(!config.wants_sasl());
        assert!(config.tls_verify);
    }

    #[test]
    fn test_wants_sasl() {
        let mut config = Config::new("n");
        config.sasl_username = Some("u".into());
        assert!(!config.wants_sasl());
        config.sasl_password = Some("p".into());
        assert!(config.wants_sasl());

        let mut config = Config::new("n");
        config.tls_client_cert = Some("/cert.pem".into());
        assert!(config.wants_sasl());
    }
}
