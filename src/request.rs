//! Pending request accumulators.
//!
//! WHOIS and WHOWAS answers arrive spread over several numerics; a pending
//! request collects them until the terminating numeric resolves it. The
//! sans-IO core owns the accumulators; the async driver owns the waiting
//! side (a oneshot per request, with its timeout).

use std::collections::HashMap;

/// What a request resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    /// WHOIS finished; the accumulated info.
    Whois(Option<WhoisInfo>),
    /// WHOWAS finished; the accumulated info.
    Whowas(Option<WhowasInfo>),
}

/// The kind half of a request key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Whois,
    Whowas,
}

/// Key for a pending request: kind plus normalized nickname.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub kind: RequestKind,
    pub nick: String,
}

/// Accumulated WHOIS data (numerics 311/312/313/317/319/330/671).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WhoisInfo {
    pub nickname: String,
    pub username: Option<String>,
    pub hostname: Option<String>,
    pub realname: Option<String>,
    pub server: Option<String>,
    pub server_info: Option<String>,
    pub oper: bool,
    pub idle: u64,
    pub away: bool,
    pub away_message: Option<String>,
    pub account: Option<String>,
    pub secure: bool,
    pub channels: Vec<String>,
}

/// Accumulated WHOWAS data (numeric 314).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WhowasInfo {
    pub nickname: String,
    pub username: Option<String>,
    pub hostname: Option<String>,
    pub realname: Option<String>,
    pub server: Option<String>,
}

/// The sans-IO side of the pending request table.
#[derive(Clone, Debug, Default)]
pub struct PendingRequests {
    whois: HashMap<String, WhoisInfo>,
    whowas: HashMap<String, WhowasInfo>,
}

impl PendingRequests {
    /// Begin accumulating for a WHOIS. Returns false when one is already
    /// pending for this nick (the existing one will serve both waiters).
    pub fn begin_whois(&mut self, nick_key: &str, display: &str) -> bool {
        if self.whois.contains_key(nick_key) {
            return false;
        }
        self.whois.insert(
            nick_key.to_string(),
            WhoisInfo {
                nickname: display.to_string(),
                ..WhoisInfo::default()
            },
        );
        true
    }

    pub fn begin_whowas(&mut self, nick_key: &str, display: &str) -> bool {
        if self.whowas.contains_key(nick_key) {
            return false;
        }
        self.whowas.insert(
            nick_key.to_string(),
            WhowasInfo {
                nickname: display.to_string(),
                ..WhowasInfo::default()
            },
        );
        true
    }

    pub fn whois_mut(&mut self, nick_key: &str) -> Option<&mut WhoisInfo> {
        self.whois.get_mut(nick_key)
    }

    pub fn whowas_mut(&mut self, nick_key: &str) -> Option<&mut WhowasInfo> {
        self.whowas.get_mut(nick_key)
    }

    pub fn has_whois(&self, nick_key: &str) -> bool {
        self.whois.contains_key(nick_key)
    }

    /// Resolve a WHOIS (318, or 401 with `found = false`).
    pub fn finish_whois(&mut self, nick_key: &str, found: bool) -> Option<RequestOutcome> {
        let info = self.whois.remove(nick_key)?;
        Some(RequestOutcome::Whois(found.then_some(info)))
    }

    /// Resolve a WHOWAS (369, or 406 with `found = false`).
    pub fn finish_whowas(&mut self, nick_key: &str, found: bool) -> Option<RequestOutcome> {
        let info = self.whowas.remove(nick_key)?;
        Some(RequestOutcome::Whowas(found.then_some(info)))
    }

    /// Drop everything (disconnect); the driver fails the waiters.
    pub fn clear(&mut self) {
        self.whois.clear();
        self.whowas.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whois_accumulation() {
        let mut pending = PendingRequests::default();
        assert!(pending.begin_whois("nick", "Nick"));
        assert!(!pending.begin_whois("nick", "Nick"));

        {
            let info = pending.whois_mut("nick").unwrap();
            info.username = Some("u".into());
            info.oper = true;
            info.idle = 42;
        }

        match pending.finish_whois("nick", true).unwrap() {
            RequestOutcome::Whois(Some(info)) => {
                assert_eq!(info.nickname, "Nick");
                assert_eq!(info.username.as_deref(), Some("u"));
                assert!(info.oper);
                assert_eq!(info.idle, 42);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(pending.finish_whois("nick", true).is_none());
    }

    #[test]
    fn test_whois_not_found() {
        let mut pending = PendingRequests::default();
        pending.begin_whois("ghost", "ghost");
        assert_eq!(
            pending.finish_whois("ghost", false),
            Some(RequestOutcome::Whois(None))
        );
    }

    #[test]
    fn test_whowas() {
        let mut pending = PendingRequests::default();
        pending.begin_whowas("gone", "Gone");
        pending.whowas_mut("gone").unwrap().hostname = Some("h".into());
        match pending.finish_whowas("gone", true).unwrap() {
            RequestOutcome::Whowas(Some(info)) => {
                assert_eq!(info.hostname.as_deref(), Some("h"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
