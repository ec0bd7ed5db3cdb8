//! IRCv3 capability negotiation state.
//!
//! Tracks the server-advertised capability set and the per-capability
//! negotiation state on the client side. The CAP message flow itself is
//! driven by the `cap` feature; this module owns the bookkeeping.
//!
//! # Reference
//! - IRCv3 Capability Negotiation: <https://ircv3.net/specs/extensions/capability-negotiation>

use std::collections::HashMap;

/// Modifier prefixes a capability token may carry in ACK lines.
const MODIFIER_PREFIXES: &[char] = &['-', '~', '='];

/// Maximum octets of capability names batched into one `CAP REQ` line.
pub const REQ_LINE_BUDGET: usize = 510;

/// Negotiation state of a single capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapState {
    /// Advertised by the server, not requested.
    Available,
    /// Requested, awaiting ACK/NAK.
    Requested,
    /// ACKed and fully negotiated.
    Enabled,
    /// ACKed but a feature still has work to do (e.g. SASL exchange).
    Negotiating,
    /// NAKed, or negotiation failed after ACK.
    Failed,
    /// Explicitly disabled (CAP DEL, or `-cap` ACK).
    Disabled,
}

/// A capability as seen by this client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cap {
    /// Server-supplied value (`sasl=PLAIN,EXTERNAL` and friends).
    pub value: Option<String>,
    /// Current negotiation state.
    pub state: CapState,
}

/// Split a capability token into (modifiers, name, value).
///
/// `-sasl` yields `("-", "sasl", None)`; `cap=v` yields `("", "cap", Some("v"))`.
pub fn split_cap_token(token: &str) -> (&str, &str, Option<&str>) {
    let name_start = token
        .find(|c| !MODIFIER_PREFIXES.contains(&c))
        .unwrap_or(token.len());
    let (modifiers, rest) = token.split_at(name_start);
    match rest.split_once('=') {
        Some((name, value)) => (modifiers, name, Some(value)),
        None => (modifiers, rest, None),
    }
}

/// Capability registry for one connection.
#[derive(Clone, Debug, Default)]
pub struct CapRegistry {
    caps: HashMap<String, Cap>,
    /// Whether any CAP LS reply has been seen this connection.
    pub saw_ls: bool,
    /// Whether a multi-line LS is still being continued.
    pub ls_in_progress: bool,
    /// Whether CAP END has been emitted.
    pub end_sent: bool,
}

impl CapRegistry {
    pub fn new() -> CapRegistry {
        CapRegistry::default()
    }

    /// Record a server-advertised capability. Returns `true` when it was
    /// not seen before on this connection.
    pub fn advertise(&mut self, name: &str, value: Option<&str>) -> bool {
        let name = name.to_ascii_lowercase();
        if self.caps.contains_key(&name) {
            return false;
        }
        self.caps.insert(
            name,
            Cap {
                value: value.map(String::from),
                state: CapState::Available,
            },
        );
        true
    }

    pub fn get(&self, name: &str) -> Option<&Cap> {
        self.caps.get(&name.to_ascii_lowercase())
    }

    pub fn state(&self, name: &str) -> Option<CapState> {
        self.get(name).map(|c| c.state)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.state(name) == Some(CapState::Enabled)
    }

    pub fn set_state(&mut self, name: &str, state: CapState) {
        let name = name.to_ascii_lowercase();
        self.caps
            .entry(name)
            .or_insert(Cap {
                value: None,
                state,
            })
            .state = state;
    }

    /// Remove a capability entirely (CAP DEL).
    pub fn remove(&mut self, name: &str) -> bool {
        self.caps.remove(&name.to_ascii_lowercase()).is_some()
    }

    /// Iterate over (name, cap) entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Cap)> {
        self.caps.iter()
    }

    /// Whether negotiation has settled: nothing requested, nothing still
    /// negotiating.
    pub fn settled(&self) -> bool {
        !self.ls_in_progress
            && !self
                .caps
                .values()
                .any(|c| matches!(c.state, CapState::Requested | CapState::Negotiating))
    }

    /// Batch requested capability tokens into `CAP REQ` payloads no longer
    /// than [`REQ_LINE_BUDGET`] octets each, preserving order.
    pub fn batch_requests(tokens: &[String]) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();
        let mut current = String::new();
        for token in tokens {
            if !current.is_empty() && current.len() + 1 + token.len() > REQ_LINE_BUDGET {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(token);
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_cap_token() {
        assert_eq!(split_cap_token("sasl"), ("", "sasl", None));
        assert_eq!(split_cap_token("sasl=PLAIN"), ("", "sasl", Some("PLAIN")));
        assert_eq!(split_cap_token("-sasl"), ("-", "sasl", None));
        assert_eq!(split_cap_token("~account-notify"), ("~", "account-notify", None));
        assert_eq!(split_cap_token("=sticky"), ("=", "sticky", None));
    }

    #[test]
    fn test_advertise_dedup() {
        let mut reg = CapRegistry::new();
        assert!(reg.advertise("sasl", Some("PLAIN")));
        assert!(!reg.advertise("SASL", None));
        assert_eq!(reg.get("sasl").unwrap().value.as_deref(), Some("PLAIN"));
    }

    #[test]
    fn test_settled() {
        let mut reg = CapRegistry::new();
        assert!(reg.settled());

        reg.advertise("multi-prefix", None);
        assert!(reg.settled());

        reg.set_state("multi-prefix", CapState::Requested);
        assert!(!reg.settled());

        reg.set_state("multi-prefix", CapState::Enabled);
        assert!(reg.settled());

        reg.set_state("sasl", CapState::Negotiating);
        assert!(!reg.settled());

        reg.ls_in_progress = true;
        reg.set_state("sasl", CapState::Failed);
        assert!(!reg.settled());
    }

    #[test]
    fn test_batch_requests_stays_under_budget() {
        let tokens: Vec<String> = (0..100).map(|i| format!("vendor/cap-{:03}", i)).collect();
        let lines = CapRegistry::batch_requests(&tokens);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.len() <= REQ_LINE_BUDGET);
        }
        // Order preserved across batches.
        let joined: Vec<&str> = lines.iter().flat_map(|l| l.split(' ')).collect();
        let expected: Vec<String> = tokens.clone();
        assert_eq!(joined, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_batch_requests_single_line() {
        let tokens = vec!["sasl".to_string(), "multi-prefix".to_string()];
        assert_eq!(CapRegistry::batch_requests(&tokens), vec!["sasl multi-prefix"]);
    }
}
