//! The sans-IO protocol core.
//!
//! [`ClientCore`] consumes parsed messages and produces [`Action`]s; it
//! performs no I/O and holds no timers, which keeps every protocol rule
//! unit-testable without a network. The async driver in [`crate::client`]
//! owns the transport and executes the actions.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, warn};

use crate::caps::{CapRegistry, CapState};
use crate::config::Config;
use crate::error::FeatureOrderError;
use crate::event::Event;
use crate::features::{self, CapDecision, CapOutcome, DispatchTable, Feature};
use crate::isupport::ProtocolParameters;
use crate::message::Message;
use crate::request::{PendingRequests, RequestKey, RequestKind, RequestOutcome};
use crate::sasl::SaslSession;
use crate::state::NetworkState;

/// Connection lifecycle states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// Transport up; CAP LS sent, negotiating capabilities.
    Capability,
    /// CAP flow done (or absent); NICK/USER sent, awaiting 001.
    Registering,
    Registered,
    Reconnecting,
    Closing,
}

/// An instruction from the core to the driver.
#[derive(Debug)]
pub enum Action {
    /// Write on the bypass lane (protocol plumbing; never throttled).
    Send(Message),
    /// Write on the throttled chat lane.
    SendThrottled(Message),
    /// Deliver an event to the application.
    Emit(Event),
    /// Resolve a pending request.
    CompleteRequest(RequestKey, RequestOutcome),
    /// Arm (`true`) or disarm the SASL exchange timer.
    SaslTimer(bool),
    /// Tear the connection down. `expected` is false for protocol-forced
    /// closes (ERROR, KILL, exhausted registration).
    Disconnect { expected: bool },
}

/// Action buffer handed to handlers.
pub type Actions = Vec<Action>;

/// Sans-IO client protocol state machine.
pub struct ClientCore {
    pub config: Config,
    pub connection: ConnectionState,
    pub params: ProtocolParameters,
    pub caps: CapRegistry,
    pub sasl: Option<SaslSession>,
    pub state: NetworkState,
    pub pending: PendingRequests,
    /// Our user modes, as last told by the server.
    pub user_modes: Vec<char>,

    /// Nicknames not yet tried this registration.
    pub(crate) attempt_nicknames: Vec<String>,
    pub(crate) registration_attempts: u32,
    /// MOTD under accumulation (completed copy lives in `state.motd`).
    pub(crate) motd_partial: Option<String>,

    table: Arc<DispatchTable>,
}

impl ClientCore {
    /// Build a core with the full built-in feature set.
    pub fn new(config: Config) -> ClientCore {
        Self::with_features(config, features::all_features())
            .expect("built-in feature set linearizes")
    }

    /// Build a core with an explicit feature set.
    pub fn with_features(
        config: Config,
        feature_set: Vec<Box<dyn Feature>>,
    ) -> Result<ClientCore, FeatureOrderError> {
        let linearized = features::featurize(feature_set)?;
        let table = Arc::new(features::build_table(&linearized));

        let mut core = ClientCore {
            config,
            connection: ConnectionState::Disconnected,
            params: ProtocolParameters::default(),
            caps: CapRegistry::new(),
            sasl: None,
            state: NetworkState::new(),
            pending: PendingRequests::default(),
            user_modes: Vec::new(),
            attempt_nicknames: Vec::new(),
            registration_attempts: 0,
            motd_partial: None,
            table,
        };
        core.reset_connection_state();
        Ok(core)
    }

    fn reset_connection_state(&mut self) {
        self.params = ProtocolParameters::default();
        self.caps = CapRegistry::new();
        self.sasl = None;
        self.state.reset();
        self.pending.clear();
        self.user_modes.clear();
        self.motd_partial = None;
        self.attempt_nicknames = std::iter::once(self.config.nickname.clone())
            .chain(self.config.fallback_nicknames.iter().cloned())
            .collect();
        self.registration_attempts = 0;
        self.state.nickname = self.config.nickname.clone();
    }

    pub fn registered(&self) -> bool {
        self.connection == ConnectionState::Registered
    }

    /// Transport is up: begin the handshake.
    ///
    /// Registration commands are never throttled; flooding rules do not
    /// apply before 001 on any ircd that matters.
    pub fn start(&mut self) -> Actions {
        self.reset_connection_state();
        self.connection = ConnectionState::Capability;

        let mut acts = Actions::new();
        if let Some(password) = self.config.password.clone() {
            acts.push(Action::Send(Message::cmd("PASS", &[&password])));
        }
        acts.push(Action::Send(Message::cmd("CAP", &["LS", "302"])));
        acts
    }

    /// The transport dropped out from under us.
    pub fn connection_lost(&mut self) -> Actions {
        self.connection = ConnectionState::Disconnected;
        self.reset_connection_state();
        vec![Action::Emit(Event::Disconnect { expected: false })]
    }

    /// User-initiated disconnect completed.
    pub fn closed(&mut self) -> Actions {
        self.connection = ConnectionState::Disconnected;
        self.reset_connection_state();
        vec![Action::Emit(Event::Disconnect { expected: true })]
    }

    /// Dispatch one inbound message through the handler table.
    pub fn handle_message(&mut self, msg: &Message) -> Actions {
        let mut acts = Actions::new();
        acts.push(Action::Emit(Event::Raw(msg.clone())));

        match self.table.clone().handlers_for(&msg.command) {
            Some(handlers) => {
                for handler in handlers {
                    handler(self, msg, &mut acts);
                }
            }
            None => {
                if msg.is_numeric() {
                    debug!(numeric = %msg.command, "unhandled numeric");
                } else {
                    warn!(command = %msg.command, "unknown command");
                }
                acts.push(Action::Emit(Event::Unknown(msg.clone())));
            }
        }
        acts
    }

    // Registration plumbing, shared between features.

    /// Send NICK/USER and move to REGISTERING. Idempotent per connection.
    pub(crate) fn begin_registration(&mut self, acts: &mut Actions) {
        if !matches!(self.connection, ConnectionState::Capability) {
            return;
        }
        self.connection = ConnectionState::Registering;
        self.registration_attempts += 1;

        let nickname = self.next_attempt_nickname();
        self.state.nickname = nickname.clone();
        acts.push(Action::Send(Message::cmd("NICK", &[&nickname])));
        acts.push(Action::Send(Message::cmd(
            "USER",
            &[
                &self.config.effective_username(),
                "0",
                "*",
                &self.config.effective_realname(),
            ],
        )));
    }

    /// Next nickname to try: the configured pool, then random suffixes.
    pub(crate) fn next_attempt_nickname(&mut self) -> String {
        if !self.attempt_nicknames.is_empty() {
            return self.attempt_nicknames.remove(0);
        }
        let suffix: u16 = rand::thread_rng().gen_range(100..1000);
        format!("{}{}", self.config.nickname, suffix)
    }

    /// Registration finished (001 or any other completion numeric).
    /// Idempotent: fires `Connect` and the autojoins exactly once.
    pub(crate) fn registration_completed(&mut self, acts: &mut Actions) {
        if self.connection == ConnectionState::Registered {
            return;
        }
        self.connection = ConnectionState::Registered;
        acts.push(Action::Emit(Event::Connect));
        for channel in self.config.autojoin.clone() {
            acts.push(Action::Send(Message::cmd("JOIN", &[&channel])));
        }
    }

    // Capability plumbing.

    /// Consult the feature hooks for an advertised capability.
    pub(crate) fn cap_decision(&mut self, name: &str, value: Option<&str>) -> CapDecision {
        match self.table.clone().cap_hooks(name) {
            Some(hooks) => (hooks.available)(self, value),
            None => CapDecision::Ignore,
        }
    }

    /// Run the enabled hook for an ACKed capability.
    pub(crate) fn cap_enabled_outcome(&mut self, name: &str, acts: &mut Actions) -> CapOutcome {
        match self.table.clone().cap_hooks(name) {
            Some(hooks) => (hooks.enabled)(self, acts),
            None => CapOutcome::Negotiated,
        }
    }

    /// Run the disabled hook for a withdrawn capability.
    pub(crate) fn cap_disabled_hook(&mut self, name: &str, acts: &mut Actions) {
        if let Some(hooks) = self.table.clone().cap_hooks(name) {
            (hooks.disabled)(self, acts);
        }
    }

    /// Names and values of capabilities currently in the given state.
    pub(crate) fn caps_in_state(&self, state: CapState) -> Vec<(String, Option<String>)> {
        self.caps
            .iter()
            .filter(|(_, cap)| cap.state == state)
            .map(|(name, cap)| (name.clone(), cap.value.clone()))
            .collect()
    }

    /// Give up on anything still in flight (410 abort).
    pub(crate) fn fail_unsettled_caps(&mut self) {
        let unsettled: Vec<String> = self
            .caps
            .iter()
            .filter(|(_, cap)| {
                matches!(cap.state, CapState::Requested | CapState::Negotiating)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in unsettled {
            self.caps.set_state(&name, CapState::Failed);
        }
        self.caps.ls_in_progress = false;
    }

    /// Resolve a deferred capability negotiation. A feature that returned
    /// `Negotiating` from its enabled hook calls this once its exchange
    /// settles; negotiation ends when nothing is left in flight.
    pub fn capability_negotiated(&mut self, name: &str, success: bool, acts: &mut Actions) {
        let new_state = if success {
            CapState::Enabled
        } else {
            CapState::Failed
        };
        self.caps.set_state(name, new_state);
        acts.push(Action::Emit(if success {
            Event::CapabilityEnabled { name: name.to_string() }
        } else {
            Event::CapabilityDisabled { name: name.to_string() }
        }));
        self.maybe_end_negotiation(acts);
    }

    /// Emit CAP END exactly once, when every capability settled.
    pub(crate) fn maybe_end_negotiation(&mut self, acts: &mut Actions) {
        if self.caps.end_sent || !self.caps.saw_ls || !self.caps.settled() {
            return;
        }
        if self.connection != ConnectionState::Capability {
            return;
        }
        self.caps.end_sent = true;
        acts.push(Action::Send(Message::cmd("CAP", &["END"])));
        self.begin_registration(acts);
    }

    /// The driver's SASL timer fired.
    pub fn sasl_timeout(&mut self) -> Actions {
        let mut acts = Actions::new();
        if let Some(session) = &mut self.sasl {
            warn!(mechanism = session.mechanism_name(), "SASL exchange timed out, aborting");
            session.finish(false);
            acts.push(Action::Send(Message::cmd(
                "AUTHENTICATE",
                &[crate::sasl::ABORT_PAYLOAD],
            )));
            self.capability_negotiated("sasl", false, &mut acts);
        }
        acts
    }

    // Request plumbing (driven by the client API).

    /// Start a WHOIS; emits the query unless one is already pending.
    pub fn begin_whois(&mut self, nick: &str, acts: &mut Actions) -> RequestKey {
        let key = RequestKey {
            kind: RequestKind::Whois,
            nick: self.state.normalize(nick),
        };
        if self.pending.begin_whois(&key.nick, nick) {
            acts.push(Action::Send(Message::cmd("WHOIS", &[nick])));
        }
        key
    }

    /// Start a WHOWAS; emits the query unless one is already pending.
    pub fn begin_whowas(&mut self, nick: &str, acts: &mut Actions) -> RequestKey {
        let key = RequestKey {
            kind: RequestKind::Whowas,
            nick: self.state.normalize(nick),
        };
        if self.pending.begin_whowas(&key.nick, nick) {
            acts.push(Action::Send(Message::cmd("WHOWAS", &[nick])));
        }
        key
    }

    /// Start monitoring a nickname. Returns whether the server supports
    /// MONITOR at all.
    pub fn monitor(&mut self, nick: &str, acts: &mut Actions) -> bool {
        if self.params.monitor.is_none() {
            return false;
        }
        let key = self.state.normalize(nick);
        if self.state.monitored.insert(key) {
            acts.push(Action::Send(Message::cmd("MONITOR", &["+", nick])));
        }
        true
    }

    /// Stop monitoring a nickname.
    pub fn unmonitor(&mut self, nick: &str, acts: &mut Actions) -> bool {
        if self.params.monitor.is_none() {
            return false;
        }
        let key = self.state.normalize(nick);
        if self.state.monitored.remove(&key) {
            acts.push(Action::Send(Message::cmd("MONITOR", &["-", nick])));
            // The user may now be unobservable.
            self.state.destroy_user(nick, None);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> ClientCore {
        ClientCore::new(Config::new("MyBot"))
    }

    fn wire_lines(acts: &Actions) -> Vec<String> {
        acts.iter()
            .filter_map(|a| match a {
                Action::Send(m) | Action::SendThrottled(m) => Some(m.to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_sends_cap_ls() {
        let mut core = core();
        let acts = core.start();
        assert_eq!(wire_lines(&acts), vec!["CAP LS 302"]);
        assert_eq!(core.connection, ConnectionState::Capability);
    }

    #[test]
    fn test_start_sends_pass_first() {
        let mut config = Config::new("MyBot");
        config.password = Some("hunter2".into());
        let mut core = ClientCore::new(config);
        let acts = core.start();
        assert_eq!(wire_lines(&acts), vec!["PASS hunter2", "CAP LS 302"]);
    }

    #[test]
    fn test_nickname_pool_then_random_suffix() {
        let mut config = Config::new("MyBot");
        config.fallback_nicknames = vec!["MyBot_".into(), "MyBotX".into()];
        let mut core = ClientCore::new(config);
        core.start();
        assert_eq!(core.next_attempt_nickname(), "MyBot");
        assert_eq!(core.next_attempt_nickname(), "MyBot_");
        assert_eq!(core.next_attempt_nickname(), "MyBotX");
        let random = core.next_attempt_nickname();
        assert!(random.starts_with("MyBot"));
        assert!(random.len() > "MyBot".len());
    }

    #[test]
    fn test_unknown_command_emits_event() {
        let mut core = core();
        core.start();
        let msg: Message = ":srv WIBBLE foo".parse().unwrap();
        let acts = core.handle_message(&msg);
        assert!(acts
            .iter()
            .any(|a| matches!(a, Action::Emit(Event::Unknown(_)))));
    }

    #[test]
    fn test_monitor_requires_isupport() {
        let mut core = core();
        core.start();
        let mut acts = Actions::new();
        assert!(!core.monitor("friend", &mut acts));

        core.params.apply_token("MONITOR", Some("100"));
        assert!(core.monitor("friend", &mut acts));
        assert_eq!(wire_lines(&acts), vec!["MONITOR + friend"]);
        // Monitoring twice sends nothing new.
        let mut more = Actions::new();
        assert!(core.monitor("friend", &mut more));
        assert!(wire_lines(&more).is_empty());
    }
}
