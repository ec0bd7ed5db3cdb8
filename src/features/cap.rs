//! Client-side capability negotiation (CAP LS/REQ/ACK/NAK/NEW/DEL).

use tracing::{debug, warn};

use crate::caps::{split_cap_token, CapRegistry, CapState};
use crate::core::{Action, Actions, ClientCore, ConnectionState};
use crate::event::Event;
use crate::message::Message;

use super::{CapDecision, CapOutcome, DispatchTable, Feature};

#[derive(Debug)]
pub struct CapFeature;

impl Feature for CapFeature {
    fn name(&self) -> &'static str {
        "cap"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["registration"]
    }

    fn register(&self, table: &mut DispatchTable) {
        table.on("CAP", on_cap);
        table.on("410", on_invalid_cap);
        table.on("421", on_maybe_no_cap);
        table.on("451", on_maybe_no_cap);
    }
}

fn on_cap(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let subcommand = msg.param(1).unwrap_or("").to_ascii_uppercase();
    match subcommand.as_str() {
        "LS" => on_cap_ls(core, msg, acts, false),
        "NEW" => on_cap_ls(core, msg, acts, true),
        "ACK" => on_cap_ack(core, msg, acts),
        "NAK" => on_cap_nak(core, msg, acts),
        "DEL" => on_cap_del(core, msg, acts),
        "LIST" => debug!(caps = msg.trailing().unwrap_or(""), "active capability list"),
        other => warn!(subcommand = other, "unknown CAP subcommand from server"),
    }
}

fn on_cap_ls(core: &mut ClientCore, msg: &Message, acts: &mut Actions, is_new: bool) {
    // Multi-line LS carries a `*` continuation marker before the list.
    let (continued, list) = if msg.param(2) == Some("*") {
        (true, msg.param(3).unwrap_or(""))
    } else {
        (false, msg.param(2).unwrap_or(""))
    };

    if !is_new {
        core.caps.saw_ls = true;
        core.caps.ls_in_progress = continued;
    }

    for token in list.split_whitespace() {
        let (_, name, value) = split_cap_token(token);
        core.caps.advertise(name, value);
    }

    if continued {
        return;
    }

    // Full list in hand: ask each feature whether it wants its caps.
    let available = core.caps_in_state(CapState::Available);

    let mut to_request: Vec<String> = Vec::new();
    for (name, value) in available {
        match core.cap_decision(&name, value.as_deref()) {
            CapDecision::Ignore => {}
            CapDecision::Request => {
                core.caps.set_state(&name, CapState::Requested);
                to_request.push(name);
            }
            CapDecision::RequestValue(v) => {
                core.caps.set_state(&name, CapState::Requested);
                to_request.push(format!("{}={}", name, v));
            }
        }
    }

    if to_request.is_empty() {
        core.maybe_end_negotiation(acts);
        return;
    }
    for line in CapRegistry::batch_requests(&to_request) {
        acts.push(Action::Send(Message::cmd("CAP", &["REQ", &line])));
    }
}

fn on_cap_ack(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let list = msg.param(2).unwrap_or("");
    for token in list.split_whitespace() {
        let (modifiers, name, _) = split_cap_token(token);

        if modifiers.contains('-') {
            core.caps.set_state(name, CapState::Disabled);
            core.cap_disabled_hook(name, acts);
            acts.push(Action::Emit(Event::CapabilityDisabled {
                name: name.to_string(),
            }));
            continue;
        }
        if modifiers.contains('=') {
            // Sticky: the server will not let us turn it off again.
            debug!(cap = name, "capability acknowledged as sticky");
        }
        if modifiers.contains('~') {
            acts.push(Action::Send(Message::cmd("CAP", &["ACK", name])));
        }

        match core.cap_enabled_outcome(name, acts) {
            CapOutcome::Negotiated => {
                core.caps.set_state(name, CapState::Enabled);
                acts.push(Action::Emit(Event::CapabilityEnabled {
                    name: name.to_string(),
                }));
            }
            CapOutcome::Negotiating => {
                core.caps.set_state(name, CapState::Negotiating);
            }
            CapOutcome::Failed => {
                warn!(cap = name, "capability unusable after ACK, disabling");
                core.caps.set_state(name, CapState::Requested);
                let removal = format!("-{}", name);
                acts.push(Action::Send(Message::cmd("CAP", &["REQ", &removal])));
            }
        }
    }
    core.maybe_end_negotiation(acts);
}

fn on_cap_nak(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let list = msg.param(2).unwrap_or("");
    for token in list.split_whitespace() {
        let (_, name, _) = split_cap_token(token);
        core.caps.set_state(name, CapState::Failed);
    }
    core.maybe_end_negotiation(acts);
}

fn on_cap_del(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let list = msg.param(2).unwrap_or("");
    for token in list.split_whitespace() {
        let (_, name, _) = split_cap_token(token);
        if core.caps.is_enabled(name) {
            core.cap_disabled_hook(name, acts);
            acts.push(Action::Emit(Event::CapabilityDisabled {
                name: name.to_string(),
            }));
        }
        core.caps.remove(name);
    }
}

/// 410: invalid CAP subcommand. Abort negotiation and register anyway.
fn on_invalid_cap(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    warn!(
        subcommand = msg.param(1).unwrap_or(""),
        "server rejected CAP subcommand, aborting negotiation"
    );
    core.fail_unsettled_caps();
    if core.connection == ConnectionState::Capability {
        if core.caps.saw_ls {
            core.maybe_end_negotiation(acts);
        } else {
            core.begin_registration(acts);
        }
    }
}

/// 421/451 in response to CAP: the server predates capability
/// negotiation; move straight to NICK/USER.
fn on_maybe_no_cap(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    if core.connection != ConnectionState::Capability {
        return;
    }
    if msg.params.iter().any(|p| p == "CAP") {
        debug!("server does not support CAP, registering directly");
        core.begin_registration(acts);
    }
}
