//! SASL authentication, driven inside capability negotiation.

use tracing::{debug, warn};

use crate::core::{Action, Actions, ClientCore};
use crate::message::Message;
use crate::sasl::{
    self, External, Mechanism, Plain, SaslFeed, SaslMechanism, SaslSession, ABORT_PAYLOAD,
};

use super::{CapDecision, CapHooks, CapOutcome, DispatchTable, Feature};

#[derive(Debug)]
pub struct SaslFeature;

impl Feature for SaslFeature {
    fn name(&self) -> &'static str {
        "sasl"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["cap"]
    }

    fn register(&self, table: &mut DispatchTable) {
        table.cap(
            "sasl",
            CapHooks {
                available: sasl_available,
                enabled: sasl_enabled,
                disabled: sasl_disabled,
            },
        );
        table.on("AUTHENTICATE", on_authenticate);
        table.on("900", on_logged_in);
        table.on("903", on_success);
        table.on("904", on_failure);
        table.on("905", on_failure);
        table.on("906", on_failure);
        table.on("907", on_failure);
        table.on("908", on_mechanism_list);
    }
}

fn sasl_available(core: &mut ClientCore, _value: Option<&str>) -> CapDecision {
    if core.config.wants_sasl() {
        CapDecision::Request
    } else {
        CapDecision::Ignore
    }
}

/// Pick the mechanism from the configuration (and the cap value's
/// mechanism list, under CAP 302) and open the exchange.
fn sasl_enabled(core: &mut ClientCore, acts: &mut Actions) -> CapOutcome {
    let advertised: Option<Vec<SaslMechanism>> = core
        .caps
        .get("sasl")
        .and_then(|cap| cap.value.as_deref())
        .filter(|v| !v.is_empty())
        .map(sasl::parse_mechanisms);

    let mechanism: Box<dyn Mechanism> = match chosen_mechanism(core) {
        Some(m) => m,
        None => {
            warn!("sasl capability enabled but no usable credentials configured");
            return CapOutcome::Failed;
        }
    };

    if let Some(advertised) = &advertised {
        let name = SaslMechanism::parse(mechanism.name());
        if !advertised.contains(&name) {
            warn!(
                mechanism = mechanism.name(),
                "server does not advertise our SASL mechanism"
            );
            return CapOutcome::Failed;
        }
    }

    acts.push(Action::Send(Message::cmd("AUTHENTICATE", &[mechanism.name()])));
    acts.push(Action::SaslTimer(true));
    core.sasl = Some(SaslSession::new(mechanism));
    CapOutcome::Negotiating
}

fn sasl_disabled(core: &mut ClientCore, _acts: &mut Actions) {
    core.sasl = None;
}

fn chosen_mechanism(core: &ClientCore) -> Option<Box<dyn Mechanism>> {
    let config = &core.config;
    let explicit = config.sasl_mechanism.as_deref().map(SaslMechanism::parse);

    let plain = || -> Option<Box<dyn Mechanism>> {
        Some(Box::new(Plain {
            authzid: config.sasl_identity.clone(),
            authcid: config.sasl_username.clone()?,
            password: config.sasl_password.clone()?,
        }))
    };
    let external = || -> Box<dyn Mechanism> {
        Box::new(External {
            authzid: (!config.sasl_identity.is_empty()).then(|| config.sasl_identity.clone()),
        })
    };

    match explicit {
        Some(SaslMechanism::Plain) => plain(),
        Some(SaslMechanism::External) => Some(external()),
        Some(SaslMechanism::Unknown(name)) => {
            warn!(mechanism = %name, "unsupported SASL mechanism configured");
            None
        }
        None if config.tls_client_cert.is_some() => Some(external()),
        None => plain(),
    }
}

fn on_authenticate(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let payload = msg.param(0).unwrap_or("");
    acts.push(Action::SaslTimer(false));

    let Some(session) = &mut core.sasl else {
        warn!("unsolicited AUTHENTICATE from server");
        return;
    };

    match session.feed(payload) {
        SaslFeed::Respond(chunks) => {
            for chunk in chunks {
                acts.push(Action::Send(Message::cmd("AUTHENTICATE", &[&chunk])));
            }
            acts.push(Action::SaslTimer(true));
        }
        SaslFeed::Continue => {
            acts.push(Action::SaslTimer(true));
        }
        SaslFeed::Abort => {
            acts.push(Action::Send(Message::cmd("AUTHENTICATE", &[ABORT_PAYLOAD])));
            core.capability_negotiated("sasl", false, acts);
        }
    }
}

fn on_logged_in(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    // :srv 900 nick nick!user@host account :You are now logged in
    if let Some(account) = msg.param(2) {
        debug!(account, "logged in");
        let nick = core.state.nickname.clone();
        core.state.create_user(&nick);
        if let Some(user) = core.state.user_mut(&nick) {
            user.account = Some(account.to_string());
            user.identified = true;
        }
    }
}

fn on_success(core: &mut ClientCore, _msg: &Message, acts: &mut Actions) {
    acts.push(Action::SaslTimer(false));
    if let Some(session) = &mut core.sasl {
        session.finish(true);
    }
    core.capability_negotiated("sasl", true, acts);
}

fn on_failure(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    acts.push(Action::SaslTimer(false));
    let reason = msg.trailing().unwrap_or("authentication failed");
    warn!(numeric = %msg.command, reason, "SASL failed");

    if let Some(session) = &mut core.sasl {
        session.finish(false);
    }
    if core.config.sasl_required {
        warn!("sasl_required set, disconnecting");
        acts.push(Action::Disconnect { expected: false });
        return;
    }
    core.capability_negotiated("sasl", false, acts);
}

fn on_mechanism_list(_core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    debug!(
        mechanisms = msg.param(1).unwrap_or(""),
        "server SASL mechanisms"
    );
}
