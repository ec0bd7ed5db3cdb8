//! Connection registration: NICK/USER, welcome numerics, nickname
//! fallback, keepalive replies, and the MOTD.

use tracing::{debug, warn};

use crate::core::{Action, Actions, ClientCore, ConnectionState};
use crate::message::Message;

use super::{DispatchTable, Feature};

#[derive(Debug)]
pub struct RegistrationFeature;

impl Feature for RegistrationFeature {
    fn name(&self) -> &'static str {
        "registration"
    }

    fn register(&self, table: &mut DispatchTable) {
        table.on("001", on_welcome);
        table.on("004", on_my_info);
        for numeric in ["002", "003", "250", "251", "255", "265", "266"] {
            table.on(numeric, on_completion_numeric);
        }
        table.on("PING", on_ping);
        table.on("PONG", on_pong);
        table.on("ERROR", on_error);
        table.on("375", on_motd_start);
        table.on("372", on_motd_line);
        table.on("376", on_motd_end);
        table.on("422", on_no_motd);
        table.on("432", on_nickname_rejected);
        table.on("433", on_nickname_rejected);
        table.on("436", on_nickname_collision);
        table.on("464", on_password_mismatch);
        table.on("465", on_banned);
        table.on("421", on_unknown_command_reply);
    }
}

fn on_welcome(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    // The server tells us the nickname we actually got.
    if let Some(nick) = msg.param(0) {
        core.state.nickname = nick.to_string();
    }
    core.registration_completed(acts);
}

fn on_completion_numeric(core: &mut ClientCore, _msg: &Message, acts: &mut Actions) {
    // RFC 1459 names no single "you are registered" banner; any of these
    // means the handshake went through (e.g. on servers that skip 001).
    if core.connection == ConnectionState::Registering {
        core.registration_completed(acts);
    }
}

fn on_my_info(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    // :srv 004 nick servername version usermodes chanmodes
    if let Some(user_modes) = msg.param(3) {
        core.params.user_mode_chars = Some(user_modes.to_string());
    }
    if let Some(channel_modes) = msg.param(4) {
        core.params.channel_mode_chars = Some(channel_modes.to_string());
    }
    if core.connection == ConnectionState::Registering {
        core.registration_completed(acts);
    }
}

fn on_ping(_core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    acts.push(Action::Send(Message::pong(&msg.params)));
}

fn on_pong(_core: &mut ClientCore, _msg: &Message, _acts: &mut Actions) {
    debug!("pong received");
}

fn on_error(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let reason = msg.trailing().unwrap_or("server closed the connection");
    if core.connection == ConnectionState::Closing {
        debug!(reason, "server confirmed quit");
        return;
    }
    warn!(reason, "server sent ERROR");
    acts.push(Action::Disconnect { expected: false });
}

fn on_motd_start(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    if core.connection == ConnectionState::Registering {
        core.registration_completed(acts);
    }
    core.motd_partial = Some(format!("{}\n", msg.trailing().unwrap_or("")));
}

fn on_motd_line(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    if let Some(motd) = &mut core.motd_partial {
        motd.push_str(msg.trailing().unwrap_or(""));
        motd.push('\n');
    }
}

fn on_motd_end(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    if let Some(mut motd) = core.motd_partial.take() {
        motd.push_str(msg.trailing().unwrap_or(""));
        motd.push('\n');
        core.state.motd = Some(motd);
    }
    if core.connection == ConnectionState::Registering {
        core.registration_completed(acts);
    }
}

fn on_no_motd(core: &mut ClientCore, _msg: &Message, acts: &mut Actions) {
    core.motd_partial = None;
    core.state.motd = None;
    if core.connection == ConnectionState::Registering {
        core.registration_completed(acts);
    }
}

fn on_nickname_rejected(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    if core.registered() {
        warn!(nick = msg.param(1).unwrap_or(""), "nickname change rejected");
        return;
    }
    core.registration_attempts += 1;
    let next = core.next_attempt_nickname();
    core.state.nickname = next.clone();
    acts.push(Action::Send(Message::cmd("NICK", &[&next])));
}

fn on_nickname_collision(_core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    // The server kills us right after; nothing to do but note it.
    warn!(nick = msg.param(1).unwrap_or(""), "nickname collision");
}

fn on_password_mismatch(core: &mut ClientCore, _msg: &Message, acts: &mut Actions) {
    warn!("server rejected our password");
    if !core.registered() {
        acts.push(Action::Disconnect { expected: false });
    }
}

fn on_banned(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    warn!(reason = msg.trailing().unwrap_or(""), "banned from server");
    if !core.registered() {
        acts.push(Action::Disconnect { expected: false });
    }
}

fn on_unknown_command_reply(_core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    debug!(
        command = msg.param(1).unwrap_or(""),
        "server does not know a command we sent"
    );
}
