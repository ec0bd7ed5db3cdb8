//! IRCv3 extensions beyond CAP/SASL themselves: the passive capabilities
//! we request, plus the commands they unlock (ACCOUNT, AWAY, CHGHOST,
//! SETNAME).

use crate::core::{Action, Actions, ClientCore};
use crate::event::Event;
use crate::message::Message;

use super::{CapHooks, DispatchTable, Feature};

/// Capabilities this feature requests whenever the server offers them.
const PASSIVE_CAPS: &[&str] = &[
    "multi-prefix",
    "userhost-in-names",
    "away-notify",
    "account-notify",
    "account-tag",
    "extended-join",
    "chghost",
    "setname",
    "invite-notify",
    "server-time",
    "message-tags",
    "cap-notify",
];

#[derive(Debug)]
pub struct Ircv3Feature;

impl Feature for Ircv3Feature {
    fn name(&self) -> &'static str {
        "ircv3"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["cap", "rfc1459"]
    }

    fn register(&self, table: &mut DispatchTable) {
        for cap in PASSIVE_CAPS {
            table.cap(cap, CapHooks::request_only());
        }
        table.on("ACCOUNT", on_account);
        table.on("AWAY", on_away_notify);
        table.on("CHGHOST", on_chghost);
        table.on("SETNAME", on_setname);
    }
}

fn on_account(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let Some(nick) = msg.source_nick().map(String::from) else {
        return;
    };
    let account = msg.param(0).filter(|a| *a != "*").map(String::from);

    core.state.create_user(&nick);
    if let Some(user) = core.state.user_mut(&nick) {
        user.identified = account.is_some();
        user.account = account.clone();
    }
    acts.push(Action::Emit(Event::AccountChange { nick, account }));
}

fn on_away_notify(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let Some(nick) = msg.source_nick().map(String::from) else {
        return;
    };
    let message = msg.param(0).map(String::from);
    let away = message.is_some();

    if let Some(user) = core.state.user_mut(&nick) {
        user.away = away;
        user.away_message = message.clone();
    }
    acts.push(Action::Emit(Event::AwayChange { nick, away, message }));
}

fn on_chghost(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let Some(nick) = msg.source_nick().map(String::from) else {
        return;
    };
    let (Some(username), Some(hostname)) = (msg.param(0), msg.param(1)) else {
        return;
    };
    let username = username.to_string();
    let hostname = hostname.to_string();

    core.state.create_user(&nick);
    if let Some(user) = core.state.user_mut(&nick) {
        user.username = Some(username.clone());
        user.hostname = Some(hostname.clone());
    }
    acts.push(Action::Emit(Event::HostChange {
        nick,
        username,
        hostname,
    }));
}

fn on_setname(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let Some(nick) = msg.source_nick().map(String::from) else {
        return;
    };
    if let Some(realname) = msg.param(0) {
        if let Some(user) = core.state.user_mut(&nick) {
            user.realname = Some(realname.to_string());
        }
    }
}
