//! MONITOR (online/offline presence) numerics.

use tracing::warn;

use crate::core::{Action, Actions, ClientCore};
use crate::event::Event;
use crate::message::Message;
use crate::prefix::Prefix;

use super::{DispatchTable, Feature};

#[derive(Debug)]
pub struct MonitorFeature;

impl Feature for MonitorFeature {
    fn name(&self) -> &'static str {
        "monitor"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["rfc1459", "isupport"]
    }

    fn register(&self, table: &mut DispatchTable) {
        table.on("730", on_online);
        table.on("731", on_offline);
        table.on("732", on_list);
        table.on("733", on_list_end);
        table.on("734", on_list_full);
    }
}

fn targets(msg: &Message) -> Vec<Prefix> {
    msg.param(1)
        .unwrap_or("")
        .split(',')
        .filter(|t| !t.is_empty())
        .map(Prefix::parse_user_target)
        .collect()
}

fn on_online(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    for prefix in targets(msg) {
        core.state.sync_user_from_prefix(&prefix);
        if let Some(nick) = prefix.nick() {
            acts.push(Action::Emit(Event::UserOnline {
                nick: nick.to_string(),
            }));
        }
    }
}

fn on_offline(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    for prefix in targets(msg) {
        let Some(nick) = prefix.nick() else { continue };
        // Offline but still on the monitor list; only the user entry goes.
        if core.state.user(nick).is_some() {
            core.state.destroy_user_even_if_monitored(nick);
        }
        acts.push(Action::Emit(Event::UserOffline {
            nick: nick.to_string(),
        }));
    }
}

fn on_list(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    for prefix in targets(msg) {
        if let Some(nick) = prefix.nick() {
            let key = core.state.normalize(nick);
            core.state.monitored.insert(key);
        }
    }
}

fn on_list_end(_core: &mut ClientCore, _msg: &Message, _acts: &mut Actions) {}

fn on_list_full(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    // :srv 734 me <limit> <targets> :Monitor list is full
    warn!(limit = msg.param(1).unwrap_or(""), "monitor list full");
    for target in msg.param(2).unwrap_or("").split(',').filter(|t| !t.is_empty()) {
        if let Some(nick) = Prefix::parse_user_target(target).nick() {
            let key = core.state.normalize(nick);
            core.state.monitored.remove(&key);
        }
    }
}
