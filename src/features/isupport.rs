//! 005 handling: applying ISUPPORT tokens to the active parameters.

use crate::core::{Action, Actions, ClientCore, ConnectionState};
use crate::event::Event;
use crate::isupport::TokenEffect;
use crate::message::Message;

use super::{DispatchTable, Feature};

#[derive(Debug)]
pub struct IsupportFeature;

impl Feature for IsupportFeature {
    fn name(&self) -> &'static str {
        "isupport"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["registration"]
    }

    fn register(&self, table: &mut DispatchTable) {
        table.on("005", on_isupport);
    }
}

fn on_isupport(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    if core.connection == ConnectionState::Registering {
        core.registration_completed(acts);
    }
    if msg.params.len() < 2 {
        return;
    }

    // Skip the target up front and the ":are supported" trailer at the end.
    for token in &msg.params[1..msg.params.len() - 1] {
        let (key, value) = match token.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (token.as_str(), None),
        };
        match core.params.apply_token(key, value) {
            TokenEffect::CasemappingChanged(mapping) => {
                core.state.set_casemapping(mapping);
            }
            TokenEffect::Applied => {}
            TokenEffect::Unknown => {
                acts.push(Action::Emit(Event::Isupport {
                    name: key.trim_start_matches('-').to_ascii_uppercase(),
                    value: value.map(String::from),
                }));
            }
        }
    }
}
