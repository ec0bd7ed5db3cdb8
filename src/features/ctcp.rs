//! CTCP dispatch hooks: queries out of PRIVMSG, replies out of NOTICE.

use crate::core::{Action, Actions, ClientCore};
use crate::ctcp::Ctcp;
use crate::event::Event;
use crate::message::Message;

use super::{DispatchTable, Feature};

#[derive(Debug)]
pub struct CtcpFeature;

impl Feature for CtcpFeature {
    fn name(&self) -> &'static str {
        "ctcp"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["rfc1459"]
    }

    fn register(&self, table: &mut DispatchTable) {
        table.on("PRIVMSG", on_privmsg);
        table.on("NOTICE", on_notice);
    }
}

fn by_and_payload<'m>(msg: &'m Message) -> Option<(String, &'m str, Ctcp)> {
    let by = msg.prefix.as_ref()?.name().to_string();
    let target = msg.param(0)?;
    let ctcp = Ctcp::parse(msg.param(1)?)?;
    Some((by, target, ctcp))
}

fn on_privmsg(_core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    if let Some((by, target, ctcp)) = by_and_payload(msg) {
        acts.push(Action::Emit(Event::Ctcp {
            by,
            target: target.to_string(),
            kind: ctcp.kind,
            argument: ctcp.argument,
        }));
    }
}

fn on_notice(_core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    if let Some((by, target, ctcp)) = by_and_payload(msg) {
        acts.push(Action::Emit(Event::CtcpReply {
            by,
            target: target.to_string(),
            kind: ctcp.kind,
            argument: ctcp.argument,
        }));
    }
}
