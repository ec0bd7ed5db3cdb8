//! The RFC 1459 protocol surface: channel membership, messaging, modes,
//! topics, NAMES/WHO synchronization, and WHOIS/WHOWAS accumulation.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::{Action, Actions, ClientCore};
use crate::ctcp::Ctcp;
use crate::event::Event;
use crate::message::Message;
use crate::mode::{parse_channel_modes, parse_user_modes};
use crate::prefix::Prefix;
use crate::request::{RequestKey, RequestKind};
use crate::state::Visibility;

use super::{DispatchTable, Feature};

#[derive(Debug)]
pub struct Rfc1459Feature;

impl Feature for Rfc1459Feature {
    fn name(&self) -> &'static str {
        "rfc1459"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["isupport", "registration"]
    }

    fn register(&self, table: &mut DispatchTable) {
        table.on("JOIN", on_join);
        table.on("PART", on_part);
        table.on("KICK", on_kick);
        table.on("QUIT", on_quit);
        table.on("NICK", on_nick);
        table.on("MODE", on_mode);
        table.on("TOPIC", on_topic);
        table.on("INVITE", on_invite);
        table.on("KILL", on_kill);
        table.on("PRIVMSG", on_privmsg);
        table.on("NOTICE", on_notice);

        table.on("301", on_away_reply);
        table.on("305", on_unaway);
        table.on("306", on_nowaway);
        table.on("311", on_whois_user);
        table.on("312", on_whois_server);
        table.on("313", on_whois_oper);
        table.on("314", on_whowas_user);
        table.on("315", on_ignored);
        table.on("317", on_whois_idle);
        table.on("318", on_whois_end);
        table.on("319", on_whois_channels);
        table.on("324", on_channel_modes);
        table.on("329", on_ignored);
        table.on("330", on_whois_account);
        table.on("331", on_no_topic);
        table.on("332", on_topic_reply);
        table.on("333", on_topic_meta);
        table.on("352", on_who_reply);
        table.on("353", on_names_reply);
        table.on("366", on_names_end);
        table.on("369", on_whowas_end);
        table.on("401", on_no_such_nick);
        table.on("406", on_was_no_such_nick);
        table.on("671", on_whois_secure);
    }
}

/// Numerics we receive but have nothing to do with (end of WHO, channel
/// creation time).
fn on_ignored(_core: &mut ClientCore, _msg: &Message, _acts: &mut Actions) {}

/// Sync the sender into the user table and give back a display name for
/// events (nickname, or the server name for server-sourced messages).
fn sender(core: &mut ClientCore, msg: &Message) -> String {
    match &msg.prefix {
        Some(prefix) => {
            core.state.sync_user_from_prefix(prefix);
            prefix.name().to_string()
        }
        None => String::new(),
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn on_join(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let nick = sender(core, msg);
    if nick.is_empty() {
        return;
    }

    // extended-join: JOIN <channel> <account> :<realname>
    if core.caps.is_enabled("extended-join") && msg.params.len() >= 3 {
        let account = msg.param(1).filter(|a| *a != "*").map(String::from);
        let realname = msg.param(2).map(String::from);
        if let Some(user) = core.state.user_mut(&nick) {
            user.identified = account.is_some();
            user.account = account;
            user.realname = realname;
        }
    }

    let channels: Vec<String> = msg
        .param(0)
        .unwrap_or("")
        .split(',')
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();

    for channel in channels {
        if core.state.is_me(&nick) {
            core.state.create_channel(&channel);
            core.state.add_membership(&channel, &nick);
            // Learn the channel modes right away.
            acts.push(Action::Send(Message::cmd("MODE", &[&channel])));
        } else if core.state.in_channel(&channel) {
            core.state.add_membership(&channel, &nick);
        }
        acts.push(Action::Emit(Event::Join {
            channel,
            user: nick.clone(),
        }));
    }
}

fn on_part(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let nick = sender(core, msg);
    let reason = msg.param(1).map(String::from);
    let channels: Vec<String> = msg
        .param(0)
        .unwrap_or("")
        .split(',')
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();

    for channel in channels {
        if !core.state.in_channel(&channel) {
            continue;
        }
        acts.push(Action::Emit(Event::Part {
            channel: channel.clone(),
            user: nick.clone(),
            reason: reason.clone(),
        }));
        if core.state.is_me(&nick) {
            core.state.destroy_channel(&channel);
        } else {
            core.state.destroy_user(&nick, Some(&channel));
        }
    }
}

fn on_kick(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let by = sender(core, msg);
    let channels: Vec<&str> = msg.param(0).unwrap_or("").split(',').collect();
    let targets: Vec<&str> = msg.param(1).unwrap_or("").split(',').collect();
    let reason = msg.param(2).map(String::from);

    for channel in &channels {
        for target in &targets {
            if channel.is_empty() || target.is_empty() {
                continue;
            }
            acts.push(Action::Emit(Event::Kick {
                channel: channel.to_string(),
                target: target.to_string(),
                by: by.clone(),
                reason: reason.clone(),
            }));
            if core.state.is_me(target) {
                core.state.destroy_channel(channel);
            } else if core.state.in_channel(channel) {
                core.state.destroy_user(target, Some(channel));
            }
        }
    }
}

fn on_quit(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let nick = sender(core, msg);
    let reason = msg.param(0).map(String::from);

    acts.push(Action::Emit(Event::Quit {
        user: nick.clone(),
        reason,
    }));
    if !core.state.is_me(&nick) {
        core.state.destroy_user(&nick, None);
    }
}

fn on_nick(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let old = sender(core, msg);
    let Some(new) = msg.param(0).map(String::from) else {
        return;
    };

    if core.state.is_me(&old) {
        core.state.nickname = new.clone();
    }
    core.state.rename_user(&old, &new);
    acts.push(Action::Emit(Event::NickChange { old, new }));
}

fn on_mode(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let by = sender(core, msg);
    let Some(target) = msg.param(0).map(String::from) else {
        return;
    };

    if core.params.is_channel(&target) {
        if !core.state.in_channel(&target) {
            return;
        }
        let changes = parse_channel_modes(&core.params, &msg.params[1..]);
        for change in &changes {
            match (&change.arg, core.params.is_membership_mode(change.mode)) {
                (Some(nick), true) => {
                    core.state
                        .set_membership_mode(&target, nick, change.mode, change.set);
                }
                _ => core.state.apply_channel_mode(&target, change),
            }
        }
        acts.push(Action::Emit(Event::ModeChange {
            channel: target,
            changes,
            by,
        }));
    } else if core.state.is_me(&target) {
        let changes = parse_user_modes(&msg.params[1..]);
        for change in &changes {
            if change.set {
                if !core.user_modes.contains(&change.mode) {
                    core.user_modes.push(change.mode);
                }
            } else {
                core.user_modes.retain(|&m| m != change.mode);
            }
        }
        acts.push(Action::Emit(Event::UserModeChange { changes }));
    }
}

fn on_topic(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let by = sender(core, msg);
    let (Some(channel), Some(topic)) = (msg.param(0), msg.param(1)) else {
        return;
    };
    let channel = channel.to_string();
    let topic = topic.to_string();

    let key = core.state.normalize(&channel);
    if let Some(ch) = core.state.channels.get_mut(&key) {
        ch.topic = Some(topic.clone());
        ch.topic_setter = Some(by.clone());
        ch.topic_time = Some(now_unix());
    }
    acts.push(Action::Emit(Event::TopicChange { channel, topic, by }));
}

fn on_invite(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let by = sender(core, msg);
    let (Some(target), Some(channel)) = (msg.param(0), msg.param(1)) else {
        return;
    };

    if core.state.is_me(target) {
        acts.push(Action::Emit(Event::Invite {
            channel: channel.to_string(),
            by,
        }));
    } else {
        acts.push(Action::Emit(Event::UserInvite {
            target: target.to_string(),
            channel: channel.to_string(),
            by,
        }));
    }
}

fn on_kill(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let by = sender(core, msg);
    let Some(target) = msg.param(0).map(String::from) else {
        return;
    };
    let reason = msg.param(1).unwrap_or("").to_string();

    acts.push(Action::Emit(Event::Kill {
        target: target.clone(),
        by,
        reason,
    }));
    if core.state.is_me(&target) {
        acts.push(Action::Disconnect { expected: false });
    } else {
        core.state.destroy_user(&target, None);
    }
}

fn on_privmsg(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let by = sender(core, msg);
    let (Some(target), Some(text)) = (msg.param(0), msg.param(1)) else {
        return;
    };

    // account-tag: piggy-back account info when present.
    if let Some(Some(account)) = msg.tag("account") {
        if let Some(user) = core.state.user_mut(&by) {
            user.account = Some(account.to_string());
            user.identified = true;
        }
    }

    // CTCP-encapsulated payloads are dispatched as CTCP, not as chat.
    if Ctcp::parse(text).is_some() {
        return;
    }

    let target = target.to_string();
    let text = text.to_string();
    acts.push(Action::Emit(Event::Message {
        target: target.clone(),
        by: by.clone(),
        text: text.clone(),
    }));
    if core.params.is_channel(&target) {
        acts.push(Action::Emit(Event::ChannelMessage { target, by, text }));
    } else {
        acts.push(Action::Emit(Event::PrivateMessage { by, text }));
    }
}

fn on_notice(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let by = sender(core, msg);
    let (Some(target), Some(text)) = (msg.param(0), msg.param(1)) else {
        return;
    };
    if Ctcp::parse(text).is_some() {
        return;
    }

    let target = target.to_string();
    let text = text.to_string();
    acts.push(Action::Emit(Event::Notice {
        target: target.clone(),
        by: by.clone(),
        text: text.clone(),
    }));
    if core.params.is_channel(&target) {
        acts.push(Action::Emit(Event::ChannelNotice { target, by, text }));
    } else {
        acts.push(Action::Emit(Event::PrivateNotice { by, text }));
    }
}

// Numerics.

fn on_away_reply(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let (Some(nick), message) = (msg.param(1), msg.param(2)) else {
        return;
    };
    let nick = nick.to_string();
    let message = message.map(String::from);

    if let Some(user) = core.state.user_mut(&nick) {
        user.away = true;
        user.away_message = message.clone();
    }
    let key = core.state.normalize(&nick);
    if let Some(info) = core.pending.whois_mut(&key) {
        info.away = true;
        info.away_message = message.clone();
    }
    acts.push(Action::Emit(Event::AwayChange {
        nick,
        away: true,
        message,
    }));
}

fn on_unaway(core: &mut ClientCore, _msg: &Message, _acts: &mut Actions) {
    let nick = core.state.nickname.clone();
    if let Some(user) = core.state.user_mut(&nick) {
        user.away = false;
        user.away_message = None;
    }
}

fn on_nowaway(core: &mut ClientCore, _msg: &Message, _acts: &mut Actions) {
    let nick = core.state.nickname.clone();
    core.state.create_user(&nick);
    if let Some(user) = core.state.user_mut(&nick) {
        user.away = true;
    }
}

fn on_whois_user(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let (Some(nick), Some(username), Some(hostname)) =
        (msg.param(1), msg.param(2), msg.param(3))
    else {
        return;
    };
    let realname = msg.param(5).map(String::from);

    core.state.create_user(nick);
    if let Some(user) = core.state.user_mut(nick) {
        user.username = Some(username.to_string());
        user.hostname = Some(hostname.to_string());
        user.realname = realname.clone();
    }
    let key = core.state.normalize(nick);
    if let Some(info) = core.pending.whois_mut(&key) {
        info.username = Some(username.to_string());
        info.hostname = Some(hostname.to_string());
        info.realname = realname;
    }
}

fn on_whois_server(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let (Some(nick), Some(server)) = (msg.param(1), msg.param(2)) else {
        return;
    };
    let server_info = msg.param(3).map(String::from);
    let key = core.state.normalize(nick);
    if let Some(info) = core.pending.whois_mut(&key) {
        info.server = Some(server.to_string());
        info.server_info = server_info.clone();
    }
    if let Some(info) = core.pending.whowas_mut(&key) {
        info.server = Some(server.to_string());
    }
}

fn on_whois_oper(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let Some(nick) = msg.param(1) else { return };
    let key = core.state.normalize(nick);
    if let Some(info) = core.pending.whois_mut(&key) {
        info.oper = true;
    }
}

fn on_whowas_user(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let (Some(nick), Some(username), Some(hostname)) =
        (msg.param(1), msg.param(2), msg.param(3))
    else {
        return;
    };
    let key = core.state.normalize(nick);
    if let Some(info) = core.pending.whowas_mut(&key) {
        info.username = Some(username.to_string());
        info.hostname = Some(hostname.to_string());
        info.realname = msg.param(5).map(String::from);
    }
}

fn on_whois_idle(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let (Some(nick), Some(idle)) = (msg.param(1), msg.param(2)) else {
        return;
    };
    let key = core.state.normalize(nick);
    if let Some(info) = core.pending.whois_mut(&key) {
        info.idle = idle.parse().unwrap_or(0);
    }
}

fn on_whois_end(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let Some(nick) = msg.param(1) else { return };
    let key = core.state.normalize(nick);
    if let Some(outcome) = core.pending.finish_whois(&key, true) {
        acts.push(Action::CompleteRequest(
            RequestKey {
                kind: RequestKind::Whois,
                nick: key,
            },
            outcome,
        ));
    }
}

fn on_whois_channels(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let (Some(nick), Some(channels)) = (msg.param(1), msg.param(2)) else {
        return;
    };
    let key = core.state.normalize(nick);
    if let Some(info) = core.pending.whois_mut(&key) {
        info.channels = channels
            .split_whitespace()
            .map(|c| c.trim_start_matches(['@', '%', '+', '~', '&']).to_string())
            .collect();
    }
}

fn on_channel_modes(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let Some(channel) = msg.param(1).map(String::from) else {
        return;
    };
    if !core.state.in_channel(&channel) {
        return;
    }
    let changes = parse_channel_modes(&core.params, &msg.params[2..]);
    for change in &changes {
        if !core.params.is_membership_mode(change.mode) {
            core.state.apply_channel_mode(&channel, change);
        }
    }
}

fn on_whois_account(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let (Some(nick), Some(account)) = (msg.param(1), msg.param(2)) else {
        return;
    };
    if let Some(user) = core.state.user_mut(nick) {
        user.account = Some(account.to_string());
        user.identified = true;
    }
    let key = core.state.normalize(nick);
    if let Some(info) = core.pending.whois_mut(&key) {
        info.account = Some(account.to_string());
    }
}

fn on_no_topic(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let Some(channel) = msg.param(1) else { return };
    let key = core.state.normalize(channel);
    if let Some(ch) = core.state.channels.get_mut(&key) {
        ch.topic = None;
        ch.topic_setter = None;
        ch.topic_time = None;
    }
}

fn on_topic_reply(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let (Some(channel), Some(topic)) = (msg.param(1), msg.param(2)) else {
        return;
    };
    let key = core.state.normalize(channel);
    let topic = topic.to_string();
    if let Some(ch) = core.state.channels.get_mut(&key) {
        ch.topic = Some(topic);
    }
}

fn on_topic_meta(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let (Some(channel), Some(setter)) = (msg.param(1), msg.param(2)) else {
        return;
    };
    let key = core.state.normalize(channel);
    let setter = Prefix::parse(setter).name().to_string();
    let time = msg.param(3).and_then(|t| t.parse().ok());
    if let Some(ch) = core.state.channels.get_mut(&key) {
        ch.topic_setter = Some(setter);
        ch.topic_time = time;
    }
}

fn on_who_reply(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    // :srv 352 me #chan user host server nick flags :hops realname
    let (Some(username), Some(hostname), Some(nick), Some(flags)) =
        (msg.param(2), msg.param(3), msg.param(5), msg.param(6))
    else {
        return;
    };
    let away = flags.contains('G');
    let realname = msg
        .param(7)
        .and_then(|t| t.split_once(' '))
        .map(|(_, realname)| realname.to_string());

    core.state.create_user(nick);
    if let Some(user) = core.state.user_mut(nick) {
        user.username = Some(username.to_string());
        user.hostname = Some(hostname.to_string());
        user.away = away;
        if realname.is_some() {
            user.realname = realname;
        }
    }
}

fn on_names_reply(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    // :srv 353 me = #chan :@nick1 +nick2 nick3
    let (Some(visibility), Some(channel), Some(names)) =
        (msg.param(1), msg.param(2), msg.param(3))
    else {
        return;
    };
    let channel = channel.to_string();
    if !core.state.in_channel(&channel) {
        return;
    }

    let key = core.state.normalize(&channel);
    if let Some(ch) = core.state.channels.get_mut(&key) {
        match visibility {
            "=" => ch.visibility = Visibility::Public,
            "*" => ch.visibility = Visibility::Private,
            "@" => ch.visibility = Visibility::Secret,
            _ => {}
        }
    }

    let prefix_chars: Vec<char> = core.params.prefix.iter().map(|(_, p)| *p).collect();
    for entry in names.split_whitespace() {
        let stripped = entry.trim_start_matches(|c| prefix_chars.contains(&c));
        let sigils: Vec<char> = entry[..entry.len() - stripped.len()].chars().collect();

        // userhost-in-names sends full masks here.
        let prefix = Prefix::parse_user_target(stripped);
        let Some(nick) = prefix.nick().map(String::from) else {
            continue;
        };
        core.state.sync_user_from_prefix(&prefix);
        core.state.add_membership(&channel, &nick);
        for sigil in sigils {
            if let Some(mode) = core.params.mode_for_prefix(sigil) {
                core.state.set_membership_mode(&channel, &nick, mode, true);
            }
        }
    }
}

fn on_names_end(_core: &mut ClientCore, _msg: &Message, _acts: &mut Actions) {
    // Membership is synced incrementally; nothing left to do.
}

fn on_whowas_end(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let Some(nick) = msg.param(1) else { return };
    let key = core.state.normalize(nick);
    if let Some(outcome) = core.pending.finish_whowas(&key, true) {
        acts.push(Action::CompleteRequest(
            RequestKey {
                kind: RequestKind::Whowas,
                nick: key,
            },
            outcome,
        ));
    }
}

fn on_no_such_nick(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let Some(nick) = msg.param(1) else { return };
    let key = core.state.normalize(nick);
    if let Some(outcome) = core.pending.finish_whois(&key, false) {
        acts.push(Action::CompleteRequest(
            RequestKey {
                kind: RequestKind::Whois,
                nick: key,
            },
            outcome,
        ));
    }
}

fn on_was_no_such_nick(core: &mut ClientCore, msg: &Message, acts: &mut Actions) {
    let Some(nick) = msg.param(1) else { return };
    let key = core.state.normalize(nick);
    if let Some(outcome) = core.pending.finish_whowas(&key, false) {
        acts.push(Action::CompleteRequest(
            RequestKey {
                kind: RequestKind::Whowas,
                nick: key,
            },
            outcome,
        ));
    }
}

fn on_whois_secure(core: &mut ClientCore, msg: &Message, _acts: &mut Actions) {
    let Some(nick) = msg.param(1) else { return };
    let key = core.state.normalize(nick);
    if let Some(info) = core.pending.whois_mut(&key) {
        info.secure = true;
    }
}
