//! High-level events delivered to the application.

use crate::message::Message;
use crate::mode::ModeChange;

/// An event produced by the protocol core.
///
/// Events for one server message are delivered in a fixed order (general
/// before specific, e.g. `Message` before `ChannelMessage`), matching the
/// handler ordering applications rely on for deterministic state.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// Registration completed; the connection is usable.
    Connect,
    /// The connection ended. `expected` is false for transport loss.
    Disconnect { expected: bool },
    /// Every inbound message, before any other handling.
    Raw(Message),
    /// A message nothing else handled.
    Unknown(Message),

    /// Any PRIVMSG.
    Message { target: String, by: String, text: String },
    /// PRIVMSG to a channel.
    ChannelMessage { target: String, by: String, text: String },
    /// PRIVMSG directly to us.
    PrivateMessage { by: String, text: String },
    /// Any NOTICE.
    Notice { target: String, by: String, text: String },
    ChannelNotice { target: String, by: String, text: String },
    PrivateNotice { by: String, text: String },

    /// A user (possibly us) joined a channel.
    Join { channel: String, user: String },
    /// A user (possibly us) left a channel.
    Part { channel: String, user: String, reason: Option<String> },
    Kick { channel: String, target: String, by: String, reason: Option<String> },
    Quit { user: String, reason: Option<String> },
    Kill { target: String, by: String, reason: String },
    NickChange { old: String, new: String },
    TopicChange { channel: String, topic: String, by: String },
    /// Channel mode change, with the parsed changes in applied order.
    ModeChange { channel: String, changes: Vec<ModeChange>, by: String },
    /// Our own user modes changed.
    UserModeChange { changes: Vec<ModeChange> },
    /// We were invited to a channel.
    Invite { channel: String, by: String },
    /// Someone else was invited (invite-notify).
    UserInvite { target: String, channel: String, by: String },

    /// An ISUPPORT token the library does not interpret itself.
    Isupport { name: String, value: Option<String> },
    /// A capability was negotiated and is now active.
    CapabilityEnabled { name: String },
    /// A capability was rejected, withdrawn, or failed negotiation.
    CapabilityDisabled { name: String },

    /// A monitored user came online.
    UserOnline { nick: String },
    /// A monitored user went offline.
    UserOffline { nick: String },

    /// AWAY state change observed (away-notify or numerics).
    AwayChange { nick: String, away: bool, message: Option<String> },
    /// Account login state change (account-notify / extended-join).
    AccountChange { nick: String, account: Option<String> },
    /// A user's displayed host changed (chghost).
    HostChange { nick: String, username: String, hostname: String },

    /// CTCP query embedded in a PRIVMSG.
    Ctcp { by: String, target: String, kind: String, argument: Option<String> },
    /// CTCP reply embedded in a NOTICE.
    CtcpReply { by: String, target: String, kind: String, argument: Option<String> },
}
