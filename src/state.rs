//! User and channel state tracking.
//!
//! A single table of users and one of channels, both keyed by the
//! normalized (case-mapped) name. Channel memberships store normalized
//! nicknames and resolve through the user table, so there are no
//! reference cycles and no dangling entries: a user is dropped as soon as
//! they become unobservable (no shared channels and not monitored).

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::casemap::CaseMapping;
use crate::isupport::ProtocolParameters;
use crate::mode::ModeChange;
use crate::prefix::Prefix;

/// A known user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct User {
    pub nickname: String,
    pub username: Option<String>,
    pub hostname: Option<String>,
    pub realname: Option<String>,
    pub away: bool,
    pub away_message: Option<String>,
    /// Services account name, when known (account-notify / WHOIS 330).
    pub account: Option<String>,
    /// Whether the user is identified to services.
    pub identified: bool,
}

/// Channel visibility, from the 353 sigil: `=` public, `*` private,
/// `@` secret.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Secret,
}

/// The value a set channel mode carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModeValue {
    /// Class D flag mode.
    Flag,
    /// Class B/C mode with its parameter.
    Param(String),
    /// Class A list mode entries.
    List(Vec<String>),
}

/// A joined channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub topic: Option<String>,
    pub topic_setter: Option<String>,
    /// Unix timestamp of the last topic change, when known.
    pub topic_time: Option<u64>,
    pub modes: HashMap<char, ModeValue>,
    /// Channel visibility from the 353 sigil.
    pub visibility: Visibility,
    /// Normalized nicknames of members.
    pub users: HashSet<String>,
    /// Membership prefix modes per normalized nickname.
    prefixes: HashMap<String, BTreeSet<char>>,
}

impl Channel {
    fn new(name: &str) -> Channel {
        Channel {
            name: name.to_string(),
            ..Channel::default()
        }
    }

    /// The full set of membership modes held by a member.
    pub fn membership_modes(&self, normalized_nick: &str) -> Option<&BTreeSet<char>> {
        self.prefixes.get(normalized_nick)
    }

    /// The single displayed prefix for a member: the highest-status
    /// membership mode they hold, in PREFIX order.
    pub fn display_prefix(
        &self,
        params: &ProtocolParameters,
        normalized_nick: &str,
    ) -> Option<char> {
        let modes = self.prefixes.get(normalized_nick)?;
        params
            .prefix
            .iter()
            .find(|(m, _)| modes.contains(m))
            .map(|(_, p)| *p)
    }
}

/// All per-connection protocol state derived from server messages.
#[derive(Clone, Debug, Default)]
pub struct NetworkState {
    casemapping: CaseMapping,
    /// Our own current nickname.
    pub nickname: String,
    pub users: HashMap<String, User>,
    pub channels: HashMap<String, Channel>,
    /// Normalized nicknames we monitor; keeps their users alive.
    pub monitored: HashSet<String>,
    /// Accumulated message of the day, once complete.
    pub motd: Option<String>,
}

impl NetworkState {
    pub fn new() -> NetworkState {
        NetworkState::default()
    }

    pub fn casemapping(&self) -> CaseMapping {
        self.casemapping
    }

    pub fn normalize(&self, s: &str) -> String {
        self.casemapping.lower(s)
    }

    pub fn is_me(&self, nick: &str) -> bool {
        self.casemapping.eq(&self.nickname, nick)
    }

    /// Re-key every table under a new case mapping (CASEMAPPING ISUPPORT
    /// arriving after state exists).
    pub fn set_casemapping(&mut self, mapping: CaseMapping) {
        if mapping == self.casemapping {
            return;
        }
        self.casemapping = mapping;

        self.users = std::mem::take(&mut self.users)
            .into_values()
            .map(|u| (mapping.lower(&u.nickname), u))
            .collect();
        self.monitored = std::mem::take(&mut self.monitored)
            .into_iter()
            .map(|n| mapping.lower(&n))
            .collect();
        self.channels = std::mem::take(&mut self.channels)
            .into_values()
            .map(|mut ch| {
                ch.users = std::mem::take(&mut ch.users)
                    .into_iter()
                    .map(|n| mapping.lower(&n))
                    .collect();
                ch.prefixes = std::mem::take(&mut ch.prefixes)
                    .into_iter()
                    .map(|(n, m)| (mapping.lower(&n), m))
                    .collect();
                (mapping.lower(&ch.name), ch)
            })
            .collect();
    }

    pub fn in_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(&self.normalize(channel))
    }

    pub fn channel(&self, channel: &str) -> Option<&Channel> {
        self.channels.get(&self.normalize(channel))
    }

    pub fn user(&self, nick: &str) -> Option<&User> {
        self.users.get(&self.normalize(nick))
    }

    /// Create a user on first sighting. Server names (anything with a dot)
    /// are not users.
    pub fn create_user(&mut self, nick: &str) {
        if nick.is_empty() || nick.contains('.') {
            return;
        }
        self.users
            .entry(self.casemapping.lower(nick))
            .or_insert_with(|| User {
                nickname: nick.to_string(),
                ..User::default()
            });
    }

    /// Create or update a user from a message source.
    pub fn sync_user_from_prefix(&mut self, prefix: &Prefix) {
        if let Prefix::User { nick, user, host } = prefix {
            self.create_user(nick);
            if let Some(entry) = self.users.get_mut(&self.casemapping.lower(nick)) {
                entry.nickname = nick.clone();
                if user.is_some() {
                    entry.username = user.clone();
                }
                if host.is_some() {
                    entry.hostname = host.clone();
                }
            }
        }
    }

    pub fn user_mut(&mut self, nick: &str) -> Option<&mut User> {
        self.users.get_mut(&self.casemapping.lower(nick))
    }

    /// Re-key a user after NICK, in the user table and every membership.
    pub fn rename_user(&mut self, old: &str, new: &str) {
        let old_key = self.normalize(old);
        let new_key = self.normalize(new);

        match self.users.remove(&old_key) {
            Some(mut user) => {
                user.nickname = new.to_string();
                self.users.insert(new_key.clone(), user);
            }
            None => self.create_user(new),
        }

        for ch in self.channels.values_mut() {
            if ch.users.remove(&old_key) {
                ch.users.insert(new_key.clone());
            }
            if let Some(modes) = ch.prefixes.remove(&old_key) {
                ch.prefixes.insert(new_key.clone(), modes);
            }
        }

        if self.monitored.remove(&old_key) {
            self.monitored.insert(new_key);
        }
    }

    /// Remove a user from one channel (or all, when `channel` is `None`),
    /// dropping them from the user table once unobservable.
    pub fn destroy_user(&mut self, nick: &str, channel: Option<&str>) {
        let key = self.normalize(nick);
        match channel {
            Some(channel) => {
                let chan_key = self.normalize(channel);
                if let Some(ch) = self.channels.get_mut(&chan_key) {
                    ch.users.remove(&key);
                    ch.prefixes.remove(&key);
                }
            }
            None => {
                for ch in self.channels.values_mut() {
                    ch.users.remove(&key);
                    ch.prefixes.remove(&key);
                }
            }
        }

        let still_seen = self.channels.values().any(|ch| ch.users.contains(&key));
        if !still_seen && !self.monitored.contains(&key) {
            self.users.remove(&key);
        }
    }

    /// Forced removal, ignoring the monitor set (731 offline).
    pub fn destroy_user_even_if_monitored(&mut self, nick: &str) {
        let key = self.normalize(nick);
        for ch in self.channels.values_mut() {
            ch.users.remove(&key);
            ch.prefixes.remove(&key);
        }
        self.users.remove(&key);
    }

    pub fn create_channel(&mut self, name: &str) {
        self.channels
            .entry(self.casemapping.lower(name))
            .or_insert_with(|| Channel::new(name));
    }

    /// Drop a channel and any users left unobservable by its loss.
    pub fn destroy_channel(&mut self, name: &str) {
        let key = self.normalize(name);
        let Some(ch) = self.channels.remove(&key) else {
            return;
        };
        for member in ch.users {
            let still_seen = self.channels.values().any(|c| c.users.contains(&member));
            if !still_seen && !self.monitored.contains(&member) {
                self.users.remove(&member);
            }
        }
    }

    /// Add a user to a channel, creating the user if unknown.
    pub fn add_membership(&mut self, channel: &str, nick: &str) {
        self.create_user(nick);
        let key = self.normalize(nick);
        let chan_key = self.normalize(channel);
        if let Some(ch) = self.channels.get_mut(&chan_key) {
            ch.users.insert(key);
        }
    }

    /// Grant or revoke a membership mode for a channel member.
    pub fn set_membership_mode(&mut self, channel: &str, nick: &str, mode: char, grant: bool) {
        let key = self.normalize(nick);
        let chan_key = self.normalize(channel);
        if let Some(ch) = self.channels.get_mut(&chan_key) {
            if grant {
                ch.prefixes.entry(key).or_default().insert(mode);
            } else if let Some(modes) = ch.prefixes.get_mut(&key) {
                modes.remove(&mode);
                if modes.is_empty() {
                    ch.prefixes.remove(&key);
                }
            }
        }
    }

    /// Apply a non-membership channel mode change.
    pub fn apply_channel_mode(&mut self, channel: &str, change: &ModeChange) {
        let chan_key = self.normalize(channel);
        let Some(ch) = self.channels.get_mut(&chan_key) else {
            return;
        };
        if change.set {
            match &change.arg {
                None => {
                    ch.modes.insert(change.mode, ModeValue::Flag);
                }
                Some(arg) => match ch.modes.get_mut(&change.mode) {
                    Some(ModeValue::List(entries)) => entries.push(arg.clone()),
                    _ => {
                        ch.modes.insert(change.mode, ModeValue::Param(arg.clone()));
                    }
                },
            }
        } else {
            match (&change.arg, ch.modes.get_mut(&change.mode)) {
                (Some(arg), Some(ModeValue::List(entries))) => {
                    entries.retain(|e| e != arg);
                    if entries.is_empty() {
                        ch.modes.remove(&change.mode);
                    }
                }
                _ => {
                    ch.modes.remove(&change.mode);
                }
            }
        }
    }

    /// Record a list-mode entry seen via MODE (+b and friends) as a list.
    pub fn record_list_mode(&mut self, channel: &str, mode: char, entry: &str) {
        let chan_key = self.normalize(channel);
        if let Some(ch) = self.channels.get_mut(&chan_key) {
            match ch.modes.get_mut(&mode) {
                Some(ModeValue::List(entries)) => entries.push(entry.to_string()),
                _ => {
                    ch.modes
                        .insert(mode, ModeValue::List(vec![entry.to_string()]));
                }
            }
        }
    }

    /// Wipe everything (disconnect).
    pub fn reset(&mut self) {
        let mapping = CaseMapping::default();
        *self = NetworkState {
            casemapping: mapping,
            ..NetworkState::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> NetworkState {
        let mut st = NetworkState::new();
        st.nickname = "me".to_string();
        st
    }

    #[test]
    fn test_case_insensitive_keys() {
        let mut st = state();
        st.create_channel("#Chan");
        st.add_membership("#CHAN", "Other");
        assert_eq!(st.channels.len(), 1);
        assert!(st.in_channel("#chan"));
        assert!(st.channel("#ChAn").unwrap().users.contains("other"));
        assert!(st.user("OTHER").is_some());
    }

    #[test]
    fn test_rfc1459_bracket_keys() {
        let mut st = state();
        st.create_user("Nick[]");
        assert!(st.user("nick{}").is_some());
    }

    #[test]
    fn test_server_names_are_not_users() {
        let mut st = state();
        st.create_user("irc.example.com");
        assert!(st.users.is_empty());
    }

    #[test]
    fn test_rename_rekeys_everywhere() {
        let mut st = state();
        st.create_channel("#c");
        st.add_membership("#c", "Old");
        st.set_membership_mode("#c", "Old", 'o', true);
        st.monitored.insert("old".to_string());

        st.rename_user("Old", "New");
        assert!(st.user("old").is_none());
        assert_eq!(st.user("new").unwrap().nickname, "New");
        let ch = st.channel("#c").unwrap();
        assert!(ch.users.contains("new"));
        assert!(ch.membership_modes("new").unwrap().contains(&'o'));
        assert!(st.monitored.contains("new"));
    }

    #[test]
    fn test_destroy_user_keeps_shared_channel_users() {
        let mut st = state();
        st.create_channel("#a");
        st.create_channel("#b");
        st.add_membership("#a", "x");
        st.add_membership("#b", "x");

        st.destroy_user("x", Some("#a"));
        assert!(st.user("x").is_some());
        st.destroy_user("x", Some("#b"));
        assert!(st.user("x").is_none());
    }

    #[test]
    fn test_monitor_keeps_user_alive() {
        let mut st = state();
        st.create_channel("#a");
        st.add_membership("#a", "x");
        st.monitored.insert("x".to_string());

        st.destroy_user("x", None);
        assert!(st.user("x").is_some());
        st.destroy_user_even_if_monitored("x");
        assert!(st.user("x").is_none());
    }

    #[test]
    fn test_destroy_channel_drops_unshared_users() {
        let mut st = state();
        st.create_channel("#a");
        st.create_channel("#b");
        st.add_membership("#a", "solo");
        st.add_membership("#a", "both");
        st.add_membership("#b", "both");

        st.destroy_channel("#a");
        assert!(st.user("solo").is_none());
        assert!(st.user("both").is_some());
    }

    #[test]
    fn test_display_prefix_uses_prefix_order() {
        let mut params = ProtocolParameters::default();
        params.apply_token("PREFIX", Some("(ohv)@%+"));

        let mut st = state();
        st.create_channel("#c");
        st.add_membership("#c", "n");
        st.set_membership_mode("#c", "n", 'v', true);
        st.set_membership_mode("#c", "n", 'h', true);

        let ch = st.channel("#c").unwrap();
        assert_eq!(ch.display_prefix(&params, "n"), Some('%'));

        st.set_membership_mode("#c", "n", 'o', true);
        let ch = st.channel("#c").unwrap();
        assert_eq!(ch.display_prefix(&params, "n"), Some('@'));
    }

    #[test]
    fn test_casemapping_change_renormalizes() {
        let mut st = state();
        st.create_channel("#C[]");
        st.add_membership("#C[]", "N[]");
        assert!(st.in_channel("#c{}"));

        st.set_casemapping(CaseMapping::Ascii);
        assert!(!st.in_channel("#c{}"));
        assert!(st.in_channel("#c[]"));
        assert!(st.channel("#c[]").unwrap().users.contains("n[]"));
    }

    #[test]
    fn test_channel_mode_values() {
        let mut st = state();
        st.create_channel("#c");
        st.apply_channel_mode(
            "#c",
            &ModeChange {
                set: true,
                mode: 'k',
                arg: Some("hunter2".into()),
            },
        );
        st.record_list_mode("#c", 'b', "a!*@*");
        st.record_list_mode("#c", 'b', "b!*@*");

        let ch = st.channel("#c").unwrap();
        assert_eq!(ch.modes.get(&'k'), Some(&ModeValue::Param("hunter2".into())));
        assert_eq!(
            ch.modes.get(&'b'),
            Some(&ModeValue::List(vec!["a!*@*".into(), "b!*@*".into()]))
        );

        st.apply_channel_mode(
            "#c",
            &ModeChange {
                set: false,
                mode: 'b',
                arg: Some("a!*@*".into()),
            },
        );
        let ch = st.channel("#c").unwrap();
        assert_eq!(ch.modes.get(&'b'), Some(&ModeValue::List(vec!["b!*@*".into()])));
    }
}
