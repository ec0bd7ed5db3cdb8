//! MODE change parsing.
//!
//! Channel mode arguments cannot be parsed without the active PREFIX and
//! CHANMODES parameters: membership modes and classes A/B always consume
//! an argument, class C only when set, class D never.

use tracing::warn;

use crate::isupport::ProtocolParameters;

/// One applied mode change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeChange {
    /// `true` for `+`, `false` for `-`.
    pub set: bool,
    /// The mode character.
    pub mode: char,
    /// Consumed argument, when the mode class takes one.
    pub arg: Option<String>,
}

impl ModeChange {
    fn new(set: bool, mode: char, arg: Option<&str>) -> ModeChange {
        ModeChange {
            set,
            mode,
            arg: arg.map(String::from),
        }
    }
}

fn takes_argument(params: &ProtocolParameters, mode: char, set: bool) -> bool {
    let cm = &params.chanmodes;
    params.is_membership_mode(mode)
        || cm.a.contains(mode)
        || cm.b.contains(mode)
        || (cm.c.contains(mode) && set)
}

/// Parse the argument list of a channel MODE message (everything after the
/// channel name) into ordered mode changes.
///
/// Arguments are consumed left to right. A repeated non-list mode of the
/// same polarity within one message is redundant and is dropped without
/// consuming an argument; a mode whose argument is missing is dropped with
/// a warning rather than failing the whole message.
pub fn parse_channel_modes(params: &ProtocolParameters, pieces: &[String]) -> Vec<ModeChange> {
    let mut changes = Vec::new();
    let mut seen: Vec<(bool, char)> = Vec::new();
    let mut args = pieces
        .iter()
        .filter(|p| !starts_mode_word(p))
        .map(String::as_str);

    let mut set = true;
    for word in pieces.iter().filter(|p| starts_mode_word(p)) {
        for mode in word.chars() {
            match mode {
                '+' => set = true,
                '-' => set = false,
                mode => {
                    let is_list = params.chanmodes.a.contains(mode);
                    if !is_list && seen.contains(&(set, mode)) {
                        continue;
                    }
                    seen.push((set, mode));

                    if takes_argument(params, mode, set) {
                        match args.next() {
                            Some(arg) => changes.push(ModeChange::new(set, mode, Some(arg))),
                            None => {
                                warn!(mode = %mode, set, "mode change missing its argument, dropping");
                            }
                        }
                    } else {
                        changes.push(ModeChange::new(set, mode, None));
                    }
                }
            }
        }
    }
    changes
}

/// Parse a user MODE argument list. User modes never take parameters.
pub fn parse_user_modes(pieces: &[String]) -> Vec<ModeChange> {
    let mut changes = Vec::new();
    let mut set = true;
    for word in pieces {
        for mode in word.chars() {
            match mode {
                '+' => set = true,
                '-' => set = false,
                mode => changes.push(ModeChange::new(set, mode, None)),
            }
        }
    }
    changes
}

fn starts_mode_word(word: &str) -> bool {
    word.starts_with('+') || word.starts_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_params() -> ProtocolParameters {
        let mut p = ProtocolParameters::default();
        p.apply_token("PREFIX", Some("(ohv)@%+"));
        p.apply_token("CHANMODES", Some("b,k,l,imnpst"));
        p
    }

    #[test]
    fn test_prefix_and_class_c_consumption() {
        // +o takes an arg (membership), +l takes one when set, -v takes
        // one (membership); the duplicated +l is redundant and dropped.
        let p = spec_params();
        let changes = parse_channel_modes(
            &p,
            &["+oll-v".into(), "nickA".into(), "42".into(), "nickB".into()],
        );
        assert_eq!(
            changes,
            vec![
                ModeChange::new(true, 'o', Some("nickA")),
                ModeChange::new(true, 'l', Some("42")),
                ModeChange::new(false, 'v', Some("nickB")),
            ]
        );
    }

    #[test]
    fn test_class_c_unset_takes_no_arg() {
        let p = spec_params();
        let changes = parse_channel_modes(&p, &["-l".into()]);
        assert_eq!(changes, vec![ModeChange::new(false, 'l', None)]);
    }

    #[test]
    fn test_class_a_and_b() {
        let p = spec_params();
        let changes = parse_channel_modes(
            &p,
            &["+b-k".into(), "*!*@spam.example".into(), "hunter2".into()],
        );
        assert_eq!(
            changes,
            vec![
                ModeChange::new(true, 'b', Some("*!*@spam.example")),
                ModeChange::new(false, 'k', Some("hunter2")),
            ]
        );
    }

    #[test]
    fn test_list_modes_may_repeat() {
        let p = spec_params();
        let changes = parse_channel_modes(&p, &["+bb".into(), "a!*@*".into(), "b!*@*".into()]);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].arg.as_deref(), Some("b!*@*"));
    }

    #[test]
    fn test_flag_modes() {
        let p = spec_params();
        let changes = parse_channel_modes(&p, &["+im-n".into()]);
        assert_eq!(
            changes,
            vec![
                ModeChange::new(true, 'i', None),
                ModeChange::new(true, 'm', None),
                ModeChange::new(false, 'n', None),
            ]
        );
    }

    #[test]
    fn test_missing_argument_dropped() {
        let p = spec_params();
        let changes = parse_channel_modes(&p, &["+ok".into(), "nick".into()]);
        assert_eq!(changes, vec![ModeChange::new(true, 'o', Some("nick"))]);
    }

    #[test]
    fn test_user_modes() {
        let changes = parse_user_modes(&["+iw-x".into()]);
        assert_eq!(
            changes,
            vec![
                ModeChange::new(true, 'i', None),
                ModeChange::new(true, 'w', None),
                ModeChange::new(false, 'x', None),
            ]
        );
    }
}
