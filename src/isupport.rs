//! RPL_ISUPPORT (005) tokens and the active protocol parameters they set.

use crate::casemap::CaseMapping;

/// The four CHANMODES classes, in ISUPPORT order.
///
/// A: list modes, B: always-parameter modes, C: parameter-on-set modes,
/// D: flag modes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChanModes {
    pub a: String,
    pub b: String,
    pub c: String,
    pub d: String,
}

impl ChanModes {
    /// Parse a `CHANMODES` value (`A,B,C,D`, extra classes ignored).
    pub fn parse(s: &str) -> Option<ChanModes> {
        let mut parts = s.splitn(5, ',');
        Some(ChanModes {
            a: parts.next()?.to_string(),
            b: parts.next()?.to_string(),
            c: parts.next()?.to_string(),
            d: parts.next()?.to_string(),
        })
    }
}

/// Parse a `PREFIX` value of the form `(modes)prefixes` into ordered
/// (mode, prefix) pairs, highest status first.
pub fn parse_prefix(s: &str) -> Option<Vec<(char, char)>> {
    let rest = s.strip_prefix('(')?;
    let (modes, prefixes) = rest.split_once(')')?;
    if modes.chars().count() != prefixes.chars().count() {
        return None;
    }
    Some(modes.chars().zip(prefixes.chars()).collect())
}

/// The effect of applying one ISUPPORT token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenEffect {
    /// A recognized token updated the parameters.
    Applied,
    /// `CASEMAPPING` changed; state tables need renormalizing.
    CasemappingChanged(CaseMapping),
    /// The token is not interpreted by the library.
    Unknown,
}

/// Server-advertised protocol parameters, with RFC 1459 defaults applied
/// before any 005 arrives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolParameters {
    pub casemapping: CaseMapping,
    pub chantypes: String,
    pub statusmsg: String,
    /// Ordered membership (mode, prefix) pairs, highest status first.
    pub prefix: Vec<(char, char)>,
    pub chanmodes: ChanModes,
    pub nicklen: Option<usize>,
    pub channellen: Option<usize>,
    pub awaylen: Option<usize>,
    pub topiclen: Option<usize>,
    pub network: Option<String>,
    /// MONITOR target limit; `Some(None)` means supported without a limit.
    pub monitor: Option<Option<usize>>,
    pub extban: Option<(Option<char>, String)>,
    pub whox: bool,
    /// Valid user mode characters, from the 004 numeric.
    pub user_mode_chars: Option<String>,
    /// Valid channel mode characters, from the 004 numeric.
    pub channel_mode_chars: Option<String>,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        ProtocolParameters {
            casemapping: CaseMapping::Rfc1459,
            chantypes: "#&+!".to_string(),
            statusmsg: String::new(),
            prefix: vec![('o', '@'), ('v', '+')],
            chanmodes: ChanModes {
                a: "b".to_string(),
                b: "k".to_string(),
                c: "l".to_string(),
                d: "imnpst".to_string(),
            },
            nicklen: None,
            channellen: None,
            awaylen: None,
            topiclen: None,
            network: None,
            monitor: None,
            extban: None,
            whox: false,
            user_mode_chars: None,
            channel_mode_chars: None,
        }
    }
}

impl ProtocolParameters {
    /// Whether the given target names a channel under the active CHANTYPES,
    /// ignoring any STATUSMSG sigils in front of it.
    pub fn is_channel(&self, target: &str) -> bool {
        self.strip_statusmsg(target)
            .chars()
            .next()
            .is_some_and(|c| self.chantypes.contains(c))
    }

    /// Strip leading STATUSMSG sigils (e.g. `@#chan` -> `#chan`).
    pub fn strip_statusmsg<'a>(&self, target: &'a str) -> &'a str {
        target.trim_start_matches(|c| self.statusmsg.contains(c))
    }

    /// Mode char for a membership prefix char, if any.
    pub fn mode_for_prefix(&self, prefix: char) -> Option<char> {
        self.prefix.iter().find(|(_, p)| *p == prefix).map(|(m, _)| *m)
    }

    /// Prefix char for a membership mode char, if any.
    pub fn prefix_for_mode(&self, mode: char) -> Option<char> {
        self.prefix.iter().find(|(m, _)| *m == mode).map(|(_, p)| *p)
    }

    /// Whether the mode char grants a membership status (appears in PREFIX).
    pub fn is_membership_mode(&self, mode: char) -> bool {
        self.prefix.iter().any(|(m, _)| *m == mode)
    }

    /// Rank of a membership mode in PREFIX order; lower is higher status.
    pub fn membership_rank(&self, mode: char) -> Option<usize> {
        self.prefix.iter().position(|(m, _)| *m == mode)
    }

    /// Apply one 005 token.
    ///
    /// A bare `TOKEN` enables a flag, `TOKEN=value` sets a value and
    /// `-TOKEN` reverts to the default.
    pub fn apply_token(&mut self, key: &str, value: Option<&str>) -> TokenEffect {
        let removed = key.starts_with('-');
        let key = key.trim_start_matches('-').to_ascii_uppercase();
        let defaults = ProtocolParameters::default();

        match key.as_str() {
            "CASEMAPPING" => {
                let mapping = match (removed, value) {
                    (true, _) | (false, None) => Some(defaults.casemapping),
                    (false, Some(v)) => CaseMapping::parse(v),
                };
                match mapping {
                    Some(m) if m != self.casemapping => {
                        self.casemapping = m;
                        TokenEffect::CasemappingChanged(m)
                    }
                    Some(_) => TokenEffect::Applied,
                    // Unknown mapping names leave identity comparisons alone.
                    None => TokenEffect::Applied,
                }
            }
            "CHANTYPES" => {
                self.chantypes = match (removed, value) {
                    (true, _) => defaults.chantypes,
                    (false, Some(v)) => v.to_string(),
                    (false, None) => String::new(),
                };
                TokenEffect::Applied
            }
            "STATUSMSG" => {
                self.statusmsg = if removed {
                    String::new()
                } else {
                    value.unwrap_or("").to_string()
                };
                TokenEffect::Applied
            }
            "PREFIX" => {
                if removed {
                    self.prefix = defaults.prefix;
                } else if let Some(v) = value {
                    if let Some(pairs) = parse_prefix(v) {
                        self.prefix = pairs;
                    }
                } else {
                    self.prefix = Vec::new();
                }
                TokenEffect::Applied
            }
            "CHANMODES" => {
                if removed {
                    self.chanmodes = defaults.chanmodes;
                } else if let Some(parsed) = value.and_then(ChanModes::parse) {
                    self.chanmodes = parsed;
                }
                TokenEffect::Applied
            }
            "NICKLEN" | "MAXNICKLEN" => {
                self.nicklen = if removed { None } else { value.and_then(|v| v.parse().ok()) };
                TokenEffect::Applied
            }
            "CHANNELLEN" => {
                self.channellen = if removed { None } else { value.and_then(|v| v.parse().ok()) };
                TokenEffect::Applied
            }
            "AWAYLEN" => {
                self.awaylen = if removed { None } else { value.and_then(|v| v.parse().ok()) };
                TokenEffect::Applied
            }
            "TOPICLEN" => {
                self.topiclen = if removed { None } else { value.and_then(|v| v.parse().ok()) };
                TokenEffect::Applied
            }
            "NETWORK" => {
                self.network = if removed { None } else { value.map(String::from) };
                TokenEffect::Applied
            }
            "MONITOR" => {
                self.monitor = if removed {
                    None
                } else {
                    Some(value.and_then(|v| v.parse().ok()))
                };
                TokenEffect::Applied
            }
            "EXTBAN" => {
                self.extban = if removed {
                    None
                } else {
                    value.and_then(|v| {
                        let (prefix, types) = v.split_once(',')?;
                        Some((prefix.chars().next(), types.to_string()))
                    })
                };
                TokenEffect::Applied
            }
            "WHOX" => {
                self.whox = !removed;
                TokenEffect::Applied
            }
            _ => TokenEffect::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = ProtocolParameters::default();
        assert_eq!(p.casemapping, CaseMapping::Rfc1459);
        assert!(p.is_channel("#chan"));
        assert!(p.is_channel("&local"));
        assert!(!p.is_channel("nick"));
        assert_eq!(p.prefix_for_mode('o'), Some('@'));
        assert_eq!(p.prefix_for_mode('v'), Some('+'));
    }

    #[test]
    fn test_parse_prefix() {
        let pairs = parse_prefix("(ohv)@%+").unwrap();
        assert_eq!(pairs, vec![('o', '@'), ('h', '%'), ('v', '+')]);
        assert!(parse_prefix("(ohv)@%").is_none());
        assert!(parse_prefix("@%+").is_none());
    }

    #[test]
    fn test_chanmodes_parse() {
        let cm = ChanModes::parse("b,k,l,imnpst").unwrap();
        assert_eq!(cm.a, "b");
        assert_eq!(cm.b, "k");
        assert_eq!(cm.c, "l");
        assert_eq!(cm.d, "imnpst");
        assert!(ChanModes::parse("b,k,l").is_none());
    }

    #[test]
    fn test_apply_tokens() {
        let mut p = ProtocolParameters::default();
        assert_eq!(
            p.apply_token("CASEMAPPING", Some("ascii")),
            TokenEffect::CasemappingChanged(CaseMapping::Ascii)
        );
        assert_eq!(p.apply_token("PREFIX", Some("(ohv)@%+")), TokenEffect::Applied);
        assert_eq!(p.membership_rank('h'), Some(1));
        assert_eq!(p.apply_token("NICKLEN", Some("31")), TokenEffect::Applied);
        assert_eq!(p.nicklen, Some(31));
        assert_eq!(p.apply_token("NETWORK", Some("ExampleNet")), TokenEffect::Applied);
        assert_eq!(p.network.as_deref(), Some("ExampleNet"));
        assert_eq!(p.apply_token("UNKNOWNTOKEN", Some("x")), TokenEffect::Unknown);
    }

    #[test]
    fn test_remove_token_restores_default() {
        let mut p = ProtocolParameters::default();
        p.apply_token("CHANTYPES", Some("#"));
        assert!(!p.is_channel("&local"));
        p.apply_token("-CHANTYPES", None);
        assert!(p.is_channel("&local"));
    }

    #[test]
    fn test_monitor_token() {
        let mut p = ProtocolParameters::default();
        assert_eq!(p.monitor, None);
        p.apply_token("MONITOR", Some("100"));
        assert_eq!(p.monitor, Some(Some(100)));
        p.apply_token("MONITOR", None);
        assert_eq!(p.monitor, Some(None));
    }

    #[test]
    fn test_statusmsg_stripping() {
        let mut p = ProtocolParameters::default();
        p.apply_token("STATUSMSG", Some("@+"));
        assert!(p.is_channel("@#ops"));
        assert_eq!(p.strip_statusmsg("@#ops"), "#ops");
    }
}
