//! Opt-in protocol features and their composition.
//!
//! A feature is a bundle of raw-message handlers and capability hooks.
//! [`featurize`] linearizes a feature set so that every feature precedes
//! its own dependencies, then the handler table is built by walking that
//! order base-first: handlers of a dependency run before handlers of the
//! feature that depends on it, so derived features observe already-updated
//! state.

use std::collections::HashMap;

use crate::core::{Actions, ClientCore};
use crate::error::FeatureOrderError;
use crate::message::Message;

mod cap;
mod ctcp;
mod ircv3;
mod isupport;
mod monitor;
mod registration;
mod rfc1459;
mod sasl;

pub use cap::CapFeature;
pub use ctcp::CtcpFeature;
pub use ircv3::Ircv3Feature;
pub use isupport::IsupportFeature;
pub use monitor::MonitorFeature;
pub use registration::RegistrationFeature;
pub use rfc1459::Rfc1459Feature;
pub use sasl::SaslFeature;

/// A handler for one raw command or numeric.
pub type RawHandler = fn(&mut ClientCore, &Message, &mut Actions);

/// Whether to request an advertised capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapDecision {
    /// Leave it alone.
    Ignore,
    /// Request it by name.
    Request,
    /// Request it with an explicit value (`name=value`).
    RequestValue(String),
}

/// Resolution of an ACKed capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapOutcome {
    /// Immediately usable.
    Negotiated,
    /// The feature has more work to do; it must later call
    /// [`ClientCore::capability_negotiated`].
    Negotiating,
    /// Cannot be used after all; it will be disabled again.
    Failed,
}

/// Hooks a feature attaches to one capability name.
#[derive(Clone, Copy)]
pub struct CapHooks {
    /// Decide whether to request the advertised capability.
    pub available: fn(&mut ClientCore, value: Option<&str>) -> CapDecision,
    /// React to the capability being ACKed.
    pub enabled: fn(&mut ClientCore, &mut Actions) -> CapOutcome,
    /// React to the capability being NAKed, DELed, or disabled.
    pub disabled: fn(&mut ClientCore, &mut Actions),
}

impl CapHooks {
    /// Hooks that simply request the capability and accept it.
    pub fn request_only() -> CapHooks {
        CapHooks {
            available: |_, _| CapDecision::Request,
            enabled: |_, _| CapOutcome::Negotiated,
            disabled: |_, _| {},
        }
    }
}

/// The handler table built from a linearized feature set.
#[derive(Default)]
pub struct DispatchTable {
    handlers: HashMap<String, Vec<RawHandler>>,
    caps: HashMap<String, CapHooks>,
}

impl DispatchTable {
    /// Register a handler for a command or zero-padded numeric.
    pub fn on(&mut self, command: &str, handler: RawHandler) {
        self.handlers
            .entry(command.to_string())
            .or_default()
            .push(handler);
    }

    /// Attach capability hooks. A later (more derived) registration for
    /// the same capability replaces the earlier one.
    pub fn cap(&mut self, name: &str, hooks: CapHooks) {
        self.caps.insert(name.to_ascii_lowercase(), hooks);
    }

    pub fn handlers_for(&self, command: &str) -> Option<&[RawHandler]> {
        self.handlers.get(command).map(Vec::as_slice)
    }

    pub fn cap_hooks(&self, name: &str) -> Option<&CapHooks> {
        self.caps.get(&name.to_ascii_lowercase())
    }
}

/// A composable protocol feature.
pub trait Feature: std::fmt::Debug {
    /// Unique feature name, used in dependency lists.
    fn name(&self) -> &'static str;

    /// Names of features this one must sit on top of.
    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    /// Contribute handlers and capability hooks to the table.
    fn register(&self, table: &mut DispatchTable);
}

/// The full built-in feature set.
pub fn all_features() -> Vec<Box<dyn Feature>> {
    vec![
        Box::new(RegistrationFeature),
        Box::new(IsupportFeature),
        Box::new(Rfc1459Feature),
        Box::new(CapFeature),
        Box::new(SaslFeature),
        Box::new(Ircv3Feature),
        Box::new(MonitorFeature),
        Box::new(CtcpFeature),
    ]
}

/// A reduced feature set without IRCv3 extensions.
pub fn lite_features() -> Vec<Box<dyn Feature>> {
    vec![
        Box::new(RegistrationFeature),
        Box::new(IsupportFeature),
        Box::new(Rfc1459Feature),
        Box::new(CtcpFeature),
    ]
}

/// Linearize features so every feature precedes its dependencies and the
/// relative order within each dependency list is kept; ties are broken by
/// input order.
///
/// The returned vector is most-derived first. Building the dispatch table
/// walks it in reverse, so base handlers run first. Contradictory
/// dependency declarations fail with
/// [`FeatureOrderError::Inconsistent`].
pub fn featurize(
    features: Vec<Box<dyn Feature>>,
) -> Result<Vec<Box<dyn Feature>>, FeatureOrderError> {
    let names: Vec<&'static str> = features.iter().map(|f| f.name()).collect();

    // Precedence edges: a feature before each dependency, and each
    // dependency list internally ordered.
    let mut edges: Vec<(&'static str, &'static str)> = Vec::new();
    for f in &features {
        let deps = f.requires();
        for &dep in deps {
            if !names.contains(&dep) {
                return Err(FeatureOrderError::UnknownDependency(dep.to_string()));
            }
            edges.push((f.name(), dep));
        }
        for pair in deps.windows(2) {
            edges.push((pair[0], pair[1]));
        }
    }

    let mut remaining = names.clone();
    let mut order: Vec<&'static str> = Vec::with_capacity(names.len());
    while !remaining.is_empty() {
        // Earliest input-ordered feature nothing else must precede.
        let next = remaining.iter().copied().find(|&n| {
            !edges
                .iter()
                .any(|&(before, after)| after == n && remaining.contains(&before))
        });
        match next {
            Some(n) => {
                order.push(n);
                remaining.retain(|&r| r != n);
            }
            None => {
                return Err(FeatureOrderError::Inconsistent(remaining.join(", ")));
            }
        }
    }

    // Reorder the boxed features to match.
    let mut by_name: HashMap<&'static str, Box<dyn Feature>> =
        features.into_iter().map(|f| (f.name(), f)).collect();
    Ok(order
        .into_iter()
        .filter_map(|n| by_name.remove(n))
        .collect())
}

/// Build the dispatch table for a linearized feature set, base-first.
pub fn build_table(linearized: &[Box<dyn Feature>]) -> DispatchTable {
    let mut table = DispatchTable::default();
    for feature in linearized.iter().rev() {
        feature.register(&mut table);
    }
    table
}
