//! # slirc
//!
//! An extensible async IRC client library: wire parsing with full IRCv3
//! tag support, capability negotiation with SASL, ISUPPORT-aware state
//! tracking, and a reconnecting tokio driver.
//!
//! ## Features
//!
//! - IRC message parsing with tags, prefixes, commands, and parameters
//! - Registration, capability negotiation (CAP 302), and SASL PLAIN/EXTERNAL
//! - ISUPPORT-driven case mapping, PREFIX, and CHANMODES handling
//! - User and channel state reconciled from server messages
//! - Outbound throttling, PING keepalive, and jittered reconnect backoff
//! - A client pool multiplexing many connections on one scheduler
//!
//! ## Quick Start
//!
//! ### Parsing IRC Messages
//!
//! ```rust
//! use slirc::Message;
//!
//! let raw = "@time=2023-01-01T12:00:00Z :nick!user@host PRIVMSG #channel :Hello!";
//! let message: Message = raw.parse().expect("valid IRC message");
//!
//! assert_eq!(message.command, "PRIVMSG");
//! assert_eq!(message.params, vec!["#channel", "Hello!"]);
//! assert_eq!(message.tag("time"), Some(Some("2023-01-01T12:00:00Z")));
//! ```
//!
//! ### Running a Client
//!
//! ```rust,no_run
//! use slirc::{Client, Config, Event};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::new("example_bot");
//!     let (handle, mut events) = Client::connect("irc.libera.chat", 6667, config);
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             Event::Connect => {
//!                 handle.join("#example", None).await.ok();
//!             }
//!             Event::ChannelMessage { target, by, text } => {
//!                 if text.contains("hello") {
//!                     handle.message(&target, &format!("hi, {}!", by)).await.ok();
//!                 }
//!             }
//!             _ => {}
//!         }
//!     }
//! }
//! ```
//!
//! ## Acknowledgments
//!
//! This project was inspired by the architectural patterns established by
//! [Aaron Weiss (aatxe)](https://github.com/aatxe) in the
//! [irc](https://github.com/aatxe/irc) crate. We are grateful for Aaron's
//! foundational work on IRC protocol handling in Rust.

#![deny(clippy::all)]

pub mod caps;
pub mod casemap;
pub mod client;
pub mod config;
pub mod core;
pub mod ctcp;
pub mod error;
pub mod event;
pub mod features;
pub mod irc;
pub mod isupport;
pub mod message;
pub mod mode;
pub mod prefix;
pub mod request;
pub mod sasl;
pub mod state;
pub mod throttle;
pub mod transport;

pub use self::caps::{Cap, CapRegistry, CapState};
pub use self::casemap::CaseMapping;
pub use self::client::{Client, ClientHandle, ClientPool};
pub use self::config::Config;
pub use self::core::{Action, ClientCore, ConnectionState};
pub use self::ctcp::Ctcp;
pub use self::error::{ClientError, FeatureOrderError, MessageParseError, ProtocolError};
pub use self::event::Event;
pub use self::features::{featurize, Feature};
pub use self::irc::{Encoding, IrcCodec};
pub use self::isupport::ProtocolParameters;
pub use self::message::{Message, Tag};
pub use self::mode::ModeChange;
pub use self::prefix::Prefix;
pub use self::request::{WhoisInfo, WhowasInfo};
pub use self::sasl::SaslMechanism;
pub use self::state::{Channel, ModeValue, NetworkState, User, Visibility};
pub use self::throttle::Throttle;
pub use self::transport::{ConnectOptions, Transport};
