//! Simple IRC bot example
//!
//! Demonstrates connecting to a server, joining a channel, and replying
//! to messages using the event stream.

use slirc::{Client, Config, Event};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = Config::new("slirc_bot");
    config.autojoin.push("#slirc-demo".to_string());

    let (handle, mut events) = Client::connect("irc.libera.chat", 6667, config);

    while let Some(event) = events.recv().await {
        match event {
            Event::Connect => {
                println!("✓ registered");
            }
            Event::ChannelMessage { target, by, text } => {
                println!("<{}> {}: {}", target, by, text);
                if text.contains("!hello") {
                    handle.message(&target, &format!("Hello there, {}! 👋", by)).await?;
                }
                if text.contains("!quit") {
                    handle.quit(Some("requested")).await?;
                }
            }
            Event::Disconnect { expected } => {
                println!("disconnected (expected: {})", expected);
                if expected {
                    break;
                }
            }
            _ => {}
        }
    }

    Ok(())
}
