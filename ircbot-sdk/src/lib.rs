//! ircbot-sdk: a small IRC client engine for bots.
//!
//! - Parses raw server lines into [`Event`]s, CTCP included
//! - Dispatches events to async handlers keyed by [`Code`]
//! - Tracks the connection lifecycle (connect, register, identify, autojoin)
//! - Reconnects once when the server drops us
//!
//! ```no_run
//! use ircbot_sdk::{Client, ServerConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let client = Client::new(ServerConfig {
//!     address: "irc.libera.chat".into(),
//!     port: 6667,
//!     nickname: "greeter".into(),
//!     channels: vec!["#ircbot-test".into()],
//!     ..Default::default()
//! });
//! client.on("JOIN", |client, event| async move {
//!     if let Some(nick) = event.nick() {
//!         let channel = event.args.first().map(String::as_str).unwrap_or_default();
//!         client.privmsg(channel.trim_start_matches(':'), &format!("hello {nick}")).await?;
//!     }
//!     Ok(())
//! });
//! client.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod automation;
pub mod client;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod state;
pub mod user;

pub use client::Client;
pub use config::ServerConfig;
pub use error::{ConfigError, ConnectError, ParseError, SendError};
pub use event::{Code, Event};
pub use state::{ConnectionState, Phase};
pub use user::User;
