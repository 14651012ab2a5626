//! ircbot: runs one IRC client per configured server.
//!
//! Besides the built-in registration, identification and autojoin it:
//!
//!   - answers CTCP VERSION and PING
//!   - logs channel and private messages
//!   - quits a server on `!quit` from one of its admins, and all of them
//!     on ctrl-c
//!
//! Set RUST_LOG to override the log filter.

mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ircbot_sdk::{Client, Code};

use crate::config::Config;

/// Version string for CTCP VERSION replies.
const VERSION: &str = concat!("ircbot ", env!("CARGO_PKG_VERSION"));

#[derive(Parser)]
#[command(name = "ircbot", about = "Config-driven IRC bot")]
struct Args {
    /// Config file (default: ~/.config/ircbot/config.toml)
    #[arg(long, env = "IRCBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Only connect to this server from the config
    #[arg(long)]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let path = args.config.unwrap_or_else(config::default_path);
    let mut config = Config::load(&path)?;

    let default_filter = if config.debug {
        "ircbot=debug,ircbot_sdk=debug"
    } else {
        "ircbot=info,ircbot_sdk=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    if let Some(name) = &args.server {
        config.select(name)?;
    }
    config.check()?;
    if config.servers.is_empty() {
        anyhow::bail!("no servers configured in {}", path.display());
    }

    tracing::info!(
        config = %path.display(),
        servers = config.servers.len(),
        "Starting ircbot"
    );

    let clients: Vec<(String, Client)> = config
        .servers
        .into_iter()
        .map(|(name, server)| {
            let client = Client::new(server);
            install_handlers(&client);
            (name, client)
        })
        .collect();

    tokio::spawn({
        let clients: Vec<Client> = clients.iter().map(|(_, c)| c.clone()).collect();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Caught SIGINT, quitting");
                for client in &clients {
                    client.quit("SIGINT");
                }
            }
        }
    });

    let runs = clients.iter().map(|(name, client)| async move {
        if let Err(e) = client.run().await {
            tracing::error!(server = %name, error = %e, "Connection lost for good");
        }
    });
    futures::future::join_all(runs).await;

    tracing::info!("All connections closed, exiting");
    Ok(())
}

fn install_handlers(client: &Client) {
    client
        .on(Code::ctcp("VERSION"), |client, event| async move {
            if let Some(nick) = event.nick() {
                client.ctcp_reply(nick, &format!("VERSION {VERSION}")).await?;
            }
            Ok(())
        })
        .on(Code::ctcp("PING"), |client, event| async move {
            if let Some(nick) = event.nick() {
                client.ctcp_reply(nick, &ping_reply(&event.args)).await?;
            }
            Ok(())
        })
        .on("PRIVMSG", |client, event| async move {
            let (Some(user), Some(text)) = (&event.user, &event.message) else {
                return Ok(());
            };
            let to = event.target.as_deref().unwrap_or_default();
            tracing::info!(to, nick = %user.nick, "{text}");

            if text == "!quit" {
                if client.is_admin(user) {
                    tracing::info!(nick = %user.nick, "Quit requested by admin");
                    client.quit(format!("Requested by {}", user.nick));
                } else if let Some(to) = &event.reply_to {
                    client.privmsg(to, &format!("{}: you are not an admin.", user.nick)).await?;
                }
            }
            Ok(())
        });
}

/// CTCP PING echoes its argument back.
fn ping_reply(args: &[String]) -> String {
    if args.is_empty() {
        "PING".to_string()
    } else {
        format!("PING {}", args.join(" "))
    }
}
