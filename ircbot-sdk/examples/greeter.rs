//! Greeter bot example: greets joiners, answers a few `!` commands and keeps
//! itself connected with exponential backoff around the client's single
//! built-in reconnect.
//!
//! Usage:
//!   cargo run --example greeter -- --server irc.libera.chat --port 6667 \
//!     --channel "#ircbot-test" --admin yournick
//!
//! Commands:
//!   - `!ping`: anyone, answers `pong!`
//!   - `!echo <text>`: anyone, repeats the text
//!   - `!kick <nick> [reason]`: admins only

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use ircbot_sdk::{Client, ServerConfig};

#[derive(Parser)]
#[command(name = "greeter", about = "ircbot-sdk greeter example")]
struct Args {
    #[arg(long, default_value = "irc.libera.chat")]
    server: String,
    #[arg(long, default_value_t = 6667)]
    port: u16,
    #[arg(long, default_value = "greeter")]
    nick: String,
    #[arg(long, default_value = "#ircbot-test")]
    channel: String,
    #[arg(long)]
    admin: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = ServerConfig {
        address: args.server,
        port: args.port,
        nickname: args.nick,
        channels: vec![args.channel],
        admins: args.admin,
        ..Default::default()
    };
    config.validate("greeter")?;

    let client = Client::new(config);

    client.on("JOIN", |client, event| async move {
        let (Some(nick), Some(channel)) = (event.nick(), event.args.first()) else {
            return Ok(());
        };
        if nick == client.current_nick() {
            return Ok(());
        }
        let channel = channel.trim_start_matches(':');
        client.privmsg(channel, &format!("Welcome to {channel}, {nick}!")).await?;
        Ok(())
    });

    client.on("PRIVMSG", |client, event| async move {
        let (Some(user), Some(to), Some(text)) = (&event.user, &event.reply_to, &event.message)
        else {
            return Ok(());
        };
        let mut words = text.split_whitespace();

        match words.next() {
            Some("!ping") => client.privmsg(to, "pong!").await?,
            Some("!echo") => {
                let rest: Vec<_> = words.collect();
                if rest.is_empty() {
                    client.privmsg(to, "Usage: !echo <message>").await?;
                } else {
                    client.privmsg(to, &rest.join(" ")).await?;
                }
            }
            Some("!kick") if client.is_admin(user) => {
                let Some(nick) = words.next() else {
                    client.privmsg(to, "Usage: !kick <nick> [reason]").await?;
                    return Ok(());
                };
                let reason: Vec<_> = words.collect();
                let reason = (!reason.is_empty()).then(|| reason.join(" "));
                client.kick(to, nick, reason.as_deref()).await?;
            }
            Some("!kick") => client.notice(&user.nick, "Permission denied.").await?,
            _ => {}
        }
        Ok(())
    });

    tokio::spawn({
        let client = client.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                client.quit("SIGINT");
            }
        }
    });

    let mut backoff = Duration::from_secs(1);
    loop {
        match client.run().await {
            Ok(()) => break,
            Err(e) => {
                tracing::warn!(error = %e, ?backoff, "Connection lost, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(60));
            }
        }
    }
    Ok(())
}
