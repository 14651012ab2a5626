//! Handlers every client starts with.
//!
//! They drive the connection from "socket open" to "sitting in the
//! configured channels": register on the server's first notice, identify to
//! NickServ after the welcome, autojoin once identified. They also answer
//! invites, walk through fallback nicks on `433` and track our own nick
//! changes.

use std::sync::Arc;

use anyhow::Result;

use crate::client::Client;
use crate::event::{Code, Event};

pub const NICKSERV: &str = "NickServ";

/// Prefix of the NickServ notice confirming identification.
const PASSWORD_ACCEPTED: &str = "Password accepted";

pub(crate) fn install(client: &Client) {
    client
        .on("NOTICE", on_notice)
        .on(Code::Numeric(1), on_welcome)
        .on(Code::Numeric(900), on_logged_in)
        .on(Code::Numeric(433), on_nick_in_use)
        .on("INVITE", on_invite)
        .on("NICK", on_nick);
}

/// The server said something before we registered.
pub(crate) async fn greeted(client: &Client) {
    if let Err(e) = client.register_once().await {
        tracing::warn!(error = %e, "Failed to register");
    }
}

async fn on_notice(client: Client, event: Arc<Event>) -> Result<()> {
    let Some(user) = &event.user else {
        client.register_once().await?;
        return Ok(());
    };

    let accepted = event
        .message
        .as_deref()
        .is_some_and(|m| m.starts_with(PASSWORD_ACCEPTED));
    if user.nick == NICKSERV && accepted {
        autojoin(&client).await?;
    }
    Ok(())
}

async fn on_welcome(client: Client, _event: Arc<Event>) -> Result<()> {
    if !client.tracker().welcome() {
        return Ok(());
    }
    tracing::info!(
        server = %client.config().address,
        nick = %client.current_nick(),
        "Successfully connected to server"
    );

    if client.config().has_nickserv_password() {
        client.identify().await?;
    } else {
        autojoin(&client).await?;
    }
    Ok(())
}

/// `900 RPL_LOGGEDIN`, sent by services-aware servers on identification.
async fn on_logged_in(client: Client, _event: Arc<Event>) -> Result<()> {
    autojoin(&client).await?;
    Ok(())
}

/// Enter `Identified` and join the configured channels, once per connection.
async fn autojoin(client: &Client) -> Result<()> {
    if !client.tracker().try_identify() {
        return Ok(());
    }
    tracing::info!(nick = %client.current_nick(), "Successfully identified");

    for channel in &client.config().channels {
        tracing::info!(channel, "Joining channel");
        client.join(channel).await?;
    }
    Ok(())
}

async fn on_invite(client: Client, event: Arc<Event>) -> Result<()> {
    let (Some(inviter), Some(channel)) = (event.nick(), event.args.get(1)) else {
        return Ok(());
    };
    let channel = channel.strip_prefix(':').unwrap_or(channel);

    tracing::info!(channel, inviter, "Invited to channel");
    client.join(channel).await?;
    client
        .privmsg(channel, &format!("Hi {channel}, {inviter} invited me here."))
        .await?;
    Ok(())
}

async fn on_nick_in_use(client: Client, _event: Arc<Event>) -> Result<()> {
    let taken = client.current_nick();
    match client.tracker().next_nick() {
        Some(next) => {
            tracing::warn!(taken, next, "Nick already in use, trying another");
            client.nick(&next).await?;
        }
        None if !client.state().welcomed => {
            tracing::error!(taken, "Nick already in use and no fallbacks left");
        }
        None => {}
    }
    Ok(())
}

async fn on_nick(client: Client, event: Arc<Event>) -> Result<()> {
    let (Some(old), Some(new)) = (event.nick(), event.args.first()) else {
        return Ok(());
    };
    if old == client.current_nick() {
        let new = new.strip_prefix(':').unwrap_or(new);
        tracing::info!(old, new, "Nick changed");
        client.tracker().set_nick(new);
    }
    Ok(())
}
