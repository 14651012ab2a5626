//! Outbound command helpers.
//!
//! Thin wrappers that format a line and hand it to [`Client::send_raw`], so
//! every one of them gets the same CR/LF stripping.

use crate::client::Client;
use crate::error::SendError;
use crate::event::CTCP_DELIM;

/// Reason used by [`Client::kick`] when none is given.
pub const DEFAULT_KICK_REASON: &str = "Requested";

impl Client {
    pub async fn join(&self, channel: &str) -> Result<(), SendError> {
        self.send_raw(&format!("JOIN {channel}")).await
    }

    pub async fn part(&self, channel: &str, reason: Option<&str>) -> Result<(), SendError> {
        match reason {
            Some(reason) => self.send_raw(&format!("PART {channel} :{reason}")).await,
            None => self.send_raw(&format!("PART {channel}")).await,
        }
    }

    pub async fn privmsg(&self, target: &str, text: &str) -> Result<(), SendError> {
        self.send_raw(&format!("PRIVMSG {target} :{text}")).await
    }

    pub async fn notice(&self, target: &str, text: &str) -> Result<(), SendError> {
        self.send_raw(&format!("NOTICE {target} :{text}")).await
    }

    /// `/me` style message.
    pub async fn action(&self, target: &str, text: &str) -> Result<(), SendError> {
        self.ctcp(target, &format!("ACTION {text}")).await
    }

    /// Send a CTCP query: `payload` wrapped in `0x01` inside a PRIVMSG.
    pub async fn ctcp(&self, target: &str, payload: &str) -> Result<(), SendError> {
        self.privmsg(target, &format!("{CTCP_DELIM}{payload}{CTCP_DELIM}"))
            .await
    }

    /// Answer a CTCP query. Replies travel as NOTICE so they never trigger
    /// another bot's handlers.
    pub async fn ctcp_reply(&self, target: &str, payload: &str) -> Result<(), SendError> {
        self.notice(target, &format!("{CTCP_DELIM}{payload}{CTCP_DELIM}"))
            .await
    }

    pub async fn kick(&self, channel: &str, nick: &str, reason: Option<&str>) -> Result<(), SendError> {
        let reason = reason.unwrap_or(DEFAULT_KICK_REASON);
        self.send_raw(&format!("KICK {channel} {nick} :{reason}")).await
    }

    pub async fn invite(&self, nick: &str, channel: &str) -> Result<(), SendError> {
        self.send_raw(&format!("INVITE {nick} {channel}")).await
    }

    /// Set `modes` on `target`, with optional mode parameters.
    pub async fn mode(&self, target: &str, modes: &str, params: &[&str]) -> Result<(), SendError> {
        if params.is_empty() {
            self.send_raw(&format!("MODE {target} {modes}")).await
        } else {
            self.send_raw(&format!("MODE {target} {modes} {}", params.join(" ")))
                .await
        }
    }

    pub async fn ban(&self, channel: &str, mask: &str) -> Result<(), SendError> {
        self.mode(channel, "+b", &[mask]).await
    }

    pub async fn unban(&self, channel: &str, mask: &str) -> Result<(), SendError> {
        self.mode(channel, "-b", &[mask]).await
    }

    /// Ban `*!*@host` then kick `nick`.
    pub async fn kick_ban(
        &self,
        channel: &str,
        nick: &str,
        host: &str,
        reason: Option<&str>,
    ) -> Result<(), SendError> {
        self.ban(channel, &format!("*!*@{host}")).await?;
        self.kick(channel, nick, reason).await
    }

    /// Ask the server for a new nick. The state follows once the server
    /// echoes the NICK back.
    pub async fn nick(&self, nick: &str) -> Result<(), SendError> {
        self.send_raw(&format!("NICK {nick}")).await
    }

    pub async fn pong(&self, token: &str) -> Result<(), SendError> {
        self.send_raw(&format!("PONG {token}")).await
    }
}
