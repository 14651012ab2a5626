//! Per-server connection settings.
//!
//! The SDK never loads files itself; the caller deserializes a
//! [`ServerConfig`] however it likes (the `ircbot` binary uses TOML) and hands
//! it to [`Client::new`](crate::client::Client::new).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fallback for nickname, username and realname when left empty.
pub const DEFAULT_IDENT: &str = "ircbot";

/// Everything needed to connect to one server and run the built-in
/// registration, identification and autojoin sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Hostname or IP of the server.
    pub address: String,
    pub port: u16,
    pub nickname: String,
    /// Ident sent in USER.
    pub username: String,
    pub realname: String,
    /// Sent to NickServ after the welcome numeric. Empty disables identification.
    pub nickserv_password: String,
    /// Joined in order once identified.
    pub channels: Vec<String>,
    /// Nicks allowed to run admin commands.
    pub admins: Vec<String>,
    /// Nicks whose events are never dispatched.
    pub ignore: Vec<String>,
}

impl ServerConfig {
    /// `address:port`, as dialed by [`Client::connect`](crate::client::Client::connect).
    pub fn addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Check required fields and fill in identity defaults.
    ///
    /// `name` is the server's key in the caller's config, used in errors.
    pub fn validate(&mut self, name: &str) -> Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::MissingAddress { server: name.to_string() });
        }
        if self.port == 0 {
            return Err(ConfigError::MissingPort { server: name.to_string() });
        }

        if self.nickname.is_empty() {
            self.nickname = DEFAULT_IDENT.to_string();
        }
        if self.nickname.chars().count() < 3 {
            return Err(ConfigError::NickTooShort {
                server: name.to_string(),
                nick: self.nickname.clone(),
            });
        }
        if self.username.is_empty() {
            self.username = DEFAULT_IDENT.to_string();
        }
        if self.realname.is_empty() {
            self.realname = DEFAULT_IDENT.to_string();
        }
        Ok(())
    }

    pub fn has_nickserv_password(&self) -> bool {
        !self.nickserv_password.is_empty()
    }
}
