//! `nick!user@host` masks.

use std::fmt;

/// The sender of a user-originated event, split out of its mask.
///
/// Built fresh for every parsed line; nothing tracks users across events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    pub nick: String,
    pub user: String,
    pub host: String,
}

impl User {
    /// Split a `nick!user@host` mask, with or without a leading `:`.
    ///
    /// Returns `None` unless every part is non-empty and made only of the
    /// characters IRC allows there. Server names (`irc.example.net`) and
    /// anything with the delimiters out of order are rejected.
    pub fn parse(mask: &str) -> Option<User> {
        let mask = mask.strip_prefix(':').unwrap_or(mask);

        let (nick, rest) = mask.split_once('!')?;
        let (user, host) = rest.split_once('@')?;

        let mut nick_chars = nick.chars();
        let first = nick_chars.next()?;
        if !is_nick_start(first) || !nick_chars.all(is_nick_char) {
            return None;
        }
        if user.is_empty() || !user.chars().all(is_user_char) {
            return None;
        }
        if host.is_empty() || !host.chars().all(is_host_char) {
            return None;
        }

        Some(User {
            nick: nick.to_string(),
            user: user.to_string(),
            host: host.to_string(),
        })
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}@{}", self.nick, self.user, self.host)
    }
}

fn is_special(c: char) -> bool {
    matches!(c, '_' | '-' | '[' | ']' | '\\' | '^' | '{' | '}' | '|')
}

fn is_nick_start(c: char) -> bool {
    c.is_ascii_alphabetic() || is_special(c)
}

fn is_nick_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || is_special(c) || matches!(c, '.' | '`')
}

fn is_user_char(c: char) -> bool {
    is_nick_char(c) || c == '~'
}

// ':' appears in IPv6 hosts.
fn is_host_char(c: char) -> bool {
    is_user_char(c) || c == ':'
}
