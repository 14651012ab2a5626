//! Parsed server lines and their dispatch codes.

use std::fmt;

use crate::error::ParseError;
use crate::user::User;

/// CTCP payloads are wrapped in this byte inside PRIVMSG/NOTICE text.
pub const CTCP_DELIM: char = '\x01';

/// The dispatch key of an [`Event`].
///
/// Resolved once while parsing. A CTCP query inside a PRIVMSG is dispatched
/// as [`Code::Ctcp`], never as `PRIVMSG`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Code {
    /// Three-digit server reply, e.g. `001` or `404`.
    Numeric(u16),
    /// Named command verb, matched case-sensitively (`PRIVMSG`, `KICK`, `INVITE`...).
    Command(String),
    /// CTCP action keyword (`VERSION`, `ACTION`, `PING`...).
    Ctcp(String),
}

impl Code {
    /// Classify a command token as it appears on the wire.
    pub fn from_wire(token: &str) -> Code {
        if token.len() == 3 && token.bytes().all(|b| b.is_ascii_digit()) {
            // three ASCII digits always fit
            Code::Numeric(token.parse().unwrap_or_default())
        } else {
            Code::Command(token.to_string())
        }
    }

    pub fn ctcp(action: impl Into<String>) -> Code {
        Code::Ctcp(action.into())
    }

    pub fn is_command(&self, verb: &str) -> bool {
        matches!(self, Code::Command(c) if c == verb)
    }
}

impl From<&str> for Code {
    fn from(token: &str) -> Self {
        Code::from_wire(token)
    }
}

impl From<u16> for Code {
    fn from(numeric: u16) -> Self {
        Code::Numeric(numeric)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Numeric(n) => write!(f, "{n:03}"),
            Code::Command(c) | Code::Ctcp(c) => f.write_str(c),
        }
    }
}

/// One inbound line, split into the pieces handlers care about.
///
/// Shared by reference with every matching handler; never mutated after
/// [`Event::parse`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The line as received, minus trailing CR/LF.
    pub raw: String,
    /// Text between the leading `:` and the first space. Empty for lines
    /// without a prefix.
    pub source: String,
    /// `None` for lines without a prefix (bare `PING`, `ERROR`...).
    pub code: Option<Code>,
    /// Remaining space-separated tokens, verbatim (a trailing parameter keeps
    /// its `:`). For CTCP, the words after the action keyword.
    pub args: Vec<String>,
    /// Set when `source` is a valid `nick!user@host` mask.
    pub user: Option<User>,
    /// First parameter of a PRIVMSG/NOTICE, before any CTCP rewrite.
    pub target: Option<String>,
    /// PRIVMSG/NOTICE text with the `:` marker removed. For CTCP, the
    /// unwrapped payload.
    pub message: Option<String>,
    /// Where a reply should go: the channel, or the sender for a PRIVMSG
    /// addressed to our own nick.
    pub reply_to: Option<String>,
}

impl Event {
    /// Parse one line. `own_nick` is our current nickname, used to resolve
    /// [`reply_to`](Event::reply_to) for private messages.
    pub fn parse(raw: &str, own_nick: &str) -> Result<Event, ParseError> {
        let raw = raw.trim_end_matches(['\r', '\n']);
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut event = Event {
            raw: raw.to_string(),
            source: String::new(),
            code: None,
            args: Vec::new(),
            user: None,
            target: None,
            message: None,
            reply_to: None,
        };

        let Some(prefixed) = raw.strip_prefix(':') else {
            return Ok(event);
        };

        let mut tokens = prefixed.split(' ');
        let source = tokens.next().unwrap_or_default();
        let code = match tokens.next() {
            Some(code) if !code.is_empty() => code,
            _ => return Err(ParseError::MissingCode { raw: raw.to_string() }),
        };

        event.source = source.to_string();
        event.code = Some(Code::from_wire(code));
        event.args = tokens.map(str::to_string).collect();
        event.user = User::parse(source);

        let is_privmsg = code == "PRIVMSG";
        if is_privmsg || code == "NOTICE" {
            event.target = event.args.first().cloned();

            if event.args.len() > 1 {
                let joined = event.args[1..].join(" ");
                let mut text = joined.strip_prefix(':').unwrap_or(&joined).to_string();

                if is_privmsg && is_ctcp(&text) {
                    let inner = text.trim_matches(CTCP_DELIM).to_string();
                    let mut words = inner.split(' ');
                    let action = words.next().unwrap_or_default();
                    if !action.is_empty() {
                        event.code = Some(Code::ctcp(action));
                        event.args = words.map(str::to_string).collect();
                    }
                    text = inner;
                }

                event.message = Some(text.trim().to_string());
            }

            if is_privmsg {
                event.reply_to = resolve_reply_to(&event, own_nick);
            }
        }

        Ok(event)
    }

    /// The sender's nick, when the source was a user mask.
    pub fn nick(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.nick.as_str())
    }

    /// Token of a bare `PING <token>` line.
    pub fn ping_token(&self) -> Option<&str> {
        if self.code.is_some() {
            return None;
        }
        match self.raw.split_once(' ') {
            Some(("PING", token)) => Some(token),
            _ if self.raw == "PING" => Some(""),
            _ => None,
        }
    }
}

fn resolve_reply_to(event: &Event, own_nick: &str) -> Option<String> {
    let first = event.args.first()?;
    if is_channel(first) {
        Some(first.clone())
    } else if first == own_nick {
        event.nick().map(str::to_string)
    } else {
        None
    }
}

/// Whether `name` is a channel rather than a nick.
pub fn is_channel(name: &str) -> bool {
    name.starts_with('#')
}

/// Whether `text` is a CTCP payload, i.e. starts and ends with `0x01`.
pub fn is_ctcp(text: &str) -> bool {
    text.starts_with(CTCP_DELIM) && text.ends_with(CTCP_DELIM)
}
