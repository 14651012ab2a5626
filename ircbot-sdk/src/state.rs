//! Connection lifecycle state.
//!
//! One [`ConnectionState`] value per client, held in a `tokio::sync::watch`
//! channel. Only the client's connection code writes it; anyone can take a
//! snapshot or subscribe and await a phase.

use tokio::sync::watch;

/// Maximum number of alternative nicks tried after `433` before giving up.
pub const MAX_NICK_ATTEMPTS: u32 = 5;

/// Where the connection is in its lifecycle. Ordered: later phases compare
/// greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
    /// USER/NICK sent.
    Registered,
    /// NickServ accepted us (or nothing to identify with).
    Identified,
}

/// Whether the socket is down, and if so whether we asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Disconnected {
    pub value: bool,
    pub requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: Phase,
    pub registered: bool,
    pub disconnected: Disconnected,
    /// Nick we are currently using or trying to use.
    pub nick: String,
    /// The welcome numeric (`001`) arrived on this connection.
    pub welcomed: bool,
    pub nick_attempts: u32,
}

impl ConnectionState {
    fn initial(nick: &str) -> Self {
        Self {
            phase: Phase::Disconnected,
            registered: false,
            disconnected: Disconnected {
                value: true,
                requested: false,
            },
            nick: nick.to_string(),
            welcomed: false,
            nick_attempts: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnected.value && self.phase >= Phase::Connected
    }
}

/// Owner of the state value. All transitions go through here.
#[derive(Debug)]
pub struct StateTracker {
    tx: watch::Sender<ConnectionState>,
    base_nick: String,
}

impl StateTracker {
    pub fn new(nick: &str) -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::initial(nick));
        Self {
            tx,
            base_nick: nick.to_string(),
        }
    }

    pub fn snapshot(&self) -> ConnectionState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub fn nick(&self) -> String {
        self.tx.borrow().nick.clone()
    }

    /// Enter `Connecting`, returning the phase to restore if the dial fails.
    pub fn begin_connect(&self) -> Phase {
        let mut previous = Phase::Disconnected;
        self.tx.send_modify(|s| {
            previous = s.phase;
            s.phase = Phase::Connecting;
        });
        previous
    }

    pub fn abort_connect(&self, previous: Phase) {
        self.tx.send_modify(|s| s.phase = previous);
    }

    /// A fresh socket is up. Per-connection flags start over.
    pub fn connected(&self) {
        let nick = self.base_nick.clone();
        self.tx.send_modify(|s| {
            s.phase = Phase::Connected;
            s.registered = false;
            s.welcomed = false;
            s.nick_attempts = 0;
            s.nick = nick;
            s.disconnected = Disconnected::default();
        });
    }

    /// Mark USER/NICK as sent. Returns `false` if that already happened on
    /// this connection or there is no connection.
    pub fn try_register(&self) -> bool {
        self.tx.send_if_modified(|s| {
            if s.registered || !s.is_connected() {
                return false;
            }
            s.registered = true;
            if s.phase < Phase::Registered {
                s.phase = Phase::Registered;
            }
            true
        })
    }

    /// Record the welcome numeric. Returns `true` the first time per connection.
    pub fn welcome(&self) -> bool {
        self.tx.send_if_modified(|s| {
            if s.welcomed {
                return false;
            }
            s.welcomed = true;
            true
        })
    }

    /// Enter `Identified`. Returns `true` only on the transition itself.
    pub fn try_identify(&self) -> bool {
        self.tx.send_if_modified(|s| {
            if s.phase == Phase::Identified || !s.is_connected() {
                return false;
            }
            s.phase = Phase::Identified;
            true
        })
    }

    /// Next nick to try after `433`, or `None` once welcomed or out of attempts.
    pub fn next_nick(&self) -> Option<String> {
        let base = &self.base_nick;
        let mut next = None;
        self.tx.send_if_modified(|s| {
            if s.welcomed || s.nick_attempts >= MAX_NICK_ATTEMPTS {
                return false;
            }
            s.nick_attempts += 1;
            s.nick = format!("{base}{}", s.nick_attempts);
            next = Some(s.nick.clone());
            true
        });
        next
    }

    /// The server confirmed a nick change for us.
    pub fn set_nick(&self, nick: &str) {
        self.tx.send_if_modified(|s| {
            if s.nick == nick {
                return false;
            }
            s.nick = nick.to_string();
            true
        });
    }

    /// The socket went away on its own. Returns `false`, leaving the state
    /// alone, when a disconnect was already requested.
    pub fn dropped(&self) -> bool {
        self.tx.send_if_modified(|s| {
            if s.disconnected.value && s.disconnected.requested {
                return false;
            }
            s.phase = Phase::Disconnected;
            s.disconnected = Disconnected {
                value: true,
                requested: false,
            };
            true
        })
    }

    pub fn disconnected(&self, requested: bool) {
        self.tx.send_modify(|s| {
            s.phase = Phase::Disconnected;
            s.disconnected = Disconnected {
                value: true,
                requested,
            };
        });
    }
}
