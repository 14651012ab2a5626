//! A single server connection and its read loop.
//!
//! [`Client`] is a cheap, cloneable handle. It owns the socket, the handler
//! registry and the connection state, and is what every handler receives.
//!
//! ## Lifecycle
//!
//! 1. [`Client::new`] installs the built-in handlers (registration on the
//!    server's first notice, NickServ identification after `001`, autojoin
//!    once identified, joining on INVITE).
//! 2. [`Client::connect`] dials `address:port` with a 5 second timeout.
//! 3. [`Client::run`] reads lines until [`Client::quit`] is called or the
//!    connection drops. Each line is parsed and dispatched on its own task.
//!
//! ## Reconnection
//!
//! When the connection drops without a requested disconnect, `run` makes
//! exactly one reconnect attempt. If that dial fails, the error is returned
//! and nothing more is tried; callers wanting backoff can loop around `run`.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::automation;
use crate::config::ServerConfig;
use crate::dispatch::Registry;
use crate::error::{ConnectError, ParseError, SendError};
use crate::event::{Code, Event};
use crate::state::{ConnectionState, Phase, StateTracker};
use crate::user::User;

/// Upper bound on dialing the server.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest inbound line accepted, terminator included.
pub const MAX_LINE_LEN: usize = 64 * 1024;

type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Handle to one server connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServerConfig,
    state: StateTracker,
    handlers: Registry<Client>,
    /// Serializes outbound lines from concurrent handlers.
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    /// Taken by the read loop for the lifetime of a connection.
    reader: parking_lot::Mutex<Option<BoxedReader>>,
    quit_tx: mpsc::Sender<String>,
    quit_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
}

/// Why a read session stopped.
enum SessionEnd {
    Requested,
    Closed(Option<io::Error>),
}

impl Client {
    /// Create a client for `config`. Nothing is dialed until
    /// [`connect`](Client::connect) or [`run`](Client::run).
    pub fn new(config: ServerConfig) -> Self {
        tracing::info!(
            server = %config.address,
            port = config.port,
            "Generating new server connection"
        );

        let (quit_tx, quit_rx) = mpsc::channel(1);
        let client = Self {
            inner: Arc::new(Inner {
                state: StateTracker::new(&config.nickname),
                config,
                handlers: Registry::new(),
                writer: tokio::sync::Mutex::new(None),
                reader: parking_lot::Mutex::new(None),
                quit_tx,
                quit_rx: tokio::sync::Mutex::new(quit_rx),
            }),
        };
        automation::install(&client);
        client
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Snapshot of the connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.snapshot()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the connection reaches `phase` (or a later one).
    pub async fn wait_for(&self, phase: Phase) -> ConnectionState {
        let mut rx = self.subscribe();
        let reached = rx.wait_for(|s| s.phase >= phase).await.map(|s| s.clone());
        // the sender lives as long as `self`
        reached.unwrap_or_else(|_| self.state())
    }

    /// The nick we currently go by on this connection.
    pub fn current_nick(&self) -> String {
        self.inner.state.nick()
    }

    pub(crate) fn tracker(&self) -> &StateTracker {
        &self.inner.state
    }

    /// Register `handler` for events with `code`. Handlers for the same code
    /// are started in registration order.
    pub fn on<F, Fut>(&self, code: impl Into<Code>, handler: F) -> &Self
    where
        F: Fn(Client, Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.handlers.register(code, handler);
        self
    }

    pub fn handler_count(&self, code: &Code) -> usize {
        self.inner.handlers.count(code)
    }

    pub fn is_admin(&self, user: &User) -> bool {
        self.inner.config.admins.iter().any(|nick| *nick == user.nick)
    }

    pub fn is_ignored(&self, user: &User) -> bool {
        self.inner.config.ignore.iter().any(|nick| *nick == user.nick)
    }

    /// Dial the configured server. On failure the state is left as it was and
    /// the caller may retry.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let addr = self.inner.config.addr();
        let previous = self.inner.state.begin_connect();

        tracing::debug!(%addr, "Dialing");
        let tcp = match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(source)) => {
                self.inner.state.abort_connect(previous);
                return Err(ConnectError::Io { addr, source });
            }
            Err(_) => {
                self.inner.state.abort_connect(previous);
                return Err(ConnectError::Timeout {
                    addr,
                    timeout: DIAL_TIMEOUT,
                });
            }
        };

        self.attach(tcp).await;
        tracing::info!(%addr, "Connected");
        Ok(())
    }

    /// Use an already established stream as the connection.
    pub async fn attach<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        *self.inner.writer.lock().await = Some(Box::new(writer));
        *self.inner.reader.lock() = Some(Box::new(BufReader::new(reader)));
        self.inner.state.connected();
    }

    /// Send one line. CR and LF are stripped from `line` before the CRLF
    /// terminator is appended.
    pub async fn send_raw(&self, line: &str) -> Result<(), SendError> {
        let line = sanitize(line);
        tracing::debug!(server = %self.inner.config.address, ">> {line:?}");
        self.write_line(&line).await
    }

    /// Like [`send_raw`](Client::send_raw) but keeps the line out of the logs.
    pub(crate) async fn send_secret(&self, line: &str) -> Result<(), SendError> {
        self.write_line(&sanitize(line)).await
    }

    async fn write_line(&self, line: &str) -> Result<(), SendError> {
        let mut guard = self.inner.writer.lock().await;
        let writer = guard.as_mut().ok_or(SendError::NotConnected)?;
        writer.write_all(format!("{line}\r\n").as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Send USER and NICK and mark the connection registered.
    ///
    /// The server's `001` is the real confirmation; it arrives as an event.
    pub async fn register(&self) -> Result<(), SendError> {
        self.inner.state.try_register();
        self.send_registration().await
    }

    /// Register unless this connection already did. Returns whether USER/NICK
    /// were sent.
    pub(crate) async fn register_once(&self) -> Result<bool, SendError> {
        if !self.inner.state.try_register() {
            return Ok(false);
        }
        self.send_registration().await?;
        Ok(true)
    }

    async fn send_registration(&self) -> Result<(), SendError> {
        let config = &self.inner.config;
        tracing::info!(nick = %self.current_nick(), "Registering with server");
        self.send_raw(&format!("USER {} 8 * :{}", config.username, config.realname))
            .await?;
        self.send_raw(&format!("NICK {}", self.current_nick())).await
    }

    /// Identify to NickServ. Does nothing when no password is configured.
    pub async fn identify(&self) -> Result<(), SendError> {
        let password = &self.inner.config.nickserv_password;
        if password.is_empty() {
            tracing::debug!("No NickServ password configured, skipping identify");
            return Ok(());
        }
        tracing::info!("Identifying to NickServ");
        self.send_secret(&format!("NS IDENTIFY {password}")).await
    }

    /// Send QUIT with `reason` and close the connection. The read loop will
    /// not reconnect after this.
    pub async fn disconnect(&self, reason: &str) -> Result<(), SendError> {
        // marked first: the server may hang up as soon as it reads QUIT
        self.inner.state.disconnected(true);
        let sent = self.send_raw(&format!("QUIT :{reason}")).await;
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.inner.reader.lock().take();
        tracing::info!(server = %self.inner.config.address, reason, "Disconnected");
        sent
    }

    /// Ask the read loop to disconnect with `reason` and stop. Best effort: a
    /// second request before the first is handled is dropped.
    pub fn quit(&self, reason: impl Into<String>) {
        let _ = self.inner.quit_tx.try_send(reason.into());
    }

    /// Read and dispatch lines until a quit or requested disconnect.
    ///
    /// Connects first if no connection is established. When the connection
    /// drops on its own, one reconnect is attempted; its failure is returned.
    pub async fn run(&self) -> Result<(), ConnectError> {
        let mut quit_rx = self.inner.quit_rx.lock().await;

        loop {
            let reader = self.inner.reader.lock().take();
            let reader = match reader {
                Some(reader) => reader,
                None => {
                    self.connect().await?;
                    continue;
                }
            };

            match self.read_session(reader, &mut quit_rx).await {
                SessionEnd::Requested => return Ok(()),
                SessionEnd::Closed(err) => {
                    if !self.inner.state.dropped() {
                        return Ok(());
                    }
                    self.inner.writer.lock().await.take();
                    match err {
                        Some(e) => tracing::error!(error = %e, "Error while looping"),
                        None => tracing::warn!("Server closed the connection"),
                    }

                    if let Err(e) = self.connect().await {
                        tracing::error!(error = %e, "Can't (re)connect to server");
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn read_session(
        &self,
        mut reader: BoxedReader,
        quit_rx: &mut mpsc::Receiver<String>,
    ) -> SessionEnd {
        let mut state_rx = self.subscribe();
        let mut buf = Vec::with_capacity(512);

        loop {
            buf.clear();
            tokio::select! {
                reason = quit_rx.recv() => {
                    let reason = reason.unwrap_or_default();
                    if let Err(e) = self.disconnect(&reason).await {
                        tracing::warn!(error = %e, "Failed to send QUIT");
                    }
                    return SessionEnd::Requested;
                }
                _ = disconnect_requested(&mut state_rx) => {
                    return SessionEnd::Requested;
                }
                read = read_line(&mut reader, &mut buf) => {
                    match read {
                        Ok(0) => return SessionEnd::Closed(None),
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf)
                                .trim_end_matches(['\r', '\n'])
                                .to_string();
                            let client = self.clone();
                            tokio::spawn(async move { client.handle_line(&line).await });
                        }
                        Err(e) => return SessionEnd::Closed(Some(e)),
                    }
                }
            }
        }
    }

    /// Parse and dispatch one CR/LF-stripped line.
    pub async fn handle_line(&self, raw: &str) {
        tracing::debug!(server = %self.inner.config.address, "<< {raw:?}");

        let event = match Event::parse(raw, &self.current_nick()) {
            Ok(event) => event,
            Err(ParseError::Empty) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed line");
                return;
            }
        };

        if let Some(token) = event.ping_token() {
            if let Err(e) = self.pong(token).await {
                tracing::warn!(error = %e, "Failed to answer PING");
            }
            return;
        }

        if event.code.is_none() {
            // `NOTICE AUTH :*** Looking up your hostname` from servers that
            // send no prefix before registration
            if event.raw.starts_with("NOTICE ") {
                automation::greeted(self).await;
            }
            return;
        }

        if let Some(user) = &event.user
            && self.is_ignored(user)
        {
            tracing::debug!(nick = %user.nick, "Ignoring event from ignored user");
            return;
        }

        let event = Arc::new(event);
        self.inner.handlers.dispatch(self, event.clone());
        self.log_notable(&event);
    }

    fn log_notable(&self, event: &Event) {
        let Some(code) = &event.code else { return };
        let channel = event.args.get(1).map(String::as_str).unwrap_or_default();
        match code {
            Code::Numeric(404) => tracing::warn!(channel, "Can't send to channel"),
            Code::Numeric(474) => tracing::warn!(channel, "Can't join channel"),
            kick if kick.is_command("KICK") && channel == self.current_nick() => {
                tracing::warn!(
                    user = event.nick().unwrap_or_default(),
                    channel = event.args.first().map(String::as_str).unwrap_or_default(),
                    "We got kicked from a channel"
                );
            }
            _ => {}
        }
    }
}

/// Read one `\n`-terminated line into `buf`. A line longer than
/// [`MAX_LINE_LEN`] is an `InvalidData` error and ends the session.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let n = reader.take(MAX_LINE_LEN as u64).read_until(b'\n', buf).await?;
    if n == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line longer than {MAX_LINE_LEN} bytes"),
        ));
    }
    Ok(n)
}

/// Resolves once someone called [`Client::disconnect`].
async fn disconnect_requested(rx: &mut watch::Receiver<ConnectionState>) {
    let _ = rx
        .wait_for(|s| s.disconnected.value && s.disconnected.requested)
        .await;
}

fn sanitize(line: &str) -> String {
    line.replace(['\r', '\n'], "")
}
