//! End-to-end client sessions against a scripted server.
//!
//! Tests cover:
//! - Registration, NickServ identification, autojoin and PING over TCP
//! - Reply routing for private messages
//! - One reconnect per dropped connection, then the dial error
//! - Quit and requested disconnects never reconnect, even when the server
//!   hangs up on QUIT
//! - Ignored users, malformed lines and failing handlers over an in-memory stream

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use ircbot_sdk::{Client, Code, ConnectError, Phase, SendError, ServerConfig};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadBuf,
    ReadHalf, WriteHalf,
};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

const STEP: Duration = Duration::from_secs(5);

fn config(port: u16) -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1".to_string(),
        port,
        nickname: "bot".to_string(),
        username: "botuser".to_string(),
        realname: "Test Bot".to_string(),
        nickserv_password: "sekrit".to_string(),
        channels: vec!["#chan".to_string()],
        admins: vec!["boss".to_string()],
        ignore: vec!["pest".to_string()],
    }
}

struct Peer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Peer {
    async fn accept(listener: &TcpListener) -> Peer {
        let (stream, _) = tokio::time::timeout(STEP, listener.accept()).await.unwrap().unwrap();
        let (reader, writer) = stream.into_split();
        Peer {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
    }

    async fn expect(&mut self, want: &str) {
        let got = tokio::time::timeout(STEP, self.lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.as_deref(), Some(want));
    }
}

#[tokio::test]
async fn full_session_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let client = Client::new(config(port));
    client.on("PRIVMSG", |client, event| async move {
        if let Some(to) = &event.reply_to {
            client.privmsg(to, "hi").await?;
        }
        Ok(())
    });
    client.connect().await.unwrap();
    let running = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });

    let mut server = Peer::accept(&listener).await;
    server.send(":irc.test NOTICE * :*** Looking up your hostname...").await;
    server.expect("USER botuser 8 * :Test Bot").await;
    server.expect("NICK bot").await;

    server.send(":irc.test 001 bot :Welcome to the test network").await;
    server.expect("NS IDENTIFY sekrit").await;
    server
        .send(":NickServ!NickServ@services.test NOTICE bot :Password accepted - you are now recognized.")
        .await;
    server.expect("JOIN #chan").await;
    assert_eq!(client.wait_for(Phase::Identified).await.phase, Phase::Identified);

    server.send("PING :irc.test").await;
    server.expect("PONG :irc.test").await;

    server.send(":friend!f@friend.host PRIVMSG bot :hello").await;
    server.expect("PRIVMSG friend :hi").await;
    server.send(":friend!f@friend.host PRIVMSG #chan :hello all").await;
    server.expect("PRIVMSG #chan :hi").await;

    client.quit("bye");
    server.expect("QUIT :bye").await;
    tokio::time::timeout(STEP, running).await.unwrap().unwrap().unwrap();

    let state = client.state();
    assert!(state.disconnected.requested);
    assert_eq!(state.phase, Phase::Disconnected);
    assert!(tokio::time::timeout(Duration::from_millis(200), listener.accept()).await.is_err());
}

#[tokio::test]
async fn server_without_prefix_on_greeting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let client = Client::new(config(port));
    let running = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });

    let mut server = Peer::accept(&listener).await;
    server.send("NOTICE AUTH :*** Looking up your hostname").await;
    server.expect("USER botuser 8 * :Test Bot").await;
    server.expect("NICK bot").await;

    client.quit("bye");
    server.expect("QUIT :bye").await;
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn reconnects_once_per_drop_then_reports_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));

    let server = tokio::spawn({
        let accepted = accepted.clone();
        async move {
            let first = Peer::accept(&listener).await;
            accepted.fetch_add(1, Ordering::SeqCst);
            drop(first);

            let second = Peer::accept(&listener).await;
            accepted.fetch_add(1, Ordering::SeqCst);
            drop(listener);
            drop(second);
        }
    });

    let client = Client::new(config(port));
    client.connect().await.unwrap();
    let result = tokio::time::timeout(STEP, client.run()).await.unwrap();
    server.await.unwrap();

    assert!(matches!(result, Err(ConnectError::Io { .. })), "{result:?}");
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    let state = client.state();
    assert!(state.disconnected.value);
    assert!(!state.disconnected.requested);
    assert!(matches!(client.send_raw("PING x").await, Err(SendError::NotConnected)));
}

#[tokio::test]
async fn requested_disconnect_stops_the_loop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let client = Client::new(config(port));
    client.on("PRIVMSG", |client, event| async move {
        if event.message.as_deref() == Some("!leave") {
            client.disconnect("asked to leave").await?;
        }
        Ok(())
    });
    let running = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });

    let mut server = Peer::accept(&listener).await;
    server.send(":boss!b@host PRIVMSG bot :!leave").await;
    server.expect("QUIT :asked to leave").await;
    tokio::time::timeout(STEP, running).await.unwrap().unwrap().unwrap();

    assert!(tokio::time::timeout(Duration::from_millis(200), listener.accept()).await.is_err());
}

/// A server that closes the connection the moment it reads QUIT, before the
/// write even completes.
struct HangUpOnQuit {
    ours: DuplexStream,
    theirs: Option<DuplexStream>,
}

impl AsyncRead for HangUpOnQuit {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.ours).poll_read(cx, buf)
    }
}

impl AsyncWrite for HangUpOnQuit {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if buf.starts_with(b"QUIT") {
            self.theirs.take();
            return Poll::Pending;
        }
        Pin::new(&mut self.ours).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.ours).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.ours).poll_shutdown(cx)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hang_up_on_quit_is_not_redialed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let client = Client::new(config(port));
    let (ours, theirs) = tokio::io::duplex(4096);
    client
        .attach(HangUpOnQuit {
            ours,
            theirs: Some(theirs),
        })
        .await;
    let running = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });

    // the QUIT write never completes, so don't wait on it
    tokio::spawn({
        let client = client.clone();
        async move {
            let _ = client.disconnect("operator says bye").await;
        }
    });

    tokio::time::timeout(STEP, running).await.unwrap().unwrap().unwrap();
    assert!(tokio::time::timeout(Duration::from_millis(500), listener.accept()).await.is_err());

    let state = client.state();
    assert_eq!(state.phase, Phase::Disconnected);
    assert!(state.disconnected.value);
    assert!(state.disconnected.requested);
}

#[tokio::test]
async fn connect_failure_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = Client::new(config(port));
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ConnectError::Io { .. }));
    assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    assert_eq!(client.state().phase, Phase::Disconnected);
}

type MemPeer = (Lines<BufReader<ReadHalf<DuplexStream>>>, WriteHalf<DuplexStream>);

async fn in_memory(client: &Client) -> MemPeer {
    let (ours, theirs) = tokio::io::duplex(8192);
    client.attach(ours).await;
    let (reader, writer) = tokio::io::split(theirs);
    (BufReader::new(reader).lines(), writer)
}

#[tokio::test]
async fn loop_survives_bad_input_and_bad_handlers() {
    let client = Client::new(config(1));
    let seen = Arc::new(AtomicUsize::new(0));

    client.on("PRIVMSG", |_, _| async { anyhow::bail!("handler error") });
    client.on("PRIVMSG", |_, event| async move {
        if event.message.as_deref() == Some("panic") {
            panic!("handler panic");
        }
        Ok(())
    });
    client.on("PRIVMSG", {
        let seen = seen.clone();
        move |_, _| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    });
    client.on(Code::ctcp("VERSION"), |client, event| async move {
        if let Some(nick) = event.nick() {
            client.ctcp_reply(nick, "VERSION ircbot-sdk").await?;
        }
        Ok(())
    });

    let (mut lines, mut writer) = in_memory(&client).await;
    let running = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });

    let input = [
        ":pest!p@host PRIVMSG #chan :ignored",
        ":",
        ":onlysource",
        "\u{fffd}garbage",
        ":a!b@c PRIVMSG #chan :panic",
        ":a!b@c PRIVMSG #chan :fine",
        ":a!b@c PRIVMSG bot :\x01VERSION\x01",
    ];
    for line in input {
        writer.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
    }
    writer.write_all(b"\xff\xfe broken utf8\r\n").await.unwrap();

    let reply = tokio::time::timeout(STEP, lines.next_line()).await.unwrap().unwrap();
    assert_eq!(reply.as_deref(), Some("NOTICE a :\x01VERSION ircbot-sdk\x01"));

    // a PING after everything else proves the loop is still reading
    writer.write_all(b"PING :still-here\r\n").await.unwrap();
    let pong = tokio::time::timeout(STEP, lines.next_line()).await.unwrap().unwrap();
    assert_eq!(pong.as_deref(), Some("PONG :still-here"));
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    client.quit("done");
    running.await.unwrap().unwrap();
}
