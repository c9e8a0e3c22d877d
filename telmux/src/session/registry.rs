//! Registry of live sessions keyed by caller-supplied session keys.

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{PumpExit, Session, SessionKey, SessionState};
use crate::autopilot::CredentialAutopilot;
use crate::channel::{Decoder, Terminal, VteDecoder};
use crate::error::Result;
use crate::transport::{ConnectionReader, RawConnection, SessionConfig};

/// Concurrent map of session keys to live sessions.
///
/// Operations on keys that are not registered are silent no-ops: a session
/// may close between a caller's lookup and its action, and that is not an
/// error. No map lock is held across an await point.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use telmux::{SessionBuilder, SessionRegistry, Terminal};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(terminal: Arc<dyn Terminal>) -> Result<(), telmux::Error> {
/// let registry = Arc::new(SessionRegistry::new());
/// let config = SessionBuilder::new("10.0.0.1")
///     .login("login: ", "admin")
///     .password("Password: ", "secret")
///     .build()?;
///
/// registry.connect("conn-1", &config, terminal).await?;
/// let pump = registry.spawn_read_loop("conn-1", CancellationToken::new());
///
/// registry.write("conn-1", "uptime\r\n").await?;
/// registry.disconnect("conn-1").await;
/// pump.await.ok();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, Arc<Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Connect to the host in `config` and register the session under `key`.
    ///
    /// Output is decoded by a [`VteDecoder`] writing to `terminal`. An
    /// existing entry for `key` is replaced but not closed; callers must not
    /// reuse the key of a live session.
    pub async fn connect(
        &self,
        key: impl Into<SessionKey>,
        config: &SessionConfig,
        terminal: Arc<dyn Terminal>,
    ) -> Result<Arc<Session>> {
        let decoder = Box::new(VteDecoder::new(Arc::clone(&terminal)));
        self.connect_with_decoder(key, config, decoder, terminal)
            .await
    }

    /// Like [`connect`](Self::connect), with a caller-supplied decoder.
    pub async fn connect_with_decoder(
        &self,
        key: impl Into<SessionKey>,
        config: &SessionConfig,
        mut decoder: Box<dyn Decoder>,
        terminal: Arc<dyn Terminal>,
    ) -> Result<Arc<Session>> {
        let key = key.into();
        decoder.set_encoding(&config.encoding, config.alternate_encoding())?;

        let (_, reader) = RawConnection::connect(config).await?;
        Ok(self.register(key, reader, decoder, config, terminal))
    }

    /// Register a session over an already-established byte stream.
    pub fn attach<S>(
        &self,
        key: impl Into<SessionKey>,
        stream: S,
        config: &SessionConfig,
        mut decoder: Box<dyn Decoder>,
        terminal: Arc<dyn Terminal>,
    ) -> Result<Arc<Session>>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let key = key.into();
        decoder.set_encoding(&config.encoding, config.alternate_encoding())?;

        let (_, reader) = RawConnection::from_stream(stream, config)?;
        Ok(self.register(key, reader, decoder, config, terminal))
    }

    fn register(
        &self,
        key: SessionKey,
        reader: ConnectionReader,
        decoder: Box<dyn Decoder>,
        config: &SessionConfig,
        terminal: Arc<dyn Terminal>,
    ) -> Arc<Session> {
        let autopilot = CredentialAutopilot::from_config(config);
        let session = Arc::new(Session::new(key.clone(), reader, decoder, autopilot, terminal));
        session.set_state(SessionState::Connected);

        if let Some(previous) = self.sessions.insert(key.clone(), Arc::clone(&session)) {
            warn!(
                "registry: session {} replaced a live entry (old connected={})",
                key,
                previous.is_connected()
            );
        }

        info!(
            "registry: session {} connected to {}",
            key,
            config.socket_addr()
        );
        session
    }

    /// Close and remove the session under `key`, if any.
    pub async fn disconnect(&self, key: &str) {
        let Some((_, session)) = self.sessions.remove(key) else {
            trace!("registry: disconnect for unknown session {}", key);
            return;
        };

        info!("registry: session {} disconnected", key);
        session.close().await;
    }

    /// Close and remove every session.
    pub async fn disconnect_all(&self) {
        for key in self.keys() {
            self.disconnect(&key).await;
        }
    }

    /// Send `text` to the session under `key`, if any.
    ///
    /// Fails only when the session exists and its connection does.
    pub async fn write(&self, key: &str, text: &str) -> Result<()> {
        let Some(session) = self.get(key) else {
            trace!("registry: write to unknown session {}", key);
            return Ok(());
        };
        session.write(text).await
    }

    /// Look up a session.
    pub fn get(&self, key: &str) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether a session is registered under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.sessions.contains_key(key)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Keys of all registered sessions.
    pub fn keys(&self) -> Vec<SessionKey> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Pump the session under `key` until it closes or `cancel` fires.
    ///
    /// On exit the terminal is stopped and the session is removed from the
    /// registry, and the reason is returned. Returns `None` immediately for
    /// unknown keys and for sessions whose pump is already running.
    pub async fn run_read_loop(&self, key: &str, cancel: CancellationToken) -> Option<PumpExit> {
        let Some(session) = self.get(key) else {
            debug!("registry: no session {} to pump", key);
            return None;
        };
        let Some(pump) = session.take_pump() else {
            warn!("registry: session {} already has a read loop", key);
            return None;
        };

        debug!("session {}: read loop started", key);
        let exit = pump.run(&session, &cancel).await;
        session.set_state(SessionState::Draining);
        debug!("session {}: read loop ended: {:?}", key, exit);

        self.release(&session).await;
        Some(exit)
    }

    /// Spawn [`run_read_loop`](Self::run_read_loop) on the tokio runtime.
    pub fn spawn_read_loop(
        self: &Arc<Self>,
        key: impl Into<SessionKey>,
        cancel: CancellationToken,
    ) -> JoinHandle<Option<PumpExit>> {
        let registry = Arc::clone(self);
        let key = key.into();
        tokio::spawn(async move { registry.run_read_loop(&key, cancel).await })
    }

    /// Teardown after a pump exits.
    ///
    /// Only removes the entry if it still refers to this session, so a
    /// replacement registered under the same key survives.
    async fn release(&self, session: &Arc<Session>) {
        let removed = self
            .sessions
            .remove_if(session.key(), |_, current| Arc::ptr_eq(current, session))
            .is_some();
        if removed {
            info!("registry: session {} closed", session.key());
        }

        session.close().await;
        session.finish().await;
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf, duplex};
    use tokio::net::TcpListener;

    use super::*;
    use crate::channel::terminal::tests::{Output, RecordingTerminal};
    use crate::error::{ConnectError, Error, TransportError};
    use crate::session::SessionBuilder;

    fn config() -> SessionConfig {
        SessionBuilder::new("127.0.0.1")
            .login("login: ", "alice")
            .password("Password: ", "hunter2")
            .build()
            .unwrap()
    }

    fn attach_with<S>(
        registry: &SessionRegistry,
        key: &str,
        stream: S,
        config: &SessionConfig,
    ) -> (Arc<Session>, Arc<RecordingTerminal>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let terminal = Arc::new(RecordingTerminal::default());
        let decoder = Box::new(VteDecoder::new(terminal.clone()));
        let session = registry
            .attach(key, stream, config, decoder, terminal.clone())
            .unwrap();
        (session, terminal)
    }

    fn attach(
        registry: &SessionRegistry,
        key: &str,
        buffer: usize,
    ) -> (Arc<Session>, DuplexStream, Arc<RecordingTerminal>) {
        let (local, remote) = duplex(buffer);
        let (session, terminal) = attach_with(registry, key, local, &config());
        (session, remote, terminal)
    }

    fn errors(terminal: &RecordingTerminal) -> Vec<String> {
        terminal
            .output()
            .into_iter()
            .filter_map(|o| match o {
                Output::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Reads never complete and every write fails.
    struct BrokenWrite;

    impl AsyncRead for BrokenWrite {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for BrokenWrite {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    async fn read_exactly(remote: &mut DuplexStream, len: usize) -> String {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(5), remote.read_exact(&mut buf))
            .await
            .expect("timed out reading from session")
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    async fn join(handle: JoinHandle<Option<PumpExit>>) -> Option<PumpExit> {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("read loop did not finish")
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_key_is_noop() {
        let registry = SessionRegistry::new();
        registry.write("missing", "hello").await.unwrap();
        registry.disconnect("missing").await;
        assert_eq!(
            registry.run_read_loop("missing", CancellationToken::new()).await,
            None
        );
        assert!(registry.is_empty());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_connect_registers_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = SessionBuilder::new("127.0.0.1").port(port).build().unwrap();

        let registry = SessionRegistry::new();
        let terminal = Arc::new(RecordingTerminal::default());
        let (connected, accepted) =
            tokio::join!(registry.connect("k1", &config, terminal), listener.accept());
        let session = connected.unwrap();
        let (mut server, _) = accepted.unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.keys(), vec!["k1".to_string()]);
        assert!(Arc::ptr_eq(&registry.get("k1").unwrap(), &session));
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.connection().port(), port);

        registry.write("k1", "hi\r\n").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi\r\n");
    }

    #[tokio::test]
    async fn test_failed_connect_not_registered() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let config = SessionBuilder::new("127.0.0.1").port(port).build().unwrap();

        let registry = SessionRegistry::new();
        let result = registry
            .connect("k1", &config, Arc::new(RecordingTerminal::default()))
            .await;

        assert!(matches!(
            result,
            Err(Error::Connect(ConnectError::ConnectionFailed { .. }))
        ));
        assert!(!registry.contains("k1"));
    }

    #[tokio::test]
    async fn test_autopilot_answers_prompts_once() {
        let _ = env_logger::builder().is_test(true).try_init();
        let registry = Arc::new(SessionRegistry::new());
        let (_session, mut remote, terminal) = attach(&registry, "k1", 1024);
        let pump = registry.spawn_read_loop("k1", CancellationToken::new());

        remote.write_all(b"Welcome\r\nlogin: ").await.unwrap();
        assert_eq!(read_exactly(&mut remote, 7).await, "alice\r\n");
        terminal.wait_for_text("Welcome\r\n").await;

        remote.write_all(b"Password: ").await.unwrap();
        assert_eq!(read_exactly(&mut remote, 9).await, "hunter2\r\n");

        // A repeated prompt is shown, not answered
        remote.write_all(b"Login incorrect\r\nlogin: ").await.unwrap();
        terminal.wait_for_text("Login incorrect\r\nlogin: ").await;
        registry.write("k1", "ls\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut remote, 4).await, "ls\r\n");

        assert!(!terminal.text().contains("Password: "));
        assert_eq!(terminal.text(), "Welcome\r\nLogin incorrect\r\nlogin: ");

        registry.disconnect("k1").await;
        join(pump).await;
    }

    #[tokio::test]
    async fn test_remote_close_removes_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, mut remote, terminal) = attach(&registry, "k1", 1024);
        let pump = registry.spawn_read_loop("k1", CancellationToken::new());

        remote.write_all(b"bye\r\n").await.unwrap();
        terminal.wait_for_text("bye").await;
        drop(remote);
        assert_eq!(join(pump).await, Some(PumpExit::Disconnected));

        assert!(!registry.contains("k1"));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.is_connected());
        assert_eq!(terminal.stop_count(), 1);
        assert!(
            !terminal
                .output()
                .iter()
                .any(|o| matches!(o, Output::Error(_)))
        );

        // Late events for the closed key are harmless
        registry.write("k1", "x").await.unwrap();
        registry.disconnect("k1").await;
        assert_eq!(terminal.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_tears_down_like_connection_loss() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, _remote, terminal) = attach(&registry, "k1", 1024);
        let cancel = CancellationToken::new();
        let pump = registry.spawn_read_loop("k1", cancel.clone());

        // The pump is parked in a read; cancellation must still end it
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert_eq!(join(pump).await, Some(PumpExit::Cancelled));

        assert!(!registry.contains("k1"));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.is_connected());
        assert_eq!(terminal.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_wakes_read_loop() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, _remote, terminal) = attach(&registry, "k1", 1024);
        let pump = registry.spawn_read_loop("k1", CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.disconnect("k1").await;
        assert_eq!(join(pump).await, Some(PumpExit::Closed));

        assert!(registry.is_empty());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(terminal.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_without_read_loop() {
        let registry = SessionRegistry::new();
        let (session, _remote, terminal) = attach(&registry, "k1", 1024);

        registry.disconnect("k1").await;
        registry.disconnect("k1").await;

        assert!(registry.is_empty());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(terminal.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_single_read_loop_per_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (_session, mut remote, terminal) = attach(&registry, "k1", 1024);
        let first = registry.spawn_read_loop("k1", CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = tokio::time::timeout(
            Duration::from_secs(1),
            registry.run_read_loop("k1", CancellationToken::new()),
        )
        .await
        .expect("second read loop should return immediately");
        assert_eq!(second, None);

        assert!(registry.contains("k1"));
        remote.write_all(b"still here").await.unwrap();
        terminal.wait_for_text("still here").await;

        drop(remote);
        join(first).await;
        assert_eq!(terminal.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_write_after_connection_loss_fails() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, remote, _terminal) = attach(&registry, "k1", 1024);
        let pump = registry.spawn_read_loop("k1", CancellationToken::new());

        drop(remote);
        join(pump).await;

        assert!(matches!(
            session.write("x").await,
            Err(Error::Transport(TransportError::Disconnected))
        ));
    }

    #[tokio::test]
    async fn test_replacement_survives_old_read_loop() {
        let registry = Arc::new(SessionRegistry::new());
        let (_old, old_remote, _) = attach(&registry, "k1", 1024);
        let old_pump = registry.spawn_read_loop("k1", CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (new, _new_remote, _) = attach(&registry, "k1", 1024);

        drop(old_remote);
        join(old_pump).await;

        assert!(Arc::ptr_eq(&registry.get("k1").unwrap(), &new));
        assert!(new.is_connected());
    }

    #[tokio::test]
    async fn test_read_error_reported_and_torn_down() {
        let mock = tokio_test::io::Builder::new()
            .read(b"motd\r\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))
            .build();
        let registry = SessionRegistry::new();
        let (session, terminal) = attach_with(&registry, "k1", mock, &config());

        let exit = registry.run_read_loop("k1", CancellationToken::new()).await;

        assert_eq!(exit, Some(PumpExit::Failed));
        assert!(registry.is_empty());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(terminal.text(), "motd\r\n");
        let errors = errors(&terminal);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("connection reset"), "{:?}", errors);
        assert_eq!(terminal.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_autopilot_answer_tears_down() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Welcome\r\nlogin: ")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
            .build();
        let registry = SessionRegistry::new();
        let (session, terminal) = attach_with(&registry, "k1", mock, &config());

        let exit = registry.run_read_loop("k1", CancellationToken::new()).await;

        assert_eq!(exit, Some(PumpExit::Disconnected));
        assert!(registry.is_empty());
        assert!(!session.is_connected());
        assert_eq!(terminal.text(), "Welcome\r\n");
        assert!(errors(&terminal).is_empty());
        assert_eq!(terminal.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_wakes_read_loop() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, terminal) = attach_with(&registry, "k1", BrokenWrite, &config());
        let pump = registry.spawn_read_loop("k1", CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = registry.write("k1", "ls\r\n").await;
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::Io(_)))
        ));

        // Nothing arrives from the peer; only the failed write can end the loop
        assert_eq!(join(pump).await, Some(PumpExit::Disconnected));
        assert!(registry.is_empty());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(terminal.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_with_stalled_explicit_write() {
        let registry = Arc::new(SessionRegistry::new());
        // The remote never reads, so a large write stalls holding the writer
        let (_session, _remote, terminal) = attach(&registry, "k1", 64);
        let cancel = CancellationToken::new();
        let pump = registry.spawn_read_loop("k1", cancel.clone());

        let writer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.write("k1", &"x".repeat(4096)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!writer.is_finished());

        cancel.cancel();
        assert_eq!(join(pump).await, Some(PumpExit::Cancelled));
        assert!(registry.is_empty());
        assert_eq!(terminal.stop_count(), 1);

        let result = tokio::time::timeout(Duration::from_secs(5), writer)
            .await
            .expect("stalled write was not aborted")
            .unwrap();
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::Disconnected))
        ));
    }

    #[tokio::test]
    async fn test_cancel_with_stalled_autopilot_answer() {
        let config = SessionBuilder::new("127.0.0.1")
            .login("login: ", "a".repeat(256))
            .build()
            .unwrap();
        let (local, mut remote) = duplex(32);
        let registry = Arc::new(SessionRegistry::new());
        let (_session, terminal) = attach_with(&registry, "k1", local, &config);
        let cancel = CancellationToken::new();
        let pump = registry.spawn_read_loop("k1", cancel.clone());

        // The answer is larger than the pipe and the remote never reads it
        remote.write_all(b"login: ").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pump.is_finished());

        cancel.cancel();
        assert_eq!(join(pump).await, Some(PumpExit::Cancelled));
        assert!(registry.is_empty());
        assert_eq!(terminal.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_encoding_not_registered() {
        let registry = SessionRegistry::new();
        let mut config = config();
        config.encoding = "martian".to_string();

        let (local, _remote) = duplex(64);
        let terminal = Arc::new(RecordingTerminal::default());
        let decoder = Box::new(VteDecoder::new(terminal.clone()));
        let result = registry.attach("k1", local, &config, decoder, terminal);

        assert!(matches!(result, Err(Error::Config(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_never_interleave() {
        const WRITERS: usize = 8;
        const LINE: usize = 512;

        let registry = Arc::new(SessionRegistry::new());
        // A tiny pipe forces partial writes
        let (_session, remote, _terminal) = attach(&registry, "k1", 64);
        let (mut remote_rx, mut remote_tx) = tokio::io::split(remote);
        let pump = registry.spawn_read_loop("k1", CancellationToken::new());

        let expected = WRITERS * (LINE + 2) + "alice\r\n".len();
        let collector = tokio::spawn(async move {
            let mut received = Vec::with_capacity(expected);
            let mut buf = [0u8; 256];
            while received.len() < expected {
                let n = remote_rx.read(&mut buf).await.unwrap();
                assert!(n > 0, "session closed early");
                received.extend_from_slice(&buf[..n]);
            }
            received
        });

        let mut writers = Vec::new();
        for i in 0..WRITERS {
            let registry = Arc::clone(&registry);
            writers.push(tokio::spawn(async move {
                let letter = (b'A' + i as u8) as char;
                let line = format!("{}\r\n", letter.to_string().repeat(LINE));
                registry.write("k1", &line).await.unwrap();
            }));
        }
        remote_tx.write_all(b"login: ").await.unwrap();

        for writer in writers {
            writer.await.unwrap();
        }
        let received = tokio::time::timeout(Duration::from_secs(10), collector)
            .await
            .expect("timed out collecting writes")
            .unwrap();
        let received = String::from_utf8(received).unwrap();

        let mut lines: Vec<&str> = received.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), WRITERS + 1);
        lines.retain(|line| *line != "alice");
        assert_eq!(lines.len(), WRITERS);
        for line in lines {
            assert_eq!(line.len(), LINE);
            let first = line.as_bytes()[0];
            assert!(line.bytes().all(|b| b == first), "interleaved write: {:?}", line);
        }

        registry.disconnect("k1").await;
        join(pump).await;
    }
}
