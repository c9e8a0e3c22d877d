//! Raw telnet connection with serialized writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use encoding_rs::Encoding;
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::config::{SessionConfig, resolve_encoding};
use super::telnet::{Filtered, TelnetFilter, escape_iac};
use crate::error::{ConfigError, ConnectError, Result, TransportError};

/// Maximum number of bytes taken from the socket per read.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Upper bound on the write-side shutdown performed by `close()`.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One outbound connection to a remote host.
///
/// The write side lives here behind an async mutex so that every writer
/// (explicit input, autopilot answers, telnet replies) puts its bytes on
/// the wire contiguously. The read side is handed out once as a
/// [`ConnectionReader`] and owned by the session's read pump.
pub struct RawConnection {
    host: String,
    port: u16,
    terminal_type: String,
    encoding: &'static Encoding,

    /// Cleared on EOF, I/O failure or close; never set again.
    connected: AtomicBool,

    /// Fired together with clearing `connected`; aborts pending writes and
    /// wakes anyone waiting in [`disconnected`](Self::disconnected).
    lost: CancellationToken,

    /// Set by the first `close()`.
    closed: AtomicBool,

    writer: Mutex<BoxedWriter>,
}

impl RawConnection {
    /// Connect to `config.host:config.port` over TCP.
    pub async fn connect(config: &SessionConfig) -> Result<(Arc<Self>, ConnectionReader)> {
        let encoding = resolve_encoding(&config.encoding)?;

        let stream = tokio::time::timeout(
            config.timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| ConnectError::Timeout {
            host: config.host.clone(),
            port: config.port,
            timeout: config.timeout,
        })?
        .map_err(|source| ConnectError::ConnectionFailed {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("connection {}: failed to set TCP_NODELAY: {}", config.socket_addr(), e);
        }

        debug!("connection {}: connected", config.socket_addr());
        Ok(Self::open(stream, config, encoding))
    }

    /// Wrap an already-established byte stream.
    pub fn from_stream<S>(
        stream: S,
        config: &SessionConfig,
    ) -> std::result::Result<(Arc<Self>, ConnectionReader), ConfigError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let encoding = resolve_encoding(&config.encoding)?;
        Ok(Self::open(stream, config, encoding))
    }

    fn open<S>(
        stream: S,
        config: &SessionConfig,
        encoding: &'static Encoding,
    ) -> (Arc<Self>, ConnectionReader)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);

        let connection = Arc::new(Self {
            host: config.host.clone(),
            port: config.port,
            terminal_type: config.terminal_type.clone(),
            encoding,
            connected: AtomicBool::new(true),
            lost: CancellationToken::new(),
            closed: AtomicBool::new(false),
            writer: Mutex::new(Box::new(write_half)),
        });

        let reader = ConnectionReader {
            connection: Arc::clone(&connection),
            stream: Box::new(read_half),
            telnet: TelnetFilter::new(config.terminal_type.clone()),
            buf: vec![0; READ_BUFFER_SIZE],
        };

        (connection, reader)
    }

    /// Remote host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remote port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Terminal type reported to the remote host.
    pub fn terminal_type(&self) -> &str {
        &self.terminal_type
    }

    /// Encoding used for outbound text.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Whether the connection is still usable.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Resolves once the connection is no longer usable.
    pub async fn disconnected(&self) {
        self.lost.cancelled().await;
    }

    fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!("connection {}:{}: marked disconnected", self.host, self.port);
        }
        self.lost.cancel();
    }

    /// Encode `text` with the connection's encoding and send it.
    pub async fn write_str(&self, text: &str) -> std::result::Result<(), TransportError> {
        let (encoded, _, unmappable) = self.encoding.encode(text);
        if unmappable {
            warn!(
                "connection {}:{}: text not representable in {}, sent with substitutions",
                self.host,
                self.port,
                self.encoding.name()
            );
        }
        self.write_bytes(&escape_iac(&encoded)).await
    }

    /// Send bytes verbatim as one contiguous write.
    pub(crate) async fn write_bytes(&self, data: &[u8]) -> std::result::Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }

        // A stalled peer must not hold the lock past disconnection
        let mut writer = tokio::select! {
            biased;
            _ = self.lost.cancelled() => return Err(TransportError::Disconnected),
            writer = self.writer.lock() => writer,
        };

        let result = tokio::select! {
            biased;
            _ = self.lost.cancelled() => return Err(TransportError::Disconnected),
            result = async {
                writer.write_all(data).await?;
                writer.flush().await
            } => result,
        };

        match result {
            Ok(()) => {
                trace!("connection {}:{}: wrote {} bytes", self.host, self.port, data.len());
                Ok(())
            }
            Err(e) => {
                warn!("connection {}:{}: write failed: {}", self.host, self.port, e);
                self.mark_disconnected();
                Err(e.into())
            }
        }
    }

    /// Release the connection. Safe to call any number of times.
    ///
    /// Pending writes fail with [`TransportError::Disconnected`] before the
    /// write side is shut down, so this never waits on a stalled peer.
    pub async fn close(&self) {
        self.mark_disconnected();
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let shutdown = async {
            let mut writer = self.writer.lock().await;
            writer.shutdown().await
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("connection {}:{}: shutdown failed: {}", self.host, self.port, e);
            }
            Err(_) => {
                debug!("connection {}:{}: shutdown timed out", self.host, self.port);
            }
        }
        debug!("connection {}:{}: closed", self.host, self.port);
    }
}

impl std::fmt::Debug for RawConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("terminal_type", &self.terminal_type)
            .field("encoding", &self.encoding.name())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Read side of a [`RawConnection`].
///
/// Strips telnet commands and answers negotiation through the shared writer.
pub struct ConnectionReader {
    connection: Arc<RawConnection>,
    stream: BoxedReader,
    telnet: TelnetFilter,
    buf: Vec<u8>,
}

impl ConnectionReader {
    /// Read up to [`READ_BUFFER_SIZE`] bytes of application data.
    ///
    /// Returns `Ok(None)` once the remote host has closed the connection or
    /// the connection was closed locally. A batch made only of telnet
    /// commands yields an empty chunk. Any failure marks the connection
    /// disconnected.
    pub async fn read(&mut self) -> std::result::Result<Option<Bytes>, TransportError> {
        if !self.connection.is_connected() {
            return Ok(None);
        }

        let read = tokio::select! {
            biased;
            _ = self.connection.lost.cancelled() => return Ok(None),
            read = self.stream.read(&mut self.buf) => read,
        };
        let n = match read {
            Ok(n) => n,
            Err(e) => {
                self.connection.mark_disconnected();
                return Err(e.into());
            }
        };

        if n == 0 {
            debug!(
                "connection {}:{}: remote closed",
                self.connection.host, self.connection.port
            );
            self.connection.mark_disconnected();
            return Ok(None);
        }

        let mut filtered = Filtered::default();
        self.telnet.filter(&self.buf[..n], &mut filtered);

        if !filtered.reply.is_empty() {
            self.connection.write_bytes(&filtered.reply).await?;
        }

        trace!(
            "connection {}:{}: read {} bytes, {} data",
            self.connection.host,
            self.connection.port,
            n,
            filtered.data.len()
        );
        Ok(Some(filtered.data.freeze()))
    }

    /// The connection this reader belongs to.
    pub fn connection(&self) -> &Arc<RawConnection> {
        &self.connection
    }
}
