//! Transport contract and the TCP implementation.
//!
//! The driver depends only on the narrow [`Transport`] contract: send one
//! line of text, report connectivity. [`TcpTransport`] implements it for
//! the codec's Telnet-style control port with a reader task feeding
//! [`DriverHandle::line_received`] (awaiting, so the driver's bounded
//! event queue backpressures the socket) and a writer task appending the
//! configured line terminator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::driver::DriverHandle;
use crate::error::{DriverResult, TransportError};

/// One line of outbound text to the codec.
///
/// Implementations must not block the caller: queue the send and report
/// failures from the call site or the writer.
pub trait Transport: Send {
    /// Sends one line of text; the transport appends its own terminator.
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// True while the underlying connection is up.
    fn is_connected(&self) -> bool;
}

/// TCP transport for the codec's line-oriented control connection.
pub struct TcpTransport {
    write_tx: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Connects to `addr`, spawns the reader and writer tasks, and
    /// delivers the `connected` event that triggers the driver's
    /// handshake bootstrap.
    pub async fn connect(
        addr: &str,
        handle: DriverHandle,
        line_ending: impl Into<String>,
    ) -> DriverResult<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::from)?;
        info!(addr, "Connected to codec");

        let (read_half, mut write_half) = stream.into_split();
        let connected = Arc::new(AtomicBool::new(true));
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();
        let line_ending = line_ending.into();

        {
            let handle = handle.clone();
            let connected = Arc::clone(&connected);
            tokio::spawn(async move {
                let mut lines = BufReader::new(read_half).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            if handle.line_received(line).await.is_err() {
                                debug!("Driver stopped; closing reader");
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("Codec closed the connection");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Read error on codec connection");
                            break;
                        }
                    }
                }
                connected.store(false, Ordering::Release);
                if handle.disconnected().await.is_err() {
                    debug!("Driver already stopped; disconnect not delivered");
                }
            });
        }

        {
            let connected = Arc::clone(&connected);
            tokio::spawn(async move {
                while let Some(text) = write_rx.recv().await {
                    let mut framed = text;
                    framed.push_str(&line_ending);
                    if let Err(e) = write_half.write_all(framed.as_bytes()).await {
                        warn!(error = %e, "Write error on codec connection; dropping command");
                        connected.store(false, Ordering::Release);
                        break;
                    }
                }
                debug!("Writer stopped");
            });
        }

        handle.connected().await?;
        Ok(Self {
            write_tx,
            connected,
        })
    }
}

impl Transport for TcpTransport {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }
        self.write_tx
            .send(text.to_string())
            .map_err(|_| TransportError::WriterClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
