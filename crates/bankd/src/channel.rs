//! Connection channel: length-framed JSON over a split transport.
//!
//! Each channel runs two tasks:
//! - a reader that decodes inbound frames into the inbound queue
//! - a writer that drains the outbound queue, one write at a time
//!
//! Both observe a single `CancellationToken`. `send` only enqueues and
//! returns immediately; `receive` waits for the next inbound message and
//! yields `None` once the channel has closed.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Transport errors end the channel; they are logged, never propagated as panics

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bank_protocol::Frame;

/// Maximum frame size (1 MB)
pub const MAX_FRAME_SIZE: usize = 1_048_576;

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the codec used on both sides of a connection.
///
/// Frames are a 4-byte big-endian length followed by a JSON document.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_SIZE)
        .new_codec()
}

/// Errors surfaced by channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("Failed to encode frame: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,
}

/// Cheap-to-clone sending half of a channel.
///
/// The server keeps one per attached client so it can push a shutdown
/// frame without owning the channel.
pub struct Outbox<Out> {
    sender: mpsc::UnboundedSender<Out>,
    closing: Arc<AtomicBool>,
}

impl<Out> Clone for Outbox<Out> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            closing: Arc::clone(&self.closing),
        }
    }
}

impl<Out> Outbox<Out> {
    /// Enqueues a message for transmission.
    ///
    /// # Errors
    ///
    /// `ChannelError::Closed` if the channel is closing or its writer has stopped.
    pub fn send(&self, message: Out) -> Result<(), ChannelError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        self.sender.send(message).map_err(|_| ChannelError::Closed)
    }
}

/// Bidirectional message channel over one transport.
///
/// `In` is what the peer sends us, `Out` is what we send.
pub struct Channel<In, Out> {
    /// Decoded inbound messages
    inbound: mpsc::UnboundedReceiver<In>,

    /// Outbound queue feeding the writer task
    outbox: Outbox<Out>,

    /// Single signal observed by both loops
    cancel: CancellationToken,

    /// Single-fire guard for `close`
    closed: AtomicBool,

    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,

    /// Peer label for logs
    peer: String,
}

impl<In: Frame, Out: Frame> Channel<In, Out> {
    /// Starts the reader and writer loops over a split transport.
    pub fn new<R, W>(reader: R, writer: W, peer: impl Into<String>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let peer = peer.into();
        let cancel = CancellationToken::new();
        let closing = Arc::new(AtomicBool::new(false));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop::<R, In>(
            FramedRead::new(reader, frame_codec()),
            inbound_tx,
            cancel.clone(),
            Arc::clone(&closing),
            peer.clone(),
        ));

        let writer = tokio::spawn(write_loop::<W, Out>(
            FramedWrite::new(writer, frame_codec()),
            outbound_rx,
            cancel.clone(),
            Arc::clone(&closing),
            peer.clone(),
        ));

        Self {
            inbound: inbound_rx,
            outbox: Outbox {
                sender: outbound_tx,
                closing,
            },
            cancel,
            closed: AtomicBool::new(false),
            reader: Some(reader),
            writer: Some(writer),
            peer,
        }
    }

    /// Wraps a TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, peer)
    }

    /// Enqueues a message and returns immediately.
    pub fn send(&self, message: Out) -> Result<(), ChannelError> {
        self.outbox.send(message)
    }

    /// Waits for the next inbound message.
    ///
    /// Returns `None` once the peer has gone away or the channel was closed.
    pub async fn receive(&mut self) -> Option<In> {
        self.inbound.recv().await
    }

    /// Returns a sending handle that outlives borrows of the channel.
    pub fn outbox(&self) -> Outbox<Out> {
        self.outbox.clone()
    }

    /// Returns a token that fires when either loop stops or `close` runs.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Returns true once the channel has started shutting down.
    pub fn is_closing(&self) -> bool {
        self.outbox.closing.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    /// Stops both loops and releases the transport.
    ///
    /// Messages already enqueued are still flushed by the writer. Safe to
    /// call more than once; only the first call does anything.
    pub async fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.outbox.closing.store(true, Ordering::Release);
        self.cancel.cancel();

        for handle in [self.reader.take(), self.writer.take()].into_iter().flatten() {
            if let Err(e) = handle.await {
                debug!(peer = %self.peer, error = %e, "Channel task ended abnormally");
            }
        }

        debug!(peer = %self.peer, "Channel closed");
    }
}

impl<In, Out> Drop for Channel<In, Out> {
    fn drop(&mut self) {
        // Loops exit on their own once cancelled; nothing to await here.
        self.outbox.closing.store(true, Ordering::Release);
        self.cancel.cancel();
    }
}

/// Decodes frames into the inbound queue until EOF, error, shutdown or cancel.
async fn read_loop<R, In>(
    mut frames: FramedRead<R, LengthDelimitedCodec>,
    inbound: mpsc::UnboundedSender<In>,
    cancel: CancellationToken,
    closing: Arc<AtomicBool>,
    peer: String,
) where
    R: AsyncRead + Unpin,
    In: Frame,
{
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = frames.next() => next,
        };

        match next {
            Some(Ok(bytes)) => match serde_json::from_slice::<In>(&bytes) {
                Ok(message) => {
                    let shutdown = message.is_shutdown();
                    debug!(peer = %peer, kind = %message.kind(), "Received frame");

                    if inbound.send(message).is_err() {
                        break;
                    }
                    if shutdown {
                        info!(peer = %peer, "Peer requested shutdown");
                        break;
                    }
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Dropping undecodable frame");
                    if let Some(placeholder) = In::malformed(e.to_string()) {
                        if inbound.send(placeholder).is_err() {
                            break;
                        }
                    }
                }
            },
            Some(Err(e)) => {
                if closing.load(Ordering::Acquire) {
                    debug!(peer = %peer, error = %e, "Read error while closing");
                } else {
                    warn!(peer = %peer, error = %e, "Read error");
                }
                break;
            }
            None => {
                debug!(peer = %peer, "Peer closed connection");
                break;
            }
        }
    }

    closing.store(true, Ordering::Release);
    cancel.cancel();
}

/// Writes queued messages one at a time until cancelled or the transport fails.
async fn write_loop<W, Out>(
    mut frames: FramedWrite<W, LengthDelimitedCodec>,
    mut outbound: mpsc::UnboundedReceiver<Out>,
    cancel: CancellationToken,
    closing: Arc<AtomicBool>,
    peer: String,
) where
    W: AsyncWrite + Unpin,
    Out: Frame,
{
    let mut healthy = true;

    loop {
        let next = tokio::select! {
            biased;
            message = outbound.recv() => message,
            _ = cancel.cancelled() => break,
        };

        let Some(message) = next else { break };

        if let Err(e) = write_frame(&mut frames, message).await {
            if closing.load(Ordering::Acquire) {
                debug!(peer = %peer, error = %e, "Write error while closing");
            } else {
                warn!(peer = %peer, error = %e, "Write error");
            }
            healthy = false;
            break;
        }
    }

    if healthy {
        // Flush whatever was enqueued before the close
        while let Ok(message) = outbound.try_recv() {
            if let Err(e) = write_frame(&mut frames, message).await {
                debug!(peer = %peer, error = %e, "Dropped queued frame on close");
                break;
            }
        }
    }

    let _ = frames.get_mut().shutdown().await;

    closing.store(true, Ordering::Release);
    cancel.cancel();
}

async fn write_frame<W, Out>(
    frames: &mut FramedWrite<W, LengthDelimitedCodec>,
    message: Out,
) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
    Out: Frame,
{
    let json = serde_json::to_vec(&message).map_err(|e| ChannelError::Encode(e.to_string()))?;

    match timeout(WRITE_TIMEOUT, frames.send(Bytes::from(json))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ChannelError::Io(e.to_string())),
        Err(_) => Err(ChannelError::WriteTimeout),
    }
}
