//! Outbound frame sinks.
//!
//! A frame is a contiguous slice of the tailed file with no framing
//! metadata. Sinks only write; the session never reads from the peer.

use std::future::Future;
use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Destination for session frames.
pub trait FrameSink: Send + 'static {
    /// Deliver one frame. An error means the connection is unusable.
    fn send_frame(&mut self, frame: Vec<u8>) -> impl Future<Output = io::Result<()>> + Send;
}

/// Forwards frames into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiver frames will arrive on.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl FrameSink for ChannelSink {
    async fn send_frame(&mut self, frame: Vec<u8>) -> io::Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "frame receiver dropped"))
    }
}

/// Writes frames to any async byte stream (socket half, stdout), flushing
/// after each frame.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> FrameSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send_frame(&mut self, frame: Vec<u8>) -> io::Result<()> {
        self.writer.write_all(&frame).await?;
        self.writer.flush().await
    }
}
