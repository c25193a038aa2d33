//! Incremental copy of an upstream body to the caller.
//!
//! Every chunk is written and flushed before the next read, so event-stream
//! frames reach the caller as soon as upstream produces them.

use std::fmt::Display;
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Upper bound for a single write. Larger upstream frames are sliced.
pub const RELAY_CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Streaming,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("relay canceled")]
    Canceled,
    #[error("downstream write failed")]
    WriteFailed,
    #[error("upstream body failed: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub chunks: u64,
    pub bytes: u64,
}

/// Destination of relayed bytes.
#[async_trait]
pub trait ChunkSink: Send {
    async fn write(&mut self, chunk: Bytes) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;
}

/// Feeds a streaming response body. Each chunk becomes one body frame, which
/// the HTTP stack hands to the socket as soon as it is received; a closed
/// receiver means the caller is gone.
#[async_trait]
impl ChunkSink for mpsc::Sender<Result<Bytes, io::Error>> {
    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.send(Ok(chunk))
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct StreamRelay {
    state: RelayState,
    chunk_size: usize,
    stats: RelayStats,
}

impl Default for StreamRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRelay {
    pub fn new() -> Self {
        Self::with_chunk_size(RELAY_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            state: RelayState::Idle,
            chunk_size: chunk_size.max(1),
            stats: RelayStats::default(),
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Copies `source` into `sink` until it ends, fails, or `cancel` fires.
    ///
    /// Cancellation is watched during every read and every write; once
    /// observed nothing more is written.
    pub async fn run<S, E, K>(
        &mut self,
        cancel: &CancellationToken,
        sink: &mut K,
        source: S,
    ) -> Result<RelayStats, RelayError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
        K: ChunkSink + ?Sized,
    {
        let mut source = std::pin::pin!(source);
        self.state = RelayState::Streaming;

        loop {
            if cancel.is_cancelled() {
                return Err(self.abort(RelayError::Canceled));
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.abort(RelayError::Canceled)),
                next = source.next() => next,
            };

            let mut chunk = match next {
                None => {
                    self.state = RelayState::Completed;
                    return Ok(self.stats);
                }
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => return Err(self.abort(RelayError::Upstream(err.to_string()))),
            };

            while !chunk.is_empty() {
                let piece = chunk.split_to(chunk.len().min(self.chunk_size));
                let len = piece.len() as u64;
                // A stalled caller must not hold the relay past cancellation.
                let delivered = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(self.abort(RelayError::Canceled)),
                    delivered = deliver(sink, piece) => delivered,
                };
                if delivered.is_err() {
                    return Err(self.abort(RelayError::WriteFailed));
                }
                self.stats.chunks += 1;
                self.stats.bytes += len;
            }
        }
    }

    fn abort(&mut self, err: RelayError) -> RelayError {
        self.state = RelayState::Aborted;
        err
    }
}

async fn deliver<K>(sink: &mut K, piece: Bytes) -> io::Result<()>
where
    K: ChunkSink + ?Sized,
{
    sink.write(piece).await?;
    sink.flush().await
}
