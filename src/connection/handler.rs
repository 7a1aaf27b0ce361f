//! Connection Pipeline
//!
//! Each client gets its own task running a [`ConnectionHandler`]. The task
//! reads bytes, decodes as many requests as the buffer holds, dispatches
//! them to the engine in arrival order, and writes replies back in that
//! same order, whatever order the shards finish in.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!          ┌────────────────────────────────────────────────────┐
//!          │                   Main Loop                        │
//!          │                                                    │
//!  bytes ─►│ read_buf ─► decode ─► dispatch ─► pending queue    │
//!          │                                        │           │
//!          │                          front ready?  ▼           │
//!          │                      encode into outbound buffer   │
//!          │                                        │           │
//!  bytes ◄─│ ◄───────────────────────────────── write_buf       │
//!          └────────────────────────────────────────────────────┘
//!                  │
//!                  ▼
//!   peer EOF, QUIT, protocol error: stop reading, drain the queue,
//!   flush, close.  I/O or shard failure: close at once.
//! ```
//!
//! ## Ordering
//!
//! Requests are dispatched one at a time in arrival order, so per-shard
//! queues see them in that order too. Replies sit in a `VecDeque` of
//! [`PendingReply`]; only the front may be written, so reply N always
//! precedes reply N+1 even when N's shard is the slower one.
//!
//! ## Backpressure
//!
//! When the outbound buffer reaches the configured high watermark the
//! connection stops decoding and reading. It resumes once writes bring the
//! buffer down to the low watermark.

use crate::commands;
use crate::error::ShardError;
use crate::protocol::{ProtocolError, Request, RequestDecoder, RespValue};
use crate::storage::{Engine, PendingReply};
use bytes::BytesMut;
use std::collections::VecDeque;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Initial read buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Most replies a connection keeps outstanding before it stops decoding
const MAX_IN_FLIGHT: usize = 1024;

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client sent a malformed frame
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A shard executor stopped
    #[error(transparent)]
    Shard(#[from] ShardError),
}

/// Per-connection pipeline state.
pub struct ConnectionHandler<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,

    /// Client's address (for logging)
    addr: SocketAddr,
    /// Connection id stamped on every request
    id: u64,
    /// Sequence number of the next request
    next_seq: u64,

    engine: Engine,
    decoder: RequestDecoder,

    /// Bytes read but not yet decoded
    inbound: BytesMut,
    /// Encoded replies not yet written
    outbound: BytesMut,
    /// Replies in request order; the front is the next one to write
    pending: VecDeque<PendingReply>,

    high_watermark: usize,
    low_watermark: usize,
    /// Reading is suspended until `outbound` drains
    paused: bool,
    /// The peer closed its write side
    eof: bool,
    /// No more requests will be decoded (QUIT or protocol error)
    closing: bool,
    /// The protocol error that ended the request stream, if any
    failure: Option<ProtocolError>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S, addr: SocketAddr, id: u64, engine: Engine) -> Self {
        let config = &engine.info().config;
        let decoder = RequestDecoder::with_max_bulk(config.max_bulk);
        let high_watermark = config.write_high_watermark;
        let low_watermark = config.write_low_watermark;
        let (reader, writer) = tokio::io::split(stream);

        Self {
            reader,
            writer,
            addr,
            id,
            next_seq: 0,
            engine,
            decoder,
            inbound: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            outbound: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            pending: VecDeque::new(),
            high_watermark,
            low_watermark,
            paused: false,
            eof: false,
            closing: false,
            failure: None,
        }
    }

    /// Runs the connection until it closes.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, conn = self.id, "client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, requests = self.next_seq, "client disconnected"),
            Err(ConnectionError::Io(err))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
                ) =>
            {
                debug!(client = %self.addr, "connection reset by client")
            }
            Err(ConnectionError::Protocol(_)) => {
                debug!(client = %self.addr, "connection closed after protocol error")
            }
            Err(ConnectionError::Shard(err)) => {
                error!(client = %self.addr, error = %err, "shard executor failed, closing connection")
            }
            Err(err) => warn!(client = %self.addr, error = %err, "connection closed with error"),
        }

        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.drain_ready()?;
            self.update_backpressure();
            self.process_input().await?;

            let blocked = self.paused || self.pending.len() >= MAX_IN_FLIGHT;
            let input_done = self.closing || (self.eof && !blocked);
            if input_done && self.pending.is_empty() && self.outbound.is_empty() {
                break;
            }

            let can_read = !self.closing && !self.eof && !blocked;

            tokio::select! {
                biased;

                written = self.writer.write_buf(&mut self.outbound), if !self.outbound.is_empty() => {
                    if written? == 0 {
                        return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
                    }
                    if self.outbound.is_empty() {
                        self.writer.flush().await?;
                    }
                }

                ready = front_ready(&mut self.pending), if !self.pending.is_empty() => {
                    ready?;
                }

                read = self.reader.read_buf(&mut self.inbound), if can_read => {
                    if read? == 0 {
                        if !self.inbound.is_empty() || self.decoder.in_frame() {
                            debug!(
                                client = %self.addr,
                                buffered = self.inbound.len(),
                                "peer closed mid-frame, discarding partial request"
                            );
                        }
                        self.eof = true;
                    } else {
                        trace!(client = %self.addr, buffered = self.inbound.len(), "read data");
                    }
                }

                else => break,
            }
        }

        let _ = self.writer.shutdown().await;

        match self.failure.take() {
            Some(err) => Err(ConnectionError::Protocol(err)),
            None => Ok(()),
        }
    }

    /// Decodes and dispatches buffered requests until the buffer runs dry
    /// or the connection has to stop taking work.
    ///
    /// Complete frames that arrived before the peer's EOF are still served.
    async fn process_input(&mut self) -> Result<(), ConnectionError> {
        while !self.closing && !self.paused && self.pending.len() < MAX_IN_FLIGHT {
            match self.decoder.decode(&mut self.inbound) {
                Ok(Some(frame)) => {
                    let request = Request::from_frame(self.id, self.next_seq, frame);
                    self.next_seq += 1;

                    trace!(
                        client = %self.addr,
                        seq = request.seq,
                        command = %request.command_name(),
                        "dispatching request"
                    );

                    let quit = commands::is_quit(&request.name);
                    let reply = self.engine.dispatch(request).await?;
                    self.pending.push_back(reply);

                    if quit {
                        debug!(client = %self.addr, "client sent QUIT");
                        self.closing = true;
                    }

                    self.drain_ready()?;
                    self.update_backpressure();
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(client = %self.addr, error = %err, "protocol error");
                    self.pending.push_back(PendingReply::Ready(RespValue::error(format!(
                        "ERR Protocol error: {}",
                        err
                    ))));
                    self.failure = Some(err);
                    self.closing = true;
                }
            }
        }
        Ok(())
    }

    /// Moves finished replies from the front of the queue into the
    /// outbound buffer.
    fn drain_ready(&mut self) -> Result<(), ShardError> {
        while let Some(front) = self.pending.front_mut() {
            if !front.try_ready()? {
                break;
            }
            if let Some(reply) = self.pending.pop_front().and_then(PendingReply::into_reply) {
                reply.encode(&mut self.outbound);
            }
        }
        Ok(())
    }

    fn update_backpressure(&mut self) {
        let buffered = self.outbound.len();
        if !self.paused && buffered >= self.high_watermark {
            self.paused = true;
            debug!(client = %self.addr, buffered, "outbound buffer full, pausing reads");
        } else if self.paused && buffered <= self.low_watermark {
            self.paused = false;
            debug!(client = %self.addr, buffered, "outbound buffer drained, resuming reads");
        }
    }
}

/// Resolves once the oldest outstanding reply is available.
async fn front_ready(pending: &mut VecDeque<PendingReply>) -> Result<(), ShardError> {
    match pending.front_mut() {
        Some(front) => front.ready().await,
        None => std::future::pending().await,
    }
}

/// Serves one accepted TCP connection to completion.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, id: u64, engine: Engine) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(client = %addr, error = %err, "failed to set TCP_NODELAY");
    }
    // Failures are logged by `run`.
    let _ = ConnectionHandler::new(stream, addr, id, engine).run().await;
}
