//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;

use crate::engine::Engine;
use crate::error::{BlinkError, Result};
use crate::protocol::{Command, Reply, RequestParser};

const READ_CHUNK: usize = 16 * 1024;

/// Handles a single client connection
pub struct Connection {
    /// TCP stream shared by reads and writes
    stream: TcpStream,

    /// Reference to the engine
    engine: Arc<Engine>,

    /// Peer address for logging
    peer_addr: String,

    /// Request framing
    parser: RequestParser,

    /// Bytes received but not yet parsed
    read_buf: BytesMut,

    /// Replies not yet written
    write_buf: BytesMut,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, engine: Arc<Engine>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            engine,
            peer_addr,
            parser: RequestParser::new(),
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::with_capacity(READ_CHUNK),
        })
    }

    /// Configure connection timeouts (0 = none)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.stream
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.stream
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Every complete request in the buffer is answered before the next
    /// read, so pipelined requests get their replies in one write.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            if !self.process_buffer() {
                self.flush_replies()?;
                tracing::debug!("Closing connection to {}", self.peer_addr);
                return Ok(());
            }

            if let Err(e) = self.flush_replies() {
                return self.disconnected(e);
            }

            match self.fill_buffer() {
                Ok(0) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return self.disconnected(e),
            }
        }
    }

    /// Answer every complete request; false once the connection must close
    fn process_buffer(&mut self) -> bool {
        loop {
            match self.parser.parse(&mut self.read_buf) {
                Ok(Some(argv)) => {
                    let (reply, close) = self.dispatch(argv);
                    reply.encode(&mut self.write_buf);
                    if close {
                        return false;
                    }
                }
                Ok(None) => return true,
                Err(e) => {
                    tracing::debug!("Protocol error from {}: {}", self.peer_addr, e);
                    Reply::from_error(&e).encode(&mut self.write_buf);
                    return false;
                }
            }
        }
    }

    /// Execute one request; the flag asks for the connection to close
    fn dispatch(&self, argv: Vec<Vec<u8>>) -> (Reply, bool) {
        let command = match Command::parse(argv) {
            Ok(command) => command,
            Err(e) => return (Reply::from_error(&e), false),
        };
        tracing::trace!("Received {} from {}", command.name(), self.peer_addr);

        if command == Command::Quit {
            return (Reply::ok(), true);
        }

        match self.engine.execute(command) {
            Ok(reply) => (reply, false),
            Err(e) => {
                if matches!(e, BlinkError::Corruption(_) | BlinkError::Io(_) | BlinkError::Storage(_)) {
                    tracing::warn!("Command from {} failed: {}", self.peer_addr, e);
                }
                (Reply::from_error(&e), false)
            }
        }
    }

    fn fill_buffer(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let read = self.stream.read(&mut chunk)?;
        self.read_buf.extend_from_slice(&chunk[..read]);
        Ok(read)
    }

    fn flush_replies(&mut self) -> Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.stream.write_all(&self.write_buf)?;
        self.write_buf.clear();
        Ok(())
    }

    /// Map I/O errors that only mean "the client went away" to a clean exit
    fn disconnected(&self, err: BlinkError) -> Result<()> {
        if let BlinkError::Io(ref io_err) = err {
            match io_err.kind() {
                ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe => {
                    tracing::debug!("Client {} disconnected: {}", self.peer_addr, io_err);
                    return Ok(());
                }
                // Read timeout (Windows uses TimedOut instead of WouldBlock)
                ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                _ => {}
            }
        }
        tracing::warn!("I/O error on {}: {}", self.peer_addr, err);
        Err(err)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
