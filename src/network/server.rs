//! TCP Server
//!
//! Accepts connections and runs each one on its own thread.

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{BlinkError, Result};

use super::Connection;

/// Poll interval of the non-blocking accept loop
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// TCP server for blinkkv
pub struct Server {
    config: Config,
    engine: Arc<Engine>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

/// Decrements the active connection count when a connection thread ends
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Server {
    /// Bind the listen address from `config`
    pub fn new(config: Config, engine: Arc<Engine>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            BlinkError::Network(format!("failed to bind {}: {}", config.listen_addr, e))
        })?;
        Ok(Self {
            config,
            engine,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Start the server (blocking until shutdown)
    pub fn run(&self) -> Result<()> {
        self.listener.set_nonblocking(true)?;
        tracing::info!("Listening on {}", self.local_addr()?);

        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = self.spawn_connection(stream, addr) {
                        tracing::warn!("Failed to start connection for {}: {}", addr, e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        tracing::info!("Server shut down");
        Ok(())
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn spawn_connection(&self, mut stream: TcpStream, addr: SocketAddr) -> Result<()> {
        stream.set_nonblocking(false)?;

        if self.active.fetch_add(1, Ordering::AcqRel) >= self.config.max_connections {
            self.active.fetch_sub(1, Ordering::AcqRel);
            tracing::warn!("Rejecting {}: connection limit reached", addr);
            let _ = stream.write_all(b"-ERR max number of clients reached\r\n");
            return Ok(());
        }
        let guard = ActiveGuard(Arc::clone(&self.active));

        let mut connection = Connection::new(stream, Arc::clone(&self.engine))?;
        connection.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms)?;

        thread::Builder::new()
            .name(format!("blinkkv-conn-{addr}"))
            .spawn(move || {
                let _guard = guard;
                if let Err(e) = connection.handle() {
                    tracing::debug!("Connection {} ended with error: {}", connection.peer_addr(), e);
                }
            })?;
        Ok(())
    }
}
