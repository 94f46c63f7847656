//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread (non-blocking accept loop)
//! - One thread per connection
//! - Commands routed through Engine

mod server;
mod connection;

pub use server::Server;
pub use connection::Connection;
