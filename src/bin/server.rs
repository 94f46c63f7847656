//! blinkkv Server Binary
//!
//! Starts the TCP server for blinkkv.

use std::sync::Arc;

use blinkkv::network::Server;
use blinkkv::{Config, Engine};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// blinkkv Server
#[derive(Parser, Debug)]
#[command(name = "blinkkv-server")]
#[command(about = "Redis-compatible list and set server")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./blinkkv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// MemTable size limit in MB before flush
    #[arg(short = 'M', long, default_value = "64")]
    memtable_mb: usize,

    /// Element ceiling for new lists
    #[arg(long, default_value_t = blinkkv::meta::DEFAULT_LIST_ELEMENT_LIMIT)]
    list_element_limit: u64,

    /// Block-pointer capacity for new lists
    #[arg(long, default_value_t = blinkkv::meta::DEFAULT_LIST_BLOCK_LIMIT)]
    list_block_limit: u64,

    /// Action log size in MB that triggers a metadata snapshot
    #[arg(long, default_value = "64")]
    meta_compact_mb: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blinkkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("blinkkv Server v{}", blinkkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .memtable_size_limit(args.memtable_mb * 1024 * 1024)
        .list_element_limit(args.list_element_limit)
        .list_block_limit(args.list_block_limit)
        .meta_compact_threshold(args.meta_compact_mb * 1024 * 1024)
        .build();

    // Open engine
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine initialized successfully");

    let server = match Server::new(config, engine) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
