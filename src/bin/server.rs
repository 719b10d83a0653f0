//! FrostKV Server Binary
//!
//! Starts the TCP server for FrostKV.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use frostkv::network::Server;
use frostkv::{Config, DataStore, DirectoryDataStore};

/// FrostKV Server
#[derive(Parser, Debug)]
#[command(name = "frostkv-server")]
#[command(about = "Replicated, versioned, read-optimized frozen key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./frostkv_data")]
    data_dir: String,

    /// Listen address (host:port; port 0 lets the OS choose)
    #[arg(short, long, default_value = "127.0.0.1:9450")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Feed queue capacity (items buffered between socket and feeder)
    #[arg(short = 'q', long, default_value = "1000000")]
    feed_queue: usize,

    /// Default maximum items per segment for new collections
    #[arg(long, default_value = "1000000")]
    segment_items: usize,

    /// Default segment file size in MB for new collections
    #[arg(long, default_value = "1024")]
    segment_mb: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,frostkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("FrostKV Server v{}", frostkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .feed_queue_capacity(args.feed_queue)
        .default_max_items_per_segment(args.segment_items)
        .default_segment_capacity_bytes(args.segment_mb * 1024 * 1024)
        .build();

    let store = Arc::new(DirectoryDataStore::new(&config.data_dir));
    if let Err(e) = store.open() {
        tracing::error!("Failed to open data store: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Data store opened");

    let mut server = Server::new(config, store);
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
