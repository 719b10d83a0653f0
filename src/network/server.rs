//! TCP Server
//!
//! Accepts connections and spawns one handler thread per client.
//!
//! ## Architecture
//! - Acceptor thread with a non-blocking accept loop polling the shutdown flag
//! - One thread per connection; feeds spawn one extra feeder thread
//! - A registry of live sockets so shutdown can unblock in-flight reads
//! - Shared `Arc<dyn DataStore>` injected into every handler

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{FrostError, Result};
use crate::store::DataStore;

use super::Connection;

/// Live sockets, so shutdown can unblock handler threads stuck in reads
#[derive(Default)]
struct ConnectionRegistry {
    streams: Mutex<HashMap<u64, TcpStream>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    fn register(&self, stream: &TcpStream) -> Option<u64> {
        let clone = stream.try_clone().ok()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams.lock().insert(id, clone);
        Some(id)
    }

    fn deregister(&self, id: u64) {
        self.streams.lock().remove(&id);
    }

    fn shutdown_all(&self) {
        for stream in self.streams.lock().values() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

/// TCP server for FrostKV
pub struct Server {
    /// Server configuration
    config: Config,

    /// Shared data store
    store: Arc<dyn DataStore>,

    /// Shutdown flag observed by the accept loop
    shutdown: Arc<AtomicBool>,

    /// Active connection count
    active_connections: Arc<AtomicUsize>,

    /// Live socket registry
    registry: Arc<ConnectionRegistry>,

    /// Resolved listen address (set on start; meaningful with port 0)
    local_addr: Option<SocketAddr>,

    /// Acceptor thread handle
    accept_handle: Option<JoinHandle<()>>,
}

impl Server {
    /// Create a new server with the given config and data store
    pub fn new(config: Config, store: Arc<dyn DataStore>) -> Self {
        Self {
            config,
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
            registry: Arc::new(ConnectionRegistry::default()),
            local_addr: None,
            accept_handle: None,
        }
    }

    /// Bind the listener and spawn the acceptor thread.
    ///
    /// With port 0 the OS picks a port; the resolved address is readable
    /// through `local_addr()` afterwards.
    pub fn start(&mut self) -> Result<()> {
        if self.accept_handle.is_some() {
            return Err(FrostError::Network("Server already started".to_string()));
        }

        let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
            FrostError::Network(format!(
                "Failed to bind to {}: {}",
                self.config.listen_addr, e
            ))
        })?;

        // Non-blocking so the accept loop can poll the shutdown flag
        listener.set_nonblocking(true)?;
        self.local_addr = Some(listener.local_addr()?);

        tracing::info!("Server listening on {}", self.local_addr.unwrap());

        let acceptor = Acceptor {
            listener,
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            shutdown: Arc::clone(&self.shutdown),
            active_connections: Arc::clone(&self.active_connections),
            registry: Arc::clone(&self.registry),
        };

        let handle = thread::Builder::new()
            .name("frostkv-acceptor".to_string())
            .spawn(move || acceptor.run())
            .map_err(|e| FrostError::Network(format!("Failed to spawn acceptor: {}", e)))?;
        self.accept_handle = Some(handle);

        Ok(())
    }

    /// Start the server and block until it is shut down
    pub fn run(&mut self) -> Result<()> {
        self.start()?;
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Signal shutdown, unblock in-flight reads, and wait for handlers to
    /// drain
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Shutting down server...");
        self.registry.shutdown_all();

        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }

        // Handler threads observe the socket shutdown and exit on their own
        for _ in 0..200 {
            if self.active_connections.load(Ordering::Relaxed) == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        tracing::info!("Server shutdown complete");
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
    }

    /// Get the number of active connections
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the bound address (if started)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The accept loop, run on its own thread
struct Acceptor {
    listener: TcpListener,
    config: Config,
    store: Arc<dyn DataStore>,
    shutdown: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
    registry: Arc<ConnectionRegistry>,
}

impl Acceptor {
    fn run(self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let current = self.active_connections.load(Ordering::Relaxed);
                    if current >= self.config.max_connections {
                        tracing::warn!(
                            "Connection limit reached ({}/{}), rejecting {}",
                            current,
                            self.config.max_connections,
                            addr
                        );
                        drop(stream);
                        continue;
                    }

                    tracing::debug!("Accepted connection from {}", addr);
                    self.spawn_handler(stream);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    // No pending connections, sleep briefly
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    if !self.shutdown.load(Ordering::Relaxed) {
                        tracing::error!("Accept error: {}", e);
                    }
                }
            }
        }
    }

    fn spawn_handler(&self, stream: TcpStream) {
        // Accepted sockets block; only the listener polls
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::error!("Failed to configure accepted socket: {}", e);
            return;
        }

        let registry_id = self.registry.register(&stream);
        let registry = Arc::clone(&self.registry);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let active_connections = Arc::clone(&self.active_connections);
        active_connections.fetch_add(1, Ordering::Relaxed);

        let spawned = thread::Builder::new()
            .name("frostkv-conn".to_string())
            .spawn(move || {
                match Connection::new(stream, store, config) {
                    Ok(mut connection) => {
                        if let Err(e) = connection.handle() {
                            tracing::debug!(
                                "Connection {} ended with error: {}",
                                connection.peer_addr(),
                                e
                            );
                        }
                    }
                    Err(e) => tracing::error!("Failed to create connection: {}", e),
                }

                if let Some(id) = registry_id {
                    registry.deregister(id);
                }
                active_connections.fetch_sub(1, Ordering::Relaxed);
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn connection handler: {}", e);
            if let Some(id) = registry_id {
                self.registry.deregister(id);
            }
            self.active_connections.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DataStore, NullDataStore};

    #[test]
    fn test_server_reports_resolved_port() {
        let config = Config::builder().listen_addr("127.0.0.1:0").build();
        let store = Arc::new(NullDataStore::new());
        store.open().unwrap();

        let mut server = Server::new(config, store);
        server.start().unwrap();

        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.is_running());

        server.shutdown();
        assert!(!server.is_running());
    }
}
