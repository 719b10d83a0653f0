//! Connector Pool
//!
//! A fixed-capacity pool of connectors to a single replica endpoint, kept
//! healthy by a watchdog thread.
//!
//! ## Watchdog
//! While the pool believes it is connected, the watchdog periodically takes
//! one connector and pings it; a failed ping marks the pool disconnected and
//! drains it. While disconnected, the watchdog probes with a fresh
//! connection+ping and, on success, reconstructs the full set of connectors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::error::{FrostError, Result};

use super::{Connector, ReplicaEndpoint};

/// Default watchdog period
pub const DEFAULT_WATCHDOG_PERIOD: Duration = Duration::from_secs(10);

/// How long `get()` waits for a free connector before giving up
const GET_TIMEOUT: Duration = Duration::from_secs(5);

/// Granularity of the watchdog's cancellable sleep
const SLEEP_SLICE: Duration = Duration::from_millis(50);

struct PoolInner {
    endpoint: ReplicaEndpoint,
    capacity: usize,
    slots_tx: Sender<Connector>,
    slots_rx: Receiver<Connector>,
    connected: AtomicBool,
    shutdown: AtomicBool,
}

impl PoolInner {
    /// Build and pool `capacity` fresh connectors; all-or-nothing
    fn fill(&self) -> bool {
        let mut connectors = Vec::with_capacity(self.capacity);
        for _ in 0..self.capacity {
            match Connector::connect(&self.endpoint.host, self.endpoint.port) {
                Ok(connector) => connectors.push(connector),
                Err(e) => {
                    tracing::debug!("Pool fill for {} failed: {}", self.endpoint, e);
                    return false;
                }
            }
        }

        for connector in connectors {
            let _ = self.slots_tx.send(connector);
        }
        self.connected.store(true, Ordering::Release);
        true
    }

    fn drain(&self) {
        while self.slots_rx.try_recv().is_ok() {}
    }

    fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            tracing::warn!("Pool for {} marked disconnected", self.endpoint);
        }
        self.drain();
    }
}

/// A bounded pool of connectors to one replica
pub struct ConnectorPool {
    inner: Arc<PoolInner>,
    watchdog: Option<JoinHandle<()>>,
}

impl ConnectorPool {
    /// Create a pool with the default watchdog period
    pub fn new(endpoint: ReplicaEndpoint, capacity: usize) -> Self {
        Self::with_watchdog_period(endpoint, capacity, DEFAULT_WATCHDOG_PERIOD)
    }

    /// Create a pool, attempting an initial fill and starting the watchdog
    pub fn with_watchdog_period(
        endpoint: ReplicaEndpoint,
        capacity: usize,
        watchdog_period: Duration,
    ) -> Self {
        let (slots_tx, slots_rx) = bounded(capacity);
        let inner = Arc::new(PoolInner {
            endpoint,
            capacity,
            slots_tx,
            slots_rx,
            connected: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });

        if !inner.fill() {
            inner.drain();
            tracing::warn!(
                "Pool for {} starting disconnected; watchdog will retry",
                inner.endpoint
            );
        }

        let watchdog_inner = Arc::clone(&inner);
        let watchdog = thread::Builder::new()
            .name("frostkv-watchdog".to_string())
            .spawn(move || watchdog_loop(watchdog_inner, watchdog_period))
            .ok();

        Self { inner, watchdog }
    }

    /// The endpoint this pool serves
    pub fn endpoint(&self) -> &ReplicaEndpoint {
        &self.inner.endpoint
    }

    /// Number of connectors the pool maintains while connected
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Whether the pool currently believes its replica is reachable
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Take a connector, waiting for one to become available
    pub fn get(&self) -> Result<Connector> {
        if !self.is_connected() {
            return Err(FrostError::RemoteUnavailable);
        }

        self.inner
            .slots_rx
            .recv_timeout(GET_TIMEOUT)
            .map_err(|_| FrostError::RemoteUnavailable)
    }

    /// Return a connector; unhealthy connectors are disposed
    pub fn put_back(&self, connector: Connector) {
        if connector.is_healthy() && self.is_connected() {
            let _ = self.inner.slots_tx.send(connector);
        }
        // Dropping an unhealthy connector closes its stream; the watchdog
        // notices the shrunken pool via its next failed ping or keeps
        // serving from the remaining connectors
    }

    /// Mark this pool's replica as unreachable and drain the slots
    pub fn mark_disconnected(&self) {
        self.inner.mark_disconnected();
    }
}

impl Drop for ConnectorPool {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }
        self.inner.drain();
    }
}

// =============================================================================
// Watchdog
// =============================================================================

fn watchdog_loop(inner: Arc<PoolInner>, period: Duration) {
    loop {
        // Cancellable sleep: check the shutdown flag between slices
        let mut slept = Duration::ZERO;
        while slept < period {
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            let slice = SLEEP_SLICE.min(period - slept);
            thread::sleep(slice);
            slept += slice;
        }
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }

        if inner.connected.load(Ordering::Acquire) {
            check_connected(&inner);
        } else {
            try_reconnect(&inner);
        }
    }
}

/// Take one pooled connector and ping it; a failure disconnects the pool
fn check_connected(inner: &PoolInner) {
    let mut connector = match inner.slots_rx.try_recv() {
        Ok(connector) => connector,
        // All connectors checked out; the pool is clearly in use
        Err(_) => return,
    };

    if connector.ping() {
        let _ = inner.slots_tx.send(connector);
    } else {
        tracing::warn!("Watchdog ping to {} failed", inner.endpoint);
        inner.mark_disconnected();
    }
}

/// Probe with one fresh connection+ping; on success rebuild the full pool
fn try_reconnect(inner: &PoolInner) {
    let mut probe = match Connector::connect(&inner.endpoint.host, inner.endpoint.port) {
        Ok(probe) => probe,
        Err(_) => return,
    };
    if !probe.ping() {
        return;
    }

    let mut connectors = vec![probe];
    for _ in 1..inner.capacity {
        match Connector::connect(&inner.endpoint.host, inner.endpoint.port) {
            Ok(connector) => connectors.push(connector),
            Err(e) => {
                tracing::debug!("Reconnect to {} fell short: {}", inner.endpoint, e);
                return;
            }
        }
    }

    for connector in connectors {
        let _ = inner.slots_tx.send(connector);
    }
    inner.connected.store(true, Ordering::Release);
    tracing::info!("Pool for {} reconnected", inner.endpoint);
}
