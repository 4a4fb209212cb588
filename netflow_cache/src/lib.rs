//! Flow accumulation cache
//!
//! This library holds decoded flow records between arrival and export. Flows
//! that describe the same traffic are folded into a single record; a
//! background driver periodically evicts aged and overflowing records to
//! registered consumers.
//!
//! ## Metrics
//!
//! `flows_expired`: Flows evicted by the expiration driver
//! `listener_failure`: Listener deliveries that returned an error
//!

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use metrics::counter;
use netflow_wire::{Flow, FlowType, Packet};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{error, info};

mod buffer;

use buffer::Buffer;

/// Milliseconds between expiration cycles of the driver.
const EXPIRE_INTERVAL_MS: u64 = 1_000;

/// Errors produced by [`FlowCache`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The cache was used before a flow type was bound.
    #[error("no flow type bound to this cache")]
    NotConfigured,
    /// A second flow type bind was attempted.
    #[error("flow type already bound: {current}")]
    AlreadyConfigured {
        /// The flow type bound by the first call.
        current: FlowType,
    },
    /// A flow of the wrong variant was offered.
    #[error("expected a {expected} flow, got {actual}")]
    TypeMismatch {
        /// The flow type bound to this cache.
        expected: FlowType,
        /// The flow type of the offered flow.
        actual: FlowType,
    },
    /// The configuration failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// The field that failed and why.
        reason: &'static str,
    },
}

/// Configuration of [`FlowCache`].
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Flows allowed to stay resident after an expiration pass.
    pub buffer_size: usize,
    /// Seconds a flow may stay resident, measured from its first activity.
    pub expire_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_size: 1_000,
            expire_seconds: 60,
        }
    }
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error when a field is outside its working range.
    pub fn valid(&self) -> Result<(), Error> {
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfig {
                reason: "buffer_size must be non-zero",
            });
        }
        if self.expire_seconds == 0 {
            return Err(Error::InvalidConfig {
                reason: "expire_seconds must be non-zero",
            });
        }
        Ok(())
    }
}

/// The clock the cache ages flows against.
#[async_trait]
pub trait Clock {
    /// Milliseconds elapsed on this clock.
    fn now_ms(&self) -> u64;
    /// Wait for `millis` milliseconds.
    async fn sleep_ms(&self, millis: u64);
}

/// A clock that reads the process uptime reference flow timestamps are
/// stamped against.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

#[async_trait]
impl Clock for RealClock {
    fn now_ms(&self) -> u64 {
        netflow_wire::uptime_now_ms()
    }

    async fn sleep_ms(&self, millis: u64) {
        time::sleep(Duration::from_millis(millis)).await;
    }
}

/// Consumer of flow batches evicted from a [`FlowCache`].
#[async_trait]
pub trait FlowListener {
    /// Receive one batch of evicted flows.
    ///
    /// # Errors
    ///
    /// Failures are logged by the cache and never stop delivery to the
    /// other listeners.
    async fn process_flows(
        &self,
        flows: &[Flow],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

struct Shared {
    buffer: Mutex<Buffer>,
    listeners: Mutex<Vec<Arc<dyn FlowListener + Send + Sync>>>,
    metric_labels: Vec<(String, String)>,
}

#[derive(Debug)]
struct Driver {
    shutdown: watch::Sender<()>,
    handle: JoinHandle<()>,
}

/// The flow accumulation cache.
///
/// Holds flows of one bound [`FlowType`], folding records that share an
/// identity into a single entry. Once started, a background driver evicts
/// aged and overflowing records every second and hands them to the
/// registered [`FlowListener`]s. Dropping the cache shuts the driver down.
pub struct FlowCache<C = RealClock> {
    shared: Arc<Shared>,
    clock: C,
    driver: Mutex<Option<Driver>>,
}

impl FlowCache<RealClock> {
    /// Create a new [`FlowCache`] against the process uptime clock.
    ///
    /// # Errors
    ///
    /// Returns an error when `config` fails validation.
    pub fn new(config: &Config) -> Result<Self, Error> {
        Self::with_clock(config, RealClock)
    }
}

impl<C> FlowCache<C>
where
    C: Clock + Clone + Send + Sync + 'static,
{
    /// Create a new [`FlowCache`] against the given clock.
    ///
    /// # Errors
    ///
    /// Returns an error when `config` fails validation.
    pub fn with_clock(config: &Config, clock: C) -> Result<Self, Error> {
        config.valid()?;
        Ok(Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(Buffer::new(
                    config.buffer_size,
                    config.expire_seconds.saturating_mul(1_000),
                )),
                listeners: Mutex::new(Vec::new()),
                metric_labels: vec![
                    ("component".to_string(), "cache".to_string()),
                    ("component_name".to_string(), "flow_cache".to_string()),
                ],
            }),
            clock,
            driver: Mutex::new(None),
        })
    }

    /// Bind the flow type this cache accepts. May be called once.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyConfigured` when a flow type is already bound.
    ///
    /// # Panics
    ///
    /// Function will panic if the buffer lock is poisoned.
    pub fn set_flow_type(&self, flow_type: FlowType) -> Result<(), Error> {
        self.shared
            .buffer
            .lock()
            .expect("lock poisoned")
            .set_flow_type(flow_type)
    }

    /// The flow type bound to this cache, `None` before `set_flow_type`.
    ///
    /// # Panics
    ///
    /// Function will panic if the buffer lock is poisoned.
    #[must_use]
    pub fn flow_type(&self) -> Option<FlowType> {
        self.shared
            .buffer
            .lock()
            .expect("lock poisoned")
            .flow_type()
    }

    /// Fold `flow` into the buffer, appending it when no resident record
    /// shares its identity.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` before a flow type is bound and
    /// `TypeMismatch` when `flow` is of another variant.
    ///
    /// # Panics
    ///
    /// Function will panic if the buffer lock is poisoned.
    pub fn accumulate(&self, flow: Flow) -> Result<(), Error> {
        self.shared
            .buffer
            .lock()
            .expect("lock poisoned")
            .accumulate(flow)
    }

    /// Accumulate every flow carried by `packet`.
    ///
    /// # Errors
    ///
    /// Fails like [`FlowCache::accumulate`]; flows preceding the failing
    /// one stay accumulated.
    ///
    /// # Panics
    ///
    /// Function will panic if the buffer lock is poisoned.
    pub fn accumulate_packet(&self, packet: &Packet) -> Result<(), Error> {
        let mut buffer = self.shared.buffer.lock().expect("lock poisoned");
        for flow in packet.flows() {
            buffer.accumulate(*flow)?;
        }
        Ok(())
    }

    /// Evict aged flows, trim back to capacity and return the union.
    ///
    /// # Panics
    ///
    /// Function will panic if the buffer lock is poisoned.
    pub fn expire(&self) -> Vec<Flow> {
        let now = self.clock.now_ms();
        self.shared
            .buffer
            .lock()
            .expect("lock poisoned")
            .expire(now)
    }

    /// Snapshot of the resident flows, in insertion order.
    ///
    /// # Panics
    ///
    /// Function will panic if the buffer lock is poisoned.
    #[must_use]
    pub fn content(&self) -> Vec<Flow> {
        self.shared.buffer.lock().expect("lock poisoned").content()
    }

    /// Drop every resident flow.
    ///
    /// # Panics
    ///
    /// Function will panic if the buffer lock is poisoned.
    pub fn clear(&self) {
        self.shared.buffer.lock().expect("lock poisoned").clear();
    }

    /// Number of resident flows.
    ///
    /// # Panics
    ///
    /// Function will panic if the buffer lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.buffer.lock().expect("lock poisoned").len()
    }

    /// True when no flows are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a consumer for evicted flow batches.
    ///
    /// # Panics
    ///
    /// Function will panic if the listener lock is poisoned.
    pub fn register_listener(&self, listener: Arc<dyn FlowListener + Send + Sync>) {
        self.shared
            .listeners
            .lock()
            .expect("lock poisoned")
            .push(listener);
    }

    /// True while the expiration driver is running.
    ///
    /// # Panics
    ///
    /// Function will panic if the driver lock is poisoned.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.driver.lock().expect("lock poisoned").is_some()
    }

    /// Start the expiration driver.
    ///
    /// Every second the driver evicts aged and overflowing flows and hands
    /// them to the registered listeners. Starting a running cache is a
    /// logged no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` when no flow type is bound.
    ///
    /// # Panics
    ///
    /// Function will panic if called outside an async runtime or if the
    /// driver lock is poisoned.
    pub fn start(&self) -> Result<(), Error> {
        if self.flow_type().is_none() {
            return Err(Error::NotConfigured);
        }
        let mut driver = self.driver.lock().expect("lock poisoned");
        if driver.is_some() {
            info!("expiration driver already running");
            return Ok(());
        }
        let (shutdown, shutdown_rx) = watch::channel(());
        let handle = tokio::spawn(drive(
            Arc::clone(&self.shared),
            self.clock.clone(),
            shutdown_rx,
        ));
        *driver = Some(Driver { shutdown, handle });
        Ok(())
    }

    /// Stop the expiration driver, waiting out any cycle in flight.
    ///
    /// No eviction is published after this returns. Stopping a stopped
    /// cache is a logged no-op.
    ///
    /// # Panics
    ///
    /// Function will panic if the driver lock is poisoned.
    pub async fn stop(&self) {
        let driver = self.driver.lock().expect("lock poisoned").take();
        match driver {
            Some(Driver { shutdown, handle }) => {
                drop(shutdown);
                if let Err(error) = handle.await {
                    error!("expiration driver panicked: {error}");
                }
            }
            None => info!("expiration driver not running"),
        }
    }
}

impl<C> fmt::Debug for FlowCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffer = self.shared.buffer.lock().expect("lock poisoned");
        f.debug_struct("FlowCache")
            .field("flow_type", &buffer.flow_type())
            .field("resident", &buffer.len())
            .finish_non_exhaustive()
    }
}

/// One expiration cycle per interval until the shutdown side of the watch
/// is dropped.
async fn drive<C>(shared: Arc<Shared>, clock: C, mut shutdown: watch::Receiver<()>)
where
    C: Clock + Send + Sync,
{
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                info!("shutdown signal received");
                return;
            }
            () = clock.sleep_ms(EXPIRE_INTERVAL_MS) => {
                let now = clock.now_ms();
                let expired = shared.buffer.lock().expect("lock poisoned").expire(now);
                if expired.is_empty() {
                    continue;
                }
                counter!("flows_expired", &shared.metric_labels)
                    .increment(expired.len() as u64);
                let listeners = shared.listeners.lock().expect("lock poisoned").clone();
                for listener in listeners {
                    if let Err(error) = listener.process_flows(&expired).await {
                        counter!("listener_failure", &shared.metric_labels).increment(1);
                        error!("flow listener failed: {error}");
                    }
                }
            }
        }
    }
}
