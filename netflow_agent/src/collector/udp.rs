//! The UDP protocol speaking collector.
//!
//! ## Metrics
//!
//! `bytes_received`: Total bytes received
//! `packets_received`: Export datagrams successfully decoded
//! `flows_received`: Flow records carried by decoded packets
//! `decode_failure`: Datagrams that failed to decode
//!

use std::{fmt, io, net::SocketAddr, sync::Arc};

use metrics::counter;
use netflow_wire::{decode_any, flow_type};
use serde::{Deserialize, Serialize};
use tokio::{net::UdpSocket, sync::watch};
use tracing::{error, info, warn};

use super::PacketListener;

/// Errors produced by [`Udp`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error binding UDP socket
    #[error("Failed to bind UDP socket to {addr}: {source}")]
    Bind {
        /// Binding address
        addr: SocketAddr,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// Error receiving packet
    #[error("Failed to receive packet on {addr}: {source}")]
    Recv {
        /// Listening address
        addr: SocketAddr,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
}

/// Configuration for [`Udp`].
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// address -- IP plus port -- to bind to
    pub binding_addr: SocketAddr,
    /// Drop decoded packets that carry no flows instead of forwarding them
    #[serde(default = "default_skip_empty")]
    pub skip_empty: bool,
}

fn default_skip_empty() -> bool {
    true
}

/// The UDP collector.
pub struct Udp {
    binding_addr: SocketAddr,
    skip_empty: bool,
    listeners: Vec<Arc<dyn PacketListener + Send + Sync>>,
    shutdown: watch::Receiver<()>,
    metric_labels: Vec<(String, String)>,
}

impl Udp {
    /// Create a new [`Udp`] collector instance.
    ///
    /// Installs the default version registry bindings as a side effect, so
    /// decoding recognizes every stock packet version.
    #[must_use]
    pub fn new(
        config: &Config,
        listeners: Vec<Arc<dyn PacketListener + Send + Sync>>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        flow_type::register_defaults();
        Self {
            binding_addr: config.binding_addr,
            skip_empty: config.skip_empty,
            listeners,
            shutdown,
            metric_labels: vec![
                ("component".to_string(), "collector".to_string()),
                ("component_name".to_string(), "udp".to_string()),
            ],
        }
    }

    /// Run [`Udp`] to completion
    ///
    /// Receives export datagrams until a shutdown signal arrives. Each
    /// datagram is decoded and fanned out to the listeners; a datagram that
    /// fails to decode is counted and dropped, never fatal.
    ///
    /// # Errors
    ///
    /// Function will return an error if binding the socket or receiving a
    /// packet fails.
    pub async fn run(self) -> Result<(), Error> {
        let Self {
            binding_addr,
            skip_empty,
            listeners,
            mut shutdown,
            metric_labels,
        } = self;

        let socket = UdpSocket::bind(&binding_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: binding_addr,
                source: Box::new(source),
            })?;
        let mut buf = vec![0; 65536];

        loop {
            tokio::select! {
                packet = socket.recv_from(&mut buf) => {
                    let (bytes, _) = packet.map_err(|source| Error::Recv {
                        addr: binding_addr,
                        source: Box::new(source),
                    })?;
                    counter!("bytes_received", &metric_labels).increment(bytes as u64);
                    match decode_any(&buf[..bytes]) {
                        Ok(packet) => {
                            counter!("packets_received", &metric_labels).increment(1);
                            counter!("flows_received", &metric_labels)
                                .increment(packet.flows().len() as u64);
                            if skip_empty && packet.flows().is_empty() {
                                continue;
                            }
                            for listener in &listeners {
                                if let Err(error) = listener.process_packet(&packet).await {
                                    error!("packet listener failed: {error}");
                                }
                            }
                        }
                        Err(error) => {
                            counter!("decode_failure", &metric_labels).increment(1);
                            warn!("failed to decode datagram: {error}");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("shutdown signal received");
                    return Ok(())
                }
            }
        }
    }
}

impl fmt::Debug for Udp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Udp")
            .field("binding_addr", &self.binding_addr)
            .field("skip_empty", &self.skip_empty)
            .finish_non_exhaustive()
    }
}
