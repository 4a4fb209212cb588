//! The UDP protocol speaking exporter.
//!
//! ## Metrics
//!
//! `bytes_written`: Total bytes sent to collectors
//! `packets_sent`: Export datagrams successfully sent
//! `request_failure`: Sends that failed, counted per collector address
//!

use std::{io, net::SocketAddr, sync::Mutex};

use metrics::counter;
use netflow_wire::{encode_any, Batcher, Flow, Packet};
use serde::{Deserialize, Serialize};
use tokio::{net::UdpSocket, sync::OnceCell};

/// Errors produced by [`Udp`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration is invalid
    #[error("invalid exporter configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration failed validation
        reason: &'static str,
    },
    /// Error binding UDP socket
    #[error("Failed to bind UDP socket: {source}")]
    Bind {
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// Error sending a datagram
    #[error("Failed to send packet to {addr}: {source}")]
    Send {
        /// Collector address the send targeted
        addr: SocketAddr,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// Error encoding or batching flows
    #[error(transparent)]
    Wire(#[from] netflow_wire::Error),
}

/// Configuration for [`Udp`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Collector addresses -- IP plus port -- to send export packets to
    pub addrs: Vec<SocketAddr>,
}

impl Config {
    pub(crate) fn valid(&self) -> Result<(), Error> {
        if self.addrs.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "addrs must name at least one collector",
            });
        }
        Ok(())
    }
}

/// The UDP exporter.
///
/// Every packet is sent to every configured collector address from one
/// ephemeral socket, bound on first use. Flows batched through
/// [`Udp::export_flows`] share a single running flow sequence.
#[derive(Debug)]
pub struct Udp {
    addrs: Vec<SocketAddr>,
    socket: OnceCell<UdpSocket>,
    batcher: Mutex<Batcher>,
    metric_labels: Vec<(String, String)>,
}

impl Udp {
    /// Create a new [`Udp`] exporter instance.
    ///
    /// # Errors
    ///
    /// Function will return an error if the configuration is invalid.
    pub fn new(config: &Config) -> Result<Self, Error> {
        config.valid()?;
        Ok(Self {
            addrs: config.addrs.clone(),
            socket: OnceCell::new(),
            batcher: Mutex::new(Batcher::new()),
            metric_labels: vec![
                ("component".to_string(), "exporter".to_string()),
                ("component_name".to_string(), "udp".to_string()),
            ],
        })
    }

    async fn socket(&self) -> Result<&UdpSocket, Error> {
        self.socket
            .get_or_try_init(|| async {
                UdpSocket::bind("0.0.0.0:0")
                    .await
                    .map_err(|source| Error::Bind {
                        source: Box::new(source),
                    })
            })
            .await
    }

    /// Batch `flows` into export packets and ship each one.
    ///
    /// All flows must share one flow type; the type of the first flow
    /// binds the batch. An empty slice is a no-op and does not advance the
    /// flow sequence.
    ///
    /// # Errors
    ///
    /// Function will return an error if the flows mix types or a packet
    /// cannot be encoded or sent.
    ///
    /// # Panics
    ///
    /// Function will panic if the batcher lock is poisoned.
    pub async fn export_flows(&self, flows: &[Flow]) -> Result<(), Error> {
        let Some(first) = flows.first() else {
            return Ok(());
        };
        let packets = self
            .batcher
            .lock()
            .expect("lock poisoned")
            .pack(first.flow_type(), flows)?;
        for packet in &packets {
            self.export_packet(packet).await?;
        }
        Ok(())
    }

    /// Encode `packet` once and send the bytes to every collector address.
    ///
    /// Every address is attempted even after a failure; the first failure
    /// is returned once the rest have been tried.
    ///
    /// # Errors
    ///
    /// Function will return an error if encoding fails or any send fails.
    pub async fn export_packet(&self, packet: &Packet) -> Result<(), Error> {
        let mut bytes = Vec::with_capacity(1500);
        encode_any(packet, &mut bytes)?;
        let socket = self.socket().await?;

        let mut first_failure = None;
        for addr in &self.addrs {
            match socket.send_to(&bytes, addr).await {
                Ok(sent) => {
                    counter!("bytes_written", &self.metric_labels).increment(sent as u64);
                    counter!("packets_sent", &self.metric_labels).increment(1);
                }
                Err(source) => {
                    counter!("request_failure", &self.metric_labels).increment(1);
                    if first_failure.is_none() {
                        first_failure = Some(Error::Send {
                            addr: *addr,
                            source: Box::new(source),
                        });
                    }
                }
            }
        }
        first_failure.map_or(Ok(()), Err)
    }
}
