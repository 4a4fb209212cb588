//! NetFlow datagram collectors
//!
//! Listening servers that receive export datagrams from routers, decode
//! them and hand the resulting packets to registered consumers.

use std::sync::Arc;

use async_trait::async_trait;
use netflow_cache::{Clock, FlowCache};
use netflow_wire::Packet;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub mod udp;

/// Errors produced by [`Server`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// See [`crate::collector::udp::Error`] for details.
    #[error(transparent)]
    Udp(#[from] udp::Error),
}

/// Configuration for [`Server`]
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum Config {
    /// See [`crate::collector::udp::Config`] for details.
    Udp(udp::Config),
}

/// Consumer of decoded export packets.
#[async_trait]
pub trait PacketListener {
    /// Receive one decoded packet.
    ///
    /// # Errors
    ///
    /// Failures are logged by the collector and never stop delivery to the
    /// other listeners.
    async fn process_packet(
        &self,
        packet: &Packet,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[async_trait]
impl<C> PacketListener for FlowCache<C>
where
    C: Clock + Clone + Send + Sync + 'static,
{
    async fn process_packet(
        &self,
        packet: &Packet,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.accumulate_packet(packet)?;
        Ok(())
    }
}

/// The collector server.
///
/// All collectors supported by the agent are a variant of this enum.
#[derive(Debug)]
pub enum Server {
    /// See [`crate::collector::udp::Udp`] for details.
    Udp(udp::Udp),
}

impl Server {
    /// Create a new [`Server`], deferring to the underlying variant.
    #[must_use]
    pub fn new(
        config: Config,
        listeners: Vec<Arc<dyn PacketListener + Send + Sync>>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        match config {
            Config::Udp(conf) => Self::Udp(udp::Udp::new(&conf, listeners, shutdown)),
        }
    }

    /// Run this [`Server`] to completion, or until a shutdown signal is
    /// received.
    ///
    /// # Errors
    ///
    /// Function will return an error if the underlying variant signals
    /// error.
    pub async fn run(self) -> Result<(), Error> {
        match self {
            Server::Udp(inner) => inner.run().await.map_err(Error::Udp),
        }
    }
}
