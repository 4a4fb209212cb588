//! Exporters push flow records to downstream collectors.
//!
//! An exporter owns the outbound half of the agent: it batches flows into
//! export packets, stamps sequence numbers and ships the encoded bytes to
//! every configured collector address. Wired up as a
//! [`FlowListener`](netflow_cache::FlowListener) it publishes whatever the
//! flow cache expires.

use async_trait::async_trait;
use netflow_cache::FlowListener;
use netflow_wire::{Flow, Packet};
use serde::{Deserialize, Serialize};

pub mod udp;

/// Errors produced by [`Exporter`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// See [`crate::exporter::udp::Error`] for details.
    #[error(transparent)]
    Udp(#[from] udp::Error),
}

/// Configuration for [`Exporter`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum Config {
    /// See [`crate::exporter::udp::Config`] for details.
    Udp(udp::Config),
}

/// The exporter.
#[derive(Debug)]
pub enum Exporter {
    /// See [`crate::exporter::udp::Udp`] for details.
    Udp(udp::Udp),
}

impl Exporter {
    /// Create a new [`Exporter`].
    ///
    /// # Errors
    ///
    /// Function will return an error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self, Error> {
        match config {
            Config::Udp(conf) => Ok(Self::Udp(udp::Udp::new(&conf)?)),
        }
    }

    /// Batch `flows` into export packets and ship them.
    ///
    /// All flows must share one flow type. An empty slice is a no-op.
    ///
    /// # Errors
    ///
    /// Function will return an error if batching or sending fails.
    pub async fn export_flows(&self, flows: &[Flow]) -> Result<(), Error> {
        match self {
            Self::Udp(inner) => inner.export_flows(flows).await.map_err(Error::Udp),
        }
    }

    /// Ship an already assembled packet as-is.
    ///
    /// # Errors
    ///
    /// Function will return an error if encoding or sending fails.
    pub async fn export_packet(&self, packet: &Packet) -> Result<(), Error> {
        match self {
            Self::Udp(inner) => inner.export_packet(packet).await.map_err(Error::Udp),
        }
    }
}

#[async_trait]
impl FlowListener for Exporter {
    async fn process_flows(
        &self,
        flows: &[Flow],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.export_flows(flows).await?;
        Ok(())
    }
}
