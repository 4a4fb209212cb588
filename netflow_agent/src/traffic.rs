//! Folding raw traffic measurements into the flow cache.
//!
//! An [`Aggregator`] is the producer-side handle to a shared
//! [`FlowCache`]: hand it version-neutral [`TrafficRecord`]s and it shapes
//! each one into the cache's configured flow type before accumulating.
//! Handles are cheap to clone, one per packet source.

use std::sync::Arc;

use netflow_cache::{Clock, Error, FlowCache, RealClock};
use netflow_wire::TrafficRecord;

/// Shapes traffic measurements into flows and feeds a shared cache.
#[derive(Debug, Clone)]
pub struct Aggregator<C = RealClock> {
    cache: Arc<FlowCache<C>>,
}

impl<C> Aggregator<C>
where
    C: Clock + Clone + Send + Sync + 'static,
{
    /// Create a new [`Aggregator`] feeding `cache`.
    #[must_use]
    pub fn new(cache: Arc<FlowCache<C>>) -> Self {
        Self { cache }
    }

    /// Fold one traffic measurement into the cache.
    ///
    /// The record is shaped into the cache's configured flow type; absent
    /// optional fields become the zero value of their wire field.
    ///
    /// # Errors
    ///
    /// Function will return an error if no flow type has been configured
    /// on the cache.
    pub fn record(&self, record: &TrafficRecord) -> Result<(), Error> {
        let flow_type = self.cache.flow_type().ok_or(Error::NotConfigured)?;
        self.cache.accumulate(flow_type.flow_from_traffic(record))
    }
}
