//! Merge-or-insert flow buffer
//!
//! The non-async interior of the cache. The merge, aging and capacity rules
//! all live here; the current time arrives as an explicit argument.

use netflow_wire::{Flow, FlowType};
use tracing::warn;

use crate::Error;

/// The bounded flow store behind [`crate::FlowCache`].
///
/// Flows sit in insertion order. Accumulation folds a new flow into the
/// first resident record with the same identity; expiration walks the same
/// order when trimming.
#[derive(Debug)]
pub(crate) struct Buffer {
    flow_type: Option<FlowType>,
    flows: Vec<Flow>,
    /// Flows allowed to remain after an expiration pass.
    capacity: usize,
    /// Age bound in milliseconds, measured against `Flow::first`.
    expire_ms: u64,
}

impl Buffer {
    pub(crate) fn new(capacity: usize, expire_ms: u64) -> Self {
        Self {
            flow_type: None,
            flows: Vec::with_capacity(capacity),
            capacity,
            expire_ms,
        }
    }

    pub(crate) fn flow_type(&self) -> Option<FlowType> {
        self.flow_type
    }

    /// Bind the flow type this buffer accepts. One-shot.
    pub(crate) fn set_flow_type(&mut self, flow_type: FlowType) -> Result<(), Error> {
        match self.flow_type {
            Some(current) => Err(Error::AlreadyConfigured { current }),
            None => {
                self.flow_type = Some(flow_type);
                Ok(())
            }
        }
    }

    /// Fold `flow` into the first resident record that shares its identity,
    /// appending it when none does.
    pub(crate) fn accumulate(&mut self, flow: Flow) -> Result<(), Error> {
        let expected = self.flow_type.ok_or(Error::NotConfigured)?;
        let actual = flow.flow_type();
        if actual != expected {
            return Err(Error::TypeMismatch { expected, actual });
        }
        for resident in &mut self.flows {
            if resident.merge(&flow) {
                return Ok(());
            }
        }
        self.flows.push(flow);
        Ok(())
    }

    /// Evict every flow whose age reached the bound, then trim the buffer
    /// back to capacity from the front. Returns the union of both passes.
    pub(crate) fn expire(&mut self, now_ms: u64) -> Vec<Flow> {
        let mut expired = Vec::new();
        let mut kept = Vec::with_capacity(self.flows.len());
        for flow in self.flows.drain(..) {
            if now_ms.saturating_sub(flow.first()) >= self.expire_ms {
                expired.push(flow);
            } else {
                kept.push(flow);
            }
        }
        self.flows = kept;

        let excess = self.flows.len().saturating_sub(self.capacity);
        if excess > 0 {
            warn!(
                "flow buffer over capacity, evicting {excess} of {resident} flows",
                resident = self.flows.len()
            );
            expired.extend(self.flows.drain(..excess));
        }
        expired
    }

    pub(crate) fn content(&self) -> Vec<Flow> {
        self.flows.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.flows.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.flows.len()
    }
}
