//! Packing flows into export packets.

use crate::{Error, WIRE_U32_MAX, flow::Flow, flow_type::FlowType, packet::Packet};

/// Packs same-type flows into export packets and numbers them with a
/// running flow sequence.
///
/// The sequence counts flows, not packets. A packet's header carries the
/// total number of flows packed through that packet: packing one flow
/// twice in a row yields packets stamped 1 and then 2. The counter runs
/// in 64 bits and is stamped modulo the 32-bit wire width, matching how
/// exporting routers wrap.
#[derive(Debug, Clone, Copy, Default)]
pub struct Batcher {
    flow_sequence: u64,
}

impl Batcher {
    /// A batcher with its sequence at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total flows packed so far.
    #[must_use]
    pub fn flow_sequence(&self) -> u64 {
        self.flow_sequence
    }

    /// Pack `flows` into as few packets as the type's record budget
    /// allows, stamping each sequenced header. Version 1 packets carry no
    /// sequence but their flows still advance the counter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if any flow is not of `flow_type`.
    /// Nothing is packed and the sequence does not advance.
    pub fn pack(&mut self, flow_type: FlowType, flows: &[Flow]) -> Result<Vec<Packet>, Error> {
        for flow in flows {
            let actual = flow.flow_type();
            if actual != flow_type {
                return Err(Error::TypeMismatch {
                    expected: flow_type,
                    actual,
                });
            }
        }
        let budget = usize::from(flow_type.max_flows());
        let mut packets = Vec::with_capacity(flows.len().div_ceil(budget));
        for chunk in flows.chunks(budget) {
            let mut packet = flow_type.new_packet();
            for flow in chunk {
                packet.push_flow(*flow)?;
                self.flow_sequence = self.flow_sequence.wrapping_add(1);
            }
            let stamp = self.flow_sequence & WIRE_U32_MAX;
            match &mut packet {
                Packet::V1(_) => {}
                Packet::V5(p) => p.set_flow_sequence(stamp)?,
                Packet::V6(p) => p.set_flow_sequence(stamp)?,
                Packet::V7(p) => p.set_flow_sequence(stamp)?,
                Packet::V8(p) => p.set_flow_sequence(stamp)?,
            }
            packets.push(packet);
        }
        Ok(packets)
    }
}
