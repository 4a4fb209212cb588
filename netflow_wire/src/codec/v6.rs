//! NetFlow version 6 datagrams.
//!
//! The version 5 layout under version word 6, with the header's trailing
//! pad octets carrying the sampling interval instead. Records are decoded
//! and encoded by [`super::v5`].

use std::io::Write;

use super::{Reader, v5, wire_count, wire_u32};
use crate::{
    CorruptData, Error,
    flow::Flow,
    flow_type::FlowType,
    packet::{Packet, PacketV6},
};

/// Decode a version 6 datagram.
///
/// # Errors
///
/// Returns [`Error::UnsupportedVersion`] when the leading word is not 6,
/// [`Error::Truncated`] when the buffer ends early and [`Error::Corrupt`]
/// on invalid field values.
pub fn decode(buf: &[u8]) -> Result<Packet, Error> {
    let mut r = Reader::new(buf);
    let version = r.u16()?;
    if version != 6 {
        return Err(Error::UnsupportedVersion { version });
    }
    let count = r.u16()?;
    let limit = FlowType::V6.max_flows();
    if count > limit {
        return Err(Error::Corrupt(CorruptData::FlowCount { count, limit }));
    }
    let mut packet = PacketV6::default();
    packet.set_sys_uptime(u64::from(r.u32()?))?;
    packet.set_unix_secs(u64::from(r.u32()?))?;
    packet.set_unix_nsecs(u64::from(r.u32()?))?;
    packet.set_flow_sequence(u64::from(r.u32()?))?;
    packet.engine_type = r.u8()?;
    packet.engine_id = r.u8()?;
    packet.sampling_interval = r.u16()?;
    let mut flows = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        flows.push(Flow::V6(v5::decode_record(&mut r)?));
    }
    packet.set_flows(flows);
    Ok(Packet::V6(packet))
}

/// Encode a version 6 packet as a single datagram.
///
/// # Errors
///
/// Returns [`Error::Io`] when the writer fails and [`Error::TypeMismatch`]
/// if the packet somehow carries a record of another version.
pub fn encode<W: Write>(packet: &PacketV6, writer: &mut W) -> Result<(), Error> {
    writer.write_all(&6u16.to_be_bytes())?;
    writer.write_all(&wire_count(packet.flows().len()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.sys_uptime()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.unix_secs()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.unix_nsecs()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.flow_sequence()).to_be_bytes())?;
    writer.write_all(&[packet.engine_type, packet.engine_id])?;
    writer.write_all(&packet.sampling_interval.to_be_bytes())?;
    for flow in packet.flows() {
        match flow {
            Flow::V6(flow) => v5::encode_record(flow, writer)?,
            other => {
                return Err(Error::TypeMismatch {
                    expected: FlowType::V6,
                    actual: other.flow_type(),
                });
            }
        }
    }
    Ok(())
}
