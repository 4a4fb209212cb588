//! NetFlow version 1 datagrams.
//!
//! The header is 16 octets: version, record count, uptime at export,
//! export wall clock as seconds and a nanosecond remainder. Each record
//! is 48 octets and a datagram carries at most 24.

use std::io::Write;

use super::{Reader, wire_count, wire_u32};
use crate::{
    CorruptData, Error,
    flow::{Flow, FlowStats, FlowV1},
    flow_type::FlowType,
    packet::{Packet, PacketV1},
};

/// Decode a version 1 datagram.
///
/// # Errors
///
/// Returns [`Error::UnsupportedVersion`] when the leading word is not 1,
/// [`Error::Truncated`] when the buffer ends early and [`Error::Corrupt`]
/// on invalid field values.
pub fn decode(buf: &[u8]) -> Result<Packet, Error> {
    let mut r = Reader::new(buf);
    let version = r.u16()?;
    if version != 1 {
        return Err(Error::UnsupportedVersion { version });
    }
    let count = r.u16()?;
    let limit = FlowType::V1.max_flows();
    if count > limit {
        return Err(Error::Corrupt(CorruptData::FlowCount { count, limit }));
    }
    let mut packet = PacketV1::default();
    packet.set_sys_uptime(u64::from(r.u32()?))?;
    packet.set_unix_secs(u64::from(r.u32()?))?;
    packet.set_unix_nsecs(u64::from(r.u32()?))?;
    let mut flows = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        flows.push(Flow::V1(decode_record(&mut r)?));
    }
    packet.set_flows(flows);
    Ok(Packet::V1(packet))
}

/// Encode a version 1 packet as a single datagram.
///
/// # Errors
///
/// Returns [`Error::Io`] when the writer fails and [`Error::TypeMismatch`]
/// if the packet somehow carries a record of another version.
pub fn encode<W: Write>(packet: &PacketV1, writer: &mut W) -> Result<(), Error> {
    writer.write_all(&1u16.to_be_bytes())?;
    writer.write_all(&wire_count(packet.flows().len()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.sys_uptime()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.unix_secs()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.unix_nsecs()).to_be_bytes())?;
    for flow in packet.flows() {
        match flow {
            Flow::V1(flow) => encode_record(flow, writer)?,
            other => {
                return Err(Error::TypeMismatch {
                    expected: FlowType::V1,
                    actual: other.flow_type(),
                });
            }
        }
    }
    Ok(())
}

fn decode_record(r: &mut Reader<'_>) -> Result<FlowV1, Error> {
    let src_addr = r.u32()?;
    let dst_addr = r.u32()?;
    let next_hop = r.u32()?;
    let input = r.u16()?;
    let output = r.u16()?;
    let packets = r.u32()?;
    let octets = r.u32()?;
    let first = r.u32()?;
    let last = r.u32()?;
    let src_port = r.u16()?;
    let dst_port = r.u16()?;
    r.skip(2)?;
    let proto = r.u8()?;
    let tos = r.u8()?;
    let tcp_flags = r.u8()?;
    r.skip(7)?;
    Ok(FlowV1 {
        stats: FlowStats::from_wire(packets, octets, first, last),
        src_addr,
        dst_addr,
        next_hop,
        input,
        output,
        src_port,
        dst_port,
        proto,
        tos,
        tcp_flags,
    })
}

fn encode_record<W: Write>(flow: &FlowV1, writer: &mut W) -> Result<(), Error> {
    writer.write_all(&flow.src_addr.to_be_bytes())?;
    writer.write_all(&flow.dst_addr.to_be_bytes())?;
    writer.write_all(&flow.next_hop.to_be_bytes())?;
    writer.write_all(&flow.input.to_be_bytes())?;
    writer.write_all(&flow.output.to_be_bytes())?;
    writer.write_all(&wire_u32(flow.stats.packets()).to_be_bytes())?;
    writer.write_all(&wire_u32(flow.stats.octets()).to_be_bytes())?;
    writer.write_all(&wire_u32(flow.stats.first()).to_be_bytes())?;
    writer.write_all(&wire_u32(flow.stats.last()).to_be_bytes())?;
    writer.write_all(&flow.src_port.to_be_bytes())?;
    writer.write_all(&flow.dst_port.to_be_bytes())?;
    writer.write_all(&[0u8; 2])?;
    writer.write_all(&[flow.proto, flow.tos, flow.tcp_flags])?;
    writer.write_all(&[0u8; 7])?;
    Ok(())
}
