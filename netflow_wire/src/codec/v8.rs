//! NetFlow version 8 datagrams.
//!
//! The header is 28 octets: version, record count, uptime at export,
//! export wall clock, flow sequence, engine type and slot, aggregation
//! scheme code, aggregation export format version, four reserved octets.
//! Every record opens with the same 20 octets of counters, aggregated
//! flow count first, then a scheme-specific tail: 8 octets for AS and
//! protocol-port records, 12 for single-prefix records, 20 for the
//! two-prefix record. A datagram carries at most 1000 records, all of
//! the header's scheme.

use std::io::Write;

use super::{Reader, wire_count, wire_u32};
use crate::{
    CorruptData, Error,
    flow::{
        Flow, FlowStats, FlowV8, RouterAs, RouterDstPrefix, RouterPrefix, RouterProtoPort,
        RouterSrcPrefix,
    },
    flow_type::{AggregationScheme, FlowType},
    mask,
    packet::{Packet, PacketV8},
};

/// Decode a version 8 datagram. The aggregation scheme is read from the
/// header, records are interpreted accordingly.
///
/// # Errors
///
/// Returns [`Error::UnsupportedVersion`] when the leading word is not 8,
/// [`Error::Truncated`] when the buffer ends early and [`Error::Corrupt`]
/// on invalid field values, an unknown scheme code included.
pub fn decode(buf: &[u8]) -> Result<Packet, Error> {
    let mut r = Reader::new(buf);
    let version = r.u16()?;
    if version != 8 {
        return Err(Error::UnsupportedVersion { version });
    }
    let count = r.u16()?;
    let limit = FlowType::V8(AggregationScheme::As).max_flows();
    if count > limit {
        return Err(Error::Corrupt(CorruptData::FlowCount { count, limit }));
    }
    let sys_uptime = r.u32()?;
    let unix_secs = r.u32()?;
    let unix_nsecs = r.u32()?;
    let flow_sequence = r.u32()?;
    let engine_type = r.u8()?;
    let engine_id = r.u8()?;
    let scheme = AggregationScheme::from_code(r.u8()?)?;
    let aggregation_version = r.u8()?;
    r.skip(4)?;

    let mut packet = PacketV8::new(scheme);
    packet.set_sys_uptime(u64::from(sys_uptime))?;
    packet.set_unix_secs(u64::from(unix_secs))?;
    packet.set_unix_nsecs(u64::from(unix_nsecs))?;
    packet.set_flow_sequence(u64::from(flow_sequence))?;
    packet.engine_type = engine_type;
    packet.engine_id = engine_id;
    packet.aggregation_version = aggregation_version;

    let mut flows = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        flows.push(Flow::V8(decode_record(scheme, &mut r)?));
    }
    packet.set_flows(flows);
    Ok(Packet::V8(packet))
}

/// Encode a version 8 packet as a single datagram.
///
/// # Errors
///
/// Returns [`Error::Io`] when the writer fails and [`Error::TypeMismatch`]
/// if the packet somehow carries a record of another version or scheme.
pub fn encode<W: Write>(packet: &PacketV8, writer: &mut W) -> Result<(), Error> {
    writer.write_all(&8u16.to_be_bytes())?;
    writer.write_all(&wire_count(packet.flows().len()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.sys_uptime()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.unix_secs()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.unix_nsecs()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.flow_sequence()).to_be_bytes())?;
    writer.write_all(&[
        packet.engine_type,
        packet.engine_id,
        packet.scheme().code(),
        packet.aggregation_version,
    ])?;
    writer.write_all(&[0u8; 4])?;
    for flow in packet.flows() {
        match flow {
            Flow::V8(record) if record.scheme() == packet.scheme() => {
                encode_record(record, writer)?;
            }
            other => {
                return Err(Error::TypeMismatch {
                    expected: packet.flow_type(),
                    actual: other.flow_type(),
                });
            }
        }
    }
    Ok(())
}

fn decode_record(scheme: AggregationScheme, r: &mut Reader<'_>) -> Result<FlowV8, Error> {
    let flows_aggregated = u64::from(r.u32()?);
    let packets = r.u32()?;
    let octets = r.u32()?;
    let first = r.u32()?;
    let last = r.u32()?;
    let stats = FlowStats::from_wire(packets, octets, first, last);

    let record = match scheme {
        AggregationScheme::As => {
            let mut flow = RouterAs::default();
            flow.set_flows_aggregated(flows_aggregated)?;
            flow.stats = stats;
            flow.src_as = r.u16()?;
            flow.dst_as = r.u16()?;
            flow.input = r.u16()?;
            flow.output = r.u16()?;
            FlowV8::As(flow)
        }
        AggregationScheme::ProtoPort => {
            let mut flow = RouterProtoPort::default();
            flow.set_flows_aggregated(flows_aggregated)?;
            flow.stats = stats;
            flow.proto = r.u8()?;
            r.skip(3)?;
            flow.src_port = r.u16()?;
            flow.dst_port = r.u16()?;
            FlowV8::ProtoPort(flow)
        }
        AggregationScheme::SrcPrefix => {
            let mut flow = RouterSrcPrefix::default();
            flow.set_flows_aggregated(flows_aggregated)?;
            flow.stats = stats;
            flow.src_prefix = r.u32()?;
            let src_mask_bits = r.u8()?;
            r.skip(1)?;
            flow.src_as = r.u16()?;
            flow.input = r.u16()?;
            r.skip(2)?;
            flow.set_src_mask(mask::from_bits(src_mask_bits)?)?;
            FlowV8::SrcPrefix(flow)
        }
        AggregationScheme::DstPrefix => {
            let mut flow = RouterDstPrefix::default();
            flow.set_flows_aggregated(flows_aggregated)?;
            flow.stats = stats;
            flow.dst_prefix = r.u32()?;
            let dst_mask_bits = r.u8()?;
            r.skip(1)?;
            flow.dst_as = r.u16()?;
            flow.output = r.u16()?;
            r.skip(2)?;
            flow.set_dst_mask(mask::from_bits(dst_mask_bits)?)?;
            FlowV8::DstPrefix(flow)
        }
        AggregationScheme::Prefix => {
            let mut flow = RouterPrefix::default();
            flow.set_flows_aggregated(flows_aggregated)?;
            flow.stats = stats;
            flow.src_prefix = r.u32()?;
            flow.dst_prefix = r.u32()?;
            let dst_mask_bits = r.u8()?;
            let src_mask_bits = r.u8()?;
            r.skip(2)?;
            flow.src_as = r.u16()?;
            flow.dst_as = r.u16()?;
            flow.input = r.u16()?;
            flow.output = r.u16()?;
            flow.set_src_mask(mask::from_bits(src_mask_bits)?)?;
            flow.set_dst_mask(mask::from_bits(dst_mask_bits)?)?;
            FlowV8::Prefix(flow)
        }
    };
    Ok(record)
}

fn encode_record<W: Write>(record: &FlowV8, writer: &mut W) -> Result<(), Error> {
    let stats = record.stats();
    writer.write_all(&wire_u32(record.flows_aggregated()).to_be_bytes())?;
    writer.write_all(&wire_u32(stats.packets()).to_be_bytes())?;
    writer.write_all(&wire_u32(stats.octets()).to_be_bytes())?;
    writer.write_all(&wire_u32(stats.first()).to_be_bytes())?;
    writer.write_all(&wire_u32(stats.last()).to_be_bytes())?;
    match record {
        FlowV8::As(flow) => {
            writer.write_all(&flow.src_as.to_be_bytes())?;
            writer.write_all(&flow.dst_as.to_be_bytes())?;
            writer.write_all(&flow.input.to_be_bytes())?;
            writer.write_all(&flow.output.to_be_bytes())?;
        }
        FlowV8::ProtoPort(flow) => {
            writer.write_all(&[flow.proto, 0, 0, 0])?;
            writer.write_all(&flow.src_port.to_be_bytes())?;
            writer.write_all(&flow.dst_port.to_be_bytes())?;
        }
        FlowV8::SrcPrefix(flow) => {
            writer.write_all(&flow.src_prefix.to_be_bytes())?;
            writer.write_all(&[mask::to_bits(flow.src_mask())?, 0])?;
            writer.write_all(&flow.src_as.to_be_bytes())?;
            writer.write_all(&flow.input.to_be_bytes())?;
            writer.write_all(&[0u8; 2])?;
        }
        FlowV8::DstPrefix(flow) => {
            writer.write_all(&flow.dst_prefix.to_be_bytes())?;
            writer.write_all(&[mask::to_bits(flow.dst_mask())?, 0])?;
            writer.write_all(&flow.dst_as.to_be_bytes())?;
            writer.write_all(&flow.output.to_be_bytes())?;
            writer.write_all(&[0u8; 2])?;
        }
        FlowV8::Prefix(flow) => {
            writer.write_all(&flow.src_prefix.to_be_bytes())?;
            writer.write_all(&flow.dst_prefix.to_be_bytes())?;
            writer.write_all(&[
                mask::to_bits(flow.dst_mask())?,
                mask::to_bits(flow.src_mask())?,
            ])?;
            writer.write_all(&[0u8; 2])?;
            writer.write_all(&flow.src_as.to_be_bytes())?;
            writer.write_all(&flow.dst_as.to_be_bytes())?;
            writer.write_all(&flow.input.to_be_bytes())?;
            writer.write_all(&flow.output.to_be_bytes())?;
        }
    }
    Ok(())
}
