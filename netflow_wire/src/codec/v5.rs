//! NetFlow version 5 datagrams.
//!
//! The header is 24 octets: version, record count, uptime at export,
//! export wall clock, flow sequence, engine type and slot, two pad
//! octets. Each record is 48 octets with prefix masks carried as bit
//! counts, and a datagram carries at most 30. Version 6 shares the record
//! layout, so the record codec here is reused by [`super::v6`].

use std::io::Write;

use super::{Reader, wire_count, wire_u32};
use crate::{
    CorruptData, Error,
    flow::{Flow, FlowStats, FlowV5},
    flow_type::FlowType,
    mask,
    packet::{Packet, PacketV5},
};

/// Decode a version 5 datagram.
///
/// # Errors
///
/// Returns [`Error::UnsupportedVersion`] when the leading word is not 5,
/// [`Error::Truncated`] when the buffer ends early and [`Error::Corrupt`]
/// on invalid field values.
pub fn decode(buf: &[u8]) -> Result<Packet, Error> {
    let mut r = Reader::new(buf);
    let version = r.u16()?;
    if version != 5 {
        return Err(Error::UnsupportedVersion { version });
    }
    let count = r.u16()?;
    let limit = FlowType::V5.max_flows();
    if count > limit {
        return Err(Error::Corrupt(CorruptData::FlowCount { count, limit }));
    }
    let mut packet = PacketV5::default();
    packet.set_sys_uptime(u64::from(r.u32()?))?;
    packet.set_unix_secs(u64::from(r.u32()?))?;
    packet.set_unix_nsecs(u64::from(r.u32()?))?;
    packet.set_flow_sequence(u64::from(r.u32()?))?;
    packet.engine_type = r.u8()?;
    packet.engine_id = r.u8()?;
    r.skip(2)?;
    let mut flows = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        flows.push(Flow::V5(decode_record(&mut r)?));
    }
    packet.set_flows(flows);
    Ok(Packet::V5(packet))
}

/// Encode a version 5 packet as a single datagram.
///
/// # Errors
///
/// Returns [`Error::Io`] when the writer fails and [`Error::TypeMismatch`]
/// if the packet somehow carries a record of another version.
pub fn encode<W: Write>(packet: &PacketV5, writer: &mut W) -> Result<(), Error> {
    writer.write_all(&5u16.to_be_bytes())?;
    writer.write_all(&wire_count(packet.flows().len()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.sys_uptime()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.unix_secs()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.unix_nsecs()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.flow_sequence()).to_be_bytes())?;
    writer.write_all(&[packet.engine_type, packet.engine_id])?;
    writer.write_all(&[0u8; 2])?;
    for flow in packet.flows() {
        match flow {
            Flow::V5(flow) => encode_record(flow, writer)?,
            other => {
                return Err(Error::TypeMismatch {
                    expected: FlowType::V5,
                    actual: other.flow_type(),
                });
            }
        }
    }
    Ok(())
}

pub(super) fn decode_record(r: &mut Reader<'_>) -> Result<FlowV5, Error> {
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
    r.skip(1)?;
    let tcp_flags = r.u8()?;
    let proto = r.u8()?;
    let tos = r.u8()?;
    let src_as = r.u16()?;
    let dst_as = r.u16()?;
    let src_mask_bits = r.u8()?;
    let dst_mask_bits = r.u8()?;
    r.skip(2)?;

    let mut flow = FlowV5::default();
    flow.set_src_mask(mask::from_bits(src_mask_bits)?)?;
    flow.set_dst_mask(mask::from_bits(dst_mask_bits)?)?;
    flow.stats = FlowStats::from_wire(packets, octets, first, last);
    flow.src_addr = src_addr;
    flow.dst_addr = dst_addr;
    flow.next_hop = next_hop;
    flow.input = input;
    flow.output = output;
    flow.src_port = src_port;
    flow.dst_port = dst_port;
    flow.proto = proto;
    flow.tos = tos;
    flow.tcp_flags = tcp_flags;
    flow.src_as = src_as;
    flow.dst_as = dst_as;
    Ok(flow)
}

pub(super) fn encode_record<W: Write>(flow: &FlowV5, writer: &mut W) -> Result<(), Error> {
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
    writer.write_all(&[0, flow.tcp_flags, flow.proto, flow.tos])?;
    writer.write_all(&flow.src_as.to_be_bytes())?;
    writer.write_all(&flow.dst_as.to_be_bytes())?;
    writer.write_all(&[
        mask::to_bits(flow.src_mask())?,
        mask::to_bits(flow.dst_mask())?,
    ])?;
    writer.write_all(&[0u8; 2])?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[rustfmt::skip]
    const ONE_RECORD: &[u8] = &[
        0x00, 0x05,             // version
        0x00, 0x01,             // count
        0x00, 0x00, 0x13, 0x88, // sys_uptime 5000ms
        0x00, 0x0f, 0x42, 0x40, // unix_secs 1000000
        0x00, 0x00, 0x00, 0x00, // unix_nsecs
        0x00, 0x00, 0x00, 0x01, // flow_sequence
        0x00,                   // engine_type
        0x00,                   // engine_id
        0x00, 0x00,             // pad
        // record
        0x0a, 0x00, 0x00, 0x01, // src 10.0.0.1
        0x0a, 0x00, 0x00, 0x02, // dst 10.0.0.2
        0x00, 0x00, 0x00, 0x00, // next_hop
        0x00, 0x00,             // input
        0x00, 0x00,             // output
        0x00, 0x00, 0x00, 0x0a, // packets 10
        0x00, 0x00, 0x05, 0xdc, // octets 1500
        0x00, 0x00, 0x0f, 0xa0, // first 4000ms
        0x00, 0x00, 0x13, 0x88, // last 5000ms
        0x00, 0x50,             // src_port 80
        0x01, 0xbb,             // dst_port 443
        0x00,                   // pad
        0x12,                   // tcp_flags syn+ack
        0x06,                   // proto tcp
        0x00,                   // tos
        0xfc, 0x00,             // src_as 64512
        0xfc, 0x01,             // dst_as 64513
        0x18,                   // src_mask /24
        0x10,                   // dst_mask /16
        0x00, 0x00,             // pad
    ];

    #[test]
    fn decodes_known_datagram() {
        let packet = decode(ONE_RECORD).unwrap();
        assert_eq!(packet.version(), 5);
        assert_eq!(packet.sys_uptime(), 5_000);
        assert_eq!(packet.unix_secs(), 1_000_000);
        assert_eq!(packet.flow_sequence(), Some(1));
        assert_eq!(packet.flows().len(), 1);

        let Flow::V5(flow) = packet.flows()[0] else {
            panic!("wrong variant");
        };
        assert_eq!(flow.src_addr, u32::from_be_bytes([10, 0, 0, 1]));
        assert_eq!(flow.dst_addr, u32::from_be_bytes([10, 0, 0, 2]));
        assert_eq!(flow.src_port, 80);
        assert_eq!(flow.dst_port, 443);
        assert_eq!(flow.proto, 6);
        assert_eq!(flow.tcp_flags, 0x12);
        assert_eq!(flow.stats.packets(), 10);
        assert_eq!(flow.stats.octets(), 1_500);
        assert_eq!(flow.src_as, 64_512);
        assert_eq!(flow.dst_as, 64_513);
        assert_eq!(flow.src_mask(), 0xFFFF_FF00);
        assert_eq!(flow.dst_mask(), 0xFFFF_0000);
    }

    #[test]
    fn decoded_datagram_recovers_wall_clock_traffic() {
        let packet = decode(ONE_RECORD).unwrap();
        let records = packet.to_traffic();
        assert_eq!(records.len(), 1);
        // Boot at 1_000_000s minus 5000ms uptime, flow ended at uptime
        // 5000ms, so the record lands exactly on the export instant.
        assert_eq!(records[0].time_ms, 1_000_000_000);
        assert_eq!(records[0].packets, 10);
        assert_eq!(records[0].octets, 1_500);
        assert_eq!(records[0].src_addr, Some(u32::from_be_bytes([10, 0, 0, 1])));
        assert_eq!(records[0].src_mask, Some(0xFFFF_FF00));
    }

    #[test]
    fn encode_reproduces_known_datagram() {
        let Packet::V5(packet) = decode(ONE_RECORD).unwrap() else {
            panic!("wrong variant");
        };
        let mut buf = Vec::new();
        encode(&packet, &mut buf).unwrap();
        assert_eq!(buf.as_slice(), ONE_RECORD);
    }

    #[test]
    fn rejects_wrong_version_word() {
        let mut buf = ONE_RECORD.to_vec();
        buf[1] = 1;
        assert!(matches!(
            decode(&buf),
            Err(Error::UnsupportedVersion { version: 1 })
        ));
    }

    #[test]
    fn rejects_count_over_limit() {
        let mut buf = ONE_RECORD.to_vec();
        buf[3] = 31;
        assert!(matches!(
            decode(&buf),
            Err(Error::Corrupt(CorruptData::FlowCount {
                count: 31,
                limit: 30
            }))
        ));
    }

    #[test]
    fn rejects_mask_bits_over_32() {
        let mut buf = ONE_RECORD.to_vec();
        // src_mask_bits is the 45th record octet, 24 header octets in.
        buf[24 + 44] = 33;
        assert!(matches!(
            decode(&buf),
            Err(Error::Corrupt(CorruptData::MaskBits { bits: 33 }))
        ));
    }

    fn arb_record() -> impl Strategy<Value = FlowV5> {
        (
            (any::<u32>(), any::<u32>(), any::<u32>()),
            (any::<u16>(), any::<u16>(), any::<u16>(), any::<u16>()),
            (any::<u8>(), any::<u8>(), any::<u8>()),
            (any::<u16>(), any::<u16>(), 0u8..=32, 0u8..=32),
            (
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
            ),
        )
            .prop_map(
                |(
                    (src_addr, dst_addr, next_hop),
                    (input, output, src_port, dst_port),
                    (proto, tos, tcp_flags),
                    (src_as, dst_as, src_mask_bits, dst_mask_bits),
                    (packets, octets, first, last),
                )| {
                    let mut flow = FlowV5::default();
                    flow.src_addr = src_addr;
                    flow.dst_addr = dst_addr;
                    flow.next_hop = next_hop;
                    flow.input = input;
                    flow.output = output;
                    flow.src_port = src_port;
                    flow.dst_port = dst_port;
                    flow.proto = proto;
                    flow.tos = tos;
                    flow.tcp_flags = tcp_flags;
                    flow.src_as = src_as;
                    flow.dst_as = dst_as;
                    flow.set_src_mask(mask::from_bits(src_mask_bits).unwrap())
                        .unwrap();
                    flow.set_dst_mask(mask::from_bits(dst_mask_bits).unwrap())
                        .unwrap();
                    flow.stats.set_packets(packets).unwrap();
                    flow.stats.set_octets(octets).unwrap();
                    flow.stats.set_first(first).unwrap();
                    flow.stats.set_last(last).unwrap();
                    flow
                },
            )
    }

    fn arb_packet(max_flows: usize) -> impl Strategy<Value = PacketV5> {
        (
            (
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
            ),
            any::<u8>(),
            any::<u8>(),
            proptest::collection::vec(arb_record(), 0..=max_flows),
        )
            .prop_map(|((sys_uptime, unix_secs, unix_nsecs, sequence), et, eid, flows)| {
                let mut packet = PacketV5::default();
                packet.set_sys_uptime(sys_uptime).unwrap();
                packet.set_unix_secs(unix_secs).unwrap();
                packet.set_unix_nsecs(unix_nsecs).unwrap();
                packet.set_flow_sequence(sequence).unwrap();
                packet.engine_type = et;
                packet.engine_id = eid;
                packet.set_flows(flows.into_iter().map(Flow::V5).collect());
                packet
            })
    }

    proptest! {
        #[test]
        fn round_trip(packet in arb_packet(30)) {
            let mut buf = Vec::new();
            encode(&packet, &mut buf).unwrap();
            prop_assert_eq!(buf.len(), 24 + 48 * packet.flows().len());
            let decoded = decode(&buf).unwrap();
            prop_assert_eq!(Packet::V5(packet), decoded);
        }

        #[test]
        fn every_proper_prefix_is_truncated(packet in arb_packet(3)) {
            let mut buf = Vec::new();
            encode(&packet, &mut buf).unwrap();
            for cut in 0..buf.len() {
                prop_assert!(
                    matches!(decode(&buf[..cut]), Err(Error::Truncated { .. })),
                    "assertion failed: matches!(decode(&buf[..cut]), Err(Error::Truncated {{ .. }}))"
                );
            }
        }
    }
}
