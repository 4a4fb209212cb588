//! NetFlow version 7 datagrams.
//!
//! The header is 24 octets: version, record count, uptime at export,
//! export wall clock, flow sequence, four reserved octets. No engine
//! fields. Each record is 52 octets, the version 5 record with the first
//! pad octet carrying field validity flags, the trailing pad carrying
//! flow validity flags and a closing word naming the router bypassed by
//! the exporting switch. A datagram carries at most 1000 records.

use std::io::Write;

use super::{Reader, wire_count, wire_u32};
use crate::{
    CorruptData, Error,
    flow::{Flow, FlowStats, FlowV7},
    flow_type::FlowType,
    mask,
    packet::{Packet, PacketV7},
};

/// Decode a version 7 datagram.
///
/// # Errors
///
/// Returns [`Error::UnsupportedVersion`] when the leading word is not 7,
/// [`Error::Truncated`] when the buffer ends early and [`Error::Corrupt`]
/// on invalid field values.
pub fn decode(buf: &[u8]) -> Result<Packet, Error> {
    let mut r = Reader::new(buf);
    let version = r.u16()?;
    if version != 7 {
        return Err(Error::UnsupportedVersion { version });
    }
    let count = r.u16()?;
    let limit = FlowType::V7.max_flows();
    if count > limit {
        return Err(Error::Corrupt(CorruptData::FlowCount { count, limit }));
    }
    let mut packet = PacketV7::default();
    packet.set_sys_uptime(u64::from(r.u32()?))?;
    packet.set_unix_secs(u64::from(r.u32()?))?;
    packet.set_unix_nsecs(u64::from(r.u32()?))?;
    packet.set_flow_sequence(u64::from(r.u32()?))?;
    r.skip(4)?;
    let mut flows = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        flows.push(Flow::V7(decode_record(&mut r)?));
    }
    packet.set_flows(flows);
    Ok(Packet::V7(packet))
}

/// Encode a version 7 packet as a single datagram.
///
/// # Errors
///
/// Returns [`Error::Io`] when the writer fails and [`Error::TypeMismatch`]
/// if the packet somehow carries a record of another version.
pub fn encode<W: Write>(packet: &PacketV7, writer: &mut W) -> Result<(), Error> {
    writer.write_all(&7u16.to_be_bytes())?;
    writer.write_all(&wire_count(packet.flows().len()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.sys_uptime()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.unix_secs()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.unix_nsecs()).to_be_bytes())?;
    writer.write_all(&wire_u32(packet.flow_sequence()).to_be_bytes())?;
    writer.write_all(&[0u8; 4])?;
    for flow in packet.flows() {
        match flow {
            Flow::V7(flow) => encode_record(flow, writer)?,
            other => {
                return Err(Error::TypeMismatch {
                    expected: FlowType::V7,
                    actual: other.flow_type(),
                });
            }
        }
    }
    Ok(())
}

fn decode_record(r: &mut Reader<'_>) -> Result<FlowV7, Error> {
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
    let flags1 = r.u8()?;
    let tcp_flags = r.u8()?;
    let proto = r.u8()?;
    let tos = r.u8()?;
    let src_as = r.u16()?;
    let dst_as = r.u16()?;
    let src_mask_bits = r.u8()?;
    let dst_mask_bits = r.u8()?;
    let flags2 = r.u16()?;
    let router_sc = r.u32()?;

    let mut flow = FlowV7::default();
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
    flow.flags1 = flags1;
    flow.flags2 = flags2;
    flow.router_sc = router_sc;
    Ok(flow)
}

fn encode_record<W: Write>(flow: &FlowV7, writer: &mut W) -> Result<(), Error> {
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
    writer.write_all(&[flow.flags1, flow.tcp_flags, flow.proto, flow.tos])?;
    writer.write_all(&flow.src_as.to_be_bytes())?;
    writer.write_all(&flow.dst_as.to_be_bytes())?;
    writer.write_all(&[
        mask::to_bits(flow.src_mask())?,
        mask::to_bits(flow.dst_mask())?,
    ])?;
    writer.write_all(&flow.flags2.to_be_bytes())?;
    writer.write_all(&flow.router_sc.to_be_bytes())?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[rustfmt::skip]
    const ONE_RECORD: &[u8] = &[
        0x00, 0x07,             // version
        0x00, 0x01,             // count
        0x00, 0x01, 0x86, 0xa0, // sys_uptime 100000ms
        0x65, 0x00, 0x00, 0x00, // unix_secs
        0x00, 0x00, 0x00, 0x00, // unix_nsecs
        0x00, 0x00, 0x02, 0x9a, // flow_sequence 666
        0x00, 0x00, 0x00, 0x00, // reserved
        // record
        0x0a, 0x01, 0x00, 0x01, // src 10.1.0.1
        0x0a, 0x02, 0x00, 0x01, // dst 10.2.0.1
        0x0a, 0x00, 0x00, 0x01, // next_hop 10.0.0.1
        0x00, 0x01,             // input
        0x00, 0x02,             // output
        0x00, 0x00, 0x00, 0x80, // packets 128
        0x00, 0x01, 0x00, 0x00, // octets 65536
        0x00, 0x01, 0x7f, 0xb8, // first 98232ms
        0x00, 0x01, 0x86, 0xa0, // last 100000ms
        0xd4, 0x31,             // src_port 54321
        0x00, 0x16,             // dst_port 22
        0x03,                   // flags1
        0x18,                   // tcp_flags psh+ack
        0x06,                   // proto tcp
        0x00,                   // tos
        0x00, 0x64,             // src_as 100
        0x00, 0xc8,             // dst_as 200
        0x20,                   // src_mask /32
        0x00,                   // dst_mask
        0x00, 0x07,             // flags2
        0xc0, 0xa8, 0x00, 0xfe, // router_sc 192.168.0.254
    ];

    #[test]
    fn decodes_known_datagram() {
        let packet = decode(ONE_RECORD).unwrap();
        assert_eq!(packet.version(), 7);
        assert_eq!(packet.sys_uptime(), 100_000);
        assert_eq!(packet.flow_sequence(), Some(666));
        assert_eq!(packet.flows().len(), 1);

        let Flow::V7(flow) = packet.flows()[0] else {
            panic!("wrong variant");
        };
        assert_eq!(flow.src_addr, u32::from_be_bytes([10, 1, 0, 1]));
        assert_eq!(flow.flags1, 3);
        assert_eq!(flow.flags2, 7);
        assert_eq!(flow.router_sc, u32::from_be_bytes([192, 168, 0, 254]));
        assert_eq!(flow.src_mask(), u32::MAX);
        assert_eq!(flow.dst_mask(), 0);
        assert_eq!(flow.stats.packets(), 128);
        assert_eq!(flow.stats.octets(), 65_536);
    }

    #[test]
    fn encode_reproduces_known_datagram() {
        let Packet::V7(packet) = decode(ONE_RECORD).unwrap() else {
            panic!("wrong variant");
        };
        let mut buf = Vec::new();
        encode(&packet, &mut buf).unwrap();
        assert_eq!(buf.as_slice(), ONE_RECORD);
    }

    #[test]
    fn rejects_count_over_limit() {
        let mut buf = ONE_RECORD.to_vec();
        buf[2] = 0x03;
        buf[3] = 0xe9; // 1001
        assert!(matches!(
            decode(&buf),
            Err(Error::Corrupt(CorruptData::FlowCount {
                count: 1001,
                limit: 1000
            }))
        ));
    }

    fn arb_record() -> impl Strategy<Value = FlowV7> {
        (
            (any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>()),
            (any::<u16>(), any::<u16>(), any::<u16>(), any::<u16>()),
            (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>()),
            (any::<u16>(), any::<u16>(), any::<u16>(), 0u8..=32, 0u8..=32),
            (
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
            ),
        )
            .prop_map(
                |(
                    (src_addr, dst_addr, next_hop, router_sc),
                    (input, output, src_port, dst_port),
                    (proto, tos, tcp_flags, flags1),
                    (src_as, dst_as, flags2, src_mask_bits, dst_mask_bits),
                    (packets, octets, first, last),
                )| {
                    let mut flow = FlowV7::default();
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
                    flow.flags1 = flags1;
                    flow.flags2 = flags2;
                    flow.router_sc = router_sc;
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

    fn arb_packet(max_flows: usize) -> impl Strategy<Value = PacketV7> {
        (
            (
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
                0u64..=0xFFFF_FFFF,
            ),
            proptest::collection::vec(arb_record(), 0..=max_flows),
        )
            .prop_map(|((sys_uptime, unix_secs, unix_nsecs, sequence), flows)| {
                let mut packet = PacketV7::default();
                packet.set_sys_uptime(sys_uptime).unwrap();
                packet.set_unix_secs(unix_secs).unwrap();
                packet.set_unix_nsecs(unix_nsecs).unwrap();
                packet.set_flow_sequence(sequence).unwrap();
                packet.set_flows(flows.into_iter().map(Flow::V7).collect());
                packet
            })
    }

    proptest! {
        #[test]
        fn round_trip(packet in arb_packet(8)) {
            let mut buf = Vec::new();
            encode(&packet, &mut buf).unwrap();
            prop_assert_eq!(buf.len(), 24 + 52 * packet.flows().len());
            let decoded = decode(&buf).unwrap();
            prop_assert_eq!(Packet::V7(packet), decoded);
        }

        #[test]
        fn every_proper_prefix_is_truncated(packet in arb_packet(2)) {
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
