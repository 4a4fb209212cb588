//! Export packets for NetFlow versions 1 through 8.
//!
//! A packet is a version header plus the flow records it carries. Versions
//! differ in header fields and in how many records fit: 24 for version 1,
//! 30 for versions 5 and 6, 1000 for versions 7 and 8. [`push_flow`]
//! enforces both the version gate and the record budget and keeps the
//! packet's uptime stamp covering every flow it holds.
//!
//! [`push_flow`]: Packet::push_flow

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    CorruptData, Error,
    flow::{Flow, check_wire_u32},
    flow_type::{AggregationScheme, FlowType},
    traffic::TrafficRecord,
};

fn clock_parts() -> (u64, u64) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs(), u64::from(now.subsec_nanos()))
}

macro_rules! packet_core {
    ($($ty:ty),+) => {
        $(impl $ty {
            /// Device uptime in milliseconds when the packet was exported.
            #[must_use]
            pub fn sys_uptime(&self) -> u64 {
                self.sys_uptime
            }

            /// Seconds since the Unix epoch when the packet was exported.
            #[must_use]
            pub fn unix_secs(&self) -> u64 {
                self.unix_secs
            }

            /// Nanosecond remainder of the export instant.
            #[must_use]
            pub fn unix_nsecs(&self) -> u64 {
                self.unix_nsecs
            }

            /// Flow records carried by the packet.
            #[must_use]
            pub fn flows(&self) -> &[Flow] {
                &self.flows
            }

            /// Set the device uptime.
            ///
            /// # Errors
            ///
            /// Returns [`CorruptData::ValueRange`] past the 32-bit wire
            /// maximum.
            pub fn set_sys_uptime(&mut self, ms: u64) -> Result<(), CorruptData> {
                check_wire_u32("sys_uptime", ms)?;
                self.sys_uptime = ms;
                Ok(())
            }

            /// Set the export instant's whole seconds.
            ///
            /// # Errors
            ///
            /// Returns [`CorruptData::ValueRange`] past the 32-bit wire
            /// maximum.
            pub fn set_unix_secs(&mut self, secs: u64) -> Result<(), CorruptData> {
                check_wire_u32("unix_secs", secs)?;
                self.unix_secs = secs;
                Ok(())
            }

            /// Set the export instant's nanosecond remainder.
            ///
            /// # Errors
            ///
            /// Returns [`CorruptData::ValueRange`] past the 32-bit wire
            /// maximum.
            pub fn set_unix_nsecs(&mut self, nsecs: u64) -> Result<(), CorruptData> {
                check_wire_u32("unix_nsecs", nsecs)?;
                self.unix_nsecs = nsecs;
                Ok(())
            }

            /// Append a flow, raising the packet uptime to cover it.
            ///
            /// # Errors
            ///
            /// Returns [`Error::TypeMismatch`] when the flow's version or
            /// scheme differs from the packet's and [`Error::Corrupt`] when
            /// the packet already carries the version's record limit.
            pub fn push_flow(&mut self, flow: Flow) -> Result<(), Error> {
                let expected = self.flow_type();
                let actual = flow.flow_type();
                if actual != expected {
                    return Err(Error::TypeMismatch { expected, actual });
                }
                let limit = expected.max_flows();
                if self.flows.len() >= usize::from(limit) {
                    return Err(Error::Corrupt(CorruptData::FlowCount {
                        count: limit.saturating_add(1),
                        limit,
                    }));
                }
                self.sys_uptime = self.sys_uptime.max(flow.last());
                self.flows.push(flow);
                Ok(())
            }

            // Decoding installs wire-read flows as-is so the header stays
            // exactly what the datagram carried.
            pub(crate) fn set_flows(&mut self, flows: Vec<Flow>) {
                self.flows = flows;
            }
        })+
    };
}

macro_rules! packet_sequence {
    ($($ty:ty),+) => {
        $(impl $ty {
            /// Export sequence counter carried in the header.
            #[must_use]
            pub fn flow_sequence(&self) -> u64 {
                self.flow_sequence
            }

            /// Set the flow sequence counter.
            ///
            /// # Errors
            ///
            /// Returns [`CorruptData::ValueRange`] past the 32-bit wire
            /// maximum.
            pub fn set_flow_sequence(&mut self, sequence: u64) -> Result<(), CorruptData> {
                check_wire_u32("flow_sequence", sequence)?;
                self.flow_sequence = sequence;
                Ok(())
            }
        })+
    };
}

/// Version 1 export packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketV1 {
    sys_uptime: u64,
    unix_secs: u64,
    unix_nsecs: u64,
    flows: Vec<Flow>,
}

impl PacketV1 {
    /// A new empty packet stamped with the current wall clock.
    #[must_use]
    pub fn new() -> Self {
        let (unix_secs, unix_nsecs) = clock_parts();
        Self {
            sys_uptime: 0,
            unix_secs,
            unix_nsecs,
            flows: Vec::new(),
        }
    }

    /// The packet's flow type.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        FlowType::V1
    }
}

/// Version 5 export packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketV5 {
    sys_uptime: u64,
    unix_secs: u64,
    unix_nsecs: u64,
    flow_sequence: u64,
    /// Flow switching engine type.
    pub engine_type: u8,
    /// Flow switching engine slot.
    pub engine_id: u8,
    flows: Vec<Flow>,
}

impl PacketV5 {
    /// A new empty packet stamped with the current wall clock.
    #[must_use]
    pub fn new() -> Self {
        let (unix_secs, unix_nsecs) = clock_parts();
        Self {
            sys_uptime: 0,
            unix_secs,
            unix_nsecs,
            flow_sequence: 0,
            engine_type: 0,
            engine_id: 0,
            flows: Vec::new(),
        }
    }

    /// The packet's flow type.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        FlowType::V5
    }
}

/// Version 6 export packet. The version 5 header with the trailing pad
/// reused as a sampling interval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketV6 {
    sys_uptime: u64,
    unix_secs: u64,
    unix_nsecs: u64,
    flow_sequence: u64,
    /// Flow switching engine type.
    pub engine_type: u8,
    /// Flow switching engine slot.
    pub engine_id: u8,
    /// Packet sampling interval at the exporting device.
    pub sampling_interval: u16,
    flows: Vec<Flow>,
}

impl PacketV6 {
    /// A new empty packet stamped with the current wall clock.
    #[must_use]
    pub fn new() -> Self {
        let (unix_secs, unix_nsecs) = clock_parts();
        Self {
            sys_uptime: 0,
            unix_secs,
            unix_nsecs,
            flow_sequence: 0,
            engine_type: 0,
            engine_id: 0,
            sampling_interval: 0,
            flows: Vec::new(),
        }
    }

    /// The packet's flow type.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        FlowType::V6
    }
}

/// Version 7 export packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketV7 {
    sys_uptime: u64,
    unix_secs: u64,
    unix_nsecs: u64,
    flow_sequence: u64,
    flows: Vec<Flow>,
}

impl PacketV7 {
    /// A new empty packet stamped with the current wall clock.
    #[must_use]
    pub fn new() -> Self {
        let (unix_secs, unix_nsecs) = clock_parts();
        Self {
            sys_uptime: 0,
            unix_secs,
            unix_nsecs,
            flow_sequence: 0,
            flows: Vec::new(),
        }
    }

    /// The packet's flow type.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        FlowType::V7
    }
}

/// Version 8 export packet. Carries aggregated records of a single scheme,
/// fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketV8 {
    sys_uptime: u64,
    unix_secs: u64,
    unix_nsecs: u64,
    flow_sequence: u64,
    /// Flow switching engine type.
    pub engine_type: u8,
    /// Flow switching engine slot.
    pub engine_id: u8,
    /// Version of the aggregation export format.
    pub aggregation_version: u8,
    scheme: AggregationScheme,
    flows: Vec<Flow>,
}

impl PacketV8 {
    /// A new empty packet of the given scheme stamped with the current wall
    /// clock.
    #[must_use]
    pub fn new(scheme: AggregationScheme) -> Self {
        let (unix_secs, unix_nsecs) = clock_parts();
        Self {
            sys_uptime: 0,
            unix_secs,
            unix_nsecs,
            flow_sequence: 0,
            engine_type: 0,
            engine_id: 0,
            aggregation_version: 2,
            scheme,
            flows: Vec::new(),
        }
    }

    /// The aggregation scheme every flow in the packet must use.
    #[must_use]
    pub fn scheme(&self) -> AggregationScheme {
        self.scheme
    }

    /// The packet's flow type.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        FlowType::V8(self.scheme)
    }
}

packet_core!(PacketV1, PacketV5, PacketV6, PacketV7, PacketV8);
packet_sequence!(PacketV5, PacketV6, PacketV7, PacketV8);

/// An export packet of any supported NetFlow version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Version 1 packet.
    V1(PacketV1),
    /// Version 5 packet.
    V5(PacketV5),
    /// Version 6 packet.
    V6(PacketV6),
    /// Version 7 packet.
    V7(PacketV7),
    /// Version 8 packet.
    V8(PacketV8),
}

impl Packet {
    /// The packet's flow type.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        match self {
            Packet::V1(p) => p.flow_type(),
            Packet::V5(p) => p.flow_type(),
            Packet::V6(p) => p.flow_type(),
            Packet::V7(p) => p.flow_type(),
            Packet::V8(p) => p.flow_type(),
        }
    }

    /// The on-wire version number.
    #[must_use]
    pub fn version(&self) -> u16 {
        self.flow_type().version()
    }

    /// Flow records carried by the packet.
    #[must_use]
    pub fn flows(&self) -> &[Flow] {
        match self {
            Packet::V1(p) => p.flows(),
            Packet::V5(p) => p.flows(),
            Packet::V6(p) => p.flows(),
            Packet::V7(p) => p.flows(),
            Packet::V8(p) => p.flows(),
        }
    }

    /// Device uptime in milliseconds when the packet was exported.
    #[must_use]
    pub fn sys_uptime(&self) -> u64 {
        match self {
            Packet::V1(p) => p.sys_uptime(),
            Packet::V5(p) => p.sys_uptime(),
            Packet::V6(p) => p.sys_uptime(),
            Packet::V7(p) => p.sys_uptime(),
            Packet::V8(p) => p.sys_uptime(),
        }
    }

    /// Seconds since the Unix epoch when the packet was exported.
    #[must_use]
    pub fn unix_secs(&self) -> u64 {
        match self {
            Packet::V1(p) => p.unix_secs(),
            Packet::V5(p) => p.unix_secs(),
            Packet::V6(p) => p.unix_secs(),
            Packet::V7(p) => p.unix_secs(),
            Packet::V8(p) => p.unix_secs(),
        }
    }

    /// Export sequence counter carried in the header, absent for version
    /// 1.
    #[must_use]
    pub fn flow_sequence(&self) -> Option<u64> {
        match self {
            Packet::V1(_) => None,
            Packet::V5(p) => Some(p.flow_sequence()),
            Packet::V6(p) => Some(p.flow_sequence()),
            Packet::V7(p) => Some(p.flow_sequence()),
            Packet::V8(p) => Some(p.flow_sequence()),
        }
    }

    /// Append a flow, raising the packet uptime to cover it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] when the flow's version or scheme
    /// differs from the packet's and [`Error::Corrupt`] when the packet
    /// already carries the version's record limit.
    pub fn push_flow(&mut self, flow: Flow) -> Result<(), Error> {
        match self {
            Packet::V1(p) => p.push_flow(flow),
            Packet::V5(p) => p.push_flow(flow),
            Packet::V6(p) => p.push_flow(flow),
            Packet::V7(p) => p.push_flow(flow),
            Packet::V8(p) => p.push_flow(flow),
        }
    }

    /// Convert every carried flow back to a traffic record.
    ///
    /// The exporting device's boot instant is reconstructed from the
    /// header: export wall clock in milliseconds minus uptime at export.
    #[must_use]
    pub fn to_traffic(&self) -> Vec<TrafficRecord> {
        let boot_ms = self
            .unix_secs()
            .saturating_mul(1000)
            .saturating_sub(self.sys_uptime());
        self.flows()
            .iter()
            .map(|flow| flow.to_traffic(boot_ms))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flow::{FlowV1, FlowV5, RouterAs, RouterProtoPort};

    fn v5_flow(last: u64) -> Flow {
        let mut flow = FlowV5::default();
        flow.src_addr = u32::from_be_bytes([10, 0, 0, 1]);
        flow.dst_addr = u32::from_be_bytes([10, 0, 0, 2]);
        flow.proto = 6;
        flow.stats.set_packets(1).unwrap();
        flow.stats.set_octets(64).unwrap();
        flow.stats.set_last(last).unwrap();
        Flow::V5(flow)
    }

    #[test]
    fn push_raises_uptime_to_cover_flows() {
        let mut packet = PacketV5::new();
        packet.push_flow(v5_flow(5_000)).unwrap();
        assert_eq!(packet.sys_uptime(), 5_000);
        packet.push_flow(v5_flow(3_000)).unwrap();
        assert_eq!(packet.sys_uptime(), 5_000);
        packet.push_flow(v5_flow(9_000)).unwrap();
        assert_eq!(packet.sys_uptime(), 9_000);
        assert_eq!(packet.flows().len(), 3);
    }

    #[test]
    fn push_rejects_other_versions() {
        let mut packet = PacketV5::new();
        let err = packet
            .push_flow(Flow::V6(FlowV5::default()))
            .unwrap_err();
        match err {
            Error::TypeMismatch { expected, actual } => {
                assert_eq!(expected, FlowType::V5);
                assert_eq!(actual, FlowType::V6);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(packet.flows().is_empty());
    }

    #[test]
    fn push_rejects_other_schemes() {
        let mut packet = PacketV8::new(AggregationScheme::As);
        packet
            .push_flow(Flow::V8(crate::flow::FlowV8::As(RouterAs::default())))
            .unwrap();
        let err = packet
            .push_flow(Flow::V8(crate::flow::FlowV8::ProtoPort(
                RouterProtoPort::default(),
            )))
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(packet.flows().len(), 1);
    }

    #[test]
    fn push_enforces_record_budget() {
        let mut packet = PacketV1::new();
        for _ in 0..24 {
            packet.push_flow(Flow::V1(FlowV1::default())).unwrap();
        }
        let err = packet.push_flow(Flow::V1(FlowV1::default())).unwrap_err();
        assert!(matches!(
            err,
            Error::Corrupt(CorruptData::FlowCount {
                count: 25,
                limit: 24
            })
        ));
        assert_eq!(packet.flows().len(), 24);
    }

    #[test]
    fn new_stamps_wall_clock() {
        let packet = PacketV5::new();
        assert!(packet.unix_secs() > 0);
        assert_eq!(packet.sys_uptime(), 0);
        assert_eq!(packet.flow_sequence(), 0);
    }

    #[test]
    fn header_setters_enforce_wire_range() {
        let mut packet = PacketV7::new();
        assert!(packet.set_sys_uptime(0xFFFF_FFFF).is_ok());
        assert!(packet.set_sys_uptime(0x1_0000_0000).is_err());
        assert!(packet.set_flow_sequence(7).is_ok());
        assert!(packet.set_flow_sequence(0x1_0000_0000).is_err());
        assert_eq!(packet.flow_sequence(), 7);
    }

    #[test]
    fn traffic_reconstructs_wall_clock() {
        let mut packet = PacketV5::new();
        packet.set_unix_secs(1_000_000).unwrap();
        packet.set_unix_nsecs(0).unwrap();
        packet.push_flow(v5_flow(5_000)).unwrap();
        assert_eq!(packet.sys_uptime(), 5_000);

        let records = Packet::V5(packet).to_traffic();
        assert_eq!(records.len(), 1);
        // Boot at 999_995_000 ms plus the flow's end uptime of 5_000 ms.
        assert_eq!(records[0].time_ms, 1_000_000_000);
        assert_eq!(records[0].packets, 1);
        assert_eq!(records[0].octets, 64);
    }

    #[test]
    fn enum_exposes_header_fields() {
        let packet = Packet::V8(PacketV8::new(AggregationScheme::DstPrefix));
        assert_eq!(packet.version(), 8);
        assert_eq!(
            packet.flow_type(),
            FlowType::V8(AggregationScheme::DstPrefix)
        );
        assert_eq!(packet.flow_sequence(), Some(0));

        let v1 = Packet::V1(PacketV1::new());
        assert_eq!(v1.flow_sequence(), None);
    }
}
