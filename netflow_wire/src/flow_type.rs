//! Flow type descriptors and the version registry.
//!
//! A [`FlowType`] names a NetFlow version and, for version 8, its
//! aggregation scheme. The registry maps on-wire version numbers to flow
//! types so datagram decoding is steered at runtime;
//! [`register_defaults`] installs the standard assignments.

use std::{fmt, sync::RwLock};

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    CorruptData, Error, codec,
    flow::{
        Flow, FlowV1, FlowV5, FlowV7, FlowV8, RouterAs, RouterDstPrefix, RouterPrefix,
        RouterProtoPort, RouterSrcPrefix,
    },
    packet::{Packet, PacketV1, PacketV5, PacketV6, PacketV7, PacketV8},
    traffic::TrafficRecord,
};

/// Version 8 aggregation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationScheme {
    /// AS-to-AS aggregation, code 1.
    As,
    /// Protocol and port aggregation, code 2.
    ProtoPort,
    /// Source-prefix aggregation, code 3.
    SrcPrefix,
    /// Destination-prefix aggregation, code 4.
    DstPrefix,
    /// Source and destination prefix aggregation, code 5.
    Prefix,
}

impl AggregationScheme {
    /// The scheme's on-wire code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            AggregationScheme::As => 1,
            AggregationScheme::ProtoPort => 2,
            AggregationScheme::SrcPrefix => 3,
            AggregationScheme::DstPrefix => 4,
            AggregationScheme::Prefix => 5,
        }
    }

    /// Look up a scheme by its on-wire code.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::AggregationCode`] for codes outside 1 through
    /// 5.
    pub fn from_code(code: u8) -> Result<Self, CorruptData> {
        match code {
            1 => Ok(AggregationScheme::As),
            2 => Ok(AggregationScheme::ProtoPort),
            3 => Ok(AggregationScheme::SrcPrefix),
            4 => Ok(AggregationScheme::DstPrefix),
            5 => Ok(AggregationScheme::Prefix),
            _ => Err(CorruptData::AggregationCode { code }),
        }
    }

    /// An empty aggregated flow of this scheme.
    #[must_use]
    pub fn new_flow(self) -> FlowV8 {
        match self {
            AggregationScheme::As => FlowV8::As(RouterAs::default()),
            AggregationScheme::ProtoPort => FlowV8::ProtoPort(RouterProtoPort::default()),
            AggregationScheme::SrcPrefix => FlowV8::SrcPrefix(RouterSrcPrefix::default()),
            AggregationScheme::DstPrefix => FlowV8::DstPrefix(RouterDstPrefix::default()),
            AggregationScheme::Prefix => FlowV8::Prefix(RouterPrefix::default()),
        }
    }

    /// Aggregate a traffic record into a single-flow aggregate of this
    /// scheme.
    #[must_use]
    pub fn flow_from_traffic(self, record: &TrafficRecord) -> FlowV8 {
        match self {
            AggregationScheme::As => FlowV8::As(RouterAs::from_traffic(record)),
            AggregationScheme::ProtoPort => {
                FlowV8::ProtoPort(RouterProtoPort::from_traffic(record))
            }
            AggregationScheme::SrcPrefix => {
                FlowV8::SrcPrefix(RouterSrcPrefix::from_traffic(record))
            }
            AggregationScheme::DstPrefix => {
                FlowV8::DstPrefix(RouterDstPrefix::from_traffic(record))
            }
            AggregationScheme::Prefix => FlowV8::Prefix(RouterPrefix::from_traffic(record)),
        }
    }
}

impl fmt::Display for AggregationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregationScheme::As => "as",
            AggregationScheme::ProtoPort => "proto-port",
            AggregationScheme::SrcPrefix => "src-prefix",
            AggregationScheme::DstPrefix => "dst-prefix",
            AggregationScheme::Prefix => "prefix",
        };
        f.write_str(name)
    }
}

/// A NetFlow version plus, for version 8, the aggregation scheme emitted
/// and expected by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// NetFlow version 1.
    V1,
    /// NetFlow version 5.
    V5,
    /// NetFlow version 6.
    V6,
    /// NetFlow version 7.
    V7,
    /// NetFlow version 8 with the given aggregation scheme.
    V8(AggregationScheme),
}

impl FlowType {
    /// The on-wire version number.
    #[must_use]
    pub fn version(self) -> u16 {
        match self {
            FlowType::V1 => 1,
            FlowType::V5 => 5,
            FlowType::V6 => 6,
            FlowType::V7 => 7,
            FlowType::V8(_) => 8,
        }
    }

    /// Most flow records a single packet of this type may carry.
    #[must_use]
    pub fn max_flows(self) -> u16 {
        match self {
            FlowType::V1 => 24,
            FlowType::V5 | FlowType::V6 => 30,
            FlowType::V7 | FlowType::V8(_) => 1000,
        }
    }

    /// An empty flow of this type.
    #[must_use]
    pub fn new_flow(self) -> Flow {
        match self {
            FlowType::V1 => Flow::V1(FlowV1::default()),
            FlowType::V5 => Flow::V5(FlowV5::default()),
            FlowType::V6 => Flow::V6(FlowV5::default()),
            FlowType::V7 => Flow::V7(FlowV7::default()),
            FlowType::V8(scheme) => Flow::V8(scheme.new_flow()),
        }
    }

    /// An empty packet of this type, stamped with the current wall clock.
    #[must_use]
    pub fn new_packet(self) -> Packet {
        match self {
            FlowType::V1 => Packet::V1(PacketV1::new()),
            FlowType::V5 => Packet::V5(PacketV5::new()),
            FlowType::V6 => Packet::V6(PacketV6::new()),
            FlowType::V7 => Packet::V7(PacketV7::new()),
            FlowType::V8(scheme) => Packet::V8(PacketV8::new(scheme)),
        }
    }

    /// Build a flow of this type from a traffic record.
    #[must_use]
    pub fn flow_from_traffic(self, record: &TrafficRecord) -> Flow {
        match self {
            FlowType::V1 => Flow::V1(FlowV1::from_traffic(record)),
            FlowType::V5 => Flow::V5(FlowV5::from_traffic(record)),
            FlowType::V6 => Flow::V6(FlowV5::from_traffic(record)),
            FlowType::V7 => Flow::V7(FlowV7::from_traffic(record)),
            FlowType::V8(scheme) => Flow::V8(scheme.flow_from_traffic(record)),
        }
    }

    /// Decode a whole datagram as this type. For version 8 the scheme comes
    /// from the packet header, not from `self`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] if the buffer ends early and
    /// [`Error::Corrupt`] on invalid field values.
    pub fn decode_packet(self, buf: &[u8]) -> Result<Packet, Error> {
        match self {
            FlowType::V1 => codec::v1::decode(buf),
            FlowType::V5 => codec::v5::decode(buf),
            FlowType::V6 => codec::v6::decode(buf),
            FlowType::V7 => codec::v7::decode(buf),
            FlowType::V8(_) => codec::v8::decode(buf),
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowType::V1 => f.write_str("v1"),
            FlowType::V5 => f.write_str("v5"),
            FlowType::V6 => f.write_str("v6"),
            FlowType::V7 => f.write_str("v7"),
            FlowType::V8(scheme) => write!(f, "v8/{scheme}"),
        }
    }
}

static REGISTRY: Lazy<RwLock<FxHashMap<u16, FlowType>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

/// Map an on-wire version number to a flow type, replacing any previous
/// assignment.
///
/// # Panics
///
/// Function will panic if the registry lock is poisoned.
pub fn register(version: u16, flow_type: FlowType) {
    REGISTRY
        .write()
        .expect("lock poisoned")
        .insert(version, flow_type);
}

/// Look up the flow type registered for a version number.
///
/// # Panics
///
/// Function will panic if the registry lock is poisoned.
#[must_use]
pub fn resolve(version: u16) -> Option<FlowType> {
    REGISTRY
        .read()
        .expect("lock poisoned")
        .get(&version)
        .copied()
}

/// Install the standard version assignments. Version 8 defaults to the
/// AS aggregation scheme for packet building; decoding still honors the
/// scheme byte in each packet header. Safe to call repeatedly.
pub fn register_defaults() {
    register(1, FlowType::V1);
    register(5, FlowType::V5);
    register(6, FlowType::V6);
    register(7, FlowType::V7);
    register(8, FlowType::V8(AggregationScheme::As));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scheme_codes_round_trip() {
        for scheme in [
            AggregationScheme::As,
            AggregationScheme::ProtoPort,
            AggregationScheme::SrcPrefix,
            AggregationScheme::DstPrefix,
            AggregationScheme::Prefix,
        ] {
            assert_eq!(AggregationScheme::from_code(scheme.code()).unwrap(), scheme);
        }
        assert!(matches!(
            AggregationScheme::from_code(0),
            Err(CorruptData::AggregationCode { code: 0 })
        ));
        assert!(AggregationScheme::from_code(6).is_err());
    }

    #[test]
    fn versions_and_budgets() {
        assert_eq!(FlowType::V1.version(), 1);
        assert_eq!(FlowType::V1.max_flows(), 24);
        assert_eq!(FlowType::V5.max_flows(), 30);
        assert_eq!(FlowType::V6.max_flows(), 30);
        assert_eq!(FlowType::V7.max_flows(), 1000);
        assert_eq!(FlowType::V8(AggregationScheme::Prefix).version(), 8);
        assert_eq!(FlowType::V8(AggregationScheme::Prefix).max_flows(), 1000);
    }

    #[test]
    fn display_names() {
        assert_eq!(FlowType::V1.to_string(), "v1");
        assert_eq!(FlowType::V6.to_string(), "v6");
        assert_eq!(
            FlowType::V8(AggregationScheme::ProtoPort).to_string(),
            "v8/proto-port"
        );
    }

    #[test]
    fn defaults_resolve() {
        register_defaults();
        assert_eq!(resolve(1), Some(FlowType::V1));
        assert_eq!(resolve(5), Some(FlowType::V5));
        assert_eq!(resolve(6), Some(FlowType::V6));
        assert_eq!(resolve(7), Some(FlowType::V7));
        assert_eq!(resolve(8), Some(FlowType::V8(AggregationScheme::As)));
        assert_eq!(resolve(2), None);
        assert_eq!(resolve(9), None);
    }

    #[test]
    fn register_replaces_previous_assignment() {
        // Version 13 is unassigned, safe to claim without disturbing the
        // defaults other tests rely on.
        register(13, FlowType::V5);
        assert_eq!(resolve(13), Some(FlowType::V5));
        register(13, FlowType::V8(AggregationScheme::Prefix));
        assert_eq!(resolve(13), Some(FlowType::V8(AggregationScheme::Prefix)));
    }

    #[test]
    fn scheme_flow_constructors_match() {
        let record = TrafficRecord {
            packets: 1,
            octets: 64,
            src_as: Some(64512),
            src_port: Some(53),
            proto: Some(17),
            ..TrafficRecord::default()
        };
        for scheme in [
            AggregationScheme::As,
            AggregationScheme::ProtoPort,
            AggregationScheme::SrcPrefix,
            AggregationScheme::DstPrefix,
            AggregationScheme::Prefix,
        ] {
            assert_eq!(scheme.new_flow().scheme(), scheme);
            let flow = scheme.flow_from_traffic(&record);
            assert_eq!(flow.scheme(), scheme);
            assert_eq!(flow.flows_aggregated(), 1);
        }
    }

    #[test]
    fn serde_names() {
        let v5: FlowType = serde_json::from_str("\"v5\"").unwrap();
        assert_eq!(v5, FlowType::V5);
        let v8: FlowType = serde_json::from_str("{\"v8\":\"src_prefix\"}").unwrap();
        assert_eq!(v8, FlowType::V8(AggregationScheme::SrcPrefix));
        assert_eq!(serde_json::to_string(&FlowType::V1).unwrap(), "\"v1\"");
    }
}
