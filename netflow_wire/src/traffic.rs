//! Version-neutral traffic records.

/// A single observed traffic measurement, independent of any NetFlow
/// version.
///
/// Timing is wall-clock: `time_ms` is milliseconds since the Unix epoch at
/// the end of the measurement. Every other field except the counters is
/// optional so records can describe exactly what was observed; converting
/// to a flow fills absent fields with the zero value of the wire field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficRecord {
    /// Milliseconds since the Unix epoch at the end of the measurement.
    pub time_ms: u64,
    /// Packets observed.
    pub packets: u64,
    /// Octets observed.
    pub octets: u64,
    /// Source IP address.
    pub src_addr: Option<u32>,
    /// Destination IP address.
    pub dst_addr: Option<u32>,
    /// IP address of the next hop router.
    pub next_hop: Option<u32>,
    /// Router bypassed by the exporting switch.
    pub router: Option<u32>,
    /// SNMP index of the input interface.
    pub src_if: Option<u16>,
    /// SNMP index of the output interface.
    pub dst_if: Option<u16>,
    /// TCP/UDP source port or equivalent.
    pub src_port: Option<u16>,
    /// TCP/UDP destination port or equivalent.
    pub dst_port: Option<u16>,
    /// Source autonomous system number.
    pub src_as: Option<u16>,
    /// Destination autonomous system number.
    pub dst_as: Option<u16>,
    /// Source address prefix mask as a full dotted mask.
    pub src_mask: Option<u32>,
    /// Destination address prefix mask as a full dotted mask.
    pub dst_mask: Option<u32>,
    /// IP protocol, TCP is 6 and UDP is 17.
    pub proto: Option<u8>,
    /// IP type of service.
    pub tos: Option<u8>,
    /// Cumulative OR of TCP flags.
    pub tcp_flags: Option<u8>,
}
