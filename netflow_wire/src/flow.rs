//! Flow records for NetFlow versions 1 through 8.
//!
//! Each version gets its own record struct mirroring the fields it carries on
//! the wire, collected under the [`Flow`] tagged union. Counters and uptime
//! bounds live in [`FlowStats`]; everything else is identity, the fields two
//! flows must agree on before they can be merged into one.
//!
//! Identity fields are stored at their exact wire width so out-of-range
//! values are unrepresentable. Counters are stored as `u64` because merging
//! accumulates past the 32-bit wire maximum; encoding writes their low 32
//! bits, the same truncation exporting routers apply.

use std::{fmt, net::Ipv4Addr};

use crate::{
    CorruptData, WIRE_U32_MAX, boot_epoch_ms, flow_type::AggregationScheme,
    flow_type::FlowType, mask, traffic::TrafficRecord,
};

pub(crate) fn check_wire_u32(field: &'static str, value: u64) -> Result<(), CorruptData> {
    if value > WIRE_U32_MAX {
        return Err(CorruptData::ValueRange {
            field,
            value,
            limit: WIRE_U32_MAX,
        });
    }
    Ok(())
}

fn mask_or_zero(mask: Option<u32>) -> u32 {
    // A record mask that is not a contiguous prefix is treated as absent.
    mask.filter(|m| mask::check(*m).is_ok()).unwrap_or_default()
}

/// Counters and uptime bounds shared by every flow version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlowStats {
    packets: u64,
    octets: u64,
    first: u64,
    last: u64,
}

impl FlowStats {
    pub(crate) fn from_wire(packets: u32, octets: u32, first: u32, last: u32) -> Self {
        Self {
            packets: u64::from(packets),
            octets: u64::from(octets),
            first: u64::from(first),
            last: u64::from(last),
        }
    }

    fn from_traffic(record: &TrafficRecord) -> Self {
        let uptime = record.time_ms.saturating_sub(boot_epoch_ms());
        Self {
            packets: record.packets,
            octets: record.octets,
            first: uptime,
            last: uptime,
        }
    }

    /// Packets counted in the flow.
    #[must_use]
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Octets counted in the flow.
    #[must_use]
    pub fn octets(&self) -> u64 {
        self.octets
    }

    /// Uptime milliseconds at the start of the flow.
    #[must_use]
    pub fn first(&self) -> u64 {
        self.first
    }

    /// Uptime milliseconds at the end of the flow.
    #[must_use]
    pub fn last(&self) -> u64 {
        self.last
    }

    /// Set the packet counter.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::ValueRange`] past the 32-bit wire maximum.
    pub fn set_packets(&mut self, packets: u64) -> Result<(), CorruptData> {
        check_wire_u32("packets", packets)?;
        self.packets = packets;
        Ok(())
    }

    /// Set the octet counter.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::ValueRange`] past the 32-bit wire maximum.
    pub fn set_octets(&mut self, octets: u64) -> Result<(), CorruptData> {
        check_wire_u32("octets", octets)?;
        self.octets = octets;
        Ok(())
    }

    /// Set the start-of-flow uptime.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::ValueRange`] past the 32-bit wire maximum.
    pub fn set_first(&mut self, first: u64) -> Result<(), CorruptData> {
        check_wire_u32("first", first)?;
        self.first = first;
        Ok(())
    }

    /// Set the end-of-flow uptime.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::ValueRange`] past the 32-bit wire maximum.
    pub fn set_last(&mut self, last: u64) -> Result<(), CorruptData> {
        check_wire_u32("last", last)?;
        self.last = last;
        Ok(())
    }

    fn fold(&mut self, other: &Self) {
        self.packets = self.packets.saturating_add(other.packets);
        self.octets = self.octets.saturating_add(other.octets);
        self.first = self.first.min(other.first);
        self.last = self.last.max(other.last);
    }

    fn fill_traffic(&self, boot_ms: u64, record: &mut TrafficRecord) {
        record.time_ms = boot_ms.saturating_add(self.last);
        record.packets = self.packets;
        record.octets = self.octets;
    }
}

/// Version 1 flow record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlowV1 {
    /// Counters and uptime bounds.
    pub stats: FlowStats,
    /// Source IP address.
    pub src_addr: u32,
    /// Destination IP address.
    pub dst_addr: u32,
    /// IP address of the next hop router.
    pub next_hop: u32,
    /// SNMP index of the input interface.
    pub input: u16,
    /// SNMP index of the output interface.
    pub output: u16,
    /// TCP/UDP source port or equivalent.
    pub src_port: u16,
    /// TCP/UDP destination port or equivalent.
    pub dst_port: u16,
    /// IP protocol, TCP is 6 and UDP is 17.
    pub proto: u8,
    /// IP type of service.
    pub tos: u8,
    /// Cumulative OR of TCP flags.
    pub tcp_flags: u8,
}

impl FlowV1 {
    /// Build a flow from a traffic record. Absent record fields become the
    /// zero value of the wire field.
    #[must_use]
    pub fn from_traffic(record: &TrafficRecord) -> Self {
        Self {
            stats: FlowStats::from_traffic(record),
            src_addr: record.src_addr.unwrap_or_default(),
            dst_addr: record.dst_addr.unwrap_or_default(),
            next_hop: record.next_hop.unwrap_or_default(),
            input: record.src_if.unwrap_or_default(),
            output: record.dst_if.unwrap_or_default(),
            src_port: record.src_port.unwrap_or_default(),
            dst_port: record.dst_port.unwrap_or_default(),
            proto: record.proto.unwrap_or_default(),
            tos: record.tos.unwrap_or_default(),
            tcp_flags: record.tcp_flags.unwrap_or_default(),
        }
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.src_addr == other.src_addr
            && self.dst_addr == other.dst_addr
            && self.next_hop == other.next_hop
            && self.input == other.input
            && self.output == other.output
            && self.src_port == other.src_port
            && self.dst_port == other.dst_port
            && self.proto == other.proto
            && self.tos == other.tos
            && self.tcp_flags == other.tcp_flags
    }

    /// Fold `other` into `self` when every identity field agrees. Returns
    /// true when the merge happened.
    pub fn merge(&mut self, other: &Self) -> bool {
        if !self.same_identity(other) {
            return false;
        }
        self.stats.fold(&other.stats);
        true
    }

    fn fill_traffic(&self, record: &mut TrafficRecord) {
        record.src_addr = (self.src_addr != 0).then_some(self.src_addr);
        record.dst_addr = (self.dst_addr != 0).then_some(self.dst_addr);
        record.next_hop = (self.next_hop != 0).then_some(self.next_hop);
        record.src_if = Some(self.input);
        record.dst_if = Some(self.output);
        record.src_port = Some(self.src_port);
        record.dst_port = Some(self.dst_port);
        record.proto = Some(self.proto);
        record.tcp_flags = Some(self.tcp_flags);
        record.tos = Some(self.tos);
    }

    fn fmt_fields(&self, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = FieldWriter::open(name, f)?;
        if self.src_addr != 0 {
            out.item("src", Ipv4Addr::from(self.src_addr))?;
        }
        if self.dst_addr != 0 {
            out.item("dst", Ipv4Addr::from(self.dst_addr))?;
        }
        if self.next_hop != 0 {
            out.item("next_hop", Ipv4Addr::from(self.next_hop))?;
        }
        out.item("if_input", self.input)?;
        out.item("if_output", self.output)?;
        if self.src_port != 0 {
            out.item("src_port", self.src_port)?;
        }
        if self.dst_port != 0 {
            out.item("dst_port", self.dst_port)?;
        }
        if self.proto != 0 {
            out.item("proto", self.proto)?;
        }
        if self.tcp_flags != 0 {
            out.item_hex("tcp_flags", self.tcp_flags)?;
        }
        if self.tos != 0 {
            out.item_hex("tos", self.tos)?;
        }
        self.stats.fmt_fields(&mut out)?;
        out.close()
    }
}

impl FlowStats {
    fn fmt_fields(&self, out: &mut FieldWriter<'_, '_>) -> fmt::Result {
        if self.packets > 0 {
            out.item("packets", self.packets)?;
        }
        if self.octets > 0 {
            out.item("bytes", self.octets)?;
        }
        if self.first != 0 {
            out.item("first", self.first)?;
        }
        if self.last != 0 {
            out.item("last", self.last)?;
        }
        Ok(())
    }
}

/// Version 5 flow record. Extends the version 1 field set with autonomous
/// system numbers and address prefix masks. Also the record layout of
/// version 6.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlowV5 {
    /// Counters and uptime bounds.
    pub stats: FlowStats,
    /// Source IP address.
    pub src_addr: u32,
    /// Destination IP address.
    pub dst_addr: u32,
    /// IP address of the next hop router.
    pub next_hop: u32,
    /// SNMP index of the input interface.
    pub input: u16,
    /// SNMP index of the output interface.
    pub output: u16,
    /// TCP/UDP source port or equivalent.
    pub src_port: u16,
    /// TCP/UDP destination port or equivalent.
    pub dst_port: u16,
    /// IP protocol, TCP is 6 and UDP is 17.
    pub proto: u8,
    /// IP type of service.
    pub tos: u8,
    /// Cumulative OR of TCP flags.
    pub tcp_flags: u8,
    /// Source autonomous system number.
    pub src_as: u16,
    /// Destination autonomous system number.
    pub dst_as: u16,
    src_mask: u32,
    dst_mask: u32,
}

impl FlowV5 {
    /// Build a flow from a traffic record. Absent record fields become the
    /// zero value of the wire field.
    #[must_use]
    pub fn from_traffic(record: &TrafficRecord) -> Self {
        Self {
            stats: FlowStats::from_traffic(record),
            src_addr: record.src_addr.unwrap_or_default(),
            dst_addr: record.dst_addr.unwrap_or_default(),
            next_hop: record.next_hop.unwrap_or_default(),
            input: record.src_if.unwrap_or_default(),
            output: record.dst_if.unwrap_or_default(),
            src_port: record.src_port.unwrap_or_default(),
            dst_port: record.dst_port.unwrap_or_default(),
            proto: record.proto.unwrap_or_default(),
            tos: record.tos.unwrap_or_default(),
            tcp_flags: record.tcp_flags.unwrap_or_default(),
            src_as: record.src_as.unwrap_or_default(),
            dst_as: record.dst_as.unwrap_or_default(),
            src_mask: mask_or_zero(record.src_mask),
            dst_mask: mask_or_zero(record.dst_mask),
        }
    }

    /// Source address prefix mask as a full dotted mask.
    #[must_use]
    pub fn src_mask(&self) -> u32 {
        self.src_mask
    }

    /// Destination address prefix mask as a full dotted mask.
    #[must_use]
    pub fn dst_mask(&self) -> u32 {
        self.dst_mask
    }

    /// Set the source address prefix mask.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::Mask`] if the mask is not a contiguous prefix.
    pub fn set_src_mask(&mut self, mask: u32) -> Result<(), CorruptData> {
        mask::check(mask)?;
        self.src_mask = mask;
        Ok(())
    }

    /// Set the destination address prefix mask.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::Mask`] if the mask is not a contiguous prefix.
    pub fn set_dst_mask(&mut self, mask: u32) -> Result<(), CorruptData> {
        mask::check(mask)?;
        self.dst_mask = mask;
        Ok(())
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.src_addr == other.src_addr
            && self.dst_addr == other.dst_addr
            && self.next_hop == other.next_hop
            && self.input == other.input
            && self.output == other.output
            && self.src_port == other.src_port
            && self.dst_port == other.dst_port
            && self.proto == other.proto
            && self.tos == other.tos
            && self.tcp_flags == other.tcp_flags
            && self.src_as == other.src_as
            && self.dst_as == other.dst_as
            && self.src_mask == other.src_mask
            && self.dst_mask == other.dst_mask
    }

    /// Fold `other` into `self` when every identity field agrees. Returns
    /// true when the merge happened.
    pub fn merge(&mut self, other: &Self) -> bool {
        if !self.same_identity(other) {
            return false;
        }
        self.stats.fold(&other.stats);
        true
    }

    fn fill_traffic(&self, record: &mut TrafficRecord) {
        record.src_addr = (self.src_addr != 0).then_some(self.src_addr);
        record.dst_addr = (self.dst_addr != 0).then_some(self.dst_addr);
        record.next_hop = (self.next_hop != 0).then_some(self.next_hop);
        record.src_if = Some(self.input);
        record.dst_if = Some(self.output);
        record.src_port = Some(self.src_port);
        record.dst_port = Some(self.dst_port);
        record.proto = Some(self.proto);
        record.tcp_flags = Some(self.tcp_flags);
        record.tos = Some(self.tos);
        record.src_as = (self.src_as != 0).then_some(self.src_as);
        record.dst_as = (self.dst_as != 0).then_some(self.dst_as);
        record.src_mask = (self.src_mask != 0).then_some(self.src_mask);
        record.dst_mask = (self.dst_mask != 0).then_some(self.dst_mask);
    }

    fn fmt_fields(&self, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = FieldWriter::open(name, f)?;
        if self.src_addr != 0 {
            out.item("src", Ipv4Addr::from(self.src_addr))?;
        }
        if self.dst_addr != 0 {
            out.item("dst", Ipv4Addr::from(self.dst_addr))?;
        }
        if self.src_mask != 0 {
            out.item("src_mask", Ipv4Addr::from(self.src_mask))?;
        }
        if self.dst_mask != 0 {
            out.item("dst_mask", Ipv4Addr::from(self.dst_mask))?;
        }
        if self.src_as != 0 {
            out.item("src_as", self.src_as)?;
        }
        if self.dst_as != 0 {
            out.item("dst_as", self.dst_as)?;
        }
        if self.next_hop != 0 {
            out.item("next_hop", Ipv4Addr::from(self.next_hop))?;
        }
        out.item("if_input", self.input)?;
        out.item("if_output", self.output)?;
        if self.src_port != 0 {
            out.item("src_port", self.src_port)?;
        }
        if self.dst_port != 0 {
            out.item("dst_port", self.dst_port)?;
        }
        if self.proto != 0 {
            out.item("proto", self.proto)?;
        }
        if self.tcp_flags != 0 {
            out.item_hex("tcp_flags", self.tcp_flags)?;
        }
        if self.tos != 0 {
            out.item_hex("tos", self.tos)?;
        }
        self.stats.fmt_fields(&mut out)?;
        out.close()
    }
}

/// Version 7 flow record. Extends the version 5 field set with validity
/// flags and the address of the router bypassed by the exporting switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlowV7 {
    /// Counters and uptime bounds.
    pub stats: FlowStats,
    /// Source IP address.
    pub src_addr: u32,
    /// Destination IP address.
    pub dst_addr: u32,
    /// IP address of the next hop router.
    pub next_hop: u32,
    /// SNMP index of the input interface.
    pub input: u16,
    /// SNMP index of the output interface.
    pub output: u16,
    /// TCP/UDP source port or equivalent.
    pub src_port: u16,
    /// TCP/UDP destination port or equivalent.
    pub dst_port: u16,
    /// IP protocol, TCP is 6 and UDP is 17.
    pub proto: u8,
    /// IP type of service.
    pub tos: u8,
    /// Cumulative OR of TCP flags.
    pub tcp_flags: u8,
    /// Source autonomous system number.
    pub src_as: u16,
    /// Destination autonomous system number.
    pub dst_as: u16,
    /// Flags marking invalid flow fields.
    pub flags1: u8,
    /// Flags marking invalid flows.
    pub flags2: u16,
    /// Router bypassed by the exporting switch.
    pub router_sc: u32,
    src_mask: u32,
    dst_mask: u32,
}

impl FlowV7 {
    /// Build a flow from a traffic record. Absent record fields become the
    /// zero value of the wire field.
    #[must_use]
    pub fn from_traffic(record: &TrafficRecord) -> Self {
        Self {
            stats: FlowStats::from_traffic(record),
            src_addr: record.src_addr.unwrap_or_default(),
            dst_addr: record.dst_addr.unwrap_or_default(),
            next_hop: record.next_hop.unwrap_or_default(),
            input: record.src_if.unwrap_or_default(),
            output: record.dst_if.unwrap_or_default(),
            src_port: record.src_port.unwrap_or_default(),
            dst_port: record.dst_port.unwrap_or_default(),
            proto: record.proto.unwrap_or_default(),
            tos: record.tos.unwrap_or_default(),
            tcp_flags: record.tcp_flags.unwrap_or_default(),
            src_as: record.src_as.unwrap_or_default(),
            dst_as: record.dst_as.unwrap_or_default(),
            flags1: 0,
            flags2: 0,
            router_sc: record.router.unwrap_or_default(),
            src_mask: mask_or_zero(record.src_mask),
            dst_mask: mask_or_zero(record.dst_mask),
        }
    }

    /// Source address prefix mask as a full dotted mask.
    #[must_use]
    pub fn src_mask(&self) -> u32 {
        self.src_mask
    }

    /// Destination address prefix mask as a full dotted mask.
    #[must_use]
    pub fn dst_mask(&self) -> u32 {
        self.dst_mask
    }

    /// Set the source address prefix mask.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::Mask`] if the mask is not a contiguous prefix.
    pub fn set_src_mask(&mut self, mask: u32) -> Result<(), CorruptData> {
        mask::check(mask)?;
        self.src_mask = mask;
        Ok(())
    }

    /// Set the destination address prefix mask.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::Mask`] if the mask is not a contiguous prefix.
    pub fn set_dst_mask(&mut self, mask: u32) -> Result<(), CorruptData> {
        mask::check(mask)?;
        self.dst_mask = mask;
        Ok(())
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.src_addr == other.src_addr
            && self.dst_addr == other.dst_addr
            && self.next_hop == other.next_hop
            && self.input == other.input
            && self.output == other.output
            && self.src_port == other.src_port
            && self.dst_port == other.dst_port
            && self.proto == other.proto
            && self.tos == other.tos
            && self.tcp_flags == other.tcp_flags
            && self.src_as == other.src_as
            && self.dst_as == other.dst_as
            && self.src_mask == other.src_mask
            && self.dst_mask == other.dst_mask
            && self.flags1 == other.flags1
            && self.flags2 == other.flags2
            && self.router_sc == other.router_sc
    }

    /// Fold `other` into `self` when every identity field agrees. Returns
    /// true when the merge happened.
    pub fn merge(&mut self, other: &Self) -> bool {
        if !self.same_identity(other) {
            return false;
        }
        self.stats.fold(&other.stats);
        true
    }

    fn fill_traffic(&self, record: &mut TrafficRecord) {
        record.src_addr = (self.src_addr != 0).then_some(self.src_addr);
        record.dst_addr = (self.dst_addr != 0).then_some(self.dst_addr);
        record.next_hop = (self.next_hop != 0).then_some(self.next_hop);
        record.src_if = Some(self.input);
        record.dst_if = Some(self.output);
        record.src_port = Some(self.src_port);
        record.dst_port = Some(self.dst_port);
        record.proto = Some(self.proto);
        record.tcp_flags = Some(self.tcp_flags);
        record.tos = Some(self.tos);
        record.src_as = (self.src_as != 0).then_some(self.src_as);
        record.dst_as = (self.dst_as != 0).then_some(self.dst_as);
        record.src_mask = (self.src_mask != 0).then_some(self.src_mask);
        record.dst_mask = (self.dst_mask != 0).then_some(self.dst_mask);
        record.router = (self.router_sc != 0).then_some(self.router_sc);
    }

    fn fmt_fields(&self, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = FieldWriter::open(name, f)?;
        if self.router_sc != 0 {
            out.item("router_sc", Ipv4Addr::from(self.router_sc))?;
        }
        if self.src_addr != 0 {
            out.item("src", Ipv4Addr::from(self.src_addr))?;
        }
        if self.dst_addr != 0 {
            out.item("dst", Ipv4Addr::from(self.dst_addr))?;
        }
        if self.src_mask != 0 {
            out.item("src_mask", Ipv4Addr::from(self.src_mask))?;
        }
        if self.dst_mask != 0 {
            out.item("dst_mask", Ipv4Addr::from(self.dst_mask))?;
        }
        if self.src_as != 0 {
            out.item("src_as", self.src_as)?;
        }
        if self.dst_as != 0 {
            out.item("dst_as", self.dst_as)?;
        }
        if self.next_hop != 0 {
            out.item("next_hop", Ipv4Addr::from(self.next_hop))?;
        }
        out.item("if_input", self.input)?;
        out.item("if_output", self.output)?;
        if self.src_port != 0 {
            out.item("src_port", self.src_port)?;
        }
        if self.dst_port != 0 {
            out.item("dst_port", self.dst_port)?;
        }
        if self.proto != 0 {
            out.item("proto", self.proto)?;
        }
        if self.tcp_flags != 0 {
            out.item_hex("tcp_flags", self.tcp_flags)?;
        }
        if self.tos != 0 {
            out.item_hex("tos", self.tos)?;
        }
        self.stats.fmt_fields(&mut out)?;
        if self.flags1 != 0 {
            out.item("flags1", self.flags1)?;
        }
        if self.flags2 != 0 {
            out.item("flags2", self.flags2)?;
        }
        out.close()
    }
}

/// AS-to-AS aggregation record, version 8 scheme 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RouterAs {
    /// Counters and uptime bounds.
    pub stats: FlowStats,
    /// Source autonomous system number.
    pub src_as: u16,
    /// Destination autonomous system number.
    pub dst_as: u16,
    /// SNMP index of the input interface.
    pub input: u16,
    /// SNMP index of the output interface.
    pub output: u16,
    flows_aggregated: u64,
}

impl RouterAs {
    /// Build a flow from a traffic record, counting one aggregated flow.
    #[must_use]
    pub fn from_traffic(record: &TrafficRecord) -> Self {
        Self {
            stats: FlowStats::from_traffic(record),
            src_as: record.src_as.unwrap_or_default(),
            dst_as: record.dst_as.unwrap_or_default(),
            input: record.src_if.unwrap_or_default(),
            output: record.dst_if.unwrap_or_default(),
            flows_aggregated: 1,
        }
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.src_as == other.src_as
            && self.dst_as == other.dst_as
            && self.input == other.input
            && self.output == other.output
    }

    fn fill_traffic(&self, record: &mut TrafficRecord) {
        record.src_as = (self.src_as != 0).then_some(self.src_as);
        record.dst_as = (self.dst_as != 0).then_some(self.dst_as);
        record.src_if = Some(self.input);
        record.dst_if = Some(self.output);
    }

    fn fmt_fields(&self, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = FieldWriter::open(name, f)?;
        if self.src_as != 0 {
            out.item("src_as", self.src_as)?;
        }
        if self.dst_as != 0 {
            out.item("dst_as", self.dst_as)?;
        }
        out.item("if_input", self.input)?;
        out.item("if_output", self.output)?;
        fmt_v8_stats(&self.stats, self.flows_aggregated, &mut out)?;
        out.close()
    }
}

/// Protocol and port aggregation record, version 8 scheme 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RouterProtoPort {
    /// Counters and uptime bounds.
    pub stats: FlowStats,
    /// IP protocol, TCP is 6 and UDP is 17.
    pub proto: u8,
    /// TCP/UDP source port or equivalent.
    pub src_port: u16,
    /// TCP/UDP destination port or equivalent.
    pub dst_port: u16,
    flows_aggregated: u64,
}

impl RouterProtoPort {
    /// Build a flow from a traffic record, counting one aggregated flow.
    #[must_use]
    pub fn from_traffic(record: &TrafficRecord) -> Self {
        Self {
            stats: FlowStats::from_traffic(record),
            proto: record.proto.unwrap_or_default(),
            src_port: record.src_port.unwrap_or_default(),
            dst_port: record.dst_port.unwrap_or_default(),
            flows_aggregated: 1,
        }
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.proto == other.proto
            && self.src_port == other.src_port
            && self.dst_port == other.dst_port
    }

    fn fill_traffic(&self, record: &mut TrafficRecord) {
        record.proto = Some(self.proto);
        record.src_port = Some(self.src_port);
        record.dst_port = Some(self.dst_port);
    }

    fn fmt_fields(&self, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = FieldWriter::open(name, f)?;
        if self.proto != 0 {
            out.item("proto", self.proto)?;
        }
        if self.src_port != 0 {
            out.item("src_port", self.src_port)?;
        }
        if self.dst_port != 0 {
            out.item("dst_port", self.dst_port)?;
        }
        fmt_v8_stats(&self.stats, self.flows_aggregated, &mut out)?;
        out.close()
    }
}

/// Source-prefix aggregation record, version 8 scheme 3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RouterSrcPrefix {
    /// Counters and uptime bounds.
    pub stats: FlowStats,
    /// Source address prefix.
    pub src_prefix: u32,
    /// Source autonomous system number.
    pub src_as: u16,
    /// SNMP index of the input interface.
    pub input: u16,
    src_mask: u32,
    flows_aggregated: u64,
}

impl RouterSrcPrefix {
    /// Build a flow from a traffic record, counting one aggregated flow.
    #[must_use]
    pub fn from_traffic(record: &TrafficRecord) -> Self {
        Self {
            stats: FlowStats::from_traffic(record),
            src_prefix: record.src_addr.unwrap_or_default(),
            src_as: record.src_as.unwrap_or_default(),
            input: record.src_if.unwrap_or_default(),
            src_mask: mask_or_zero(record.src_mask),
            flows_aggregated: 1,
        }
    }

    /// Source address prefix mask as a full dotted mask.
    #[must_use]
    pub fn src_mask(&self) -> u32 {
        self.src_mask
    }

    /// Set the source address prefix mask.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::Mask`] if the mask is not a contiguous prefix.
    pub fn set_src_mask(&mut self, mask: u32) -> Result<(), CorruptData> {
        mask::check(mask)?;
        self.src_mask = mask;
        Ok(())
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.src_prefix == other.src_prefix
            && self.src_mask == other.src_mask
            && self.src_as == other.src_as
            && self.input == other.input
    }

    fn fill_traffic(&self, record: &mut TrafficRecord) {
        record.src_addr = (self.src_prefix != 0).then_some(self.src_prefix);
        record.src_mask = (self.src_mask != 0).then_some(self.src_mask);
        record.src_as = (self.src_as != 0).then_some(self.src_as);
        record.src_if = Some(self.input);
    }

    fn fmt_fields(&self, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = FieldWriter::open(name, f)?;
        if self.src_prefix != 0 {
            out.item("src_prefix", Ipv4Addr::from(self.src_prefix))?;
        }
        if self.src_mask != 0 {
            out.item("src_mask", Ipv4Addr::from(self.src_mask))?;
        }
        if self.src_as != 0 {
            out.item("src_as", self.src_as)?;
        }
        out.item("if_input", self.input)?;
        fmt_v8_stats(&self.stats, self.flows_aggregated, &mut out)?;
        out.close()
    }
}

/// Destination-prefix aggregation record, version 8 scheme 4.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RouterDstPrefix {
    /// Counters and uptime bounds.
    pub stats: FlowStats,
    /// Destination address prefix.
    pub dst_prefix: u32,
    /// Destination autonomous system number.
    pub dst_as: u16,
    /// SNMP index of the output interface.
    pub output: u16,
    dst_mask: u32,
    flows_aggregated: u64,
}

impl RouterDstPrefix {
    /// Build a flow from a traffic record, counting one aggregated flow.
    #[must_use]
    pub fn from_traffic(record: &TrafficRecord) -> Self {
        Self {
            stats: FlowStats::from_traffic(record),
            dst_prefix: record.dst_addr.unwrap_or_default(),
            dst_as: record.dst_as.unwrap_or_default(),
            output: record.dst_if.unwrap_or_default(),
            dst_mask: mask_or_zero(record.dst_mask),
            flows_aggregated: 1,
        }
    }

    /// Destination address prefix mask as a full dotted mask.
    #[must_use]
    pub fn dst_mask(&self) -> u32 {
        self.dst_mask
    }

    /// Set the destination address prefix mask.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::Mask`] if the mask is not a contiguous prefix.
    pub fn set_dst_mask(&mut self, mask: u32) -> Result<(), CorruptData> {
        mask::check(mask)?;
        self.dst_mask = mask;
        Ok(())
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.dst_prefix == other.dst_prefix
            && self.dst_mask == other.dst_mask
            && self.dst_as == other.dst_as
            && self.output == other.output
    }

    fn fill_traffic(&self, record: &mut TrafficRecord) {
        record.dst_addr = (self.dst_prefix != 0).then_some(self.dst_prefix);
        record.dst_mask = (self.dst_mask != 0).then_some(self.dst_mask);
        record.dst_as = (self.dst_as != 0).then_some(self.dst_as);
        record.dst_if = Some(self.output);
    }

    fn fmt_fields(&self, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = FieldWriter::open(name, f)?;
        if self.dst_prefix != 0 {
            out.item("dst_prefix", Ipv4Addr::from(self.dst_prefix))?;
        }
        if self.dst_mask != 0 {
            out.item("dst_mask", Ipv4Addr::from(self.dst_mask))?;
        }
        if self.dst_as != 0 {
            out.item("dst_as", self.dst_as)?;
        }
        out.item("if_output", self.output)?;
        fmt_v8_stats(&self.stats, self.flows_aggregated, &mut out)?;
        out.close()
    }
}

/// Source and destination prefix aggregation record, version 8 scheme 5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RouterPrefix {
    /// Counters and uptime bounds.
    pub stats: FlowStats,
    /// Source address prefix.
    pub src_prefix: u32,
    /// Destination address prefix.
    pub dst_prefix: u32,
    /// Source autonomous system number.
    pub src_as: u16,
    /// Destination autonomous system number.
    pub dst_as: u16,
    /// SNMP index of the input interface.
    pub input: u16,
    /// SNMP index of the output interface.
    pub output: u16,
    src_mask: u32,
    dst_mask: u32,
    flows_aggregated: u64,
}

impl RouterPrefix {
    /// Build a flow from a traffic record, counting one aggregated flow.
    #[must_use]
    pub fn from_traffic(record: &TrafficRecord) -> Self {
        Self {
            stats: FlowStats::from_traffic(record),
            src_prefix: record.src_addr.unwrap_or_default(),
            dst_prefix: record.dst_addr.unwrap_or_default(),
            src_as: record.src_as.unwrap_or_default(),
            dst_as: record.dst_as.unwrap_or_default(),
            input: record.src_if.unwrap_or_default(),
            output: record.dst_if.unwrap_or_default(),
            src_mask: mask_or_zero(record.src_mask),
            dst_mask: mask_or_zero(record.dst_mask),
            flows_aggregated: 1,
        }
    }

    /// Source address prefix mask as a full dotted mask.
    #[must_use]
    pub fn src_mask(&self) -> u32 {
        self.src_mask
    }

    /// Destination address prefix mask as a full dotted mask.
    #[must_use]
    pub fn dst_mask(&self) -> u32 {
        self.dst_mask
    }

    /// Set the source address prefix mask.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::Mask`] if the mask is not a contiguous prefix.
    pub fn set_src_mask(&mut self, mask: u32) -> Result<(), CorruptData> {
        mask::check(mask)?;
        self.src_mask = mask;
        Ok(())
    }

    /// Set the destination address prefix mask.
    ///
    /// # Errors
    ///
    /// Returns [`CorruptData::Mask`] if the mask is not a contiguous prefix.
    pub fn set_dst_mask(&mut self, mask: u32) -> Result<(), CorruptData> {
        mask::check(mask)?;
        self.dst_mask = mask;
        Ok(())
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.src_prefix == other.src_prefix
            && self.dst_prefix == other.dst_prefix
            && self.src_mask == other.src_mask
            && self.dst_mask == other.dst_mask
            && self.src_as == other.src_as
            && self.dst_as == other.dst_as
            && self.input == other.input
            && self.output == other.output
    }

    fn fill_traffic(&self, record: &mut TrafficRecord) {
        record.src_addr = (self.src_prefix != 0).then_some(self.src_prefix);
        record.dst_addr = (self.dst_prefix != 0).then_some(self.dst_prefix);
        record.src_mask = (self.src_mask != 0).then_some(self.src_mask);
        record.dst_mask = (self.dst_mask != 0).then_some(self.dst_mask);
        record.src_as = (self.src_as != 0).then_some(self.src_as);
        record.dst_as = (self.dst_as != 0).then_some(self.dst_as);
        record.src_if = Some(self.input);
        record.dst_if = Some(self.output);
    }

    fn fmt_fields(&self, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = FieldWriter::open(name, f)?;
        if self.src_prefix != 0 {
            out.item("src_prefix", Ipv4Addr::from(self.src_prefix))?;
        }
        if self.src_mask != 0 {
            out.item("src_mask", Ipv4Addr::from(self.src_mask))?;
        }
        if self.dst_prefix != 0 {
            out.item("dst_prefix", Ipv4Addr::from(self.dst_prefix))?;
        }
        if self.dst_mask != 0 {
            out.item("dst_mask", Ipv4Addr::from(self.dst_mask))?;
        }
        if self.src_as != 0 {
            out.item("src_as", self.src_as)?;
        }
        if self.dst_as != 0 {
            out.item("dst_as", self.dst_as)?;
        }
        out.item("if_input", self.input)?;
        out.item("if_output", self.output)?;
        fmt_v8_stats(&self.stats, self.flows_aggregated, &mut out)?;
        out.close()
    }
}

fn fmt_v8_stats(
    stats: &FlowStats,
    flows_aggregated: u64,
    out: &mut FieldWriter<'_, '_>,
) -> fmt::Result {
    if stats.packets > 0 {
        out.item("packets", stats.packets)?;
    }
    if stats.octets > 0 {
        out.item("bytes", stats.octets)?;
    }
    out.item("flows", flows_aggregated)?;
    if stats.first != 0 {
        out.item("first", stats.first)?;
    }
    if stats.last != 0 {
        out.item("last", stats.last)?;
    }
    Ok(())
}

macro_rules! v8_flows_aggregated {
    ($($ty:ty),+) => {
        $(impl $ty {
            /// Number of flows folded into this aggregate.
            #[must_use]
            pub fn flows_aggregated(&self) -> u64 {
                self.flows_aggregated
            }

            /// Set the aggregated flow count.
            ///
            /// # Errors
            ///
            /// Returns [`CorruptData::ValueRange`] past the 32-bit wire
            /// maximum.
            pub fn set_flows_aggregated(&mut self, flows: u64) -> Result<(), CorruptData> {
                check_wire_u32("flows_aggregated", flows)?;
                self.flows_aggregated = flows;
                Ok(())
            }

            /// Fold `other` into `self` when every identity field agrees,
            /// counting the absorbed flow. Returns true when the merge
            /// happened.
            pub fn merge(&mut self, other: &Self) -> bool {
                if !self.same_identity(other) {
                    return false;
                }
                self.stats.fold(&other.stats);
                self.flows_aggregated = self.flows_aggregated.saturating_add(1);
                true
            }
        })+
    };
}

v8_flows_aggregated!(
    RouterAs,
    RouterProtoPort,
    RouterSrcPrefix,
    RouterDstPrefix,
    RouterPrefix
);

/// Version 8 aggregated flow record, one variant per aggregation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowV8 {
    /// AS-to-AS aggregation.
    As(RouterAs),
    /// Protocol and port aggregation.
    ProtoPort(RouterProtoPort),
    /// Source-prefix aggregation.
    SrcPrefix(RouterSrcPrefix),
    /// Destination-prefix aggregation.
    DstPrefix(RouterDstPrefix),
    /// Source and destination prefix aggregation.
    Prefix(RouterPrefix),
}

impl FlowV8 {
    /// The aggregation scheme of this record.
    #[must_use]
    pub fn scheme(&self) -> AggregationScheme {
        match self {
            FlowV8::As(_) => AggregationScheme::As,
            FlowV8::ProtoPort(_) => AggregationScheme::ProtoPort,
            FlowV8::SrcPrefix(_) => AggregationScheme::SrcPrefix,
            FlowV8::DstPrefix(_) => AggregationScheme::DstPrefix,
            FlowV8::Prefix(_) => AggregationScheme::Prefix,
        }
    }

    /// Counters and uptime bounds.
    #[must_use]
    pub fn stats(&self) -> &FlowStats {
        match self {
            FlowV8::As(x) => &x.stats,
            FlowV8::ProtoPort(x) => &x.stats,
            FlowV8::SrcPrefix(x) => &x.stats,
            FlowV8::DstPrefix(x) => &x.stats,
            FlowV8::Prefix(x) => &x.stats,
        }
    }

    /// Mutable counters and uptime bounds.
    pub fn stats_mut(&mut self) -> &mut FlowStats {
        match self {
            FlowV8::As(x) => &mut x.stats,
            FlowV8::ProtoPort(x) => &mut x.stats,
            FlowV8::SrcPrefix(x) => &mut x.stats,
            FlowV8::DstPrefix(x) => &mut x.stats,
            FlowV8::Prefix(x) => &mut x.stats,
        }
    }

    /// Number of flows folded into this aggregate.
    #[must_use]
    pub fn flows_aggregated(&self) -> u64 {
        match self {
            FlowV8::As(x) => x.flows_aggregated,
            FlowV8::ProtoPort(x) => x.flows_aggregated,
            FlowV8::SrcPrefix(x) => x.flows_aggregated,
            FlowV8::DstPrefix(x) => x.flows_aggregated,
            FlowV8::Prefix(x) => x.flows_aggregated,
        }
    }

    /// Fold `other` into `self` when both use the same scheme and every
    /// identity field agrees. Returns true when the merge happened.
    pub fn merge(&mut self, other: &Self) -> bool {
        match (self, other) {
            (FlowV8::As(a), FlowV8::As(b)) => a.merge(b),
            (FlowV8::ProtoPort(a), FlowV8::ProtoPort(b)) => a.merge(b),
            (FlowV8::SrcPrefix(a), FlowV8::SrcPrefix(b)) => a.merge(b),
            (FlowV8::DstPrefix(a), FlowV8::DstPrefix(b)) => a.merge(b),
            (FlowV8::Prefix(a), FlowV8::Prefix(b)) => a.merge(b),
            _ => false,
        }
    }

    fn fill_traffic(&self, record: &mut TrafficRecord) {
        match self {
            FlowV8::As(x) => x.fill_traffic(record),
            FlowV8::ProtoPort(x) => x.fill_traffic(record),
            FlowV8::SrcPrefix(x) => x.fill_traffic(record),
            FlowV8::DstPrefix(x) => x.fill_traffic(record),
            FlowV8::Prefix(x) => x.fill_traffic(record),
        }
    }
}

/// A flow record of any supported NetFlow version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    /// Version 1 record.
    V1(FlowV1),
    /// Version 5 record.
    V5(FlowV5),
    /// Version 6 record, the version 5 layout under its own version tag.
    V6(FlowV5),
    /// Version 7 record.
    V7(FlowV7),
    /// Version 8 aggregated record.
    V8(FlowV8),
}

impl Flow {
    /// The flow type describing this record's version and, for version 8,
    /// aggregation scheme.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        match self {
            Flow::V1(_) => FlowType::V1,
            Flow::V5(_) => FlowType::V5,
            Flow::V6(_) => FlowType::V6,
            Flow::V7(_) => FlowType::V7,
            Flow::V8(x) => FlowType::V8(x.scheme()),
        }
    }

    /// Counters and uptime bounds.
    #[must_use]
    pub fn stats(&self) -> &FlowStats {
        match self {
            Flow::V1(x) => &x.stats,
            Flow::V5(x) | Flow::V6(x) => &x.stats,
            Flow::V7(x) => &x.stats,
            Flow::V8(x) => x.stats(),
        }
    }

    /// Mutable counters and uptime bounds.
    pub fn stats_mut(&mut self) -> &mut FlowStats {
        match self {
            Flow::V1(x) => &mut x.stats,
            Flow::V5(x) | Flow::V6(x) => &mut x.stats,
            Flow::V7(x) => &mut x.stats,
            Flow::V8(x) => x.stats_mut(),
        }
    }

    /// Uptime milliseconds at the start of the flow.
    #[must_use]
    pub fn first(&self) -> u64 {
        self.stats().first
    }

    /// Uptime milliseconds at the end of the flow.
    #[must_use]
    pub fn last(&self) -> u64 {
        self.stats().last
    }

    /// Fold `other` into `self` when both describe the same traffic.
    ///
    /// Merging requires the same variant and agreement on every identity
    /// field. Counters accumulate, `first` keeps the earlier bound and
    /// `last` the later one. Version 8 records additionally count the
    /// absorbed flow in their aggregate total. Returns true when the merge
    /// happened.
    pub fn merge(&mut self, other: &Flow) -> bool {
        match (self, other) {
            (Flow::V1(a), Flow::V1(b)) => a.merge(b),
            (Flow::V5(a), Flow::V5(b)) | (Flow::V6(a), Flow::V6(b)) => a.merge(b),
            (Flow::V7(a), Flow::V7(b)) => a.merge(b),
            (Flow::V8(a), Flow::V8(b)) => a.merge(b),
            _ => false,
        }
    }

    /// Convert back to a traffic record.
    ///
    /// `boot_ms` is the wall-clock millisecond instant the exporting device
    /// booted; the record's time is that instant plus the end-of-flow
    /// uptime. Fields the variant does not carry stay absent, zero-valued
    /// addresses and masks too.
    #[must_use]
    pub fn to_traffic(&self, boot_ms: u64) -> TrafficRecord {
        let mut record = TrafficRecord::default();
        self.stats().fill_traffic(boot_ms, &mut record);
        match self {
            Flow::V1(x) => x.fill_traffic(&mut record),
            Flow::V5(x) | Flow::V6(x) => x.fill_traffic(&mut record),
            Flow::V7(x) => x.fill_traffic(&mut record),
            Flow::V8(x) => x.fill_traffic(&mut record),
        }
        record
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::V1(x) => x.fmt_fields("v1", f),
            Flow::V5(x) => x.fmt_fields("v5", f),
            Flow::V6(x) => x.fmt_fields("v6", f),
            Flow::V7(x) => x.fmt_fields("v7", f),
            Flow::V8(x) => x.fmt(f),
        }
    }
}

impl fmt::Display for FlowV8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowV8::As(x) => x.fmt_fields("v8/as", f),
            FlowV8::ProtoPort(x) => x.fmt_fields("v8/proto-port", f),
            FlowV8::SrcPrefix(x) => x.fmt_fields("v8/src-prefix", f),
            FlowV8::DstPrefix(x) => x.fmt_fields("v8/dst-prefix", f),
            FlowV8::Prefix(x) => x.fmt_fields("v8/prefix", f),
        }
    }
}

struct FieldWriter<'a, 'b> {
    f: &'a mut fmt::Formatter<'b>,
    first: bool,
}

impl<'a, 'b> FieldWriter<'a, 'b> {
    fn open(name: &str, f: &'a mut fmt::Formatter<'b>) -> Result<Self, fmt::Error> {
        write!(f, "{name}{{")?;
        Ok(Self { f, first: true })
    }

    fn item(&mut self, label: &str, value: impl fmt::Display) -> fmt::Result {
        if !self.first {
            self.f.write_str(",")?;
        }
        self.first = false;
        write!(self.f, "{label}={value}")
    }

    fn item_hex(&mut self, label: &str, value: u8) -> fmt::Result {
        if !self.first {
            self.f.write_str(",")?;
        }
        self.first = false;
        write!(self.f, "{label}={value:02X}")
    }

    fn close(self) -> fmt::Result {
        self.f.write_str("}")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn sample_v5() -> FlowV5 {
        let mut flow = FlowV5 {
            src_addr: u32::from_be_bytes([10, 0, 0, 1]),
            dst_addr: u32::from_be_bytes([10, 0, 0, 2]),
            src_port: 80,
            dst_port: 443,
            proto: 6,
            ..FlowV5::default()
        };
        flow.stats.set_packets(10).unwrap();
        flow.stats.set_octets(1500).unwrap();
        flow.stats.set_first(100).unwrap();
        flow.stats.set_last(200).unwrap();
        flow
    }

    #[test]
    fn merge_accumulates_counters() {
        let mut a = sample_v5();
        let mut b = sample_v5();
        b.stats.set_packets(5).unwrap();
        b.stats.set_octets(700).unwrap();
        b.stats.set_first(50).unwrap();
        b.stats.set_last(400).unwrap();

        assert!(a.merge(&b));
        assert_eq!(a.stats.packets(), 15);
        assert_eq!(a.stats.octets(), 2200);
        assert_eq!(a.stats.first(), 50);
        assert_eq!(a.stats.last(), 400);
    }

    #[test]
    fn merge_rejects_each_identity_difference() {
        let base = sample_v5();
        let mut reject = |other: FlowV5| {
            let mut target = base;
            assert!(!target.merge(&other));
            assert_eq!(target, base);
        };

        let mut other = base;
        other.src_addr += 1;
        reject(other);

        let mut other = base;
        other.dst_port = 8443;
        reject(other);

        let mut other = base;
        other.proto = 17;
        reject(other);

        let mut other = base;
        other.tos = 0x10;
        reject(other);

        let mut other = base;
        other.src_as = 65000;
        reject(other);

        let mut other = base;
        other.set_src_mask(0xFFFF_FF00).unwrap();
        reject(other);
    }

    #[test]
    fn merge_rejects_cross_variant() {
        let v5 = sample_v5();
        let mut as_v5 = Flow::V5(v5);
        let as_v6 = Flow::V6(v5);
        assert!(!as_v5.merge(&as_v6));

        let mut v1 = Flow::V1(FlowV1::default());
        assert!(!v1.merge(&Flow::V5(FlowV5::default())));
    }

    #[test]
    fn merge_effect_is_order_independent() {
        let mut left = sample_v5();
        let mut right = sample_v5();
        let a = {
            let mut f = sample_v5();
            f.stats.set_packets(3).unwrap();
            f.stats.set_first(10).unwrap();
            f.stats.set_last(700).unwrap();
            f
        };

        assert!(left.merge(&a));
        assert!(right.merge(&a));
        // Absorbing the same flow from either side yields the same totals.
        assert_eq!(left.stats, right.stats);
    }

    #[test]
    fn v8_merge_counts_absorbed_flows() {
        let mut a = RouterAs {
            src_as: 64512,
            dst_as: 64513,
            input: 1,
            output: 2,
            ..RouterAs::default()
        };
        a.set_flows_aggregated(1).unwrap();
        let b = a;

        assert!(a.merge(&b));
        assert_eq!(a.flows_aggregated(), 2);

        let mut c = b;
        c.src_as = 64514;
        assert!(!a.merge(&c));
        assert_eq!(a.flows_aggregated(), 2);
    }

    #[test]
    fn stats_setters_enforce_wire_range() {
        let mut stats = FlowStats::default();
        assert!(stats.set_packets(0xFFFF_FFFF).is_ok());
        let err = stats.set_packets(0x1_0000_0000).unwrap_err();
        assert!(matches!(err, CorruptData::ValueRange { field: "packets", .. }));
        // The failed set leaves the previous value behind.
        assert_eq!(stats.packets(), 0xFFFF_FFFF);
    }

    #[test]
    fn mask_setters_reject_noncontiguous() {
        let mut flow = FlowV5::default();
        assert!(flow.set_src_mask(0xFFFF_FF00).is_ok());
        assert!(flow.set_src_mask(0).is_ok());
        assert!(matches!(
            flow.set_src_mask(0xFF00_FF00),
            Err(CorruptData::Mask { .. })
        ));
    }

    #[test]
    fn traffic_round_trip_v5() {
        let record = TrafficRecord {
            time_ms: boot_epoch_ms() + 5_000,
            packets: 10,
            octets: 1500,
            src_addr: Some(u32::from_be_bytes([10, 0, 0, 1])),
            dst_addr: Some(u32::from_be_bytes([10, 0, 0, 2])),
            src_port: Some(80),
            dst_port: Some(443),
            proto: Some(6),
            src_mask: Some(0xFFFF_FF00),
            ..TrafficRecord::default()
        };
        let flow = FlowV5::from_traffic(&record);
        assert_eq!(flow.stats.first(), 5_000);
        assert_eq!(flow.stats.last(), 5_000);
        assert_eq!(flow.src_mask(), 0xFFFF_FF00);

        let out = Flow::V5(flow).to_traffic(boot_epoch_ms());
        assert_eq!(out.time_ms, boot_epoch_ms() + 5_000);
        assert_eq!(out.packets, 10);
        assert_eq!(out.octets, 1500);
        assert_eq!(out.src_addr, record.src_addr);
        assert_eq!(out.dst_addr, record.dst_addr);
        assert_eq!(out.src_mask, record.src_mask);
        // Absent next hop stays absent, zero interfaces are reported.
        assert_eq!(out.next_hop, None);
        assert_eq!(out.src_if, Some(0));
    }

    #[test]
    fn traffic_ingest_drops_bad_mask() {
        let record = TrafficRecord {
            time_ms: boot_epoch_ms(),
            packets: 1,
            octets: 64,
            src_mask: Some(0x00FF_0000),
            ..TrafficRecord::default()
        };
        let flow = FlowV5::from_traffic(&record);
        assert_eq!(flow.src_mask(), 0);
    }

    #[test]
    fn display_skips_zero_fields() {
        let flow = Flow::V5(sample_v5());
        let rendered = flow.to_string();
        assert!(rendered.starts_with("v5{"));
        assert!(rendered.contains("src=10.0.0.1"));
        assert!(rendered.contains("dst=10.0.0.2"));
        assert!(rendered.contains("src_port=80"));
        assert!(rendered.contains("packets=10"));
        assert!(rendered.contains("if_input=0"));
        assert!(!rendered.contains("next_hop"));
        assert!(!rendered.contains("src_mask"));
    }

    #[test]
    fn display_names_every_variant() {
        assert!(Flow::V1(FlowV1::default()).to_string().starts_with("v1{"));
        assert!(Flow::V6(FlowV5::default()).to_string().starts_with("v6{"));
        assert!(Flow::V7(FlowV7::default()).to_string().starts_with("v7{"));
        assert!(
            Flow::V8(FlowV8::ProtoPort(RouterProtoPort::default()))
                .to_string()
                .starts_with("v8/proto-port{")
        );
    }

    #[test]
    fn equality_includes_counters() {
        let a = sample_v5();
        let mut b = sample_v5();
        assert_eq!(a, b);
        b.stats.set_packets(11).unwrap();
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn merge_with_identical_identity_always_succeeds(
            src in any::<u32>(),
            dst in any::<u32>(),
            sport in any::<u16>(),
            dport in any::<u16>(),
            proto in any::<u8>(),
            p1 in 0u64..=0xFFFF_FFFF,
            p2 in 0u64..=0xFFFF_FFFF,
        ) {
            let mut a = FlowV1 {
                src_addr: src,
                dst_addr: dst,
                src_port: sport,
                dst_port: dport,
                proto,
                ..FlowV1::default()
            };
            a.stats.set_packets(p1).unwrap();
            let mut b = a;
            b.stats.set_packets(p2).unwrap();

            prop_assert!(a.merge(&b));
            prop_assert_eq!(a.stats.packets(), p1 + p2);
        }

        #[test]
        fn v8_schemes_never_cross_merge(seed in any::<u16>()) {
            let mut a = FlowV8::As(RouterAs {
                src_as: seed,
                ..RouterAs::default()
            });
            let b = FlowV8::ProtoPort(RouterProtoPort {
                src_port: seed,
                ..RouterProtoPort::default()
            });
            prop_assert!(!a.merge(&b));
        }
    }
}
