//! NetFlow wire model and codecs.
//!
//! This library models NetFlow export versions 1, 5, 6, 7 and 8 (all five
//! version 8 aggregation schemes), both as in-memory flow records that can be
//! merged and aggregated and as the big-endian wire layout routers emit. It
//! carries no IO of its own; the `netflow-cache` and `netflow-agent` crates
//! build the runtime pieces on top of it.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

use std::{
    io,
    time::{SystemTime, UNIX_EPOCH},
};

use once_cell::sync::Lazy;

pub mod batch;
pub mod codec;
pub mod flow;
pub mod flow_type;
pub mod mask;
pub mod packet;
pub mod traffic;

pub use batch::Batcher;
pub use codec::{decode_any, encode_any};
pub use flow::Flow;
pub use flow_type::{AggregationScheme, FlowType};
pub use packet::Packet;
pub use traffic::TrafficRecord;

/// Largest value that fits an unsigned 32-bit wire field.
pub(crate) const WIRE_U32_MAX: u64 = 0xFFFF_FFFF;

/// Errors produced while decoding, encoding or assembling NetFlow data.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Version tag does not name a registered flow type.
    #[error("Unsupported NetFlow version: {version}")]
    UnsupportedVersion {
        /// The version tag found at the start of the buffer.
        version: u16,
    },
    /// Buffer ended before a complete header or record was available.
    #[error("Truncated buffer: {needed} bytes needed, {have} available")]
    Truncated {
        /// Bytes the decoder needed to make progress.
        needed: usize,
        /// Bytes that remained in the buffer.
        have: usize,
    },
    /// Structurally invalid field content. See [`CorruptData`].
    #[error(transparent)]
    Corrupt(#[from] CorruptData),
    /// Operation mixed two distinct flow types.
    #[error("Flow type mismatch: expected {expected}, actual {actual}")]
    TypeMismatch {
        /// The flow type the operation was bound to.
        expected: FlowType,
        /// The flow type actually presented.
        actual: FlowType,
    },
    /// IO operation failed
    #[error("IO operation failed: {0}")]
    Io(#[from] io::Error),
}

/// Field-level corruption detected while decoding or mutating NetFlow data.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptData {
    /// Flow count exceeds the record budget of the version.
    #[error("Flow count {count} exceeds limit {limit}")]
    FlowCount {
        /// The count field carried by the header.
        count: u16,
        /// The budget of the flow type being decoded.
        limit: u16,
    },
    /// Aggregation code does not name a known version 8 scheme.
    #[error("Unknown aggregation scheme code: {code}")]
    AggregationCode {
        /// The code byte carried by the header.
        code: u8,
    },
    /// Prefix length wider than an IPv4 address.
    #[error("Prefix length {bits} out of range")]
    MaskBits {
        /// The offending bit count.
        bits: u8,
    },
    /// Network mask bits are not a contiguous prefix.
    #[error("Noncontiguous network mask: {mask:#010x}")]
    Mask {
        /// The offending mask value.
        mask: u32,
    },
    /// Numeric field value outside its wire range.
    #[error("{field} value {value} exceeds {limit}")]
    ValueRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: u64,
        /// Largest value the wire field can carry.
        limit: u64,
    },
}

/// Wall-clock milliseconds at which this process first touched the flow
/// machinery. Flow timestamps are stored relative to this instant, the local
/// equivalent of router uptime.
static BOOT_EPOCH_MS: Lazy<u64> = Lazy::new(epoch_ms);

fn epoch_ms() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Process boot reference, wall-clock milliseconds since the Unix epoch.
///
/// Captured once on first use and constant for the lifetime of the process.
/// [`Flow::first`] and [`Flow::last`] for locally built flows count from this
/// instant.
#[must_use]
pub fn boot_epoch_ms() -> u64 {
    *BOOT_EPOCH_MS
}

/// Milliseconds elapsed since [`boot_epoch_ms`].
#[must_use]
pub fn uptime_now_ms() -> u64 {
    epoch_ms().saturating_sub(*BOOT_EPOCH_MS)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boot_reference_is_stable() {
        let a = boot_epoch_ms();
        let b = boot_epoch_ms();
        assert_eq!(a, b);
        assert!(uptime_now_ms() < 60_000);
    }
}
