//! Wire codecs for NetFlow datagrams.
//!
//! Each version module decodes and encodes whole datagrams in network
//! byte order. [`decode_any`] routes on the leading version word through
//! the registry in [`crate::flow_type`]; [`encode_any`] dispatches on the
//! packet's own version. Decoding is faithful: a decoded packet re-encodes
//! to the same bytes, trailing padding aside.

use std::io::Write;

use crate::{Error, flow_type, packet::Packet};

pub mod v1;
pub mod v5;
pub mod v6;
pub mod v7;
pub mod v8;

/// Decode a datagram of any registered version.
///
/// # Errors
///
/// Returns [`Error::UnsupportedVersion`] when no flow type is registered
/// for the leading version word, [`Error::Truncated`] when the buffer
/// ends early and [`Error::Corrupt`] on invalid field values.
pub fn decode_any(buf: &[u8]) -> Result<Packet, Error> {
    if buf.len() < 2 {
        return Err(Error::Truncated {
            needed: 2,
            have: buf.len(),
        });
    }
    let version = u16::from_be_bytes([buf[0], buf[1]]);
    let flow_type =
        flow_type::resolve(version).ok_or(Error::UnsupportedVersion { version })?;
    flow_type.decode_packet(buf)
}

/// Encode a packet as a single datagram.
///
/// # Errors
///
/// Returns [`Error::Io`] when the writer fails.
pub fn encode_any<W: Write>(packet: &Packet, writer: &mut W) -> Result<(), Error> {
    match packet {
        Packet::V1(p) => v1::encode(p, writer),
        Packet::V5(p) => v5::encode(p, writer),
        Packet::V6(p) => v6::encode(p, writer),
        Packet::V7(p) => v7::encode(p, writer),
        Packet::V8(p) => v8::encode(p, writer),
    }
}

/// Bounds-checked big-endian cursor over a datagram.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let have = self.buf.len() - self.pos;
        if n > have {
            return Err(Error::Truncated { needed: n, have });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, Error> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, Error> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.take(n).map(|_| ())
    }
}

/// Low 32 bits of an accumulated counter, the truncation exporting
/// routers apply.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn wire_u32(value: u64) -> u32 {
    value as u32
}

/// Record count for a header. Lengths are bounded by the version's record
/// limit before this is called.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn wire_count(len: usize) -> u16 {
    len as u16
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flow_type::register_defaults;

    #[test]
    fn routes_on_version_word() {
        register_defaults();
        let mut buf = Vec::new();
        encode_any(
            &crate::flow_type::FlowType::V5.new_packet(),
            &mut buf,
        )
        .unwrap();
        let packet = decode_any(&buf).unwrap();
        assert_eq!(packet.version(), 5);
    }

    #[test]
    fn rejects_unregistered_versions() {
        register_defaults();
        let buf = [0x00, 0x09, 0x00, 0x00];
        assert!(matches!(
            decode_any(&buf),
            Err(Error::UnsupportedVersion { version: 9 })
        ));
        let buf = [0x00, 0x02, 0x00, 0x00];
        assert!(matches!(
            decode_any(&buf),
            Err(Error::UnsupportedVersion { version: 2 })
        ));
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(matches!(
            decode_any(&[]),
            Err(Error::Truncated { needed: 2, have: 0 })
        ));
        assert!(matches!(
            decode_any(&[0x00]),
            Err(Error::Truncated { needed: 2, have: 1 })
        ));
    }
}
