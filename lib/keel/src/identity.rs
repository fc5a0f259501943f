//! Peer identities. An identity names a participant of a run; it must order
//! consistently on every peer (connection roles and peer-set layout both
//! derive from that order) and serialize to bytes for the connection
//! preamble.

use byteorder::{BigEndian, ByteOrder};
use std::fmt::{Debug, Display};
use std::hash::Hash;

pub trait Identity: Clone + Eq + Ord + Hash + Display + Debug + 'static {
    /// Appends the wire form of this identity to `buf`.
    fn write_bytes(&self, buf: &mut Vec<u8>);

    /// Parses one identity from the front of `buf`, returning the value and
    /// the number of bytes consumed, or `None` when more bytes are needed.
    fn read_bytes(buf: &[u8]) -> Option<(Self, usize)>;
}

/// Strings go out as a u32 length followed by the UTF-8 bytes.
impl Identity for String {
    fn write_bytes(&self, buf: &mut Vec<u8>) {
        let mut len = [0u8; 4];
        BigEndian::write_u32(&mut len, self.len() as u32);
        buf.extend_from_slice(&len);
        buf.extend_from_slice(self.as_bytes());
    }

    fn read_bytes(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < 4 {
            return None;
        }
        let len = BigEndian::read_u32(&buf[..4]) as usize;
        if buf.len() < 4 + len {
            return None;
        }
        match std::str::from_utf8(&buf[4..4 + len]) {
            Ok(s) => Some((s.to_owned(), 4 + len)),
            Err(_) => None,
        }
    }
}

/// Numeric identities are a fixed eight bytes, big-endian.
impl Identity for u64 {
    fn write_bytes(&self, buf: &mut Vec<u8>) {
        let mut raw = [0u8; 8];
        BigEndian::write_u64(&mut raw, *self);
        buf.extend_from_slice(&raw);
    }

    fn read_bytes(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < 8 {
            return None;
        }
        Some((BigEndian::read_u64(&buf[..8]), 8))
    }
}
