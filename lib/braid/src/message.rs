//! Directional byte-stream messages and their typed wire codec.
//!
//! Integers travel as fixed-width big-endian, strings as a u32 length prefix
//! plus raw bytes, and arbitrary-precision integers as a u16 length prefix
//! plus big-endian magnitude bytes. An [`OutgoingMessage`] is an append (or
//! prepend) buffer addressed to one recipient; an [`IncomingMessage`] is a
//! cursored reader that remembers its sender.

use byteorder::{BigEndian, ByteOrder};
use keel::Identity;
use num_bigint::BigUint;
use std::fmt;

#[derive(Debug, Eq, PartialEq)]
pub enum MessageError {
    Truncated { needed: usize, available: usize },
    BadUtf8,
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageError::Truncated { needed, available } => write!(
                f,
                "message truncated: needed {} bytes, {} available",
                needed, available
            ),
            MessageError::BadUtf8 => write!(f, "string field is not valid UTF-8"),
        }
    }
}

impl std::error::Error for MessageError {}

pub trait MsgWrite {
    fn encode(&self, buf: &mut Vec<u8>);
}

pub trait MsgRead: Sized {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Self, MessageError>;
}

pub struct OutgoingMessage<I: Identity> {
    recipient: I,
    buffer: Vec<u8>,
}

impl<I: Identity> OutgoingMessage<I> {
    pub fn new(recipient: I) -> OutgoingMessage<I> {
        OutgoingMessage {
            recipient,
            buffer: Vec::new(),
        }
    }

    pub fn recipient(&self) -> &I {
        &self.recipient
    }

    pub fn write<T: MsgWrite + ?Sized>(&mut self, value: &T) {
        value.encode(&mut self.buffer);
    }

    /// Raw bytes onto the end of the message.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Raw bytes onto the front of the message.
    pub fn prepend(&mut self, bytes: &[u8]) {
        let mut fronted = Vec::with_capacity(bytes.len() + self.buffer.len());
        fronted.extend_from_slice(bytes);
        fronted.append(&mut self.buffer);
        self.buffer = fronted;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_parts(self) -> (I, Vec<u8>) {
        (self.recipient, self.buffer)
    }
}

pub struct IncomingMessage<I: Identity> {
    sender: I,
    buffer: Vec<u8>,
    cursor: usize,
}

impl<I: Identity> IncomingMessage<I> {
    pub fn new(sender: I, payload: Vec<u8>) -> IncomingMessage<I> {
        IncomingMessage {
            sender,
            buffer: payload,
            cursor: 0,
        }
    }

    pub fn sender(&self) -> &I {
        &self.sender
    }

    pub fn read<T: MsgRead>(&mut self) -> Result<T, MessageError> {
        T::decode(self)
    }

    /// Copy up to `out.len()` bytes from the message into `out`, advancing
    /// the cursor. Returns the number of bytes copied.
    pub fn remove(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len());
        out[..n].copy_from_slice(&self.buffer[self.cursor..self.cursor + n]);
        self.cursor += n;
        n
    }

    /// Bytes left to read.
    pub fn len(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop whatever remains unread.
    pub fn clear(&mut self) {
        self.cursor = self.buffer.len();
    }

    pub(crate) fn take_bytes(&mut self, n: usize) -> Result<&[u8], MessageError> {
        if self.len() < n {
            return Err(MessageError::Truncated {
                needed: n,
                available: self.len(),
            });
        }
        let start = self.cursor;
        self.cursor += n;
        Ok(&self.buffer[start..start + n])
    }
}

impl MsgWrite for u8 {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }
}

impl MsgRead for u8 {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<u8, MessageError> {
        Ok(msg.take_bytes(1)?[0])
    }
}

impl MsgWrite for i8 {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(*self as u8);
    }
}

impl MsgRead for i8 {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<i8, MessageError> {
        Ok(msg.take_bytes(1)?[0] as i8)
    }
}

macro_rules! int_codec {
    ($ty:ty, $size:expr, $write:path, $read:path) => {
        impl MsgWrite for $ty {
            fn encode(&self, buf: &mut Vec<u8>) {
                let mut raw = [0u8; $size];
                $write(&mut raw, *self);
                buf.extend_from_slice(&raw);
            }
        }

        impl MsgRead for $ty {
            fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<$ty, MessageError> {
                Ok($read(msg.take_bytes($size)?))
            }
        }
    };
}

int_codec!(u16, 2, BigEndian::write_u16, BigEndian::read_u16);
int_codec!(u32, 4, BigEndian::write_u32, BigEndian::read_u32);
int_codec!(u64, 8, BigEndian::write_u64, BigEndian::read_u64);
int_codec!(i16, 2, BigEndian::write_i16, BigEndian::read_i16);
int_codec!(i32, 4, BigEndian::write_i32, BigEndian::read_i32);
int_codec!(i64, 8, BigEndian::write_i64, BigEndian::read_i64);

impl MsgWrite for str {
    fn encode(&self, buf: &mut Vec<u8>) {
        (self.len() as u32).encode(buf);
        buf.extend_from_slice(self.as_bytes());
    }
}

impl MsgWrite for String {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.as_str().encode(buf);
    }
}

impl MsgRead for String {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<String, MessageError> {
        let len = msg.read::<u32>()? as usize;
        let raw = msg.take_bytes(len)?;
        match std::str::from_utf8(raw) {
            Ok(s) => Ok(s.to_owned()),
            Err(_) => Err(MessageError::BadUtf8),
        }
    }
}

impl MsgWrite for BigUint {
    fn encode(&self, buf: &mut Vec<u8>) {
        let magnitude = self.to_bytes_be();
        assert!(
            magnitude.len() <= usize::from(u16::MAX),
            "bignum exceeds the u16 wire length prefix"
        );
        (magnitude.len() as u16).encode(buf);
        buf.extend_from_slice(&magnitude);
    }
}

impl MsgRead for BigUint {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<BigUint, MessageError> {
        let len = msg.read::<u16>()? as usize;
        Ok(BigUint::from_bytes_be(msg.take_bytes(len)?))
    }
}

/// Sequences travel as a u32 count followed by the elements.
impl<T: MsgWrite> MsgWrite for Vec<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        (self.len() as u32).encode(buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: MsgRead> MsgRead for Vec<T> {
    fn decode<I: Identity>(msg: &mut IncomingMessage<I>) -> Result<Vec<T>, MessageError> {
        let count = msg.read::<u32>()? as usize;
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(msg.read::<T>()?);
        }
        Ok(items)
    }
}
