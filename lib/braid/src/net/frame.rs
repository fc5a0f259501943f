//! Wire framing: `control(1) | dst(8, big-endian) | len(4, big-endian) |
//! payload`. The explicit length prefix keeps frames self-delimiting even
//! when a control code carries no payload at all.

use crate::net::{ErrorType, NetworkError, NetworkResult};
use crate::protlet::{ProtletId, ID_INVALID};
use byteorder::{BigEndian, ByteOrder};

pub const HEADER_SIZE: usize = 13;
pub const MAX_PAYLOAD_SIZE: usize = 65536;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Control {
    /// "The child I invoked under parent `dst` has my local id `payload`."
    AnnounceChildId = 1,
    /// Application bytes for the protlet my id `dst` names.
    ProtletMessage = 2,
    /// "My local protlet `dst` has completed."
    ProtletComplete = 3,
    /// "I am tearing the run down." `dst` is meaningless.
    Abort = 4,
}

impl Control {
    pub fn from_byte(raw: u8) -> NetworkResult<Control> {
        match raw {
            1 => Ok(Control::AnnounceChildId),
            2 => Ok(Control::ProtletMessage),
            3 => Ok(Control::ProtletComplete),
            4 => Ok(Control::Abort),
            _ => Err(NetworkError::Fatal(ErrorType::BadControl)),
        }
    }

    #[inline]
    pub fn into_byte(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct WireFrame {
    pub control: Control,
    pub dst: ProtletId,
    pub payload: Vec<u8>,
}

impl WireFrame {
    pub fn announce(dst_parent: ProtletId, child_id: ProtletId) -> WireFrame {
        let mut payload = vec![0u8; 8];
        BigEndian::write_u64(&mut payload, child_id);
        WireFrame {
            control: Control::AnnounceChildId,
            dst: dst_parent,
            payload,
        }
    }

    pub fn message(dst: ProtletId, payload: Vec<u8>) -> WireFrame {
        WireFrame {
            control: Control::ProtletMessage,
            dst,
            payload,
        }
    }

    pub fn complete(dst: ProtletId) -> WireFrame {
        WireFrame {
            control: Control::ProtletComplete,
            dst,
            payload: Vec::new(),
        }
    }

    pub fn abort() -> WireFrame {
        WireFrame {
            control: Control::Abort,
            dst: ID_INVALID,
            payload: Vec::new(),
        }
    }

    /// The child id carried by an announce frame.
    pub fn announced_child_id(&self) -> NetworkResult<ProtletId> {
        if self.payload.len() < 8 {
            return Err(NetworkError::Fatal(ErrorType::BadControl));
        }
        Ok(BigEndian::read_u64(&self.payload[..8]))
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut header = [0u8; HEADER_SIZE];
        header[0] = self.control.into_byte();
        BigEndian::write_u64(&mut header[1..9], self.dst);
        BigEndian::write_u32(&mut header[9..13], self.payload.len() as u32);
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);
    }

    /// Parse one frame from the front of `buf`, returning it and the number
    /// of bytes consumed. `Wait` means the frame is not complete yet.
    pub fn parse(buf: &[u8]) -> NetworkResult<(WireFrame, usize)> {
        if buf.len() < HEADER_SIZE {
            return Err(NetworkError::Wait);
        }

        let control = Control::from_byte(buf[0])?;
        let dst = BigEndian::read_u64(&buf[1..9]);
        let payload_size = BigEndian::read_u32(&buf[9..13]) as usize;

        if payload_size > MAX_PAYLOAD_SIZE {
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }

        if buf.len() < HEADER_SIZE + payload_size {
            return Err(NetworkError::Wait);
        }

        let payload = buf[HEADER_SIZE..HEADER_SIZE + payload_size].to_vec();
        Ok((
            WireFrame {
                control,
                dst,
                payload,
            },
            HEADER_SIZE + payload_size,
        ))
    }
}
