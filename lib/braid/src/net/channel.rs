//! One communication channel per remote peer: a non-blocking TCP stream with
//! a read buffer on one side and a write buffer on the other, moving whole
//! frames in and out.

use crate::net::buffer::Buffer;
use crate::net::frame::{WireFrame, MAX_PAYLOAD_SIZE};
use crate::net::{ErrorType, NetworkError, NetworkResult};
use keel::logging::{self, Logger};
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

pub const READ_BUF_SIZE: usize = 8 * 65536;
pub const WRITE_BUF_SIZE: usize = 8 * 65536;

pub struct Channel {
    stream: Option<TcpStream>,
    read_buffer: Buffer,
    write_buffer: Buffer,
    log: Logger,
}

impl Channel {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(log: L) -> Channel {
        let channel_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            None => logging::discard(),
        };

        Channel {
            stream: None,
            read_buffer: Buffer::new(READ_BUF_SIZE),
            write_buffer: Buffer::new(WRITE_BUF_SIZE),
            log: channel_log,
        }
    }

    /// Attach an established stream. The channel must not already be open.
    pub fn open(&mut self, stream: TcpStream) {
        if self.stream.is_some() {
            panic!("Attempted to open an already open channel");
        }
        self.stream = Some(stream);
        logging::debug!(self.log, "channel opened"; "context" => "open");
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn close(&mut self) {
        self.read_buffer.clear();
        self.write_buffer.clear();
        if self.stream.take().is_some() {
            logging::debug!(self.log, "channel closed"; "context" => "close");
        }
    }

    /// Bytes received on connection setup before the channel existed (the
    /// tail of an accepted preamble) are fed straight into the read buffer.
    pub(crate) fn inject(&mut self, bytes: &[u8]) {
        if !self.read_buffer.extend(bytes) {
            panic!("preamble residue exceeds the read buffer");
        }
    }

    pub fn register(&mut self, registry: &Registry, token: Token) -> NetworkResult<()> {
        let stream = self
            .stream
            .as_mut()
            .expect("cannot register a closed channel");
        registry
            .register(stream, token, Interest::READABLE | Interest::WRITABLE)
            .map_err(Into::into)
    }

    pub fn deregister(&mut self, registry: &Registry) -> NetworkResult<()> {
        let stream = self
            .stream
            .as_mut()
            .expect("cannot deregister a closed channel");
        registry.deregister(stream).map_err(Into::into)
    }

    /// Read whatever the socket has into the read buffer.
    pub fn receive(&mut self) -> NetworkResult<usize> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Ok(0),
        };
        let received = self.read_buffer.ingress(stream)?;
        logging::trace!(self.log, "received"; "context" => "receive", "bytes" => received);
        Ok(received)
    }

    /// Flush as much of the write buffer as the socket will take.
    pub fn send(&mut self) -> NetworkResult<usize> {
        if self.write_buffer.is_empty() {
            return Ok(0);
        }
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Ok(0),
        };
        let sent = self.write_buffer.egress(stream)?;
        logging::trace!(self.log, "sent"; "context" => "send", "bytes" => sent);
        Ok(sent)
    }

    pub fn has_egress(&self) -> bool {
        !self.write_buffer.is_empty()
    }

    pub fn egress_len(&self) -> usize {
        self.write_buffer.len()
    }

    /// Queue a frame for transmission. `Wait` when the write buffer cannot
    /// take it right now; the caller retries after draining.
    pub fn write_frame(&mut self, frame: &WireFrame) -> NetworkResult<()> {
        if frame.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }
        if frame.encoded_len() > self.write_buffer.free_capacity() {
            return Err(NetworkError::Wait);
        }
        let mut raw = Vec::with_capacity(frame.encoded_len());
        frame.encode(&mut raw);
        self.write_buffer.extend(&raw);
        logging::trace!(self.log, "frame queued";
                        "context" => "write_frame",
                        "control" => frame.control.into_byte(),
                        "dst" => frame.dst,
                        "payload" => frame.payload.len());
        Ok(())
    }

    /// Parse one frame out of the read buffer. `Wait` until a whole frame
    /// has arrived.
    pub fn read_frame(&mut self) -> NetworkResult<WireFrame> {
        let (frame, used) = WireFrame::parse(self.read_buffer.read_slice())?;
        self.read_buffer.consume(used);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::frame::MAX_PAYLOAD_SIZE;
    use std::mem;

    #[test]
    fn frame_roundtrip_through_buffers() {
        let mut channel = Channel::new(None);

        channel.write_frame(&WireFrame::announce(0, 5)).unwrap();
        channel
            .write_frame(&WireFrame::message(5, vec![1, 2, 3]))
            .unwrap();

        // loop the write side back into the read side
        mem::swap(&mut channel.read_buffer, &mut channel.write_buffer);

        let first = channel.read_frame().unwrap();
        assert_eq!(first, WireFrame::announce(0, 5));
        let second = channel.read_frame().unwrap();
        assert_eq!(second, WireFrame::message(5, vec![1, 2, 3]));
        assert_eq!(channel.read_frame().unwrap_err(), NetworkError::Wait);
    }

    #[test]
    fn partial_frame_waits() {
        let mut channel = Channel::new(None);
        channel
            .write_frame(&WireFrame::message(1, vec![9; 32]))
            .unwrap();
        mem::swap(&mut channel.read_buffer, &mut channel.write_buffer);

        // chop the tail off and the parse must hold back
        let full = channel.read_buffer.read_slice().to_vec();
        channel.read_buffer.clear();
        channel.read_buffer.extend(&full[..full.len() - 1]);
        assert_eq!(channel.read_frame().unwrap_err(), NetworkError::Wait);
    }

    #[test]
    fn write_frame_waits_when_full() {
        let mut channel = Channel::new(None);
        let big = WireFrame::message(1, vec![0; MAX_PAYLOAD_SIZE]);
        while channel.write_frame(&big).is_ok() {}
        assert_eq!(channel.write_frame(&big).unwrap_err(), NetworkError::Wait);
        assert!(channel.has_egress());
    }

    #[test]
    fn injected_bytes_prefix_the_stream() {
        let mut channel = Channel::new(None);
        let mut raw = Vec::new();
        WireFrame::complete(4).encode(&mut raw);
        channel.inject(&raw[..6]);
        assert_eq!(channel.read_frame().unwrap_err(), NetworkError::Wait);
        channel.inject(&raw[6..]);
        assert_eq!(channel.read_frame().unwrap(), WireFrame::complete(4));
    }
}
