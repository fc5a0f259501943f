//! A bounded FIFO byte queue backing one direction of a channel. Data is
//! appended at the tail and consumed from the head; `ingress`/`egress` move
//! bytes between the queue and non-blocking socket halves.

use slice_deque::SliceDeque;
use std::io;

const BUF_SIZE_INCREMENT: usize = 65536;
const SCRATCH_SIZE: usize = 8192;

pub struct Buffer {
    data: SliceDeque<u8>,
    capacity: usize,
}

impl Buffer {
    pub fn new(capacity: usize) -> Buffer {
        if capacity % BUF_SIZE_INCREMENT != 0 {
            panic!(
                "Buffer capacity must be divisible by {}, got {}",
                BUF_SIZE_INCREMENT, capacity
            );
        }

        let mut data = SliceDeque::new();
        data.reserve(capacity);
        Buffer { data, capacity }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.capacity - self.data.len()
    }

    /// The readable bytes, oldest first.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Discard `count` bytes from the head.
    #[inline]
    pub fn consume(&mut self, count: usize) {
        assert!(count <= self.len(), "consume past end of buffer");
        unsafe { self.data.move_head(count as isize) }
    }

    #[inline]
    pub fn clear(&mut self) {
        let len = self.len();
        self.consume(len);
    }

    /// Append `bytes` wholesale. Returns false (and appends nothing) when
    /// they do not fit.
    pub fn extend(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.free_capacity() {
            return false;
        }
        for &byte in bytes {
            self.data.push_back(byte);
        }
        true
    }

    /// Pull as much as possible from `reader` until the reader would block,
    /// the buffer is full, or end-of-stream. Returns the bytes read; an
    /// end-of-stream with nothing read surfaces as `UnexpectedEof`.
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let mut total = 0;
        let mut scratch = [0u8; SCRATCH_SIZE];

        while self.free_capacity() > 0 {
            let room = self.free_capacity().min(scratch.len());
            match reader.read(&mut scratch[..room]) {
                Ok(0) => {
                    return if total == 0 {
                        Err(io::ErrorKind::UnexpectedEof.into())
                    } else {
                        Ok(total)
                    };
                }
                Ok(count) => {
                    self.extend(&scratch[..count]);
                    total += count;
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(err) => return Err(err),
            }
        }

        Ok(total)
    }

    /// Push buffered bytes into `writer` until it would block or the buffer
    /// drains. Returns the bytes written.
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let mut total = 0;

        while !self.is_empty() {
            match writer.write(self.data.as_slice()) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => {
                    self.consume(count);
                    total += count;
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(err) => return Err(err),
            }
        }

        Ok(total)
    }
}
