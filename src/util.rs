use crate::errors::{DecodeError, DecodeResult};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::net::SocketAddr;

/// Read-only view over a byte slice with an explicit offset.
///
/// Every read is bounds checked against the slice; running off the end
/// yields [`DecodeError::Truncated`] and leaves the offset untouched.
#[derive(Clone, Copy, Debug)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Unread part of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> DecodeResult<()> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> DecodeResult<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u16_be(&mut self) -> DecodeResult<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_i32_le(&mut self) -> DecodeResult<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u32_le(&mut self) -> DecodeResult<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64_le(&mut self) -> DecodeResult<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_f32_le(&mut self) -> DecodeResult<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_bytes(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        self.take(n)
    }

    /// Distance from the offset to the next `byte`, if any.
    pub fn bytes_before(&self, byte: u8) -> Option<usize> {
        self.rest().iter().position(|&b| b == byte)
    }

    /// Reads a null-terminated string, consuming the terminator.
    ///
    /// Returns `None` without consuming anything when no terminator remains.
    pub fn try_read_cstring(&mut self) -> Option<String> {
        let len = self.bytes_before(0)?;
        let raw = &self.buf[self.pos..self.pos + len];
        self.pos += len + 1;
        Some(String::from_utf8_lossy(raw).into_owned())
    }

    /// Reads a null-terminated string; a missing terminator is a truncation.
    pub fn read_cstring(&mut self) -> DecodeResult<String> {
        let available = self.remaining();
        self.try_read_cstring().ok_or(DecodeError::Truncated {
            needed: available + 1,
            available,
        })
    }

    /// Reads a null-terminated string, falling back to the rest of the buffer.
    pub fn read_cstring_or_rest(&mut self) -> String {
        match self.try_read_cstring() {
            Some(s) => s,
            None => {
                let raw = self.rest();
                self.pos = self.buf.len();
                String::from_utf8_lossy(raw).into_owned()
            }
        }
    }
}

/// Lower-case hex rendering of a buffer, for trace logging.
pub fn hex_dump(data: &[u8]) -> String {
    hex::encode(data)
}

/// Hex dump grouped in 16-byte lines with offsets.
pub fn hex_dump_lines(data: &[u8]) -> String {
    data.chunks(16)
        .enumerate()
        .map(|(i, chunk)| format!("{:08x}  {}", i * 16, hex::encode(chunk)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn to_v4(addr: SocketAddr) -> SocketAddr {
    use SocketAddr::*;

    if let V6(v) = addr {
        if let Some(v4_addr) = v.ip().to_ipv4() {
            return SocketAddr::from((v4_addr, v.port()));
        }
    }

    addr
}
