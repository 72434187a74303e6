//! Byte cursor over a fixed-size buffer.
//!
//! Foundation for the CBOR codec: a mutable position over an owned buffer
//! with big-endian reads/writes. The buffer never grows; encoders compute
//! the required size up front.

use thiserror::Error;

/// Out-of-bounds access on a [`Cursor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("cursor out of bounds: position {position} + {requested} exceeds buffer length {length}")]
pub struct CursorError {
    /// Position at the time of the access.
    pub position: usize,
    /// Number of bytes requested.
    pub requested: usize,
    /// Total buffer length.
    pub length: usize,
}

/// A read/write cursor over a fixed-size byte buffer.
///
/// Every read/write advances the position by the exact byte count consumed
/// or produced. The cursor is owned by a single encode/decode call and is
/// never shared.
#[derive(Clone, Debug)]
pub struct Cursor {
    buffer: Vec<u8>,
    position: usize,
}

impl Cursor {
    /// Creates a zero-filled cursor of the given size for writing.
    pub fn new(size: usize) -> Self {
        Self { buffer: vec![0; size], position: 0 }
    }

    /// Wraps an existing buffer for reading.
    pub fn with_buffer(buffer: Vec<u8>) -> Self {
        Self { buffer, position: 0 }
    }

    /// Current position.
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Bytes remaining after the current position.
    pub const fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Consumes the cursor, returning the underlying buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    fn check(&self, requested: usize) -> Result<(), CursorError> {
        if requested > self.remaining() {
            return Err(CursorError {
                position: self.position,
                requested,
                length: self.buffer.len(),
            });
        }
        Ok(())
    }

    /// Writes a single byte and advances by 1.
    pub fn push_u8(&mut self, value: u8) -> Result<(), CursorError> {
        self.check(1)?;
        self.buffer[self.position] = value;
        self.position += 1;
        Ok(())
    }

    /// Writes a big-endian `u16` and advances by 2.
    pub fn push_u16(&mut self, value: u16) -> Result<(), CursorError> {
        self.push_bytes(&value.to_be_bytes())
    }

    /// Writes a big-endian `u32` and advances by 4.
    pub fn push_u32(&mut self, value: u32) -> Result<(), CursorError> {
        self.push_bytes(&value.to_be_bytes())
    }

    /// Writes a slice and advances by its length.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), CursorError> {
        self.check(bytes.len())?;
        self.buffer[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        Ok(())
    }

    /// Reads a single byte and advances by 1.
    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        self.check(1)?;
        let byte = self.buffer[self.position];
        self.position += 1;
        Ok(byte)
    }

    /// Reads a big-endian `u16` and advances by 2.
    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a big-endian `u32` and advances by 4.
    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads `n` bytes and advances by `n`.
    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8], CursorError> {
        self.check(n)?;
        let slice = &self.buffer[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    /// Peeks at the next byte without advancing.
    pub fn inspect_u8(&self) -> Result<u8, CursorError> {
        self.check(1)?;
        Ok(self.buffer[self.position])
    }
}
