//! Growable byte buffer for APDU construction and parsing
//!
//! [`ByteBuffer`] is a write-at-end / read-from-cursor buffer. Multi-byte
//! integers are big-endian as everywhere in DLMS.
//!
//! # Object Count
//!
//! Lengths of variable-size A-XDR items (octet strings, ciphered APDU bodies,
//! arrays) use the "object count" encoding:
//!
//! | Value range        | Encoding                      |
//! |--------------------|-------------------------------|
//! | `0x00..=0x7F`      | 1 byte, the value itself      |
//! | `0x80..=0xFF`      | `0x81` + 1 byte               |
//! | `0x100..=0xFFFF`   | `0x82` + 2 bytes              |
//! | larger             | `0x84` + 4 bytes              |

use crate::error::{DlmsError, DlmsResult};

/// Growable byte buffer with a read cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
}

impl ByteBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            position: 0,
        }
    }

    /// Number of bytes stored in the buffer
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the read position
    ///
    /// # Errors
    /// Returns error if `position` is past the end of the buffer
    pub fn set_position(&mut self, position: usize) -> DlmsResult<()> {
        if position > self.data.len() {
            return Err(DlmsError::InvalidData(format!(
                "Position {} is out of range (buffer size {})",
                position,
                self.data.len()
            )));
        }
        self.position = position;
        Ok(())
    }

    /// Number of unread bytes
    pub fn available(&self) -> usize {
        self.data.len() - self.position
    }

    /// Unread bytes
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.position..]
    }

    /// All stored bytes, independent of the read position
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer and return the stored bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Drop all contents and rewind
    pub fn clear(&mut self) {
        self.data.clear();
        self.position = 0;
    }

    /// Replace the contents and rewind
    pub fn replace(&mut self, data: Vec<u8>) {
        self.data = data;
        self.position = 0;
    }

    /// Append a byte
    pub fn set_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Append a big-endian u16
    pub fn set_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a big-endian u32
    pub fn set_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Append raw bytes
    pub fn set(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append an object count
    ///
    /// Counts above `u32::MAX` have no encoding and are rejected.
    pub fn set_object_count(&mut self, count: usize) -> DlmsResult<()> {
        if count < 0x80 {
            self.data.push(count as u8);
        } else if count < 0x100 {
            self.data.push(0x81);
            self.data.push(count as u8);
        } else if count < 0x10000 {
            self.data.push(0x82);
            self.set_u16(count as u16);
        } else {
            let count = u32::try_from(count).map_err(|_| {
                DlmsError::InvalidData(format!("Object count {} does not fit in 4 bytes", count))
            })?;
            self.data.push(0x84);
            self.set_u32(count);
        }
        Ok(())
    }

    fn ensure(&self, count: usize) -> DlmsResult<()> {
        if self.available() < count {
            return Err(DlmsError::InvalidData(format!(
                "Not enough data: need {} bytes at position {}, {} available",
                count,
                self.position,
                self.available()
            )));
        }
        Ok(())
    }

    /// Read a byte
    pub fn get_u8(&mut self) -> DlmsResult<u8> {
        self.ensure(1)?;
        let value = self.data[self.position];
        self.position += 1;
        Ok(value)
    }

    /// Read a big-endian u16
    pub fn get_u16(&mut self) -> DlmsResult<u16> {
        let mut bytes = [0u8; 2];
        self.get_into(&mut bytes)?;
        Ok(u16::from_be_bytes(bytes))
    }

    /// Read a big-endian u32
    pub fn get_u32(&mut self) -> DlmsResult<u32> {
        let mut bytes = [0u8; 4];
        self.get_into(&mut bytes)?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Read exactly `target.len()` bytes into `target`
    pub fn get_into(&mut self, target: &mut [u8]) -> DlmsResult<()> {
        self.ensure(target.len())?;
        target.copy_from_slice(&self.data[self.position..self.position + target.len()]);
        self.position += target.len();
        Ok(())
    }

    /// Read `count` bytes
    pub fn get(&mut self, count: usize) -> DlmsResult<&[u8]> {
        self.ensure(count)?;
        let start = self.position;
        self.position += count;
        Ok(&self.data[start..self.position])
    }

    /// Read an object count
    pub fn get_object_count(&mut self) -> DlmsResult<usize> {
        let first = self.get_u8()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let size = (first & 0x7F) as usize;
        if size == 0 || size > 4 {
            return Err(DlmsError::InvalidData(format!(
                "Invalid object count length byte: 0x{:02X}",
                first
            )));
        }
        let mut count = 0usize;
        for _ in 0..size {
            count = (count << 8) | self.get_u8()? as usize;
        }
        Ok(count)
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

/// Number of bytes the object count encoding of `count` occupies
pub fn object_count_size(count: usize) -> usize {
    if count < 0x80 {
        1
    } else if count < 0x100 {
        2
    } else if count < 0x10000 {
        3
    } else {
        5
    }
}
