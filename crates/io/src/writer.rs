//! Binary writer producing the canonical encoding.

use crate::{IoResult, Serializable};
use bytes::{BufMut, BytesMut};

/// A growable buffer that serializes values into the canonical wire format.
///
/// Integers are little-endian. Variable-length payloads are prefixed with a
/// compact var-int.
pub struct BinaryWriter {
    buffer: BytesMut,
}

impl BinaryWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Creates a writer with pre-reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Current write position, equal to the number of bytes emitted so far.
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) -> IoResult<usize> {
        self.buffer.put_u8(value);
        Ok(1)
    }

    /// Writes a boolean as a single `0`/`1` byte.
    pub fn write_bool(&mut self, value: bool) -> IoResult<usize> {
        self.write_u8(u8::from(value))
    }

    /// Writes an unsigned 16-bit integer, little-endian.
    pub fn write_u16(&mut self, value: u16) -> IoResult<usize> {
        self.buffer.put_u16_le(value);
        Ok(2)
    }

    /// Writes an unsigned 32-bit integer, little-endian.
    pub fn write_u32(&mut self, value: u32) -> IoResult<usize> {
        self.buffer.put_u32_le(value);
        Ok(4)
    }

    /// Writes an unsigned 64-bit integer, little-endian.
    pub fn write_u64(&mut self, value: u64) -> IoResult<usize> {
        self.buffer.put_u64_le(value);
        Ok(8)
    }

    /// Writes a compact variable-length integer.
    ///
    /// Values below `0xFD` occupy one byte; larger values are tagged with
    /// `0xFD`/`0xFE`/`0xFF` followed by the 16/32/64-bit little-endian value.
    pub fn write_var_int(&mut self, value: u64) -> IoResult<usize> {
        if value < 0xfd {
            self.write_u8(value as u8)
        } else if value <= 0xffff {
            self.write_u8(0xfd)?;
            self.write_u16(value as u16)?;
            Ok(3)
        } else if value <= 0xffff_ffff {
            self.write_u8(0xfe)?;
            self.write_u32(value as u32)?;
            Ok(5)
        } else {
            self.write_u8(0xff)?;
            self.write_u64(value)?;
            Ok(9)
        }
    }

    /// Writes raw bytes with no length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> IoResult<usize> {
        self.buffer.put_slice(value);
        Ok(value.len())
    }

    /// Writes a var-int length prefix followed by the bytes.
    pub fn write_var_bytes(&mut self, value: &[u8]) -> IoResult<usize> {
        let prefix = self.write_var_int(value.len() as u64)?;
        self.write_bytes(value)?;
        Ok(prefix + value.len())
    }

    /// Writes a UTF-8 string as var-bytes.
    pub fn write_var_string(&mut self, value: &str) -> IoResult<usize> {
        self.write_var_bytes(value.as_bytes())
    }

    /// Writes a serializable value in place.
    pub fn write_serializable<T: Serializable>(&mut self, value: &T) -> IoResult<usize> {
        let start = self.position();
        value.serialize(self)?;
        Ok(self.position() - start)
    }

    /// Writes a var-int count followed by each element.
    pub fn write_serializable_list<T: Serializable>(&mut self, value: &[T]) -> IoResult<usize> {
        let start = self.position();
        self.write_var_int(value.len() as u64)?;
        for item in value {
            self.write_serializable(item)?;
        }
        Ok(self.position() - start)
    }

    /// Consumes nothing; copies the accumulated bytes out.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    /// Resets the writer for reuse.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::new()
    }
}
