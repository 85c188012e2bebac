//! Reader over an in-memory byte slice, the decoding dual of `BinaryWriter`.

use crate::error::{IoError, IoResult};

/// Sequential reader for canonically encoded bytes.
///
/// Every read checks the remaining length first; running short yields
/// `IoError::EndOfStream` rather than a panic, since inputs arrive from the
/// network.
pub struct MemoryReader {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryReader {
    /// Creates a reader over a copy of `data`.
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            pos: 0,
        }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total input length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn ensure(&self, needed: usize, context: &str) -> IoResult<()> {
        if self.pos + needed > self.data.len() {
            return Err(IoError::end_of_stream(
                self.pos + needed - self.data.len(),
                context,
            ));
        }
        Ok(())
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> IoResult<u8> {
        self.ensure(1, "u8")?;
        let value = self.data[self.pos];
        self.pos += 1;
        Ok(value)
    }

    /// Reads a boolean; any byte other than `0` or `1` is invalid.
    pub fn read_bool(&mut self) -> IoResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(IoError::invalid_data(
                "bool",
                format!("unexpected byte {other:#04x}"),
            )),
        }
    }

    /// Reads an unsigned 16-bit integer, little-endian.
    pub fn read_u16(&mut self) -> IoResult<u16> {
        self.ensure(2, "u16")?;
        let bytes: [u8; 2] = self.data[self.pos..self.pos + 2].try_into().unwrap();
        self.pos += 2;
        Ok(u16::from_le_bytes(bytes))
    }

    /// Reads an unsigned 32-bit integer, little-endian.
    pub fn read_u32(&mut self) -> IoResult<u32> {
        self.ensure(4, "u32")?;
        let bytes: [u8; 4] = self.data[self.pos..self.pos + 4].try_into().unwrap();
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads an unsigned 64-bit integer, little-endian.
    pub fn read_u64(&mut self) -> IoResult<u64> {
        self.ensure(8, "u64")?;
        let bytes: [u8; 8] = self.data[self.pos..self.pos + 8].try_into().unwrap();
        self.pos += 8;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Reads a compact variable-length integer, rejecting values above `max`.
    pub fn read_var_int(&mut self, max: u64) -> IoResult<u64> {
        let tag = self.read_u8()?;
        let value = match tag {
            0xfd => self.read_u16()? as u64,
            0xfe => self.read_u32()? as u64,
            0xff => self.read_u64()?,
            small => small as u64,
        };
        if value > max {
            return Err(IoError::length_exceeded(value, max, "var_int"));
        }
        Ok(value)
    }

    /// Reads exactly `count` raw bytes.
    pub fn read_bytes(&mut self, count: usize) -> IoResult<Vec<u8>> {
        self.ensure(count, "bytes")?;
        let value = self.data[self.pos..self.pos + count].to_vec();
        self.pos += count;
        Ok(value)
    }

    /// Reads a var-int length prefix then that many bytes, bounded by `max`.
    pub fn read_var_bytes(&mut self, max: usize) -> IoResult<Vec<u8>> {
        let length = self.read_var_int(max as u64)? as usize;
        self.read_bytes(length)
    }

    /// Reads a var-bytes payload and decodes it as UTF-8.
    pub fn read_var_string(&mut self, max: usize) -> IoResult<String> {
        let bytes = self.read_var_bytes(max)?;
        String::from_utf8(bytes)
            .map_err(|e| IoError::invalid_data("string", format!("invalid utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BinaryWriter;

    #[test]
    fn round_trips_primitives() {
        let mut writer = BinaryWriter::new();
        writer.write_u8(7).unwrap();
        writer.write_bool(true).unwrap();
        writer.write_u16(513).unwrap();
        writer.write_u32(70_000).unwrap();
        writer.write_u64(u64::MAX).unwrap();
        writer.write_var_string("replica").unwrap();

        let mut reader = MemoryReader::new(&writer.to_bytes());
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u16().unwrap(), 513);
        assert_eq!(reader.read_u32().unwrap(), 70_000);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
        assert_eq!(reader.read_var_string(64).unwrap(), "replica");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn var_int_round_trips_across_widths() {
        for value in [0u64, 0xfc, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, u64::MAX] {
            let mut writer = BinaryWriter::new();
            writer.write_var_int(value).unwrap();
            let mut reader = MemoryReader::new(&writer.to_bytes());
            assert_eq!(reader.read_var_int(u64::MAX).unwrap(), value);
        }
    }

    #[test]
    fn short_input_is_end_of_stream() {
        let mut reader = MemoryReader::new(&[0x01, 0x02]);
        let err = reader.read_u32().unwrap_err();
        assert!(matches!(err, IoError::EndOfStream { .. }));
    }

    #[test]
    fn var_int_respects_limit() {
        let mut writer = BinaryWriter::new();
        writer.write_var_int(500).unwrap();
        let mut reader = MemoryReader::new(&writer.to_bytes());
        let err = reader.read_var_int(100).unwrap_err();
        assert!(matches!(err, IoError::LengthExceeded { .. }));
    }

    #[test]
    fn invalid_bool_rejected() {
        let mut reader = MemoryReader::new(&[0x02]);
        assert!(matches!(
            reader.read_bool().unwrap_err(),
            IoError::InvalidData { .. }
        ));
    }
}
