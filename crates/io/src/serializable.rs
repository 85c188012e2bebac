//! The `Serializable` trait and array helpers.

use crate::{BinaryWriter, IoResult, MemoryReader};

/// Values with a canonical byte encoding.
///
/// Implementations must be deterministic: the same value always serializes to
/// the same bytes, because digests and vote comparisons operate on the
/// encoded form.
pub trait Serializable {
    /// The exact size of the encoded value in bytes.
    fn size(&self) -> usize;

    /// Serializes the value using the given writer.
    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()>;

    /// Deserializes a value using the given reader.
    fn deserialize(reader: &mut MemoryReader) -> IoResult<Self>
    where
        Self: Sized;
}

/// Convenience conversions to and from owned byte vectors.
pub trait SerializableExt: Serializable {
    /// Encodes the value into a fresh byte vector.
    fn to_array(&self) -> IoResult<Vec<u8>> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize(&mut writer)?;
        Ok(writer.to_bytes())
    }

    /// Decodes a value from a byte slice, requiring the input to be consumed
    /// exactly.
    fn from_array(data: &[u8]) -> IoResult<Self>
    where
        Self: Sized,
    {
        let mut reader = MemoryReader::new(data);
        let value = Self::deserialize(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(crate::IoError::invalid_data(
                "from_array",
                format!("{} trailing bytes", reader.remaining()),
            ));
        }
        Ok(value)
    }
}

impl<T: Serializable> SerializableExt for T {}

/// Helpers for encoding homogeneous collections.
pub mod helper {
    use super::Serializable;
    use crate::{BinaryWriter, IoResult, MemoryReader};

    /// Serializes a slice as a var-int count followed by each element.
    pub fn serialize_array<T: Serializable>(
        items: &[T],
        writer: &mut BinaryWriter,
    ) -> IoResult<()> {
        writer.write_var_int(items.len() as u64)?;
        for item in items {
            item.serialize(writer)?;
        }
        Ok(())
    }

    /// Deserializes up to `max` elements written by [`serialize_array`].
    pub fn deserialize_array<T: Serializable>(
        reader: &mut MemoryReader,
        max: usize,
    ) -> IoResult<Vec<T>> {
        let count = reader.read_var_int(max as u64)? as usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::deserialize(reader)?);
        }
        Ok(items)
    }

    /// Encoded size of a slice written by [`serialize_array`].
    pub fn get_array_size<T: Serializable>(items: &[T]) -> usize {
        items
            .iter()
            .fold(get_var_size(items.len() as u64), |acc, item| {
                acc + item.size()
            })
    }

    /// Encoded size of a var-int.
    pub fn get_var_size(value: u64) -> usize {
        if value < 0xfd {
            1
        } else if value <= 0xffff {
            3
        } else if value <= 0xffff_ffff {
            5
        } else {
            9
        }
    }

    /// Encoded size of a var-bytes payload.
    pub fn get_var_bytes_size(len: usize) -> usize {
        get_var_size(len as u64) + len
    }
}
