//! Binary Unit
//!
//! The fixed-width byte cell the pager reads and writes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, VarpackError};

/// Fixed-width primitive that can be packed into a unit (little-endian)
pub trait Primitive: Sized + Copy {
    /// Encoded width in bytes
    const WIDTH: usize;

    fn write_le(self, out: &mut [u8]);

    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($t:ty),* $(,)?) => {
        $(
            impl Primitive for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(bytes);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_primitive!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// A block of bytes with the width of one pager unit
///
/// A unit owns its buffer. `clone()` copies into a fresh buffer and
/// [`Unit::take`] moves the buffer out, leaving an empty unit behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unit {
    data: Vec<u8>,
}

impl Unit {
    /// All-zero unit of `size` bytes
    pub fn zeroed(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    /// Unit holding exactly `data`
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Copy `bytes` into a unit of `size` bytes, zero padding the tail
    pub fn from_bytes(bytes: &[u8], size: usize) -> Result<Self> {
        if bytes.len() > size {
            return Err(VarpackError::Bounds(format!(
                "{} bytes do not fit in a {} byte unit",
                bytes.len(),
                size
            )));
        }
        let mut unit = Self::zeroed(size);
        unit.data[..bytes.len()].copy_from_slice(bytes);
        Ok(unit)
    }

    /// Pack a primitive into the front of a unit of `size` bytes
    pub fn from_primitive<T: Primitive>(value: T, size: usize) -> Result<Self> {
        if T::WIDTH > size {
            return Err(VarpackError::Bounds(format!(
                "{} byte value does not fit in a {} byte unit",
                T::WIDTH,
                size
            )));
        }
        let mut unit = Self::zeroed(size);
        value.write_le(&mut unit.data[..T::WIDTH]);
        Ok(unit)
    }

    /// Read a primitive from the front of the unit
    pub fn to_primitive<T: Primitive>(&self) -> Result<T> {
        if T::WIDTH > self.data.len() {
            return Err(VarpackError::Bounds(format!(
                "cannot read {} bytes from a {} byte unit",
                T::WIDTH,
                self.data.len()
            )));
        }
        Ok(T::read_le(&self.data[..T::WIDTH]))
    }

    /// Store UTF-8 text, zero padded to `size` bytes
    pub fn from_text(text: &str, size: usize) -> Result<Self> {
        Self::from_bytes(text.as_bytes(), size)
    }

    /// Text content with the zero padding stripped
    pub fn to_text(&self) -> Result<String> {
        let end = self
            .data
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |pos| pos + 1);
        String::from_utf8(self.data[..end].to_vec())
            .map_err(|e| VarpackError::Format(format!("unit is not valid UTF-8: {}", e)))
    }

    /// Move the buffer out, leaving this unit empty
    pub fn take(&mut self) -> Unit {
        std::mem::take(self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True when every byte is zero
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }
}

/// Cut a payload into units of `unit_size` bytes, zero padding the last one
pub fn split_units(bytes: &[u8], unit_size: usize) -> Vec<Unit> {
    if unit_size == 0 {
        return Vec::new();
    }
    bytes
        .chunks(unit_size)
        .map(|chunk| {
            let mut data = vec![0u8; unit_size];
            data[..chunk.len()].copy_from_slice(chunk);
            Unit::from_vec(data)
        })
        .collect()
}

/// Concatenate units back into one contiguous buffer
pub fn join_units(units: &[Unit]) -> Bytes {
    let total = units.iter().map(Unit::len).sum();
    let mut buf = BytesMut::with_capacity(total);
    for unit in units {
        buf.put_slice(unit.as_bytes());
    }
    buf.freeze()
}
