//! Payload codecs
//!
//! A codec turns one value into exactly `payload_size()` bytes and back.
//! The serialization protocol owns everything else in a record (child
//! pointers, balance trailer, B-tree bookkeeping); the codec only ever sees
//! its own fixed-size slice.

use crate::{Result, TreeError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Reads and writes the fixed-size payload region of a node record
pub trait PayloadCodec<V> {
    /// Bytes per payload, identical for every record of a file
    fn payload_size(&self) -> usize;

    /// Fill `buf` (exactly `payload_size()` bytes) with `value`
    fn encode(&self, value: &V, buf: &mut [u8]) -> Result<()>;

    /// Rebuild a value from a `payload_size()` slice
    fn decode(&self, buf: &[u8]) -> Result<V>;
}

/// Values with a fixed little-endian encoding
pub trait FixedWidth: Sized {
    /// Encoded size in bytes
    fn width() -> usize;

    /// Write into `buf[..width()]`
    fn write_to(&self, buf: &mut [u8]);

    /// Read from `buf[..width()]`
    fn read_from(buf: &[u8]) -> Result<Self>;
}

macro_rules! impl_fixed_width {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FixedWidth for $ty {
                fn width() -> usize {
                    std::mem::size_of::<$ty>()
                }

                fn write_to(&self, buf: &mut [u8]) {
                    buf[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
                }

                fn read_from(buf: &[u8]) -> Result<Self> {
                    let width = std::mem::size_of::<$ty>();
                    let bytes = buf
                        .get(..width)
                        .and_then(|b| b.try_into().ok())
                        .ok_or(TreeError::PayloadSize { expected: width, actual: buf.len() })?;
                    Ok(<$ty>::from_le_bytes(bytes))
                }
            }
        )*
    };
}

impl_fixed_width!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl<const N: usize> FixedWidth for [u8; N] {
    fn width() -> usize {
        N
    }

    fn write_to(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(self);
    }

    fn read_from(buf: &[u8]) -> Result<Self> {
        buf.get(..N)
            .and_then(|b| b.try_into().ok())
            .ok_or(TreeError::PayloadSize { expected: N, actual: buf.len() })
    }
}

fn check_len(expected: usize, buf: &[u8]) -> Result<()> {
    if buf.len() != expected {
        return Err(TreeError::PayloadSize { expected, actual: buf.len() });
    }
    Ok(())
}

/// Codec for `FixedWidth` values (integers, floats, byte arrays)
pub struct FixedCodec<V> {
    _phantom: PhantomData<fn() -> V>,
}

impl<V> FixedCodec<V> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

impl<V> Default for FixedCodec<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: FixedWidth> PayloadCodec<V> for FixedCodec<V> {
    fn payload_size(&self) -> usize {
        V::width()
    }

    fn encode(&self, value: &V, buf: &mut [u8]) -> Result<()> {
        check_len(V::width(), buf)?;
        value.write_to(buf);
        Ok(())
    }

    fn decode(&self, buf: &[u8]) -> Result<V> {
        check_len(V::width(), buf)?;
        V::read_from(buf)
    }
}

/// Codec for any serde type, bincode-encoded and zero-padded to a fixed slot
///
/// Values whose encoding does not fit the slot are rejected at serialize
/// time with `TreeError::PayloadSize`.
pub struct BincodeCodec<V> {
    slot_size: usize,
    _phantom: PhantomData<fn() -> V>,
}

impl<V> BincodeCodec<V> {
    pub fn new(slot_size: usize) -> Self {
        Self { slot_size, _phantom: PhantomData }
    }
}

impl<V: Serialize + DeserializeOwned> PayloadCodec<V> for BincodeCodec<V> {
    fn payload_size(&self) -> usize {
        self.slot_size
    }

    fn encode(&self, value: &V, buf: &mut [u8]) -> Result<()> {
        check_len(self.slot_size, buf)?;
        let bytes = bincode::serialize(value)?;
        if bytes.len() > self.slot_size {
            return Err(TreeError::PayloadSize { expected: self.slot_size, actual: bytes.len() });
        }
        buf[..bytes.len()].copy_from_slice(&bytes);
        buf[bytes.len()..].fill(0);
        Ok(())
    }

    fn decode(&self, buf: &[u8]) -> Result<V> {
        check_len(self.slot_size, buf)?;
        // Trailing padding is ignored by bincode's default options.
        Ok(bincode::deserialize(buf)?)
    }
}

/// Codec built from a pair of closures
pub struct FnCodec<E, D> {
    payload_size: usize,
    encode: E,
    decode: D,
}

impl<E, D> FnCodec<E, D> {
    pub fn new(payload_size: usize, encode: E, decode: D) -> Self {
        Self { payload_size, encode, decode }
    }
}

impl<V, E, D> PayloadCodec<V> for FnCodec<E, D>
where
    E: Fn(&V, &mut [u8]) -> Result<()>,
    D: Fn(&[u8]) -> Result<V>,
{
    fn payload_size(&self) -> usize {
        self.payload_size
    }

    fn encode(&self, value: &V, buf: &mut [u8]) -> Result<()> {
        check_len(self.payload_size, buf)?;
        (self.encode)(value, buf)
    }

    fn decode(&self, buf: &[u8]) -> Result<V> {
        check_len(self.payload_size, buf)?;
        (self.decode)(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_fixed_codec_u64() {
        let codec = FixedCodec::<u64>::new();
        assert_eq!(codec.payload_size(), 8);

        let mut buf = [0u8; 8];
        codec.encode(&0x0102_0304_0506_0708, &mut buf).unwrap();
        assert_eq!(buf, [8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(codec.decode(&buf).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_fixed_codec_rejects_wrong_slice() {
        let codec = FixedCodec::<u32>::new();
        let mut buf = [0u8; 3];
        assert!(matches!(
            codec.encode(&1, &mut buf),
            Err(TreeError::PayloadSize { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_byte_array_width() {
        let codec = FixedCodec::<[u8; 16]>::new();
        let mut buf = [0u8; 16];
        let name = *b"fourteen\0\0\0\0\0\0\0\0";
        codec.encode(&name, &mut buf).unwrap();
        assert_eq!(codec.decode(&buf).unwrap(), name);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct NumberAndString {
        name: String,
        number: f64,
    }

    #[test]
    fn test_bincode_codec_pads_slot() {
        let codec = BincodeCodec::<NumberAndString>::new(40);
        let mut buf = vec![0xAAu8; 40];
        let value = NumberAndString { name: "thirteen".into(), number: 13.0 };

        codec.encode(&value, &mut buf).unwrap();
        assert_eq!(buf[39], 0);
        assert_eq!(codec.decode(&buf).unwrap(), value);
    }

    #[test]
    fn test_bincode_codec_rejects_oversized_value() {
        let codec = BincodeCodec::<String>::new(8);
        let mut buf = vec![0u8; 8];
        let result = codec.encode(&"far too long for the slot".to_string(), &mut buf);
        assert!(matches!(result, Err(TreeError::PayloadSize { expected: 8, .. })));
    }

    #[test]
    fn test_fn_codec() {
        let codec = FnCodec::new(
            2,
            |v: &u16, buf: &mut [u8]| {
                buf.copy_from_slice(&v.to_be_bytes());
                Ok(())
            },
            |buf: &[u8]| Ok(u16::from_be_bytes([buf[0], buf[1]])),
        );
        let mut buf = [0u8; 2];
        codec.encode(&0x1234, &mut buf).unwrap();
        assert_eq!(buf, [0x12, 0x34]);
        assert_eq!(codec.decode(&buf).unwrap(), 0x1234);
    }
}
