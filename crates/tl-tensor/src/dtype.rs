use std::fmt;
use std::ops::{Add, AddAssign, Mul};

/// Supported element types for matrix and tensor storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
    /// 32-bit signed integer.
    I32,
}

impl DType {
    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
            DType::I32 => 4,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
            DType::I32 => write!(f, "i32"),
        }
    }
}

/// A scalar that can live in a `Matrix` or `Tensor`.
///
/// Arithmetic is the element type's native arithmetic; no overflow or
/// precision guarantees are added on top. The byte helpers use the host's
/// native endianness, matching the on-disk matrix format.
pub trait Element:
    Copy
    + Default
    + PartialEq
    + fmt::Debug
    + Add<Output = Self>
    + Mul<Output = Self>
    + AddAssign
    + Send
    + Sync
    + 'static
{
    /// Runtime tag for this element type.
    const DTYPE: DType;

    /// Decode one element from exactly `DTYPE.size_in_bytes()` native-endian bytes.
    fn from_ne_slice(bytes: &[u8]) -> Self;

    /// Append this element's native-endian bytes to `out`.
    fn extend_ne_bytes(self, out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($t:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            fn from_ne_slice(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_ne_bytes(buf)
            }

            fn extend_ne_bytes(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

impl_element!(f32, DType::F32);
impl_element!(f64, DType::F64);
impl_element!(i32, DType::I32);
