//! Native-endian binary primitives.
//!
//! Dimensions are written as 8-byte unsigned integers followed by the raw
//! element payload, in the host's byte order. This is a machine format, not a
//! portable interchange format.

use std::io::{Read, Write};

use crate::dtype::Element;
use crate::error::{Result, TensorError};

/// Read one native-endian `u64` (a serialized `size_t`).
pub fn read_u64(reader: &mut impl Read) -> Result<u64> {
    let mut buf8 = [0u8; 8];
    reader.read_exact(&mut buf8)?;
    Ok(u64::from_ne_bytes(buf8))
}

/// Write one native-endian `u64`.
pub fn write_u64(writer: &mut impl Write, value: u64) -> Result<()> {
    writer.write_all(&value.to_ne_bytes())?;
    Ok(())
}

/// Fill `out` with elements read from `reader`.
///
/// Fails with an IO error if the stream ends before `out` is full.
pub fn read_elements<T: Element>(reader: &mut impl Read, out: &mut [T]) -> Result<()> {
    let size = T::DTYPE.size_in_bytes();
    let mut buf = vec![0u8; out.len() * size];
    reader.read_exact(&mut buf)?;
    for (dst, chunk) in out.iter_mut().zip(buf.chunks_exact(size)) {
        *dst = T::from_ne_slice(chunk);
    }
    Ok(())
}

/// Write all elements of `data` to `writer`.
pub fn write_elements<T: Element>(writer: &mut impl Write, data: &[T]) -> Result<()> {
    let mut buf = Vec::with_capacity(data.len() * T::DTYPE.size_in_bytes());
    for &v in data {
        v.extend_ne_bytes(&mut buf);
    }
    writer.write_all(&buf)?;
    Ok(())
}

/// Byte length of `count` elements of `T`, or an `InvalidData` IO error if
/// it overflows.
pub fn payload_len<T: Element>(count: u64) -> Result<u64> {
    count
        .checked_mul(T::DTYPE.size_in_bytes() as u64)
        .ok_or_else(|| invalid_data(format!("payload of {count} {} elements overflows", T::DTYPE)))
}

/// An IO error for a header that cannot describe real data.
pub fn invalid_data(msg: String) -> TensorError {
    TensorError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
}

/// Read exactly `count` elements whose count came from untrusted input.
///
/// The buffer grows only as bytes arrive, so a bogus count fails with an
/// `UnexpectedEof` IO error once the stream runs dry instead of allocating
/// the claimed size up front.
pub fn read_payload<T: Element>(reader: &mut impl Read, count: u64) -> Result<Vec<T>> {
    let bytes = payload_len::<T>(count)?;
    let mut buf = Vec::new();
    reader.by_ref().take(bytes).read_to_end(&mut buf)?;
    if (buf.len() as u64) < bytes {
        return Err(TensorError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("expected {bytes} payload bytes, got {}", buf.len()),
        )));
    }
    Ok(buf
        .chunks_exact(T::DTYPE.size_in_bytes())
        .map(T::from_ne_slice)
        .collect())
}

/// Read a length-prefixed vector: `len (8 bytes) | len elements`.
pub fn read_vector<T: Element>(reader: &mut impl Read) -> Result<Vec<T>> {
    let len = read_u64(reader)?;
    read_payload(reader, len)
}

/// Write a length-prefixed vector.
pub fn write_vector<T: Element>(writer: &mut impl Write, data: &[T]) -> Result<()> {
    write_u64(writer, data.len() as u64)?;
    write_elements(writer, data)
}
