//! Variable-length integer encoding.
//!
//! Seven payload bits per byte, low-order group first, high bit set on every
//! byte except the last. Index files use this for counts, doc deltas,
//! frequencies and string lengths.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::error::{PilumError, Result};

/// Encode a u32 into a fresh buffer.
pub fn encode_u32(value: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(5);
    let mut val = value;
    while val & !0x7F != 0 {
        bytes.push(((val & 0x7F) | 0x80) as u8);
        val >>= 7;
    }
    bytes.push(val as u8);
    bytes
}

/// Decode a u32, returning the value and the number of bytes consumed.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut result = 0u32;
    let mut shift = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 32 {
            return Err(PilumError::corrupt("VInt overflow"));
        }
        result |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
    }
    Err(PilumError::corrupt("incomplete VInt"))
}

/// Number of bytes [`write_u32`] emits for `value`.
pub fn encoded_len_u32(value: u32) -> usize {
    let mut len = 1;
    let mut val = value >> 7;
    while val != 0 {
        len += 1;
        val >>= 7;
    }
    len
}

/// Write a u32 in variable-length form.
pub fn write_u32<W: Write + ?Sized>(writer: &mut W, value: u32) -> Result<usize> {
    let mut val = value;
    let mut written = 1;
    while val & !0x7F != 0 {
        writer.write_u8(((val & 0x7F) | 0x80) as u8)?;
        val >>= 7;
        written += 1;
    }
    writer.write_u8(val as u8)?;
    Ok(written)
}

/// Read a variable-length u32.
pub fn read_u32<R: Read + ?Sized>(reader: &mut R) -> Result<u32> {
    let mut result = 0u32;
    let mut shift = 0;
    loop {
        let byte = reader.read_u8()?;
        if shift >= 32 {
            return Err(PilumError::corrupt("VInt overflow"));
        }
        result |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Write a u64 in variable-length form.
pub fn write_u64<W: Write + ?Sized>(writer: &mut W, value: u64) -> Result<usize> {
    let mut val = value;
    let mut written = 1;
    while val & !0x7F != 0 {
        writer.write_u8(((val & 0x7F) | 0x80) as u8)?;
        val >>= 7;
        written += 1;
    }
    writer.write_u8(val as u8)?;
    Ok(written)
}

/// Read a variable-length u64.
pub fn read_u64<R: Read + ?Sized>(reader: &mut R) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;
    loop {
        let byte = reader.read_u8()?;
        if shift >= 64 {
            return Err(PilumError::corrupt("VLong overflow"));
        }
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}
