//! Primitive encodings shared by every index file.
//!
//! - `Int32` / `Int64`: big-endian two's complement.
//! - `VInt` / `VLong`: see [`crate::util::varint`].
//! - `String`: `VInt` byte length followed by that many UTF-8 bytes.
//!
//! [`DataInput`] and [`DataOutput`] are blanket-implemented for every
//! `Read` / `Write`, so they work on storage handles, cursors and vectors.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{PilumError, Result};
use crate::util::varint;

/// Upper bound on a single encoded string, to reject garbage lengths early.
const MAX_STRING_BYTES: u32 = 1 << 28;

/// Reading half of the index primitive encodings.
pub trait DataInput: Read {
    /// Read one byte.
    fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_u8()?)
    }

    /// Read a big-endian 32-bit integer.
    fn read_int(&mut self) -> Result<i32> {
        Ok(self.read_i32::<BigEndian>()?)
    }

    /// Read a big-endian 64-bit integer.
    fn read_long(&mut self) -> Result<i64> {
        Ok(self.read_i64::<BigEndian>()?)
    }

    /// Read a variable-length 32-bit integer.
    fn read_vint(&mut self) -> Result<u32> {
        varint::read_u32(self)
    }

    /// Read a variable-length 64-bit integer.
    fn read_vlong(&mut self) -> Result<u64> {
        varint::read_u64(self)
    }

    /// Read a length-prefixed UTF-8 string.
    fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint()?;
        if len > MAX_STRING_BYTES {
            return Err(PilumError::corrupt(format!("string length {len} is implausible")));
        }
        let mut bytes = vec![0u8; len as usize];
        self.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| PilumError::corrupt(format!("invalid UTF-8: {e}")))
    }
}

impl<R: Read + ?Sized> DataInput for R {}

/// Writing half of the index primitive encodings.
pub trait DataOutput: Write {
    /// Write one byte.
    fn write_byte(&mut self, value: u8) -> Result<()> {
        Ok(self.write_u8(value)?)
    }

    /// Write a big-endian 32-bit integer.
    fn write_int(&mut self, value: i32) -> Result<()> {
        Ok(self.write_i32::<BigEndian>(value)?)
    }

    /// Write a big-endian 64-bit integer.
    fn write_long(&mut self, value: i64) -> Result<()> {
        Ok(self.write_i64::<BigEndian>(value)?)
    }

    /// Write a variable-length 32-bit integer.
    fn write_vint(&mut self, value: u32) -> Result<()> {
        varint::write_u32(self, value).map(|_| ())
    }

    /// Write a variable-length 64-bit integer.
    fn write_vlong(&mut self, value: u64) -> Result<()> {
        varint::write_u64(self, value).map(|_| ())
    }

    /// Write a length-prefixed UTF-8 string.
    fn write_string(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len())
            .map_err(|_| PilumError::invalid_argument("string too long to encode"))?;
        self.write_vint(len)?;
        self.write_all(value.as_bytes())?;
        Ok(())
    }
}

impl<W: Write + ?Sized> DataOutput for W {}

/// Encoded size of a string written by [`DataOutput::write_string`].
pub fn string_encoded_len(value: &str) -> usize {
    varint::encoded_len_u32(value.len() as u32) + value.len()
}
