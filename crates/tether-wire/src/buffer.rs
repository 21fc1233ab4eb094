//! Cursor-based packet reader and growable packet writer.

use crate::types::Position;
use crate::varint::{MAX_VAR_LONG_LEN, peek_var_int, write_var_int, write_var_long};

/// Errors produced while decoding a packet body.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The body ended before a field was complete.
    #[error("unexpected end of packet: needed {needed} bytes at offset {offset}")]
    UnexpectedEof {
        /// Offset of the field that could not be read.
        offset: usize,
        /// Bytes the field required.
        needed: usize,
    },

    /// A VarInt or VarLong used more bytes than allowed.
    #[error("variable-length integer is too long")]
    VarIntTooLong,

    /// A string exceeded its protocol maximum.
    #[error("string of {len} bytes exceeds maximum of {max}")]
    StringTooLong {
        /// Encoded length in bytes.
        len: usize,
        /// Maximum permitted length in bytes.
        max: usize,
    },

    /// A string was not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// A length prefix or enum discriminant was out of range.
    #[error("invalid {field}: {value}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// The value that was read.
        value: i64,
    },
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Reads big-endian fields from a packet, advancing an offset cursor.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Start reading `data` at `offset`, e.g. just past the packet id.
    pub fn with_offset(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            offset: offset.min(data.len()),
        }
    }

    /// Current cursor position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Whether the cursor reached the end of the packet.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take exactly `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                offset: self.offset,
                needed: n,
            });
        }
        let start = self.offset;
        self.offset += n;
        Ok(&self.data[start..self.offset])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Take everything after the cursor.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.offset..];
        self.offset = self.data.len();
        rest
    }

    /// Read an unsigned byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a signed byte.
    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a boolean (any non-zero byte is `true`).
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read an unsigned big-endian short.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Read a signed big-endian short.
    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    /// Read a signed big-endian int.
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Read a signed big-endian long.
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian IEEE float.
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian IEEE double.
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_be_bytes(self.read_array()?))
    }

    /// Read a VarInt.
    pub fn read_var_int(&mut self) -> Result<i32, DecodeError> {
        match peek_var_int(&self.data[self.offset..])? {
            Some((value, len)) => {
                self.offset += len;
                Ok(value)
            }
            None => Err(DecodeError::UnexpectedEof {
                offset: self.data.len(),
                needed: 1,
            }),
        }
    }

    /// Read a VarLong.
    pub fn read_var_long(&mut self) -> Result<i64, DecodeError> {
        let mut value: u64 = 0;
        for i in 0..MAX_VAR_LONG_LEN {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as i64);
            }
        }
        Err(DecodeError::VarIntTooLong)
    }

    /// Read a VarInt used as a length, rejecting negative values.
    pub fn read_length(&mut self, field: &'static str) -> Result<usize, DecodeError> {
        let len = self.read_var_int()?;
        usize::try_from(len).map_err(|_| DecodeError::InvalidValue {
            field,
            value: len as i64,
        })
    }

    /// Read a VarInt-prefixed UTF-8 string of at most `max_chars` characters.
    pub fn read_string(&mut self, max_chars: usize) -> Result<String, DecodeError> {
        let len = self.read_length("string length")?;
        let max = max_chars * 4;
        if len > max {
            return Err(DecodeError::StringTooLong { len, max });
        }
        let bytes = self.read_bytes(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
        if s.chars().count() > max_chars {
            return Err(DecodeError::StringTooLong {
                len,
                max: max_chars,
            });
        }
        Ok(s.to_owned())
    }

    /// Read a VarInt-prefixed byte array.
    pub fn read_byte_array(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_length("byte array length")?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Read a packed block position.
    pub fn read_position(&mut self) -> Result<Position, DecodeError> {
        Ok(Position::unpack(self.read_i64()?))
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Builds a packet by appending big-endian fields.
#[derive(Debug, Clone, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    /// Start an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a packet with its id byte.
    pub fn with_id(id: u8) -> Self {
        Self { buf: vec![id] }
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finish and return the packet bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Append an unsigned byte.
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    /// Append a signed byte.
    pub fn write_i8(&mut self, value: i8) -> &mut Self {
        self.write_u8(value as u8)
    }

    /// Append a boolean.
    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u8(value as u8)
    }

    /// Append an unsigned short.
    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Append a signed short.
    pub fn write_i16(&mut self, value: i16) -> &mut Self {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Append a signed int.
    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Append a signed long.
    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Append a float.
    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Append a double.
    pub fn write_f64(&mut self, value: f64) -> &mut Self {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Append a VarInt.
    pub fn write_var_int(&mut self, value: i32) -> &mut Self {
        write_var_int(&mut self.buf, value);
        self
    }

    /// Append a VarLong.
    pub fn write_var_long(&mut self, value: i64) -> &mut Self {
        write_var_long(&mut self.buf, value);
        self
    }

    /// Append a VarInt-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        self.write_var_int(value.len() as i32);
        self.write_bytes(value.as_bytes())
    }

    /// Append a VarInt-prefixed byte array.
    pub fn write_byte_array(&mut self, value: &[u8]) -> &mut Self {
        self.write_var_int(value.len() as i32);
        self.write_bytes(value)
    }

    /// Append a packed block position.
    pub fn write_position(&mut self, value: Position) -> &mut Self {
        self.write_i64(value.pack())
    }
}
