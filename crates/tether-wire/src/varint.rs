//! LEB128-style variable-length integers.
//!
//! Seven data bits per byte, least significant group first, high bit set on
//! every byte except the last. Negative numbers always take the maximum
//! length because they are encoded as their two's complement bit pattern.

use crate::buffer::DecodeError;

/// Longest encoding of a 32-bit VarInt.
pub const MAX_VAR_INT_LEN: usize = 5;

/// Longest encoding of a 64-bit VarLong.
pub const MAX_VAR_LONG_LEN: usize = 10;

/// Number of bytes `value` occupies when encoded.
pub fn var_int_len(value: i32) -> usize {
    let mut v = value as u32;
    let mut len = 1;
    while v >= 0x80 {
        v >>= 7;
        len += 1;
    }
    len
}

/// Append `value` as a VarInt.
pub fn write_var_int(out: &mut Vec<u8>, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !0x7F == 0 {
            out.push(v as u8);
            return;
        }
        out.push((v as u8 & 0x7F) | 0x80);
        v >>= 7;
    }
}

/// Append `value` as a VarLong.
pub fn write_var_long(out: &mut Vec<u8>, value: i64) {
    let mut v = value as u64;
    loop {
        if v & !0x7F == 0 {
            out.push(v as u8);
            return;
        }
        out.push((v as u8 & 0x7F) | 0x80);
        v >>= 7;
    }
}

/// Try to read a VarInt from the start of `data`.
///
/// Returns `Ok(None)` when `data` ends in the middle of the number, which is
/// how the frame decoder tells "wait for more bytes" from a corrupt prefix.
pub fn peek_var_int(data: &[u8]) -> Result<Option<(i32, usize)>, DecodeError> {
    let mut value: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_VAR_INT_LEN {
            return Err(DecodeError::VarIntTooLong);
        }
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value as i32, i + 1)));
        }
    }
    if data.len() >= MAX_VAR_INT_LEN {
        return Err(DecodeError::VarIntTooLong);
    }
    Ok(None)
}
