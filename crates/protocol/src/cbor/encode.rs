//! CBOR encoder.
//!
//! Sizes are computed up front so the output buffer is allocated exactly
//! once. Length prefixes always use the smallest tier that fits (inline,
//! 1, 2 or 4 bytes); the 8-byte tier is never emitted. Floats are emitted
//! as binary32 when the conversion is lossless, binary64 otherwise.

use super::{CborError, Value, MAX_PAYLOAD};
use crate::cursor::Cursor;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_SIMPLE: u8 = 7;

/// Encodes a value to its CBOR byte representation.
pub fn encode(value: &Value) -> Result<Vec<u8>, CborError> {
    let size = encoded_len(value)?;
    let mut cursor = Cursor::new(size);
    write_value(&mut cursor, value)?;
    Ok(cursor.into_inner())
}

/// Returns the exact number of bytes [`encode`] will produce.
pub fn encoded_len(value: &Value) -> Result<usize, CborError> {
    match value {
        Value::Null | Value::Undefined | Value::Bool(_) => Ok(1),
        Value::Integer(n) => Ok(head_len(integer_magnitude(*n)?)),
        Value::Float(f) => Ok(if fits_f32(*f) { 5 } else { 9 }),
        Value::Bytes(bytes) => {
            let len = checked_len(bytes.len(), |size| CborError::StringTooLarge { size })?;
            Ok(head_len(len) + bytes.len())
        }
        Value::Text(text) => {
            let len = checked_len(text.len(), |size| CborError::StringTooLarge { size })?;
            Ok(head_len(len) + text.len())
        }
        Value::Array(items) => {
            let len = checked_len(items.len(), |size| CborError::ArrayTooLarge { size })?;
            let mut total = head_len(len);
            for item in items {
                total += encoded_len(item)?;
            }
            Ok(total)
        }
        Value::Map(entries) => {
            let len = checked_len(entries.len(), |size| CborError::MapTooLarge { size })?;
            let mut total = head_len(len);
            for (key, item) in entries {
                let key_len =
                    checked_len(key.len(), |size| CborError::StringTooLarge { size })?;
                total += head_len(key_len) + key.len() + encoded_len(item)?;
            }
            Ok(total)
        }
    }
}

fn write_value(cursor: &mut Cursor, value: &Value) -> Result<(), CborError> {
    match value {
        Value::Null => Ok(cursor.push_u8(0xf6)?),
        Value::Undefined => Ok(cursor.push_u8(0xf7)?),
        Value::Bool(b) => Ok(cursor.push_u8(if *b { 0xf5 } else { 0xf4 })?),
        Value::Integer(n) => {
            let major = if *n >= 0 { MAJOR_UNSIGNED } else { MAJOR_NEGATIVE };
            write_head(cursor, major, integer_magnitude(*n)?)
        }
        Value::Float(f) => {
            if fits_f32(*f) {
                cursor.push_u8(MAJOR_SIMPLE << 5 | 26)?;
                cursor.push_bytes(&(*f as f32).to_be_bytes())?;
            } else {
                cursor.push_u8(MAJOR_SIMPLE << 5 | 27)?;
                cursor.push_bytes(&f.to_be_bytes())?;
            }
            Ok(())
        }
        Value::Bytes(bytes) => {
            write_head(cursor, MAJOR_BYTES, bytes.len() as u64)?;
            Ok(cursor.push_bytes(bytes)?)
        }
        Value::Text(text) => {
            write_head(cursor, MAJOR_TEXT, text.len() as u64)?;
            Ok(cursor.push_bytes(text.as_bytes())?)
        }
        Value::Array(items) => {
            write_head(cursor, MAJOR_ARRAY, items.len() as u64)?;
            for item in items {
                write_value(cursor, item)?;
            }
            Ok(())
        }
        Value::Map(entries) => {
            write_head(cursor, MAJOR_MAP, entries.len() as u64)?;
            for (key, item) in entries {
                write_head(cursor, MAJOR_TEXT, key.len() as u64)?;
                cursor.push_bytes(key.as_bytes())?;
                write_value(cursor, item)?;
            }
            Ok(())
        }
    }
}

/// Writes a major type and payload using the smallest length tier.
fn write_head(cursor: &mut Cursor, major: u8, payload: u64) -> Result<(), CborError> {
    let base = major << 5;
    if payload < 24 {
        cursor.push_u8(base | payload as u8)?;
    } else if payload <= u8::MAX as u64 {
        cursor.push_u8(base | 24)?;
        cursor.push_u8(payload as u8)?;
    } else if payload <= u16::MAX as u64 {
        cursor.push_u8(base | 25)?;
        cursor.push_u16(payload as u16)?;
    } else {
        cursor.push_u8(base | 26)?;
        cursor.push_u32(payload as u32)?;
    }
    Ok(())
}

const fn head_len(payload: u64) -> usize {
    if payload < 24 {
        1
    } else if payload <= u8::MAX as u64 {
        2
    } else if payload <= u16::MAX as u64 {
        3
    } else {
        5
    }
}

/// Magnitude encoded on the wire: `n` for non-negative, `-1 - n` otherwise.
fn integer_magnitude(n: i64) -> Result<u64, CborError> {
    // For negative n, -1 - n equals !n in two's complement.
    let magnitude = if n >= 0 { n as u64 } else { !(n as u64) };
    if magnitude > MAX_PAYLOAD {
        return Err(CborError::IntegerTooLarge { value: n });
    }
    Ok(magnitude)
}

fn checked_len(len: usize, err: impl FnOnce(usize) -> CborError) -> Result<u64, CborError> {
    if len as u64 > MAX_PAYLOAD {
        return Err(err(len));
    }
    Ok(len as u64)
}

fn fits_f32(value: f64) -> bool {
    value.is_nan() || (value as f32) as f64 == value
}
