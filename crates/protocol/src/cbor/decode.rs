//! CBOR decoder.
//!
//! Accepts everything the encoder produces plus indefinite-length
//! strings, arrays and maps, and binary16 floats. The 8-byte length tier
//! and tagged values are rejected; map keys must be text strings.

use super::{CborError, Value};
use crate::cursor::Cursor;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;

const BREAK: u8 = 0xff;

/// Decodes a single CBOR value, requiring the input to be fully consumed.
pub fn decode(bytes: &[u8]) -> Result<Value, CborError> {
    let mut cursor = Cursor::with_buffer(bytes.to_vec());
    let value = read_value(&mut cursor)?;
    if cursor.remaining() != 0 {
        return Err(CborError::TrailingBytes { remaining: cursor.remaining() });
    }
    Ok(value)
}

fn read_value(cursor: &mut Cursor) -> Result<Value, CborError> {
    let position = cursor.position();
    let initial = cursor.read_u8()?;
    let major = initial >> 5;
    let info = initial & 0x1f;

    match major {
        MAJOR_UNSIGNED => {
            let n = read_definite_payload(cursor, info, position)?;
            Ok(Value::Integer(n as i64))
        }
        MAJOR_NEGATIVE => {
            let n = read_definite_payload(cursor, info, position)?;
            Ok(Value::Integer(-1 - n as i64))
        }
        MAJOR_BYTES => match read_payload(cursor, info, position)? {
            Some(len) => Ok(Value::Bytes(cursor.read_bytes(len as usize)?.to_vec())),
            None => Ok(Value::Bytes(read_chunks(cursor, MAJOR_BYTES)?)),
        },
        MAJOR_TEXT => match read_payload(cursor, info, position)? {
            Some(len) => {
                let bytes = cursor.read_bytes(len as usize)?.to_vec();
                Ok(Value::Text(into_text(bytes)?))
            }
            None => Ok(Value::Text(into_text(read_chunks(cursor, MAJOR_TEXT)?)?)),
        },
        MAJOR_ARRAY => match read_payload(cursor, info, position)? {
            Some(len) => {
                let mut items = Vec::with_capacity(capped_capacity(len));
                for _ in 0..len {
                    items.push(read_value(cursor)?);
                }
                Ok(Value::Array(items))
            }
            None => {
                let mut items = Vec::new();
                while cursor.inspect_u8()? != BREAK {
                    items.push(read_value(cursor)?);
                }
                cursor.read_u8()?;
                Ok(Value::Array(items))
            }
        },
        MAJOR_MAP => match read_payload(cursor, info, position)? {
            Some(len) => {
                let mut entries = Vec::with_capacity(capped_capacity(len));
                for _ in 0..len {
                    let key = read_text_key(cursor)?;
                    entries.push((key, read_value(cursor)?));
                }
                Ok(Value::Map(entries))
            }
            None => {
                let mut entries = Vec::new();
                while cursor.inspect_u8()? != BREAK {
                    let key = read_text_key(cursor)?;
                    entries.push((key, read_value(cursor)?));
                }
                cursor.read_u8()?;
                Ok(Value::Map(entries))
            }
        },
        MAJOR_TAG => {
            let tag = read_definite_payload(cursor, info, position)?;
            Err(CborError::UnsupportedTag { tag })
        }
        _ => read_simple(cursor, info, position),
    }
}

/// Reads a length/integer payload. `None` means indefinite length.
fn read_payload(
    cursor: &mut Cursor,
    info: u8,
    position: usize,
) -> Result<Option<u64>, CborError> {
    match info {
        0..=23 => Ok(Some(info as u64)),
        24 => Ok(Some(cursor.read_u8()? as u64)),
        25 => Ok(Some(cursor.read_u16()? as u64)),
        26 => Ok(Some(cursor.read_u32()? as u64)),
        27 => Err(CborError::Unsupported64Bit { position }),
        31 => Ok(None),
        _ => Err(CborError::InvalidAdditionalInfo { info, position }),
    }
}

/// Reads a payload where the indefinite form is not allowed (majors 0, 1, 6).
fn read_definite_payload(
    cursor: &mut Cursor,
    info: u8,
    position: usize,
) -> Result<u64, CborError> {
    read_payload(cursor, info, position)?
        .ok_or(CborError::InvalidAdditionalInfo { info: 31, position })
}

/// Collects the chunks of an indefinite-length string.
///
/// Every chunk must carry the enclosing major type and a definite length;
/// nesting indefinite strings is not permitted by RFC 8949.
fn read_chunks(cursor: &mut Cursor, expected_major: u8) -> Result<Vec<u8>, CborError> {
    let mut data = Vec::new();
    loop {
        let position = cursor.position();
        let initial = cursor.read_u8()?;
        if initial == BREAK {
            return Ok(data);
        }
        if initial >> 5 != expected_major {
            return Err(CborError::InvalidChunk { expected: expected_major, actual: initial });
        }
        let len = read_payload(cursor, initial & 0x1f, position)?
            .ok_or(CborError::InvalidChunk { expected: expected_major, actual: initial })?;
        data.extend_from_slice(cursor.read_bytes(len as usize)?);
    }
}

/// Reads a map key, which must be a text string.
fn read_text_key(cursor: &mut Cursor) -> Result<String, CborError> {
    let position = cursor.position();
    let initial = cursor.read_u8()?;
    let major = initial >> 5;
    if major != MAJOR_TEXT {
        return Err(CborError::InvalidMajorType { major, position });
    }
    match read_payload(cursor, initial & 0x1f, position)? {
        Some(len) => into_text(cursor.read_bytes(len as usize)?.to_vec()),
        None => into_text(read_chunks(cursor, MAJOR_TEXT)?),
    }
}

fn read_simple(cursor: &mut Cursor, info: u8, position: usize) -> Result<Value, CborError> {
    match info {
        20 => Ok(Value::Bool(false)),
        21 => Ok(Value::Bool(true)),
        22 => Ok(Value::Null),
        23 => Ok(Value::Undefined),
        24 => {
            let value = cursor.read_u8()?;
            if value < 32 {
                return Err(CborError::InvalidSimpleValue { value });
            }
            Ok(Value::Integer(value as i64))
        }
        25 => Ok(Value::Float(half_to_double(cursor.read_u16()?))),
        26 => Ok(Value::Float(f32::from_be_bytes(read_array(cursor)?) as f64)),
        27 => Ok(Value::Float(f64::from_be_bytes(read_array(cursor)?))),
        0..=19 => Ok(Value::Integer(info as i64)),
        // 28..=30 reserved; 31 is a break outside an indefinite item
        _ => Err(CborError::InvalidAdditionalInfo { info, position }),
    }
}

fn read_array<const N: usize>(cursor: &mut Cursor) -> Result<[u8; N], CborError> {
    let mut out = [0u8; N];
    out.copy_from_slice(cursor.read_bytes(N)?);
    Ok(out)
}

fn into_text(bytes: Vec<u8>) -> Result<String, CborError> {
    String::from_utf8(bytes).map_err(|_| CborError::InvalidUtf8)
}

/// IEEE-754 binary16 to binary64, decoded by hand (RFC 8949 appendix D).
fn half_to_double(half: u16) -> f64 {
    let sign = if half & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = (half >> 10) & 0x1f;
    let mantissa = (half & 0x03ff) as f64;
    let magnitude = match exponent {
        0 => mantissa * 2f64.powi(-24),
        31 => {
            if mantissa == 0.0 {
                f64::INFINITY
            } else {
                f64::NAN
            }
        }
        _ => (mantissa + 1024.0) * 2f64.powi(exponent as i32 - 25),
    };
    sign * magnitude
}

/// Preallocation guard: declared lengths are attacker-controlled.
fn capped_capacity(len: u64) -> usize {
    (len as usize).min(1024)
}
