//! CBOR codec (RFC 8949 subset).
//!
//! Canonical-leaning encoder and a lenient decoder over the byte
//! [`Cursor`](crate::cursor::Cursor). The supported subset:
//!
//! - unsigned/negative integers up to 32-bit payloads (no 64-bit tier),
//! - byte strings, UTF-8 text strings, arrays and text-keyed maps,
//! - floats (binary32 when lossless, binary64 otherwise; binary16 decode
//!   only), booleans, `null` and `undefined`.
//!
//! Tags are rejected. The decoder additionally accepts indefinite-length
//! strings, arrays and maps.

mod decode;
mod encode;

pub use decode::decode;
pub use encode::{encode, encoded_len};

use crate::cursor::CursorError;
use thiserror::Error;

/// Largest length/integer payload the codec will emit or accept.
///
/// The wire format stops at the 4-byte length tier, so anything above
/// `u32::MAX` is unrepresentable.
pub const MAX_PAYLOAD: u64 = u32::MAX as u64;

/// A dynamically typed CBOR value.
///
/// Maps preserve insertion order and only carry text keys.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Undefined,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

/// Errors produced by [`encode`], [`decode`] and the hex helpers.
#[derive(Debug, Error, PartialEq)]
pub enum CborError {
    /// A map key (or other position requiring a specific major type)
    /// carried the wrong major type.
    #[error("invalid major type {major} at byte {position}")]
    InvalidMajorType { major: u8, position: usize },
    /// Additional-information bits 28..=30, or 31 where indefinite
    /// lengths are not allowed.
    #[error("invalid additional information {info} at byte {position}")]
    InvalidAdditionalInfo { info: u8, position: usize },
    /// The 64-bit length/integer tier (additional information 27 on
    /// majors 0..=5) is outside the supported subset.
    #[error("unsupported 64-bit payload at byte {position}")]
    Unsupported64Bit { position: usize },
    /// Tagged values (major type 6) are outside the supported subset.
    #[error("unsupported tag {tag}")]
    UnsupportedTag { tag: u64 },
    /// An indefinite-length string contained a chunk of a different
    /// major type, or a nested indefinite chunk.
    #[error("invalid chunk in indefinite-length item: expected major {expected}, got byte {actual:#04x}")]
    InvalidChunk { expected: u8, actual: u8 },
    /// Reserved simple value (major 7, one-byte form below 32).
    #[error("invalid simple value {value}")]
    InvalidSimpleValue { value: u8 },
    /// Integer magnitude exceeds the 4-byte tier.
    #[error("integer {value} exceeds the maximum encodable magnitude {MAX_PAYLOAD}")]
    IntegerTooLarge { value: i64 },
    /// String byte length exceeds the 4-byte tier.
    #[error("string of {size} bytes exceeds the maximum encodable length {MAX_PAYLOAD}")]
    StringTooLarge { size: usize },
    /// Array length exceeds the 4-byte tier.
    #[error("array of {size} elements exceeds the maximum encodable length {MAX_PAYLOAD}")]
    ArrayTooLarge { size: usize },
    /// Map length exceeds the 4-byte tier.
    #[error("map of {size} entries exceeds the maximum encodable length {MAX_PAYLOAD}")]
    MapTooLarge { size: usize },
    /// A text string was not valid UTF-8.
    #[error("invalid UTF-8 in text string")]
    InvalidUtf8,
    /// Input ended before the value was complete.
    #[error(transparent)]
    UnexpectedEnd(#[from] CursorError),
    /// A complete value was decoded but input bytes remained.
    #[error("{remaining} trailing bytes after value")]
    TrailingBytes { remaining: usize },
    /// Hex input to [`decode_hex`] was malformed.
    #[error("invalid hex input")]
    InvalidHex,
}

/// Encodes a value and formats the result as a `0x`-prefixed hex string.
pub fn encode_hex(value: &Value) -> Result<String, CborError> {
    Ok(alloy_primitives::hex::encode_prefixed(encode(value)?))
}

/// Decodes a value from a hex string, with or without a `0x` prefix.
pub fn decode_hex(data: &str) -> Result<Value, CborError> {
    let bytes = alloy_primitives::hex::decode(data).map_err(|_| CborError::InvalidHex)?;
    decode(&bytes)
}
