//! Tempo Protocol Types
//!
//! Core types and codecs for the Tempo blockchain protocol: the type
//! `0x76` transaction with its polymorphic signature envelope, access-key
//! and EIP-7702 authorizations, the CBOR codec used for off-chain
//! payloads, and the tick/price codec for stablecoin exchange rates.

pub mod cbor;
pub mod cursor;
pub mod tick;
pub mod transaction;

pub use cursor::{Cursor, CursorError};
pub use tick::{price_to_tick, tick_to_price, TickError, MAX_TICK, MIN_TICK};
pub use transaction::{
    Call, KeyAuthorization, KeychainSignature, P256PublicKey, P256Signature, SignatureEnvelope,
    SignatureError, SignatureType, SignedKeyAuthorization, TempoSigned, TempoSignedAuthorization,
    TempoTransaction, TokenLimit, TxValidationError, WebAuthnMetadata, WebAuthnSignature,
    FEE_PAYER_SIGNATURE_MAGIC_BYTE, TEMPO_TX_TYPE_ID,
};
pub use transaction::signature::{
    P256_SIGNATURE_LENGTH, SECP256K1_SIGNATURE_LENGTH, SIGNATURE_MAGIC_BYTES,
};
