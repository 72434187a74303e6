//! Polymorphic signature envelope.
//!
//! Tempo transactions accept four signature schemes behind one binary
//! layout. The wire format is discriminated by length and a leading type
//! byte:
//!
//! - secp256k1: bare 65 bytes, `r ‖ s ‖ yParity`, no type byte
//! - P256: `0x01 ‖ r ‖ s ‖ x ‖ y ‖ prehash` (130 bytes)
//! - WebAuthn: `0x02 ‖ authenticatorData ‖ clientDataJSON ‖ r ‖ s ‖ x ‖ y`
//! - keychain: `0x03 ‖ userAddress ‖ innerSignature` (inner never keychain)
//!
//! An optional 34-byte magic suffix of repeated `0x77` marks envelopes in
//! contexts where a raw secp256k1 signature is also accepted; the decoder
//! strips it when present.

use alloy_primitives::{keccak256, Address, Bytes, Signature, B256, U256};
use alloy_rlp::{Decodable, Encodable};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p256::ecdsa::signature::{hazmat::PrehashVerifier, Verifier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::trace;

/// Length of a bare secp256k1 signature.
pub const SECP256K1_SIGNATURE_LENGTH: usize = 65;

/// Length of a serialized P256 signature, type byte included.
pub const P256_SIGNATURE_LENGTH: usize = 130;

/// Minimum length of WebAuthn authenticator data (rpIdHash ‖ flags ‖ counter).
pub const WEBAUTHN_AUTH_DATA_MIN_LENGTH: usize = 37;

/// Type byte for P256 signatures.
pub const SIGNATURE_TYPE_P256: u8 = 0x01;
/// Type byte for WebAuthn signatures.
pub const SIGNATURE_TYPE_WEBAUTHN: u8 = 0x02;
/// Type byte for keychain signatures.
pub const SIGNATURE_TYPE_KEYCHAIN: u8 = 0x03;

/// Suffix appended to serialized envelopes in contexts where a bare
/// secp256k1 signature is also accepted.
pub const SIGNATURE_MAGIC_BYTES: [u8; 34] = [0x77; 34];

/// Signature scheme discriminant.
///
/// The numeric values are the wire identifiers used both as envelope type
/// bytes and as the `keyType` of a key authorization. Keychain is an
/// envelope-only scheme: it delegates to an inner signature and is never a
/// valid key type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignatureType {
    Secp256k1 = 0,
    P256 = 1,
    WebAuthn = 2,
    Keychain = 3,
}

impl Encodable for SignatureType {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        (*self as u8).encode(out);
    }

    fn length(&self) -> usize {
        (*self as u8).length()
    }
}

impl Decodable for SignatureType {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        match u8::decode(buf)? {
            0 => Ok(Self::Secp256k1),
            1 => Ok(Self::P256),
            2 => Ok(Self::WebAuthn),
            _ => Err(alloy_rlp::Error::Custom("invalid key type identifier")),
        }
    }
}

/// Uncompressed P256 public key as affine coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct P256PublicKey {
    pub x: B256,
    pub y: B256,
}

impl P256PublicKey {
    /// Address bound to this key: `keccak256(x ‖ y)[12..]`.
    pub fn address(&self) -> Address {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(self.x.as_slice());
        buf[32..].copy_from_slice(self.y.as_slice());
        Address::from_slice(&keccak256(buf)[12..])
    }

    /// SEC1 uncompressed encoding, `0x04 ‖ x ‖ y`.
    fn to_sec1_bytes(self) -> [u8; 65] {
        let mut buf = [0u8; 65];
        buf[0] = 0x04;
        buf[1..33].copy_from_slice(self.x.as_slice());
        buf[33..].copy_from_slice(self.y.as_slice());
        buf
    }
}

/// A P256 signature with its public key.
///
/// `prehash` marks signatures made over an externally hashed payload: when
/// set, verification treats the payload as the digest instead of hashing
/// it with SHA-256 first.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct P256Signature {
    pub r: U256,
    pub s: U256,
    pub public_key: P256PublicKey,
    pub prehash: bool,
}

/// WebAuthn assertion metadata.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebAuthnMetadata {
    /// Raw authenticator data, at least 37 bytes.
    pub authenticator_data: Bytes,
    /// Client data JSON exactly as signed by the authenticator.
    pub client_data_json: String,
}

/// A WebAuthn assertion: P256 signature plus the authenticator metadata
/// needed to reconstruct the signed message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WebAuthnSignature {
    pub r: U256,
    pub s: U256,
    pub public_key: P256PublicKey,
    pub metadata: WebAuthnMetadata,
}

/// A signature made by an access key on behalf of a user account.
///
/// `user_address` names the account the signature acts for; the inner
/// signature is any non-keychain envelope produced by the access key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeychainSignature {
    pub user_address: Address,
    pub inner: Box<SignatureEnvelope>,
}

/// Errors from envelope parsing, validation and verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("unknown signature type byte {0:#04x}")]
    UnknownTypeByte(u8),
    #[error("unknown signature type {0:?}")]
    UnknownType(String),
    #[error("invalid {kind} signature length: {len} bytes")]
    InvalidLength { kind: &'static str, len: usize },
    #[error("invalid signature values")]
    InvalidSignature,
    #[error("unable to locate the client data JSON in a WebAuthn signature")]
    WebAuthnMetadata,
    #[error("keychain signatures cannot wrap another keychain signature")]
    NestedKeychain,
    #[error("keychain signatures cannot be verified directly; verify the inner signature")]
    KeychainVerification,
    #[error("missing signature fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("cannot infer a signature type from the value's shape")]
    UnknownShape,
}

/// The four-scheme signature envelope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SignatureEnvelope {
    Secp256k1(Signature),
    P256(P256Signature),
    WebAuthn(WebAuthnSignature),
    Keychain(KeychainSignature),
}

impl SignatureEnvelope {
    /// Scheme discriminant of this envelope.
    pub const fn signature_type(&self) -> SignatureType {
        match self {
            Self::Secp256k1(_) => SignatureType::Secp256k1,
            Self::P256(_) => SignatureType::P256,
            Self::WebAuthn(_) => SignatureType::WebAuthn,
            Self::Keychain(_) => SignatureType::Keychain,
        }
    }

    /// Serialized length, excluding the magic suffix.
    pub fn serialized_len(&self) -> usize {
        match self {
            Self::Secp256k1(_) => SECP256K1_SIGNATURE_LENGTH,
            Self::P256(_) => P256_SIGNATURE_LENGTH,
            Self::WebAuthn(sig) => {
                1 + sig.metadata.authenticator_data.len()
                    + sig.metadata.client_data_json.len()
                    + 128
            }
            Self::Keychain(sig) => 1 + 20 + sig.inner.serialized_len(),
        }
    }

    /// Serializes the envelope, optionally appending the magic suffix.
    pub fn serialize(&self, magic: bool) -> Bytes {
        let mut out =
            Vec::with_capacity(self.serialized_len() + if magic { SIGNATURE_MAGIC_BYTES.len() } else { 0 });
        self.write_to(&mut out);
        if magic {
            out.extend_from_slice(&SIGNATURE_MAGIC_BYTES);
        }
        out.into()
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Secp256k1(sig) => {
                out.extend_from_slice(&sig.r().to_be_bytes::<32>());
                out.extend_from_slice(&sig.s().to_be_bytes::<32>());
                out.push(sig.v() as u8);
            }
            Self::P256(sig) => {
                out.push(SIGNATURE_TYPE_P256);
                out.extend_from_slice(&sig.r.to_be_bytes::<32>());
                out.extend_from_slice(&sig.s.to_be_bytes::<32>());
                out.extend_from_slice(sig.public_key.x.as_slice());
                out.extend_from_slice(sig.public_key.y.as_slice());
                out.push(sig.prehash as u8);
            }
            Self::WebAuthn(sig) => {
                out.push(SIGNATURE_TYPE_WEBAUTHN);
                out.extend_from_slice(&sig.metadata.authenticator_data);
                out.extend_from_slice(sig.metadata.client_data_json.as_bytes());
                out.extend_from_slice(&sig.r.to_be_bytes::<32>());
                out.extend_from_slice(&sig.s.to_be_bytes::<32>());
                out.extend_from_slice(sig.public_key.x.as_slice());
                out.extend_from_slice(sig.public_key.y.as_slice());
            }
            Self::Keychain(sig) => {
                out.push(SIGNATURE_TYPE_KEYCHAIN);
                out.extend_from_slice(sig.user_address.as_slice());
                sig.inner.write_to(out);
            }
        }
    }

    /// Parses an envelope from its binary form.
    ///
    /// A trailing magic suffix is stripped if present. A 65-byte input is
    /// always a bare secp256k1 signature; anything else dispatches on the
    /// leading type byte.
    pub fn deserialize(data: &[u8]) -> Result<Self, SignatureError> {
        let data = match data.strip_suffix(&SIGNATURE_MAGIC_BYTES) {
            Some(stripped) if !stripped.is_empty() => stripped,
            _ => data,
        };

        if data.len() == SECP256K1_SIGNATURE_LENGTH {
            return Self::parse_secp256k1(data);
        }
        match data.first() {
            Some(&SIGNATURE_TYPE_P256) => Self::parse_p256(data),
            Some(&SIGNATURE_TYPE_WEBAUTHN) => Self::parse_webauthn(data),
            Some(&SIGNATURE_TYPE_KEYCHAIN) => Self::parse_keychain(data),
            Some(&byte) => Err(SignatureError::UnknownTypeByte(byte)),
            None => Err(SignatureError::InvalidLength { kind: "signature", len: 0 }),
        }
    }

    fn parse_secp256k1(data: &[u8]) -> Result<Self, SignatureError> {
        let r = U256::from_be_slice(&data[..32]);
        let s = U256::from_be_slice(&data[32..64]);
        let parity = match data[64] {
            0 | 27 => false,
            1 | 28 => true,
            _ => return Err(SignatureError::InvalidSignature),
        };
        Ok(Self::Secp256k1(Signature::new(r, s, parity)))
    }

    fn parse_p256(data: &[u8]) -> Result<Self, SignatureError> {
        if data.len() != P256_SIGNATURE_LENGTH {
            return Err(SignatureError::InvalidLength { kind: "p256", len: data.len() });
        }
        let prehash = match data[129] {
            0 => false,
            1 => true,
            _ => return Err(SignatureError::InvalidSignature),
        };
        Ok(Self::P256(P256Signature {
            r: U256::from_be_slice(&data[1..33]),
            s: U256::from_be_slice(&data[33..65]),
            public_key: P256PublicKey {
                x: B256::from_slice(&data[65..97]),
                y: B256::from_slice(&data[97..129]),
            },
            prehash,
        }))
    }

    /// WebAuthn payloads interleave two variable-length fields with no
    /// length prefix. The authenticator data is at least 37 bytes and the
    /// client data JSON is a JSON object, so the boundary is found by
    /// scanning for the first offset past 37 whose remainder parses as a
    /// JSON object.
    fn parse_webauthn(data: &[u8]) -> Result<Self, SignatureError> {
        let payload = &data[1..];
        if payload.len() <= WEBAUTHN_AUTH_DATA_MIN_LENGTH + 128 {
            return Err(SignatureError::InvalidLength { kind: "webAuthn", len: data.len() });
        }
        let (meta, tail) = payload.split_at(payload.len() - 128);

        let mut parsed = None;
        for split in WEBAUTHN_AUTH_DATA_MIN_LENGTH..meta.len() {
            let candidate = &meta[split..];
            if candidate.first() != Some(&b'{') || candidate.last() != Some(&b'}') {
                continue;
            }
            let Ok(text) = core::str::from_utf8(candidate) else { continue };
            if serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(text).is_ok() {
                trace!(split, "located webauthn client data boundary");
                parsed = Some((meta[..split].to_vec(), text.to_owned()));
                break;
            }
        }
        let (authenticator_data, client_data_json) =
            parsed.ok_or(SignatureError::WebAuthnMetadata)?;

        Ok(Self::WebAuthn(WebAuthnSignature {
            r: U256::from_be_slice(&tail[..32]),
            s: U256::from_be_slice(&tail[32..64]),
            public_key: P256PublicKey {
                x: B256::from_slice(&tail[64..96]),
                y: B256::from_slice(&tail[96..128]),
            },
            metadata: WebAuthnMetadata {
                authenticator_data: authenticator_data.into(),
                client_data_json,
            },
        }))
    }

    fn parse_keychain(data: &[u8]) -> Result<Self, SignatureError> {
        if data.len() < 1 + 20 + SECP256K1_SIGNATURE_LENGTH {
            return Err(SignatureError::InvalidLength { kind: "keychain", len: data.len() });
        }
        let user_address = Address::from_slice(&data[1..21]);
        let inner = Self::deserialize(&data[21..])?;
        if matches!(inner, Self::Keychain(_)) {
            return Err(SignatureError::NestedKeychain);
        }
        Ok(Self::Keychain(KeychainSignature { user_address, inner: Box::new(inner) }))
    }

    /// Structural validity check.
    ///
    /// Scheme-specific signature math is left to [`verify`](Self::verify);
    /// this only enforces envelope invariants, currently the keychain
    /// nesting rule.
    pub fn check(&self) -> Result<(), SignatureError> {
        match self {
            Self::Keychain(sig) => match sig.inner.as_ref() {
                Self::Keychain(_) => Err(SignatureError::NestedKeychain),
                inner => inner.check(),
            },
            _ => Ok(()),
        }
    }

    /// Boolean form of [`check`](Self::check).
    pub fn is_valid(&self) -> bool {
        self.check().is_ok()
    }

    /// Address this signature stands for.
    ///
    /// secp256k1 recovers via ecrecover over the payload hash; P256 and
    /// WebAuthn derive the address from the attached public key; keychain
    /// resolves to the user account the access key acts for.
    pub fn recover_signer(&self, payload_hash: &B256) -> Result<Address, SignatureError> {
        match self {
            Self::Secp256k1(sig) => sig
                .recover_address_from_prehash(payload_hash)
                .map_err(|_| SignatureError::InvalidSignature),
            Self::P256(sig) => Ok(sig.public_key.address()),
            Self::WebAuthn(sig) => Ok(sig.public_key.address()),
            Self::Keychain(sig) => Ok(sig.user_address),
        }
    }

    /// Verifies the signature over `payload` against `address`.
    ///
    /// Returns `Ok(false)` on any mismatch (wrong address, bad challenge,
    /// failed signature math). Keychain envelopes cannot be verified
    /// directly: the caller must resolve the access key and verify the
    /// inner signature against it.
    pub fn verify(&self, payload: &[u8], address: Address) -> Result<bool, SignatureError> {
        match self {
            Self::Secp256k1(sig) => {
                if payload.len() != 32 {
                    return Ok(false);
                }
                let hash = B256::from_slice(payload);
                Ok(sig.recover_address_from_prehash(&hash).is_ok_and(|signer| signer == address))
            }
            Self::P256(sig) => {
                if sig.public_key.address() != address {
                    return Ok(false);
                }
                let Some((key, signature)) = p256_parts(&sig.public_key, sig.r, sig.s) else {
                    return Ok(false);
                };
                if sig.prehash {
                    Ok(key.verify_prehash(payload, &signature).is_ok())
                } else {
                    Ok(key.verify(payload, &signature).is_ok())
                }
            }
            Self::WebAuthn(sig) => {
                if sig.public_key.address() != address {
                    return Ok(false);
                }
                if !challenge_matches(&sig.metadata.client_data_json, payload) {
                    return Ok(false);
                }
                let Some((key, signature)) = p256_parts(&sig.public_key, sig.r, sig.s) else {
                    return Ok(false);
                };
                // Authenticators sign authenticatorData ‖ SHA-256(clientDataJSON).
                let mut message =
                    Vec::with_capacity(sig.metadata.authenticator_data.len() + 32);
                message.extend_from_slice(&sig.metadata.authenticator_data);
                message.extend_from_slice(&Sha256::digest(sig.metadata.client_data_json.as_bytes()));
                Ok(key.verify(&message, &signature).is_ok())
            }
            Self::Keychain(_) => Err(SignatureError::KeychainVerification),
        }
    }
}

impl From<Signature> for SignatureEnvelope {
    fn from(signature: Signature) -> Self {
        Self::Secp256k1(signature)
    }
}

fn p256_parts(
    public_key: &P256PublicKey,
    r: U256,
    s: U256,
) -> Option<(p256::ecdsa::VerifyingKey, p256::ecdsa::Signature)> {
    let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&public_key.to_sec1_bytes()).ok()?;
    let signature =
        p256::ecdsa::Signature::from_scalars(r.to_be_bytes::<32>(), s.to_be_bytes::<32>()).ok()?;
    Some((key, signature))
}

/// Checks that the client data JSON commits to `payload` as its challenge
/// (base64url without padding).
fn challenge_matches(client_data_json: &str, payload: &[u8]) -> bool {
    let Ok(client_data) =
        serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(client_data_json)
    else {
        return false;
    };
    let Some(challenge) = client_data.get("challenge").and_then(|v| v.as_str()) else {
        return false;
    };
    challenge == URL_SAFE_NO_PAD.encode(payload)
}

// JSON-RPC representation.
//
// Serialization always emits the `type` tag; deserialization accepts
// untagged values and falls back to shape inference.

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum RpcSignature {
    #[serde(rename_all = "camelCase")]
    Secp256k1 {
        r: U256,
        s: U256,
        #[serde(with = "alloy_serde::quantity")]
        y_parity: u64,
    },
    #[serde(rename_all = "camelCase")]
    P256 { signature: RpcScalars, public_key: RpcPublicKey, prehash: bool },
    #[serde(rename_all = "camelCase")]
    WebAuthn { signature: RpcScalars, public_key: RpcPublicKey, metadata: WebAuthnMetadata },
    #[serde(rename_all = "camelCase")]
    Keychain { user_address: Address, signature: Box<RpcSignature> },
}

#[derive(Serialize, Deserialize)]
struct RpcScalars {
    r: U256,
    s: U256,
}

#[derive(Serialize, Deserialize)]
struct RpcPublicKey {
    x: U256,
    y: U256,
}

impl From<&P256PublicKey> for RpcPublicKey {
    fn from(key: &P256PublicKey) -> Self {
        Self { x: key.x.into(), y: key.y.into() }
    }
}

impl From<&RpcPublicKey> for P256PublicKey {
    fn from(key: &RpcPublicKey) -> Self {
        Self { x: key.x.into(), y: key.y.into() }
    }
}

impl From<&SignatureEnvelope> for RpcSignature {
    fn from(envelope: &SignatureEnvelope) -> Self {
        match envelope {
            SignatureEnvelope::Secp256k1(sig) => {
                Self::Secp256k1 { r: sig.r(), s: sig.s(), y_parity: sig.v() as u64 }
            }
            SignatureEnvelope::P256(sig) => Self::P256 {
                signature: RpcScalars { r: sig.r, s: sig.s },
                public_key: (&sig.public_key).into(),
                prehash: sig.prehash,
            },
            SignatureEnvelope::WebAuthn(sig) => Self::WebAuthn {
                signature: RpcScalars { r: sig.r, s: sig.s },
                public_key: (&sig.public_key).into(),
                metadata: sig.metadata.clone(),
            },
            SignatureEnvelope::Keychain(sig) => Self::Keychain {
                user_address: sig.user_address,
                signature: Box::new(sig.inner.as_ref().into()),
            },
        }
    }
}

impl Serialize for SignatureEnvelope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RpcSignature::from(self).serialize(serializer)
    }
}

/// Raw RPC value with every field optional, classified after parsing.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRpcSignature {
    r#type: Option<String>,
    r: Option<U256>,
    s: Option<U256>,
    #[serde(with = "alloy_serde::quantity::opt")]
    y_parity: Option<u64>,
    signature: Option<Box<RawRpcSignature>>,
    public_key: Option<RpcPublicKey>,
    prehash: Option<bool>,
    metadata: Option<WebAuthnMetadata>,
    user_address: Option<Address>,
}

impl RawRpcSignature {
    fn classify(&self) -> Result<SignatureType, SignatureError> {
        if let Some(tag) = &self.r#type {
            return match tag.as_str() {
                "secp256k1" => Ok(SignatureType::Secp256k1),
                "p256" => Ok(SignatureType::P256),
                "webAuthn" => Ok(SignatureType::WebAuthn),
                "keychain" => Ok(SignatureType::Keychain),
                other => Err(SignatureError::UnknownType(other.to_owned())),
            };
        }
        if self.y_parity.is_some()
            && self.r.is_some()
            && self.s.is_some()
            && self.public_key.is_none()
        {
            return Ok(SignatureType::Secp256k1);
        }
        if self.public_key.is_some() && self.metadata.is_some() {
            return Ok(SignatureType::WebAuthn);
        }
        if self.public_key.is_some() && self.prehash.is_some() {
            return Ok(SignatureType::P256);
        }
        if self.user_address.is_some() && self.signature.is_some() {
            return Ok(SignatureType::Keychain);
        }
        Err(SignatureError::UnknownShape)
    }

    fn scalars(&self) -> (Option<U256>, Option<U256>) {
        match &self.signature {
            Some(nested) => (nested.r, nested.s),
            None => (None, None),
        }
    }

    fn into_envelope(self) -> Result<SignatureEnvelope, SignatureError> {
        let mut missing = Vec::new();
        match self.classify()? {
            SignatureType::Secp256k1 => {
                note_missing(&mut missing, "r", self.r.is_none());
                note_missing(&mut missing, "s", self.s.is_none());
                note_missing(&mut missing, "yParity", self.y_parity.is_none());
                let (Some(r), Some(s), Some(parity)) = (self.r, self.s, self.y_parity) else {
                    return Err(SignatureError::MissingFields(missing));
                };
                if parity > 1 {
                    return Err(SignatureError::InvalidSignature);
                }
                Ok(SignatureEnvelope::Secp256k1(Signature::new(r, s, parity == 1)))
            }
            SignatureType::P256 => {
                let (r, s) = self.scalars();
                note_missing(&mut missing, "signature.r", r.is_none());
                note_missing(&mut missing, "signature.s", s.is_none());
                note_missing(&mut missing, "publicKey", self.public_key.is_none());
                note_missing(&mut missing, "prehash", self.prehash.is_none());
                let (Some(r), Some(s), Some(key), Some(prehash)) =
                    (r, s, self.public_key, self.prehash)
                else {
                    return Err(SignatureError::MissingFields(missing));
                };
                Ok(SignatureEnvelope::P256(P256Signature {
                    r,
                    s,
                    public_key: (&key).into(),
                    prehash,
                }))
            }
            SignatureType::WebAuthn => {
                let (r, s) = self.scalars();
                note_missing(&mut missing, "signature.r", r.is_none());
                note_missing(&mut missing, "signature.s", s.is_none());
                note_missing(&mut missing, "publicKey", self.public_key.is_none());
                note_missing(&mut missing, "metadata", self.metadata.is_none());
                let (Some(r), Some(s), Some(key), Some(metadata)) =
                    (r, s, self.public_key, self.metadata)
                else {
                    return Err(SignatureError::MissingFields(missing));
                };
                Ok(SignatureEnvelope::WebAuthn(WebAuthnSignature {
                    r,
                    s,
                    public_key: (&key).into(),
                    metadata,
                }))
            }
            SignatureType::Keychain => {
                note_missing(&mut missing, "userAddress", self.user_address.is_none());
                note_missing(&mut missing, "signature", self.signature.is_none());
                let (Some(user_address), Some(raw_inner)) = (self.user_address, self.signature)
                else {
                    return Err(SignatureError::MissingFields(missing));
                };
                let inner = raw_inner.into_envelope()?;
                if matches!(inner, SignatureEnvelope::Keychain(_)) {
                    return Err(SignatureError::NestedKeychain);
                }
                Ok(SignatureEnvelope::Keychain(KeychainSignature {
                    user_address,
                    inner: Box::new(inner),
                }))
            }
        }
    }
}

fn note_missing(missing: &mut Vec<&'static str>, name: &'static str, absent: bool) {
    if absent {
        missing.push(name);
    }
}

impl<'de> Deserialize<'de> for SignatureEnvelope {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawRpcSignature::deserialize(deserializer)?
            .into_envelope()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256, bytes, hex};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use p256::ecdsa::signature::hazmat::PrehashSigner;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::SigningKey;
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use serde_json::json;

    fn p256_key() -> (SigningKey, P256PublicKey) {
        let signing_key = SigningKey::from_bytes(&[7u8; 32].into()).unwrap();
        let point = signing_key.verifying_key().to_encoded_point(false);
        let public_key = P256PublicKey {
            x: B256::from_slice(point.x().unwrap()),
            y: B256::from_slice(point.y().unwrap()),
        };
        (signing_key, public_key)
    }

    fn scalars(signature: &p256::ecdsa::Signature) -> (U256, U256) {
        let bytes = signature.to_bytes();
        (U256::from_be_slice(&bytes[..32]), U256::from_be_slice(&bytes[32..]))
    }

    fn sample_secp() -> SignatureEnvelope {
        SignatureEnvelope::Secp256k1(Signature::new(
            U256::from(0x1111u64),
            U256::from(0x2222u64),
            true,
        ))
    }

    fn sample_p256() -> SignatureEnvelope {
        SignatureEnvelope::P256(P256Signature {
            r: U256::from(1u64),
            s: U256::from(2u64),
            public_key: P256PublicKey {
                x: b256!("0303030303030303030303030303030303030303030303030303030303030303"),
                y: b256!("0404040404040404040404040404040404040404040404040404040404040404"),
            },
            prehash: true,
        })
    }

    fn sample_webauthn() -> SignatureEnvelope {
        SignatureEnvelope::WebAuthn(WebAuthnSignature {
            r: U256::from(5u64),
            s: U256::from(6u64),
            public_key: P256PublicKey {
                x: b256!("0707070707070707070707070707070707070707070707070707070707070707"),
                y: b256!("0808080808080808080808080808080808080808080808080808080808080808"),
            },
            metadata: WebAuthnMetadata {
                authenticator_data: vec![0xaa; 37].into(),
                client_data_json:
                    r#"{"type":"webauthn.get","challenge":"AQID","origin":"https://example.com"}"#
                        .to_owned(),
            },
        })
    }

    fn sample_keychain() -> SignatureEnvelope {
        SignatureEnvelope::Keychain(KeychainSignature {
            user_address: address!("1234567890123456789012345678901234567890"),
            inner: Box::new(sample_secp()),
        })
    }

    #[test]
    fn round_trips_every_variant() {
        for envelope in [sample_secp(), sample_p256(), sample_webauthn(), sample_keychain()] {
            for magic in [false, true] {
                let serialized = envelope.serialize(magic);
                assert_eq!(
                    SignatureEnvelope::deserialize(&serialized).unwrap(),
                    envelope,
                    "magic={magic}",
                );
            }
        }
    }

    #[test]
    fn serialized_lengths() {
        assert_eq!(sample_secp().serialize(false).len(), 65);
        assert_eq!(sample_secp().serialize(true).len(), 65 + 34);
        assert_eq!(sample_p256().serialize(false).len(), 130);
        assert_eq!(sample_keychain().serialize(false).len(), 1 + 20 + 65);
        let keychain_p256 = SignatureEnvelope::Keychain(KeychainSignature {
            user_address: address!("1234567890123456789012345678901234567890"),
            inner: Box::new(sample_p256()),
        });
        assert_eq!(keychain_p256.serialize(false).len(), 151);
        for envelope in [sample_secp(), sample_p256(), sample_webauthn(), sample_keychain()] {
            assert_eq!(envelope.serialize(false).len(), envelope.serialized_len());
        }
    }

    #[test]
    fn bare_65_bytes_is_always_secp256k1() {
        // even when the first byte collides with a type identifier
        let mut raw = [0u8; 65];
        raw[0] = SIGNATURE_TYPE_P256;
        raw[64] = 1;
        let envelope = SignatureEnvelope::deserialize(&raw).unwrap();
        assert_eq!(envelope.signature_type(), SignatureType::Secp256k1);
    }

    #[test]
    fn legacy_v_values_normalize_to_parity() {
        for (v, parity) in [(0u8, false), (1, true), (27, false), (28, true)] {
            let mut raw = [0u8; 65];
            raw[31] = 1;
            raw[63] = 2;
            raw[64] = v;
            let SignatureEnvelope::Secp256k1(sig) =
                SignatureEnvelope::deserialize(&raw).unwrap()
            else {
                panic!("expected secp256k1");
            };
            assert_eq!(sig.v(), parity, "v={v}");
        }
        let mut raw = [0u8; 65];
        raw[64] = 2;
        assert_eq!(
            SignatureEnvelope::deserialize(&raw).unwrap_err(),
            SignatureError::InvalidSignature,
        );
    }

    #[test]
    fn rejects_unknown_type_bytes() {
        assert_eq!(
            SignatureEnvelope::deserialize(&[0x09; 70]).unwrap_err(),
            SignatureError::UnknownTypeByte(0x09),
        );
        assert_eq!(
            SignatureEnvelope::deserialize(&[]).unwrap_err(),
            SignatureError::InvalidLength { kind: "signature", len: 0 },
        );
    }

    #[test]
    fn rejects_wrong_p256_length() {
        let mut raw = sample_p256().serialize(false).to_vec();
        raw.push(0);
        assert_eq!(
            SignatureEnvelope::deserialize(&raw).unwrap_err(),
            SignatureError::InvalidLength { kind: "p256", len: 131 },
        );
    }

    #[test]
    fn rejects_nested_keychain() {
        let mut raw = vec![SIGNATURE_TYPE_KEYCHAIN];
        raw.extend_from_slice(&[0x11; 20]);
        raw.extend_from_slice(&sample_keychain().serialize(false));
        assert_eq!(
            SignatureEnvelope::deserialize(&raw).unwrap_err(),
            SignatureError::NestedKeychain,
        );

        let nested = SignatureEnvelope::Keychain(KeychainSignature {
            user_address: Address::ZERO,
            inner: Box::new(sample_keychain()),
        });
        assert_eq!(nested.check().unwrap_err(), SignatureError::NestedKeychain);
        assert!(!nested.is_valid());
        assert!(sample_keychain().is_valid());
    }

    #[test]
    fn rejects_garbage_webauthn_metadata() {
        // no JSON object boundary anywhere in the metadata region
        let mut raw = vec![SIGNATURE_TYPE_WEBAUTHN];
        raw.extend_from_slice(&[0xaa; 60]);
        raw.extend_from_slice(&[0x01; 128]);
        assert_eq!(
            SignatureEnvelope::deserialize(&raw).unwrap_err(),
            SignatureError::WebAuthnMetadata,
        );
    }

    #[test]
    fn secp256k1_sign_and_verify() {
        let signer = PrivateKeySigner::random();
        let payload = b256!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let signature = signer.sign_hash_sync(&payload).unwrap();
        let envelope = SignatureEnvelope::from(signature);

        assert!(envelope.verify(payload.as_slice(), signer.address()).unwrap());
        assert!(!envelope
            .verify(payload.as_slice(), address!("0000000000000000000000000000000000000001"))
            .unwrap());
        assert_eq!(envelope.recover_signer(&payload).unwrap(), signer.address());

        let round_tripped = SignatureEnvelope::deserialize(&envelope.serialize(true)).unwrap();
        assert!(round_tripped.verify(payload.as_slice(), signer.address()).unwrap());
    }

    #[test]
    fn p256_sign_and_verify_prehashed() {
        let (signing_key, public_key) = p256_key();
        let digest = Sha256::digest(b"tempo payload");
        let signature: p256::ecdsa::Signature = signing_key.sign_prehash(&digest).unwrap();
        let (r, s) = scalars(&signature);
        let envelope =
            SignatureEnvelope::P256(P256Signature { r, s, public_key, prehash: true });

        let owner = public_key.address();
        assert!(envelope.verify(&digest, owner).unwrap());
        assert!(!envelope.verify(&Sha256::digest(b"other payload"), owner).unwrap());
        assert!(!envelope.verify(&digest, Address::ZERO).unwrap());
        assert_eq!(envelope.recover_signer(&B256::ZERO).unwrap(), owner);
    }

    #[test]
    fn p256_sign_and_verify_raw_message() {
        let (signing_key, public_key) = p256_key();
        let message = b"raw message, hashed by the verifier";
        let signature: p256::ecdsa::Signature = signing_key.sign(message);
        let (r, s) = scalars(&signature);
        let envelope =
            SignatureEnvelope::P256(P256Signature { r, s, public_key, prehash: false });

        assert!(envelope.verify(message, public_key.address()).unwrap());
        assert!(!envelope.verify(b"tampered", public_key.address()).unwrap());
    }

    #[test]
    fn webauthn_sign_and_verify() {
        let (signing_key, public_key) = p256_key();
        let payload = b256!("1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef");

        let mut authenticator_data = vec![0u8; 37];
        authenticator_data[32] = 0x05;
        let client_data_json = format!(
            r#"{{"type":"webauthn.get","challenge":"{}","origin":"https://wallet.example"}}"#,
            URL_SAFE_NO_PAD.encode(payload),
        );
        let mut message = authenticator_data.clone();
        message.extend_from_slice(&Sha256::digest(client_data_json.as_bytes()));
        let signature: p256::ecdsa::Signature = signing_key.sign(&message);
        let (r, s) = scalars(&signature);

        let envelope = SignatureEnvelope::WebAuthn(WebAuthnSignature {
            r,
            s,
            public_key,
            metadata: WebAuthnMetadata {
                authenticator_data: authenticator_data.into(),
                client_data_json,
            },
        });

        let owner = public_key.address();
        assert!(envelope.verify(payload.as_slice(), owner).unwrap());
        // challenge commits to the payload
        assert!(!envelope.verify(B256::ZERO.as_slice(), owner).unwrap());
        assert!(!envelope.verify(payload.as_slice(), Address::ZERO).unwrap());

        // the binary layout survives the heuristic metadata split
        let round_tripped = SignatureEnvelope::deserialize(&envelope.serialize(false)).unwrap();
        assert_eq!(round_tripped, envelope);
        assert!(round_tripped.verify(payload.as_slice(), owner).unwrap());
    }

    #[test]
    fn keychain_verification_is_indirect() {
        let payload = [0u8; 32];
        assert_eq!(
            sample_keychain().verify(&payload, Address::ZERO).unwrap_err(),
            SignatureError::KeychainVerification,
        );
        assert_eq!(
            sample_keychain().recover_signer(&B256::ZERO).unwrap(),
            address!("1234567890123456789012345678901234567890"),
        );
    }

    #[test]
    fn rpc_json_round_trips() {
        for envelope in [sample_secp(), sample_p256(), sample_webauthn(), sample_keychain()] {
            let value = serde_json::to_value(&envelope).unwrap();
            let parsed: SignatureEnvelope = serde_json::from_value(value).unwrap();
            assert_eq!(parsed, envelope);
        }
    }

    #[test]
    fn rpc_secp_shape() {
        let value = serde_json::to_value(sample_secp()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "secp256k1",
                "r": "0x1111",
                "s": "0x2222",
                "yParity": "0x1",
            }),
        );
    }

    #[test]
    fn rpc_type_is_inferred_from_shape() {
        let untagged = json!({ "r": "0x1", "s": "0x2", "yParity": "0x0" });
        let parsed: SignatureEnvelope = serde_json::from_value(untagged).unwrap();
        assert_eq!(parsed.signature_type(), SignatureType::Secp256k1);

        let untagged = json!({
            "signature": { "r": "0x1", "s": "0x2" },
            "publicKey": { "x": "0x3", "y": "0x4" },
            "prehash": false,
        });
        let parsed: SignatureEnvelope = serde_json::from_value(untagged).unwrap();
        assert_eq!(parsed.signature_type(), SignatureType::P256);

        let untagged = json!({
            "userAddress": "0x1234567890123456789012345678901234567890",
            "signature": { "r": "0x1", "s": "0x2", "yParity": "0x1" },
        });
        let parsed: SignatureEnvelope = serde_json::from_value(untagged).unwrap();
        assert_eq!(parsed.signature_type(), SignatureType::Keychain);

        let err = serde_json::from_value::<SignatureEnvelope>(json!({ "r": "0x1" })).unwrap_err();
        assert!(err.to_string().contains("shape"), "{err}");
    }

    #[test]
    fn rpc_missing_fields_are_all_reported() {
        let err = serde_json::from_value::<SignatureEnvelope>(json!({ "type": "p256" }))
            .unwrap_err();
        let message = err.to_string();
        for field in ["signature.r", "signature.s", "publicKey", "prehash"] {
            assert!(message.contains(field), "{message}");
        }

        let err =
            serde_json::from_value::<SignatureEnvelope>(json!({ "type": "ed25519" })).unwrap_err();
        assert!(err.to_string().contains("ed25519"), "{err}");
    }

    #[test]
    fn rlp_key_type_rejects_keychain() {
        let mut out = Vec::new();
        SignatureType::WebAuthn.encode(&mut out);
        assert_eq!(SignatureType::decode(&mut out.as_slice()).unwrap(), SignatureType::WebAuthn);

        let mut out = Vec::new();
        3u8.encode(&mut out);
        assert!(SignatureType::decode(&mut out.as_slice()).is_err());
    }

    #[test]
    fn address_derivation_matches_keccak_of_coordinates() {
        let (_, public_key) = p256_key();
        let mut concat = Vec::new();
        concat.extend_from_slice(public_key.x.as_slice());
        concat.extend_from_slice(public_key.y.as_slice());
        assert_eq!(public_key.address(), Address::from_slice(&keccak256(&concat)[12..]));
        // sanity on fixture constants
        let _ = (bytes!("aa"), hex!("bb"));
    }
}
