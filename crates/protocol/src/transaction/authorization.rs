//! EIP-7702 authorizations signed with Tempo envelopes.
//!
//! The unsigned tuple and its `0x05`-prefixed signing hash come from
//! [`alloy_eips::eip7702::Authorization`]; this module pairs it with a
//! [`SignatureEnvelope`] instead of a bare secp256k1 signature so
//! delegations can be approved by any Tempo signature scheme.

use alloy_eips::eip7702::Authorization;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, Header};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

use super::signature::{SignatureEnvelope, SignatureError};

/// An [`Authorization`] with a Tempo signature attached.
///
/// Encoded as `[chainId, address, nonce, signature]` with the signature
/// element carrying the envelope's binary serialization.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoSignedAuthorization {
    #[serde(flatten)]
    inner: Authorization,
    signature: SignatureEnvelope,
}

impl TempoSignedAuthorization {
    /// Pairs an authorization with a signature without validating it.
    pub const fn new_unchecked(inner: Authorization, signature: SignatureEnvelope) -> Self {
        Self { inner, signature }
    }

    /// The unsigned authorization tuple.
    pub const fn inner(&self) -> &Authorization {
        &self.inner
    }

    /// The attached signature.
    pub const fn signature(&self) -> &SignatureEnvelope {
        &self.signature
    }

    /// Splits into the authorization and its signature.
    pub fn into_parts(self) -> (Authorization, SignatureEnvelope) {
        (self.inner, self.signature)
    }

    /// Account that signed the delegation.
    pub fn recover_authority(&self) -> Result<Address, SignatureError> {
        self.signature.recover_signer(&self.inner.signature_hash())
    }

    /// Hash of the signed tuple, signature included.
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(self.length());
        self.encode(&mut buf);
        keccak256(&buf)
    }

    fn payload_length(&self) -> usize {
        let signature_length = Header {
            list: false,
            payload_length: self.signature.serialized_len(),
        }
        .length_with_payload();
        self.inner.chain_id.length()
            + self.inner.address.length()
            + self.inner.nonce.length()
            + signature_length
    }
}

impl Deref for TempoSignedAuthorization {
    type Target = Authorization;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Encodable for TempoSignedAuthorization {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        Header { list: true, payload_length: self.payload_length() }.encode(out);
        self.inner.chain_id.encode(out);
        self.inner.address.encode(out);
        self.inner.nonce.encode(out);
        self.signature.serialize(false).encode(out);
    }

    fn length(&self) -> usize {
        Header { list: true, payload_length: self.payload_length() }.length_with_payload()
    }
}

impl Decodable for TempoSignedAuthorization {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        if header.payload_length > buf.len() {
            return Err(alloy_rlp::Error::InputTooShort);
        }
        let mut fields = &buf[..header.payload_length];
        *buf = &buf[header.payload_length..];

        let inner = Authorization {
            chain_id: U256::decode(&mut fields)?,
            address: Address::decode(&mut fields)?,
            nonce: u64::decode(&mut fields)?,
        };
        let raw_signature = Bytes::decode(&mut fields)?;
        if !fields.is_empty() {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }
        let signature = SignatureEnvelope::deserialize(&raw_signature)
            .map_err(|_| alloy_rlp::Error::Custom("invalid signature envelope"))?;

        Ok(Self { inner, signature })
    }
}
