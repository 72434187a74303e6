//! Access-key authorization.
//!
//! A key authorization lets a root account grant an access key the right
//! to sign on its behalf, optionally bounded by an expiry and per-token
//! spending limits. The RLP tuple is
//! `[chainId, keyType, keyId, expiry?, limits?]` with trailing optional
//! elements omitted; when limits are present but expiry is not, the expiry
//! slot carries the empty string so element positions stay fixed.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{
    Decodable, Encodable, Header, RlpDecodable, RlpEncodable, EMPTY_STRING_CODE,
};
use serde::{Deserialize, Serialize};

use super::signature::{SignatureEnvelope, SignatureError, SignatureType};

/// Spending limit for a single fee token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLimit {
    pub token: Address,
    pub limit: U256,
}

/// Grant of signing rights to an access key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAuthorization {
    /// Chain the grant is valid on; zero means any chain.
    #[serde(with = "alloy_serde::quantity")]
    pub chain_id: u64,
    /// Scheme of the access key. Never [`SignatureType::Keychain`].
    pub key_type: SignatureType,
    /// Address form of the access key.
    pub key_id: Address,
    /// Unix timestamp after which the grant is void.
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<u64>,
    /// Per-token spending limits; absent means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<Vec<TokenLimit>>,
}

impl KeyAuthorization {
    fn fields_len(&self) -> usize {
        let mut len = self.chain_id.length() + self.key_type.length() + self.key_id.length();
        match (&self.expiry, &self.limits) {
            (None, None) => {}
            (Some(expiry), None) => len += expiry.length(),
            (expiry, Some(limits)) => {
                len += expiry.map_or(1, |e| e.length());
                len += limits.length();
            }
        }
        len
    }

    /// Whether the grant has no expiry.
    pub const fn never_expires(&self) -> bool {
        self.expiry.is_none()
    }

    /// Whether the grant carries no spending limits.
    pub const fn has_unlimited_spending(&self) -> bool {
        self.limits.is_none()
    }

    /// Hash the root key signs to approve this grant.
    pub fn signature_hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(self.length());
        self.encode(&mut buf);
        keccak256(&buf)
    }

    /// Attaches the root key's signature.
    pub fn into_signed(self, signature: SignatureEnvelope) -> SignedKeyAuthorization {
        SignedKeyAuthorization { authorization: self, signature }
    }
}

impl Encodable for KeyAuthorization {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        Header { list: true, payload_length: self.fields_len() }.encode(out);
        self.chain_id.encode(out);
        self.key_type.encode(out);
        self.key_id.encode(out);
        match (&self.expiry, &self.limits) {
            (None, None) => {}
            (Some(expiry), None) => expiry.encode(out),
            (expiry, Some(limits)) => {
                match expiry {
                    Some(expiry) => expiry.encode(out),
                    None => out.put_u8(EMPTY_STRING_CODE),
                }
                limits.encode(out);
            }
        }
    }

    fn length(&self) -> usize {
        Header { list: true, payload_length: self.fields_len() }.length_with_payload()
    }
}

impl Decodable for KeyAuthorization {
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

        let chain_id = u64::decode(&mut fields)?;
        let key_type = SignatureType::decode(&mut fields)?;
        let key_id = Address::decode(&mut fields)?;
        // absent expiry in a full tuple is the empty string
        let expiry = if fields.is_empty() {
            None
        } else if fields[0] == EMPTY_STRING_CODE {
            fields = &fields[1..];
            None
        } else {
            Some(u64::decode(&mut fields)?)
        };
        let limits =
            if fields.is_empty() { None } else { Some(Vec::<TokenLimit>::decode(&mut fields)?) };
        if !fields.is_empty() {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }

        Ok(Self { chain_id, key_type, key_id, expiry, limits })
    }
}

/// A [`KeyAuthorization`] together with the root key's signature over its
/// [`signature_hash`](KeyAuthorization::signature_hash).
///
/// Encoded as `[[chainId, keyType, keyId, expiry?, limits?], signature]`
/// where the signature element is the envelope's binary serialization.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedKeyAuthorization {
    #[serde(flatten)]
    pub authorization: KeyAuthorization,
    pub signature: SignatureEnvelope,
}

impl SignedKeyAuthorization {
    /// Root account that approved the grant.
    ///
    /// secp256k1 signatures recover via ecrecover; P256 and WebAuthn
    /// resolve to the address of the embedded public key.
    pub fn recover_signer(&self) -> Result<Address, SignatureError> {
        self.signature.recover_signer(&self.authorization.signature_hash())
    }

    fn payload_length(&self) -> usize {
        self.authorization.length() + serialized_signature_length(&self.signature)
    }
}

fn serialized_signature_length(signature: &SignatureEnvelope) -> usize {
    // length of the envelope bytes as an RLP string
    let len = signature.serialized_len();
    Header { list: false, payload_length: len }.length_with_payload()
}

impl Encodable for SignedKeyAuthorization {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        Header { list: true, payload_length: self.payload_length() }.encode(out);
        self.authorization.encode(out);
        self.signature.serialize(false).encode(out);
    }

    fn length(&self) -> usize {
        Header { list: true, payload_length: self.payload_length() }.length_with_payload()
    }
}

impl Decodable for SignedKeyAuthorization {
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

        let authorization = KeyAuthorization::decode(&mut fields)?;
        let raw_signature = Bytes::decode(&mut fields)?;
        if !fields.is_empty() {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }
        let signature = SignatureEnvelope::deserialize(&raw_signature)
            .map_err(|_| alloy_rlp::Error::Custom("invalid signature envelope"))?;

        Ok(Self { authorization, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, Signature, U256};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    fn sample() -> KeyAuthorization {
        KeyAuthorization {
            chain_id: 1,
            key_type: SignatureType::P256,
            key_id: address!("1111111111111111111111111111111111111111"),
            expiry: Some(1_700_000_000),
            limits: Some(vec![TokenLimit {
                token: address!("2222222222222222222222222222222222222222"),
                limit: U256::from(1_000_000u64),
            }]),
        }
    }

    fn round_trip(authorization: KeyAuthorization) {
        let mut encoded = Vec::new();
        authorization.encode(&mut encoded);
        assert_eq!(encoded.len(), authorization.length());
        let decoded = KeyAuthorization::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, authorization);
    }

    #[test]
    fn rlp_round_trips_all_optional_combinations() {
        round_trip(sample());
        round_trip(KeyAuthorization { expiry: None, limits: None, ..sample() });
        round_trip(KeyAuthorization { limits: None, ..sample() });
        round_trip(KeyAuthorization { expiry: None, ..sample() });
        round_trip(KeyAuthorization { limits: Some(vec![]), ..sample() });
        round_trip(KeyAuthorization { chain_id: 0, ..sample() });
    }

    #[test]
    fn absent_expiry_before_limits_encodes_as_empty_string() {
        let authorization = KeyAuthorization { expiry: None, ..sample() };
        let mut encoded = Vec::new();
        authorization.encode(&mut encoded);
        // list header, chain id, key type, 21 bytes of key id, then the slot
        let expiry_offset = 1 + 1 + 1 + 21;
        assert_eq!(encoded[expiry_offset], EMPTY_STRING_CODE);
    }

    #[test]
    fn zero_expiry_decodes_as_absent() {
        let authorization = sample();
        let mut encoded = Vec::new();
        authorization.encode(&mut encoded);
        // rewrite the expiry element (5 bytes: 0x84 + 4-byte value) in place
        let expiry_offset = 1 + 1 + 1 + 21;
        let mut patched = encoded[..expiry_offset].to_vec();
        patched.push(EMPTY_STRING_CODE);
        patched.extend_from_slice(&encoded[expiry_offset + 5..]);
        patched[0] -= 4;
        let decoded = KeyAuthorization::decode(&mut patched.as_slice()).unwrap();
        assert_eq!(decoded.expiry, None);
    }

    #[test]
    fn keychain_is_not_a_key_type() {
        let mut encoded = Vec::new();
        sample().encode(&mut encoded);
        // key type element sits right after the list header and chain id
        assert_eq!(encoded[2], SignatureType::P256 as u8);
        encoded[2] = 3;
        assert!(KeyAuthorization::decode(&mut encoded.as_slice()).is_err());
    }

    #[test]
    fn signature_hash_commits_to_every_field() {
        let base = sample().signature_hash();
        assert_ne!(KeyAuthorization { chain_id: 2, ..sample() }.signature_hash(), base);
        assert_ne!(
            KeyAuthorization { key_type: SignatureType::Secp256k1, ..sample() }.signature_hash(),
            base,
        );
        assert_ne!(KeyAuthorization { expiry: None, ..sample() }.signature_hash(), base);
        assert_ne!(KeyAuthorization { limits: None, ..sample() }.signature_hash(), base);
        assert_eq!(sample().signature_hash(), base);
    }

    #[test]
    fn signed_round_trip_and_recovery() {
        let signer = PrivateKeySigner::random();
        let authorization = sample();
        let signature = signer.sign_hash_sync(&authorization.signature_hash()).unwrap();
        let signed = authorization.into_signed(SignatureEnvelope::from(signature));

        assert_eq!(signed.recover_signer().unwrap(), signer.address());

        let mut encoded = Vec::new();
        signed.encode(&mut encoded);
        assert_eq!(encoded.len(), signed.length());
        let decoded = SignedKeyAuthorization::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, signed);
        assert_eq!(decoded.recover_signer().unwrap(), signer.address());
    }

    #[test]
    fn signed_rejects_garbage_signature_bytes() {
        let mut payload = Vec::new();
        sample().encode(&mut payload);
        // ten bytes starting with an unknown type identifier
        Bytes::from(vec![0x09; 10]).encode(&mut payload);
        let mut encoded = Vec::new();
        Header { list: true, payload_length: payload.len() }.encode(&mut encoded);
        encoded.extend_from_slice(&payload);
        assert!(SignedKeyAuthorization::decode(&mut encoded.as_slice()).is_err());
    }

    #[test]
    fn serde_shape() {
        let signed = sample().into_signed(SignatureEnvelope::Secp256k1(Signature::new(
            U256::from(3u64),
            U256::from(4u64),
            true,
        )));
        let value = serde_json::to_value(&signed).unwrap();
        assert_eq!(value["chainId"], "0x1");
        assert_eq!(value["keyType"], "p256");
        assert_eq!(value["expiry"], "0x6553f100");
        assert_eq!(value["limits"][0]["limit"], "0xf4240");
        assert_eq!(value["signature"]["type"], "secp256k1");
        let parsed: SignedKeyAuthorization = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, signed);
    }
}
