//! Signed Tempo transaction and its EIP-2718 framing.

use alloy_consensus::Typed2718;
use alloy_eips::eip2718::{Decodable2718, Eip2718Result, Encodable2718};
use alloy_primitives::{Address, Bytes, B256};
use alloy_rlp::{BufMut, Decodable, Encodable, Header};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::signature::{SignatureEnvelope, SignatureError};
use super::{TempoTransaction, TEMPO_TX_TYPE_ID};

/// A [`TempoTransaction`] with its sender signature attached.
///
/// The inner tuple is the transaction's fields followed by the signature
/// envelope as a trailing string element; the network form prefixes the
/// `0x76` type byte. The transaction hash is the keccak256 of that typed
/// encoding, computed lazily.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoSigned {
    #[serde(flatten)]
    tx: TempoTransaction,
    signature: SignatureEnvelope,
    #[serde(skip)]
    hash: OnceLock<B256>,
}

impl PartialEq for TempoSigned {
    fn eq(&self, other: &Self) -> bool {
        self.tx == other.tx && self.signature == other.signature
    }
}

impl Eq for TempoSigned {}

impl TempoSigned {
    /// Pairs a transaction with a signature without computing the hash.
    pub fn new_unhashed(tx: TempoTransaction, signature: SignatureEnvelope) -> Self {
        Self { tx, signature, hash: OnceLock::new() }
    }

    /// The unsigned transaction.
    pub const fn tx(&self) -> &TempoTransaction {
        &self.tx
    }

    /// The sender's signature envelope.
    pub const fn signature(&self) -> &SignatureEnvelope {
        &self.signature
    }

    /// Transaction hash: keccak256 of the `0x76`-prefixed encoding.
    pub fn hash(&self) -> &B256 {
        self.hash.get_or_init(|| self.trie_hash())
    }

    /// Splits into the transaction and its signature.
    pub fn into_parts(self) -> (TempoTransaction, SignatureEnvelope) {
        (self.tx, self.signature)
    }

    /// Hash the sender signed.
    pub fn signature_hash(&self) -> B256 {
        self.tx.signature_hash()
    }

    /// Recovers the sender.
    ///
    /// For keychain signatures this is the user account the access key
    /// acts for; actual key validity is checked by the protocol against
    /// the account keychain.
    pub fn recover_signer(&self) -> Result<Address, SignatureError> {
        self.signature.recover_signer(&self.tx.signature_hash())
    }

    fn rlp_payload_length(&self) -> usize {
        let signature_length = Header {
            list: false,
            payload_length: self.signature.serialized_len(),
        }
        .length_with_payload();
        self.tx.rlp_encoded_fields_length_default() + signature_length
    }
}

impl Typed2718 for TempoSigned {
    fn ty(&self) -> u8 {
        TEMPO_TX_TYPE_ID
    }
}

impl Encodable for TempoSigned {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.rlp_payload_length() }.encode(out);
        self.tx.rlp_encode_fields_default(out);
        self.signature.serialize(false).encode(out);
    }

    fn length(&self) -> usize {
        Header { list: true, payload_length: self.rlp_payload_length() }.length_with_payload()
    }
}

impl Decodable for TempoSigned {
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

        let tx = TempoTransaction::rlp_decode_fields(&mut fields)?;
        let raw_signature = Bytes::decode(&mut fields)?;
        if !fields.is_empty() {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }
        let signature = SignatureEnvelope::deserialize(&raw_signature)
            .map_err(|_| alloy_rlp::Error::Custom("invalid signature envelope"))?;

        Ok(Self::new_unhashed(tx, signature))
    }
}

impl Encodable2718 for TempoSigned {
    fn type_flag(&self) -> Option<u8> {
        Some(TEMPO_TX_TYPE_ID)
    }

    fn encode_2718_len(&self) -> usize {
        1 + self.length()
    }

    fn encode_2718(&self, out: &mut dyn BufMut) {
        out.put_u8(TEMPO_TX_TYPE_ID);
        self.encode(out);
    }
}

impl Decodable2718 for TempoSigned {
    fn typed_decode(ty: u8, buf: &mut &[u8]) -> Eip2718Result<Self> {
        if ty != TEMPO_TX_TYPE_ID {
            return Err(alloy_eips::eip2718::Eip2718Error::UnexpectedType(ty));
        }
        Ok(Self::decode(buf)?)
    }

    fn fallback_decode(_buf: &mut &[u8]) -> Eip2718Result<Self> {
        Err(alloy_rlp::Error::Custom("tempo transactions are always typed").into())
    }
}
