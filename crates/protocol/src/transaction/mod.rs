//! Tempo transaction (EIP-2718 type `0x76`).
//!
//! A batched-call transaction with a two-dimensional nonce, optional fee
//! sponsorship, a validity window, access-key provisioning and EIP-7702
//! style delegations. Signing uses two domains: the sender signs the
//! `0x76`-framed payload (with the fee token blanked when a fee payer will
//! co-sign), while the fee payer signs a distinct `0x78`-framed payload
//! that embeds the sender address and always commits to the fee token.

pub mod authorization;
pub mod key_authorization;
pub mod signature;
pub mod signed;

pub use authorization::TempoSignedAuthorization;
pub use key_authorization::{KeyAuthorization, SignedKeyAuthorization, TokenLimit};
pub use signature::{
    KeychainSignature, P256PublicKey, P256Signature, SignatureEnvelope, SignatureError,
    SignatureType, WebAuthnMetadata, WebAuthnSignature, SIGNATURE_MAGIC_BYTES,
};
pub use signed::TempoSigned;

use alloy_consensus::{crypto::RecoveryError, transaction::SignableTransaction, Transaction, Typed2718};
use alloy_eips::eip2930::AccessList;
use alloy_eips::eip7702::SignedAuthorization;
use alloy_primitives::{keccak256, Address, Bytes, ChainId, Signature, TxKind, B256, U256};
use alloy_rlp::{BufMut, Decodable, Encodable, EMPTY_STRING_CODE};
use thiserror::Error;

/// EIP-2718 type byte of a Tempo transaction.
pub const TEMPO_TX_TYPE_ID: u8 = 0x76;

/// Framing byte of the fee payer's signing payload.
pub const FEE_PAYER_SIGNATURE_MAGIC_BYTE: u8 = 0x78;

#[inline]
fn rlp_header(payload_length: usize) -> alloy_rlp::Header {
    alloy_rlp::Header { list: true, payload_length }
}

/// A single call in a transaction batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    /// Call target; `TxKind::Create` deploys code.
    pub to: TxKind,
    /// Value transferred with the call.
    pub value: U256,
    /// Calldata. Accepted as either `input` or `data` on the RPC surface.
    #[serde(flatten, with = "serde_input")]
    pub input: Bytes,
}

impl Call {
    #[inline]
    fn rlp_header(&self) -> alloy_rlp::Header {
        rlp_header(self.to.length() + self.value.length() + self.input.length())
    }

    fn size(&self) -> usize {
        size_of::<Self>() + self.input.len()
    }
}

impl Encodable for Call {
    fn encode(&self, out: &mut dyn BufMut) {
        self.rlp_header().encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.input.encode(out);
    }

    fn length(&self) -> usize {
        self.rlp_header().length_with_payload()
    }
}

impl Decodable for Call {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let remaining = buf.len();
        if header.payload_length > remaining {
            return Err(alloy_rlp::Error::InputTooShort);
        }
        let this = Self {
            to: Decodable::decode(buf)?,
            value: Decodable::decode(buf)?,
            input: Decodable::decode(buf)?,
        };
        if buf.len() + header.payload_length != remaining {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }
        Ok(this)
    }
}

/// Structural validation failures of a [`TempoTransaction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TxValidationError {
    #[error("calls list cannot be empty")]
    EmptyCalls,
    #[error("chain id must be nonzero")]
    ZeroChainId,
    #[error("valid_before must be greater than valid_after")]
    InvalidValidityWindow,
    #[error("max_priority_fee_per_gas cannot exceed max_fee_per_gas")]
    PriorityFeeExceedsMaxFee,
    #[error("only the first call of the batch may be a CREATE call")]
    CreateNotFirst,
    #[error("calls cannot contain CREATE when the authorization list is non-empty")]
    CreateWithAuthorizationList,
}

impl TxValidationError {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyCalls => "calls list cannot be empty",
            Self::ZeroChainId => "chain id must be nonzero",
            Self::InvalidValidityWindow => "valid_before must be greater than valid_after",
            Self::PriorityFeeExceedsMaxFee => {
                "max_priority_fee_per_gas cannot exceed max_fee_per_gas"
            }
            Self::CreateNotFirst => "only the first call of the batch may be a CREATE call",
            Self::CreateWithAuthorizationList => {
                "calls cannot contain CREATE when the authorization list is non-empty"
            }
        }
    }
}

/// Validates the calls list structure.
///
/// A batch must be non-empty; only its first call may be a CREATE, and no
/// CREATE is allowed at all when delegations are attached (EIP-7702
/// semantics).
pub fn validate_calls(
    calls: &[Call],
    has_authorization_list: bool,
) -> Result<(), TxValidationError> {
    let mut calls_iter = calls.iter();
    let Some(first) = calls_iter.next() else {
        return Err(TxValidationError::EmptyCalls);
    };
    if has_authorization_list && first.to.is_create() {
        return Err(TxValidationError::CreateWithAuthorizationList);
    }
    for call in calls_iter {
        if call.to.is_create() {
            return Err(TxValidationError::CreateNotFirst);
        }
    }
    Ok(())
}

/// The type `0x76` transaction payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoTransaction {
    /// EIP-155 chain id; must be nonzero.
    #[serde(with = "alloy_serde::quantity")]
    pub chain_id: ChainId,

    /// Preferred fee token; `None` leaves the choice to the protocol.
    pub fee_token: Option<Address>,

    /// Max priority fee per gas (EIP-1559).
    #[serde(with = "alloy_serde::quantity")]
    pub max_priority_fee_per_gas: u128,

    /// Max fee per gas (EIP-1559).
    #[serde(with = "alloy_serde::quantity")]
    pub max_fee_per_gas: u128,

    /// Gas limit.
    #[serde(with = "alloy_serde::quantity", rename = "gas", alias = "gasLimit")]
    pub gas_limit: u64,

    /// Calls executed atomically, in order.
    pub calls: Vec<Call>,

    /// Access list (EIP-2930).
    pub access_list: AccessList,

    /// Nonce lane. Key 0 is the protocol nonce; other keys are
    /// independent user lanes for parallel submission.
    pub nonce_key: U256,

    /// Nonce value within the lane.
    #[serde(with = "alloy_serde::quantity")]
    pub nonce: u64,

    /// Fee payer co-signature for sponsored transactions (secp256k1 only).
    pub fee_payer_signature: Option<Signature>,

    /// Latest block timestamp this transaction may be included at.
    #[serde(with = "alloy_serde::quantity::opt")]
    pub valid_before: Option<u64>,

    /// Earliest block timestamp this transaction may be included at.
    #[serde(with = "alloy_serde::quantity::opt")]
    pub valid_after: Option<u64>,

    /// Access key provisioned alongside this transaction. The grant is
    /// installed before the transaction signature is checked, so the
    /// transaction itself may carry a keychain signature from the new key.
    pub key_authorization: Option<SignedKeyAuthorization>,

    /// EIP-7702 style delegations, signed with Tempo envelopes.
    pub authorization_list: Vec<TempoSignedAuthorization>,
}

impl TempoTransaction {
    /// The EIP-2718 type byte.
    #[doc(alias = "transaction_type")]
    pub const fn tx_type() -> u8 {
        TEMPO_TX_TYPE_ID
    }

    /// Validates the structural invariants.
    ///
    /// Note the validity window comparison: `valid_before` must be the
    /// later timestamp, so `valid_before <= valid_after` is the error.
    pub fn validate(&self) -> Result<(), TxValidationError> {
        validate_calls(&self.calls, !self.authorization_list.is_empty())?;
        if self.chain_id == 0 {
            return Err(TxValidationError::ZeroChainId);
        }
        if self.max_priority_fee_per_gas > self.max_fee_per_gas {
            return Err(TxValidationError::PriorityFeeExceedsMaxFee);
        }
        if let (Some(valid_before), Some(valid_after)) = (self.valid_before, self.valid_after) {
            if valid_before <= valid_after {
                return Err(TxValidationError::InvalidValidityWindow);
            }
        }
        Ok(())
    }

    /// Whether [`validate`](Self::validate) passes.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Heuristic in-memory size.
    #[inline]
    pub fn size(&self) -> usize {
        size_of::<Self>()
            + self.calls.iter().map(Call::size).sum::<usize>()
            + self.access_list.size()
    }

    /// Converts into a signed transaction.
    pub fn into_signed(self, signature: SignatureEnvelope) -> TempoSigned {
        TempoSigned::new_unhashed(self, signature)
    }

    /// Hash the sender signs.
    pub fn signature_hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(self.payload_len_for_signature());
        self.encode_for_signing(&mut buf);
        keccak256(&buf)
    }

    /// Hash the fee payer signs to sponsor this transaction.
    ///
    /// Framed with [`FEE_PAYER_SIGNATURE_MAGIC_BYTE`] instead of the
    /// transaction type byte, with `sender` in the fee payer slot and the
    /// fee token always included, binding the sponsorship to a specific
    /// sender and fee token.
    pub fn fee_payer_signature_hash(&self, sender: Address) -> B256 {
        let payload_length = self.rlp_encoded_fields_length(|_| sender.length(), false);
        let mut buf = Vec::with_capacity(1 + rlp_header(payload_length).length_with_payload());
        buf.put_u8(FEE_PAYER_SIGNATURE_MAGIC_BYTE);
        rlp_header(payload_length).encode(&mut buf);
        self.rlp_encode_fields(&mut buf, |_, out| sender.encode(out), false);
        keccak256(&buf)
    }

    /// Recovers the fee payer, falling back to `sender` when the
    /// transaction is not sponsored.
    pub fn recover_fee_payer(&self, sender: Address) -> Result<Address, RecoveryError> {
        match &self.fee_payer_signature {
            Some(fee_payer_signature) => alloy_consensus::crypto::secp256k1::recover_signer(
                fee_payer_signature,
                self.fee_payer_signature_hash(sender),
            ),
            None => Ok(sender),
        }
    }

    /// Length of the fields without a list header. The fee payer slot is
    /// sized by the closure; `skip_fee_token` blanks the fee token element.
    fn rlp_encoded_fields_length(
        &self,
        signature_length: impl FnOnce(&Option<Signature>) -> usize,
        skip_fee_token: bool,
    ) -> usize {
        self.chain_id.length()
            + self.max_priority_fee_per_gas.length()
            + self.max_fee_per_gas.length()
            + self.gas_limit.length()
            + self.calls.length()
            + self.access_list.length()
            + self.nonce_key.length()
            + self.nonce.length()
            + self.valid_before.map_or(1, |v| v.length())
            + self.valid_after.map_or(1, |v| v.length())
            + match self.fee_token {
                Some(addr) if !skip_fee_token => addr.length(),
                _ => 1,
            }
            + signature_length(&self.fee_payer_signature)
            + self.authorization_list.length()
            + self.key_authorization.as_ref().map_or(0, |k| k.length())
    }

    fn rlp_encode_fields(
        &self,
        out: &mut dyn BufMut,
        encode_signature: impl FnOnce(&Option<Signature>, &mut dyn BufMut),
        skip_fee_token: bool,
    ) {
        self.chain_id.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        self.calls.encode(out);
        self.access_list.encode(out);
        self.nonce_key.encode(out);
        self.nonce.encode(out);

        match self.valid_before {
            Some(valid_before) => valid_before.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }
        match self.valid_after {
            Some(valid_after) => valid_after.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }
        match self.fee_token {
            Some(addr) if !skip_fee_token => addr.encode(out),
            _ => out.put_u8(EMPTY_STRING_CODE),
        }

        encode_signature(&self.fee_payer_signature, out);

        self.authorization_list.encode(out);

        // truly optional trailing element, no bytes at all when absent
        if let Some(key_auth) = &self.key_authorization {
            key_auth.encode(out);
        }
    }

    pub(crate) fn rlp_encoded_fields_length_default(&self) -> usize {
        self.rlp_encoded_fields_length(
            |signature| {
                signature.map_or(1, |s| {
                    rlp_header(s.rlp_rs_len() + s.v().length()).length_with_payload()
                })
            },
            false,
        )
    }

    pub(crate) fn rlp_encode_fields_default(&self, out: &mut dyn BufMut) {
        self.rlp_encode_fields(
            out,
            |signature, out| match signature {
                Some(signature) => {
                    let payload_length = signature.rlp_rs_len() + signature.v().length();
                    rlp_header(payload_length).encode(out);
                    signature.write_rlp_vrs(out, signature.v());
                }
                None => out.put_u8(EMPTY_STRING_CODE),
            },
            false,
        )
    }

    /// Decodes the fields of the inner tuple, leaving any trailing
    /// signature element (which is a string, never a list) in `buf`.
    pub(crate) fn rlp_decode_fields(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let chain_id = Decodable::decode(buf)?;
        let max_priority_fee_per_gas = Decodable::decode(buf)?;
        let max_fee_per_gas = Decodable::decode(buf)?;
        let gas_limit = Decodable::decode(buf)?;
        let calls = Decodable::decode(buf)?;
        let access_list = Decodable::decode(buf)?;
        let nonce_key = Decodable::decode(buf)?;
        let nonce = Decodable::decode(buf)?;

        let valid_before = decode_optional_u64(buf)?;
        let valid_after = decode_optional_u64(buf)?;

        let fee_token = match buf.first() {
            None => return Err(alloy_rlp::Error::InputTooShort),
            Some(&EMPTY_STRING_CODE) => {
                *buf = &buf[1..];
                None
            }
            Some(_) => TxKind::decode(buf)?.into_to(),
        };

        let fee_payer_signature = match buf.first() {
            None => return Err(alloy_rlp::Error::InputTooShort),
            Some(&EMPTY_STRING_CODE) => {
                *buf = &buf[1..];
                None
            }
            Some(_) => {
                let header = alloy_rlp::Header::decode(buf)?;
                if buf.len() < header.payload_length {
                    return Err(alloy_rlp::Error::InputTooShort);
                }
                if !header.list {
                    return Err(alloy_rlp::Error::UnexpectedString);
                }
                Some(Signature::decode_rlp_vrs(buf, bool::decode)?)
            }
        };

        let authorization_list = Decodable::decode(buf)?;

        // A key authorization is always a list (first byte >= 0xc0); a
        // trailing signature element is always a string. That distinguishes
        // the 13/14/15-element arities without a tag.
        let key_authorization = match buf.first() {
            Some(&first) if first >= 0xc0 => Some(Decodable::decode(buf)?),
            _ => None,
        };

        let tx = Self {
            chain_id,
            fee_token,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas_limit,
            calls,
            access_list,
            nonce_key,
            nonce,
            fee_payer_signature,
            valid_before,
            valid_after,
            key_authorization,
            authorization_list,
        };
        tx.validate().map_err(|e| alloy_rlp::Error::Custom(e.as_str()))?;
        Ok(tx)
    }
}

/// Absent optional scalars occupy their slot as the empty string; a zero
/// value is wire-identical to absent and decodes as `None`.
fn decode_optional_u64(buf: &mut &[u8]) -> alloy_rlp::Result<Option<u64>> {
    match buf.first() {
        None => Err(alloy_rlp::Error::InputTooShort),
        Some(&EMPTY_STRING_CODE) => {
            *buf = &buf[1..];
            Ok(None)
        }
        Some(_) => Ok(Some(u64::decode(buf)?)),
    }
}

impl Transaction for TempoTransaction {
    #[inline]
    fn chain_id(&self) -> Option<ChainId> {
        Some(self.chain_id)
    }

    #[inline]
    fn nonce(&self) -> u64 {
        self.nonce
    }

    #[inline]
    fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    #[inline]
    fn gas_price(&self) -> Option<u128> {
        None
    }

    #[inline]
    fn max_fee_per_gas(&self) -> u128 {
        self.max_fee_per_gas
    }

    #[inline]
    fn max_priority_fee_per_gas(&self) -> Option<u128> {
        Some(self.max_priority_fee_per_gas)
    }

    #[inline]
    fn max_fee_per_blob_gas(&self) -> Option<u128> {
        None
    }

    #[inline]
    fn priority_fee_or_price(&self) -> u128 {
        self.max_priority_fee_per_gas
    }

    fn effective_gas_price(&self, base_fee: Option<u64>) -> u128 {
        alloy_eips::eip1559::calc_effective_gas_price(
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
            base_fee,
        )
    }

    #[inline]
    fn is_dynamic_fee(&self) -> bool {
        true
    }

    #[inline]
    fn kind(&self) -> TxKind {
        self.calls.first().map(|c| c.to).unwrap_or(TxKind::Create)
    }

    #[inline]
    fn is_create(&self) -> bool {
        self.kind().is_create()
    }

    #[inline]
    fn value(&self) -> U256 {
        self.calls.iter().fold(U256::ZERO, |acc, call| acc.saturating_add(call.value))
    }

    #[inline]
    fn input(&self) -> &Bytes {
        static EMPTY_BYTES: Bytes = Bytes::new();
        self.calls.first().map(|c| &c.input).unwrap_or(&EMPTY_BYTES)
    }

    #[inline]
    fn access_list(&self) -> Option<&AccessList> {
        Some(&self.access_list)
    }

    #[inline]
    fn blob_versioned_hashes(&self) -> Option<&[B256]> {
        None
    }

    #[inline]
    fn authorization_list(&self) -> Option<&[SignedAuthorization]> {
        // delegations carry Tempo envelopes, not bare secp256k1 signatures
        None
    }
}

impl Typed2718 for TempoTransaction {
    fn ty(&self) -> u8 {
        TEMPO_TX_TYPE_ID
    }
}

impl SignableTransaction<Signature> for TempoTransaction {
    fn set_chain_id(&mut self, chain_id: ChainId) {
        self.chain_id = chain_id;
    }

    fn encode_for_signing(&self, out: &mut dyn BufMut) {
        // The sender must not commit to a fee token the fee payer may
        // substitute, so the element is blanked when a co-signature will
        // be attached; the slot itself carries a 0x00 sentinel.
        let skip_fee_token = self.fee_payer_signature.is_some();
        out.put_u8(Self::tx_type());
        let payload_length = self.rlp_encoded_fields_length(|_| 1, skip_fee_token);
        rlp_header(payload_length).encode(out);
        self.rlp_encode_fields(
            out,
            |signature, out| {
                if signature.is_some() {
                    out.put_u8(0);
                } else {
                    out.put_u8(EMPTY_STRING_CODE);
                }
            },
            skip_fee_token,
        );
    }

    fn payload_len_for_signature(&self) -> usize {
        let skip_fee_token = self.fee_payer_signature.is_some();
        let payload_length = self.rlp_encoded_fields_length(|_| 1, skip_fee_token);
        1 + rlp_header(payload_length).length_with_payload()
    }
}

impl Encodable for TempoTransaction {
    fn encode(&self, out: &mut dyn BufMut) {
        rlp_header(self.rlp_encoded_fields_length_default()).encode(out);
        self.rlp_encode_fields_default(out);
    }

    fn length(&self) -> usize {
        rlp_header(self.rlp_encoded_fields_length_default()).length_with_payload()
    }
}

impl Decodable for TempoTransaction {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = alloy_rlp::Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        if header.payload_length > buf.len() {
            return Err(alloy_rlp::Error::InputTooShort);
        }
        let mut fields_buf = &buf[..header.payload_length];
        let this = Self::rlp_decode_fields(&mut fields_buf)?;
        if !fields_buf.is_empty() {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }
        *buf = &buf[header.payload_length..];
        Ok(this)
    }
}

mod serde_input {
    //! Accepts the calldata of a [`Call`](super::Call) under either the
    //! `input` or `data` key; always serializes as `data`.

    use alloy_primitives::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::borrow::Cow;

    #[derive(Serialize, Deserialize)]
    struct SerdeHelper<'a> {
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<Cow<'a, Bytes>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Cow<'a, Bytes>>,
    }

    pub(super) fn serialize<S: Serializer>(input: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        SerdeHelper { input: None, data: Some(Cow::Borrowed(input)) }.serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let helper = SerdeHelper::deserialize(deserializer)?;
        Ok(helper
            .data
            .or(helper.input)
            .map(Cow::into_owned)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_eips::eip7702::Authorization;
    use alloy_primitives::{address, bytes};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    fn call_to(addr: Address) -> Call {
        Call { to: TxKind::Call(addr), value: U256::ZERO, input: Bytes::new() }
    }

    fn base_tx() -> TempoTransaction {
        TempoTransaction {
            chain_id: 1,
            max_priority_fee_per_gas: 100,
            max_fee_per_gas: 1_000,
            gas_limit: 100_000,
            calls: vec![call_to(address!("d8da6bf26964af9d7eed9e03e53415d37aa96045"))],
            nonce: 1,
            ..Default::default()
        }
    }

    fn dummy_delegation() -> TempoSignedAuthorization {
        TempoSignedAuthorization::new_unchecked(
            Authorization {
                chain_id: U256::from(1u64),
                address: address!("2222222222222222222222222222222222222222"),
                nonce: 0,
            },
            SignatureEnvelope::Secp256k1(Signature::new(
                U256::from(1u64),
                U256::from(2u64),
                false,
            )),
        )
    }

    #[test]
    fn validates_the_calls_list() {
        assert_eq!(
            TempoTransaction { calls: vec![], ..base_tx() }.validate().unwrap_err(),
            TxValidationError::EmptyCalls,
        );
        assert!(!TempoTransaction { calls: vec![], ..base_tx() }.is_valid());
        assert!(base_tx().is_valid());

        // CREATE is fine first, invalid anywhere else
        let create = Call { to: TxKind::Create, value: U256::ZERO, input: bytes!("60016000") };
        let callee = address!("1111111111111111111111111111111111111111");
        assert!(TempoTransaction { calls: vec![create.clone(), call_to(callee)], ..base_tx() }
            .validate()
            .is_ok());
        assert_eq!(
            TempoTransaction { calls: vec![call_to(callee), create.clone()], ..base_tx() }
                .validate()
                .unwrap_err(),
            TxValidationError::CreateNotFirst,
        );
        assert_eq!(
            TempoTransaction {
                calls: vec![create],
                authorization_list: vec![dummy_delegation()],
                ..base_tx()
            }
            .validate()
            .unwrap_err(),
            TxValidationError::CreateWithAuthorizationList,
        );
    }

    #[test]
    fn validates_chain_id_and_fee_caps() {
        assert_eq!(
            TempoTransaction { chain_id: 0, ..base_tx() }.validate().unwrap_err(),
            TxValidationError::ZeroChainId,
        );
        assert_eq!(
            TempoTransaction { max_priority_fee_per_gas: 2_000, ..base_tx() }
                .validate()
                .unwrap_err(),
            TxValidationError::PriorityFeeExceedsMaxFee,
        );
    }

    #[test]
    fn validity_window_requires_valid_before_to_be_later() {
        // the guard is valid_before <= valid_after, equality included
        let tx = |before, after| TempoTransaction {
            valid_before: before,
            valid_after: after,
            ..base_tx()
        };
        assert!(tx(Some(200), Some(100)).validate().is_ok());
        assert_eq!(
            tx(Some(100), Some(100)).validate().unwrap_err(),
            TxValidationError::InvalidValidityWindow,
        );
        assert_eq!(
            tx(Some(100), Some(200)).validate().unwrap_err(),
            TxValidationError::InvalidValidityWindow,
        );
        assert!(tx(Some(100), None).validate().is_ok());
        assert!(tx(None, Some(200)).validate().is_ok());
    }

    #[test]
    fn decode_rejects_invalid_transactions() {
        // the encoder is structural; validation happens on decode
        let tx = TempoTransaction { chain_id: 0, ..base_tx() };
        let mut encoded = Vec::new();
        tx.encode(&mut encoded);
        assert!(TempoTransaction::decode(&mut encoded.as_slice()).is_err());
    }

    #[test]
    fn signing_payload_is_type_prefixed() {
        let tx = base_tx();
        let mut buf = Vec::new();
        tx.encode_for_signing(&mut buf);
        assert_eq!(buf[0], TEMPO_TX_TYPE_ID);
        assert_eq!(buf.len(), tx.payload_len_for_signature());
    }

    #[test]
    fn sender_commits_to_the_fee_token_only_when_unsponsored() {
        let fee_token = address!("20c0000000000000000000000000000000000001");
        let other_token = address!("20c0000000000000000000000000000000000002");

        // no fee payer: the fee token is part of the signed payload
        let unsponsored = TempoTransaction { fee_token: Some(fee_token), ..base_tx() };
        let retokened = TempoTransaction { fee_token: Some(other_token), ..base_tx() };
        assert_ne!(unsponsored.signature_hash(), retokened.signature_hash());

        // sponsored: the fee payer may substitute the token, so the
        // sender's payload blanks it
        let sponsor_sig = Signature::new(U256::from(1u64), U256::from(2u64), false);
        let sponsored = TempoTransaction {
            fee_token: Some(fee_token),
            fee_payer_signature: Some(sponsor_sig),
            ..base_tx()
        };
        let sponsored_retokened =
            TempoTransaction { fee_token: Some(other_token), ..sponsored.clone() };
        assert_eq!(sponsored.signature_hash(), sponsored_retokened.signature_hash());
        assert_ne!(sponsored.signature_hash(), unsponsored.signature_hash());
    }

    #[test]
    fn fee_payer_commits_to_fee_token_and_sender() {
        let sender_a = address!("00000000000000000000000000000000000000aa");
        let sender_b = address!("00000000000000000000000000000000000000bb");
        let tx = TempoTransaction {
            fee_token: Some(address!("20c0000000000000000000000000000000000001")),
            ..base_tx()
        };
        assert_ne!(tx.fee_payer_signature_hash(sender_a), tx.fee_payer_signature_hash(sender_b));

        let retokened = TempoTransaction {
            fee_token: Some(address!("20c0000000000000000000000000000000000002")),
            ..tx.clone()
        };
        assert_ne!(
            tx.fee_payer_signature_hash(sender_a),
            retokened.fee_payer_signature_hash(sender_a),
        );
        // and it is a different domain from the sender's payload
        assert_ne!(tx.fee_payer_signature_hash(sender_a), tx.signature_hash());
    }

    #[test]
    fn recover_fee_payer_falls_back_to_the_sender() {
        let sender = address!("00000000000000000000000000000000000000aa");
        assert_eq!(base_tx().recover_fee_payer(sender).unwrap(), sender);

        let fee_payer = PrivateKeySigner::random();
        let mut tx = base_tx();
        tx.fee_payer_signature =
            Some(fee_payer.sign_hash_sync(&tx.fee_payer_signature_hash(sender)).unwrap());
        assert_eq!(tx.recover_fee_payer(sender).unwrap(), fee_payer.address());
        // a different claimed sender breaks recovery
        let other = address!("00000000000000000000000000000000000000bb");
        assert_ne!(tx.recover_fee_payer(other).unwrap(), fee_payer.address());
    }

    #[test]
    fn transaction_trait_views() {
        use alloy_consensus::Transaction as _;
        let mut tx = base_tx();
        tx.calls.push(Call {
            to: TxKind::Call(address!("1111111111111111111111111111111111111111")),
            value: U256::from(7u64),
            input: Bytes::new(),
        });
        assert_eq!(tx.chain_id(), Some(1));
        assert_eq!(tx.kind(), TxKind::Call(address!("d8da6bf26964af9d7eed9e03e53415d37aa96045")));
        assert_eq!(tx.value(), U256::from(7u64));
        assert!(tx.is_dynamic_fee());
        assert_eq!(tx.effective_gas_price(Some(50)), 150);
        assert_eq!(tx.ty(), 0x76);
    }

    #[test]
    fn call_serde_accepts_input_or_data() {
        let call: Call = serde_json::from_value(serde_json::json!({
            "to": "0x1111111111111111111111111111111111111111",
            "value": "0x1",
            "data": "0xabcd",
        }))
        .unwrap();
        assert_eq!(call.input, bytes!("abcd"));

        let call: Call = serde_json::from_value(serde_json::json!({
            "to": "0x1111111111111111111111111111111111111111",
            "value": "0x1",
            "input": "0xabcd",
        }))
        .unwrap();
        assert_eq!(call.input, bytes!("abcd"));
        assert_eq!(serde_json::to_value(&call).unwrap()["data"], "0xabcd");
    }
}
