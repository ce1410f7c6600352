//! Encrypted layer: ordered ciphertext fragments, each bound to a KeyId

use crate::crypto::{AeadAlgorithm, HashAlgorithm, SuiteId};
use crate::error::{CascadeError, Result};
use crate::keyid::{FragmentKeyId, KeyId, KeyIdList};
use crate::protocol::signature::VerificationResult;
use crate::protocol::wire::{WireEncryptedMessage, WireFragment, WireKeyId};
use crate::protocol::KeyType;
use crate::utils::serialization::{pack, unpack};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Per-fragment symmetric parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<ByteBuf>,
}

impl FragmentParams {
    pub fn iv(&self) -> Result<&[u8]> {
        self.iv
            .as_deref()
            .map(|v| v.as_slice())
            .ok_or_else(|| CascadeError::InvalidFormat("fragment has no iv".to_string()))
    }

    pub fn salt(&self) -> Result<&[u8]> {
        self.salt
            .as_deref()
            .map(|v| v.as_slice())
            .ok_or_else(|| CascadeError::InvalidFormat("fragment has no salt".to_string()))
    }
}

/// Caller-chosen encryption options, completed by the suite with whatever
/// it needs to decrypt later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionOptions {
    /// KDF hash for ECDH-ES key derivation (nist)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashAlgorithm>,

    /// AEAD of the session key, recorded for session-key messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aead: Option<AeadAlgorithm>,

    /// Sender ephemeral public key shared by all recipients (nist, SPKI DER)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_public_key: Option<ByteBuf>,
}

/// One ciphertext fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireFragment", into = "WireFragment")]
pub struct RawEncryptedMessage {
    data: Vec<u8>,
    key_id: FragmentKeyId,
    params: FragmentParams,
}

impl RawEncryptedMessage {
    pub fn new(data: Vec<u8>, key_id: impl Into<FragmentKeyId>, params: FragmentParams) -> Self {
        Self {
            data,
            key_id: key_id.into(),
            params,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn key_id(&self) -> &FragmentKeyId {
        &self.key_id
    }

    pub fn params(&self) -> &FragmentParams {
        &self.params
    }

    /// Standalone binary form for transporting a fragment on its own
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        pack(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        unpack(bytes)
    }

    /// Binary form of a detached fragment list
    pub fn list_to_bytes(fragments: &[RawEncryptedMessage]) -> Result<Vec<u8>> {
        pack(fragments)
    }

    pub fn list_from_bytes(bytes: &[u8]) -> Result<Vec<RawEncryptedMessage>> {
        unpack(bytes)
    }
}

impl TryFrom<WireFragment> for RawEncryptedMessage {
    type Error = CascadeError;

    fn try_from(wire: WireFragment) -> Result<Self> {
        let key_id = match wire.key_id {
            WireKeyId::Single(id) => FragmentKeyId::Single(KeyId::new(id.into_vec())?),
            WireKeyId::List(ids) => FragmentKeyId::List(KeyIdList::new(
                ids.into_iter()
                    .map(|id| KeyId::new(id.into_vec()))
                    .collect::<Result<Vec<_>>>()?,
            )?),
        };
        Ok(Self {
            data: wire.data.into_vec(),
            key_id,
            params: wire.params,
        })
    }
}

impl From<RawEncryptedMessage> for WireFragment {
    fn from(fragment: RawEncryptedMessage) -> Self {
        let key_id = match fragment.key_id {
            FragmentKeyId::Single(id) => WireKeyId::Single(ByteBuf::from(id.into_inner())),
            FragmentKeyId::List(list) => WireKeyId::List(
                list.iter()
                    .map(|id| ByteBuf::from(id.as_bytes().to_vec()))
                    .collect(),
            ),
        };
        Self {
            data: ByteBuf::from(fragment.data),
            key_id,
            params: fragment.params,
        }
    }
}

/// Ciphertext of one layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEncryptedMessage", into = "WireEncryptedMessage")]
pub struct EncryptedMessage {
    suite: SuiteId,
    key_type: KeyType,
    fragments: Vec<RawEncryptedMessage>,
    options: EncryptionOptions,
}

impl EncryptedMessage {
    /// An empty fragment list is valid (fragments detached for transport);
    /// a session-key message never holds more than one fragment.
    pub fn new(
        suite: SuiteId,
        key_type: KeyType,
        fragments: Vec<RawEncryptedMessage>,
        options: EncryptionOptions,
    ) -> Result<Self> {
        validate_fragments(key_type, &fragments)?;
        Ok(Self {
            suite,
            key_type,
            fragments,
            options,
        })
    }

    pub fn suite(&self) -> SuiteId {
        self.suite
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn fragments(&self) -> &[RawEncryptedMessage] {
        &self.fragments
    }

    pub fn options(&self) -> &EncryptionOptions {
        &self.options
    }

    pub fn is_detached(&self) -> bool {
        self.fragments.is_empty()
    }

    pub(crate) fn take_fragments(&mut self) -> Vec<RawEncryptedMessage> {
        std::mem::take(&mut self.fragments)
    }

    pub(crate) fn set_fragments(&mut self, fragments: Vec<RawEncryptedMessage>) -> Result<()> {
        validate_fragments(self.key_type, &fragments)?;
        self.fragments = fragments;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        pack(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        unpack(bytes)
    }
}

fn validate_fragments(key_type: KeyType, fragments: &[RawEncryptedMessage]) -> Result<()> {
    match key_type {
        KeyType::PublicKeyEncrypt => Ok(()),
        KeyType::SessionKeyEncrypt if fragments.len() <= 1 => Ok(()),
        KeyType::SessionKeyEncrypt => Err(CascadeError::InvalidFormat(format!(
            "session key message carries {} fragments",
            fragments.len()
        ))),
        KeyType::PublicKeySign => Err(CascadeError::InvalidFormat(
            "public_key_sign is not an encryption key type".to_string(),
        )),
    }
}

impl TryFrom<WireEncryptedMessage> for EncryptedMessage {
    type Error = CascadeError;

    fn try_from(wire: WireEncryptedMessage) -> Result<Self> {
        Self::new(wire.suite, wire.key_type, wire.message, wire.options)
    }
}

impl From<EncryptedMessage> for WireEncryptedMessage {
    fn from(message: EncryptedMessage) -> Self {
        Self {
            suite: message.suite,
            key_type: message.key_type,
            message: message.fragments,
            options: message.options,
        }
    }
}

/// Plaintext recovered from one layer, with the signature results checked
/// alongside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub data: Vec<u8>,
    pub signatures: Vec<VerificationResult>,
}

impl Decrypted {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            signatures: Vec::new(),
        }
    }

    /// `None` when no signature was matched to a key, otherwise whether
    /// every matched one verified.
    pub fn valid(&self) -> Option<bool> {
        crate::protocol::signature::overall_validity(&self.signatures)
    }

    /// The plaintext as UTF-8. The envelope does not record whether the
    /// sender passed text or bytes, so this fails on binary payloads.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.data)
            .map_err(|e| CascadeError::InvalidFormat(format!("plaintext is not UTF-8: {}", e)))
    }
}
