// Wire format (MessagePack)
//
// Shapes exactly as they appear in a serialised envelope. Domain types
// convert into these on the way out and are re-validated on the way in.

use crate::crypto::SuiteId;
use crate::protocol::encrypted_message::{EncryptionOptions, FragmentParams, RawEncryptedMessage};
use crate::protocol::signature::{RawSignature, SignatureOptions};
use crate::protocol::KeyType;
use crate::protocol::{EncryptedMessage, Signature};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// A fragment is addressed to one key, or to several at once
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireKeyId {
    Single(ByteBuf),
    List(Vec<ByteBuf>),
}

/// `{data, keyId, params}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFragment {
    pub data: ByteBuf,
    pub key_id: WireKeyId,
    #[serde(default)]
    pub params: FragmentParams,
}

/// `{suite, keyType, message: [...], options}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEncryptedMessage {
    pub suite: SuiteId,
    pub key_type: KeyType,
    pub message: Vec<RawEncryptedMessage>,
    #[serde(default)]
    pub options: EncryptionOptions,
}

/// `{suite, keyType, signatures: [...], options}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSignature {
    pub suite: SuiteId,
    pub key_type: KeyType,
    pub signatures: Vec<RawSignature>,
    #[serde(default)]
    pub options: SignatureOptions,
}

/// One envelope layer, `{message?, signature?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<EncryptedMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}
