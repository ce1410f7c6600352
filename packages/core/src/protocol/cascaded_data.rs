//! Multi-layer envelope
//!
//! Layer 0 is the innermost one (the caller's message), the last layer is
//! the anchor bound to the caller's long-term keys. The only mutations are
//! detaching a layer's ciphertext fragments and reattaching them once.

use crate::error::{CascadeError, Result};
use crate::protocol::wire::WireLayer;
use crate::protocol::{EncryptedMessage, RawEncryptedMessage, Signature};
use crate::utils::serialization::{pack, unpack};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireLayer", into = "WireLayer")]
pub struct CascadedLayer {
    message: Option<EncryptedMessage>,
    signature: Option<Signature>,
}

impl CascadedLayer {
    pub fn new(message: Option<EncryptedMessage>, signature: Option<Signature>) -> Result<Self> {
        if message.is_none() && signature.is_none() {
            return Err(CascadeError::InvalidFormat(
                "layer holds neither message nor signature".to_string(),
            ));
        }
        Ok(Self { message, signature })
    }

    pub fn message(&self) -> Option<&EncryptedMessage> {
        self.message.as_ref()
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }
}

impl TryFrom<WireLayer> for CascadedLayer {
    type Error = CascadeError;

    fn try_from(wire: WireLayer) -> Result<Self> {
        Self::new(wire.message, wire.signature)
    }
}

impl From<CascadedLayer> for WireLayer {
    fn from(layer: CascadedLayer) -> Self {
        Self {
            message: layer.message,
            signature: layer.signature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CascadedData {
    layers: Vec<CascadedLayer>,
}

impl CascadedData {
    pub fn new(layers: Vec<CascadedLayer>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[CascadedLayer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Result<&CascadedLayer> {
        self.layers
            .get(index)
            .ok_or(CascadeError::LayerOutOfRange(index))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Detach layer `index`'s ciphertext fragments, leaving the layer in
    /// place with an empty fragment list.
    pub fn extract(&mut self, index: usize) -> Result<Vec<RawEncryptedMessage>> {
        let message = self.message_mut(index)?;
        Ok(message.take_fragments())
    }

    /// Reattach fragments to a layer whose fragments were detached.
    ///
    /// # Errors
    /// `FragmentsAlreadyPresent` if the layer still holds fragments,
    /// `NoFragmentsToInsert` if `fragments` is empty.
    pub fn insert(&mut self, index: usize, fragments: Vec<RawEncryptedMessage>) -> Result<()> {
        let message = self.message_mut(index)?;
        if !message.fragments().is_empty() {
            return Err(CascadeError::FragmentsAlreadyPresent(index));
        }
        if fragments.is_empty() {
            return Err(CascadeError::NoFragmentsToInsert(index));
        }
        message.set_fragments(fragments)
    }

    fn message_mut(&mut self, index: usize) -> Result<&mut EncryptedMessage> {
        self.layers
            .get_mut(index)
            .ok_or(CascadeError::LayerOutOfRange(index))?
            .message
            .as_mut()
            .ok_or(CascadeError::InvalidEncryptedMessage(index))
    }

    /// Binary envelope: an array of `{message?, signature?}` maps
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        pack(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        unpack(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AeadAlgorithm, HashAlgorithm, SuiteId};
    use crate::keyid::KeyId;
    use crate::protocol::{EncryptionOptions, FragmentParams, KeyType, RawSignature, SignatureOptions};
    use proptest::prelude::*;
    use serde_bytes::ByteBuf;

    fn session_layer(seed: u8) -> CascadedLayer {
        let fragment = RawEncryptedMessage::new(
            vec![seed; 48],
            KeyId::new(vec![seed; 32]).unwrap(),
            FragmentParams {
                iv: Some(ByteBuf::from(vec![seed; 12])),
                salt: None,
            },
        );
        let message = EncryptedMessage::new(
            SuiteId::Classic,
            KeyType::SessionKeyEncrypt,
            vec![fragment],
            EncryptionOptions {
                aead: Some(AeadAlgorithm::ChaCha20Poly1305),
                ..Default::default()
            },
        )
        .unwrap();
        CascadedLayer::new(Some(message), None).unwrap()
    }

    fn signed_layer(seed: u8) -> CascadedLayer {
        let fragments = vec![
            RawEncryptedMessage::new(vec![seed; 40], KeyId::new(vec![1u8; 32]).unwrap(), FragmentParams::default()),
            RawEncryptedMessage::new(vec![seed; 41], KeyId::new(vec![2u8; 32]).unwrap(), FragmentParams::default()),
        ];
        let message = EncryptedMessage::new(
            SuiteId::Nist,
            KeyType::PublicKeyEncrypt,
            fragments,
            EncryptionOptions::default(),
        )
        .unwrap();
        let signature = Signature::new(
            SuiteId::Nist,
            vec![RawSignature::new(vec![seed; 64], KeyId::new(vec![3u8; 32]).unwrap())],
            SignatureOptions {
                hash: Some(HashAlgorithm::Sha256),
            },
        )
        .unwrap();
        CascadedLayer::new(Some(message), Some(signature)).unwrap()
    }

    #[test]
    fn test_layer_needs_content() {
        assert!(CascadedLayer::new(None, None).is_err());
    }

    #[test]
    fn test_extract_insert_is_noop_on_bytes() {
        let mut data = CascadedData::new(vec![session_layer(1), signed_layer(2)]);
        let before = data.to_bytes().unwrap();

        let fragments = data.extract(1).unwrap();
        assert_eq!(fragments.len(), 2);
        assert!(data.layer(1).unwrap().message().unwrap().is_detached());

        // the detached envelope still round-trips with the same layer count
        let detached = CascadedData::from_bytes(&data.to_bytes().unwrap()).unwrap();
        assert_eq!(detached.len(), 2);

        data.insert(1, fragments).unwrap();
        assert_eq!(data.to_bytes().unwrap(), before);
    }

    #[test]
    fn test_insert_only_once() {
        let mut data = CascadedData::new(vec![session_layer(1)]);
        let fragments = data.extract(0).unwrap();
        data.insert(0, fragments.clone()).unwrap();
        assert_eq!(
            data.insert(0, fragments),
            Err(CascadeError::FragmentsAlreadyPresent(0))
        );
    }

    #[test]
    fn test_insert_rejects_empty_list() {
        let mut data = CascadedData::new(vec![session_layer(1)]);
        let fragments = data.extract(0).unwrap();

        assert_eq!(data.insert(0, Vec::new()), Err(CascadeError::NoFragmentsToInsert(0)));
        // the layer is still detached and takes the real fragments afterwards
        assert!(data.layer(0).unwrap().message().unwrap().is_detached());
        data.insert(0, fragments.clone()).unwrap();
        assert_eq!(
            data.insert(0, fragments),
            Err(CascadeError::FragmentsAlreadyPresent(0))
        );
    }

    #[test]
    fn test_out_of_range() {
        let mut data = CascadedData::new(vec![session_layer(1)]);
        assert_eq!(data.extract(3), Err(CascadeError::LayerOutOfRange(3)));
    }

    #[test]
    fn test_fragments_travel_separately() {
        let mut data = CascadedData::new(vec![signed_layer(5)]);
        let fragments = data.extract(0).unwrap();
        let transported = RawEncryptedMessage::list_to_bytes(&fragments).unwrap();
        let received = RawEncryptedMessage::list_from_bytes(&transported).unwrap();
        assert_eq!(received, fragments);
        data.insert(0, received).unwrap();
        assert_eq!(data, CascadedData::new(vec![signed_layer(5)]));
    }

    proptest! {
        #[test]
        fn prop_cascaded_data_roundtrip(seeds in proptest::collection::vec(any::<u8>(), 1..5), signed in any::<bool>()) {
            let layers = seeds
                .iter()
                .map(|&s| if signed { signed_layer(s) } else { session_layer(s) })
                .collect();
            let data = CascadedData::new(layers);
            let decoded = CascadedData::from_bytes(&data.to_bytes().unwrap()).unwrap();
            prop_assert_eq!(decoded, data);
        }
    }
}
