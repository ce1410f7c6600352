//! Detached signatures and verification results

use crate::crypto::keys::PublicKey;
use crate::crypto::{HashAlgorithm, SuiteId};
use crate::error::{CascadeError, Result};
use crate::keyid::KeyId;
use crate::protocol::wire::WireSignature;
use crate::protocol::KeyType;
use crate::utils::serialization::{pack, unpack};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureOptions {
    /// Digest signed by suites that prehash explicitly (nist requires it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashAlgorithm>,
}

/// One signer's signature, `{data, keyId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSignature {
    #[serde(with = "serde_bytes")]
    data: Vec<u8>,
    key_id: KeyId,
}

impl RawSignature {
    pub fn new(data: Vec<u8>, key_id: KeyId) -> Self {
        Self { data, key_id }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireSignature", into = "WireSignature")]
pub struct Signature {
    suite: SuiteId,
    fragments: Vec<RawSignature>,
    options: SignatureOptions,
}

impl Signature {
    pub fn new(suite: SuiteId, fragments: Vec<RawSignature>, options: SignatureOptions) -> Result<Self> {
        if fragments.is_empty() {
            return Err(CascadeError::InvalidFormat("signature without fragments".to_string()));
        }
        if fragments.iter().any(|f| f.key_id.is_empty()) {
            return Err(CascadeError::InvalidFormat("empty key id".to_string()));
        }
        if suite == SuiteId::Nist && options.hash.is_none() {
            return Err(CascadeError::HashMustBeSpecified);
        }
        Ok(Self {
            suite,
            fragments,
            options,
        })
    }

    pub fn suite(&self) -> SuiteId {
        self.suite
    }

    pub fn key_type(&self) -> KeyType {
        KeyType::PublicKeySign
    }

    pub fn fragments(&self) -> &[RawSignature] {
        &self.fragments
    }

    pub fn options(&self) -> &SignatureOptions {
        &self.options
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        pack(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        unpack(bytes)
    }
}

impl TryFrom<WireSignature> for Signature {
    type Error = CascadeError;

    fn try_from(wire: WireSignature) -> Result<Self> {
        if wire.key_type != KeyType::PublicKeySign {
            return Err(CascadeError::InvalidFormat(format!(
                "signature with key type {}",
                wire.key_type
            )));
        }
        Self::new(wire.suite, wire.signatures, wire.options)
    }
}

impl From<Signature> for WireSignature {
    fn from(signature: Signature) -> Self {
        Self {
            suite: signature.suite,
            key_type: KeyType::PublicKeySign,
            signatures: signature.fragments,
            options: signature.options,
        }
    }
}

/// Outcome for one key or one signature fragment. `valid` is `None` when
/// the pair could not be matched at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub key_id: KeyId,
    pub valid: Option<bool>,
}

impl VerificationResult {
    pub fn unverifiable(key_id: KeyId) -> Self {
        Self {
            key_id,
            valid: None,
        }
    }
}

/// Match signature fragments against keys by KeyId and run `check` on
/// every matched pair.
///
/// Fragments no key matches and keys that match no fragment are both
/// reported unverifiable. A matched pair whose check fails, including
/// malformed signature bytes, is reported `false`.
pub fn collect_verification<F>(
    fragments: &[RawSignature],
    keys: &[PublicKey],
    check: F,
) -> Vec<VerificationResult>
where
    F: Fn(&RawSignature, &PublicKey) -> bool,
{
    let mut results = Vec::new();
    let mut key_used = vec![false; keys.len()];

    for fragment in fragments {
        let mut matched = false;
        for (idx, key) in keys.iter().enumerate() {
            if !fragment.key_id().matches(key.key_id()) {
                continue;
            }
            matched = true;
            key_used[idx] = true;
            results.push(VerificationResult {
                key_id: key.key_id().clone(),
                valid: Some(check(fragment, key)),
            });
        }
        if !matched {
            results.push(VerificationResult::unverifiable(fragment.key_id().clone()));
        }
    }

    for (key, used) in keys.iter().zip(key_used) {
        if !used {
            results.push(VerificationResult::unverifiable(key.key_id().clone()));
        }
    }

    results
}

/// Conjunction of all matched results; `None` if nothing was matched.
pub fn overall_validity(results: &[VerificationResult]) -> Option<bool> {
    let mut matched = results.iter().filter_map(|r| r.valid).peekable();
    matched.peek()?;
    Some(matched.all(|v| v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(byte: u8, valid: Option<bool>) -> VerificationResult {
        VerificationResult {
            key_id: KeyId::new(vec![byte; 8]).unwrap(),
            valid,
        }
    }

    #[test]
    fn test_nist_signature_requires_hash() {
        let frag = RawSignature::new(vec![0u8; 64], KeyId::new(vec![1u8; 32]).unwrap());
        let err = Signature::new(SuiteId::Nist, vec![frag.clone()], SignatureOptions::default());
        assert_eq!(err, Err(CascadeError::HashMustBeSpecified));

        let ok = Signature::new(SuiteId::Classic, vec![frag], SignatureOptions::default());
        assert!(ok.is_ok());
    }

    #[test]
    fn test_signature_roundtrip() {
        let signature = Signature::new(
            SuiteId::Nist,
            vec![
                RawSignature::new(vec![1u8; 64], KeyId::new(vec![1u8; 32]).unwrap()),
                RawSignature::new(vec![2u8; 64], KeyId::new(vec![2u8; 32]).unwrap()),
            ],
            SignatureOptions {
                hash: Some(HashAlgorithm::Sha384),
            },
        )
        .unwrap();
        let decoded = Signature::from_bytes(&signature.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, signature);
    }

    #[test]
    fn test_overall_validity() {
        assert_eq!(overall_validity(&[]), None);
        assert_eq!(overall_validity(&[result(1, None)]), None);
        assert_eq!(overall_validity(&[result(1, Some(true)), result(2, None)]), Some(true));
        assert_eq!(
            overall_validity(&[result(1, Some(true)), result(2, Some(false))]),
            Some(false)
        );
    }
}
