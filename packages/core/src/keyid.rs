//! Key identifiers
//!
//! A [`KeyId`] names a key without revealing it: a truncated SHA-256 of raw
//! symmetric key bytes, or a truncated public-key thumbprint computed by the
//! owning suite. Ids are compared by bytes, and an id may also match a
//! shorter native identifier (e.g. an 8-byte packet issuer id) when the
//! shorter one is a prefix of the longer one.

use crate::config::Config;
use crate::error::{CascadeError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(#[serde(with = "serde_bytes")] Vec<u8>);

impl KeyId {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(CascadeError::InvalidFormat("empty key id".to_string()));
        }
        Ok(Self(bytes))
    }

    /// Hash of raw symmetric key bytes, truncated to `len`.
    pub fn from_raw_key(raw: &[u8], len: usize) -> Self {
        Self::from_digest(&Sha256::digest(raw), len)
    }

    /// Truncate an already computed thumbprint/fingerprint to `len`.
    pub fn from_digest(digest: &[u8], len: usize) -> Self {
        let len = len.clamp(1, digest.len().max(1));
        Self(digest[..len.min(digest.len())].to_vec())
    }

    /// Hash of raw key bytes with the configured id length.
    pub fn for_session_key(raw: &[u8]) -> Self {
        Self::from_raw_key(raw, Config::global().key_id_length)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Leading `len` bytes, the form used by suites with short native ids.
    pub fn short(&self, len: usize) -> KeyId {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    /// Equal ids always match. Ids of different length match when the
    /// shorter one is a prefix of the longer one and is at least
    /// `min_key_id_match_length` bytes long.
    pub fn matches(&self, other: &KeyId) -> bool {
        if self.0 == other.0 {
            return true;
        }
        let common = self.0.len().min(other.0.len());
        if common < Config::global().min_key_id_match_length {
            return false;
        }
        self.0[..common] == other.0[..common]
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.to_hex())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Non-empty list of key ids, carried by fragments addressed to several
/// recipients at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeyIdList(Vec<KeyId>);

impl KeyIdList {
    pub fn new(ids: Vec<KeyId>) -> Result<Self> {
        if ids.is_empty() {
            return Err(CascadeError::InvalidFormat("empty key id list".to_string()));
        }
        Ok(Self(ids))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyId> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[KeyId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The key id binding of one ciphertext fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentKeyId {
    Single(KeyId),
    List(KeyIdList),
}

impl FragmentKeyId {
    pub fn ids(&self) -> &[KeyId] {
        match self {
            FragmentKeyId::Single(id) => std::slice::from_ref(id),
            FragmentKeyId::List(list) => list.as_slice(),
        }
    }

    pub fn matches(&self, key_id: &KeyId) -> bool {
        self.ids().iter().any(|id| id.matches(key_id))
    }
}

impl From<KeyId> for FragmentKeyId {
    fn from(id: KeyId) -> Self {
        FragmentKeyId::Single(id)
    }
}

impl From<KeyIdList> for FragmentKeyId {
    fn from(list: KeyIdList) -> Self {
        FragmentKeyId::List(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_raw_key_is_deterministic() {
        let a = KeyId::from_raw_key(b"session key", 32);
        let b = KeyId::from_raw_key(b"session key", 32);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, KeyId::from_raw_key(b"other key", 32));
    }

    #[test]
    fn test_from_raw_key_truncates() {
        let full = KeyId::from_raw_key(b"k", 32);
        let short = KeyId::from_raw_key(b"k", 8);
        assert_eq!(short.len(), 8);
        assert_eq!(short.as_bytes(), &full.as_bytes()[..8]);
    }

    #[test]
    fn test_prefix_matching() {
        let full = KeyId::from_raw_key(b"key", 32);
        assert!(full.matches(&full.short(8)));
        assert!(full.short(8).matches(&full));
        // below the minimum prefix length nothing but equality matches
        assert!(!full.matches(&full.short(4)));
        assert!(full.short(4).matches(&full.short(4)));
    }

    #[test]
    fn test_fragment_key_id_list() {
        let a = KeyId::from_raw_key(b"a", 32);
        let b = KeyId::from_raw_key(b"b", 32);
        let c = KeyId::from_raw_key(b"c", 32);
        let fragment: FragmentKeyId = KeyIdList::new(vec![a.clone(), b.clone()]).unwrap().into();
        assert!(fragment.matches(&a));
        assert!(fragment.matches(&b.short(8)));
        assert!(!fragment.matches(&c));
    }

    #[test]
    fn test_empty_ids_rejected() {
        assert!(KeyId::new(Vec::new()).is_err());
        assert!(KeyIdList::new(Vec::new()).is_err());
    }

    proptest! {
        #[test]
        fn prop_distinct_keys_do_not_match(a in any::<[u8; 16]>(), b in any::<[u8; 16]>()) {
            prop_assume!(a != b);
            let ia = KeyId::from_raw_key(&a, 32);
            let ib = KeyId::from_raw_key(&b, 32);
            prop_assert!(!ia.matches(&ib));
            prop_assert!(!ia.short(8).matches(&ib));
        }

        #[test]
        fn prop_any_long_prefix_matches(raw in any::<[u8; 16]>(), len in 8usize..=32) {
            let id = KeyId::from_raw_key(&raw, 32);
            prop_assert!(id.matches(&id.short(len)));
        }
    }
}
