// Ключевые объекты
//
// Keys are opaque outside their suite: callers only see the suite tag and
// the KeyId, the suite matches on the material.

use crate::config::Config;
use crate::crypto::suites::classic::{ClassicPublicKey, ClassicSecretKey};
use crate::crypto::suites::ec::{NistPublicKey, NistSecretKey};
use crate::crypto::{AeadAlgorithm, SuiteId};
use crate::error::{CascadeError, Result};
use crate::keyid::KeyId;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "P-521")]
    P521,
    #[serde(rename = "Curve25519")]
    Curve25519,
}

impl Curve {
    /// Name as it appears in key params and JWK `crv`
    pub fn name(self) -> &'static str {
        match self {
            Curve::P256 => "P-256",
            Curve::P384 => "P-384",
            Curve::P521 => "P-521",
            Curve::Curve25519 => "Curve25519",
        }
    }
}

/// What to generate, e.g. `{"type": "ec", "curve": "P-256"}` or
/// `{"type": "session", "length": 32}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KeyParams {
    Session { length: usize },
    Ec { curve: Curve },
}

/// Textual (PEM / armor) or binary (DER / raw container) encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Pem,
    Der,
}

#[derive(Clone)]
pub enum PublicKeyMaterial {
    Nist(NistPublicKey),
    Classic(ClassicPublicKey),
}

#[derive(Clone)]
pub enum PrivateKeyMaterial {
    Nist(NistSecretKey),
    Classic(ClassicSecretKey),
}

#[derive(Clone)]
pub struct PublicKey {
    material: PublicKeyMaterial,
    key_id: KeyId,
}

impl PublicKey {
    pub(crate) fn new(material: PublicKeyMaterial, key_id: KeyId) -> Self {
        Self { material, key_id }
    }

    pub fn suite(&self) -> SuiteId {
        match self.material {
            PublicKeyMaterial::Nist(_) => SuiteId::Nist,
            PublicKeyMaterial::Classic(_) => SuiteId::Classic,
        }
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn material(&self) -> &PublicKeyMaterial {
        &self.material
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("suite", &self.suite())
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// A private key always carries its public half so that the KeyId and
/// the encryption/verification counterpart are available without the suite.
#[derive(Clone)]
pub struct PrivateKey {
    material: PrivateKeyMaterial,
    public: PublicKey,
}

impl PrivateKey {
    pub(crate) fn new(material: PrivateKeyMaterial, public: PublicKey) -> Self {
        Self { material, public }
    }

    pub fn suite(&self) -> SuiteId {
        self.public.suite()
    }

    pub fn key_id(&self) -> &KeyId {
        self.public.key_id()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn material(&self) -> &PrivateKeyMaterial {
        &self.material
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("suite", &self.suite())
            .field("key_id", self.key_id())
            .finish_non_exhaustive()
    }
}

/// Symmetric key plus the AEAD it is meant for
#[derive(Clone)]
pub struct SessionKey {
    key: Zeroizing<Vec<u8>>,
    algorithm: AeadAlgorithm,
    key_id: KeyId,
}

impl SessionKey {
    pub const LENGTH: usize = 32;

    pub fn new(key: Vec<u8>, algorithm: AeadAlgorithm) -> Result<Self> {
        let key = Zeroizing::new(key);
        if key.len() != Self::LENGTH {
            return Err(CascadeError::InvalidKeyFormat(format!(
                "session key must be {} bytes, got {}",
                Self::LENGTH,
                key.len()
            )));
        }
        let key_id = KeyId::from_raw_key(&key, Config::global().key_id_length);
        Ok(Self {
            key,
            algorithm,
            key_id,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn algorithm(&self) -> AeadAlgorithm {
        self.algorithm
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Output of `CryptoSuite::generate_key`
#[derive(Debug, Clone)]
pub enum GeneratedKey {
    Session(SessionKey),
    KeyPair {
        public: PublicKey,
        private: PrivateKey,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_params_json() {
        let ec: KeyParams = serde_json::from_str(r#"{"type":"ec","curve":"P-256"}"#).unwrap();
        assert_eq!(ec, KeyParams::Ec { curve: Curve::P256 });
        let ec: KeyParams = serde_json::from_str(r#"{"type":"ec","curve":"P-521"}"#).unwrap();
        assert_eq!(ec, KeyParams::Ec { curve: Curve::P521 });
        assert_eq!(Curve::P384.name(), "P-384");

        let session: KeyParams = serde_json::from_str(r#"{"type":"session","length":32}"#).unwrap();
        assert_eq!(session, KeyParams::Session { length: 32 });

        assert!(serde_json::from_str::<KeyParams>(r#"{"type":"rsa","modulusLength":2048}"#).is_err());
    }

    #[test]
    fn test_session_key_length_checked() {
        assert!(SessionKey::new(vec![0u8; 16], AeadAlgorithm::Aes256Gcm).is_err());
        let key = SessionKey::new(vec![7u8; 32], AeadAlgorithm::ChaCha20Poly1305).unwrap();
        assert_eq!(key.key_id(), &KeyId::from_raw_key(&[7u8; 32], 32));
    }

    #[test]
    fn test_session_key_debug_hides_material() {
        let key = SessionKey::new(vec![0xAB; 32], AeadAlgorithm::Aes256Gcm).unwrap();
        let debug = format!("{:?}", key);
        assert!(!debug.contains("171, 171"));
        assert!(debug.contains("key_id"));
    }
}
