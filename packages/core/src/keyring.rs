//! Keys: imported key material bound to suites and tagged with what it
//! may be used for.
//!
//! Every combination rule is checked before anything is imported, so a
//! failed construction never leaves a half-built key set behind.

use crate::crypto::keys::{KeyFormat, PrivateKey, PublicKey, SessionKey};
use crate::crypto::{CryptoSuite, SuiteId, Suites};
use crate::error::{CascadeError, Result};
use futures_util::future::try_join_all;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMode {
    Encrypt,
    Decrypt,
    Sign,
    Verify,
}

/// Which suite handles each half of the capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuiteAssignment {
    pub encrypt_decrypt: Option<SuiteId>,
    pub sign_verify: Option<SuiteId>,
}

impl SuiteAssignment {
    pub fn new(encrypt_decrypt: Option<SuiteId>, sign_verify: Option<SuiteId>) -> Self {
        Self {
            encrypt_decrypt,
            sign_verify,
        }
    }

    /// One suite for everything
    pub fn single(suite: SuiteId) -> Self {
        Self::new(Some(suite), Some(suite))
    }
}

#[derive(Debug, Clone, Default)]
pub struct EncodedPrivateKey {
    pub encoded: String,
    pub passphrase: Option<String>,
}

impl EncodedPrivateKey {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
            passphrase: None,
        }
    }

    pub fn with_passphrase(encoded: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
            passphrase: Some(passphrase.into()),
        }
    }
}

/// Key strings as a caller holds them (PEM / armored text)
#[derive(Debug, Clone, Default)]
pub struct EncodedKeys {
    pub public_keys: Vec<String>,
    pub private_keys: Vec<EncodedPrivateKey>,
    pub session_key: Option<SessionKey>,
}

/// Already imported keys
#[derive(Debug, Clone, Default)]
pub struct KeyObjects {
    pub public_keys: Vec<PublicKey>,
    pub private_keys: Vec<PrivateKey>,
    pub session_key: Option<SessionKey>,
}

#[derive(Debug, Clone)]
pub struct Keys {
    public_keys: Vec<PublicKey>,
    private_keys: Vec<PrivateKey>,
    session_key: Option<SessionKey>,
    suite: SuiteAssignment,
    modes: Vec<KeyMode>,
}

/// Suite each asymmetric slot is imported with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotSuites {
    public: Option<SuiteId>,
    private: Option<SuiteId>,
    session: Option<SuiteId>,
}

fn validate(
    has_public: bool,
    has_private: bool,
    has_session: bool,
    suite: SuiteAssignment,
    modes: &[KeyMode],
) -> Result<SlotSuites> {
    let has = |mode: KeyMode| modes.contains(&mode);

    if has(KeyMode::Encrypt) && has(KeyMode::Decrypt) {
        return Err(CascadeError::EncryptDecryptAreExclusive);
    }
    if has(KeyMode::Sign) && has(KeyMode::Verify) {
        return Err(CascadeError::SignVerifyAreExclusive);
    }
    if has(KeyMode::Encrypt) {
        match (has_session, has_public) {
            (true, true) => return Err(CascadeError::SessionKeyAndPublicKeyAreExclusive),
            (false, false) => return Err(CascadeError::NoSessionKeyOrPublicKeyIsGiven),
            _ => {}
        }
    }
    if has(KeyMode::Decrypt) {
        match (has_session, has_private) {
            (true, true) => return Err(CascadeError::SessionKeyAndPrivateKeyAreExclusive),
            (false, false) => return Err(CascadeError::NoSessionKeyOrPrivateKeyIsGiven),
            _ => {}
        }
    }
    if has(KeyMode::Sign) && !has_private {
        return Err(CascadeError::NoPrivateKey);
    }
    if has(KeyMode::Verify) && !has_public {
        return Err(CascadeError::NoPublicKey);
    }

    let crypt_suite = if has(KeyMode::Encrypt) || has(KeyMode::Decrypt) {
        Some(
            suite
                .encrypt_decrypt
                .ok_or(CascadeError::NoSuiteAssigned("encrypt_decrypt"))?,
        )
    } else {
        None
    };
    let sign_suite = if has(KeyMode::Sign) || has(KeyMode::Verify) {
        Some(
            suite
                .sign_verify
                .ok_or(CascadeError::NoSuiteAssigned("sign_verify"))?,
        )
    } else {
        None
    };

    // a slot used by both halves must be readable by both suites
    let slot = |for_crypt: bool, for_sign: bool| -> Result<Option<SuiteId>> {
        match (for_crypt, for_sign) {
            (true, true) if crypt_suite != sign_suite => Err(CascadeError::ConflictingKeySuites),
            (true, _) => Ok(crypt_suite),
            (false, true) => Ok(sign_suite),
            (false, false) => Ok(None),
        }
    };

    Ok(SlotSuites {
        public: slot(has(KeyMode::Encrypt) && has_public, has(KeyMode::Verify))?,
        private: slot(has(KeyMode::Decrypt) && has_private, has(KeyMode::Sign))?,
        session: if has_session { crypt_suite } else { None },
    })
}

fn check_session_key(key: &SessionKey, suite: Option<SuiteId>) -> Result<()> {
    match suite {
        Some(suite) if suite.session_algorithm() != key.algorithm() => Err(
            CascadeError::UnsupportedAlgorithm(format!("{} session key for the {} suite", key.algorithm(), suite)),
        ),
        _ => Ok(()),
    }
}

impl Keys {
    /// Import key strings through the assigned suites.
    ///
    /// Public keys go to the `encrypt_decrypt` suite when they encrypt and to
    /// the `sign_verify` suite when they only verify; private keys likewise
    /// for decrypt and sign.
    pub async fn import(
        encoded: EncodedKeys,
        suite: SuiteAssignment,
        modes: &[KeyMode],
        suites: &Suites,
    ) -> Result<Self> {
        let slots = validate(
            !encoded.public_keys.is_empty(),
            !encoded.private_keys.is_empty(),
            encoded.session_key.is_some(),
            suite,
            modes,
        )?;

        let public_keys = match slots.public {
            Some(id) => {
                let adapter = suites.get(id);
                try_join_all(
                    encoded
                        .public_keys
                        .iter()
                        .map(|key| adapter.import_public_key(key.as_bytes(), KeyFormat::Pem)),
                )
                .await?
            }
            None => Vec::new(),
        };

        let private_keys = match slots.private {
            Some(id) => {
                let adapter = suites.get(id);
                try_join_all(encoded.private_keys.iter().map(|key| {
                    adapter.import_private_key(
                        key.encoded.as_bytes(),
                        KeyFormat::Pem,
                        key.passphrase.as_deref(),
                    )
                }))
                .await?
            }
            None => Vec::new(),
        };

        let session_key = match encoded.session_key {
            Some(key) if slots.session.is_some() => {
                check_session_key(&key, slots.session)?;
                Some(key)
            }
            _ => None,
        };

        let keys = Self {
            public_keys,
            private_keys,
            session_key,
            suite,
            modes: modes.to_vec(),
        };
        info!(
            target: "keys",
            public = keys.public_keys.len(),
            private = keys.private_keys.len(),
            session = keys.session_key.is_some(),
            modes = ?keys.modes,
            "Imported keys"
        );
        Ok(keys)
    }

    /// Wrap keys that are already imported, e.g. one-time keys generated
    /// during a cascade.
    ///
    /// # Errors
    /// The same validation as [`Keys::import`], plus `ForeignKey` when a key
    /// belongs to a suite other than the one its slot is assigned.
    pub fn from_objects(objects: KeyObjects, suite: SuiteAssignment, modes: &[KeyMode]) -> Result<Self> {
        let slots = validate(
            !objects.public_keys.is_empty(),
            !objects.private_keys.is_empty(),
            objects.session_key.is_some(),
            suite,
            modes,
        )?;

        let public_keys = match slots.public {
            Some(id) => {
                if objects.public_keys.iter().any(|k| k.suite() != id) {
                    return Err(CascadeError::ForeignKey(id.as_str()));
                }
                objects.public_keys
            }
            None => Vec::new(),
        };
        let private_keys = match slots.private {
            Some(id) => {
                if objects.private_keys.iter().any(|k| k.suite() != id) {
                    return Err(CascadeError::ForeignKey(id.as_str()));
                }
                objects.private_keys
            }
            None => Vec::new(),
        };
        let session_key = match objects.session_key {
            Some(key) if slots.session.is_some() => {
                check_session_key(&key, slots.session)?;
                Some(key)
            }
            _ => None,
        };

        debug!(target: "keys", modes = ?modes, "Wrapped key objects");
        Ok(Self {
            public_keys,
            private_keys,
            session_key,
            suite,
            modes: modes.to_vec(),
        })
    }

    pub fn public_keys(&self) -> &[PublicKey] {
        &self.public_keys
    }

    pub fn private_keys(&self) -> &[PrivateKey] {
        &self.private_keys
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    pub fn suite(&self) -> SuiteAssignment {
        self.suite
    }

    pub fn modes(&self) -> &[KeyMode] {
        &self.modes
    }

    pub fn can_encrypt(&self) -> bool {
        self.modes.contains(&KeyMode::Encrypt)
    }

    pub fn can_decrypt(&self) -> bool {
        self.modes.contains(&KeyMode::Decrypt)
    }

    pub fn can_sign(&self) -> bool {
        self.modes.contains(&KeyMode::Sign)
    }

    pub fn can_verify(&self) -> bool {
        self.modes.contains(&KeyMode::Verify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{Curve, GeneratedKey, KeyParams};
    use crate::crypto::{AeadAlgorithm, CryptoSuite};

    fn session() -> SessionKey {
        SessionKey::new(vec![1u8; 32], AeadAlgorithm::Aes256Gcm).unwrap()
    }

    async fn nist_pair() -> (PublicKey, PrivateKey) {
        let suites = Suites::default();
        match suites
            .get(SuiteId::Nist)
            .generate_key(&KeyParams::Ec { curve: Curve::P256 })
            .await
            .unwrap()
        {
            GeneratedKey::KeyPair { public, private } => (public, private),
            other => panic!("expected key pair, got {:?}", other),
        }
    }

    #[test]
    fn test_mode_exclusivity() {
        let nist = SuiteAssignment::single(SuiteId::Nist);
        assert_eq!(
            validate(true, true, false, nist, &[KeyMode::Encrypt, KeyMode::Decrypt]),
            Err(CascadeError::EncryptDecryptAreExclusive)
        );
        assert_eq!(
            validate(true, true, false, nist, &[KeyMode::Sign, KeyMode::Verify]),
            Err(CascadeError::SignVerifyAreExclusive)
        );
    }

    #[test]
    fn test_required_material() {
        let nist = SuiteAssignment::single(SuiteId::Nist);
        assert_eq!(
            validate(false, false, false, nist, &[KeyMode::Encrypt]),
            Err(CascadeError::NoSessionKeyOrPublicKeyIsGiven)
        );
        assert_eq!(
            validate(true, false, true, nist, &[KeyMode::Encrypt]),
            Err(CascadeError::SessionKeyAndPublicKeyAreExclusive)
        );
        assert_eq!(
            validate(false, true, true, nist, &[KeyMode::Decrypt]),
            Err(CascadeError::SessionKeyAndPrivateKeyAreExclusive)
        );
        assert_eq!(
            validate(false, false, false, nist, &[KeyMode::Decrypt]),
            Err(CascadeError::NoSessionKeyOrPrivateKeyIsGiven)
        );
        assert_eq!(
            validate(true, false, false, nist, &[KeyMode::Encrypt, KeyMode::Sign]),
            Err(CascadeError::NoPrivateKey)
        );
        assert_eq!(
            validate(false, true, false, nist, &[KeyMode::Decrypt, KeyMode::Verify]),
            Err(CascadeError::NoPublicKey)
        );
    }

    #[test]
    fn test_slot_suites() {
        let mixed = SuiteAssignment::new(Some(SuiteId::Classic), Some(SuiteId::Nist));

        // session key encrypts, public keys only verify
        let slots = validate(true, true, true, mixed, &[KeyMode::Decrypt, KeyMode::Verify]);
        assert_eq!(
            slots,
            Err(CascadeError::SessionKeyAndPrivateKeyAreExclusive)
        );

        let slots = validate(true, false, true, mixed, &[KeyMode::Decrypt, KeyMode::Verify]);
        assert_eq!(
            slots,
            Ok(SlotSuites {
                public: Some(SuiteId::Nist),
                private: None,
                session: Some(SuiteId::Classic),
            })
        );

        // the same public keys cannot serve two suites
        assert_eq!(
            validate(true, false, false, mixed, &[KeyMode::Encrypt, KeyMode::Verify]),
            Err(CascadeError::ConflictingKeySuites)
        );
    }

    #[test]
    fn test_missing_suite_assignment() {
        let only_crypt = SuiteAssignment::new(Some(SuiteId::Nist), None);
        assert_eq!(
            validate(true, true, false, only_crypt, &[KeyMode::Encrypt, KeyMode::Sign]),
            Err(CascadeError::NoSuiteAssigned("sign_verify"))
        );
    }

    #[test]
    fn test_capability_predicates() {
        let keys = Keys::from_objects(
            KeyObjects {
                session_key: Some(session()),
                ..Default::default()
            },
            SuiteAssignment::new(Some(SuiteId::Nist), None),
            &[KeyMode::Encrypt],
        )
        .unwrap();
        assert!(keys.can_encrypt());
        assert!(!keys.can_decrypt());
        assert!(!keys.can_sign());
        assert!(!keys.can_verify());
    }

    #[test]
    fn test_session_algorithm_must_fit_suite() {
        let result = Keys::from_objects(
            KeyObjects {
                session_key: Some(session()),
                ..Default::default()
            },
            SuiteAssignment::new(Some(SuiteId::Classic), None),
            &[KeyMode::Decrypt],
        );
        assert!(matches!(result, Err(CascadeError::UnsupportedAlgorithm(_))));
    }

    #[tokio::test]
    async fn test_foreign_key_rejected() {
        let (public, _) = nist_pair().await;
        let result = Keys::from_objects(
            KeyObjects {
                public_keys: vec![public],
                ..Default::default()
            },
            SuiteAssignment::new(Some(SuiteId::Classic), None),
            &[KeyMode::Encrypt],
        );
        assert_eq!(result.unwrap_err(), CascadeError::ForeignKey("classic"));
    }

    #[tokio::test]
    async fn test_import_from_pem() {
        let suites = Suites::default();
        let (public, private) = nist_pair().await;
        let adapter = suites.get(SuiteId::Nist);
        let public_pem = adapter.export_public_key(&public, KeyFormat::Pem).await.unwrap();
        let private_pem = adapter
            .export_private_key(&private, KeyFormat::Pem, None)
            .await
            .unwrap();

        let keys = Keys::import(
            EncodedKeys {
                public_keys: vec![String::from_utf8(public_pem).unwrap()],
                private_keys: vec![EncodedPrivateKey::new(String::from_utf8(private_pem).unwrap())],
                session_key: None,
            },
            SuiteAssignment::single(SuiteId::Nist),
            &[KeyMode::Encrypt, KeyMode::Sign],
            &suites,
        )
        .await
        .unwrap();

        assert_eq!(keys.public_keys()[0].key_id(), public.key_id());
        assert_eq!(keys.private_keys()[0].key_id(), private.key_id());
        assert!(keys.can_encrypt() && keys.can_sign());
    }
}
