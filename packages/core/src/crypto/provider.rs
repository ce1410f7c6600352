//! Defines the CryptoSuite trait, the contract every back-end fulfils.

use crate::crypto::keys::{GeneratedKey, KeyFormat, KeyParams, PrivateKey, PublicKey, SessionKey};
use crate::crypto::SuiteId;
use crate::error::Result;
use crate::keyid::KeyId;
use crate::message::Message;
use crate::protocol::{
    Decrypted, EncryptedMessage, EncryptionOptions, RawEncryptedMessage, Signature,
    SignatureOptions, VerificationResult,
};
use crate::utils::attempts::first_success;
use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::trace;

/// Who an encryption is addressed to
#[derive(Debug, Clone, Copy)]
pub enum EncryptionTarget<'a> {
    Recipients(&'a [PublicKey]),
    Session(&'a SessionKey),
}

/// Every key a decryption may try
#[derive(Debug, Clone, Copy)]
pub enum DecryptionKeys<'a> {
    Private(&'a [PrivateKey]),
    Session(&'a SessionKey),
}

/// One candidate out of [`DecryptionKeys`]
#[derive(Debug, Clone, Copy)]
pub enum DecryptionKey<'a> {
    Private(&'a PrivateKey),
    Session(&'a SessionKey),
}

impl<'a> DecryptionKeys<'a> {
    pub fn candidates(&self) -> Vec<DecryptionKey<'a>> {
        match *self {
            DecryptionKeys::Private(keys) => keys.iter().map(DecryptionKey::Private).collect(),
            DecryptionKeys::Session(key) => vec![DecryptionKey::Session(key)],
        }
    }
}

impl DecryptionKey<'_> {
    pub fn key_id(&self) -> &KeyId {
        match self {
            DecryptionKey::Private(key) => key.key_id(),
            DecryptionKey::Session(key) => key.key_id(),
        }
    }
}

/// Trait that formalizes all operations a cryptographic back-end offers to
/// the engine. Implementations are stateless and shared by reference.
///
/// Primitive failures are reported through [`crate::error::CascadeError`];
/// a suite never panics on malformed input.
#[async_trait]
pub trait CryptoSuite: Send + Sync {
    /// The tag written into every message/signature this suite produces.
    fn id(&self) -> SuiteId;

    /// Generates a session key or a key pair.
    async fn generate_key(&self, params: &KeyParams) -> Result<GeneratedKey>;

    async fn import_public_key(&self, data: &[u8], format: KeyFormat) -> Result<PublicKey>;

    /// Imports a private key, unlocking it with `passphrase` when the
    /// encoding is protected.
    ///
    /// # Errors
    /// `PassphraseRequired` if the key is protected and no passphrase is
    /// given, `FailedToDecryptPrivateKey` if the passphrase is wrong.
    async fn import_private_key(
        &self,
        data: &[u8],
        format: KeyFormat,
        passphrase: Option<&str>,
    ) -> Result<PrivateKey>;

    async fn export_public_key(&self, key: &PublicKey, format: KeyFormat) -> Result<Vec<u8>>;

    /// Exports a private key, protected by `passphrase` when one is given.
    async fn export_private_key(
        &self,
        key: &PrivateKey,
        format: KeyFormat,
        passphrase: Option<&str>,
    ) -> Result<Vec<u8>>;

    /// Encrypts `message` for `target`.
    /// `signers`: keys whose signatures get embedded in the ciphertext.
    /// Only suites with embedded signature support receive non-empty signers.
    async fn encrypt(
        &self,
        message: &Message,
        target: EncryptionTarget<'_>,
        signers: &[PrivateKey],
        options: &EncryptionOptions,
    ) -> Result<EncryptedMessage>;

    /// Decrypts one fragment with one key.
    /// `verifiers`: keys to check embedded signatures against.
    async fn decrypt_fragment(
        &self,
        encrypted: &EncryptedMessage,
        fragment: &RawEncryptedMessage,
        key: DecryptionKey<'_>,
        verifiers: &[PublicKey],
    ) -> Result<Decrypted>;

    /// Tries every candidate key against every fragment whose KeyId matches
    /// it, all at once. The first success in key order wins; individual
    /// failures only surface when no combination works.
    async fn decrypt(
        &self,
        encrypted: &EncryptedMessage,
        keys: DecryptionKeys<'_>,
        verifiers: &[PublicKey],
    ) -> Result<Decrypted> {
        let mut attempts = Vec::new();
        for key in keys.candidates() {
            for fragment in encrypted.fragments() {
                if fragment.key_id().matches(key.key_id()) {
                    attempts.push(self.decrypt_fragment(encrypted, fragment, key, verifiers));
                }
            }
        }

        trace!(
            target: "cascade::decryption",
            suite = %self.id(),
            attempts = attempts.len(),
            "Trying key/fragment combinations"
        );

        first_success(join_all(attempts).await)
    }

    /// Produces a detached signature, one fragment per signer.
    async fn sign(
        &self,
        message: &Message,
        signers: &[PrivateKey],
        options: &SignatureOptions,
    ) -> Result<Signature>;

    /// Checks a detached signature. Never fails because a key matched
    /// nothing: such keys and fragments are reported as unverifiable.
    async fn verify(
        &self,
        message: &Message,
        signature: &Signature,
        keys: &[PublicKey],
    ) -> Result<Vec<VerificationResult>>;
}
