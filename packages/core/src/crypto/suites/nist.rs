//! Nist suite: ECDH-ES / ECDSA on P-256, P-384 and P-521 with AES-256-GCM
//!
//! Public-key encryption produces one fragment per recipient. A single
//! ephemeral key pair is shared by all recipients of a message and recorded
//! in the message options, so every recipient of one message must be on the
//! same curve; each recipient gets its own HKDF salt and IV.

use super::ec::{NistEphemeral, NistPublicKey, NistSecretKey};
use super::random_bytes;
use crate::config::Config;
use crate::crypto::keys::{
    GeneratedKey, KeyFormat, KeyParams, PrivateKey, PrivateKeyMaterial, PublicKey, PublicKeyMaterial,
    SessionKey,
};
use crate::crypto::provider::{CryptoSuite, DecryptionKey, EncryptionTarget};
use crate::crypto::{AeadAlgorithm, HashAlgorithm, SuiteId};
use crate::error::{CascadeError, Result};
use crate::keyid::KeyId;
use crate::message::Message;
use crate::protocol::signature::collect_verification;
use crate::protocol::{
    Decrypted, EncryptedMessage, EncryptionOptions, FragmentParams, KeyType, RawEncryptedMessage,
    RawSignature, Signature, SignatureOptions, VerificationResult,
};
use crate::utils::b64;
use aes_gcm::{
    aead::{generic_array::typenum::Unsigned, Aead, AeadCore, KeyInit},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use hkdf::Hkdf;
use pkcs8::pkcs5::{pbes2::Kdf, EncryptionScheme};
use pkcs8::{Document, EncryptedPrivateKeyInfo, LineEnding, SecretDocument};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::debug;
use zeroize::Zeroizing;

const ECDH_INFO: &[u8] = b"cascade nist ecdh-es aes-256-gcm";
const WRAPPING_KEY_LENGTH: usize = 32;
const IV_LENGTH: usize = <Aes256Gcm as AeadCore>::NonceSize::USIZE;

const PUBLIC_LABEL: &str = "PUBLIC KEY";
const PRIVATE_LABEL: &str = "PRIVATE KEY";
const ENCRYPTED_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// Concrete implementation of `CryptoSuite` for the nist suite.
#[derive(Debug, Default, Clone, Copy)]
pub struct NistSuite;

impl NistSuite {
    /// RFC 7638 thumbprint of the public key, truncated to the KeyId length
    pub fn key_id_of(public: &NistPublicKey) -> Result<KeyId> {
        let (x, y) = public.coordinates().ok_or_else(|| {
            CascadeError::InvalidKeyFormat("public key is the identity point".to_string())
        })?;
        let jwk = format!(
            r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
            public.curve().name(),
            b64::encode_url(&x),
            b64::encode_url(&y)
        );
        Ok(KeyId::from_digest(
            &Sha256::digest(jwk.as_bytes()),
            Config::global().key_id_length,
        ))
    }

    fn wrap_public(public: NistPublicKey) -> Result<PublicKey> {
        let key_id = Self::key_id_of(&public)?;
        Ok(PublicKey::new(PublicKeyMaterial::Nist(public), key_id))
    }

    fn wrap_private(secret: NistSecretKey) -> Result<PrivateKey> {
        let public = Self::wrap_public(secret.public_key())?;
        Ok(PrivateKey::new(PrivateKeyMaterial::Nist(secret), public))
    }
}

fn nist_public(key: &PublicKey) -> Result<&NistPublicKey> {
    match key.material() {
        PublicKeyMaterial::Nist(public) => Ok(public),
        _ => Err(CascadeError::ForeignKey("nist")),
    }
}

fn nist_secret(key: &PrivateKey) -> Result<&NistSecretKey> {
    match key.material() {
        PrivateKeyMaterial::Nist(secret) => Ok(secret),
        _ => Err(CascadeError::ForeignKey("nist")),
    }
}

fn as_text(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data).map_err(|e| CascadeError::InvalidKeyFormat(e.to_string()))
}

/// Refuses key derivation parameters above the configured cost before any
/// work is done on them.
fn check_kdf_cost(info: &EncryptedPrivateKeyInfo<'_>) -> Result<()> {
    let config = Config::global();
    let EncryptionScheme::Pbes2(params) = &info.encryption_algorithm else {
        return Ok(());
    };
    match &params.kdf {
        Kdf::Pbkdf2(pbkdf2) if pbkdf2.iteration_count > config.max_pbkdf2_iterations => {
            Err(CascadeError::InvalidKeyFormat(format!(
                "PBKDF2 iteration count {} exceeds {}",
                pbkdf2.iteration_count, config.max_pbkdf2_iterations
            )))
        }
        Kdf::Scrypt(scrypt) if scrypt.cost_parameter > config.max_scrypt_cost => {
            Err(CascadeError::InvalidKeyFormat(format!(
                "scrypt cost {} exceeds {}",
                scrypt.cost_parameter, config.max_scrypt_cost
            )))
        }
        _ => Ok(()),
    }
}

/// PKCS#8 DER, plain or encrypted, to a secret key
fn secret_from_der(der: &[u8], passphrase: Option<&str>) -> Result<NistSecretKey> {
    let plain_err = match NistSecretKey::from_der(der) {
        Ok(secret) => return Ok(secret),
        Err(e) => e,
    };
    let Ok(info) = EncryptedPrivateKeyInfo::try_from(der) else {
        return Err(plain_err);
    };
    check_kdf_cost(&info)?;
    let passphrase = passphrase.ok_or(CascadeError::PassphraseRequired)?;
    let decrypted = info
        .decrypt(passphrase)
        .map_err(|e| CascadeError::FailedToDecryptPrivateKey(e.to_string()))?;
    NistSecretKey::from_der(decrypted.as_bytes())
}

fn derive_wrapping_key(
    shared: &[u8],
    salt: &[u8],
    hash: HashAlgorithm,
) -> Result<Zeroizing<[u8; WRAPPING_KEY_LENGTH]>> {
    let mut okm = Zeroizing::new([0u8; WRAPPING_KEY_LENGTH]);
    let expanded = match hash {
        HashAlgorithm::Sha256 => Hkdf::<Sha256>::new(Some(salt), shared).expand(ECDH_INFO, &mut *okm),
        HashAlgorithm::Sha384 => Hkdf::<Sha384>::new(Some(salt), shared).expand(ECDH_INFO, &mut *okm),
        HashAlgorithm::Sha512 => Hkdf::<Sha512>::new(Some(salt), shared).expand(ECDH_INFO, &mut *okm),
    };
    expanded.map_err(|e| CascadeError::Encryption(format!("HKDF expand failed: {}", e)))?;
    Ok(okm)
}

fn aes_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != IV_LENGTH {
        return Err(CascadeError::Encryption(format!("invalid iv length {}", iv.len())));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CascadeError::Encryption(e.to_string()))?;
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|e| CascadeError::Encryption(format!("AES-GCM encryption failed: {}", e)))
}

fn aes_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != IV_LENGTH {
        return Err(CascadeError::InvalidFormat(format!("invalid iv length {}", iv.len())));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CascadeError::Decryption(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|e| CascadeError::Decryption(format!("AES-GCM decryption failed: {}", e)))
}

#[async_trait]
impl CryptoSuite for NistSuite {
    fn id(&self) -> SuiteId {
        SuiteId::Nist
    }

    async fn generate_key(&self, params: &KeyParams) -> Result<GeneratedKey> {
        match params {
            KeyParams::Session { length } if *length == SessionKey::LENGTH => {
                let key = SessionKey::new(random_bytes(*length), AeadAlgorithm::Aes256Gcm)?;
                Ok(GeneratedKey::Session(key))
            }
            KeyParams::Ec { curve } => {
                let private = Self::wrap_private(NistSecretKey::random(*curve)?)?;
                debug!(
                    target: "suite::nist",
                    key_id = %private.key_id(),
                    curve = curve.name(),
                    "Generated EC key pair"
                );
                Ok(GeneratedKey::KeyPair {
                    public: private.public_key().clone(),
                    private,
                })
            }
            other => Err(CascadeError::UnsupportedKeyParams(format!(
                "{:?} is not supported by the nist suite",
                other
            ))),
        }
    }

    async fn import_public_key(&self, data: &[u8], format: KeyFormat) -> Result<PublicKey> {
        let public = match format {
            KeyFormat::Pem => {
                let (label, der) = Document::from_pem(as_text(data)?)
                    .map_err(|e| CascadeError::InvalidKeyFormat(e.to_string()))?;
                if label != PUBLIC_LABEL {
                    return Err(CascadeError::InvalidKeyFormat(format!(
                        "expected {}, found {}",
                        PUBLIC_LABEL, label
                    )));
                }
                NistPublicKey::from_der(der.as_bytes())?
            }
            KeyFormat::Der => NistPublicKey::from_der(data)?,
        };
        Self::wrap_public(public)
    }

    async fn import_private_key(
        &self,
        data: &[u8],
        format: KeyFormat,
        passphrase: Option<&str>,
    ) -> Result<PrivateKey> {
        let secret = match format {
            KeyFormat::Pem => {
                let (label, der) = SecretDocument::from_pem(as_text(data)?)
                    .map_err(|e| CascadeError::InvalidKeyFormat(e.to_string()))?;
                if label != PRIVATE_LABEL && label != ENCRYPTED_LABEL {
                    return Err(CascadeError::InvalidKeyFormat(format!(
                        "expected a private key, found {}",
                        label
                    )));
                }
                secret_from_der(der.as_bytes(), passphrase)?
            }
            KeyFormat::Der => secret_from_der(data, passphrase)?,
        };
        Self::wrap_private(secret)
    }

    async fn export_public_key(&self, key: &PublicKey, format: KeyFormat) -> Result<Vec<u8>> {
        let der = nist_public(key)?.to_der()?;
        match format {
            KeyFormat::Pem => der
                .to_pem(PUBLIC_LABEL, LineEnding::LF)
                .map(String::into_bytes)
                .map_err(|e| CascadeError::InvalidKeyFormat(e.to_string())),
            KeyFormat::Der => Ok(der.as_bytes().to_vec()),
        }
    }

    async fn export_private_key(
        &self,
        key: &PrivateKey,
        format: KeyFormat,
        passphrase: Option<&str>,
    ) -> Result<Vec<u8>> {
        let der = nist_secret(key)?.to_der(passphrase)?;
        match format {
            KeyFormat::Pem => {
                let label = if passphrase.is_some() { ENCRYPTED_LABEL } else { PRIVATE_LABEL };
                der.to_pem(label, LineEnding::LF)
                    .map(|pem| pem.as_bytes().to_vec())
                    .map_err(|e| CascadeError::InvalidKeyFormat(e.to_string()))
            }
            KeyFormat::Der => Ok(der.as_bytes().to_vec()),
        }
    }

    async fn encrypt(
        &self,
        message: &Message,
        target: EncryptionTarget<'_>,
        signers: &[PrivateKey],
        options: &EncryptionOptions,
    ) -> Result<EncryptedMessage> {
        if !signers.is_empty() {
            return Err(CascadeError::UnsupportedAlgorithm(
                "the nist suite cannot embed signatures".to_string(),
            ));
        }

        match target {
            EncryptionTarget::Session(key) => {
                if key.algorithm() != AeadAlgorithm::Aes256Gcm {
                    return Err(CascadeError::UnsupportedAlgorithm(key.algorithm().to_string()));
                }
                let iv = random_bytes(IV_LENGTH);
                let ciphertext = aes_encrypt(key.as_bytes(), &iv, message.as_bytes())?;
                let fragment = RawEncryptedMessage::new(
                    ciphertext,
                    key.key_id().clone(),
                    FragmentParams {
                        iv: Some(ByteBuf::from(iv)),
                        salt: None,
                    },
                );
                let options = EncryptionOptions {
                    aead: Some(AeadAlgorithm::Aes256Gcm),
                    ..options.clone()
                };
                EncryptedMessage::new(SuiteId::Nist, KeyType::SessionKeyEncrypt, vec![fragment], options)
            }
            EncryptionTarget::Recipients(recipients) => {
                let first = recipients.first().ok_or(CascadeError::NoPublicKey)?;
                let hash = options.hash.unwrap_or(HashAlgorithm::Sha256);
                let ephemeral = NistEphemeral::random(nist_public(first)?.curve())?;
                let ephemeral_der = ephemeral.public_key_der()?;

                let ephemeral = &ephemeral;
                let fragments = try_join_all(recipients.iter().map(|recipient| async move {
                    let shared = ephemeral.agree(nist_public(recipient)?)?;
                    let salt = random_bytes(Config::global().hkdf_salt_length);
                    let iv = random_bytes(IV_LENGTH);
                    let wrapping_key = derive_wrapping_key(&shared, &salt, hash)?;
                    let ciphertext = aes_encrypt(&*wrapping_key, &iv, message.as_bytes())?;
                    Ok::<_, CascadeError>(RawEncryptedMessage::new(
                        ciphertext,
                        recipient.key_id().clone(),
                        FragmentParams {
                            iv: Some(ByteBuf::from(iv)),
                            salt: Some(ByteBuf::from(salt)),
                        },
                    ))
                }))
                .await?;

                debug!(
                    target: "suite::nist",
                    recipients = fragments.len(),
                    "Encrypted message with ECDH-ES"
                );

                let options = EncryptionOptions {
                    hash: Some(hash),
                    ephemeral_public_key: Some(ByteBuf::from(ephemeral_der.as_bytes().to_vec())),
                    ..options.clone()
                };
                EncryptedMessage::new(SuiteId::Nist, KeyType::PublicKeyEncrypt, fragments, options)
            }
        }
    }

    async fn decrypt_fragment(
        &self,
        encrypted: &EncryptedMessage,
        fragment: &RawEncryptedMessage,
        key: DecryptionKey<'_>,
        _verifiers: &[PublicKey],
    ) -> Result<Decrypted> {
        let iv = fragment.params().iv()?;
        let plaintext = match key {
            DecryptionKey::Session(session) => aes_decrypt(session.as_bytes(), iv, fragment.data())?,
            DecryptionKey::Private(private) => {
                let secret = nist_secret(private)?;
                let ephemeral_der = encrypted
                    .options()
                    .ephemeral_public_key
                    .as_ref()
                    .ok_or_else(|| {
                        CascadeError::InvalidFormat("missing ephemeral public key".to_string())
                    })?;
                let shared = secret.diffie_hellman(ephemeral_der.as_slice())?;
                let hash = encrypted.options().hash.unwrap_or(HashAlgorithm::Sha256);
                let wrapping_key = derive_wrapping_key(&shared, fragment.params().salt()?, hash)?;
                aes_decrypt(&*wrapping_key, iv, fragment.data())?
            }
        };
        Ok(Decrypted::new(plaintext))
    }

    async fn sign(
        &self,
        message: &Message,
        signers: &[PrivateKey],
        options: &SignatureOptions,
    ) -> Result<Signature> {
        let hash = options.hash.ok_or(CascadeError::HashMustBeSpecified)?;
        if signers.is_empty() {
            return Err(CascadeError::NoPrivateKey);
        }
        let digest = hash.digest(message.as_bytes());

        let digest = &digest;
        let fragments = try_join_all(signers.iter().map(|signer| async move {
            let signature = nist_secret(signer)?.sign_prehash(digest)?;
            Ok::<_, CascadeError>(RawSignature::new(signature, signer.key_id().clone()))
        }))
        .await?;

        debug!(target: "suite::nist", signers = fragments.len(), %hash, "Signed message");
        Signature::new(SuiteId::Nist, fragments, options.clone())
    }

    async fn verify(
        &self,
        message: &Message,
        signature: &Signature,
        keys: &[PublicKey],
    ) -> Result<Vec<VerificationResult>> {
        let hash = signature
            .options()
            .hash
            .ok_or(CascadeError::HashMustBeSpecified)?;
        let digest = hash.digest(message.as_bytes());

        Ok(collect_verification(signature.fragments(), keys, |fragment, key| {
            nist_public(key).map_or(false, |public| public.verify_prehash(&digest, fragment.data()))
        }))
    }
}
