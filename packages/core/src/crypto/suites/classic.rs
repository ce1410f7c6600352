//! Classic suite: X25519 / Ed25519 / ChaCha20-Poly1305 in one packet
//!
//! A public-key message is a single packet readable by every recipient: the
//! body is sealed under a random content key, which is wrapped once per
//! recipient with X25519 ephemeral-static DH + HKDF-SHA256. Recipients and
//! signers are named inside packets by their 8-byte short id, the leading
//! bytes of the full fingerprint.

use super::random_bytes;
use crate::config::Config;
use crate::crypto::key_protection::{self, LockedSecret};
use crate::crypto::keys::{
    Curve, GeneratedKey, KeyFormat, KeyParams, PrivateKey, PrivateKeyMaterial, PublicKey,
    PublicKeyMaterial, SessionKey,
};
use crate::crypto::provider::{CryptoSuite, DecryptionKey, EncryptionTarget};
use crate::crypto::{AeadAlgorithm, SuiteId};
use crate::error::{CascadeError, Result};
use crate::keyid::{KeyId, KeyIdList};
use crate::message::Message;
use crate::protocol::signature::collect_verification;
use crate::protocol::{
    Decrypted, EncryptedMessage, EncryptionOptions, FragmentParams, KeyType, RawEncryptedMessage,
    RawSignature, Signature, SignatureOptions, VerificationResult,
};
use crate::utils::b64;
use crate::utils::serialization::{pack, unpack};
use async_trait::async_trait;
use chacha20poly1305::aead::generic_array::typenum::Unsigned;
use chacha20poly1305::{aead::Aead, AeadCore, ChaCha20Poly1305, KeyInit, Nonce};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use futures_util::future::join_all;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

const PUBLIC_LABEL: &str = "CLASSIC PUBLIC KEY";
const PRIVATE_LABEL: &str = "CLASSIC PRIVATE KEY";
const FINGERPRINT_DOMAIN: &[u8] = b"cascade-classic-fingerprint-v1";
const WRAP_INFO: &[u8] = b"cascade-classic-key-wrap";
const NONCE_LENGTH: usize = <ChaCha20Poly1305 as AeadCore>::NonceSize::USIZE;

/// Ed25519 primary key plus the X25519 key messages are encrypted to
#[derive(Clone)]
pub struct ClassicPublicKey {
    pub signing: VerifyingKey,
    pub encryption: X25519PublicKey,
}

#[derive(Clone)]
pub struct ClassicSecretKey {
    pub signing: SigningKey,
    pub encryption: StaticSecret,
}

impl ClassicSecretKey {
    pub fn public(&self) -> ClassicPublicKey {
        ClassicPublicKey {
            signing: self.signing.verifying_key(),
            encryption: X25519PublicKey::from(&self.encryption),
        }
    }

    /// signing seed || x25519 scalar
    fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = Zeroizing::new(Vec::with_capacity(64));
        bytes.extend_from_slice(&self.signing.to_bytes());
        bytes.extend_from_slice(&self.encryption.to_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 {
            return Err(CascadeError::InvalidKeyFormat(format!(
                "Invalid secret key length: expected 64, got {}",
                bytes.len()
            )));
        }
        let signing = Zeroizing::new(to_array_32(&bytes[..32])?);
        let encryption = Zeroizing::new(to_array_32(&bytes[32..])?);
        Ok(Self {
            signing: SigningKey::from_bytes(&signing),
            encryption: StaticSecret::from(*encryption),
        })
    }
}

/// Serialised key, armored for the PEM-like format
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyContainer {
    kind: String,
    signing_public: ByteBuf,
    encryption_public: ByteBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    locked: Option<LockedSecret>,
}

/// Content key wrapped for one recipient
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecipientBlock {
    issuer: ByteBuf,
    ephemeral: ByteBuf,
    nonce: ByteBuf,
    wrapped_key: ByteBuf,
}

#[derive(Serialize, Deserialize)]
struct Packet {
    recipients: Vec<RecipientBlock>,
    nonce: ByteBuf,
    body: ByteBuf,
}

/// Plaintext of a packet: the data plus signatures embedded over it
#[derive(Serialize, Deserialize)]
struct SealedBody {
    data: ByteBuf,
    signatures: Vec<RawSignature>,
}

/// Concrete implementation of `CryptoSuite` for the classic suite.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassicSuite;

impl ClassicSuite {
    /// SHA-256 over both public halves, truncated to the KeyId length
    pub fn key_id_of(public: &ClassicPublicKey) -> KeyId {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update(public.signing.as_bytes());
        hasher.update(public.encryption.as_bytes());
        KeyId::from_digest(&hasher.finalize(), Config::global().key_id_length)
    }

    /// Packet-level issuer/recipient id
    pub fn short_id(key_id: &KeyId) -> KeyId {
        key_id.short(Config::global().short_key_id_length)
    }

    fn wrap_public(public: ClassicPublicKey) -> PublicKey {
        let key_id = Self::key_id_of(&public);
        PublicKey::new(PublicKeyMaterial::Classic(public), key_id)
    }

    fn wrap_private(secret: ClassicSecretKey) -> PrivateKey {
        let public = Self::wrap_public(secret.public());
        PrivateKey::new(PrivateKeyMaterial::Classic(secret), public)
    }

    fn decode_container(data: &[u8], format: KeyFormat, label: &str) -> Result<KeyContainer> {
        let body = match format {
            KeyFormat::Pem => {
                let text = std::str::from_utf8(data)
                    .map_err(|e| CascadeError::InvalidKeyFormat(e.to_string()))?;
                let (found, body) = b64::dearmor(text)?;
                if found != label {
                    return Err(CascadeError::InvalidKeyFormat(format!(
                        "expected {}, found {}",
                        label, found
                    )));
                }
                body
            }
            KeyFormat::Der => data.to_vec(),
        };
        unpack(&body).map_err(|e| CascadeError::InvalidKeyFormat(e.to_string()))
    }

    fn encode_container(container: &KeyContainer, format: KeyFormat, label: &str) -> Result<Vec<u8>> {
        let body = pack(container)?;
        Ok(match format {
            KeyFormat::Pem => b64::armor(label, &body).into_bytes(),
            KeyFormat::Der => body,
        })
    }

    fn public_from_container(container: &KeyContainer) -> Result<ClassicPublicKey> {
        let signing = VerifyingKey::from_bytes(&to_array_32(&container.signing_public)?)
            .map_err(|e| CascadeError::InvalidKeyFormat(format!("Invalid verifying key: {}", e)))?;
        let encryption = X25519PublicKey::from(to_array_32(&container.encryption_public)?);
        Ok(ClassicPublicKey {
            signing,
            encryption,
        })
    }
}

fn classic_public(key: &PublicKey) -> Result<&ClassicPublicKey> {
    match key.material() {
        PublicKeyMaterial::Classic(public) => Ok(public),
        _ => Err(CascadeError::ForeignKey("classic")),
    }
}

fn classic_secret(key: &PrivateKey) -> Result<&ClassicSecretKey> {
    match key.material() {
        PrivateKeyMaterial::Classic(secret) => Ok(secret),
        _ => Err(CascadeError::ForeignKey("classic")),
    }
}

/// Конвертировать &[u8] в [u8; 32]
fn to_array_32(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes.try_into().map_err(|_| {
        CascadeError::InvalidKeyFormat(format!("Invalid key length: expected 32, got {}", bytes.len()))
    })
}

fn chacha_encrypt(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LENGTH {
        return Err(CascadeError::Encryption(format!("invalid nonce length {}", nonce.len())));
    }
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CascadeError::Encryption(e.to_string()))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CascadeError::Encryption(format!("ChaCha20-Poly1305 encryption failed: {}", e)))
}

fn chacha_decrypt(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if nonce.len() != NONCE_LENGTH {
        return Err(CascadeError::InvalidFormat(format!("invalid nonce length {}", nonce.len())));
    }
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CascadeError::Decryption(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|e| CascadeError::Decryption(format!("ChaCha20-Poly1305 decryption failed: {}", e)))
}

fn derive_wrapping_key(
    shared: &[u8],
    ephemeral: &X25519PublicKey,
    recipient: &X25519PublicKey,
) -> Result<Zeroizing<[u8; 32]>> {
    let mut salt = Vec::with_capacity(64);
    salt.extend_from_slice(ephemeral.as_bytes());
    salt.extend_from_slice(recipient.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut okm = Zeroizing::new([0u8; 32]);
    hkdf.expand(WRAP_INFO, &mut *okm)
        .map_err(|e| CascadeError::Encryption(format!("HKDF expand failed: {}", e)))?;
    Ok(okm)
}

fn wrap_content_key(content_key: &[u8], recipient: &PublicKey) -> Result<RecipientBlock> {
    let public = classic_public(recipient)?;
    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    // Get ephemeral public key before consuming ephemeral_secret
    let ephemeral_public = X25519PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(&public.encryption);

    let wrapping_key = derive_wrapping_key(shared.as_bytes(), &ephemeral_public, &public.encryption)?;
    let nonce = random_bytes(NONCE_LENGTH);
    let wrapped_key = chacha_encrypt(&*wrapping_key, &nonce, content_key)?;

    Ok(RecipientBlock {
        issuer: ByteBuf::from(ClassicSuite::short_id(recipient.key_id()).into_inner()),
        ephemeral: ByteBuf::from(ephemeral_public.to_bytes().to_vec()),
        nonce: ByteBuf::from(nonce),
        wrapped_key: ByteBuf::from(wrapped_key),
    })
}

fn unwrap_content_key(secret: &ClassicSecretKey, block: &RecipientBlock) -> Result<Zeroizing<Vec<u8>>> {
    let ephemeral = X25519PublicKey::from(to_array_32(&block.ephemeral)?);
    let own_public = X25519PublicKey::from(&secret.encryption);
    let shared = secret.encryption.diffie_hellman(&ephemeral);

    let wrapping_key = derive_wrapping_key(shared.as_bytes(), &ephemeral, &own_public)?;
    chacha_decrypt(&*wrapping_key, &block.nonce, &block.wrapped_key)
}

fn ed25519_sign(signer: &PrivateKey, data: &[u8]) -> Result<RawSignature> {
    let secret = classic_secret(signer)?;
    let signature = secret.signing.sign(data);
    Ok(RawSignature::new(
        signature.to_bytes().to_vec(),
        ClassicSuite::short_id(signer.key_id()),
    ))
}

fn ed25519_verify(key: &PublicKey, data: &[u8], signature: &[u8]) -> bool {
    let Ok(public) = classic_public(key) else {
        return false;
    };
    let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    public
        .signing
        .verify(data, &ed25519_dalek::Signature::from_bytes(&bytes))
        .is_ok()
}

#[async_trait]
impl CryptoSuite for ClassicSuite {
    fn id(&self) -> SuiteId {
        SuiteId::Classic
    }

    async fn generate_key(&self, params: &KeyParams) -> Result<GeneratedKey> {
        match params {
            KeyParams::Session { length } if *length == SessionKey::LENGTH => {
                let key = SessionKey::new(random_bytes(*length), AeadAlgorithm::ChaCha20Poly1305)?;
                Ok(GeneratedKey::Session(key))
            }
            KeyParams::Ec {
                curve: Curve::Curve25519,
            } => {
                let private = Self::wrap_private(ClassicSecretKey {
                    signing: SigningKey::generate(&mut OsRng),
                    encryption: StaticSecret::random_from_rng(OsRng),
                });
                debug!(target: "suite::classic", key_id = %private.key_id(), "Generated Curve25519 key pair");
                Ok(GeneratedKey::KeyPair {
                    public: private.public_key().clone(),
                    private,
                })
            }
            other => Err(CascadeError::UnsupportedKeyParams(format!(
                "{:?} is not supported by the classic suite",
                other
            ))),
        }
    }

    async fn import_public_key(&self, data: &[u8], format: KeyFormat) -> Result<PublicKey> {
        let container = Self::decode_container(data, format, PUBLIC_LABEL)?;
        if container.kind != "public" {
            return Err(CascadeError::InvalidKeyFormat(format!(
                "expected a public key, found {}",
                container.kind
            )));
        }
        Ok(Self::wrap_public(Self::public_from_container(&container)?))
    }

    async fn import_private_key(
        &self,
        data: &[u8],
        format: KeyFormat,
        passphrase: Option<&str>,
    ) -> Result<PrivateKey> {
        let container = Self::decode_container(data, format, PRIVATE_LABEL)?;
        if container.kind != "private" {
            return Err(CascadeError::InvalidKeyFormat(format!(
                "expected a private key, found {}",
                container.kind
            )));
        }

        let secret_bytes = match (&container.locked, &container.secret) {
            (Some(locked), _) => {
                let passphrase = passphrase.ok_or(CascadeError::PassphraseRequired)?;
                key_protection::unlock(locked, passphrase)?
            }
            (None, Some(secret)) => Zeroizing::new(secret.to_vec()),
            (None, None) => {
                return Err(CascadeError::InvalidKeyFormat("private key without secret".to_string()))
            }
        };
        let secret = ClassicSecretKey::from_bytes(&secret_bytes)?;

        let declared = Self::public_from_container(&container)?;
        let derived = secret.public();
        if declared.signing != derived.signing || declared.encryption != derived.encryption {
            return Err(CascadeError::InvalidKeyFormat(
                "public half does not belong to the secret".to_string(),
            ));
        }
        Ok(Self::wrap_private(secret))
    }

    async fn export_public_key(&self, key: &PublicKey, format: KeyFormat) -> Result<Vec<u8>> {
        let public = classic_public(key)?;
        let container = KeyContainer {
            kind: "public".to_string(),
            signing_public: ByteBuf::from(public.signing.to_bytes().to_vec()),
            encryption_public: ByteBuf::from(public.encryption.to_bytes().to_vec()),
            secret: None,
            locked: None,
        };
        Self::encode_container(&container, format, PUBLIC_LABEL)
    }

    async fn export_private_key(
        &self,
        key: &PrivateKey,
        format: KeyFormat,
        passphrase: Option<&str>,
    ) -> Result<Vec<u8>> {
        let secret = classic_secret(key)?;
        let public = secret.public();
        let secret_bytes = secret.to_bytes();
        let (secret, locked) = match passphrase {
            Some(passphrase) => (None, Some(key_protection::lock(&secret_bytes, passphrase)?)),
            None => (Some(ByteBuf::from(secret_bytes.to_vec())), None),
        };
        let container = KeyContainer {
            kind: "private".to_string(),
            signing_public: ByteBuf::from(public.signing.to_bytes().to_vec()),
            encryption_public: ByteBuf::from(public.encryption.to_bytes().to_vec()),
            secret,
            locked,
        };
        Self::encode_container(&container, format, PRIVATE_LABEL)
    }

    async fn encrypt(
        &self,
        message: &Message,
        target: EncryptionTarget<'_>,
        signers: &[PrivateKey],
        options: &EncryptionOptions,
    ) -> Result<EncryptedMessage> {
        let data = message.as_bytes();
        let signatures = signers
            .iter()
            .map(|signer| ed25519_sign(signer, data))
            .collect::<Result<Vec<_>>>()?;
        let body = Zeroizing::new(pack(&SealedBody {
            data: ByteBuf::from(data.to_vec()),
            signatures,
        })?);
        match target {
            EncryptionTarget::Session(key) => {
                if key.algorithm() != AeadAlgorithm::ChaCha20Poly1305 {
                    return Err(CascadeError::UnsupportedAlgorithm(key.algorithm().to_string()));
                }
                let nonce = random_bytes(NONCE_LENGTH);
                let ciphertext = chacha_encrypt(key.as_bytes(), &nonce, &body)?;
                let fragment = RawEncryptedMessage::new(
                    ciphertext,
                    key.key_id().clone(),
                    FragmentParams {
                        iv: Some(ByteBuf::from(nonce)),
                        salt: None,
                    },
                );
                let options = EncryptionOptions {
                    aead: Some(AeadAlgorithm::ChaCha20Poly1305),
                    ..options.clone()
                };
                EncryptedMessage::new(SuiteId::Classic, KeyType::SessionKeyEncrypt, vec![fragment], options)
            }
            EncryptionTarget::Recipients(recipients) => {
                if recipients.is_empty() {
                    return Err(CascadeError::NoPublicKey);
                }
                let content_key = Zeroizing::new(random_bytes(Config::global().content_key_length));
                let nonce = random_bytes(NONCE_LENGTH);
                let ciphertext = chacha_encrypt(&content_key, &nonce, &body)?;

                let blocks = recipients
                    .iter()
                    .map(|recipient| wrap_content_key(&content_key, recipient))
                    .collect::<Result<Vec<_>>>()?;
                let key_ids = KeyIdList::new(
                    recipients
                        .iter()
                        .map(|recipient| Self::short_id(recipient.key_id()))
                        .collect(),
                )?;

                let packet = pack(&Packet {
                    recipients: blocks,
                    nonce: ByteBuf::from(nonce),
                    body: ByteBuf::from(ciphertext),
                })?;

                debug!(
                    target: "suite::classic",
                    recipients = recipients.len(),
                    embedded_signatures = signers.len(),
                    "Encrypted packet"
                );

                let fragment = RawEncryptedMessage::new(packet, key_ids, FragmentParams::default());
                EncryptedMessage::new(
                    SuiteId::Classic,
                    KeyType::PublicKeyEncrypt,
                    vec![fragment],
                    options.clone(),
                )
            }
        }
    }

    async fn decrypt_fragment(
        &self,
        _encrypted: &EncryptedMessage,
        fragment: &RawEncryptedMessage,
        key: DecryptionKey<'_>,
        verifiers: &[PublicKey],
    ) -> Result<Decrypted> {
        let body = match key {
            DecryptionKey::Session(session) => {
                chacha_decrypt(session.as_bytes(), fragment.params().iv()?, fragment.data())?
            }
            DecryptionKey::Private(private) => {
                let secret = classic_secret(private)?;
                let packet: Packet = unpack(fragment.data())?;

                let content_key = packet
                    .recipients
                    .iter()
                    .filter(|block| {
                        KeyId::new(block.issuer.to_vec())
                            .map(|issuer| issuer.matches(private.key_id()))
                            .unwrap_or(false)
                    })
                    .find_map(|block| unwrap_content_key(secret, block).ok())
                    .ok_or_else(|| {
                        CascadeError::Decryption(format!(
                            "no recipient block opens with key {}",
                            private.key_id()
                        ))
                    })?;
                chacha_decrypt(&content_key, &packet.nonce, &packet.body)?
            }
        };

        let sealed: SealedBody = unpack(&body)?;
        let data = sealed.data.into_vec();
        let signatures = collect_verification(&sealed.signatures, verifiers, |signature, key| {
            ed25519_verify(key, &data, signature.data())
        });
        trace!(
            target: "suite::classic",
            embedded_signatures = sealed.signatures.len(),
            "Decrypted packet"
        );

        Ok(Decrypted { data, signatures })
    }

    async fn sign(
        &self,
        message: &Message,
        signers: &[PrivateKey],
        options: &SignatureOptions,
    ) -> Result<Signature> {
        if signers.is_empty() {
            return Err(CascadeError::NoPrivateKey);
        }
        let data = message.as_bytes();
        let fragments = join_all(signers.iter().map(|signer| async move { ed25519_sign(signer, data) }))
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        debug!(target: "suite::classic", signers = fragments.len(), "Signed message");
        Signature::new(SuiteId::Classic, fragments, options.clone())
    }

    async fn verify(
        &self,
        message: &Message,
        signature: &Signature,
        keys: &[PublicKey],
    ) -> Result<Vec<VerificationResult>> {
        Ok(collect_verification(signature.fragments(), keys, |fragment, key| {
            ed25519_verify(key, message.as_bytes(), fragment.data())
        }))
    }
}
