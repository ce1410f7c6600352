// Типы ошибок

use thiserror::Error;

/// Every failure the engine can surface.
///
/// Variants are grouped the way callers usually react to them: construction
/// problems are caught before any cryptography runs, import problems come from
/// key decoding, crypto problems come from a suite, and serialization problems
/// come from the binary envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CascadeError {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------
    #[error("Encrypt and decrypt modes are exclusive")]
    EncryptDecryptAreExclusive,
    #[error("Sign and verify modes are exclusive")]
    SignVerifyAreExclusive,
    #[error("Session key and public keys are exclusive for encryption")]
    SessionKeyAndPublicKeyAreExclusive,
    #[error("Session key and private keys are exclusive for decryption")]
    SessionKeyAndPrivateKeyAreExclusive,
    #[error("No session key or public key is given")]
    NoSessionKeyOrPublicKeyIsGiven,
    #[error("No session key or private key is given")]
    NoSessionKeyOrPrivateKeyIsGiven,
    #[error("Signing requires private keys")]
    NoPrivateKey,
    #[error("Verification requires public keys")]
    NoPublicKey,
    #[error("No suite assigned for {0}")]
    NoSuiteAssigned(&'static str),
    #[error("Public or private keys would need two different suites in one key set")]
    ConflictingKeySuites,
    #[error("Keys do not allow the {0} operation")]
    UnmatchedKeyMode(&'static str),
    #[error("Empty procedure")]
    EmptyProcedure,
    #[error("Final step must be bound to the external key")]
    FinalStepMustBeExternalKey,
    #[error("Step {0} precedes the final step and must use a one-time key")]
    PrecedenceMustBeExternalKey(usize),
    #[error("Step {0} generates a one-time key but no key params are given")]
    NoKeyParamsGiven(usize),
    #[error("Keys are bound to a different encryption suite")]
    UnmatchedKeyTypeToEncryptionSuite,
    #[error("Keys are bound to a different signing suite")]
    UnmatchedKeyTypeToSigningSuite,
    #[error("Layer {0} carries no encrypted message")]
    InvalidEncryptedMessage(usize),
    #[error("Layer carries no encrypted message")]
    NoEncryptedMessage,

    // ------------------------------------------------------------------
    // Key import
    // ------------------------------------------------------------------
    #[error("Passphrase required to unlock the private key")]
    PassphraseRequired,
    #[error("Failed to decrypt private key: {0}")]
    FailedToDecryptPrivateKey(String),
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),
    #[error("Key is not a {0} suite key")]
    ForeignKey(&'static str),

    // ------------------------------------------------------------------
    // Cryptographic operations
    // ------------------------------------------------------------------
    #[error("Unsupported key params: {0}")]
    UnsupportedKeyParams(String),
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Hash algorithm must be specified")]
    HashMustBeSpecified,
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
    #[error("Encryption failed: {0}")]
    Encryption(String),
    #[error("Unable to decrypt with the given keys: no fragment matches")]
    NoMatchingFragment,
    #[error("Decryption failed: {0}")]
    Decryption(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Verification failed: {0}")]
    Verification(String),

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Invalid envelope: {0}")]
    InvalidFormat(String),
    #[error("Layer index {0} is out of range")]
    LayerOutOfRange(usize),
    #[error("Layer {0} already holds ciphertext fragments")]
    FragmentsAlreadyPresent(usize),
    #[error("No fragments given to insert into layer {0}")]
    NoFragmentsToInsert(usize),
}

impl From<rmp_serde::encode::Error> for CascadeError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        CascadeError::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CascadeError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        CascadeError::Deserialization(err.to_string())
    }
}

impl From<rand::Error> for CascadeError {
    fn from(err: rand::Error) -> Self {
        CascadeError::KeyGeneration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CascadeError>;
