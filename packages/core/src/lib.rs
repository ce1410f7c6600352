// Cascade Core
// Hybrid multi-layer encryption and signing envelopes over two
// interchangeable crypto suites

#![warn(clippy::all)]

// Модули
pub mod api;
pub mod cascade;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keyid;
pub mod keyring;
pub mod message;
pub mod protocol;
pub mod utils;

// Re-exports для удобства
pub use api::{CascadeEngine, GenerateKeyParams, GeneratedKeyOutput, Outcome};
pub use cascade::{Procedure, StepConfig};
pub use crypto::{AeadAlgorithm, CryptoSuite, HashAlgorithm, SuiteId, Suites};
pub use error::{CascadeError, Result};
pub use keyid::KeyId;
pub use keyring::{EncodedKeys, EncodedPrivateKey, KeyMode, KeyObjects, Keys, SuiteAssignment};
pub use message::Message;
pub use protocol::{CascadedData, CascadedLayer, Decrypted, EncryptedMessage, Signature};
