//! Envelope data model and its binary form
//!
//! - [`encrypted_message`]: one layer's ciphertext fragments
//! - [`signature`]: one layer's detached signature fragments
//! - [`cascaded_data`]: the ordered multi-layer envelope
//! - [`wire`]: MessagePack shapes the above serialise through

pub mod cascaded_data;
pub mod encrypted_message;
pub mod signature;
pub mod wire;

pub use cascaded_data::{CascadedData, CascadedLayer};
pub use encrypted_message::{
    Decrypted, EncryptedMessage, EncryptionOptions, FragmentParams, RawEncryptedMessage,
};
pub use signature::{RawSignature, Signature, SignatureOptions, VerificationResult};

use crate::crypto::string_enum;
use crate::error::CascadeError;

string_enum! {
    /// What kind of key a layer component was produced with
    KeyType {
        PublicKeyEncrypt => "public_key_encrypt",
        SessionKeyEncrypt => "session_key_encrypt",
        PublicKeySign => "public_key_sign",
    }
}
