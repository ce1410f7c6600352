//! Криптографический модуль
//!
//! # Архитектура
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                CascadeEngine / Keys (callers)               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Suites registry (closed SuiteId)              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                ┌─────────────┴─────────────┐
//!                ▼                           ▼
//! ┌───────────────────────────┐  ┌──────────────────────────┐
//! │   NistSuite               │  │  ClassicSuite            │
//! │  - P-256/384/521 ECDH-ES  │  │  - X25519 / Ed25519      │
//! │  - AES-256-GCM            │  │  - ChaCha20-Poly1305     │
//! │  - SPKI / PKCS#8 keys     │  │  - armored key container │
//! └───────────────────────────┘  └──────────────────────────┘
//! ```
//!
//! ## Модули
//!
//! - [`provider`]: `CryptoSuite` trait, the contract both back-ends fulfil
//! - [`suites`]: the two implementations and the registry
//! - [`keys`]: suite-tagged key objects and key generation params
//! - [`key_protection`]: passphrase locking of private key containers

pub mod key_protection;
pub mod keys;
pub mod provider;
pub mod suites;

pub use provider::CryptoSuite;
pub use suites::Suites;

use crate::error::CascadeError;

/// Closed set of string-tagged enums that travel on the wire and in
/// procedure configs. Unknown tags are rejected at decode time.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $tag:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $tag),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = CascadeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok($name::$variant),)+
                    other => Err(CascadeError::UnsupportedAlgorithm(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = CascadeError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.as_str().to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use string_enum;

string_enum! {
    /// Identifies one of the two interchangeable back-ends
    SuiteId {
        Nist => "nist",
        Classic => "classic",
    }
}

impl SuiteId {
    /// Whether the suite can seal signatures inside its own ciphertext
    pub fn supports_embedded_signature(&self) -> bool {
        matches!(self, SuiteId::Classic)
    }

    /// The symmetric algorithm the suite uses for session keys
    pub fn session_algorithm(&self) -> AeadAlgorithm {
        match self {
            SuiteId::Nist => AeadAlgorithm::Aes256Gcm,
            SuiteId::Classic => AeadAlgorithm::ChaCha20Poly1305,
        }
    }
}

string_enum! {
    AeadAlgorithm {
        Aes256Gcm => "AES-GCM",
        ChaCha20Poly1305 => "ChaCha20-Poly1305",
    }
}

string_enum! {
    HashAlgorithm {
        Sha256 => "SHA-256",
        Sha384 => "SHA-384",
        Sha512 => "SHA-512",
    }
}

impl HashAlgorithm {
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        use sha2::Digest;
        match self {
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }
}
