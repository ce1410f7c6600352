//! Криптографические наборы (Crypto Suites)
//!
//! ## Доступные наборы
//!
//! ### Nist Suite
//! - **Key agreement**: ECDH-ES on P-256 / P-384 / P-521, HKDF
//! - **Signatures**: ECDSA on the same curves (explicit hash)
//! - **AEAD**: AES-256-GCM
//! - **Keys**: SPKI / PKCS#8, PEM or DER
//!
//! ### Classic Suite
//! - **Key agreement**: X25519, HKDF-SHA256
//! - **Signatures**: Ed25519 (detached or embedded)
//! - **AEAD**: ChaCha20-Poly1305
//! - **Keys**: armored MessagePack container
//!
//! ## Выбор suite
//!
//! ```rust
//! use cascade_core::crypto::{CryptoSuite, SuiteId, Suites};
//!
//! let suites = Suites::default();
//! assert_eq!(suites.get(SuiteId::Classic).id(), SuiteId::Classic);
//! ```

pub mod classic;
pub mod ec;
pub mod nist;

use crate::crypto::provider::CryptoSuite;
use crate::crypto::SuiteId;
use classic::ClassicSuite;
use nist::NistSuite;
use rand::RngCore;

/// Both back-ends, handed to the engine at construction
#[derive(Debug, Default, Clone)]
pub struct Suites {
    nist: NistSuite,
    classic: ClassicSuite,
}

impl Suites {
    pub fn new(nist: NistSuite, classic: ClassicSuite) -> Self {
        Self { nist, classic }
    }

    pub fn get(&self, id: SuiteId) -> &dyn CryptoSuite {
        match id {
            SuiteId::Nist => &self.nist,
            SuiteId::Classic => &self.classic,
        }
    }
}

/// Fresh random bytes for keys, nonces and salts
pub(crate) fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}
