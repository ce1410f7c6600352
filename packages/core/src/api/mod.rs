// Публичный API движка каскадов
// Высокоуровневые методы: ключи, один слой, каскад

pub mod keys;

pub use keys::{ExportedKey, ExportedPrivateKey, GenerateKeyParams, GeneratedKeyOutput};

use crate::cascade::encryption::check_external_keys;
use crate::cascade::procedure::resolve_sign;
use crate::cascade::{decrypt_cascade, decrypt_layer, encrypt_step, EncryptionPlan, Procedure, StepConfig};
use crate::crypto::{CryptoSuite, Suites};
use crate::error::{CascadeError, Result};
use crate::keyring::{EncodedKeys, KeyMode, Keys, SuiteAssignment};
use crate::message::Message;
use crate::protocol::{
    CascadedData, CascadedLayer, Decrypted, Signature, SignatureOptions, VerificationResult,
};
use tracing::{debug, info, warn};

/// Главный API: holds the suite instances every operation dispatches to.
#[derive(Debug, Clone, Default)]
pub struct CascadeEngine {
    suites: Suites,
}

impl CascadeEngine {
    pub fn new(suites: Suites) -> Self {
        Self { suites }
    }

    pub fn suites(&self) -> &Suites {
        &self.suites
    }

    /// Generates a session key or a PEM/armored key pair
    pub async fn generate_key(&self, params: &GenerateKeyParams) -> Result<GeneratedKeyOutput> {
        keys::generate(&self.suites, params).await
    }

    pub async fn import_keys(
        &self,
        encoded: EncodedKeys,
        suite: SuiteAssignment,
        modes: &[KeyMode],
    ) -> Result<Keys> {
        Keys::import(encoded, suite, modes, &self.suites).await
    }

    /// Encrypts one layer under `keys`, signing it when `config` asks to.
    pub async fn encrypt(&self, message: &Message, keys: &Keys, config: &StepConfig) -> Result<CascadedLayer> {
        let sign = resolve_sign(config, config, keys)?;
        check_external_keys(config, std::slice::from_ref(&sign), keys)?;

        encrypt_step(
            &self.suites,
            message,
            keys,
            config.encrypt.suite,
            &config.encrypt.options,
            sign.as_ref(),
        )
        .await
    }

    /// Decrypts one layer. A detached signature is verified when present,
    /// otherwise the embedded results are reported.
    pub async fn decrypt(&self, layer: &CascadedLayer, keys: &Keys) -> Result<Decrypted> {
        decrypt_layer(&self.suites, layer, keys, None).await
    }

    pub async fn sign(&self, message: &Message, keys: &Keys, options: &SignatureOptions) -> Result<Signature> {
        if !keys.can_sign() {
            return Err(CascadeError::UnmatchedKeyMode("sign"));
        }
        let suite = keys
            .suite()
            .sign_verify
            .ok_or(CascadeError::NoSuiteAssigned("sign_verify"))?;
        self.suites
            .get(suite)
            .sign(message, keys.private_keys(), options)
            .await
    }

    pub async fn verify(
        &self,
        message: &Message,
        signature: &Signature,
        keys: &Keys,
    ) -> Result<Vec<VerificationResult>> {
        if !keys.can_verify() {
            return Err(CascadeError::UnmatchedKeyMode("verify"));
        }
        if keys.suite().sign_verify != Some(signature.suite()) {
            return Err(CascadeError::UnmatchedKeyTypeToSigningSuite);
        }
        self.suites
            .get(signature.suite())
            .verify(message, signature, keys.public_keys())
            .await
    }

    /// Plans and runs an encryption cascade.
    ///
    /// # Errors
    /// Structural problems of `procedure` and key/suite mismatches are
    /// reported before any key is generated.
    pub async fn create_encryption_cascade(
        &self,
        message: Message,
        keys: &Keys,
        procedure: &Procedure,
    ) -> Result<CascadedData> {
        debug!(target: "cascade::engine", steps = procedure.len(), "Creating encryption cascade");
        let plan = EncryptionPlan::build(&self.suites, message, keys, procedure).await?;
        let data = plan.execute(&self.suites).await?;
        info!(target: "cascade::engine", layers = data.len(), "Encryption cascade created");
        Ok(data)
    }

    pub async fn create_decryption_cascade(&self, data: &CascadedData, keys: &Keys) -> Result<Vec<Decrypted>> {
        debug!(target: "cascade::engine", layers = data.len(), "Running decryption cascade");
        let decrypted = decrypt_cascade(&self.suites, data, keys).await?;
        if decrypted.iter().any(|layer| layer.valid() == Some(false)) {
            warn!(target: "cascade::engine", "Decryption cascade has invalid signatures");
        }
        Ok(decrypted)
    }
}

/// Caller-facing summary of a cascade call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub status: String,
}

impl Outcome {
    pub const OK: &'static str = "OK";
    pub const VALIDATION_FAILURE: &'static str = "ValidationFailure";

    fn ok() -> Self {
        Self {
            success: true,
            status: Self::OK.to_string(),
        }
    }

    pub fn of_encryption<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self {
                success: false,
                status: format!("EncryptionFailed: {}", e),
            },
        }
    }

    /// `ValidationFailure` when any matched signature of any layer failed
    pub fn of_decryption(result: &Result<Vec<Decrypted>>) -> Self {
        match result {
            Ok(layers) if layers.iter().any(|l| l.valid() == Some(false)) => Self {
                success: false,
                status: Self::VALIDATION_FAILURE.to_string(),
            },
            Ok(_) => Self::ok(),
            Err(e) => Self {
                success: false,
                status: format!("DecryptionFailed: {}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyid::KeyId;

    fn layer(valid: Option<bool>) -> Decrypted {
        let mut decrypted = Decrypted::new(b"m".to_vec());
        decrypted.signatures.push(VerificationResult {
            key_id: KeyId::new(vec![1u8; 32]).unwrap(),
            valid,
        });
        decrypted
    }

    #[test]
    fn test_outcome_statuses() {
        assert_eq!(Outcome::of_decryption(&Ok(vec![layer(Some(true))])), Outcome::ok());
        assert_eq!(Outcome::of_decryption(&Ok(vec![layer(None)])), Outcome::ok());

        let failed = Outcome::of_decryption(&Ok(vec![layer(Some(true)), layer(Some(false))]));
        assert!(!failed.success);
        assert_eq!(failed.status, "ValidationFailure");

        let error = Outcome::of_decryption(&Err(CascadeError::NoMatchingFragment));
        assert!(error.status.starts_with("DecryptionFailed: "));

        let encrypt = Outcome::of_encryption::<()>(&Err(CascadeError::EmptyProcedure));
        assert_eq!(encrypt.status, "EncryptionFailed: Empty procedure");
    }
}
