// Каскадное шифрование
//
// Two phases. `EncryptionPlan::build` checks the procedure and the caller's
// keys, generates the one-time keys and wires every step to its message:
//
//   message_0 = caller message
//   message_i = one-time key of step i-1, exported in step i-1's suite
//
// `EncryptionPlan::execute` then runs the finished steps, all at once.

use crate::cascade::procedure::{resolve_sign, Procedure, ResolvedSign, StepConfig};
use crate::crypto::keys::{GeneratedKey, KeyFormat, PrivateKey};
use crate::crypto::provider::EncryptionTarget;
use crate::crypto::{CryptoSuite, SuiteId, Suites};
use crate::error::{CascadeError, Result};
use crate::keyring::{KeyMode, KeyObjects, Keys, SuiteAssignment};
use crate::message::Message;
use crate::protocol::{CascadedData, CascadedLayer, EncryptionOptions};
use futures_util::future::{try_join, try_join_all};
use tracing::{debug, info};

/// One step with everything it needs to run
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub index: usize,
    pub message: Message,
    pub keys: Keys,
    pub suite: SuiteId,
    pub options: EncryptionOptions,
    pub sign: Option<ResolvedSign>,
}

#[derive(Debug, Clone)]
pub struct EncryptionPlan {
    steps: Vec<PlannedStep>,
}

/// The caller's keys must fit the anchor step.
pub(crate) fn check_external_keys(
    anchor: &StepConfig,
    signs: &[Option<ResolvedSign>],
    keys: &Keys,
) -> Result<()> {
    if !keys.can_encrypt() {
        return Err(CascadeError::UnmatchedKeyMode("encrypt"));
    }
    if keys.suite().encrypt_decrypt != Some(anchor.encrypt.suite) {
        return Err(CascadeError::UnmatchedKeyTypeToEncryptionSuite);
    }

    // every signing step signs with the caller's private keys
    for sign in signs.iter().flatten() {
        if !keys.can_sign() {
            return Err(CascadeError::UnmatchedKeyMode("sign"));
        }
        if keys.suite().sign_verify != Some(sign.suite) {
            return Err(CascadeError::UnmatchedKeyTypeToSigningSuite);
        }
    }
    Ok(())
}

/// Keys of a non-final step: the public/session half of its one-time key,
/// plus the caller's signing keys when the step signs.
fn onetime_step_keys(
    generated: &GeneratedKey,
    suite: SuiteId,
    sign: Option<&ResolvedSign>,
    external: &Keys,
) -> Result<Keys> {
    let mut objects = KeyObjects::default();
    match generated {
        GeneratedKey::Session(key) => objects.session_key = Some(key.clone()),
        GeneratedKey::KeyPair { public, .. } => objects.public_keys = vec![public.clone()],
    }

    let mut modes = vec![KeyMode::Encrypt];
    let mut assignment = SuiteAssignment::new(Some(suite), None);
    if let Some(sign) = sign {
        objects.private_keys = external.private_keys().to_vec();
        modes.push(KeyMode::Sign);
        assignment.sign_verify = Some(sign.suite);
    }

    Keys::from_objects(objects, assignment, &modes)
}

/// The secret half of a one-time key as the next step's plaintext
async fn export_secret(suites: &Suites, suite: SuiteId, generated: &GeneratedKey) -> Result<Vec<u8>> {
    match generated {
        GeneratedKey::Session(key) => Ok(key.as_bytes().to_vec()),
        GeneratedKey::KeyPair { private, .. } => {
            suites
                .get(suite)
                .export_private_key(private, KeyFormat::Der, None)
                .await
        }
    }
}

impl EncryptionPlan {
    pub async fn build(
        suites: &Suites,
        message: Message,
        keys: &Keys,
        procedure: &Procedure,
    ) -> Result<Self> {
        procedure.validate()?;
        let steps = procedure.steps();
        let last = steps.len() - 1;
        let anchor = &steps[last];

        let signs = steps
            .iter()
            .map(|step| resolve_sign(step, anchor, keys))
            .collect::<Result<Vec<_>>>()?;
        check_external_keys(anchor, &signs, keys)?;

        // one-time keys do not depend on each other
        let onetime = try_join_all(steps[..last].iter().enumerate().map(|(index, step)| async move {
            let params = step
                .encrypt
                .onetime_key
                .as_ref()
                .map(|k| &k.key_params)
                .ok_or(CascadeError::NoKeyParamsGiven(index))?;
            suites.get(step.encrypt.suite).generate_key(params).await
        }))
        .await?;

        let exported = try_join_all(
            onetime
                .iter()
                .zip(steps)
                .map(|(key, step)| export_secret(suites, step.encrypt.suite, key)),
        )
        .await?;

        let messages = std::iter::once(message).chain(exported.into_iter().map(Message::binary));

        let mut planned = Vec::with_capacity(steps.len());
        for (index, ((step, message), sign)) in steps.iter().zip(messages).zip(signs).enumerate() {
            let step_keys = match onetime.get(index) {
                Some(generated) => onetime_step_keys(generated, step.encrypt.suite, sign.as_ref(), keys)?,
                None => keys.clone(),
            };
            planned.push(PlannedStep {
                index,
                message,
                keys: step_keys,
                suite: step.encrypt.suite,
                options: step.encrypt.options.clone(),
                sign,
            });
        }

        debug!(
            target: "cascade::encryption",
            steps = planned.len(),
            onetime_keys = onetime.len(),
            "Encryption plan built"
        );
        Ok(Self { steps: planned })
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    /// Runs every step; steps share no data once planned.
    pub async fn execute(&self, suites: &Suites) -> Result<CascadedData> {
        let layers = try_join_all(self.steps.iter().map(|step| {
            encrypt_step(
                suites,
                &step.message,
                &step.keys,
                step.suite,
                &step.options,
                step.sign.as_ref(),
            )
        }))
        .await?;

        info!(target: "cascade::encryption", layers = layers.len(), "Encryption cascade done");
        Ok(CascadedData::new(layers))
    }
}

/// Encrypts and optionally signs one layer.
///
/// The signature is embedded when the signing suite is the encrypting suite
/// and that suite can seal signatures; otherwise it is detached and computed
/// alongside the encryption.
pub async fn encrypt_step(
    suites: &Suites,
    message: &Message,
    keys: &Keys,
    suite: SuiteId,
    options: &EncryptionOptions,
    sign: Option<&ResolvedSign>,
) -> Result<CascadedLayer> {
    let embed = sign.map_or(false, |s| s.suite == suite && suite.supports_embedded_signature());

    let target = match keys.session_key() {
        Some(key) => EncryptionTarget::Session(key),
        None => EncryptionTarget::Recipients(keys.public_keys()),
    };
    let signers: &[PrivateKey] = if embed { keys.private_keys() } else { &[] };

    let encryption = suites.get(suite).encrypt(message, target, signers, options);
    let detached = async {
        match sign {
            Some(sign) if !embed => suites
                .get(sign.suite)
                .sign(message, keys.private_keys(), &sign.options)
                .await
                .map(Some),
            _ => Ok(None),
        }
    };

    let (encrypted, signature) = try_join(encryption, detached).await?;

    debug!(
        target: "cascade::encryption",
        suite = %suite,
        fragments = encrypted.fragments().len(),
        embedded = embed,
        detached = signature.is_some(),
        "Layer encrypted"
    );
    CascadedLayer::new(Some(encrypted), signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{Curve, KeyParams, SessionKey};
    use crate::crypto::{AeadAlgorithm, CryptoSuite};
    use crate::protocol::{KeyType, SignatureOptions};

    async fn classic_keys() -> Keys {
        let suites = Suites::default();
        let generated = suites
            .get(SuiteId::Classic)
            .generate_key(&KeyParams::Ec { curve: Curve::Curve25519 })
            .await
            .unwrap();
        let (public, private) = match generated {
            GeneratedKey::KeyPair { public, private } => (public, private),
            other => panic!("expected key pair, got {:?}", other),
        };
        Keys::from_objects(
            KeyObjects {
                public_keys: vec![public],
                private_keys: vec![private],
                session_key: None,
            },
            SuiteAssignment::single(SuiteId::Classic),
            &[KeyMode::Encrypt, KeyMode::Sign],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_plan_wires_onetime_keys() {
        let suites = Suites::default();
        let keys = classic_keys().await;
        let procedure = Procedure::new(vec![
            StepConfig::onetime(SuiteId::Nist, KeyParams::Session { length: 32 }),
            StepConfig::onetime(SuiteId::Classic, KeyParams::Ec { curve: Curve::Curve25519 }),
            StepConfig::external(SuiteId::Classic),
        ]);

        let plan = EncryptionPlan::build(&suites, Message::from("payload"), &keys, &procedure)
            .await
            .unwrap();
        let steps = plan.steps();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].message.as_bytes(), b"payload");
        // a raw session key feeds step 1
        assert_eq!(steps[1].message.len(), SessionKey::LENGTH);
        assert_eq!(
            steps[0].keys.session_key().map(|k| k.as_bytes()),
            Some(steps[1].message.as_bytes())
        );
        assert!(steps[1].keys.session_key().is_none());
        assert_eq!(steps[1].keys.public_keys().len(), 1);
        assert!(steps[0].sign.is_none());
    }

    #[tokio::test]
    async fn test_embedded_signature_in_classic_step() {
        let suites = Suites::default();
        let keys = classic_keys().await;
        let sign = ResolvedSign {
            suite: SuiteId::Classic,
            options: SignatureOptions::default(),
        };

        let layer = encrypt_step(
            &suites,
            &Message::from("hi"),
            &keys,
            SuiteId::Classic,
            &EncryptionOptions::default(),
            Some(&sign),
        )
        .await
        .unwrap();

        assert!(layer.signature().is_none());
        assert_eq!(layer.message().unwrap().key_type(), KeyType::PublicKeyEncrypt);
    }

    #[tokio::test]
    async fn test_detached_signature_for_session_step() {
        let suites = Suites::default();
        let signer = classic_keys().await;
        let keys = Keys::from_objects(
            KeyObjects {
                private_keys: signer.private_keys().to_vec(),
                session_key: Some(SessionKey::new(vec![9u8; 32], AeadAlgorithm::Aes256Gcm).unwrap()),
                ..Default::default()
            },
            SuiteAssignment::new(Some(SuiteId::Nist), Some(SuiteId::Classic)),
            &[KeyMode::Encrypt, KeyMode::Sign],
        )
        .unwrap();
        let sign = ResolvedSign {
            suite: SuiteId::Classic,
            options: SignatureOptions::default(),
        };

        let layer = encrypt_step(
            &suites,
            &Message::from("hi"),
            &keys,
            SuiteId::Nist,
            &EncryptionOptions::default(),
            Some(&sign),
        )
        .await
        .unwrap();

        let signature = layer.signature().expect("detached signature");
        assert_eq!(signature.suite(), SuiteId::Classic);
        assert_eq!(layer.message().unwrap().key_type(), KeyType::SessionKeyEncrypt);
    }

    #[tokio::test]
    async fn test_anchor_suite_mismatch() {
        let suites = Suites::default();
        let keys = classic_keys().await;
        let procedure = Procedure::new(vec![StepConfig::external(SuiteId::Nist)]);

        let result = EncryptionPlan::build(&suites, Message::from("x"), &keys, &procedure).await;
        assert_eq!(result.unwrap_err(), CascadeError::UnmatchedKeyTypeToEncryptionSuite);

        let procedure = Procedure::new(vec![StepConfig::external(SuiteId::Classic)
            .signed(Some(SuiteId::Nist), SignatureOptions::default())]);
        let result = EncryptionPlan::build(&suites, Message::from("x"), &keys, &procedure).await;
        assert_eq!(result.unwrap_err(), CascadeError::UnmatchedKeyTypeToSigningSuite);
    }
}
