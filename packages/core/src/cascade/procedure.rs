// Процедура каскада
//
// Ordered steps as the caller configures them, e.g.
//
//   [{"encrypt": {"suite": "classic", "onetimeKey": {"keyParams": {"type": "session", "length": 32}}}},
//    {"encrypt": {"suite": "nist", "externalKey": true}, "sign": {"required": true, "options": {"hash": "SHA-256"}}}]

use crate::crypto::keys::KeyParams;
use crate::crypto::SuiteId;
use crate::error::{CascadeError, Result};
use crate::keyring::Keys;
use crate::protocol::{EncryptionOptions, SignatureOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnetimeKey {
    pub key_params: KeyParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptSpec {
    pub suite: SuiteId,
    #[serde(default)]
    pub external_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onetime_key: Option<OnetimeKey>,
    #[serde(default)]
    pub options: EncryptionOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignSpec {
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<SuiteId>,
    #[serde(default)]
    pub options: SignatureOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    pub encrypt: EncryptSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<SignSpec>,
}

impl StepConfig {
    /// Step bound to the caller's own keys
    pub fn external(suite: SuiteId) -> Self {
        Self {
            encrypt: EncryptSpec {
                suite,
                external_key: true,
                onetime_key: None,
                options: EncryptionOptions::default(),
            },
            sign: None,
        }
    }

    /// Step that encrypts under a freshly generated key
    pub fn onetime(suite: SuiteId, key_params: KeyParams) -> Self {
        Self {
            encrypt: EncryptSpec {
                suite,
                external_key: false,
                onetime_key: Some(OnetimeKey { key_params }),
                options: EncryptionOptions::default(),
            },
            sign: None,
        }
    }

    pub fn with_options(mut self, options: EncryptionOptions) -> Self {
        self.encrypt.options = options;
        self
    }

    pub fn signed(mut self, suite: Option<SuiteId>, options: SignatureOptions) -> Self {
        self.sign = Some(SignSpec {
            required: true,
            suite,
            options,
        });
        self
    }

    pub fn sign_required(&self) -> bool {
        self.sign.as_ref().map_or(false, |s| s.required)
    }
}

/// Signing a step actually performs once defaults are filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSign {
    pub suite: SuiteId,
    pub options: SignatureOptions,
}

/// Fill a step's `SignSpec` with the anchor's settings, then with the keys'
/// `sign_verify` suite. Whatever the anchor sets takes precedence over the
/// step's own values. `None` when the step does not sign.
pub(crate) fn resolve_sign(
    step: &StepConfig,
    anchor: &StepConfig,
    keys: &Keys,
) -> Result<Option<ResolvedSign>> {
    let own = match step.sign.as_ref().filter(|s| s.required) {
        Some(own) => own,
        None => return Ok(None),
    };
    let inherited = anchor.sign.as_ref();

    let suite = inherited
        .and_then(|s| s.suite)
        .or(own.suite)
        .or(keys.suite().sign_verify)
        .ok_or(CascadeError::NoSuiteAssigned("sign_verify"))?;

    let options = match inherited {
        Some(anchor_sign) if anchor_sign.options.hash.is_some() => anchor_sign.options.clone(),
        _ => own.options.clone(),
    };

    Ok(Some(ResolvedSign { suite, options }))
}

/// Ordered cascade steps; the last one is the anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Procedure {
    steps: Vec<StepConfig>,
}

impl Procedure {
    pub fn new(steps: Vec<StepConfig>) -> Self {
        Self { steps }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CascadeError::InvalidFormat(e.to_string()))
    }

    pub fn steps(&self) -> &[StepConfig] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn anchor(&self) -> Option<&StepConfig> {
        self.steps.last()
    }

    /// Structural checks, run before any key is generated
    pub fn validate(&self) -> Result<()> {
        let anchor = self.steps.last().ok_or(CascadeError::EmptyProcedure)?;
        if !anchor.encrypt.external_key {
            return Err(CascadeError::FinalStepMustBeExternalKey);
        }

        for (index, step) in self.steps[..self.steps.len() - 1].iter().enumerate() {
            if step.encrypt.external_key {
                return Err(CascadeError::PrecedenceMustBeExternalKey(index));
            }
            if step.encrypt.onetime_key.is_none() {
                return Err(CascadeError::NoKeyParamsGiven(index));
            }
        }
        Ok(())
    }
}

impl From<Vec<StepConfig>> for Procedure {
    fn from(steps: Vec<StepConfig>) -> Self {
        Self::new(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Curve;
    use crate::crypto::HashAlgorithm;
    use crate::crypto::keys::SessionKey;
    use crate::crypto::AeadAlgorithm;
    use crate::keyring::{KeyMode, KeyObjects, SuiteAssignment};

    fn session_params() -> KeyParams {
        KeyParams::Session { length: 32 }
    }

    fn session_keys(sign_verify: Option<SuiteId>) -> Keys {
        Keys::from_objects(
            KeyObjects {
                session_key: Some(SessionKey::new(vec![7u8; 32], AeadAlgorithm::Aes256Gcm).unwrap()),
                ..Default::default()
            },
            SuiteAssignment::new(Some(SuiteId::Nist), sign_verify),
            &[KeyMode::Encrypt],
        )
        .unwrap()
    }

    #[test]
    fn test_from_json() {
        let procedure = Procedure::from_json(
            r#"[
                {"encrypt": {"suite": "classic", "onetimeKey": {"keyParams": {"type": "ec", "curve": "Curve25519"}}}},
                {"encrypt": {"suite": "nist", "externalKey": true, "options": {"hash": "SHA-384"}},
                 "sign": {"required": true, "suite": "nist", "options": {"hash": "SHA-256"}}}
            ]"#,
        )
        .unwrap();

        assert_eq!(procedure.len(), 2);
        assert_eq!(
            procedure.steps()[0],
            StepConfig::onetime(SuiteId::Classic, KeyParams::Ec { curve: Curve::Curve25519 })
        );
        let anchor = procedure.anchor().unwrap();
        assert!(anchor.encrypt.external_key);
        assert_eq!(anchor.encrypt.options.hash, Some(HashAlgorithm::Sha384));
        assert!(anchor.sign_required());
        assert!(procedure.validate().is_ok());
    }

    #[test]
    fn test_unknown_suite_rejected() {
        let result = Procedure::from_json(r#"[{"encrypt": {"suite": "rsa", "externalKey": true}}]"#);
        assert!(matches!(result, Err(CascadeError::InvalidFormat(_))));
    }

    #[test]
    fn test_structure_errors() {
        assert_eq!(Procedure::new(vec![]).validate(), Err(CascadeError::EmptyProcedure));

        let no_anchor = Procedure::new(vec![StepConfig::onetime(SuiteId::Nist, session_params())]);
        assert_eq!(no_anchor.validate(), Err(CascadeError::FinalStepMustBeExternalKey));

        let two_anchors = Procedure::new(vec![
            StepConfig::external(SuiteId::Nist),
            StepConfig::external(SuiteId::Nist),
        ]);
        assert_eq!(two_anchors.validate(), Err(CascadeError::PrecedenceMustBeExternalKey(0)));

        let mut missing_params = StepConfig::onetime(SuiteId::Nist, session_params());
        missing_params.encrypt.onetime_key = None;
        let procedure = Procedure::new(vec![
            StepConfig::onetime(SuiteId::Nist, session_params()),
            missing_params,
            StepConfig::external(SuiteId::Nist),
        ]);
        assert_eq!(procedure.validate(), Err(CascadeError::NoKeyParamsGiven(1)));
    }

    #[test]
    fn test_resolve_sign_inherits_from_anchor() {
        let sha512 = SignatureOptions {
            hash: Some(HashAlgorithm::Sha512),
        };
        let anchor = StepConfig::external(SuiteId::Nist).signed(Some(SuiteId::Nist), sha512.clone());
        let step = StepConfig::onetime(SuiteId::Classic, session_params())
            .signed(None, SignatureOptions::default());
        let keys = session_keys(None);

        let resolved = resolve_sign(&step, &anchor, &keys).unwrap().unwrap();
        assert_eq!(resolved.suite, SuiteId::Nist);
        assert_eq!(resolved.options, sha512);

        let unsigned = StepConfig::onetime(SuiteId::Classic, session_params());
        assert_eq!(resolve_sign(&unsigned, &anchor, &keys).unwrap(), None);
    }

    #[test]
    fn test_resolve_sign_anchor_takes_precedence() {
        let anchor = StepConfig::external(SuiteId::Nist).signed(
            Some(SuiteId::Nist),
            SignatureOptions {
                hash: Some(HashAlgorithm::Sha384),
            },
        );
        let step = StepConfig::onetime(SuiteId::Classic, session_params()).signed(
            Some(SuiteId::Classic),
            SignatureOptions {
                hash: Some(HashAlgorithm::Sha256),
            },
        );

        let resolved = resolve_sign(&step, &anchor, &session_keys(None)).unwrap().unwrap();
        assert_eq!(resolved.suite, SuiteId::Nist);
        assert_eq!(resolved.options.hash, Some(HashAlgorithm::Sha384));

        // an anchor without a suite or hash leaves the step's own values
        let bare_anchor = StepConfig::external(SuiteId::Nist).signed(None, SignatureOptions::default());
        let resolved = resolve_sign(&step, &bare_anchor, &session_keys(None)).unwrap().unwrap();
        assert_eq!(resolved.suite, SuiteId::Classic);
        assert_eq!(resolved.options.hash, Some(HashAlgorithm::Sha256));
    }

    #[test]
    fn test_resolve_sign_falls_back_to_keys() {
        let anchor = StepConfig::external(SuiteId::Nist).signed(None, SignatureOptions::default());
        let resolved = resolve_sign(&anchor, &anchor, &session_keys(Some(SuiteId::Classic)))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.suite, SuiteId::Classic);

        assert_eq!(
            resolve_sign(&anchor, &anchor, &session_keys(None)),
            Err(CascadeError::NoSuiteAssigned("sign_verify"))
        );
    }
}
