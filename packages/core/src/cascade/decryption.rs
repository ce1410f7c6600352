// Каскадное расшифрование
//
// Strictly sequential, outermost layer first: each layer yields the secret
// that unlocks the layer below it.

use crate::crypto::keys::{KeyFormat, PublicKey, SessionKey};
use crate::crypto::provider::DecryptionKeys;
use crate::crypto::{CryptoSuite, SuiteId, Suites};
use crate::error::{CascadeError, Result};
use crate::keyring::{KeyMode, KeyObjects, Keys, SuiteAssignment};
use crate::message::Message;
use crate::protocol::{CascadedData, CascadedLayer, Decrypted, KeyType};
use tracing::{debug, info};

/// Decrypts one layer and checks its signatures.
///
/// A detached signature wins over embedded ones: when the layer carries
/// one, embedded signatures are not checked and the detached one is
/// verified with whatever verify keys `keys` holds (none means every
/// fragment comes back unverifiable). `index` is the layer's position in
/// its envelope, if it came from one.
pub async fn decrypt_layer(
    suites: &Suites,
    layer: &CascadedLayer,
    keys: &Keys,
    index: Option<usize>,
) -> Result<Decrypted> {
    let missing = || index.map_or(CascadeError::NoEncryptedMessage, CascadeError::InvalidEncryptedMessage);
    let message = layer.message().ok_or_else(missing)?;
    if message.is_detached() {
        return Err(missing());
    }
    if !keys.can_decrypt() {
        return Err(CascadeError::UnmatchedKeyMode("decrypt"));
    }
    if keys.suite().encrypt_decrypt != Some(message.suite()) {
        return Err(CascadeError::UnmatchedKeyTypeToEncryptionSuite);
    }

    let candidates = match keys.session_key() {
        Some(key) => DecryptionKeys::Session(key),
        None => DecryptionKeys::Private(keys.private_keys()),
    };
    let verify_keys: &[PublicKey] = if keys.can_verify() { keys.public_keys() } else { &[] };
    let embedded_verifiers: &[PublicKey] = match layer.signature() {
        None if message.suite().supports_embedded_signature() => verify_keys,
        _ => &[],
    };

    let mut decrypted = suites
        .get(message.suite())
        .decrypt(message, candidates, embedded_verifiers)
        .await?;

    if let Some(signature) = layer.signature() {
        let plaintext = Message::binary(decrypted.data.clone());
        decrypted.signatures = suites
            .get(signature.suite())
            .verify(&plaintext, signature, verify_keys)
            .await?;
    }

    debug!(
        target: "cascade::decryption",
        layer = ?index,
        suite = %message.suite(),
        signatures = decrypted.signatures.len(),
        "Layer decrypted"
    );
    Ok(decrypted)
}

/// Keys for layer `index`, built around the secret recovered from the layer
/// above it. Verify keys of the caller are attached when the layer carries
/// something to verify in their suite.
async fn next_layer_keys(
    suites: &Suites,
    recovered: &[u8],
    layer: &CascadedLayer,
    index: usize,
    external: &Keys,
) -> Result<Keys> {
    let message = layer
        .message()
        .ok_or(CascadeError::InvalidEncryptedMessage(index))?;
    let suite = message.suite();

    let mut objects = KeyObjects::default();
    match message.key_type() {
        KeyType::SessionKeyEncrypt => {
            let algorithm = message.options().aead.unwrap_or_else(|| suite.session_algorithm());
            objects.session_key = Some(SessionKey::new(recovered.to_vec(), algorithm)?);
        }
        KeyType::PublicKeyEncrypt => {
            let key = suites
                .get(suite)
                .import_private_key(recovered, KeyFormat::Der, None)
                .await?;
            objects.private_keys = vec![key];
        }
        KeyType::PublicKeySign => return Err(CascadeError::InvalidEncryptedMessage(index)),
    }

    let mut modes = vec![KeyMode::Decrypt];
    let mut assignment = SuiteAssignment::new(Some(suite), None);

    let sign_suite: Option<SuiteId> = match layer.signature() {
        Some(signature) => Some(signature.suite()),
        None if suite.supports_embedded_signature() => Some(suite),
        None => None,
    };
    if let (Some(sign_suite), true) = (sign_suite, external.can_verify()) {
        let verifiers: Vec<PublicKey> = external
            .public_keys()
            .iter()
            .filter(|k| k.suite() == sign_suite)
            .cloned()
            .collect();
        if !verifiers.is_empty() {
            objects.public_keys = verifiers;
            modes.push(KeyMode::Verify);
            assignment.sign_verify = Some(sign_suite);
        }
    }

    Keys::from_objects(objects, assignment, &modes)
}

/// Peels every layer from the anchor down to layer 0. Results are ordered
/// by layer index; `[0].data` is the original message.
pub async fn decrypt_cascade(suites: &Suites, data: &CascadedData, keys: &Keys) -> Result<Vec<Decrypted>> {
    if data.is_empty() {
        return Err(CascadeError::InvalidFormat("envelope has no layers".to_string()));
    }

    let mut results = Vec::with_capacity(data.len());
    let mut current: Option<Keys> = None;

    for index in (0..data.len()).rev() {
        let layer_keys = current.as_ref().unwrap_or(keys);
        let decrypted = decrypt_layer(suites, data.layer(index)?, layer_keys, Some(index)).await?;

        if index > 0 {
            current = Some(
                next_layer_keys(suites, &decrypted.data, data.layer(index - 1)?, index - 1, keys)
                    .await?,
            );
        }
        results.push(decrypted);
    }

    results.reverse();
    info!(target: "cascade::decryption", layers = results.len(), "Decryption cascade done");
    Ok(results)
}
