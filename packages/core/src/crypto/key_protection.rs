// Шифрование приватных ключей паролем
// PBKDF2 для деривации ключа + AES-256-GCM для шифрования

use crate::config::Config;
use crate::error::{CascadeError, Result};
use aes_gcm::{
    aead::{generic_array::typenum::Unsigned, Aead, AeadCore, KeyInit},
    Aes256Gcm, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = <Aes256Gcm as AeadCore>::NonceSize::USIZE;

/// Secret bytes sealed under a passphrase. The iteration count travels with
/// the data so keys stay readable after the configured default changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedSecret {
    #[serde(with = "serde_bytes")]
    pub salt: Vec<u8>,
    pub iterations: u32,
    /// nonce || ciphertext
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Деривировать ключ из пароля с использованием PBKDF2
pub fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> Result<Zeroizing<[u8; KEY_LENGTH]>> {
    if passphrase.is_empty() {
        return Err(CascadeError::FailedToDecryptPrivateKey(
            "Passphrase cannot be empty".to_string(),
        ));
    }

    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut *key);
    Ok(key)
}

/// Генерировать случайную соль
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; Config::global().salt_length];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Seal `secret` with the configured iteration count
pub fn lock(secret: &[u8], passphrase: &str) -> Result<LockedSecret> {
    lock_with_iterations(secret, passphrase, Config::global().pbkdf2_iterations)
}

pub fn lock_with_iterations(secret: &[u8], passphrase: &str, iterations: u32) -> Result<LockedSecret> {
    if passphrase.is_empty() {
        return Err(CascadeError::Encryption("Passphrase cannot be empty".to_string()));
    }
    let salt = generate_salt();
    let key = derive_key(passphrase, &salt, iterations)?;
    let cipher = Aes256Gcm::new((&*key).into());
    let data = encrypt_data(&cipher, secret)?;
    Ok(LockedSecret {
        salt,
        iterations,
        data,
    })
}

/// # Errors
/// `FailedToDecryptPrivateKey` on a wrong passphrase or damaged data,
/// `InvalidKeyFormat` when the stored iteration count is out of bounds
pub fn unlock(locked: &LockedSecret, passphrase: &str) -> Result<Zeroizing<Vec<u8>>> {
    let max = Config::global().max_pbkdf2_iterations;
    if locked.iterations == 0 || locked.iterations > max {
        return Err(CascadeError::InvalidKeyFormat(format!(
            "PBKDF2 iteration count {} outside 1..={}",
            locked.iterations, max
        )));
    }
    let key = derive_key(passphrase, &locked.salt, locked.iterations)?;
    let cipher = Aes256Gcm::new((&*key).into());
    decrypt_data(&cipher, &locked.data)
}

/// Зашифровать данные с использованием AES-256-GCM
fn encrypt_data(cipher: &Aes256Gcm, data: &[u8]) -> Result<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, data)
        .map_err(|e| CascadeError::Encryption(format!("Key protection failed: {}", e)))?;

    // nonce + ciphertext
    let mut result = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Расшифровать данные с использованием AES-256-GCM
fn decrypt_data(cipher: &Aes256Gcm, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if data.len() < NONCE_LENGTH {
        return Err(CascadeError::FailedToDecryptPrivateKey(
            "Invalid ciphertext: too short".to_string(),
        ));
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LENGTH);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CascadeError::FailedToDecryptPrivateKey("wrong passphrase".to_string()))?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_ITERATIONS: u32 = 1_000;

    #[test]
    fn test_derive_key_is_deterministic() {
        let salt = generate_salt();
        let key1 = derive_key("test_password_123", &salt, TEST_ITERATIONS).unwrap();
        let key2 = derive_key("test_password_123", &salt, TEST_ITERATIONS).unwrap();
        // Одинаковый пароль и соль должны давать одинаковый ключ
        assert_eq!(&*key1, &*key2);

        let other = derive_key("test_password_123", &generate_salt(), TEST_ITERATIONS).unwrap();
        assert_ne!(&*key1, &*other);
    }

    #[test]
    fn test_lock_unlock() {
        let secret = [7u8; 64];
        let locked = lock_with_iterations(&secret, "correct horse", TEST_ITERATIONS).unwrap();
        assert_ne!(locked.data[NONCE_LENGTH..], secret[..]);

        let unlocked = unlock(&locked, "correct horse").unwrap();
        assert_eq!(unlocked.as_slice(), &secret[..]);
    }

    #[test]
    fn test_unlock_with_wrong_passphrase() {
        let locked = lock_with_iterations(b"secret", "right", TEST_ITERATIONS).unwrap();
        assert!(matches!(
            unlock(&locked, "wrong"),
            Err(CascadeError::FailedToDecryptPrivateKey(_))
        ));
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(matches!(
            lock_with_iterations(b"secret", "", TEST_ITERATIONS),
            Err(CascadeError::Encryption(_))
        ));
    }

    #[test]
    fn test_unlock_bounds_iterations() {
        let mut locked = lock_with_iterations(b"secret", "right", TEST_ITERATIONS).unwrap();
        locked.iterations = u32::MAX;
        assert!(matches!(
            unlock(&locked, "right"),
            Err(CascadeError::InvalidKeyFormat(_))
        ));

        locked.iterations = 0;
        assert!(matches!(
            unlock(&locked, "right"),
            Err(CascadeError::InvalidKeyFormat(_))
        ));
    }
}
