//! Централизованная конфигурация
//!
//! All tunables of the engine live here so that suites and the data model
//! never hardcode lengths.

use std::sync::OnceLock;

/// Process-wide configuration (singleton)
static GLOBAL_CONFIG: OnceLock<Config> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // ============================================
    // KEY IDS
    // ============================================

    /// Length of a derived KeyId in bytes
    pub key_id_length: usize,

    /// Shortest id two KeyIds may be compared on by prefix
    pub min_key_id_match_length: usize,

    /// Length of the packet-level short id used by the classic suite
    pub short_key_id_length: usize,

    // ============================================
    // SYMMETRIC PARAMETERS
    // ============================================

    /// Content key length for per-recipient key wrapping (bytes)
    pub content_key_length: usize,

    /// HKDF salt length for ECDH-derived keys (bytes)
    pub hkdf_salt_length: usize,

    // ============================================
    // PRIVATE KEY PROTECTION
    // ============================================

    /// PBKDF2 iterations when locking a private key with a passphrase
    pub pbkdf2_iterations: u32,

    /// Upper bound on the iteration count a locked key may ask for
    pub max_pbkdf2_iterations: u32,

    /// Upper bound on the scrypt cost (N) of an encrypted PKCS#8 key
    pub max_scrypt_cost: u64,

    /// PBKDF2 salt length (bytes)
    pub salt_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_id_length: 32,
            min_key_id_match_length: 8,
            short_key_id_length: 8,

            content_key_length: 32,
            hkdf_salt_length: 32,

            pbkdf2_iterations: 100_000,
            max_pbkdf2_iterations: 10_000_000,
            max_scrypt_cost: 1 << 20,
            salt_length: 32,
        }
    }
}

impl Config {
    /// Defaults overridden by `CASCADE_*` environment variables when present
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CASCADE_KEY_ID_LENGTH") {
            if let Ok(parsed) = val.parse::<usize>() {
                // a KeyId never gets shorter than what prefix matching accepts
                config.key_id_length = parsed.clamp(config.min_key_id_match_length, 32);
            }
        }

        if let Ok(val) = std::env::var("CASCADE_PBKDF2_ITERATIONS") {
            if let Ok(parsed) = val.parse::<u32>() {
                config.pbkdf2_iterations = parsed.clamp(1, config.max_pbkdf2_iterations);
            }
        }

        config
    }

    /// Checks the values suites rely on.
    ///
    /// # Errors
    ///
    /// Names the first inconsistent field
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.min_key_id_match_length == 0 {
            return Err("min_key_id_match_length must be positive");
        }
        if self.key_id_length < self.min_key_id_match_length || self.key_id_length > 32 {
            return Err("key_id_length must lie between min_key_id_match_length and 32");
        }
        if self.short_key_id_length < self.min_key_id_match_length
            || self.short_key_id_length > self.key_id_length
        {
            return Err("short_key_id_length must lie between min_key_id_match_length and key_id_length");
        }
        if self.content_key_length != 32 {
            return Err("content_key_length must be 32");
        }
        if self.pbkdf2_iterations == 0 || self.pbkdf2_iterations > self.max_pbkdf2_iterations {
            return Err("pbkdf2_iterations must lie between 1 and max_pbkdf2_iterations");
        }
        if self.max_scrypt_cost == 0 {
            return Err("max_scrypt_cost must be positive");
        }
        Ok(())
    }

    /// Global instance, initialised with defaults on first access
    pub fn global() -> &'static Config {
        GLOBAL_CONFIG.get_or_init(Config::default)
    }

    /// # Errors
    ///
    /// Fails if the global configuration is already initialised
    pub fn init() -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(Self::default())
            .map_err(|_| "Config already initialized")
    }

    /// # Errors
    ///
    /// Fails if the global configuration is already initialised
    pub fn init_from_env() -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(Self::from_env())
            .map_err(|_| "Config already initialized")
    }

    /// # Errors
    ///
    /// Fails if `config` does not validate or the global configuration is
    /// already initialised
    pub fn init_with(config: Config) -> Result<(), &'static str> {
        config.validate()?;
        GLOBAL_CONFIG
            .set(config)
            .map_err(|_| "Config already initialized")
    }

    pub fn is_initialized() -> bool {
        GLOBAL_CONFIG.get().is_some()
    }
}
