use serde::{Deserialize, Serialize};

/// Named bundle of algorithm parameter choices.
///
/// The preset is the only algorithm identifier an envelope carries; it fixes
/// the ML-KEM parameter set, the HKDF hash, the salt length, and every byte
/// size the engine validates against.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// ML-KEM-768 + HKDF-SHA256.
    Normal = 1,
    /// ML-KEM-1024 + HKDF-SHA512.
    HighSecurity = 2,
}

/// HKDF hash selected by a preset.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KdfHash {
    Sha256,
    Sha512,
}

/// AES-GCM nonce length, fixed by the cipher for both presets.
pub const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;
/// AES-256 session key length.
pub const SYM_KEY_LEN: usize = 32;
/// ML-KEM shared secret length, 32 bytes for both parameter sets.
pub const SHARED_SECRET_LEN: usize = 32;

impl Preset {
    pub const fn public_key_len(self) -> usize {
        match self {
            Preset::Normal => 1184,
            Preset::HighSecurity => 1568,
        }
    }

    pub const fn secret_key_len(self) -> usize {
        match self {
            Preset::Normal => 2400,
            Preset::HighSecurity => 3168,
        }
    }

    pub const fn kem_ciphertext_len(self) -> usize {
        match self {
            Preset::Normal => 1088,
            Preset::HighSecurity => 1568,
        }
    }

    pub const fn salt_len(self) -> usize {
        match self {
            Preset::Normal => 32,
            Preset::HighSecurity => 64,
        }
    }

    pub const fn kdf_hash(self) -> KdfHash {
        match self {
            Preset::Normal => KdfHash::Sha256,
            Preset::HighSecurity => KdfHash::Sha512,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Normal => "normal",
            Preset::HighSecurity => "high_security",
        }
    }
}

impl Default for Preset {
    fn default() -> Self {
        Preset::Normal
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
