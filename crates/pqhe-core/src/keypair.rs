//! Key pair material and lifecycle checks.

use crate::error::{Error, Result};
use crate::preset::Preset;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret key bytes that are wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        SecretBytes(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrite the material in place. Idempotent; drop wipes again.
    pub fn wipe(&mut self) {
        self.0.zeroize();
    }
}

impl AsRef<[u8]> for SecretBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes({} bytes)", self.0.len())
    }
}

/// Metadata persisted next to the key material as `metadata.json`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetadata {
    pub preset: Preset,
    /// Monotonically increasing, unique per manager, starts at 1.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct KeyPair {
    pub public_key: Vec<u8>,
    pub secret_key: SecretBytes,
    pub metadata: KeyMetadata,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("fingerprint", &self.fingerprint())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl KeyPair {
    /// Generate a fresh ML-KEM key pair with expiry `created_at +
    /// expiry_months`.
    pub fn generate(preset: Preset, version: u64, expiry_months: u32) -> Result<Self> {
        if version == 0 {
            return Err(Error::validation("generate_key_pair", "version must be positive"));
        }
        let created_at = Utc::now();
        let expires_at = created_at
            .checked_add_months(Months::new(expiry_months))
            .ok_or_else(|| Error::manager("generate_key_pair", "expiry date overflow"))?;
        if expires_at <= created_at {
            return Err(Error::validation(
                "generate_key_pair",
                "expiry must be after creation",
            ));
        }

        let (public_key, secret_key) = crate::pq::keypair(preset);
        Ok(KeyPair {
            public_key,
            secret_key: SecretBytes::new(secret_key),
            metadata: KeyMetadata {
                preset,
                version,
                created_at,
                expires_at,
            },
        })
    }

    /// Structural validation: every problem found, not just the first.
    pub fn validation_issues(&self) -> Vec<String> {
        let preset = self.metadata.preset;
        let mut issues = Vec::new();
        if self.public_key.is_empty() {
            issues.push("public key is empty".to_string());
        } else if self.public_key.len() != preset.public_key_len() {
            issues.push(format!(
                "public key length {}, preset {preset} requires {}",
                self.public_key.len(),
                preset.public_key_len()
            ));
        }
        if self.secret_key.is_empty() {
            issues.push("secret key is empty".to_string());
        } else if self.secret_key.len() != preset.secret_key_len() {
            issues.push(format!(
                "secret key length {}, preset {preset} requires {}",
                self.secret_key.len(),
                preset.secret_key_len()
            ));
        }
        if self.metadata.version == 0 {
            issues.push("version must be positive".to_string());
        }
        if self.metadata.expires_at <= self.metadata.created_at {
            issues.push("expiry is not after creation".to_string());
        }
        issues
    }

    pub fn validate(&self) -> Result<()> {
        let issues = self.validation_issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::validation("validate_key_pair", issues.join("; ")))
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.metadata.expires_at
    }

    /// Short BLAKE3 fingerprint of the public key, for logs and status.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.public_key);
        hex::encode(&hash.as_bytes()[..8])
    }

    /// Overwrite the secret material in place, ahead of drop.
    pub fn wipe_secret(&mut self) {
        self.secret_key.wipe();
    }
}
