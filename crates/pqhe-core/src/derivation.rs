//! HKDF session-key derivation.
//!
//! The salt is deterministic from the shared secret, so the envelope does
//! not carry it: `salt = H(shared_secret || SALT_DOMAIN)` with the preset
//! hash, whose digest length equals the preset salt length. The shared
//! secret is fresh per operation, which is what makes the fixed derivation
//! sound.

use crate::error::{Error, Result};
use crate::preset::{KdfHash, Preset, SHARED_SECRET_LEN, SYM_KEY_LEN};
use hkdf::Hkdf;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

/// HKDF info string, fixed for the v2 wire format.
pub const INFO: &[u8] = b"HybridEncryption-v2.0";

const SALT_DOMAIN: &[u8] = b"HybridEncryption-salt";

/// Deterministic salt for the preset: one digest of the preset hash over
/// `shared_secret || SALT_DOMAIN`.
pub fn derive_salt(preset: Preset, shared_secret: &[u8; SHARED_SECRET_LEN]) -> Zeroizing<Vec<u8>> {
    let salt = match preset.kdf_hash() {
        KdfHash::Sha256 => {
            let mut h = Sha256::new();
            h.update(shared_secret);
            h.update(SALT_DOMAIN);
            h.finalize().to_vec()
        }
        KdfHash::Sha512 => {
            let mut h = Sha512::new();
            h.update(shared_secret);
            h.update(SALT_DOMAIN);
            h.finalize().to_vec()
        }
    };
    debug_assert_eq!(salt.len(), preset.salt_len());
    Zeroizing::new(salt)
}

/// Derive the 32-byte AES-256 session key from a KEM shared secret.
pub fn derive_session_key(
    preset: Preset,
    shared_secret: &Secret<[u8; SHARED_SECRET_LEN]>,
) -> Result<Secret<[u8; SYM_KEY_LEN]>> {
    let ikm = shared_secret.expose_secret();
    let salt = derive_salt(preset, ikm);
    let mut okm = Zeroizing::new([0u8; SYM_KEY_LEN]);
    match preset.kdf_hash() {
        KdfHash::Sha256 => Hkdf::<Sha256>::new(Some(salt.as_slice()), ikm)
            .expand(INFO, &mut *okm)
            .map_err(|_| Error::derivation("derive_session_key", "hkdf-sha256 expand failed"))?,
        KdfHash::Sha512 => Hkdf::<Sha512>::new(Some(salt.as_slice()), ikm)
            .expand(INFO, &mut *okm)
            .map_err(|_| Error::derivation("derive_session_key", "hkdf-sha512 expand failed"))?,
    }
    Ok(Secret::new(*okm))
}
