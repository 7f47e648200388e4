//! The hybrid encrypt/decrypt pipelines.
//!
//! Encrypt: serialize → ML-KEM encapsulate → HKDF session key → AES-GCM.
//! Decrypt runs the same steps in reverse, with the AEAD tag check as the
//! single authentication point. Intermediate secrets (shared secret,
//! session key) live in `secrecy::Secret` and are wiped on every exit
//! path, success or failure.

use crate::envelope::EncryptedEnvelope;
use crate::error::{Error, Result};
use crate::preset::Preset;
use crate::{aead, derivation, pq, security, serialization};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Encrypt a structured value to a recipient public key.
pub fn encrypt<T: Serialize + ?Sized>(
    value: &T,
    public_key: &[u8],
    preset: Preset,
) -> Result<EncryptedEnvelope> {
    if public_key.len() != preset.public_key_len() {
        return Err(Error::asymmetric(
            "encrypt",
            preset,
            format!(
                "public key length {}, expected {}",
                public_key.len(),
                preset.public_key_len()
            ),
        ));
    }

    let serialized = serialization::to_bytes(value)?;
    let (shared_secret, kem_ciphertext) = pq::encapsulate(preset, public_key)?;
    let session_key = derivation::derive_session_key(preset, &shared_secret)?;
    let nonce = security::random_nonce()?;
    let ciphertext = aead::seal(preset, &session_key, &nonce, &serialized, None)?;

    Ok(EncryptedEnvelope::from_parts(
        preset,
        &ciphertext,
        &kem_ciphertext,
        &nonce,
    ))
}

/// Decrypt an envelope with one secret key. The envelope's preset wins over
/// any caller-side configuration; the secret key must match it.
pub fn decrypt(envelope: &EncryptedEnvelope, secret_key: &[u8]) -> Result<Value> {
    let decoded = envelope.decode_parts()?;
    let preset = decoded.preset;

    if secret_key.len() != preset.secret_key_len() {
        return Err(Error::asymmetric(
            "decrypt",
            preset,
            format!(
                "secret key length {}, expected {}",
                secret_key.len(),
                preset.secret_key_len()
            ),
        ));
    }

    // Implicit rejection: a wrong key or tampered kem ciphertext still
    // yields 32 bytes here; the tag check below is the authentication gate.
    let shared_secret = pq::decapsulate(preset, &decoded.kem_ciphertext, secret_key)?;
    let session_key = derivation::derive_session_key(preset, &shared_secret)?;
    let serialized = aead::open(
        preset,
        &session_key,
        &decoded.nonce,
        &decoded.encrypted_content,
        None,
    )?;

    serialization::from_bytes(&serialized)
}

/// Decrypt trying an ordered list of secret keys, first match wins. Used
/// for the rotation grace window, where ciphertext produced against the
/// previous key must stay readable.
///
/// The list must be non-empty; all-fail surfaces the error from the last
/// attempt.
pub fn decrypt_with_keys<K: AsRef<[u8]>>(
    envelope: &EncryptedEnvelope,
    secret_keys: &[K],
) -> Result<Value> {
    if secret_keys.is_empty() {
        return Err(Error::validation(
            "decrypt",
            "secret key list is empty; callers must supply at least the current key",
        ));
    }

    let mut last_err = None;
    for (index, key) in secret_keys.iter().enumerate() {
        match decrypt(envelope, key.as_ref()) {
            Ok(value) => {
                if index > 0 {
                    debug!(index, "decryption succeeded with non-primary key");
                }
                return Ok(value);
            }
            Err(e) => last_err = Some(e),
        }
    }
    // Non-empty list, so at least one attempt recorded an error.
    Err(last_err.unwrap_or_else(|| Error::validation("decrypt", "no decryption attempt was made")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_lengths_match_preset() {
        use crate::preset::{NONCE_LEN, TAG_LEN};
        let value = json!({"k": "v"});
        let serialized_len = serialization::to_bytes(&value).unwrap().len();
        for preset in [Preset::Normal, Preset::HighSecurity] {
            let (pk, _) = pq::keypair(preset);
            let envelope = encrypt(&value, &pk, preset).unwrap();
            let decoded = envelope.decode_parts().unwrap();
            assert_eq!(decoded.kem_ciphertext.len(), preset.kem_ciphertext_len());
            assert_eq!(decoded.nonce.len(), NONCE_LEN);
            assert_eq!(decoded.encrypted_content.len(), serialized_len + TAG_LEN);
        }
    }

    #[test]
    fn same_value_encrypts_to_different_envelopes() {
        let (pk, _) = pq::keypair(Preset::Normal);
        let value = json!({"x": 1});
        let a = encrypt(&value, &pk, Preset::Normal).unwrap();
        let b = encrypt(&value, &pk, Preset::Normal).unwrap();
        // Fresh encapsulation and nonce per operation.
        assert_ne!(a.cipher_text, b.cipher_text);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.encrypted_content, b.encrypted_content);
    }

    #[test]
    fn grace_list_order_is_respected() {
        let (pk_old, sk_old) = pq::keypair(Preset::Normal);
        let (_, sk_new) = pq::keypair(Preset::Normal);
        let envelope = encrypt(&json!({"x": 1}), &pk_old, Preset::Normal).unwrap();
        // Current key first, previous second: still decrypts.
        let value = decrypt_with_keys(&envelope, &[&sk_new, &sk_old]).unwrap();
        assert_eq!(value, json!({"x": 1}));
    }

    #[test]
    fn empty_key_list_is_a_programmer_error() {
        let (pk, _) = pq::keypair(Preset::Normal);
        let envelope = encrypt(&json!(1), &pk, Preset::Normal).unwrap();
        let keys: [&[u8]; 0] = [];
        let err = decrypt_with_keys(&envelope, &keys).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn all_keys_failing_surfaces_last_error() {
        let (pk, _) = pq::keypair(Preset::Normal);
        let (_, sk_a) = pq::keypair(Preset::Normal);
        let (_, sk_b) = pq::keypair(Preset::Normal);
        let envelope = encrypt(&json!(1), &pk, Preset::Normal).unwrap();
        let err = decrypt_with_keys(&envelope, &[&sk_a, &sk_b]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AlgorithmSymmetric);
    }
}
