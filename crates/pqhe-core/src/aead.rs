//! AES-256-GCM, the authenticated half of the hybrid construction.
//!
//! A successful `open` is the sole proof that the caller holds the right
//! secret key and the envelope was not tampered with; the KEM layer never
//! fails on bad input (implicit rejection).

use crate::error::{Error, Result};
use crate::preset::{Preset, NONCE_LEN, SYM_KEY_LEN, TAG_LEN};
use aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use secrecy::{ExposeSecret, Secret};

fn cipher(key: &Secret<[u8; SYM_KEY_LEN]>) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.expose_secret()))
}

/// Encrypt; the 16-byte authentication tag is appended to the ciphertext.
pub fn seal(
    preset: Preset,
    key: &Secret<[u8; SYM_KEY_LEN]>,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let payload = Payload {
        msg: plaintext,
        aad: aad.unwrap_or(&[]),
    };
    cipher(key)
        .encrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| Error::symmetric("encrypt", preset))
}

/// Decrypt and verify. Tag mismatch (wrong key or tampered ciphertext,
/// indistinguishable by design) fails with `AlgorithmSymmetric`.
pub fn open(
    preset: Preset,
    key: &Secret<[u8; SYM_KEY_LEN]>,
    nonce: &[u8; NONCE_LEN],
    ciphertext_and_tag: &[u8],
    aad: Option<&[u8]>,
) -> Result<Vec<u8>> {
    if ciphertext_and_tag.len() < TAG_LEN {
        return Err(Error::validation(
            "decrypt",
            format!(
                "ciphertext length {} shorter than the {TAG_LEN}-byte tag",
                ciphertext_and_tag.len()
            ),
        ));
    }
    let payload = Payload {
        msg: ciphertext_and_tag,
        aad: aad.unwrap_or(&[]),
    };
    cipher(key)
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| Error::symmetric("decrypt", preset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Secret<[u8; SYM_KEY_LEN]> {
        Secret::new([byte; SYM_KEY_LEN])
    }

    #[test]
    fn seal_open_round_trip() {
        let k = key(7);
        let nonce = [9u8; NONCE_LEN];
        let pt = b"hello hybrid";
        let ct = seal(Preset::Normal, &k, &nonce, pt, None).unwrap();
        assert_eq!(ct.len(), pt.len() + TAG_LEN);
        let back = open(Preset::Normal, &k, &nonce, &ct, None).unwrap();
        assert_eq!(back, pt);
    }

    #[test]
    fn tampered_ciphertext_fails_tag_check() {
        let k = key(7);
        let nonce = [9u8; NONCE_LEN];
        let mut ct = seal(Preset::Normal, &k, &nonce, b"payload", None).unwrap();
        ct[3] ^= 0x80;
        let err = open(Preset::Normal, &k, &nonce, &ct, None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AlgorithmSymmetric);
    }

    #[test]
    fn wrong_key_fails_tag_check() {
        let nonce = [0u8; NONCE_LEN];
        let ct = seal(Preset::Normal, &key(1), &nonce, b"payload", None).unwrap();
        let err = open(Preset::Normal, &key(2), &nonce, &ct, None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AlgorithmSymmetric);
    }

    #[test]
    fn aad_mismatch_fails_tag_check() {
        let k = key(5);
        let nonce = [1u8; NONCE_LEN];
        let ct = seal(Preset::Normal, &k, &nonce, b"payload", Some(b"ctx-a")).unwrap();
        let err = open(Preset::Normal, &k, &nonce, &ct, Some(b"ctx-b")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AlgorithmSymmetric);
    }

    #[test]
    fn truncated_ciphertext_rejected_before_primitive() {
        let err = open(Preset::Normal, &key(0), &[0u8; NONCE_LEN], &[0u8; 8], None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let k = key(3);
        let nonce = [2u8; NONCE_LEN];
        let ct = seal(Preset::Normal, &k, &nonce, b"", None).unwrap();
        assert_eq!(ct.len(), TAG_LEN);
        assert_eq!(open(Preset::Normal, &k, &nonce, &ct, None).unwrap(), b"");
    }
}
