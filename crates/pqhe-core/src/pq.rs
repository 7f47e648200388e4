//! ML-KEM wrappers (FIPS 203) over the `pqcrypto-mlkem` parameter sets.
//!
//! The engine works with raw key bytes so key material can round-trip
//! through storage; every slice is length-checked here before it reaches
//! the primitive. Decapsulation never fails on a tampered ciphertext or a
//! mismatched secret key (implicit rejection): it yields a pseudorandom
//! shared secret and the AEAD tag check downstream is the authentication
//! gate.

use crate::error::{Error, Result};
use crate::preset::{Preset, SHARED_SECRET_LEN};
use pqcrypto_mlkem::{mlkem1024, mlkem768};
use pqcrypto_traits::kem::{
    Ciphertext as CiphertextTrait, PublicKey as PublicKeyTrait, SecretKey as SecretKeyTrait,
    SharedSecret as SharedSecretTrait,
};
use secrecy::Secret;

/// Generate a fresh key pair for the preset, as raw bytes.
pub fn keypair(preset: Preset) -> (Vec<u8>, Vec<u8>) {
    match preset {
        Preset::Normal => {
            let (pk, sk) = mlkem768::keypair();
            (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
        }
        Preset::HighSecurity => {
            let (pk, sk) = mlkem1024::keypair();
            (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
        }
    }
}

/// Encapsulate to a public key: fresh 32-byte shared secret plus the KEM
/// ciphertext that transports it.
pub fn encapsulate(
    preset: Preset,
    public_key: &[u8],
) -> Result<(Secret<[u8; SHARED_SECRET_LEN]>, Vec<u8>)> {
    check_len("encapsulate", preset, "public key", public_key, preset.public_key_len())?;
    match preset {
        Preset::Normal => {
            let pk = mlkem768::PublicKey::from_bytes(public_key)
                .map_err(|_| Error::asymmetric("encapsulate", preset, "malformed public key"))?;
            let (ss, ct) = mlkem768::encapsulate(&pk);
            Ok((secret_from(preset, "encapsulate", ss.as_bytes())?, ct.as_bytes().to_vec()))
        }
        Preset::HighSecurity => {
            let pk = mlkem1024::PublicKey::from_bytes(public_key)
                .map_err(|_| Error::asymmetric("encapsulate", preset, "malformed public key"))?;
            let (ss, ct) = mlkem1024::encapsulate(&pk);
            Ok((secret_from(preset, "encapsulate", ss.as_bytes())?, ct.as_bytes().to_vec()))
        }
    }
}

/// Recover the shared secret from a KEM ciphertext. Always returns 32
/// bytes; a wrong key or tampered ciphertext yields an unrelated secret,
/// not an error.
pub fn decapsulate(
    preset: Preset,
    kem_ciphertext: &[u8],
    secret_key: &[u8],
) -> Result<Secret<[u8; SHARED_SECRET_LEN]>> {
    check_len(
        "decapsulate",
        preset,
        "kem ciphertext",
        kem_ciphertext,
        preset.kem_ciphertext_len(),
    )?;
    check_len("decapsulate", preset, "secret key", secret_key, preset.secret_key_len())?;
    match preset {
        Preset::Normal => {
            let ct = mlkem768::Ciphertext::from_bytes(kem_ciphertext)
                .map_err(|_| Error::asymmetric("decapsulate", preset, "malformed kem ciphertext"))?;
            let sk = mlkem768::SecretKey::from_bytes(secret_key)
                .map_err(|_| Error::asymmetric("decapsulate", preset, "malformed secret key"))?;
            let ss = mlkem768::decapsulate(&ct, &sk);
            secret_from(preset, "decapsulate", ss.as_bytes())
        }
        Preset::HighSecurity => {
            let ct = mlkem1024::Ciphertext::from_bytes(kem_ciphertext)
                .map_err(|_| Error::asymmetric("decapsulate", preset, "malformed kem ciphertext"))?;
            let sk = mlkem1024::SecretKey::from_bytes(secret_key)
                .map_err(|_| Error::asymmetric("decapsulate", preset, "malformed secret key"))?;
            let ss = mlkem1024::decapsulate(&ct, &sk);
            secret_from(preset, "decapsulate", ss.as_bytes())
        }
    }
}

fn secret_from(
    preset: Preset,
    operation: &'static str,
    bytes: &[u8],
) -> Result<Secret<[u8; SHARED_SECRET_LEN]>> {
    if bytes.len() != SHARED_SECRET_LEN {
        return Err(Error::asymmetric(
            operation,
            preset,
            format!("shared secret length {}, expected {SHARED_SECRET_LEN}", bytes.len()),
        ));
    }
    let mut ss = [0u8; SHARED_SECRET_LEN];
    ss.copy_from_slice(bytes);
    Ok(Secret::new(ss))
}

fn check_len(
    operation: &'static str,
    preset: Preset,
    what: &str,
    bytes: &[u8],
    expected: usize,
) -> Result<()> {
    if bytes.len() != expected {
        return Err(Error::asymmetric(
            operation,
            preset,
            format!("{what} length {}, expected {expected}", bytes.len()),
        ));
    }
    Ok(())
}
