//! The encrypted envelope wire format.
//!
//! Stable JSON shape, bit-exact field names:
//! `{"preset", "encryptedContent", "cipherText", "nonce"}` with standard
//! padded base64 for all byte fields. The preset is the only algorithm
//! identifier needed to decrypt.

use crate::error::{Error, Result};
use crate::preset::{Preset, NONCE_LEN, TAG_LEN};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub preset: Preset,
    /// Base64 of AEAD ciphertext with the auth tag appended.
    pub encrypted_content: String,
    /// Base64 of the KEM ciphertext.
    pub cipher_text: String,
    /// Base64 of the 12-byte AEAD nonce.
    pub nonce: String,
}

/// Byte-level view of a structurally valid envelope.
#[derive(Debug)]
pub struct DecodedEnvelope {
    pub preset: Preset,
    pub encrypted_content: Vec<u8>,
    pub kem_ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

impl EncryptedEnvelope {
    pub(crate) fn from_parts(
        preset: Preset,
        encrypted_content: &[u8],
        kem_ciphertext: &[u8],
        nonce: &[u8; NONCE_LEN],
    ) -> Self {
        EncryptedEnvelope {
            preset,
            encrypted_content: general_purpose::STANDARD.encode(encrypted_content),
            cipher_text: general_purpose::STANDARD.encode(kem_ciphertext),
            nonce: general_purpose::STANDARD.encode(nonce),
        }
    }

    /// Decode and validate every field. Errors name the malformed field.
    pub fn decode_parts(&self) -> Result<DecodedEnvelope> {
        let encrypted_content = decode_field("encryptedContent", &self.encrypted_content)?;
        let kem_ciphertext = decode_field("cipherText", &self.cipher_text)?;
        let nonce_bytes = decode_field("nonce", &self.nonce)?;

        if kem_ciphertext.len() != self.preset.kem_ciphertext_len() {
            return Err(Error::validation(
                "decode_envelope",
                format!(
                    "cipherText is {} bytes, preset {} requires {}",
                    kem_ciphertext.len(),
                    self.preset,
                    self.preset.kem_ciphertext_len()
                ),
            ));
        }
        if nonce_bytes.len() != NONCE_LEN {
            return Err(Error::validation(
                "decode_envelope",
                format!("nonce is {} bytes, expected {NONCE_LEN}", nonce_bytes.len()),
            ));
        }
        if encrypted_content.len() < TAG_LEN {
            return Err(Error::validation(
                "decode_envelope",
                format!(
                    "encryptedContent is {} bytes, shorter than the {TAG_LEN}-byte tag",
                    encrypted_content.len()
                ),
            ));
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&nonce_bytes);
        Ok(DecodedEnvelope {
            preset: self.preset,
            encrypted_content,
            kem_ciphertext,
            nonce,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::format_with("encode_envelope", "envelope not serializable", e))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::format_with("decode_envelope", "malformed envelope json", e))
    }
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(value)
        .map_err(|e| Error::format_with("decode_envelope", format!("field {field} is not valid base64"), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EncryptedEnvelope {
        EncryptedEnvelope::from_parts(
            Preset::Normal,
            &[0xAAu8; 40],
            &vec![0xBBu8; Preset::Normal.kem_ciphertext_len()],
            &[0xCCu8; NONCE_LEN],
        )
    }

    #[test]
    fn wire_json_field_names() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"preset\":\"normal\""));
        assert!(json.contains("\"encryptedContent\":"));
        assert!(json.contains("\"cipherText\":"));
        assert!(json.contains("\"nonce\":"));
        assert_eq!(EncryptedEnvelope::from_json(&json).unwrap(), sample());
    }

    #[test]
    fn decode_round_trips_bytes() {
        let decoded = sample().decode_parts().unwrap();
        assert_eq!(decoded.encrypted_content, vec![0xAAu8; 40]);
        assert_eq!(decoded.kem_ciphertext.len(), Preset::Normal.kem_ciphertext_len());
        assert_eq!(decoded.nonce, [0xCCu8; NONCE_LEN]);
    }

    #[test]
    fn bad_base64_names_the_field() {
        let mut env = sample();
        env.nonce = "not base64!!".into();
        let err = env.decode_parts().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::FormatConversion);
        assert!(err.to_string().contains("nonce"));
    }

    #[test]
    fn wrong_kem_ciphertext_length_rejected() {
        let env = EncryptedEnvelope::from_parts(
            Preset::HighSecurity,
            &[0u8; 40],
            // Normal-sized kem ct under a HighSecurity preset
            &vec![0u8; Preset::Normal.kem_ciphertext_len()],
            &[0u8; NONCE_LEN],
        );
        let err = env.decode_parts().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn short_nonce_rejected() {
        let mut env = sample();
        env.nonce = general_purpose::STANDARD.encode([0u8; 8]);
        let err = env.decode_parts().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn missing_field_fails_parse() {
        let err =
            EncryptedEnvelope::from_json(r#"{"preset":"normal","cipherText":"","nonce":""}"#)
                .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::FormatConversion);
    }
}
