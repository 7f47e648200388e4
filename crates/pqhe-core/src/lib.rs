//! Post-quantum hybrid encryption engine with automated key lifecycle
//! management.
//!
//! The engine fuses an ML-KEM key encapsulation (FIPS 203) with
//! AES-256-GCM, bridged by HKDF-derived session keys. Around it runs a
//! process-wide [`KeyManager`] that generates, persists, rotates, and
//! retires key pairs, keeping a bounded grace window during which
//! ciphertext produced against the previous key remains decryptable.
//!
//! ```no_run
//! use pqhe_core::{KeyManager, KeyManagerConfig};
//! use serde_json::json;
//!
//! # async fn demo() -> pqhe_core::Result<()> {
//! let manager = KeyManager::get_instance(Some(KeyManagerConfig::default()))?;
//! manager.initialize().await?;
//!
//! let envelope = manager.encrypt(&json!({"user": "alice", "balance": 1000})).await?;
//! let value = manager.decrypt(&envelope).await?;
//! # Ok(())
//! # }
//! ```

pub mod aead;
pub mod config;
pub mod derivation;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod history;
pub mod keypair;
pub mod manager;
pub mod pq;
pub mod preset;
pub mod security;
pub mod serialization;
pub mod storage;

pub use config::KeyManagerConfig;
pub use engine::{decrypt, decrypt_with_keys, encrypt};
pub use envelope::EncryptedEnvelope;
pub use error::{Error, ErrorKind, Result};
pub use history::{RotationHistory, RotationHistoryEntry, RotationReason};
pub use keypair::{KeyMetadata, KeyPair, SecretBytes};
pub use manager::{needs_rotation, HealthReport, KeyManager, KeyManagerStatus};
pub use preset::Preset;
