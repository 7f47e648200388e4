use crate::preset::Preset;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification, stable for callers that match on failure
/// class rather than message text.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Validation,
    AlgorithmAsymmetric,
    AlgorithmSymmetric,
    KeyDerivation,
    FormatConversion,
    KeyManager,
    Configuration,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed envelope, missing field, or structurally invalid input.
    #[error("{operation}: validation failed: {reason}")]
    Validation {
        operation: &'static str,
        reason: String,
    },

    /// KEM-side invariant violation: wrong key or ciphertext length, or
    /// decapsulation producing an unexpected output length.
    #[error("{operation} ({preset}): asymmetric algorithm failure: {reason}")]
    AlgorithmAsymmetric {
        operation: &'static str,
        preset: Preset,
        reason: String,
    },

    /// AEAD tag verification failure. Wrong key and tampered ciphertext are
    /// indistinguishable here; this is the envelope's authentication point.
    #[error("{operation} ({preset}): authentication failed")]
    AlgorithmSymmetric {
        operation: &'static str,
        preset: Preset,
    },

    /// HKDF parameter or output-length failure.
    #[error("{operation}: key derivation failed: {reason}")]
    KeyDerivation {
        operation: &'static str,
        reason: String,
    },

    /// Base64 decode or value (de)serialization failure.
    #[error("{operation}: format conversion failed: {reason}")]
    FormatConversion {
        operation: &'static str,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Key manager operation failure: initialization, rotation, storage,
    /// retrieval, backup, or cleanup.
    #[error("{operation}: key manager failure: {reason}")]
    KeyManager {
        operation: &'static str,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid preset, bad path, or out-of-range duration in configuration.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::AlgorithmAsymmetric { .. } => ErrorKind::AlgorithmAsymmetric,
            Error::AlgorithmSymmetric { .. } => ErrorKind::AlgorithmSymmetric,
            Error::KeyDerivation { .. } => ErrorKind::KeyDerivation,
            Error::FormatConversion { .. } => ErrorKind::FormatConversion,
            Error::KeyManager { .. } => ErrorKind::KeyManager,
            Error::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    pub(crate) fn validation(operation: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn asymmetric(
        operation: &'static str,
        preset: Preset,
        reason: impl Into<String>,
    ) -> Self {
        Error::AlgorithmAsymmetric {
            operation,
            preset,
            reason: reason.into(),
        }
    }

    pub(crate) fn symmetric(operation: &'static str, preset: Preset) -> Self {
        Error::AlgorithmSymmetric { operation, preset }
    }

    pub(crate) fn derivation(operation: &'static str, reason: impl Into<String>) -> Self {
        Error::KeyDerivation {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn format(operation: &'static str, reason: impl Into<String>) -> Self {
        Error::FormatConversion {
            operation,
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn format_with(
        operation: &'static str,
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::FormatConversion {
            operation,
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn manager(operation: &'static str, reason: impl Into<String>) -> Self {
        Error::KeyManager {
            operation,
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn manager_with(
        operation: &'static str,
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::KeyManager {
            operation,
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::Configuration {
            reason: reason.into(),
        }
    }
}
