//! Error types for identity provisioning.

use std::path::PathBuf;
use thiserror::Error;

use crate::KeyAlgorithm;

/// Result type alias for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors that can occur while provisioning or inspecting the TLS identity.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Random source or key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Certificate template could not be built or signed.
    #[error("certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),

    /// The validity window cannot be represented.
    #[error("invalid validity period: {0}")]
    InvalidValidity(String),

    /// A generated key could not be serialized.
    #[error("key encoding failed: {0}")]
    KeyEncoding(String),

    /// The key algorithm has no private-key marshaling routine.
    #[error("unsupported key algorithm for marshaling: {0:?}")]
    UnsupportedKey(KeyAlgorithm),

    /// Reading or writing a persisted artifact failed.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted artifact is missing.
    #[error("missing artifact: {0}")]
    Missing(String),

    /// PEM text could not be decoded.
    #[error("PEM decode failed: {0}")]
    PemDecode(String),

    /// DER certificate could not be parsed.
    #[error("certificate parse failed: {0}")]
    CertParse(String),

    /// Leaf certificate does not chain to the CA.
    #[error("chain verification failed: {0}")]
    ChainVerification(String),
}

impl IdentityError {
    /// Build a storage error for a path.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}
