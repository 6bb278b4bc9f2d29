//! # mpdata-identity
//!
//! One-shot TLS identity for the multiplayer data server.
//!
//! ## Layout
//!
//! ```text
//! ca.pem / ca.key      self-signed CA, "5th Echelon"
//!        │
//!        └── cert.pem / key.pem   leaf for sc6_pc_lnch_b.s3.amazonaws.com
//! ```
//!
//! The identity is issued once and reused forever. The presence of
//! `cert.pem` is the only completion signal: no expiry or checksum check
//! happens on reuse. Delete the files to force a fresh identity.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mpdata_identity::{ensure_identity, DirStore, IdentityProfile, Provisioned};
//!
//! let store = DirStore::new(".");
//! match ensure_identity(&store, &IdentityProfile::default())? {
//!     Provisioned::Reused => println!("identity already on disk"),
//!     Provisioned::Generated(bundle) => println!("{}", bundle.ca_cert_pem),
//! }
//! ```

mod error;
mod inspect;
mod key;
mod provision;
mod storage;

pub use error::{IdentityError, Result};
pub use inspect::{fingerprint, inspect_certificate, verify_chain};
pub use key::PrivateKey;
pub use provision::{ensure_identity, IdentityBundle, IdentityProfile, Provisioned};
pub use storage::{Artifact, DirStore, IdentityStore, MemoryStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Organization placed in both subjects.
pub const DEFAULT_ORGANIZATION: &str = "5th Echelon";

/// Hostname the game client fetches its multiplayer data from.
pub const DEFAULT_HOSTNAME: &str = "sc6_pc_lnch_b.s3.amazonaws.com";

/// Length of a "year" in validity computations.
///
/// 356, not 365. Certificates issued by earlier deployments were computed
/// this way and the window is kept identical.
pub const DAYS_PER_YEAR: u32 = 356;

/// Certificate metadata extracted from a persisted certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Serial number (hex)
    pub serial: String,
    /// Full subject distinguished name
    pub subject: String,
    /// Full issuer distinguished name
    pub issuer: String,
    /// Subject organization
    pub organization: Option<String>,
    /// Subject common name
    pub common_name: Option<String>,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
    /// Certificate type
    pub cert_type: CertificateType,
    /// Key usage: certificate signing
    pub key_cert_sign: bool,
    /// Key usage: digital signature
    pub digital_signature: bool,
    /// Key usage: key encipherment
    pub key_encipherment: bool,
    /// Extended key usage contains server auth
    pub server_auth: bool,
    /// SHA-256 of the DER encoding (lowercase hex)
    pub fingerprint: String,
}

impl CertificateInfo {
    /// Whether `now` falls inside the validity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Length of the validity window in whole days.
    pub fn validity_days(&self) -> i64 {
        (self.not_after - self.not_before).num_days()
    }
}

/// Role of a certificate in the two-level chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateType {
    /// Self-signed CA, signs only the leaf
    Authority,
    /// Server certificate presented during the TLS handshake
    Leaf,
}

/// Key algorithm choices.
///
/// Only RSA keys have a private-key marshaling routine. `EcdsaP256` is
/// accepted in configuration but fails with
/// [`IdentityError::UnsupportedKey`] when provisioning runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithm {
    /// RSA 4096-bit
    #[default]
    Rsa4096,
    /// RSA 2048-bit (faster, used by tests)
    Rsa2048,
    /// ECDSA with P-256 curve
    EcdsaP256,
}

impl KeyAlgorithm {
    /// RSA modulus size in bits, `None` for non-RSA algorithms.
    pub const fn rsa_bits(self) -> Option<usize> {
        match self {
            Self::Rsa4096 => Some(4096),
            Self::Rsa2048 => Some(2048),
            Self::EcdsaP256 => None,
        }
    }
}

/// Validity period of issued certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityPeriod {
    /// Whole years of [`DAYS_PER_YEAR`] days
    Years(u32),
    /// Custom duration in days
    Days(u32),
}

impl Default for ValidityPeriod {
    fn default() -> Self {
        Self::Years(10)
    }
}

impl ValidityPeriod {
    /// Get the number of days for this validity period, `None` on overflow.
    pub const fn days(self) -> Option<u32> {
        match self {
            Self::Years(y) => y.checked_mul(DAYS_PER_YEAR),
            Self::Days(d) => Some(d),
        }
    }
}
