//! Private keys backing the CA and leaf certificates.

use rand::rngs::OsRng;
use rcgen::KeyPair;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

use crate::{IdentityError, KeyAlgorithm, Result};

/// A generated private key, one variant per supported algorithm.
///
/// Each variant owns its marshaling routine. A key is owned by exactly one
/// certificate and is never shared between the CA and the leaf.
pub enum PrivateKey {
    /// RSA key, marshaled as PKCS#1 (`RSA PRIVATE KEY`)
    Rsa(RsaPrivateKey),
}

impl PrivateKey {
    /// Generate a fresh key from the OS random source.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        let Some(bits) = algorithm.rsa_bits() else {
            return Err(IdentityError::UnsupportedKey(algorithm));
        };

        let key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| IdentityError::KeyGeneration(e.to_string()))?;
        Ok(Self::Rsa(key))
    }

    /// PEM block type this key serializes to.
    pub const fn pem_tag(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA PRIVATE KEY",
        }
    }

    /// Serialize the key to PEM.
    pub fn to_pem(&self) -> Result<String> {
        match self {
            Self::Rsa(key) => key
                .to_pkcs1_pem(LineEnding::LF)
                .map(|pem| pem.as_str().to_owned())
                .map_err(|e| IdentityError::KeyEncoding(e.to_string())),
        }
    }

    /// Convert into a signing key pair usable by `rcgen`.
    pub fn to_key_pair(&self) -> Result<KeyPair> {
        match self {
            Self::Rsa(key) => {
                let pkcs8 = key
                    .to_pkcs8_pem(LineEnding::LF)
                    .map_err(|e| IdentityError::KeyEncoding(e.to_string()))?;
                Ok(KeyPair::from_pem_and_sign_algo(
                    pkcs8.as_str(),
                    &rcgen::PKCS_RSA_SHA256,
                )?)
            }
        }
    }
}
