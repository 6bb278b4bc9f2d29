//! Server configuration.

use mpdata_identity::{
    Artifact, IdentityProfile, KeyAlgorithm, ValidityPeriod, DEFAULT_HOSTNAME,
    DEFAULT_ORGANIZATION,
};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Configuration for an mpdataserver instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTPS listen address (default: 127.0.0.1:443).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Directory holding ca.pem, ca.key, cert.pem and key.pem (default: working directory).
    #[serde(default = "default_identity_dir")]
    pub identity_dir: PathBuf,

    /// File served instead of the built-in payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_path: Option<PathBuf>,

    /// What to issue when no identity exists yet.
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Certificate subject and key settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Subject organization (default: "5th Echelon").
    #[serde(default = "default_organization")]
    pub organization: String,

    /// Leaf common name (default: sc6_pc_lnch_b.s3.amazonaws.com).
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Key algorithm (default: rsa4096).
    #[serde(default)]
    pub key_algorithm: KeyAlgorithm,

    /// Validity in 356-day years (default: 10).
    #[serde(default = "default_validity_years")]
    pub validity_years: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            identity_dir: default_identity_dir(),
            payload_path: None,
            identity: IdentityConfig::default(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            organization: default_organization(),
            hostname: default_hostname(),
            key_algorithm: KeyAlgorithm::default(),
            validity_years: default_validity_years(),
        }
    }
}

impl IdentityConfig {
    /// Provisioning profile for these settings.
    pub fn profile(&self) -> IdentityProfile {
        IdentityProfile {
            organization: self.organization.clone(),
            hostname: self.hostname.clone(),
            validity: ValidityPeriod::Years(self.validity_years),
            algorithm: self.key_algorithm,
            ..IdentityProfile::default()
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| crate::ServerError::Config(format!("{}: {e}", path.display())))
        } else {
            Ok(Self::default())
        }
    }

    /// Path of a persisted identity artifact.
    pub fn artifact_path(&self, artifact: Artifact) -> PathBuf {
        self.identity_dir.join(artifact.file_name())
    }
}

// Default value functions for serde.
fn default_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 443))
}

fn default_identity_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_organization() -> String {
    String::from(DEFAULT_ORGANIZATION)
}

fn default_hostname() -> String {
    String::from(DEFAULT_HOSTNAME)
}

const fn default_validity_years() -> u32 {
    10
}
