//! Error types for the multiplayer data server.

use mpdata_identity::IdentityError;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in mpdataserver operations.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration is invalid or unreadable.
    #[error("config error: {0}")]
    Config(String),

    /// Identity provisioning or inspection failed.
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Certificate or key could not be loaded into the TLS layer.
    #[error("tls error: {0}")]
    Tls(String),

    /// Listener failed to bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Payload override file could not be read.
    #[error("failed to read payload {path}: {source}")]
    Payload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Server runtime failure.
    #[error("server error: {0}")]
    Server(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Process exit status for this error.
    ///
    /// 2 when a private key could not be marshaled, 1 for everything else.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Identity(IdentityError::UnsupportedKey(_)) => 2,
            _ => 1,
        }
    }
}
