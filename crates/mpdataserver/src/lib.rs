//! mpdataserver: HTTPS responder for the Splinter Cell: Blacklist
//! multiplayer data file.
//!
//! The game fetches a small INI-like tuning blob from a fixed hostname over
//! HTTPS. This server answers every request with that blob, terminating TLS
//! with an identity it issues for itself on first run.
//!
//! # Startup
//!
//! 1. Provision: if `cert.pem` is missing, issue a CA and a leaf for the
//!    game's hostname (see [`mpdata_identity`]). Blocking, runs once.
//! 2. Load `cert.pem` / `key.pem` into rustls.
//! 3. Bind (default `127.0.0.1:443`) and serve until killed.
//!
//! Every failure along the way is fatal; nothing is served from a
//! half-initialized state.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod payload;
pub mod server;
pub mod tls;

// Re-exports for convenience.
pub use config::ServerConfig;
pub use error::ServerError;
pub use payload::{Payload, MP_DATA};
pub use server::MpDataServer;

/// Result type for mpdataserver operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Process exit status for a top-level error.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<ServerError>()
        .map_or(1, ServerError::exit_code)
}
