//! TLS termination with the provisioned leaf identity.

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::{Result, ServerError};

/// ALPN protocol offered to clients.
const ALPN_HTTP1: &[u8] = b"http/1.1";

/// Build a rustls server config from a PEM certificate chain and key.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let certs = CertificateDer::pem_file_iter(cert_path)
        .and_then(|iter| iter.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| ServerError::Tls(format!("{}: {e}", cert_path.display())))?;
    if certs.is_empty() {
        return Err(ServerError::Tls(format!(
            "{}: no certificates found",
            cert_path.display()
        )));
    }

    let key = PrivateKeyDer::from_pem_file(key_path)
        .map_err(|e| ServerError::Tls(format!("{}: {e}", key_path.display())))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(format!("certificate/key mismatch: {e}")))?;
    config.alpn_protocols = vec![ALPN_HTTP1.to_vec()];

    debug!(cert = %cert_path.display(), key = %key_path.display(), "loaded TLS identity");
    Ok(Arc::new(config))
}
