//! HTTPS listener: provisions the identity, then answers every request
//! with the multiplayer data payload.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use mpdata_identity::{ensure_identity, Artifact, DirStore, Provisioned};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::payload::Payload;
use crate::{tls, Result, ServerError};

/// Content type the game client has always received for the payload.
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Answer any request with the payload.
///
/// Method, path, headers and body are ignored.
pub fn respond<B>(req: &Request<B>, payload: &Payload) -> Response<Full<Bytes>> {
    debug!(method = %req.method(), path = %req.uri().path(), "serving payload");

    let mut response = Response::new(Full::new(payload.bytes()));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_TEXT));
    response
}

/// Bound HTTPS listener.
pub struct MpDataServer {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    payload: Payload,
}

impl MpDataServer {
    /// Bind `addr` and terminate TLS with `tls_config`.
    pub async fn bind(
        addr: SocketAddr,
        tls_config: Arc<rustls::ServerConfig>,
        payload: Payload,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(tls_config),
            payload,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the process exits.
    ///
    /// Each connection gets its own task. Handshake and protocol errors only
    /// end that connection.
    pub async fn serve(self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let acceptor = self.acceptor.clone();
            let payload = self.payload.clone();
            tokio::spawn(async move {
                serve_connection(stream, peer, acceptor, payload).await;
            });
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    payload: Payload,
) {
    let tls_stream = match acceptor.accept(stream).await {
        Ok(s) => s,
        Err(e) => {
            debug!(%peer, error = %e, "TLS handshake failed");
            return;
        }
    };

    let service = service_fn(move |req| {
        let response = respond(&req, &payload);
        async move { Ok::<_, Infallible>(response) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(tls_stream), service)
        .await
    {
        debug!(%peer, error = %e, "connection closed with error");
    }
}

/// Make sure the TLS identity exists in the configured directory.
///
/// Runs on the blocking pool; key generation can take seconds.
pub async fn provision_identity(config: &ServerConfig) -> Result<Provisioned> {
    let store = DirStore::new(&config.identity_dir);
    let profile = config.identity.profile();

    let outcome = tokio::task::spawn_blocking(move || ensure_identity(&store, &profile))
        .await
        .map_err(|e| ServerError::Server(format!("provisioning task failed: {e}")))??;
    Ok(outcome)
}

/// Provision, load the payload and TLS identity, bind, and serve forever.
pub async fn run(config: &ServerConfig) -> Result<()> {
    match provision_identity(config).await? {
        Provisioned::Reused => info!(dir = %config.identity_dir.display(), "using existing identity"),
        Provisioned::Generated(_) => {
            info!(dir = %config.identity_dir.display(), "provisioned new identity");
        }
    }

    let payload = Payload::load(config.payload_path.as_deref())?;
    let tls_config = tls::load_server_config(
        &config.artifact_path(Artifact::LeafCert),
        &config.artifact_path(Artifact::LeafKey),
    )?;

    let server = MpDataServer::bind(config.listen, tls_config, payload).await?;
    info!(addr = %server.local_addr()?, "mpdataserver listening");

    server.serve().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use crate::payload::MP_DATA;
    use http_body_util::BodyExt;
    use hyper::{Method, StatusCode};
    use mpdata_identity::{IdentityError, KeyAlgorithm};

    async fn body_of(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_respond_ignores_method_and_path() {
        let payload = Payload::builtin();

        for (method, path) in [
            (Method::GET, "/"),
            (Method::POST, "/"),
            (Method::GET, "/some/other/path?x=1"),
            (Method::PUT, "/mpdata"),
            (Method::DELETE, "/"),
        ] {
            let req = Request::builder()
                .method(method)
                .uri(path)
                .body(())
                .unwrap();
            let response = respond(&req, &payload);

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[CONTENT_TYPE], CONTENT_TYPE_TEXT);
            assert_eq!(body_of(response).await, MP_DATA.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_respond_serves_override() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmpfile, b"[Custom]\n").unwrap();
        let payload = Payload::from_file(tmpfile.path()).unwrap();

        let req = Request::builder().uri("/").body(()).unwrap();
        assert_eq!(body_of(respond(&req, &payload)).await, "[Custom]\n".as_bytes());
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig {
            identity_dir: dir.path().to_path_buf(),
            identity: IdentityConfig {
                key_algorithm: KeyAlgorithm::Rsa2048,
                ..Default::default()
            },
            ..ServerConfig::default()
        };
        provision_identity(&config).await.unwrap();
        let tls_config = tls::load_server_config(
            &config.artifact_path(Artifact::LeafCert),
            &config.artifact_path(Artifact::LeafKey),
        )
        .unwrap();

        let err = MpDataServer::bind(addr, tls_config, Payload::builtin())
            .await
            .err()
            .expect("port is taken");
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_run_fails_before_serving_on_unsupported_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            identity_dir: dir.path().to_path_buf(),
            identity: IdentityConfig {
                key_algorithm: KeyAlgorithm::EcdsaP256,
                ..Default::default()
            },
            ..ServerConfig::default()
        };

        let err = run(&config).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(!dir.path().join("cert.pem").exists());
    }

    #[tokio::test]
    async fn test_run_rejects_unrepresentable_validity() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            identity_dir: dir.path().to_path_buf(),
            identity: IdentityConfig {
                validity_years: u32::MAX,
                ..Default::default()
            },
            ..ServerConfig::default()
        };

        let err = run(&config).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Identity(IdentityError::InvalidValidity(_))
        ));
        assert_eq!(err.exit_code(), 1);
        assert!(!dir.path().join("cert.pem").exists());
    }
}
