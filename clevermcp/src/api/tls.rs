//! HTTPS serving with rustls
//!
//! `axum::serve` only speaks plain TCP, so TLS connections are driven by
//! hyper-util's auto (HTTP/1.1 + h2) connection builder.

use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::sync::Arc;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::config::TlsConfig;
use crate::{Error, Result};

/// Load the PEM certificate chain and private key named by `tls`
pub fn load_certs(
    tls: &TlsConfig,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert_file = File::open(&tls.cert_path).map_err(|e| {
        Error::Tls(format!("Failed to open cert file {:?}: {}", tls.cert_path, e))
    })?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("Failed to parse certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "No certificates found in {:?}",
            tls.cert_path
        )));
    }

    let key_file = File::open(&tls.key_path).map_err(|e| {
        Error::Tls(format!("Failed to open key file {:?}: {}", tls.key_path, e))
    })?;
    let mut key_reader = BufReader::new(key_file);

    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| Error::Tls(format!("Failed to parse private key: {}", e)))?
        .ok_or_else(|| Error::Tls(format!("No private key found in {:?}", tls.key_path)))?;

    Ok((certs, key))
}

fn server_config(tls: &TlsConfig) -> Result<rustls::ServerConfig> {
    let (certs, key) = load_certs(tls)?;
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Tls(e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// Accept TLS connections until `signal` resolves, then drain open ones
pub async fn serve_tls<F>(
    listener: TcpListener,
    router: Router,
    tls: &TlsConfig,
    signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let acceptor = TlsAcceptor::from(Arc::new(server_config(tls)?));
    let draining = CancellationToken::new();
    let mut connections = JoinSet::new();
    tokio::pin!(signal);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
            _ = &mut signal => break,
        };

        let acceptor = acceptor.clone();
        let service = TowerToHyperService::new(router.clone());
        let draining = draining.clone();

        connections.spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::debug!(%peer, "TLS handshake failed: {}", e);
                    return;
                }
            };

            let builder = auto::Builder::new(TokioExecutor::new());
            let conn = builder.serve_connection_with_upgrades(TokioIo::new(tls_stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                res = conn.as_mut() => res,
                _ = draining.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(e) = result {
                tracing::debug!(%peer, "Connection closed with error: {}", e);
            }
        });

        // Reap finished connections so the set doesn't grow unbounded
        while connections.try_join_next().is_some() {}
    }

    draining.cancel();
    while connections.join_next().await.is_some() {}
    Ok(())
}
