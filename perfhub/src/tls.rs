//! Custom root CA (`--tls-ca`) shared by the WebSocket and HTTP transports.

use std::{fs, path::Path, sync::Arc, time::Duration};

use rustls::{ClientConfig, RootCertStore};
use tokio_tungstenite::Connector;

use crate::error::ClientError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TlsRoots {
    pem: Vec<u8>,
    config: Arc<ClientConfig>,
}

impl TlsRoots {
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let pem = fs::read(path).map_err(|source| ClientError::TlsCa {
            path: path.display().to_string(),
            source,
        })?;

        let mut roots = RootCertStore::empty();
        let mut reader = &pem[..];
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|source| ClientError::TlsCa {
                path: path.display().to_string(),
                source,
            })?;
            roots.add(cert)?;
        }
        if roots.is_empty() {
            return Err(ClientError::NoCertificates(path.display().to_string()));
        }

        // Explicit provider: reqwest and tungstenite may both pull rustls in.
        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            pem,
            config: Arc::new(config),
        })
    }

    pub fn connector(&self) -> Connector {
        Connector::Rustls(Arc::clone(&self.config))
    }
}

pub fn http_client(tls: Option<&TlsRoots>) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
    if let Some(tls) = tls {
        builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&tls.pem)?);
    }
    Ok(builder.build()?)
}
