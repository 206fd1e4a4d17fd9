use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("failed to read TLS CA {path}: {source}")]
    TlsCa {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error(transparent)]
    Tls(#[from] rustls::Error),
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("connection closed by server")]
    Closed,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError::InvalidUrl(e.to_string())
    }
}
