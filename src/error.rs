#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("discovery failed: {0}")]
    Discovery(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The provider answered, but with a non-success status.
    #[error("{operation} failed: {detail}")]
    Provider {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[error("invalid ID token: {0}")]
    IdToken(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
