//! Error handling for onvif-scout

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classes used by the negotiator and batch reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Auth,
    Parse,
    Input,
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network failure or unexpected HTTP status
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// 401, SOAP fault or rejected credentials
    #[error("Auth error: {0}")]
    Auth(String),

    /// Device challenged with something other than a usable MD5 Digest
    #[error("Digest unsupported: {0}")]
    DigestUnsupported(String),

    /// Every (credential, scheme) pair was rejected
    #[error("All credentials failed for {0}")]
    CredentialsExhausted(String),

    /// Expected response element missing or malformed XML
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid IP range, CIDR, interface name or similar
    #[error("Invalid input: {0}")]
    Input(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) | Error::Http(_) | Error::Io(_) => ErrorKind::Transport,
            Error::Auth(_) | Error::DigestUnsupported(_) | Error::CredentialsExhausted(_) => {
                ErrorKind::Auth
            }
            Error::Parse(_) | Error::Serialization(_) => ErrorKind::Parse,
            Error::Input(_) => ErrorKind::Input,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }
}
