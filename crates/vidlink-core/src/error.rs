//! Error types for vidlink.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Probe timed out on port {port}")]
    ProbeTimeout { port: u16 },

    #[error("Port {port} answered as {found:?}, not the download backend")]
    IdentityMismatch { port: u16, found: Option<String> },

    #[error("Network unavailable")]
    NetworkUnavailable,

    #[error("Backend error {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Duplicate request: {0}")]
    DuplicateRequest(String),

    #[error("Not connected to the backend")]
    NotConnected,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Per-probe negatives that a scan absorbs instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ProbeTimeout { .. } | Self::IdentityMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::ProbeTimeout { port: 9090 }.is_recoverable());
        assert!(Error::IdentityMismatch {
            port: 9091,
            found: Some("nginx".into())
        }
        .is_recoverable());
        assert!(!Error::NetworkUnavailable.is_recoverable());
        assert!(!Error::Backend {
            status: 500,
            message: "boom".into()
        }
        .is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = Error::Backend {
            status: 404,
            message: "no such download".into(),
        };
        assert_eq!(err.to_string(), "Backend error 404: no such download");
    }
}
