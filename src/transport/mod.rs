pub mod http;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpTransport;

/// What a successful write reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessInfo {
    pub status_code: u16,
    pub bytes_received: usize,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Http(e) => e.status().map(|s| s.as_u16()),
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Other(_) => None,
        }
    }
}

/// Performs one write of an already-joined batch payload.
///
/// Called exactly once per batch.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, payload: String) -> Result<SuccessInfo, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_extraction() {
        let err = TransportError::Status {
            status: 400,
            message: "partial write".to_string(),
        };
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.to_string(), "server returned status 400: partial write");

        let err = TransportError::Other("connection reset".to_string());
        assert_eq!(err.status_code(), None);
    }
}
