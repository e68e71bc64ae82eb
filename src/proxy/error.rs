//! Probe error taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything that can go wrong while probing a single proxy.
///
/// These never escape the probing path: the executor and the scheduler turn
/// them into failed [`ProbeOutcome`](crate::proxy::ProbeOutcome)s.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("malformed proxy: {0}")]
    MalformedProxy(String),
    #[error("connect error: {0}")]
    Connect(String),
    #[error("handshake error: {0}")]
    Handshake(String),
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("HTTP status: {0}")]
    UnexpectedStatus(u16),
    #[error("invalid JSON response: {0}")]
    ResponseDecode(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProbeError {
    pub fn kind(&self) -> ProbeErrorKind {
        match self {
            ProbeError::MalformedProxy(_) => ProbeErrorKind::MalformedProxy,
            ProbeError::Connect(_) => ProbeErrorKind::Connect,
            ProbeError::Handshake(_) => ProbeErrorKind::Handshake,
            ProbeError::Timeout(_) => ProbeErrorKind::Timeout,
            ProbeError::UnexpectedStatus(_) => ProbeErrorKind::UnexpectedStatus,
            ProbeError::ResponseDecode(_) => ProbeErrorKind::ResponseDecode,
            ProbeError::Internal(_) => ProbeErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Serializable discriminant of [`ProbeError`], kept on outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    MalformedProxy,
    Connect,
    Handshake,
    Timeout,
    UnexpectedStatus,
    ResponseDecode,
    Internal,
}

impl ProbeErrorKind {
    /// A parse failure or a crashed task cannot be fixed by trying again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProbeErrorKind::MalformedProxy | ProbeErrorKind::Internal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeErrorKind::MalformedProxy => "malformed proxy",
            ProbeErrorKind::Connect => "connect error",
            ProbeErrorKind::Handshake => "handshake error",
            ProbeErrorKind::Timeout => "timeout",
            ProbeErrorKind::UnexpectedStatus => "unexpected status",
            ProbeErrorKind::ResponseDecode => "response decode error",
            ProbeErrorKind::Internal => "internal error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ProbeError::Connect("refused".into()).is_retryable());
        assert!(ProbeError::Handshake("rejected".into()).is_retryable());
        assert!(ProbeError::Timeout(10_000).is_retryable());
        assert!(ProbeError::UnexpectedStatus(503).is_retryable());
        assert!(ProbeError::ResponseDecode("eof".into()).is_retryable());
        assert!(!ProbeError::MalformedProxy("bad".into()).is_retryable());
        assert!(!ProbeError::Internal("panic".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(ProbeError::Timeout(1500).to_string(), "timed out after 1500ms");
        assert_eq!(ProbeError::UnexpectedStatus(407).to_string(), "HTTP status: 407");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ProbeErrorKind::ResponseDecode).unwrap();
        assert_eq!(json, "\"response_decode\"");
    }
}
