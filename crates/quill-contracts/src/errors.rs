use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::LogEntry;

/// Stable machine-readable error kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoCredential,
    UpstreamError,
    MalformedResponse,
    DecodeError,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCredential => "no_credential",
            Self::UpstreamError => "upstream_error",
            Self::MalformedResponse => "malformed_response",
            Self::DecodeError => "decode_error",
            Self::Timeout => "timeout",
        }
    }
}

/// Failure of a single provider call. Messages from upstream are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("{0}")]
    NoCredential(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    MalformedResponse(String),
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    Timeout(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoCredential(_) => ErrorKind::NoCredential,
            Self::Upstream(_) => ErrorKind::UpstreamError,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NoCredential(message)
            | Self::Upstream(message)
            | Self::MalformedResponse(message)
            | Self::Decode(message)
            | Self::Timeout(message) => message,
        }
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind(),
            message: self.message().to_string(),
        }
    }

    /// Timeouts are the only failure a caller may safely retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("desired title is required")]
    EmptyTitle,
    #[error("subject context is required")]
    EmptyContext,
    #[error("target word count must be a positive integer")]
    InvalidWordCount,
    #[error("text must be at least {min} characters")]
    TextTooShort { min: usize },
}

/// A fatal pipeline outcome. Carries the log so callers keep the causal trace.
#[derive(Debug, Clone, Error)]
#[error("pipeline failed at {step}: {error}")]
pub struct PipelineFailure {
    pub step: String,
    pub error: ProviderError,
    pub execution_log: Vec<LogEntry>,
}

impl PipelineFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn payload(&self) -> ErrorPayload {
        self.error.payload()
    }
}

/// Everything `Pipeline::run` can return instead of a result.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
    #[error(transparent)]
    Pipeline(#[from] PipelineFailure),
}

impl RunError {
    pub fn failure(&self) -> Option<&PipelineFailure> {
        match self {
            Self::Pipeline(failure) => Some(failure),
            Self::InvalidRequest(_) => None,
        }
    }
}

/// Failure of a single-call helper such as description improvement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssistError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ErrorKind, ProviderError};

    #[test]
    fn payload_serializes_kind_as_snake_case() {
        let err = ProviderError::MalformedResponse("no choices".to_string());
        let value = serde_json::to_value(err.payload()).unwrap();
        assert_eq!(value, json!({"kind": "malformed_response", "message": "no choices"}));
    }

    #[test]
    fn only_timeouts_are_retryable() {
        assert!(ProviderError::Timeout("slow".to_string()).is_retryable());
        assert!(!ProviderError::Upstream("401".to_string()).is_retryable());
        assert_eq!(
            ProviderError::NoCredential(String::new()).kind().as_str(),
            "no_credential"
        );
        assert_eq!(ErrorKind::DecodeError.as_str(), "decode_error");
    }
}
