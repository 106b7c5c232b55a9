use super::http_errors::HttpErrorInfo;
use thiserror::Error;

/// Errors returned by the remote conversion service client
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request never produced a response (DNS, connect, timeout, reset)
    #[error("Network Error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Service answered with a non-success status
    #[error("{} - {detail}", .info.format())]
    Rejected { info: HttpErrorInfo, detail: String },

    /// Service answered 2xx but the body did not have the expected shape
    #[error("Malformed response from {endpoint}: {message}")]
    Malformed { endpoint: &'static str, message: String },

    /// Service answered with an explicit `{error}` body
    #[error("{0}")]
    Remote(String),

    /// Base URL plus endpoint did not form a valid URL
    #[error("Invalid service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Create a rejection error from a status and the plain-text body
    pub fn rejected(status: u16, detail: impl Into<String>) -> Self {
        Self::Rejected {
            info: HttpErrorInfo::from_status(status),
            detail: detail.into(),
        }
    }

    /// Create a malformed-payload error
    pub fn malformed(endpoint: &'static str, message: impl Into<String>) -> Self {
        Self::Malformed {
            endpoint,
            message: message.into(),
        }
    }

    /// Whether repeating the request may succeed
    ///
    /// Transport failures and server-side statuses are retryable; client
    /// errors and malformed payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { info, .. } => info.is_retryable,
            _ => false,
        }
    }

    /// HTTP status code, if the service answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { info, .. } => info.status_code,
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
