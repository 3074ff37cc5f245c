use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a call to a remote AI endpoint, classified by retryability.
#[derive(Debug, Clone, Error)]
pub(crate) enum RemoteError {
    #[error("transient remote failure: {0}")]
    Transient(String),
    #[error("remote rejected request ({status}): {message}")]
    Client { status: u16, message: String },
    #[error("remote resource not found: {0}")]
    NotFound(String),
    #[error("unexpected remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// 404 is not-found, 408 and 429 are transient, other 4xx are client errors, the rest
    /// transient.
    pub(crate) fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
                Self::Transient(format!("{status}: {message}"))
            }
            status if status.is_client_error() => Self::Client { status: status.as_u16(), message },
            status => Self::Transient(format!("{status}: {message}")),
        }
    }

    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, err.to_string());
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Transient(err.to_string())
    }
}
