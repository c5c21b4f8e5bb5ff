use std::time::Duration;

use thiserror::Error;

/// Adapter failure taxonomy. The pipeline collapses every variant into one
/// fixed user-facing apology; the variant only matters for logs and tests.
#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {source}")]
    Network {
        #[source]
        source: reqwest::Error,
    },

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {message}")]
    Malformed { message: String },

    #[error("provider call timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("provider returned no response")]
    EmptyResult,
}

impl Error {
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Self {
        Self::Network { source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
