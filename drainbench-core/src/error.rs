use std::time::Duration;

use crate::client::Phase;
use crate::plan::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{phase} request failed: {method} {url} status={status} body={body}")]
    ControlRequest {
        phase: Phase,
        method: http::Method,
        url: String,
        status: u16,
        body: String,
    },

    #[error("timeout waiting for completion after {}ms", elapsed.as_millis())]
    PollTimeout { elapsed: Duration },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),

    #[error("invalid JSON from {url}: {body}")]
    InvalidReport { url: String, body: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The control phase that failed, if this is a control request error.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::ControlRequest { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl(_)
                | Self::RequestBuild(_)
                | Self::Request(_)
                | Self::Timeout(_)
                | Self::BodyRead(_)
        )
    }
}
