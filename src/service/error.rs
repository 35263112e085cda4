/// Error handling for the client-side service layer.
use displaydoc::Display;
use thiserror::Error;

#[derive(Debug, Display, Error)]
/// Errors raised while talking to the aggregation server.
pub enum ServiceError {
    /// transport error: {0}.
    Transport(#[from] reqwest::Error),
    /// server rejected the request as `{kind}`.
    Rejected {
        kind: String,
        message: Option<String>,
    },
}

impl ServiceError {
    /// The error kind reported by the server, if this is a rejection.
    pub fn rejection_kind(&self) -> Option<&str> {
        match self {
            ServiceError::Rejected { kind, .. } => Some(kind),
            ServiceError::Transport(_) => None,
        }
    }
}
