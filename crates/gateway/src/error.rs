use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    /// The request never reached the dispatcher (bad body, missing method).
    #[error("{0}")]
    Transport(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },

    #[error("{0}")]
    HandlerFailure(String),

    #[error("forwarded call timed out after {}s", .0.as_secs())]
    ForwardTimeout(Duration),

    #[error("forwarded call cancelled")]
    ForwardCancelled,

    #[error("owner unavailable")]
    OwnerUnavailable,

    #[error("service control refused: {0}")]
    ServiceControlRefused(String),

    #[error("proxy service did not stop within {}ms", .0.as_millis())]
    StopTimeout(Duration),

    #[error("config synthesis failed: {0}")]
    ConfigSynthesis(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Protocol(#[from] tether_protocol::Error),

    #[error(transparent)]
    Common(#[from] tether_common::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn invalid_params(method: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
