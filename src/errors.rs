use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-zero application status code from the venue. The API multiplexes
    /// these inside HTTP 200 responses, so they are checked after decoding.
    #[error("API error: code {code}, msg: {msg}")]
    Api { code: i64, msg: String },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("timed out waiting for connection")]
    ConnectTimeout,

    #[error("timed out waiting for subscription acknowledgment")]
    AckTimeout,

    /// A subscribe or unsubscribe for this topic is already in flight.
    #[error("operation already pending for topic {0}")]
    SubscriptionPending(String),

    #[error("client is closed")]
    Closed,

    #[error("configuration error: {0}")]
    Config(String),
}
