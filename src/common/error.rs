use std::io;

/// Lỗi chung của ứng dụng.
///
/// Every per-message failure is reported through this type and is never
/// fatal once the dispatch loop is running.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// No peer is subscribed to the room topic, so a publish has no route.
    #[error("not connected: no peer is subscribed to `{0}`")]
    NotConnected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("record for `{key}` rejected: {reason}")]
    ValidationRejected { key: String, reason: String },

    #[error("malformed opinion payload: {0}")]
    MalformedPayload(String),

    #[error("distributed store is already initialized")]
    InitializationConflict,

    /// The network task has stopped and its command channel is closed.
    #[error("network task is not running")]
    NetworkUnavailable,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::MalformedPayload(err.to_string())
    }
}

impl ChatError {
    pub fn rejected(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ChatError::ValidationRejected {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
