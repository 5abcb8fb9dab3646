use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("acknowledgment timed out after {0:?}")]
    AckTimeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<serde_json::Error> for BusError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<std::io::Error> for BusError {
    fn from(value: std::io::Error) -> Self {
        Self::Transport(value.to_string())
    }
}
