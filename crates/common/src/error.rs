use thiserror::Error;

/// Common error types used across the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Bus closed: {0}")]
    BusClosed(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API error{}: {description}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    ChatApi {
        code: Option<u16>,
        description: String,
    },

    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl RelayError {
    /// Whether this error means the bus subscription can no longer yield messages.
    ///
    /// A protocol parse error leaves the stream out of sync, so it counts too.
    ///
    /// Everything else is scoped to a single message and the loop keeps going.
    pub fn is_fatal_for_subscriber(&self) -> bool {
        match self {
            RelayError::BusClosed(_) => true,
            RelayError::Redis(e) => {
                e.is_io_error()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.kind() == redis::ErrorKind::ParseError
            }
            _ => false,
        }
    }
}
