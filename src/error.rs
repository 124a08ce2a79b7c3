use thiserror::Error;

/// All errors generated by the connector and signal engine.
#[derive(Debug, Error)]
pub enum BotError {
    /// Missing or invalid required parameter. Raised before any connection
    /// attempt is made.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid websocket url: {0}")]
    Url(#[from] url::ParseError),

    /// Transport-level failure on the streaming connection.
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame failed to decode. A single malformed frame is skipped with the
    /// stream left open; this variant surfaces only for outbound payloads.
    #[error("frame encode/decode error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The exchange rejected a subscription request.
    #[error("subscription rejected by exchange: {0}")]
    SubscriptionRejected(String),

    /// All reconnect attempts consumed. Surfaced to the process boundary for
    /// operator intervention, never silently retried.
    #[error("reconnect attempts exhausted after {attempts} consecutive failures")]
    ReconnectExhausted { attempts: u32 },
}

impl BotError {
    /// Determine if an error should terminate the process rather than be
    /// retried via reconnect/backoff.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BotError::Config(_) | BotError::Url(_) | BotError::ReconnectExhausted { .. }
        )
    }
}
