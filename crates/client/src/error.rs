use alloy_json_rpc::RpcError;
use alloy_transport::TransportErrorKind;

/// An error that occurred while talking to a chain node.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A transport or RPC-level error.
    #[error("rpc error: {0}")]
    Transport(#[from] RpcError<TransportErrorKind>),
    /// The requested block or header is not known to the node.
    #[error("block {0}: not found")]
    NotFound(String),
    /// The `newHeads` subscription ended.
    #[error("new heads subscription closed")]
    SubscriptionClosed,
    /// Dialing the node did not complete within the configured deadline.
    #[error("timed out dialing {0}")]
    DialTimeout(String),
    /// The configured RPC endpoint could not be parsed.
    #[error("invalid rpc endpoint: {0}")]
    InvalidEndpoint(String),
    /// A header received from the node could not be translated into the
    /// canonical form.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    /// A hash or address string could not be parsed.
    #[error("invalid hex value: {0}")]
    InvalidHex(String),
}

impl ClientError {
    /// Returns true for errors that warrant resubscribing rather than
    /// failing the session: websocket closures, connection resets, and
    /// blocks the node has not indexed yet.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::SubscriptionClosed => true,
            Self::Transport(err) => is_transient_message(&err.to_string()),
            _ => false,
        }
    }

    /// Returns true for errors the hydrator should retry: the node knows the
    /// head but has not indexed its body yet.
    pub fn is_retryable_fetch(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Transport(err) => err.to_string().to_lowercase().contains("unknown block"),
            _ => false,
        }
    }
}

fn is_transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    const TRANSIENT: &[&str] = &[
        "unknown block",
        "connection reset",
        "connection closed",
        "reset by peer",
        "normal closure",
        "abnormal closure",
        "service restart",
        "websocket",
        "broken pipe",
    ];
    TRANSIENT.iter().any(|needle| message.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(message: &str) -> ClientError {
        ClientError::Transport(TransportErrorKind::custom_str(message))
    }

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::NotFound("0xaa".into()).is_transient());
        assert!(ClientError::SubscriptionClosed.is_transient());
        assert!(transport("connection reset by peer").is_transient());
        assert!(transport("WebSocket protocol error: service restart").is_transient());
        assert!(transport("unknown block").is_transient());

        assert!(!transport("execution reverted").is_transient());
        assert!(!ClientError::InvalidHeader("missing hash".into()).is_transient());
        assert!(!ClientError::DialTimeout("ws://node".into()).is_transient());
    }

    #[test]
    fn test_retryable_fetch_classification() {
        assert!(ClientError::NotFound("0xaa".into()).is_retryable_fetch());
        assert!(transport("Unknown block").is_retryable_fetch());
        assert!(!transport("connection reset by peer").is_retryable_fetch());
        assert!(!ClientError::SubscriptionClosed.is_retryable_fetch());
    }
}
