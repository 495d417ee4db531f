use thiserror::Error;

/// Core error types for the relay
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Bitcoin RPC error: {0}")]
    BitcoinRpc(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if error is recoverable
    ///
    /// Recoverable errors are confined to a single connection or a single
    /// policy evaluation. A bind error takes the listener down with it.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Connection(_) => true,
            Error::Network(_) => true,
            Error::BitcoinRpc(_) => true,
            Error::Io(_) => true,
            Error::Utf8(_) => true,
            Error::Bind(_) => false,
            _ => false,
        }
    }

    /// Get error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Network(_) => "network",
            Error::Bind(_) => "bind",
            Error::Connection(_) => "connection",
            Error::BitcoinRpc(_) => "bitcoin_rpc",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Utf8(_) => "utf8",
            Error::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_errors_are_fatal() {
        assert!(!Error::Bind("permission denied".to_string()).is_recoverable());
        assert!(Error::BitcoinRpc("timeout".to_string()).is_recoverable());
    }

    #[test]
    fn test_utf8_error_conversion() {
        let err: Error = String::from_utf8(vec![0xff, 0xfe]).unwrap_err().into();
        assert_eq!(err.category(), "utf8");
        assert!(err.is_recoverable());
    }
}
