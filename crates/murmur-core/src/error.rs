use std::time::Duration;

/// Failure reaching or talking to one relay. Never fatal for an operation
/// that spans several relays.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("relay unreachable: {0}")]
    Unreachable(String),
    #[error("relay rejected event: {0}")]
    Rejected(String),
    #[error("relay closed subscription: {0}")]
    Closed(String),
    #[error("relay did not answer within {0:?}")]
    TimedOut(Duration),
    #[error("operation not supported by this transport")]
    Unsupported,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid input: {message}")]
    Validation { message: String },
    #[error("Not logged in")]
    NotAuthenticated,
    #[error("Signing failed: {message}")]
    Signing { message: String },
    #[error("Storage error: {message}")]
    Storage { message: String },
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn signing(message: impl ToString) -> Self {
        Self::Signing {
            message: message.to_string(),
        }
    }

    pub fn storage(message: impl ToString) -> Self {
        Self::Storage {
            message: message.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
