//! Error types and handling for chipbank

use std::time::Duration;

use thiserror::Error;

use crate::ledger::UserId;

/// Result type alias for chipbank operations
pub type Result<T> = std::result::Result<T, Error>;

/// chipbank error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient funds: balance is {balance}, requested {requested}")]
    InsufficientFunds { balance: u64, requested: u64 },

    #[error("corrupt ledger file: {0}")]
    CorruptFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("user {0} already has an active game")]
    AlreadyActive(UserId),

    #[error("user {0} has no active game")]
    NotActive(UserId),

    #[error("rate limited, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for errors that are reported to the caller for user-facing
    /// messaging and never terminate the process.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidAmount(_)
                | Error::InsufficientFunds { .. }
                | Error::AlreadyActive(_)
                | Error::NotActive(_)
                | Error::RateLimited { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_distinct_per_kind() {
        let insufficient = Error::InsufficientFunds {
            balance: 10,
            requested: 50,
        };
        let invalid = Error::InvalidAmount("credit must be greater than zero".into());

        assert!(insufficient.to_string().contains("insufficient funds"));
        assert!(invalid.to_string().contains("invalid amount"));
        assert_ne!(insufficient.to_string(), invalid.to_string());
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::InvalidAmount("x".into()).is_recoverable());
        assert!(Error::AlreadyActive(7).is_recoverable());
        assert!(Error::RateLimited {
            retry_after: Duration::from_secs(3)
        }
        .is_recoverable());
        assert!(!Error::CorruptFile("bad json".into()).is_recoverable());
    }
}
