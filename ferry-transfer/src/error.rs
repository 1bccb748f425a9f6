use std::io;

use thiserror::Error;

/// Failures of a single bulk transfer session.
///
/// Every variant aborts the call it was raised in; partial uploads are never
/// resumed.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Invalid bulk store address: {0}")]
    InvalidAddress(String),

    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("Login as {login} rejected: {code} {message}")]
    Login {
        login: String,
        code: u16,
        message: String,
    },

    #[error("Create directory \"{directory}\" failed: {code} {message}")]
    CreateDirectory {
        directory: String,
        code: u16,
        message: String,
    },

    #[error("Change directory to \"{directory}\" failed: {code} {message}")]
    ChangeDirectory {
        directory: String,
        code: u16,
        message: String,
    },

    #[error("Transfer of \"{path}\" failed: {code} {message}")]
    Transfer {
        path: String,
        code: u16,
        message: String,
    },

    #[error("Unexpected reply {code} to {command}: {message}")]
    UnexpectedReply {
        command: &'static str,
        code: u16,
        message: String,
    },

    #[error("Failed to parse reply: {0}")]
    Parse(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Payload not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    /// Whether another attempt at the same transfer could succeed.
    ///
    /// Network trouble and 4xx replies are worth retrying; rejected logins,
    /// malformed addresses and 5xx replies are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Connect { .. }
            | Self::Timeout(_)
            | Self::ConnectionClosed
            | Self::Io(_) => true,
            Self::Login { code, .. }
            | Self::CreateDirectory { code, .. }
            | Self::ChangeDirectory { code, .. }
            | Self::Transfer { code, .. }
            | Self::UnexpectedReply { code, .. } => *code >= 400 && *code < 500,
            Self::InvalidAddress(_) | Self::Parse(_) | Self::NotFound(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(TransferError::ConnectionClosed.is_retryable());
        assert!(TransferError::Timeout("greeting").is_retryable());
        assert!(
            TransferError::Transfer {
                path: "a/b".to_string(),
                code: 425,
                message: "Can't open data connection".to_string(),
            }
            .is_retryable()
        );
        assert!(
            !TransferError::Login {
                login: "anonymous".to_string(),
                code: 530,
                message: "Not logged in".to_string(),
            }
            .is_retryable()
        );
        assert!(!TransferError::InvalidAddress("a:b:c".to_string()).is_retryable());
    }
}
