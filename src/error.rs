//! Error types for the query protocol

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

/// Client-visible text for each failure class.
pub const PARSE_ERROR_MSG: &str = "Could not parse query";
pub const UNSUPPORTED_MSG: &str = "Query type not supported";
pub const QUERY_ERROR_MSG: &str = "Query error";

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Could not parse query: {0}")]
    Parse(String),

    #[error("Query type not supported: {0}")]
    Unsupported(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueryError {
    /// Get error code for logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Parse(_) => "PARSE_ERROR",
            QueryError::Unsupported(_) => "UNSUPPORTED_QUERY",
            QueryError::InvalidPayload(_) | QueryError::Store(_) => "QUERY_ERROR",
            QueryError::Io(_) => "IO_ERROR",
        }
    }

    /// Message sent back to the client.
    ///
    /// Store failures of every kind collapse into one opaque message; the
    /// underlying cause stays in `Display` for the server log.
    pub fn client_message(&self) -> &'static str {
        match self {
            QueryError::Parse(_) => PARSE_ERROR_MSG,
            QueryError::Unsupported(_) => UNSUPPORTED_MSG,
            QueryError::InvalidPayload(_) | QueryError::Store(_) | QueryError::Io(_) => {
                QUERY_ERROR_MSG
            }
        }
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_client_messages() {
        assert_eq!(QueryError::Parse("eof".into()).client_message(), "Could not parse query");
        assert_eq!(
            QueryError::Unsupported("update/student".into()).client_message(),
            "Query type not supported"
        );
        assert_eq!(
            QueryError::InvalidPayload("filter".into()).client_message(),
            "Query error"
        );
        let store = QueryError::from(rusqlite::Error::InvalidQuery);
        assert_eq!(store.client_message(), "Query error");
    }

    #[test]
    fn test_store_cause_kept_out_of_client_message() {
        let err = QueryError::from(rusqlite::Error::InvalidColumnName("secret".into()));
        assert!(err.to_string().contains("secret"));
        assert!(!err.client_message().contains("secret"));
        assert_eq!(err.code(), "QUERY_ERROR");
    }
}
