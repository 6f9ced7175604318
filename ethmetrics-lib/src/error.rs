//! Errors that might be returned when using this crate.

use std::time::Duration;
use thiserror::Error;

/// Coarse classification of [`Error`], used by the scheduler and the binary to decide how loud a failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network, HTTP or Etherscan-level failure.
    Transport,

    /// The response arrived but did not have the expected shape.
    MalformedPayload,

    /// The database rejected or failed a statement.
    Storage,

    /// The database could not be reached within the retry budget.
    FatalSetup,

    /// Missing or invalid configuration.
    Config,
}

#[derive(Error, Debug)]
pub enum Error {
    // Etherscan Errors
    #[error("Invalid Etherscan token '{0}'")]
    EtherscanInvalidToken(String),

    #[error("Etherscan rate limit reached '{0}'")]
    EtherscanRateLimited(String),

    #[error("Etherscan rejected request '{0}'; {1}")]
    EtherscanRejected(String, String),

    // HTTP Errors
    #[error("Failed to initialize HTTP client; {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to send HTTP request; {0}")]
    HttpRequest(#[source] reqwest::Error),

    #[error("Received status code {0} from '{1}'")]
    HttpStatus(u16, String),

    #[error("Failed to read response body from '{0}'; {1}")]
    HttpBody(String, #[source] reqwest::Error),

    #[error("Response body from '{0}' is not valid JSON; {1}")]
    HttpMalformedBody(String, #[source] serde_json::Error),

    // Payload Errors
    #[error("Failed to deserialize JSON input; {0}")]
    DeserializeError(#[from] serde_json::Error),

    #[error("Payload has no 'result' object")]
    PayloadMissingResult,

    #[error("Payload field '{0}' is missing")]
    PayloadMissingField(&'static str),

    #[error("Payload field '{0}' has invalid hex value '{1}'")]
    PayloadInvalidHex(&'static str, String),

    #[error("Payload field '{0}' has invalid decimal value '{1}'")]
    PayloadInvalidDecimal(&'static str, String),

    #[error("Payload field '{0}' is out of range; {1}")]
    PayloadOutOfRange(&'static str, String),

    // Config Errors
    #[error("Failed to read .env file; {0}")]
    ConfigRead(#[from] dotenv::Error),

    #[error("Environment variable '{0}' does not exist; {1}")]
    ConfigReadNonExistantEnvironmentVariable(&'static str, #[source] std::env::VarError),

    #[error("Environment variable '{0}' is empty")]
    ConfigReadEmptyEnvironmentVariable(&'static str),

    #[error("Environment variable '{0}' has invalid value '{1}'")]
    ConfigInvalidValue(&'static str, String),

    // Database Errors
    #[error("Failed to connect to database; {0}")]
    DatabaseConnect(#[source] diesel::r2d2::PoolError),

    #[error("Database unreachable after {0:?}; {1}")]
    DatabaseUnreachable(Duration, #[source] Box<Error>),

    #[error("Invalid SQL identifier '{0}'")]
    StorageInvalidIdentifier(String),

    #[error("Column '{0}' is also the primary key of table '{1}'")]
    StorageDuplicateColumn(String, String),

    #[error("Failed to check whether '{1}' exists in '{0}'; {2}")]
    StorageExists(String, String, #[source] ExecutorError),

    #[error("Failed to insert '{1}' into '{0}'; {2}")]
    StorageInsert(String, String, #[source] ExecutorError),

    #[error("Failed to update '{1}' in '{0}'; {2}")]
    StorageUpdate(String, String, #[source] ExecutorError),

    #[error("Failed to upsert '{1}' into '{0}'; {2}")]
    StorageUpsert(String, String, #[source] ExecutorError),
}

/// Errors raised by an [`Executor`](crate::database::handler::Executor) while running a single statement.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to check out pooled connection; {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Failed to execute statement; {0}")]
    Query(#[from] diesel::result::Error),
}

impl ExecutorError {
    /// Returns true if the statement violated a unique (or primary key) constraint.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            ExecutorError::Query(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _
            ))
        )
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EtherscanInvalidToken(_)
            | Error::EtherscanRateLimited(_)
            | Error::EtherscanRejected(..)
            | Error::HttpClient(_)
            | Error::HttpRequest(_)
            | Error::HttpStatus(..)
            | Error::HttpBody(..)
            | Error::HttpMalformedBody(..) => ErrorKind::Transport,

            Error::DeserializeError(_)
            | Error::PayloadMissingResult
            | Error::PayloadMissingField(_)
            | Error::PayloadInvalidHex(..)
            | Error::PayloadInvalidDecimal(..)
            | Error::PayloadOutOfRange(..) => ErrorKind::MalformedPayload,

            Error::ConfigRead(_)
            | Error::ConfigReadNonExistantEnvironmentVariable(..)
            | Error::ConfigReadEmptyEnvironmentVariable(_)
            | Error::ConfigInvalidValue(..) => ErrorKind::Config,

            Error::DatabaseConnect(_) | Error::DatabaseUnreachable(..) => ErrorKind::FatalSetup,

            Error::StorageInvalidIdentifier(_)
            | Error::StorageDuplicateColumn(..)
            | Error::StorageExists(..)
            | Error::StorageInsert(..)
            | Error::StorageUpdate(..)
            | Error::StorageUpsert(..) => ErrorKind::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::error::ErrorKind;
    use crate::error::ExecutorError;
    use diesel::result::DatabaseErrorKind;

    #[test]
    fn kind() {
        assert_eq!(Error::PayloadMissingResult.kind(), ErrorKind::MalformedPayload);
        assert_eq!(Error::HttpStatus(502, "https://api.etherscan.io/api".to_string()).kind(), ErrorKind::Transport);
        assert_eq!(Error::StorageInvalidIdentifier("a;b".to_string()).kind(), ErrorKind::Storage);
        assert_eq!(Error::ConfigReadEmptyEnvironmentVariable("ETHERSCAN_API_KEY").kind(), ErrorKind::Config);
    }

    #[test]
    fn unique_violation() {
        let violation = ExecutorError::Query(diesel::result::Error::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key value violates unique constraint".to_string()),
        ));
        assert!(violation.is_unique_violation());
        assert!(!ExecutorError::Query(diesel::result::Error::NotFound).is_unique_violation());
    }
}
