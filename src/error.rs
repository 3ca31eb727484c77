//! Error types for the oracle indexer

use thiserror::Error;

use crate::types::Address;

/// Failure of a single external contract call.
///
/// Reverts and timeouts are ordinary data conditions for the engine; callers
/// degrade to defaults instead of propagating these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("call to {contract:?} reverted: {method}")]
    Reverted {
        contract: Address,
        method: &'static str,
    },

    #[error("call to {contract:?} timed out: {method}")]
    Timeout {
        contract: Address,
        method: &'static str,
    },

    #[error("call to {contract:?} returned undecodable data: {method}")]
    Decode {
        contract: Address,
        method: &'static str,
    },
}

pub type CallResult<T> = std::result::Result<T, CallError>;

/// Infrastructure errors that do abort event processing.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("stale price oracle singleton: expected version {expected}, store has {found}")]
    StaleSingleton { expected: u64, found: u64 },

    #[error("store error: {0}")]
    Store(String),

    #[error("scenario error: {0}")]
    Scenario(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OracleError>;
