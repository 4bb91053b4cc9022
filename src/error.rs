// src/error.rs
use std::time::Duration;

use thiserror::Error;

use crate::types::Strategy;

/// Failure taxonomy of the collection pipeline.
///
/// Phase-level variants are logged and swallowed by the orchestrator;
/// only `Config`, `Store` and `BudgetExhausted` end a run early. Sources
/// that lack credentials never get here: the registry filters them out.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("rate limit exhausted for {0}")]
    RateLimited(String),

    #[error("no fetcher registered for platform {0}")]
    NoSource(String),

    #[error("transient fetch error from {source_name}: {message}")]
    Transient {
        source_name: String,
        message: String,
    },

    #[error("{0} phase timed out after {1:?}")]
    PhaseTimeout(Strategy, Duration),

    #[error("overall collection budget of {0:?} exhausted")]
    BudgetExhausted(Duration),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CollectError {
    pub fn transient(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::Transient {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}

/// Persistence-layer failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    WriteRejected(String),
}

pub type CollectResult<T> = Result<T, CollectError>;
