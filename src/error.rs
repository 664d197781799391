//! Error types for Funnel Flux

use thiserror::Error;

/// Errors that can occur while scanning events or composing analytics
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Event store failure: {0}")]
    Store(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid funnel definition: {0}")]
    InvalidDefinition(String),

    #[error("Not enough snapshot history: {0}")]
    NotEnoughHistory(String),
}
