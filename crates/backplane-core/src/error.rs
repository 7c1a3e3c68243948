use thiserror::Error;

/// Errors shared across the backplane crates that do not belong to a single
/// component (bus, store, access). Component-specific error enums live in
/// their own crates and convert into this one via `#[from]` at the seams
/// that need to erase the distinction (e.g. a stage executor returning to
/// the consumer runtime).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid state transition: {entity} cannot go {from} -> {event}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        event: String,
    },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
