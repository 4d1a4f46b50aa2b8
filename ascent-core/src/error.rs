//! Error types for the Ascent core library.
//!
//! Runtime gameplay paths never fail: unknown ids are no-ops and malformed
//! events are dropped with a log line. The variants below cover the loud
//! failures only: content-authoring mistakes caught at construction time,
//! bad save documents and the storage layer.

use thiserror::Error;

/// Top-level error type for all Ascent operations.
#[derive(Error, Debug)]
pub enum AscentError {
    /// The same id was declared twice within one definition list.
    #[error("Duplicate {kind} id: {id}")]
    DuplicateId {
        /// Which definition list contained the duplicate ("stat", "skill", ...).
        kind: &'static str,
        /// The repeated id.
        id: String,
    },

    /// A skill names a category that was never declared.
    #[error("Skill {skill} references unknown category {category}")]
    UnknownCategory {
        /// The offending skill.
        skill: String,
        /// The missing category.
        category: String,
    },

    /// Configuration error (parse failure or an invalid value).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A save document failed validation and was not applied.
    #[error("Invalid save data: {0}")]
    InvalidSaveData(String),

    /// An inbound event could not be decoded or carries unusable values.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, AscentError>;
