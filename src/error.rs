//! Error types shared by the store, resolver and remote layers

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Mirror or source database operation failed
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Mirror schema could not be created
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E-reader database missing or unreadable
    #[error("Source database unavailable at {path}: {reason}")]
    SourceUnavailable { path: String, reason: String },

    /// Checksum mismatch or malformed length
    #[error("Invalid ISBN: {0}")]
    InvalidIsbn(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the remote service
    #[error("Remote returned {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    /// GraphQL-level error payload on an otherwise successful response
    #[error("GraphQL error: {0}")]
    Graphql(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Remote work/edition id still holds the unresolved sentinel
    #[error("Unresolved remote identifier for book {0}")]
    UnresolvedIdentifier(String),

    #[error("Missing credential: {0} is not set")]
    MissingCredential(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the run has to stop. Everything else fails a single book or
    /// quote and the pass moves on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Schema(_)
                | Error::Io(_)
                | Error::SourceUnavailable { .. }
                | Error::MissingCredential(_)
                | Error::Config(_)
        )
    }
}
