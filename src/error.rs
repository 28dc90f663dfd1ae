//! Application-wide error types.
//!
//! Subsystems define their own `thiserror` enums ([`ValidationError`],
//! [`HostError`], [`MaterializeError`], [`ConfigError`]). They all convert
//! into the top-level [`Error`]. The CLI uses `anyhow` on top.
//!
//! # Example
//!
//! ```ignore
//! use smartlists::error::{Result, ResultExt};
//!
//! async fn save(store: &SqliteStore, def: &Definition) -> Result<()> {
//!     def.compile()?;
//!     store.save_definition(def).await.with_context("saving definition")?;
//!     Ok(())
//! }
//! ```
//!
//! [`ValidationError`]: crate::rules::ValidationError
//! [`HostError`]: crate::host::HostError
//! [`MaterializeError`]: crate::host::MaterializeError
//! [`ConfigError`]: crate::config::ConfigError

use std::time::Duration;

use crate::model::{EntryId, TargetId};

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A definition that can't be saved
    #[error("Invalid definition: {0}")]
    Validation(#[from] crate::rules::ValidationError),

    /// Host query failure during a refresh
    #[error("Evaluation failed: {0}")]
    Host(#[from] crate::host::HostError),

    /// Host apply failure, possibly partial
    #[error("{0}")]
    Materialize(#[from] crate::host::MaterializeError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Unknown target: {0}")]
    TargetNotFound(TargetId),

    #[error("Target already has a definition: {0}")]
    DuplicateTarget(TargetId),

    #[error("Unknown ignore entry: {0}")]
    EntryNotFound(EntryId),

    /// A refresh ran past its soft timeout
    #[error("Refresh timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// A refresh task panicked or was cancelled
    #[error("Refresh task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Refresh queue is shut down")]
    QueueClosed,

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Whether this is a not-found outcome, looking through context.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::TargetNotFound(_) | Error::EntryNotFound(_) => true,
            Error::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}
