//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the scanner. Library
//! modules use specific error types via `thiserror`, while the CLI entry
//! point uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: top-level application error enum, returned by [`crate::scanner::Scanner::rescan_all`]
//! - [`Error::is_fatal`] draws the soft/fatal line from the scanner's error
//!   handling design: per-directory and per-folder faults are absorbed and
//!   logged at their call site; only persistent-write faults, cancellation,
//!   and configuration errors are ever propagated out of a run.

use std::path::PathBuf;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A directory could not be stat'd or opened.
    #[error("Path unreadable: {path}: {message}")]
    PathUnreadable { path: PathBuf, message: String },

    /// A child entry (symlink loop, permission denied) could not be resolved.
    #[error("Entry invalid: {path}: {message}")]
    EntryInvalid { path: PathBuf, message: String },

    /// Reading the media-file catalog for a folder failed.
    #[error("DB read failed for folder {folder_id}: {source}")]
    DbRead {
        folder_id: String,
        #[source]
        source: sqlx::Error,
    },

    /// A persistent write (upsert/touch) failed; this is fatal to the run.
    #[error("DB write failed: {0}")]
    DbWrite(#[source] sqlx::Error),

    /// The tag extractor failed on a batch of files.
    #[error("Tag extraction failed for folder {folder_id}: {message}")]
    TagExtract { folder_id: String, message: String },

    /// The run was cancelled; not logged as an error.
    #[error("Scan cancelled")]
    Cancelled,

    /// A scan was requested while another was already running.
    #[error("Scan already in progress")]
    AlreadyRunning,

    /// Configuration error, detected before a scan starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with added context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error is fatal to a scan run.
    ///
    /// Fatal errors stop `RescanAll` and are returned to the caller; all
    /// other kinds are logged at their origin and swallowed by the stage
    /// that produced them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DbWrite(_) | Error::Cancelled | Error::Config(_) | Error::AlreadyRunning
        )
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("no libraries configured");
        assert!(err.to_string().contains("no libraries configured"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::Cancelled.context("while scanning /music");
        let msg = err.to_string();
        assert!(msg.contains("while scanning /music"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Cancelled.is_fatal());
        assert!(Error::AlreadyRunning.is_fatal());
        assert!(!Error::EntryInvalid {
            path: PathBuf::from("/x"),
            message: "loop".into()
        }
        .is_fatal());
        assert!(!Error::PathUnreadable {
            path: PathBuf::from("/x"),
            message: "denied".into()
        }
        .is_fatal());
    }
}
