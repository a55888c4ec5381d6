//! Error types for coursebook.
//!
//! Library crates use [`CoursebookError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all coursebook operations.
#[derive(Debug, thiserror::Error)]
pub enum CoursebookError {
    /// The manifest is missing, unparseable, or inconsistent. Fatal.
    #[error("manifest error: {message}")]
    Manifest { message: String },

    /// A single raw document could not be parsed.
    #[error("failed to parse {filename}: {message}")]
    DocumentParse { filename: String, message: String },

    /// A same-site link could not be resolved to an output document.
    #[error("unresolved link {href:?}: {reason}")]
    LinkResolution { href: String, reason: String },

    /// An image referenced by a transformed document is not on disk.
    #[error("missing asset {path:?} (source {url})")]
    AssetMissing { path: PathBuf, url: String },

    /// An operation failed on every allowed attempt.
    #[error("gave up after {attempts} attempt(s): {message}")]
    RetryExhausted { attempts: u32, message: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching assets.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad option value, malformed JSON list, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CoursebookError>;

impl CoursebookError {
    /// Create a manifest error from any displayable message.
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest {
            message: msg.into(),
        }
    }

    /// Create a document parse error for `filename`.
    pub fn document_parse(filename: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::DocumentParse {
            filename: filename.into(),
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the run before any batch starts.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Manifest { .. } | Self::Config { .. } | Self::Io { .. })
    }
}
