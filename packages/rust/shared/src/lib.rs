//! Shared types, error model, and configuration for coursebook.
//!
//! This crate is the foundation depended on by all other coursebook crates.
//! It provides:
//! - [`CoursebookError`] — the unified error type
//! - Domain types ([`Manifest`], [`Part`], [`Lesson`], [`RawDocument`])
//! - Configuration ([`AppConfig`], [`BatchSettings`], [`OutputPaths`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchSettings, ContentConfig, EmojiMode, ExportType, OutputPaths, PathsConfig,
    RunnerSection, SUPPORTED_LANGUAGES, SiteConfig, config_dir, config_file_path, init_config,
    language_name, load_config, load_config_from, validate_config, validate_language,
};
pub use error::{CoursebookError, Result};
pub use types::{Lesson, Manifest, ManifestEntry, Part, RawDocument};
