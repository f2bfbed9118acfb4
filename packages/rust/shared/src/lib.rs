//! Shared types, error model, and configuration for outlinekb.
//!
//! This crate is the foundation depended on by all other outlinekb crates.
//! It provides:
//! - [`OutlineKbError`]: the unified error type
//! - Domain types ([`ParsedOutline`], [`Topic`], [`Subtopic`], [`OutlineStats`])
//! - Run-report types ([`FileOutcome`], [`ItemStatus`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildConfig, CompletionConfig, OutlineConfig, config_dir, config_file_path,
    load_config, load_config_from, resolve_api_key,
};
pub use error::{OutlineKbError, Result};
pub use types::{
    ConceptMode, FileOutcome, HookAnswers, HooksByTitle, ItemKind, ItemStatus, OutlineStats,
    ParsedOutline, Subtopic, Topic, WritePolicy,
};
