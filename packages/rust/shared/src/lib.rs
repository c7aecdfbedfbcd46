//! Shared types, error model, and configuration for askpage.
//!
//! This crate is the foundation depended on by all other askpage crates.
//! It provides:
//! - [`AskPageError`]: the unified error type
//! - Domain types ([`FetchRequest`], [`ContactInfo`], [`AnswerResult`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ContentConfig, FetchConfig, LlmConfig, PolicyConfig, ServerConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{AskPageError, Result};
pub use types::{
    AnswerMetadata, AnswerResult, AnswerSource, ContactInfo, FetchRequest, FetchSource, RequestId,
};
