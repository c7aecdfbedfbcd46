//! Core pipeline orchestration and domain logic for askpage.
//!
//! This crate ties together URL validation, content fetching, text
//! processing and answer composition into the `ask` workflow.

pub mod answer;
pub mod llm;
pub mod pipeline;

pub use answer::{Answer, AnswerComposer};
pub use llm::{AnthropicProvider, CompletionProvider, OpenAiProvider};
pub use pipeline::{AskService, ProgressReporter, SilentProgress};
