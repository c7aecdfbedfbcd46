//! Content acquisition for askpage.
//!
//! This crate provides:
//! - [`validator`]: URL admission against the configured policy
//! - [`protocol`]: the stdio JSON-RPC client for the fetch tool server
//! - [`direct`]: the plain HTTP fallback
//! - [`source`]: the primary-then-fallback strategy tying them together

pub mod direct;
pub mod protocol;
pub mod source;
pub mod validator;

pub use direct::DirectFetcher;
pub use protocol::{ProtocolClient, ProtocolSession, SessionState};
pub use source::{ContentFetcher, ContentSource, FetchedContent};
pub use validator::UrlValidator;
