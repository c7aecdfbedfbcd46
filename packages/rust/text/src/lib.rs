//! Text handling for retrieved pages.
//!
//! This crate provides:
//! - [`markup`]: HTML-to-text stripping for directly fetched pages
//! - [`process`](mod@process): whitespace normalization, sentence dedup, bounded truncation
//! - [`contact`]: contact-question/content classifiers and the contact extractor
//!
//! Everything here is pure and total: no I/O, no errors.

pub mod contact;
pub mod markup;
pub mod process;

pub use contact::{
    extract_contact_information, has_contact_information, is_contact_question, phone_digits,
};
pub use markup::strip_markup;
pub use process::{DEFAULT_MAX_LENGTH, ELLIPSIS, process, split_sentences};
