//! Core domain types for askpage requests and answers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PolicyConfig;
use crate::error::{AskPageError, Result};

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one `ask` call in logs and metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// FetchRequest
// ---------------------------------------------------------------------------

/// A validated inbound `(url, question)` pair.
///
/// Both fields are non-empty and within the configured length limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    url: String,
    question: String,
}

/// Loosely-typed request body, as received over HTTP.
#[derive(Debug, Deserialize)]
struct RawAskBody {
    #[serde(default)]
    url: Option<serde_json::Value>,
    #[serde(default)]
    question: Option<serde_json::Value>,
}

impl FetchRequest {
    /// Check presence and length limits.
    pub fn new(
        url: impl Into<String>,
        question: impl Into<String>,
        policy: &PolicyConfig,
    ) -> Result<Self> {
        let url = url.into().trim().to_string();
        let question = question.into().trim().to_string();

        if url.is_empty() || question.is_empty() {
            return Err(AskPageError::validation("url and question are both required"));
        }
        if url.chars().count() > policy.max_url_length {
            return Err(AskPageError::validation(format!(
                "url exceeds {} characters",
                policy.max_url_length
            )));
        }
        if question.chars().count() > policy.max_question_length {
            return Err(AskPageError::validation(format!(
                "question exceeds {} characters",
                policy.max_question_length
            )));
        }

        Ok(Self { url, question })
    }

    /// Build from an untyped JSON body, rejecting missing or non-string fields.
    pub fn from_json(body: serde_json::Value, policy: &PolicyConfig) -> Result<Self> {
        let raw: RawAskBody = serde_json::from_value(body)
            .map_err(|_| AskPageError::validation("request body must be a JSON object"))?;

        let (Some(url), Some(question)) = (raw.url, raw.question) else {
            return Err(AskPageError::validation("url and question are both required"));
        };

        match (url, question) {
            (serde_json::Value::String(url), serde_json::Value::String(question)) => {
                Self::new(url, question, policy)
            }
            _ => Err(AskPageError::validation("url and question must be strings")),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn question(&self) -> &str {
        &self.question
    }
}

// ---------------------------------------------------------------------------
// ContactInfo
// ---------------------------------------------------------------------------

/// Contact details pulled out of page content.
///
/// Only meaningful when at least one field is non-empty; use
/// [`ContactInfo::into_valid`] before trusting it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub emails: BTreeSet<String>,
    pub phones: BTreeSet<String>,
    /// Contact-related sentences, in document order.
    pub other: Vec<String>,
}

impl ContactInfo {
    pub fn is_valid(&self) -> bool {
        !self.emails.is_empty() || !self.phones.is_empty() || !self.other.is_empty()
    }

    /// `None` when every field is empty.
    pub fn into_valid(self) -> Option<Self> {
        self.is_valid().then_some(self)
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Which retrieval path produced the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSource {
    /// The JSON-RPC subprocess.
    Protocol,
    /// The direct HTTP GET.
    Direct,
}

impl FetchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Direct => "direct",
        }
    }
}

/// Which generator produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    /// The deterministic local generator.
    Fallback,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Fallback => "fallback",
        }
    }
}

// ---------------------------------------------------------------------------
// AnswerResult
// ---------------------------------------------------------------------------

/// Per-request facts reported alongside the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerMetadata {
    pub request_id: RequestId,
    /// Characters of processed content handed to the composer.
    pub content_length: usize,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub fetch_source: FetchSource,
    pub protocol_used: bool,
    pub answer_source: AnswerSource,
    pub answer_length: usize,
    pub is_contact_question: bool,
    pub has_contact_info: bool,
    pub contact_enhanced: bool,
}

/// Everything returned by one successful `ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub url: String,
    pub question: String,
    pub answer: String,
    /// The processed page text the answer was based on.
    pub raw_content: String,
    #[serde(default)]
    pub contact_info: Option<ContactInfo>,
    pub metadata: AnswerMetadata,
}
