//! Answer composition: prompt building, provider fallthrough, local fallback.

use tracing::{debug, info, instrument, warn};

use askpage_shared::{AnswerSource, ContactInfo, LlmConfig, Result};
use askpage_text::{is_contact_question, split_sentences};

use crate::llm::{self, CompletionProvider};

/// Characters of content quoted when no sentence matches the question.
const EXCERPT_CHARS: usize = 300;
/// Sentences quoted by the keyword fallback.
const MAX_FALLBACK_SENTENCES: usize = 3;
/// Question words must be longer than this to count as keywords.
const MIN_KEYWORD_CHARS: usize = 2;

/// A composed answer and how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
    /// The contact-enhanced prompt (or contact fallback) was used.
    pub contact_enhanced: bool,
}

/// Turns processed content and a question into an answer. Never fails.
pub struct AnswerComposer {
    providers: Vec<Box<dyn CompletionProvider>>,
}

impl AnswerComposer {
    pub fn new(providers: Vec<Box<dyn CompletionProvider>>) -> Self {
        Self { providers }
    }

    /// Providers for whichever API keys are present in the environment.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self::new(llm::providers_from_config(config)?))
    }

    /// Names of the configured providers, in the order they are tried.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.source().as_str()).collect()
    }

    #[instrument(skip_all, fields(providers = self.providers.len()))]
    pub async fn answer(
        &self,
        content: &str,
        question: &str,
        contact: Option<&ContactInfo>,
    ) -> Answer {
        let contact = contact.filter(|info| info.is_valid() && is_contact_question(question));
        let contact_enhanced = contact.is_some();

        let prompt = match contact {
            Some(info) => enhanced_prompt(content, question, info),
            None => standard_prompt(content, question),
        };
        debug!(contact_enhanced, prompt_chars = prompt.chars().count(), "prompt built");

        for provider in &self.providers {
            let source = provider.source();
            match provider.complete(&prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    info!(source = source.as_str(), chars = text.chars().count(), "answer composed");
                    return Answer {
                        text: text.trim().to_string(),
                        source,
                        contact_enhanced,
                    };
                }
                Ok(_) => warn!(source = source.as_str(), "provider returned an empty completion"),
                Err(e) => warn!(source = source.as_str(), error = %e, "provider failed, trying next"),
            }
        }

        info!("answer composed locally");
        Answer {
            text: fallback_answer(content, question, contact),
            source: AnswerSource::Fallback,
            contact_enhanced,
        }
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Labeled lines for each non-empty contact field.
pub fn contact_block(info: &ContactInfo) -> String {
    let mut block = String::new();

    if !info.emails.is_empty() {
        let emails: Vec<&str> = info.emails.iter().map(String::as_str).collect();
        block.push_str(&format!("Emails: {}\n", emails.join(", ")));
    }
    if !info.phones.is_empty() {
        let phones: Vec<&str> = info.phones.iter().map(String::as_str).collect();
        block.push_str(&format!("Phones: {}\n", phones.join(", ")));
    }
    if !info.other.is_empty() {
        block.push_str(&format!("Notes: {}\n", info.other.join(" ")));
    }

    block
}

fn standard_prompt(content: &str, question: &str) -> String {
    format!(
        "Answer the user's question using the web page content below. \
         Be accurate, helpful and concise.\n\n\
         Page content:\n{content}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

fn enhanced_prompt(content: &str, question: &str, info: &ContactInfo) -> String {
    format!(
        "The user is asking for contact details. Answer using the web page content \
         and the contact information extracted from it.\n\n\
         Page content:\n{content}\n\n\
         ===== Extracted contact information =====\n\
         {block}\
         =========================================\n\n\
         Question: {question}\n\n\
         Give complete and accurate contact details:",
        block = contact_block(info),
    )
}

// ---------------------------------------------------------------------------
// Local fallback
// ---------------------------------------------------------------------------

/// Deterministic answer used when no provider is configured or all fail.
pub fn fallback_answer(content: &str, question: &str, contact: Option<&ContactInfo>) -> String {
    if let Some(info) = contact {
        return format!("Contact details found on the page:\n\n{}", contact_block(info));
    }

    let keywords = question_keywords(question);
    let matches: Vec<&str> = split_sentences(content)
        .filter(|sentence| {
            let lower = sentence.to_lowercase();
            keywords.iter().any(|k| lower.contains(k.as_str()))
        })
        .take(MAX_FALLBACK_SENTENCES)
        .collect();

    if !matches.is_empty() {
        return format!(
            "Based on the page content, here is what relates to \"{question}\":\n\n{}\n\n\
             Note: this answer was assembled by keyword matching.",
            matches.join(". ")
        );
    }

    let excerpt: String = content.chars().take(EXCERPT_CHARS).collect();
    format!(
        "The page was retrieved, but nothing in it directly matches \"{question}\". \
         Summary of the main content:\n\n{excerpt}..."
    )
}

/// Lowercased question words longer than two characters, edge punctuation removed.
fn question_keywords(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|word| word.chars().count() > MIN_KEYWORD_CHARS)
        .collect()
}
