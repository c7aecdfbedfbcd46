//! End-to-end `ask` pipeline: URL → validate → fetch → process → contacts → answer.

use std::time::Instant;

use chrono::Utc;
use tracing::{Span, field, info, instrument};

use askpage_fetch::{ContentFetcher, UrlValidator};
use askpage_shared::{
    AnswerMetadata, AnswerResult, AppConfig, AskPageError, FetchRequest, FetchSource, RequestId,
    Result,
};
use askpage_text::{extract_contact_information, has_contact_information, is_contact_question};

use crate::answer::AnswerComposer;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
}

/// Answers questions about allow-listed pages.
///
/// Holds only read-only state, so one instance serves concurrent requests.
pub struct AskService {
    config: AppConfig,
    validator: UrlValidator,
    fetcher: ContentFetcher,
    composer: AnswerComposer,
}

impl AskService {
    /// Build every collaborator from configuration.
    pub fn new(config: AppConfig) -> Result<Self> {
        let fetcher = ContentFetcher::from_config(&config.fetch)?;
        let composer = AnswerComposer::from_config(&config.llm)?;
        Ok(Self::from_parts(config, fetcher, composer))
    }

    /// Assemble from explicit collaborators (tests substitute their own).
    pub fn from_parts(config: AppConfig, fetcher: ContentFetcher, composer: AnswerComposer) -> Self {
        let validator = UrlValidator::new(&config.policy);
        Self {
            config,
            validator,
            fetcher,
            composer,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn validator(&self) -> &UrlValidator {
        &self.validator
    }

    pub fn composer(&self) -> &AnswerComposer {
        &self.composer
    }

    /// Validate raw input and run the pipeline.
    pub async fn ask(&self, url: &str, question: &str) -> Result<AnswerResult> {
        let request = FetchRequest::new(url, question, &self.config.policy)?;
        self.ask_request(request, &SilentProgress).await
    }

    /// Run the pipeline for an already-shaped request.
    #[instrument(
        skip_all,
        fields(request_id = field::Empty, url = %request.url())
    )]
    pub async fn ask_request(
        &self,
        request: FetchRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<AnswerResult> {
        let started = Instant::now();
        let request_id = RequestId::new();
        Span::current().record("request_id", field::display(request_id));

        progress.phase("Validating URL");
        let url = self.validator.check(request.url())?;

        progress.phase("Fetching content");
        let fetched = self.fetcher.fetch(&url).await?;

        let raw_chars = fetched.text.chars().count();
        let min_chars = self.config.fetch.min_content_length;
        if raw_chars < min_chars {
            return Err(AskPageError::Fetch(format!(
                "content too short ({raw_chars} chars, need at least {min_chars})"
            )));
        }

        progress.phase("Processing content");
        let processed = askpage_text::process(&fetched.text, self.config.content.max_length);
        if processed.is_empty() {
            return Err(AskPageError::processing(
                "content was empty after normalization",
            ));
        }

        let contact_question = is_contact_question(request.question());
        let contact_info = (contact_question && has_contact_information(&processed))
            .then(|| extract_contact_information(&processed))
            .and_then(|info| info.into_valid());

        progress.phase("Composing answer");
        let answer = self
            .composer
            .answer(&processed, request.question(), contact_info.as_ref())
            .await;

        let content_length = processed.chars().count();
        let answer_length = answer.text.chars().count();
        let processing_time_ms = started.elapsed().as_millis() as u64;

        info!(
            fetch_source = fetched.source.as_str(),
            answer_source = answer.source.as_str(),
            content_length,
            processing_time_ms,
            "ask complete"
        );

        Ok(AnswerResult {
            url: request.url().to_string(),
            question: request.question().to_string(),
            answer: answer.text,
            raw_content: processed,
            metadata: AnswerMetadata {
                request_id,
                content_length,
                processing_time_ms,
                timestamp: Utc::now(),
                fetch_source: fetched.source,
                protocol_used: fetched.source == FetchSource::Protocol,
                answer_source: answer.source,
                answer_length,
                is_contact_question: contact_question,
                has_contact_info: contact_info.is_some(),
                contact_enhanced: answer.contact_enhanced,
            },
            contact_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use askpage_fetch::{ContentSource, ProtocolClient};
    use askpage_shared::{AnswerSource, FetchConfig};
    use async_trait::async_trait;
    use url::Url;

    use super::*;

    struct StubSource {
        kind: FetchSource,
        body: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ContentSource for StubSource {
        fn kind(&self) -> FetchSource {
            self.kind
        }

        async fn fetch(&self, _url: &Url) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body
                .map(String::from)
                .ok_or_else(|| AskPageError::Fetch("connection reset".into()))
        }
    }

    fn service_with(body: Option<&'static str>) -> (AskService, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = StubSource {
            kind: FetchSource::Direct,
            body,
            calls: calls.clone(),
        };
        let fetcher = ContentFetcher::new(None, Box::new(source));
        let service =
            AskService::from_parts(AppConfig::default(), fetcher, AnswerComposer::new(Vec::new()));
        (service, calls)
    }

    const PAGE: &str = "Acme builds rockets for small satellites. \
                        Contact us at jane@company.com or call 555-123-4567. \
                        Our launch site is in New Zealand.";

    #[tokio::test]
    async fn missing_input_is_rejected_before_fetching() {
        let (service, calls) = service_with(Some(PAGE));
        let err = service.ask("", "What?").await.unwrap_err();
        assert!(matches!(err, AskPageError::Validation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disallowed_url_is_rejected_before_fetching() {
        let (service, calls) = service_with(Some(PAGE));
        let err = service
            .ask("https://github.com/admin/users", "Who is admin?")
            .await
            .unwrap_err();
        assert!(matches!(err, AskPageError::UrlNotPermitted { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_content_is_fetch_error() {
        let (service, _) = service_with(Some("Too short to answer from."));
        let err = service
            .ask("https://en.wikipedia.org/wiki/Test", "What is this?")
            .await
            .unwrap_err();
        assert!(matches!(&err, AskPageError::Fetch(msg) if msg.contains("too short")), "{err}");
    }

    #[tokio::test]
    async fn content_of_only_fragments_is_processing_error() {
        let fragments = "Hi. Ok. Yes. No. Sure. Fine. Right. Maybe. Later. Bye. Now. Then.";
        let (service, _) = service_with(Some(fragments));
        let err = service
            .ask("https://en.wikipedia.org/wiki/Test", "What is this?")
            .await
            .unwrap_err();
        assert!(matches!(err, AskPageError::Processing { .. }), "{err}");
    }

    #[tokio::test]
    async fn contact_question_extracts_and_enhances() {
        let (service, _) = service_with(Some(PAGE));
        let result = service
            .ask("https://en.wikipedia.org/wiki/Acme", "How do I contact support?")
            .await
            .unwrap();

        let info = result.contact_info.as_ref().expect("contact info");
        assert!(info.emails.contains("jane@company.com"));
        assert!(
            info.phones
                .iter()
                .any(|p| askpage_text::phone_digits(p) == "5551234567")
        );

        let meta = &result.metadata;
        assert!(meta.is_contact_question && meta.has_contact_info && meta.contact_enhanced);
        assert_eq!(meta.fetch_source, FetchSource::Direct);
        assert!(!meta.protocol_used);
        assert_eq!(meta.answer_source, AnswerSource::Fallback);
        assert_eq!(meta.content_length, result.raw_content.chars().count());
        assert_eq!(meta.answer_length, result.answer.chars().count());
        assert!(result.answer.contains("jane@company.com"));
    }

    #[tokio::test]
    async fn ordinary_question_skips_contact_extraction() {
        let (service, _) = service_with(Some(PAGE));
        let result = service
            .ask("https://en.wikipedia.org/wiki/Acme", "Where is the launch site?")
            .await
            .unwrap();

        assert!(result.contact_info.is_none());
        assert!(!result.metadata.is_contact_question);
        assert!(!result.metadata.contact_enhanced);
        assert!(result.answer.contains("New Zealand"));
    }

    #[tokio::test]
    async fn spawn_failure_then_network_failure_is_fetch_error() {
        let protocol = ProtocolClient::new(&FetchConfig {
            protocol_command: "askpage-test-no-such-binary".into(),
            ..FetchConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let direct = StubSource {
            kind: FetchSource::Direct,
            body: None,
            calls: calls.clone(),
        };
        let fetcher = ContentFetcher::new(
            Some(Box::new(protocol) as Box<dyn ContentSource>),
            Box::new(direct),
        );
        let service =
            AskService::from_parts(AppConfig::default(), fetcher, AnswerComposer::new(Vec::new()));

        let err = service
            .ask("https://en.wikipedia.org/wiki/Test", "What is a test?")
            .await
            .unwrap_err();

        assert!(matches!(err, AskPageError::Fetch(_)), "{err}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
