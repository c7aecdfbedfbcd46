//! Primary-then-fallback content retrieval.

use async_trait::async_trait;
use tracing::{info, warn};
use url::Url;

use askpage_shared::{FetchConfig, FetchSource, Result};

use crate::direct::DirectFetcher;
use crate::protocol::ProtocolClient;

/// Anything that can turn a URL into page text.
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn kind(&self) -> FetchSource;

    async fn fetch(&self, url: &Url) -> Result<String>;
}

#[async_trait]
impl ContentSource for ProtocolClient {
    fn kind(&self) -> FetchSource {
        FetchSource::Protocol
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        ProtocolClient::fetch(self, url).await
    }
}

#[async_trait]
impl ContentSource for DirectFetcher {
    fn kind(&self) -> FetchSource {
        FetchSource::Direct
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        DirectFetcher::fetch(self, url).await
    }
}

/// Page text plus the path that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub text: String,
    pub source: FetchSource,
}

/// Tries the primary source, falling back on recoverable failures.
pub struct ContentFetcher {
    primary: Option<Box<dyn ContentSource>>,
    fallback: Box<dyn ContentSource>,
}

impl ContentFetcher {
    pub fn new(primary: Option<Box<dyn ContentSource>>, fallback: Box<dyn ContentSource>) -> Self {
        Self { primary, fallback }
    }

    /// Protocol client first (if enabled), direct HTTP second.
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let primary = config
            .protocol_enabled
            .then(|| Box::new(ProtocolClient::new(config)) as Box<dyn ContentSource>);
        let fallback = Box::new(DirectFetcher::new(config.direct_timeout())?);
        Ok(Self::new(primary, fallback))
    }

    /// Fetch `url`, surfacing an error only if every path fails.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedContent> {
        if let Some(primary) = &self.primary {
            match primary.fetch(url).await {
                Ok(text) => {
                    return Ok(FetchedContent {
                        text,
                        source: primary.kind(),
                    });
                }
                Err(e) if e.is_recoverable() => {
                    warn!(
                        source = primary.kind().as_str(),
                        error = %e,
                        "primary fetch failed, falling back"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let text = self.fallback.fetch(url).await?;
        info!(source = self.fallback.kind().as_str(), "content retrieved via fallback");
        Ok(FetchedContent {
            text,
            source: self.fallback.kind(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use askpage_shared::AskPageError;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    struct Scripted {
        kind: FetchSource,
        outcome: fn() -> Result<String>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn boxed(
            kind: FetchSource,
            outcome: fn() -> Result<String>,
        ) -> (Box<dyn ContentSource>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Box::new(Self {
                kind,
                outcome,
                calls: calls.clone(),
            });
            (source, calls)
        }
    }

    #[async_trait]
    impl ContentSource for Scripted {
        fn kind(&self) -> FetchSource {
            self.kind
        }

        async fn fetch(&self, _url: &Url) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    fn url() -> Url {
        Url::parse("https://en.wikipedia.org/wiki/Test").unwrap()
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let (primary, _) = Scripted::boxed(FetchSource::Protocol, || Ok("from protocol".into()));
        let (fallback, fallback_calls) = Scripted::boxed(FetchSource::Direct, || Ok("direct".into()));

        let fetched = ContentFetcher::new(Some(primary), fallback)
            .fetch(&url())
            .await
            .unwrap();

        assert_eq!(fetched.text, "from protocol");
        assert_eq!(fetched.source, FetchSource::Protocol);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn recoverable_primary_failure_falls_back() {
        for failure in [
            (|| Err(AskPageError::Protocol("spawn failed".into()))) as fn() -> Result<String>,
            || Err(AskPageError::UpstreamTimeout("15000ms".into())),
        ] {
            let (primary, _) = Scripted::boxed(FetchSource::Protocol, failure);
            let (fallback, calls) = Scripted::boxed(FetchSource::Direct, || Ok("direct".into()));

            let fetched = ContentFetcher::new(Some(primary), fallback)
                .fetch(&url())
                .await
                .unwrap();

            assert_eq!(fetched.source, FetchSource::Direct);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn unrecoverable_primary_failure_propagates() {
        let (primary, _) =
            Scripted::boxed(FetchSource::Protocol, || Err(AskPageError::config("bad command")));
        let (fallback, calls) = Scripted::boxed(FetchSource::Direct, || Ok("direct".into()));

        let err = ContentFetcher::new(Some(primary), fallback)
            .fetch(&url())
            .await
            .unwrap_err();

        assert!(matches!(err, AskPageError::Config { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_primary_goes_straight_to_fallback() {
        let (fallback, calls) = Scripted::boxed(FetchSource::Direct, || Ok("direct".into()));
        let fetched = ContentFetcher::new(None, fallback).fetch(&url()).await.unwrap();
        assert_eq!(fetched.source, FetchSource::Direct);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn both_paths_failing_surfaces_fetch_error() {
        let config = FetchConfig {
            protocol_command: "askpage-test-no-such-binary".into(),
            direct_timeout_ms: 2_000,
            ..FetchConfig::default()
        };
        let fetcher = ContentFetcher::from_config(&config).unwrap();

        let url = Url::parse("http://127.0.0.1:1/wiki/Test").unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, AskPageError::Fetch(_)), "{err}");
    }

    #[tokio::test]
    async fn spawn_failure_falls_back_to_direct_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Served directly</p>"))
            .mount(&server)
            .await;

        let config = FetchConfig {
            protocol_command: "askpage-test-no-such-binary".into(),
            ..FetchConfig::default()
        };
        let fetcher = ContentFetcher::from_config(&config).unwrap();

        let url = Url::parse(&format!("{}/wiki/Test", server.uri())).unwrap();
        let fetched = fetcher.fetch(&url).await.unwrap();
        assert_eq!(fetched.text, "Served directly");
        assert_eq!(fetched.source, FetchSource::Direct);
    }
}
