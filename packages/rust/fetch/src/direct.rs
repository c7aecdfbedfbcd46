//! Plain HTTP retrieval, used when the protocol path is unavailable.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, DNT, HeaderMap, HeaderValue, UPGRADE_INSECURE_REQUESTS};
use tracing::{debug, info, instrument};
use url::Url;

use askpage_shared::{AskPageError, Result};
use askpage_text::strip_markup;

/// User-Agent sent on direct fetches.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; MCP-Fetch-Service/1.0)";

/// GETs a page and reduces it to visible text.
#[derive(Debug, Clone)]
pub struct DirectFetcher {
    client: Client,
}

impl DirectFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(DNT, HeaderValue::from_static("1"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| AskPageError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Fetch `url` and strip its markup.
    ///
    /// Non-2xx responses fail with the status code and reason; a request that
    /// outlives the timeout fails with [`AskPageError::UpstreamTimeout`].
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &Url) -> Result<String> {
        debug!("fetching directly");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AskPageError::Fetch(format!("{url}: HTTP {status}")));
        }

        let body = response.text().await.map_err(|e| classify(url, e))?;
        let text = strip_markup(&body);

        info!(html_bytes = body.len(), chars = text.chars().count(), "fetched directly");
        Ok(text)
    }
}

fn classify(url: &Url, e: reqwest::Error) -> AskPageError {
    if e.is_timeout() {
        AskPageError::UpstreamTimeout(format!("{url}: {e}"))
    } else {
        AskPageError::Fetch(format!("{url}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(timeout_ms: u64) -> DirectFetcher {
        DirectFetcher::new(Duration::from_millis(timeout_ms)).unwrap()
    }

    #[tokio::test]
    async fn strips_markup_and_sends_browser_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/Test"))
            .and(header("user-agent", USER_AGENT))
            .and(header_exists("accept-language"))
            .and(header("dnt", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><script>track()</script><body><h1>Test</h1><p>A page &amp; more.</p></body></html>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/wiki/Test", server.uri())).unwrap();
        let text = fetcher(5_000).fetch(&url).await.unwrap();
        assert_eq!(text, "Test A page & more.");
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = fetcher(5_000).fetch(&url).await.unwrap_err();
        assert!(matches!(&err, AskPageError::Fetch(msg) if msg.contains("404")), "{err}");
    }

    #[tokio::test]
    async fn slow_server_is_upstream_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let err = fetcher(200).fetch(&url).await.unwrap_err();
        assert!(matches!(err, AskPageError::UpstreamTimeout(_)), "{err}");
    }

    #[tokio::test]
    async fn connection_refused_is_fetch_error() {
        let url = Url::parse("http://127.0.0.1:1/wiki/Test").unwrap();
        let err = fetcher(2_000).fetch(&url).await.unwrap_err();
        assert!(matches!(err, AskPageError::Fetch(_)), "{err}");
    }
}
