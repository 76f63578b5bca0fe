//! One logical fetch per identifier, wrapped in the retry state machine.
//!
//! [`RetryingFetcher::fetch`] never returns an error: every path ends in a
//! [`FetchOutcome`]. Waiting between attempts uses `tokio::time::sleep`, so a
//! fetch in backoff yields its worker thread to the other in-flight fetches.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use url::Url;

use crate::error::{Error, Result};
use crate::retry::{IsRetryable, RetryPolicy, RetryState, parse_retry_after};
use crate::types::{FailureReason, FetchOutcome, Identifier};

/// Path segments between the API origin and the identifier
const RESOURCE_PREFIX: [&str; 3] = ["api", "v2", "conversations"];

/// Path segment following the identifier
const RESOURCE_SUFFIX: &str = "recordings";

/// What the fetcher needs to know about one HTTP response
#[derive(Clone, Debug)]
pub struct RawResponse {
    /// Response status
    pub status: StatusCode,
    /// First `Retry-After` header value, if present and valid UTF-8
    pub retry_after: Option<String>,
    /// Response body as text
    pub body: String,
}

/// Abstraction over the HTTP GET, enabling testability.
///
/// Any `Err` is treated as a transport-level failure and retried.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Issue one authenticated GET and read the full body.
    async fn get(&self, url: &Url, bearer_token: &str) -> Result<RawResponse>;
}

/// Production [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client with the crate user agent and the transport's default timeouts.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("transcript-harvest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url, bearer_token: &str) -> Result<RawResponse> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(bearer_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Build `{base}/api/v2/conversations/{identifier}/recordings`.
///
/// The identifier is pushed as a single, percent-encoded path segment and any
/// path prefix on the base URL is kept.
pub fn resource_url(base: &Url, identifier: &Identifier) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| Error::Other(format!("base URL {base} cannot carry a path")))?;
        segments
            .pop_if_empty()
            .extend(RESOURCE_PREFIX)
            .push(identifier.as_str())
            .push(RESOURCE_SUFFIX);
    }
    url.set_query(None);
    Ok(url)
}

/// Run-wide fetch counters, replacing a shared mutable progress counter.
#[derive(Debug, Default)]
pub struct FetchStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

impl FetchStats {
    /// Record one success and return the running total
    pub fn record_success(&self) -> u64 {
        self.succeeded.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record one failure and return the running total
    pub fn record_failure(&self) -> u64 {
        self.failed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record one retry suspension
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Successes so far
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Failures so far
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Retry suspensions so far
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }
}

/// Fetches one identifier's records, retrying transient failures.
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    base_url: Url,
    bearer_token: String,
    policy: RetryPolicy,
    stats: Arc<FetchStats>,
}

impl RetryingFetcher {
    /// Create a fetcher for one API origin and credential.
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: Url,
        bearer_token: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            base_url,
            bearer_token: bearer_token.into(),
            policy,
            stats: Arc::new(FetchStats::default()),
        }
    }

    /// Share an existing counter set instead of a private one
    pub fn with_stats(mut self, stats: Arc<FetchStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Counters updated by this fetcher
    pub fn stats(&self) -> &Arc<FetchStats> {
        &self.stats
    }

    /// Fetch one identifier. Resolves to exactly one outcome; never panics on I/O.
    pub async fn fetch(&self, identifier: &Identifier) -> FetchOutcome {
        let url = match resource_url(&self.base_url, identifier) {
            Ok(url) => url,
            Err(e) => {
                return self.fail(
                    identifier,
                    FailureReason::Request {
                        message: e.to_string(),
                    },
                );
            }
        };

        let mut state = RetryState::new();

        loop {
            let (last, retry_after) = match self.transport.get(&url, &self.bearer_token).await {
                Ok(response) if response.status.is_success() => {
                    let total = self.stats.record_success();
                    tracing::info!(
                        identifier = %identifier,
                        succeeded = total,
                        retries = state.attempts(),
                        "Fetched recordings"
                    );
                    return FetchOutcome::Success {
                        identifier: identifier.clone(),
                        payload: response.body,
                    };
                }
                Ok(response) if response.status.is_retryable() => (
                    response.status.to_string(),
                    parse_retry_after(response.retry_after.as_deref()),
                ),
                Ok(response) => {
                    tracing::warn!(
                        identifier = %identifier,
                        status = response.status.as_u16(),
                        "Request failed with non-retryable status"
                    );
                    return self.fail(
                        identifier,
                        FailureReason::Status {
                            code: response.status.as_u16(),
                            body: response.body,
                        },
                    );
                }
                Err(e) => (e.to_string(), None),
            };

            match state.next_delay(&self.policy, retry_after) {
                Some(delay) => {
                    self.stats.record_retry();
                    tracing::warn!(
                        identifier = %identifier,
                        attempt = state.attempts(),
                        max_retries = self.policy.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        server_hint = retry_after.is_some(),
                        last = %last,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(
                        identifier = %identifier,
                        attempts = state.attempts(),
                        last = %last,
                        "Giving up after max retries"
                    );
                    return self.fail(identifier, FailureReason::MaxRetries { last });
                }
            }
        }
    }

    fn fail(&self, identifier: &Identifier, reason: FailureReason) -> FetchOutcome {
        self.stats.record_failure();
        FetchOutcome::Failure {
            identifier: identifier.clone(),
            reason,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Transport that replays a fixed script of responses and records each call.
    pub(crate) struct ScriptedTransport {
        script: std::sync::Mutex<VecDeque<Result<RawResponse>>>,
        calls: std::sync::Mutex<Vec<(Url, String, Instant)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: Vec<Result<RawResponse>>) -> Self {
            Self {
                script: std::sync::Mutex::new(script.into()),
                calls: std::sync::Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<(Url, String, Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, url: &Url, bearer_token: &str) -> Result<RawResponse> {
            self.calls
                .lock()
                .unwrap()
                .push((url.clone(), bearer_token.to_string(), Instant::now()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Other("script exhausted".to_string())))
        }
    }

    pub(crate) fn response(status: u16, body: &str) -> Result<RawResponse> {
        Ok(RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            retry_after: None,
            body: body.to_string(),
        })
    }

    fn response_with_retry_after(status: u16, retry_after: &str) -> Result<RawResponse> {
        Ok(RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            retry_after: Some(retry_after.to_string()),
            body: String::new(),
        })
    }

    fn fetcher(transport: Arc<ScriptedTransport>) -> RetryingFetcher {
        RetryingFetcher::new(
            transport,
            Url::parse("https://api.example.com").unwrap(),
            "token-123",
            RetryPolicy::default(),
        )
    }

    // -----------------------------------------------------------------------
    // resource_url
    // -----------------------------------------------------------------------

    #[test]
    fn resource_url_appends_fixed_path() {
        let base = Url::parse("https://api.example.com").unwrap();
        let url = resource_url(&base, &"abc-123".into()).unwrap();

        assert_eq!(
            url.as_str(),
            "https://api.example.com/api/v2/conversations/abc-123/recordings"
        );
    }

    #[test]
    fn resource_url_keeps_base_path_prefix_and_trailing_slash() {
        let base = Url::parse("https://gateway.example.com/proxy/").unwrap();
        let url = resource_url(&base, &"abc".into()).unwrap();

        assert_eq!(
            url.as_str(),
            "https://gateway.example.com/proxy/api/v2/conversations/abc/recordings"
        );
    }

    #[test]
    fn resource_url_encodes_identifier_as_one_segment() {
        let base = Url::parse("https://api.example.com").unwrap();
        let url = resource_url(&base, &"a/b c".into()).unwrap();

        assert_eq!(
            url.path(),
            "/api/v2/conversations/a%2Fb%20c/recordings",
            "slashes and spaces must not split the identifier"
        );
    }

    // -----------------------------------------------------------------------
    // retry state machine
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn success_returns_body_without_retry() {
        let transport = Arc::new(ScriptedTransport::new(vec![response(200, "[{\"id\":1}]")]));
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(&"conv-1".into()).await;

        assert_eq!(
            outcome,
            FetchOutcome::Success {
                identifier: "conv-1".into(),
                payload: "[{\"id\":1}]".to_string(),
            }
        );
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "token-123", "bearer token must be forwarded");
        assert_eq!(fetcher.stats().succeeded(), 1);
        assert_eq!(fetcher.stats().retries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_header_sets_exact_suspension() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            response_with_retry_after(503, "7"),
            response(200, "[]"),
        ]));
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(&"conv-1".into()).await;

        assert!(outcome.is_success());
        let calls = transport.calls();
        assert_eq!(calls.len(), 2, "one retry after the 503");
        let gap = calls[1].2.duration_since(calls[0].2);
        assert!(
            gap >= Duration::from_secs(7) && gap < Duration::from_millis(7_100),
            "Retry-After: 7 should suspend for 7s, suspended {gap:?}"
        );
        assert_eq!(fetcher.stats().retries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_retry_after_falls_back_to_tier() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            response_with_retry_after(429, "soon"),
            response(200, "[]"),
        ]));
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(&"conv-1".into()).await;

        assert!(outcome.is_success());
        let calls = transport.calls();
        let gap = calls[1].2.duration_since(calls[0].2);
        assert!(
            gap >= Duration::from_secs(3) && gap < Duration::from_millis(3_100),
            "garbage Retry-After should use the 3s tier, waited {gap:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn eleven_retryable_responses_exhaust_the_ceiling() {
        let script = (0..11).map(|_| response(503, "busy")).collect();
        let transport = Arc::new(ScriptedTransport::new(script));
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(&"conv-1".into()).await;

        match outcome {
            FetchOutcome::Failure { identifier, reason } => {
                assert_eq!(identifier.as_str(), "conv-1");
                assert_eq!(
                    reason,
                    FailureReason::MaxRetries {
                        last: "503 Service Unavailable".to_string()
                    }
                );
                assert!(reason.to_string().starts_with("max retries reached"));
            }
            other => panic!("expected max-retries failure, got {other:?}"),
        }
        assert_eq!(transport.calls().len(), 11, "initial attempt + 10 retries");
        assert_eq!(fetcher.stats().retries(), 10);
        assert_eq!(fetcher.stats().failed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_status_fails_immediately_with_body() {
        let transport = Arc::new(ScriptedTransport::new(vec![response(404, "no such conversation")]));
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(&"conv-1".into()).await;

        assert_eq!(
            outcome,
            FetchOutcome::Failure {
                identifier: "conv-1".into(),
                reason: FailureReason::Status {
                    code: 404,
                    body: "no such conversation".to_string()
                },
            }
        );
        assert_eq!(transport.calls().len(), 1, "404 must not be retried");
    }

    #[tokio::test(start_paused = true)]
    async fn plain_500_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![response(500, "boom")]));
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(&"conv-1".into()).await;

        assert!(!outcome.is_success());
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried_then_succeed() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
            Err(Error::Other("connection refused".to_string())),
            response(200, "[]"),
        ]));
        let fetcher = fetcher(transport.clone());

        let start = Instant::now();
        let outcome = fetcher.fetch(&"conv-1".into()).await;

        assert!(outcome.is_success());
        assert_eq!(transport.calls().len(), 3);
        assert!(
            start.elapsed() >= Duration::from_secs(6),
            "two 3s tier delays expected, elapsed {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_transport_errors_carry_last_message() {
        let script = (0..11)
            .map(|_| Err(Error::Other("dns lookup failed".to_string())))
            .collect();
        let transport = Arc::new(ScriptedTransport::new(script));
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(&"conv-1".into()).await;

        match outcome {
            FetchOutcome::Failure {
                reason: FailureReason::MaxRetries { last },
                ..
            } => assert_eq!(last, "dns lookup failed"),
            other => panic!("expected max-retries failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn long_server_hint_moves_later_retries_to_second_tier() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            response_with_retry_after(429, "300"),
            response(503, ""),
            response(200, "[]"),
        ]));
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(&"conv-1".into()).await;

        assert!(outcome.is_success());
        let calls = transport.calls();
        let second_gap = calls[2].2.duration_since(calls[1].2);
        assert!(
            second_gap >= Duration::from_secs(9) && second_gap < Duration::from_millis(9_100),
            "after 5 minutes of retrying the 9s tier applies, waited {second_gap:?}"
        );
    }

    // -----------------------------------------------------------------------
    // HttpTransport against a mock server
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn http_transport_sends_auth_and_reads_retry_after() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/conversations/xyz/recordings"))
            .and(header("Authorization", "Bearer tok"))
            .and(header("Accept", "application/json"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "12")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let base = Url::parse(&server.uri()).unwrap();
        let url = resource_url(&base, &"xyz".into()).unwrap();

        let response = transport.get(&url, "tok").await.unwrap();

        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.retry_after.as_deref(), Some("12"));
        assert_eq!(response.body, "slow down");
    }

    #[tokio::test]
    async fn http_transport_connection_refused_is_an_error() {
        // Bind then drop a listener to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = HttpTransport::new().unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/x")).unwrap();

        let result = transport.get(&url, "tok").await;

        assert!(matches!(result, Err(Error::Network(_))));
    }
}
