//! End-to-end lookups against a mock CDX server.
//!
//! The client is blocking and owns its own runtime, so it is built, used and
//! dropped inside `spawn_blocking`, never on the test's async runtime.

use serde_json::json;
use std::time::{Duration, Instant};
use webarchive::archive::SkipRules;
use webarchive::source::Source;
use webarchive::{
    extract_urls, substitute_urls, CancelToken, Lookup, LookupError, Resolver, RetryPolicy,
    WaybackClient,
};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CDX_PATH: &str = "/cdx/search/cdx";

fn cdx_endpoint(server: &MockServer) -> String {
    format!("{}{}", server.uri(), CDX_PATH)
}

/// Call only from a blocking thread.
fn client_for(endpoint: &str) -> WaybackClient {
    WaybackClient::builder()
        .endpoint(endpoint)
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client builds")
}

fn cdx_rows(url: &str, timestamp: &str) -> serde_json::Value {
    json!([
        ["urlkey", "timestamp", "original", "mimetype", "statuscode", "digest", "length"],
        ["com,example)/a", timestamp, url, "text/html", "200", "ABCDEF", "1234"]
    ])
}

/// Run `text` through extract -> resolve -> substitute against `endpoint`.
async fn rewrite(
    endpoint: String,
    text: &'static str,
    retry: RetryPolicy,
) -> (String, Option<webarchive::AggregateFailure>) {
    tokio::task::spawn_blocking(move || {
        let resolver = Resolver::new(client_for(&endpoint), SkipRules::default(), retry);
        let candidates = extract_urls(text);
        let resolution = resolver.resolve(&candidates, &CancelToken::new());
        let output = substitute_urls(text, &resolution.replacements);
        (output, resolution.error)
    })
    .await
    .expect("blocking task")
}

#[tokio::test]
async fn duplicate_urls_resolve_with_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CDX_PATH))
        .and(query_param("output", "json"))
        .and(query_param("limit", "1"))
        .and(query_param("url", "http://example.com/a"))
        .and(query_param_is_missing("from"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cdx_rows("http://example.com/a", "20200101000000")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (output, error) = rewrite(
        cdx_endpoint(&server),
        "see http://example.com/a and http://example.com/a again",
        RetryPolicy::new(3, Duration::ZERO),
    )
    .await;

    assert_eq!(
        output,
        "see https://web.archive.org/20200101000000/http://example.com/a and \
         https://web.archive.org/20200101000000/http://example.com/a again"
    );
    assert!(error.is_none());
}

#[tokio::test]
async fn not_found_leaves_url_unchanged_and_reports_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CDX_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let text = "missing: http://nowhere.example/page.";
    let (output, error) = rewrite(
        cdx_endpoint(&server),
        text,
        RetryPolicy::new(2, Duration::from_millis(10)),
    )
    .await;

    assert_eq!(output, text);
    let error = error.expect("aggregate failure");
    assert_eq!(
        error.urls().collect::<Vec<_>>(),
        vec!["http://nowhere.example/page."]
    );
    assert!(matches!(
        error.failures[0].source,
        LookupError::NotFound { .. }
    ));
    assert!(error.to_string().contains("http://nowhere.example/page."));
}

#[tokio::test]
async fn missing_timestamp_column_is_retried_then_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CDX_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            ["urlkey", "original"],
            ["com,example)/b", "http://example.com/b"]
        ])))
        .expect(3)
        .mount(&server)
        .await;

    let (output, error) = rewrite(
        cdx_endpoint(&server),
        "(http://example.com/b)",
        RetryPolicy::new(3, Duration::ZERO),
    )
    .await;

    assert_eq!(output, "(http://example.com/b)");
    let error = error.expect("aggregate failure");
    assert_eq!(error.failures.len(), 1);
    assert_eq!(error.failures[0].attempts, 3);
    assert!(matches!(
        error.failures[0].source,
        LookupError::MalformedResponse { .. }
    ));
}

#[tokio::test]
async fn from_date_is_sent_as_lower_bound() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CDX_PATH))
        .and(query_param("from", "20190101"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(cdx_rows("http://example.com/a", "20190315")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = cdx_endpoint(&server);
    let got = tokio::task::spawn_blocking(move || {
        let client = WaybackClient::builder()
            .endpoint(endpoint)
            .from_date(Some("20190101".to_string()))
            .build()
            .expect("client builds");
        client.lookup("http://example.com/a", &CancelToken::new())
    })
    .await
    .expect("blocking task");

    assert_eq!(
        got.ok().as_deref(),
        Some("https://web.archive.org/20190315/http://example.com/a")
    );
}

#[tokio::test]
async fn server_error_is_connectivity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CDX_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let endpoint = cdx_endpoint(&server);
    let got = tokio::task::spawn_blocking(move || {
        client_for(&endpoint).lookup("http://example.com/a", &CancelToken::new())
    })
    .await
    .expect("blocking task");

    assert!(matches!(got, Err(LookupError::Connectivity { .. })));
}

#[tokio::test]
async fn undecodable_body_is_connectivity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CDX_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
        .mount(&server)
        .await;

    let endpoint = cdx_endpoint(&server);
    let got = tokio::task::spawn_blocking(move || {
        client_for(&endpoint).lookup("http://example.com/a", &CancelToken::new())
    })
    .await
    .expect("blocking task");

    assert!(matches!(got, Err(LookupError::Connectivity { .. })));
}

#[tokio::test]
async fn slow_server_times_out_as_connectivity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CDX_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cdx_rows("http://example.com/a", "2020"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let endpoint = cdx_endpoint(&server);
    let got = tokio::task::spawn_blocking(move || {
        let client = WaybackClient::builder()
            .endpoint(endpoint)
            .timeout(Duration::from_millis(200))
            .build()
            .expect("client builds");
        client.lookup("http://example.com/a", &CancelToken::new())
    })
    .await
    .expect("blocking task");

    match got {
        Err(LookupError::Connectivity { source }) => assert!(source.is_timeout()),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn cancellation_abandons_in_flight_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CDX_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cdx_rows("http://example.com/a", "2020"))
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&server)
        .await;

    let endpoint = cdx_endpoint(&server);
    let cancel = CancelToken::new();
    let remote = cancel.clone();
    let (got, elapsed) = tokio::task::spawn_blocking(move || {
        let client = client_for(&endpoint);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });
        let start = Instant::now();
        let got = client.lookup("http://example.com/a", &cancel);
        (got, start.elapsed())
    })
    .await
    .expect("blocking task");

    assert!(matches!(got, Err(LookupError::Cancelled { .. })));
    assert!(elapsed < Duration::from_secs(3));
}

#[tokio::test]
async fn remote_source_is_fetched_as_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/post.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string("see http://example.com/a\n"))
        .mount(&server)
        .await;

    let endpoint = cdx_endpoint(&server);
    let source = Source::parse(&format!("{}/post.md", server.uri()));
    let body = tokio::task::spawn_blocking(move || source.read(&client_for(&endpoint)))
        .await
        .expect("blocking task")
        .expect("source reads");

    assert_eq!(body, "see http://example.com/a\n");
}
