//! End-to-end tests for the relay pipeline against mock backends.

use std::time::Duration;

use relay_proxy::config::{ProxyConfig, RewriteRuleConfig, UpstreamSource};

mod common;

use common::{start_mock_backend, start_proxy, MockResponse};

const MARKER: &str = "x-custom-response-header";
const SNIPPET: &str = "<script>alert('Modified Message');</script>";

fn inject_html_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.rewrite.rule = RewriteRuleConfig::InjectHtml {
        snippet: SNIPPET.to_string(),
    };
    config
}

#[tokio::test]
async fn test_html_response_gets_snippet_and_marker() {
    let backend = start_mock_backend(MockResponse::new("text/html", "<p>hi</p>")).await;
    let proxy = start_proxy(inject_html_config()).await;

    let res = reqwest::get(proxy.url(&format!("/page?target={}", backend.addr)))
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()[MARKER], "Modified-Response");
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        res.headers()["access-control-allow-methods"],
        "GET, PUT, PATCH, POST, DELETE"
    );
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), format!("<p>hi</p>{}", SNIPPET));
    assert_eq!(backend.calls(), 1);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_snippet_follows_every_chunk() {
    let backend =
        start_mock_backend(MockResponse::chunked("text/html; charset=utf-8", vec!["<a>", "<b>"])).await;
    let proxy = start_proxy(inject_html_config()).await;

    let body = reqwest::get(proxy.url(&format!("/?target={}", backend.addr)))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(body, format!("<a>{SNIPPET}<b>{SNIPPET}"));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_plain_text_substitution() {
    let backend = start_mock_backend(MockResponse::new("text/plain", "Hello world")).await;
    let proxy = start_proxy(ProxyConfig::default()).await;

    let res = reqwest::get(proxy.url(&format!("/greet?target={}", backend.addr)))
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()[MARKER], "Modified-Response");
    assert_eq!(res.text().await.unwrap(), "Modified Hello world");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_json_passes_through_unchanged() {
    let json = r#"{"message":"Hello"}"#;
    let backend = start_mock_backend(MockResponse::new("application/json", json)).await;
    let proxy = start_proxy(ProxyConfig::default()).await;

    let res = reqwest::get(proxy.url(&format!("/api?target={}", backend.addr)))
        .await
        .unwrap();

    assert_eq!(res.headers()[MARKER], "Modified-Response");
    assert_eq!(res.headers()["content-length"], json.len().to_string().as_str());
    assert_eq!(res.text().await.unwrap(), json);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_request_is_forwarded_intact() {
    let backend = start_mock_backend(MockResponse::new("application/json", "{}")).await;
    let proxy = start_proxy(ProxyConfig::default()).await;

    let client = reqwest::Client::new();
    let res = client
        .post(proxy.url(&format!("/v1/items?target={}&page=2", backend.addr)))
        .header("x-custom", "kept")
        .body("payload-body")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let seen = backend.last_request().unwrap();
    let first_line = seen.lines().next().unwrap();
    assert_eq!(
        first_line,
        format!("POST /v1/items?target={}&page=2 HTTP/1.1", backend.addr)
    );
    let lower = seen.to_ascii_lowercase();
    assert!(lower.contains("x-custom: kept"));
    assert!(lower.contains("x-forwarded-for: 127.0.0.1"));
    assert!(lower.contains(&format!("host: {}", backend.addr)));
    assert!(seen.ends_with("payload-body"));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_missing_target_never_reaches_upstream() {
    let backend = start_mock_backend(MockResponse::new("text/plain", "Hello")).await;
    let proxy = start_proxy(ProxyConfig::default()).await;

    let res = reqwest::get(proxy.url("/anything")).await.unwrap();
    assert_eq!(res.status(), 400);
    assert_eq!(res.text().await.unwrap(), "Target query parameter is required");

    let res = reqwest::get(proxy.url("/anything?target=")).await.unwrap();
    assert_eq!(res.status(), 400);

    assert_eq!(backend.calls(), 0);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_eleventh_request_in_window_is_rejected() {
    let backend = start_mock_backend(MockResponse::new("text/plain", "ok")).await;
    let proxy = start_proxy(ProxyConfig::default()).await;
    let url = proxy.url(&format!("/?target={}", backend.addr));

    for i in 1..=10 {
        let res = reqwest::get(&url).await.unwrap();
        assert_eq!(res.status(), 200, "request {} should be admitted", i);
    }

    let res = reqwest::get(&url).await.unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.text().await.unwrap(), "Rate Limit Exceeded");
    assert_eq!(backend.calls(), 10);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let proxy = start_proxy(ProxyConfig::default()).await;

    let res = reqwest::get(proxy.url("/?target=127.0.0.1:1")).await.unwrap();

    assert_eq!(res.status(), 502);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert!(!res.headers().contains_key(MARKER));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_cors_headers_are_not_duplicated() {
    let backend = start_mock_backend(MockResponse::new("text/plain", "ok")).await;
    let proxy = start_proxy(ProxyConfig::default()).await;

    let client = reqwest::Client::new();
    let res = client
        .get(proxy.url(&format!("/?target={}", backend.addr)))
        .header("access-control-request-headers", "x-token")
        .send()
        .await
        .unwrap();

    let headers = res.headers();
    assert_eq!(headers.get_all("access-control-allow-origin").iter().count(), 1);
    assert_eq!(headers.get_all("access-control-allow-methods").iter().count(), 1);
    assert_eq!(headers.get_all("access-control-allow-headers").iter().count(), 1);
    assert_eq!(headers["access-control-allow-headers"], "x-token");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_header_source_reads_target_url() {
    let backend = start_mock_backend(MockResponse::new("text/plain", "Hello")).await;
    let mut config = ProxyConfig::default();
    config.upstream.source = UpstreamSource::Header {
        name: "Target-URL".to_string(),
    };
    let proxy = start_proxy(config).await;
    let client = reqwest::Client::new();

    let res = client
        .get(proxy.url("/"))
        .header("Target-URL", backend.addr.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "Modified Hello");

    // The query parameter is not consulted in header mode.
    let res = client
        .get(proxy.url(&format!("/?target={}", backend.addr)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert_eq!(res.text().await.unwrap(), "Target-URL header is required");

    assert_eq!(backend.calls(), 1);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_cors_headers_repeat_across_identical_requests() {
    let backend = start_mock_backend(MockResponse::new("text/plain", "ok")).await;
    let proxy = start_proxy(ProxyConfig::default()).await;
    let client = reqwest::Client::new();
    let url = proxy.url(&format!("/items?target={}", backend.addr));

    let mut replies = Vec::new();
    for _ in 0..2 {
        let res = client
            .put(&url)
            .header("access-control-request-headers", "x-token, content-type")
            .body("same")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);

        let cors: Vec<String> = [
            "access-control-allow-origin",
            "access-control-allow-methods",
            "access-control-allow-headers",
        ]
        .iter()
        .map(|name| res.headers()[*name].to_str().unwrap().to_string())
        .collect();
        replies.push(cors);
    }

    assert_eq!(replies[0], replies[1]);
    assert_eq!(
        replies[0],
        vec!["*", "GET, PUT, PATCH, POST, DELETE", "x-token, content-type"]
    );

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let proxy = start_proxy(ProxyConfig::default()).await;
    let res = reqwest::get(proxy.url("/")).await.unwrap();
    assert_eq!(res.status(), 400);

    proxy.shutdown.trigger();

    let url = proxy.url("/");
    tokio::time::timeout(Duration::from_secs(5), proxy.server)
        .await
        .expect("server did not stop after shutdown")
        .unwrap();
    assert!(reqwest::get(url).await.is_err());
}
