// tests/perplexity_http.rs
use std::time::Duration;

use serde_json::json;
use sector_digest::completion::{
    CompletionRequest, CompletionService, Message, PerplexityClient, ResponseFormat, Stage,
};
use sector_digest::ServiceError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(timeout: Duration) -> CompletionRequest {
    CompletionRequest {
        stage: Stage::Articles,
        model: "sonar-pro".into(),
        temperature: 0.1,
        messages: vec![Message::system("sys"), Message::user("find articles")],
        response_format: None,
        timeout,
    }
}

fn client(server: &MockServer) -> PerplexityClient {
    PerplexityClient::new(format!("{}/chat/completions", server.uri()), "pplx-test").unwrap()
}

#[tokio::test]
async fn parses_content_and_search_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer pplx-test"))
        .and(body_partial_json(json!({
            "model": "sonar-pro",
            "messages": [{"role": "system", "content": "sys"}, {"role": "user", "content": "find articles"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "A | https://reuters.com/a"}}],
            "search_results": [
                {"title": "A", "url": "https://reuters.com/a", "date": "2025-01-01"},
                {"title": "B", "url": "https://nature.com/b"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let out = client(&server).complete(&request(Duration::from_secs(5))).await.unwrap();
    assert_eq!(out.content, "A | https://reuters.com/a");
    assert_eq!(out.search_results.len(), 2);
    assert_eq!(out.search_results[0].date.as_deref(), Some("2025-01-01"));
    assert_eq!(out.search_results[1].title, "B");
    assert!(!out.structured);
}

#[tokio::test]
async fn bare_citations_become_search_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "text"}}],
            "citations": ["https://a.example/1", "https://b.example/2"]
        })))
        .mount(&server)
        .await;

    let out = client(&server).complete(&request(Duration::from_secs(5))).await.unwrap();
    let urls: Vec<&str> = out.search_results.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.example/1", "https://b.example/2"]);
}

#[tokio::test]
async fn schema_is_sent_when_requested() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "response_format": {"type": "json_schema", "json_schema": {"schema": {"type": "object"}}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "{\"topics\": []}"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut req = request(Duration::from_secs(5));
    req.response_format = Some(ResponseFormat {
        schema: json!({"type": "object"}),
    });
    let out = client(&server).complete(&req).await.unwrap();
    assert!(out.structured);
}

#[tokio::test]
async fn non_success_status_is_a_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let err = client(&server)
        .complete(&request(Duration::from_secs(5)))
        .await
        .unwrap_err();
    match err {
        ServiceError::Status { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({"choices": []})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .complete(&request(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn missing_choices_or_key_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = client(&server)
        .complete(&request(Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Malformed(_)));

    let keyless = PerplexityClient::new(server.uri(), "").unwrap();
    let err = keyless.complete(&request(Duration::from_secs(5))).await.unwrap_err();
    assert!(matches!(err, ServiceError::MissingApiKey));
}
