//! Ollama client against a mock NDJSON server

use futures::StreamExt;
use llmbridge_core::http::HttpClient;
use llmbridge_core::providers::{OllamaProvider, Provider, ProviderError};
use llmbridge_core::{ChatRequest, GenerationRequest, Message};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> OllamaProvider {
    OllamaProvider::new(
        &server.uri(),
        "qwen2.5-coder:7b",
        HttpClient::new().expect("Failed to create client"),
    )
}

/// URL of a loopback port nothing listens on
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

fn ping() -> ChatRequest {
    ChatRequest::new(vec![Message::user("ping")], 16, 0.0)
}

async fn collect(provider: &OllamaProvider, request: &ChatRequest) -> Vec<String> {
    let mut stream = provider.chat_stream(request).await.expect("stream should open");
    let mut deltas = Vec::new();
    while let Some(delta) = stream.next().await {
        deltas.push(delta.expect("no stream error").content);
    }
    deltas
}

#[tokio::test]
async fn test_chat_stream_ping_pong() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "qwen2.5-coder:7b",
            "stream": true,
            "messages": [{"role": "user", "content": "ping"}],
            "options": {"num_predict": 16}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("{\"message\":{\"content\":\"pong\"}}\n{\"done\":true}\n", "application/x-ndjson"),
        )
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(collect(&provider(&server), &ping()).await, vec!["pong"]);
}

#[tokio::test]
async fn test_malformed_line_is_skipped() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"message\":{\"content\":\"a\"}}\n",
        "{\"message\":{\"content\":\n",
        "{\"message\":{\"content\":\"b\"}}\n",
        "{\"done\":true}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    assert_eq!(collect(&provider(&server), &ping()).await, vec!["a", "b"]);
}

#[tokio::test]
async fn test_lines_after_done_are_ignored() {
    let server = MockServer::start().await;
    let body = "{\"message\":{\"content\":\"x\"}}\n{\"done\":true}\n{\"message\":{\"content\":\"y\"}}\n";
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    assert_eq!(collect(&provider(&server), &ping()).await, vec!["x"]);
}

#[tokio::test]
async fn test_generate_stream_uses_response_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"prompt": "System: terse\n\nhaiku", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "{\"response\":\"old \"}\n{\"response\":\"pond\"}\n{\"response\":\"\",\"done\":true}\n",
            "application/x-ndjson",
        ))
        .mount(&server)
        .await;

    let request = GenerationRequest::new("haiku", 32, 0.7).with_system("terse");
    let mut stream = provider(&server).generate_stream(&request).await.unwrap();
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        text.push_str(&delta.unwrap().content);
    }
    assert_eq!(text, "old pond");
}

#[tokio::test]
async fn test_in_band_error_ends_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "{\"message\":{\"content\":\"par\"}}\n{\"error\":\"model crashed\"}\n",
            "application/x-ndjson",
        ))
        .mount(&server)
        .await;

    let mut stream = provider(&server).chat_stream(&ping()).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap().content, "par");
    match stream.next().await {
        Some(Err(ProviderError::BackendProtocol(message))) => assert!(message.contains("model crashed")),
        other => panic!("Expected BackendProtocol, got {:?}", other),
    }
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_non_streaming_chat_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "pong"},
            "done": true,
            "prompt_eval_count": 9,
            "eval_count": 1
        })))
        .mount(&server)
        .await;

    let result = provider(&server).chat(&ping()).await.unwrap();
    assert_eq!(result.text, "pong");
    assert_eq!(result.usage.unwrap().completion, Some(1));
}

#[tokio::test]
async fn test_missing_completion_field_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
        .mount(&server)
        .await;

    let result = provider(&server)
        .generate(&GenerationRequest::new("x", 8, 0.0))
        .await;
    assert!(matches!(result, Err(ProviderError::BackendProtocol(_))));
}

#[tokio::test]
async fn test_non_2xx_maps_to_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model 'nope' not found"})),
        )
        .mount(&server)
        .await;

    match provider(&server).chat_stream(&ping()).await {
        Err(ProviderError::BackendHttp { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "model 'nope' not found");
        }
        Err(other) => panic!("Expected BackendHttp, got {:?}", other),
        Ok(_) => panic!("Expected BackendHttp, got a stream"),
    }
}

#[tokio::test]
async fn test_list_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "qwen2.5-coder:7b"}, {"name": "llama3:8b"}]
        })))
        .mount(&server)
        .await;

    let p = provider(&server);
    let models = p.list_models().await.unwrap();
    assert_eq!(
        models.into_iter().collect::<Vec<_>>(),
        vec!["llama3:8b", "qwen2.5-coder:7b"]
    );
    assert!(p.test_connection().await);
}

#[tokio::test]
async fn test_zero_models_is_empty_set() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;

    assert!(provider(&server).list_models().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_backend() {
    let p = OllamaProvider::new(&closed_port_url(), "m", HttpClient::new().unwrap());

    assert!(matches!(
        p.list_models().await,
        Err(ProviderError::BackendUnreachable(_))
    ));
    assert!(!p.test_connection().await);
}

#[tokio::test]
async fn test_remote_host_blocked_without_io() {
    let p = OllamaProvider::new("http://10.1.2.3:11434", "m", HttpClient::new().unwrap());
    assert!(matches!(
        p.chat_stream(&ping()).await,
        Err(ProviderError::NetworkBlocked(_))
    ));
}
