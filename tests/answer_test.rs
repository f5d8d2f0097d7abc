// tests/answer_test.rs — Answer sources against mock HTTP servers

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use talkstream::answer::backend::BackendChat;
use talkstream::answer::gemini::GeminiAnswers;
use talkstream::answer::openai::OpenAiAnswers;
use talkstream::answer::{self, AnswerSource};
use talkstream::infra::config::{AnswerSourceKind, Config};
use talkstream::infra::errors::AgentError;

// ---------- Backend ----------

#[tokio::test]
async fn test_backend_answer_with_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversation/chat-auth-voice"))
        .and(header("Authorization", "Bearer tok-1"))
        .and(body_json(json!({ "question": "Who are you?" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": " I am the oracle. " })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = BackendChat::new(server.uri(), Some("tok-1".into()));
    assert_eq!(chat.answer("Who are you?").await.unwrap(), "I am the oracle.");
}

#[tokio::test]
async fn test_backend_conversation_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversation/chat-auth/conv-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = BackendChat::new(server.uri(), None).with_conversation("conv-7");
    assert_eq!(chat.answer("hi").await.unwrap(), "ok");
}

#[tokio::test]
async fn test_backend_refreshes_once_on_401() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversation/chat-auth-voice"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user/refresh_token"))
        .and(header("Cookie", "refresh_token=r-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "fresh" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/conversation/chat-auth-voice"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": "hello again" })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = BackendChat::new(server.uri(), Some("stale".into())).with_refresh_token("r-1");
    assert_eq!(chat.answer("hello").await.unwrap(), "hello again");
    assert_eq!(chat.access_token().await.as_deref(), Some("fresh"));
    assert_eq!(chat.refresh_token().await.as_deref(), Some("r-1"));
}

#[tokio::test]
async fn test_backend_refresh_requires_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversation/chat-auth-voice"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    // Like the real backend: no refresh cookie, no new token.
    Mock::given(method("GET"))
        .and(path("/api/user/refresh_token"))
        .and(header("Cookie", "refresh_token=r-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "fresh" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user/refresh_token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let without = BackendChat::new(server.uri(), Some("stale".into()));
    assert_eq!(without.answer("hello").await.unwrap_err().status(), Some(401));
    assert!(without.access_token().await.is_none());

    let requests = server.received_requests().await.unwrap();
    let refresh = requests
        .iter()
        .find(|r| r.url.path() == "/api/user/refresh_token")
        .expect("refresh attempted");
    assert!(refresh.headers.get("cookie").is_none());
}

#[tokio::test]
async fn test_backend_keeps_rotated_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversation/chat-auth-voice"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user/refresh_token"))
        .and(header("Cookie", "refresh_token=r-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "refresh_token=r-2; Path=/; HttpOnly")
                .set_body_json(json!({ "access_token": "fresh" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/conversation/chat-auth-voice"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": "ok" })))
        .mount(&server)
        .await;

    let chat = BackendChat::new(server.uri(), Some("stale".into())).with_refresh_token("r-1");
    assert_eq!(chat.answer("hello").await.unwrap(), "ok");
    assert_eq!(chat.refresh_token().await.as_deref(), Some("r-2"));
}

#[tokio::test]
async fn test_backend_second_401_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversation/chat-auth-voice"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user/refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "fresh" })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = BackendChat::new(server.uri(), Some("stale".into())).with_refresh_token("r-1");
    let err = chat.answer("hello").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn test_backend_failed_refresh_clears_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversation/chat-auth-voice"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user/refresh_token"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let chat = BackendChat::new(server.uri(), Some("stale".into())).with_refresh_token("r-1");
    assert!(chat.answer("hello").await.is_err());
    assert!(chat.access_token().await.is_none());
    assert!(chat.refresh_token().await.is_none());
}

#[tokio::test]
async fn test_backend_empty_answer_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": "" })))
        .mount(&server)
        .await;

    let chat = BackendChat::new(server.uri(), None);
    assert!(matches!(
        chat.answer("hello").await,
        Err(AgentError::Provider { .. })
    ));
}

// ---------- OpenAI ----------

#[tokio::test]
async fn test_openai_chat_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [{ "role": "user", "content": "What is Rust?" }],
            "max_tokens": 100,
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "A systems language." } }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answers = OpenAiAnswers::with_base_url("sk-test", server.uri());
    assert_eq!(answers.answer("What is Rust?").await.unwrap(), "A systems language.");
}

#[tokio::test]
async fn test_openai_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit reached" },
        })))
        .mount(&server)
        .await;

    let answers = OpenAiAnswers::with_base_url("sk-test", server.uri());
    let err = answers.answer("hi").await.unwrap_err();
    assert_eq!(err.status(), Some(429));
    assert!(err.to_string().contains("Rate limit reached"));
}

// ---------- Gemini ----------

#[tokio::test]
async fn test_gemini_generate_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/models/gemini-1.5-flash:generateContent"))
        .and(query_param("key", "g-key"))
        .and(body_json(json!({
            "contents": [{ "parts": [{ "text": "Tell me a joke" }] }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Why did the crab..." }] } }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answers = GeminiAnswers::with_base_url("g-key", server.uri());
    assert_eq!(answers.answer("Tell me a joke").await.unwrap(), "Why did the crab...");
}

#[tokio::test]
async fn test_gemini_no_candidates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let answers = GeminiAnswers::with_base_url("g-key", server.uri());
    assert!(answers.answer("hi").await.is_err());
}

// ---------- Selection ----------

#[tokio::test]
async fn test_from_config_selects_source() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "from openai" } }],
        })))
        .mount(&server)
        .await;

    let config = Config {
        answer_source: AnswerSourceKind::Openai,
        openai_key: Some("sk-test".into()),
        openai_url: server.uri(),
        ..Config::default()
    };
    let source = answer::from_config(&config).unwrap();
    assert_eq!(source.name(), "openai");
    assert_eq!(source.answer("hi").await.unwrap(), "from openai");
}
