// tests/provider_test.rs — D-ID client against a mock HTTP server

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use talkstream::infra::errors::AgentError;
use talkstream::provider::did::DidClient;
use talkstream::provider::{CreateStreamRequest, StreamingApi, TalkScript};
use talkstream::session::transport::{IceCandidate, SdpType, SessionDescription};

// base64("key:")
const AUTH: &str = "Basic a2V5Og==";

async fn client() -> (MockServer, DidClient) {
    let server = MockServer::start().await;
    let client = DidClient::with_base_url("key", server.uri());
    (server, client)
}

#[tokio::test]
async fn test_create_stream() {
    let (server, client) = client().await;
    Mock::given(method("POST"))
        .and(path("/talks/streams"))
        .and(header("Authorization", AUTH))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({
            "source_url": "https://img.example/avatar.jpg",
            "stream_warmup": true,
            "config": { "video_quality": "hd" },
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "strm_abc",
            "offer": { "type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n" },
            "ice_servers": [
                { "urls": ["stun:stun.l.google.com:19302"] },
                { "urls": "turn:turn.example:3478", "username": "u", "credential": "p" },
            ],
            "session_id": "sess_xyz",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stream = client
        .create_stream(&CreateStreamRequest::new("https://img.example/avatar.jpg", "hd"))
        .await
        .unwrap();

    assert_eq!(stream.id, "strm_abc");
    assert_eq!(stream.session_id, "sess_xyz");
    assert_eq!(stream.offer.kind, SdpType::Offer);
    assert_eq!(stream.ice_servers.len(), 2);
    assert_eq!(stream.ice_servers[1].urls, vec!["turn:turn.example:3478".to_string()]);
    assert_eq!(stream.ice_servers[1].username.as_deref(), Some("u"));
}

#[tokio::test]
async fn test_json_requests_carry_one_content_type() {
    let (server, client) = client().await;
    Mock::given(method("POST"))
        .and(path("/talks/streams"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "strm_abc",
            "offer": { "type": "offer", "sdp": "v=0" },
            "ice_servers": [],
            "session_id": "sess_xyz",
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/talks/streams/strm_abc"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    client
        .create_stream(&CreateStreamRequest::new("https://img", "hd"))
        .await
        .unwrap();
    client.delete_stream("strm_abc", "sess_xyz").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        let values: Vec<_> = request.headers.get_all("content-type").iter().collect();
        assert_eq!(values.len(), 1, "{} {}: {:?}", request.method, request.url, values);
        assert_eq!(values[0], "application/json");
    }
}

#[tokio::test]
async fn test_send_sdp_answer() {
    let (server, client) = client().await;
    Mock::given(method("POST"))
        .and(path("/talks/streams/strm_abc/sdp"))
        .and(header("Authorization", AUTH))
        .and(body_json(json!({
            "answer": { "type": "answer", "sdp": "v=0 answer" },
            "session_id": "sess_xyz",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .expect(1)
        .mount(&server)
        .await;

    client
        .send_sdp_answer("strm_abc", "sess_xyz", &SessionDescription::answer("v=0 answer"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_send_ice_candidate() {
    let (server, client) = client().await;
    Mock::given(method("POST"))
        .and(path("/talks/streams/strm_abc/ice"))
        .and(body_json(json!({
            "candidate": "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0,
            "session_id": "sess_xyz",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let candidate = IceCandidate {
        candidate: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".into(),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
    };
    client
        .send_ice_candidate("strm_abc", "sess_xyz", &candidate)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_talk() {
    let (server, client) = client().await;
    Mock::given(method("POST"))
        .and(path("/talks/streams/strm_abc"))
        .and(header("Authorization", AUTH))
        .and(body_json(json!({
            "script": {
                "type": "text",
                "input": "Hello there",
                "provider": { "type": "microsoft", "voice_id": "en-US-JennyNeural" },
            },
            "config": { "fluent": true, "stitch": true },
            "driver_url": "bank://lively/",
            "session_id": "sess_xyz",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "started" })))
        .expect(1)
        .mount(&server)
        .await;

    let script = TalkScript {
        input: "Hello there".into(),
        voice_id: "en-US-JennyNeural".into(),
        driver_url: "bank://lively/".into(),
    };
    client.talk("strm_abc", "sess_xyz", &script).await.unwrap();
}

#[tokio::test]
async fn test_delete_stream() {
    let (server, client) = client().await;
    Mock::given(method("DELETE"))
        .and(path("/talks/streams/strm_abc"))
        .and(body_json(json!({ "session_id": "sess_xyz" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.delete_stream("strm_abc", "sess_xyz").await.unwrap();
}

#[tokio::test]
async fn test_credits() {
    let (server, client) = client().await;
    Mock::given(method("GET"))
        .and(path("/credits"))
        .and(header("Authorization", AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "remaining": 42,
            "total": 100,
            "credits": [],
        })))
        .mount(&server)
        .await;

    let credits = client.credits().await.unwrap();
    assert_eq!(credits.remaining, 42);
    assert_eq!(credits.total, 100);
    assert!(credits.extra.contains_key("credits"));
}

#[tokio::test]
async fn test_error_status_surfaces() {
    let (server, client) = client().await;
    Mock::given(method("POST"))
        .and(path("/talks/streams/strm_abc"))
        .respond_with(ResponseTemplate::new(402).set_body_string("InsufficientCreditsError"))
        .mount(&server)
        .await;

    let script = TalkScript {
        input: "hi".into(),
        voice_id: "v".into(),
        driver_url: "bank://lively/".into(),
    };
    let err = client.talk("strm_abc", "sess", &script).await.unwrap_err();
    assert_eq!(err.status(), Some(402));
    assert!(err.to_string().contains("InsufficientCreditsError"));
}

#[tokio::test]
async fn test_missing_key_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = DidClient::with_base_url("", server.uri());
    let err = client
        .create_stream(&CreateStreamRequest::new("https://img", "hd"))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::MissingCredential { .. }));
}
