//! Streaming chat against a local agent double

mod common;

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use geochat_cli::chat::{AgentClient, ChatError, ChatEvent, ChatUsage, CozeClient};
use geochat_cli::config::ChatConfig;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const COMPLETE_STREAM: &str = "event:conversation.chat.created\n\
data:{\"id\":\"7401\",\"status\":\"created\"}\n\
\n\
event:conversation.message.delta\n\
data:{\"role\":\"assistant\",\"type\":\"answer\",\"content\":\"湘潭\"}\n\
\n\
event:conversation.message.delta\n\
data:{\"role\":\"assistant\",\"type\":\"answer\",\"content\":\"有很多\"}\n\
\n\
event:conversation.message.delta\n\
data:{\"role\":\"assistant\",\"type\":\"answer\",\"content\":\"好吃的\"}\n\
\n\
event:conversation.message.completed\n\
data:{\"role\":\"assistant\",\"type\":\"answer\",\"content\":\"湘潭有很多好吃的\"}\n\
\n\
event:conversation.chat.completed\n\
data:{\"id\":\"7401\",\"usage\":{\"token_count\":42,\"output_count\":30,\"input_count\":12}}\n\
\n\
event:done\n\
data:\"[DONE]\"\n\
\n";

fn client_for(base_url: &str) -> CozeClient {
    let config = ChatConfig {
        base_url: base_url.to_string(),
        api_token: "pat_test".to_string(),
        bot_id: "7400000000000000000".to_string(),
        ..Default::default()
    };
    CozeClient::with_client(reqwest::Client::new(), &config)
}

fn event_stream(body: impl Into<Body>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/event-stream")], body.into())
}

async fn collect(client: &CozeClient, message: &str) -> (Result<String, ChatError>, Vec<ChatEvent>) {
    let mut events = Vec::new();
    let result = client
        .stream_chat(message, &mut |event: &ChatEvent| events.push(event.clone()))
        .await
        .map(|reply| reply.text);
    (result, events)
}

#[tokio::test]
async fn test_fragments_concatenate_in_order() {
    let app = Router::new().route("/v3/chat", post(|| async { event_stream(COMPLETE_STREAM) }));
    let base = common::spawn(app).await;
    let client = client_for(&base);

    let mut events = Vec::new();
    let reply = client
        .stream_chat("附近有什么好吃的", &mut |event: &ChatEvent| {
            events.push(event.clone())
        })
        .await
        .unwrap();

    assert_eq!(reply.text, "湘潭有很多好吃的");
    assert_eq!(
        reply.usage,
        Some(ChatUsage {
            token_count: 42,
            output_count: 30,
            input_count: 12,
        })
    );
    assert!(reply.is_complete());
    assert_eq!(
        events,
        vec![
            ChatEvent::ContentFragment("湘潭".to_string()),
            ChatEvent::ContentFragment("有很多".to_string()),
            ChatEvent::ContentFragment("好吃的".to_string()),
            ChatEvent::TurnCompleted(reply.usage.clone().unwrap()),
        ]
    );
}

#[tokio::test]
async fn test_request_shape_and_bearer_token() {
    let seen: Arc<Mutex<Option<(String, serde_json::Value)>>> = Arc::new(Mutex::new(None));
    let recorder = seen.clone();
    let app = Router::new().route(
        "/v3/chat",
        post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
            let recorder = recorder.clone();
            async move {
                let auth = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                *recorder.lock().unwrap() = Some((auth, body));
                event_stream(COMPLETE_STREAM)
            }
        }),
    );
    let base = common::spawn(app).await;

    let (result, _) = collect(&client_for(&base), "你好").await;
    result.unwrap();

    let (auth, body) = seen.lock().unwrap().clone().unwrap();
    assert_eq!(auth, "Bearer pat_test");
    assert_eq!(
        body,
        serde_json::json!({
            "bot_id": "7400000000000000000",
            "user_id": "123",
            "stream": true,
            "auto_save_history": true,
            "additional_messages": [
                {"role": "user", "content": "你好", "content_type": "text"}
            ]
        })
    );
}

#[tokio::test]
async fn test_frames_split_across_chunks() {
    let app = Router::new().route(
        "/v3/chat",
        post(|| async {
            // Split inside a frame, inside a line, and inside a multi-byte character
            let bytes = COMPLETE_STREAM.as_bytes().to_vec();
            let cut_a = COMPLETE_STREAM.find("有很多").unwrap() + 1;
            let cut_b = COMPLETE_STREAM.find("usage").unwrap();
            let chunks = vec![
                Ok::<_, std::io::Error>(bytes[..cut_a].to_vec()),
                Ok(bytes[cut_a..cut_b].to_vec()),
                Ok(bytes[cut_b..].to_vec()),
            ];
            event_stream(Body::from_stream(futures::stream::iter(chunks)))
        }),
    );
    let base = common::spawn(app).await;

    let (result, events) = collect(&client_for(&base), "hi").await;
    assert_eq!(result.unwrap(), "湘潭有很多好吃的");
    assert_eq!(events.len(), 4);
}

#[tokio::test]
async fn test_json_body_is_agent_error() {
    let app = Router::new().route(
        "/v3/chat",
        post(|| async {
            Json(serde_json::json!({"code": 4101, "msg": "The token you entered is incorrect"}))
        }),
    );
    let base = common::spawn(app).await;

    let (result, events) = collect(&client_for(&base), "hi").await;
    match result {
        Err(ChatError::Agent { code, message }) => {
            assert_eq!(code, 4101);
            assert_eq!(message, "The token you entered is incorrect");
        }
        other => panic!("expected agent error, got {:?}", other),
    }
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_unauthorized_status() {
    let app = Router::new().route(
        "/v3/chat",
        post(|| async { (StatusCode::UNAUTHORIZED, "token expired") }),
    );
    let base = common::spawn(app).await;

    let (result, _) = collect(&client_for(&base), "hi").await;
    let err = result.unwrap_err();
    assert!(err.needs_new_token());
}

#[tokio::test]
async fn test_failed_turn_stops_stream() {
    let stream = "event:conversation.message.delta\n\
data:{\"content\":\"部分\"}\n\
\n\
event:conversation.chat.failed\n\
data:{\"last_error\":{\"code\":5000,\"msg\":\"bot offline\"}}\n\
\n\
event:conversation.message.delta\n\
data:{\"content\":\"never\"}\n\
\n";
    let app = Router::new().route("/v3/chat", post(move || async move { event_stream(stream) }));
    let base = common::spawn(app).await;

    let (result, events) = collect(&client_for(&base), "hi").await;
    match result {
        Err(ChatError::Agent { code, message }) => {
            assert_eq!(code, 5000);
            assert_eq!(message, "bot offline");
        }
        other => panic!("expected agent error, got {:?}", other),
    }
    assert_eq!(
        events,
        vec![
            ChatEvent::ContentFragment("部分".to_string()),
            ChatEvent::Failed {
                code: 5000,
                message: "bot offline".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_stalled_response_headers_time_out() {
    let app = Router::new().route(
        "/v3/chat",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            event_stream(COMPLETE_STREAM)
        }),
    );
    let base = common::spawn(app).await;
    let client = client_for(&base).with_stream_timeout(Duration::from_millis(200));

    let started = Instant::now();
    let (result, events) = collect(&client, "hi").await;

    match result {
        Err(ChatError::Network(message)) => assert!(message.contains("Stream timeout")),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(events.is_empty());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_stalled_body_times_out() {
    let app = Router::new().route(
        "/v3/chat",
        post(|| async {
            let first = futures::stream::once(async {
                Ok::<_, std::io::Error>(
                    "event:conversation.message.delta\ndata:{\"content\":\"湘潭\"}\n\n".to_string(),
                )
            });
            let stalled = futures::stream::once(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, std::io::Error>(String::new())
            });
            event_stream(Body::from_stream(first.chain(stalled)))
        }),
    );
    let base = common::spawn(app).await;
    let client = client_for(&base).with_stream_timeout(Duration::from_millis(200));

    let (result, events) = collect(&client, "hi").await;
    assert!(matches!(result, Err(ChatError::Network(_))));
    assert_eq!(events, vec![ChatEvent::ContentFragment("湘潭".to_string())]);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let (result, _) = collect(&client_for(common::UNREACHABLE), "hi").await;
    assert!(matches!(result, Err(ChatError::Network(_))));
}

#[tokio::test]
async fn test_bot_metadata_endpoints() {
    let app = Router::new()
        .route(
            "/v1/bots",
            get(|| async { Json(serde_json::json!({"code": 0, "data": {"items": []}})) }),
        )
        .route(
            "/v1/bot/get_online_info",
            get(|| async {
                Json(serde_json::json!({
                    "code": 0,
                    "data": {
                        "bot_id": "7400000000000000000",
                        "shortcuts": [
                            {"id": "sc-1", "name": "查天气"},
                            {"id": "sc-2", "name": "找美食"}
                        ]
                    }
                }))
            }),
        );
    let base = common::spawn(app).await;
    let client = client_for(&base);

    assert!(client.check_token().await.unwrap());
    let info = client.online_info().await.unwrap();
    assert_eq!(
        geochat_cli::chat::shortcuts(&info),
        vec![
            ("sc-1".to_string(), "查天气".to_string()),
            ("sc-2".to_string(), "找美食".to_string()),
        ]
    );
}
