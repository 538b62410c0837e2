//! Coze agent client (v3 streaming chat and bot metadata)
//!
//! The bearer token is only ever sent to the configured agent base URL.

use super::streaming::{SseDecoder, SseFrame};
use super::{AgentClient, ChatError, ChatEvent, ChatReply, ChatUsage, TurnFold};
use crate::config::ChatConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Abort when the stream is silent for this long
const STREAM_CHUNK_TIMEOUT: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UNKNOWN_ERROR_CODE: i64 = -1;

const EVENT_MESSAGE_DELTA: &str = "conversation.message.delta";
const EVENT_CHAT_COMPLETED: &str = "conversation.chat.completed";
const EVENT_CHAT_FAILED: &str = "conversation.chat.failed";
const EVENT_ERROR: &str = "error";
const EVENT_DONE: &str = "done";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    bot_id: &'a str,
    user_id: &'a str,
    stream: bool,
    auto_save_history: bool,
    additional_messages: Vec<AdditionalMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AdditionalMessage<'a> {
    role: &'a str,
    content: &'a str,
    content_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompleted {
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatFailed {
    #[serde(default)]
    last_error: Option<ApiStatus>,
}

/// `{code, msg}` envelope used by every endpoint
#[derive(Debug, Deserialize, Default)]
struct ApiStatus {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// What a single SSE frame means for the turn
#[derive(Debug, PartialEq)]
pub(crate) enum FrameOutcome {
    Event(ChatEvent),
    Done,
    Ignore,
}

/// Map an SSE frame to a chat event; unknown event names are ignored
pub(crate) fn decode_frame(frame: &SseFrame) -> FrameOutcome {
    let parse_err = |e: serde_json::Error| {
        tracing::debug!("Skipping undecodable agent frame: {}", e);
        FrameOutcome::Ignore
    };

    match frame.event.as_deref() {
        Some(EVENT_MESSAGE_DELTA) => match serde_json::from_str::<MessageDelta>(&frame.data) {
            Ok(MessageDelta {
                content: Some(content),
            }) if !content.is_empty() => FrameOutcome::Event(ChatEvent::ContentFragment(content)),
            Ok(_) => FrameOutcome::Ignore,
            Err(e) => parse_err(e),
        },
        Some(EVENT_CHAT_COMPLETED) => match serde_json::from_str::<ChatCompleted>(&frame.data) {
            Ok(completed) => FrameOutcome::Event(ChatEvent::TurnCompleted(
                completed.usage.unwrap_or_default(),
            )),
            Err(e) => parse_err(e),
        },
        Some(EVENT_CHAT_FAILED) => {
            let status = serde_json::from_str::<ChatFailed>(&frame.data)
                .ok()
                .and_then(|f| f.last_error);
            FrameOutcome::Event(failure(status, &frame.data))
        }
        Some(EVENT_ERROR) => {
            let status = serde_json::from_str::<ApiStatus>(&frame.data).ok();
            FrameOutcome::Event(failure(status, &frame.data))
        }
        Some(EVENT_DONE) => FrameOutcome::Done,
        _ => FrameOutcome::Ignore,
    }
}

/// Failure event from a parsed `{code, msg}`, or the raw payload when it does not parse
fn failure(status: Option<ApiStatus>, raw: &str) -> ChatEvent {
    match status {
        Some(status) => ChatEvent::Failed {
            code: status.code,
            message: status.msg,
        },
        None => ChatEvent::Failed {
            code: UNKNOWN_ERROR_CODE,
            message: raw.to_string(),
        },
    }
}

pub struct CozeClient {
    client: reqwest::Client,
    stream_timeout: Duration,
    base_url: String,
    api_token: String,
    bot_id: String,
    user_id: String,
}

impl CozeClient {
    pub fn new(config: &ChatConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ChatError::Other(anyhow::anyhow!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &ChatConfig) -> Self {
        Self {
            client,
            stream_timeout: STREAM_CHUNK_TIMEOUT,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            bot_id: config.bot_id.clone(),
            user_id: config.user_id.clone(),
        }
    }

    /// Give up when the agent sends nothing for `timeout`
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    fn stall_error(&self) -> ChatError {
        ChatError::Network(format!(
            "Stream timeout - no data from agent for {:?}",
            self.stream_timeout
        ))
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value, ChatError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .bearer_auth(&self.api_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(ChatError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChatError::from_http_status(status, error_text));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(ChatError::from_network_error)
    }

    /// Whether the token is accepted by the bot listing endpoint
    pub async fn check_token(&self) -> Result<bool, ChatError> {
        let body = self.get_json("/v1/bots", &[]).await?;
        Ok(body.get("code").and_then(|c| c.as_i64()) == Some(0))
    }

    /// Basic metadata of the configured bot
    pub async fn bot_info(&self) -> Result<serde_json::Value, ChatError> {
        self.get_json("/v1/bot/get", &[("bot_id", self.bot_id.as_str())])
            .await
    }

    /// Published configuration of the configured bot, including shortcut commands
    pub async fn online_info(&self) -> Result<serde_json::Value, ChatError> {
        self.get_json("/v1/bot/get_online_info", &[("bot_id", self.bot_id.as_str())])
            .await
    }
}

/// `(id, name)` of each shortcut command in an online-info payload
pub fn shortcuts(online_info: &serde_json::Value) -> Vec<(String, String)> {
    let field = |v: &serde_json::Value, key: &str| match v.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    online_info
        .pointer("/data/shortcuts")
        .and_then(|s| s.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| (field(item, "id"), field(item, "name")))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl AgentClient for CozeClient {
    fn name(&self) -> &str {
        "coze"
    }

    async fn stream_chat(
        &self,
        message: &str,
        callback: &mut (dyn for<'e> FnMut(&'e ChatEvent) + Send),
    ) -> Result<ChatReply, ChatError> {
        use futures::StreamExt;
        use tokio::time::timeout;

        let request = ChatRequest {
            bot_id: &self.bot_id,
            user_id: &self.user_id,
            stream: true,
            auto_save_history: true,
            additional_messages: vec![AdditionalMessage {
                role: "user",
                content: message,
                content_type: "text",
            }],
        };

        let send = self
            .client
            .post(format!("{}/v3/chat", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&request)
            .send();
        let response = match timeout(self.stream_timeout, send).await {
            Ok(result) => result.map_err(ChatError::from_network_error)?,
            Err(_) => return Err(self.stall_error()),
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChatError::from_http_status(status, error_text));
        }

        // A plain JSON body instead of an event stream carries a business error
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            let status: ApiStatus = response
                .json()
                .await
                .map_err(ChatError::from_network_error)?;
            return Err(ChatError::Agent {
                code: status.code,
                message: status.msg,
            });
        }

        let mut fold = TurnFold::new();
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        let mut handle = |frame: SseFrame, fold: &mut TurnFold| -> Result<bool, ChatError> {
            match decode_frame(&frame) {
                FrameOutcome::Event(event) => {
                    fold.process(&event);
                    callback(&event);
                    if let ChatEvent::Failed { code, message } = event {
                        return Err(ChatError::Agent { code, message });
                    }
                    Ok(false)
                }
                FrameOutcome::Done => Ok(true),
                FrameOutcome::Ignore => Ok(false),
            }
        };

        loop {
            let chunk = match timeout(self.stream_timeout, stream.next()).await {
                Ok(Some(chunk)) => chunk.map_err(ChatError::from_network_error)?,
                Ok(None) => break,
                Err(_) => return Err(self.stall_error()),
            };

            for frame in decoder.push(&chunk) {
                if handle(frame, &mut fold)? {
                    return Ok(fold.build());
                }
            }
        }

        for frame in decoder.finish() {
            if handle(frame, &mut fold)? {
                break;
            }
        }

        let reply = fold.build();
        if !reply.is_complete() {
            tracing::warn!("Agent stream ended without a completion event");
        }
        Ok(reply)
    }
}
