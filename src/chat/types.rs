//! Shared types for agent chat

use serde::{Deserialize, Serialize};

/// Token accounting reported when a turn completes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub token_count: u64,
    #[serde(default)]
    pub output_count: u64,
    #[serde(default)]
    pub input_count: u64,
}

// ============================================================================
// Streaming Types
// ============================================================================

/// Events emitted while a turn streams in
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Incremental answer text
    ContentFragment(String),
    /// The agent finished the turn
    TurnCompleted(ChatUsage),
    /// The agent reported a failed turn
    Failed { code: i64, message: String },
}

/// Result of one streamed turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub text: String,
    /// `None` when the stream ended without a completion event
    pub usage: Option<ChatUsage>,
}

impl ChatReply {
    pub fn is_complete(&self) -> bool {
        self.usage.is_some()
    }
}

/// Single-pass fold over a turn's events
#[derive(Debug, Default)]
pub struct TurnFold {
    text: String,
    usage: Option<ChatUsage>,
}

impl TurnFold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, event: &ChatEvent) {
        match event {
            ChatEvent::ContentFragment(text) => self.text.push_str(text),
            ChatEvent::TurnCompleted(usage) => self.usage = Some(usage.clone()),
            ChatEvent::Failed { .. } => {}
        }
    }

    pub fn build(self) -> ChatReply {
        ChatReply {
            text: self.text,
            usage: self.usage,
        }
    }
}
