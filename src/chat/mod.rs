//! Agent chat: location annotation, streaming client and event model

mod coze;
mod error;
pub mod streaming;
mod types;

pub use coze::{shortcuts, CozeClient};
pub use error::ChatError;
pub use types::*;

use crate::location::LocationResult;
use async_trait::async_trait;

/// A conversational agent that streams its replies
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Get the agent service name
    fn name(&self) -> &str;

    /// Send one user message and stream the reply.
    ///
    /// The callback sees every event in arrival order; the returned reply is
    /// the fold of those events. A `Failed` event ends the turn with
    /// [`ChatError::Agent`] carrying the same code and message.
    async fn stream_chat(
        &self,
        message: &str,
        callback: &mut (dyn for<'e> FnMut(&'e ChatEvent) + Send),
    ) -> Result<ChatReply, ChatError>;
}

/// Append the one-line location annotation to a user message
pub fn annotate_message(text: &str, location: &LocationResult) -> String {
    format!(
        "{}\n\n[位置信息] 用户当前位置: {} {}, 经纬度: {}, {}",
        text, location.region, location.city, location.latitude, location.longitude
    )
}
