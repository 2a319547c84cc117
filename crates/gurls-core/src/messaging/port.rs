use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::OutgoingMessage,
    Result,
};

/// Outbound half of the chat-platform transport.
///
/// The dispatch loop only ever sends plain text with an optional inline
/// keyboard and acknowledges button presses.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_message(&self, chat_id: ChatId, msg: &OutgoingMessage) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
