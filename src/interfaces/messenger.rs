use anyhow::Result;
use async_trait::async_trait;

use crate::interfaces::keyboard::{InlineKeyboard, Keyboard};

/// Outbound half of the chat transport. All text is MarkdownV2 and must
/// already be escaped by the formatter.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<()>;

    /// Replaces the text and inline controls of a message the bot sent earlier.
    async fn edit(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()>;

    async fn edit_keyboard(
        &self,
        chat_id: i64,
        message_id: i32,
        keyboard: &InlineKeyboard,
    ) -> Result<()>;
}
