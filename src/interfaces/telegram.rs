use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, MessageId,
    ParseMode, ReplyMarkup,
};
use tracing::{error, info, warn};

use crate::core::lifecycle::LifecycleComponent;
use crate::core::router::callback::MAX_CALLBACK_BYTES;
use crate::core::router::{CommandRouter, Inbound};
use crate::interfaces::keyboard::{InlineKeyboard, Keyboard, ReplyKeyboard};
use crate::interfaces::messenger::Messenger;

fn inline_markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| {
                if button.data.len() > MAX_CALLBACK_BYTES {
                    warn!(
                        "Callback data for {:?} is {} bytes; Telegram will reject it",
                        button.label,
                        button.data.len()
                    );
                }
                InlineKeyboardButton::callback(button.label.clone(), button.data.clone())
            })
            .collect::<Vec<_>>()
    }))
}

fn reply_markup(keyboard: &ReplyKeyboard) -> KeyboardMarkup {
    KeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|label| KeyboardButton::new(label.clone()))
            .collect::<Vec<_>>()
    }))
    .resize_keyboard()
}

fn markup(keyboard: &Keyboard) -> ReplyMarkup {
    match keyboard {
        Keyboard::Inline(inline) => inline_markup(inline).into(),
        Keyboard::Reply(reply) => reply_markup(reply).into(),
    }
}

/// Sends and edits MarkdownV2 messages through the Bot API.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::MarkdownV2);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(markup(keyboard));
        }
        request
            .await
            .with_context(|| format!("sendMessage to chat {}", chat_id))?;
        Ok(())
    }

    async fn edit(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .parse_mode(ParseMode::MarkdownV2);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(inline_markup(keyboard));
        }
        request
            .await
            .with_context(|| format!("editMessageText in chat {}", chat_id))?;
        Ok(())
    }

    async fn edit_keyboard(
        &self,
        chat_id: i64,
        message_id: i32,
        keyboard: &InlineKeyboard,
    ) -> Result<()> {
        self.bot
            .edit_message_reply_markup(ChatId(chat_id), MessageId(message_id))
            .reply_markup(inline_markup(keyboard))
            .await
            .with_context(|| format!("editMessageReplyMarkup in chat {}", chat_id))?;
        Ok(())
    }
}

async fn on_message(msg: Message, router: Arc<CommandRouter>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let inbound = Inbound::Message {
        chat_id: msg.chat.id.0,
        text: text.to_string(),
    };
    if let Err(e) = router.handle(inbound).await {
        error!(chat_id = msg.chat.id.0, "Failed to handle message: {:#}", e);
    }
    Ok(())
}

async fn on_callback(bot: Bot, q: CallbackQuery, router: Arc<CommandRouter>) -> ResponseResult<()> {
    if let (Some(message), Some(data)) = (q.message.as_ref(), q.data.clone()) {
        let chat_id = message.chat().id.0;
        let inbound = Inbound::Callback {
            chat_id,
            message_id: message.id().0,
            data,
        };
        if let Err(e) = router.handle(inbound).await {
            error!(chat_id, "Failed to handle callback: {:#}", e);
        }
    }
    // always clear the client's spinner, even for ignored presses
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to acknowledge callback: {}", e);
    }
    Ok(())
}

pub struct TelegramInterface {
    bot: Bot,
    router: Arc<CommandRouter>,
    shutdown: Option<ShutdownToken>,
}

impl TelegramInterface {
    pub fn new(bot: Bot, router: Arc<CommandRouter>) -> Self {
        Self {
            bot,
            router,
            shutdown: None,
        }
    }

    async fn start_bot(&mut self) -> Result<()> {
        let commands = vec![
            teloxide::types::BotCommand::new("start", "Status summary of every server"),
            teloxide::types::BotCommand::new("help", "Show commands and the status summary"),
            teloxide::types::BotCommand::new("list", "Paginated process list"),
            teloxide::types::BotCommand::new("notify", "Choose which processes alert you"),
            teloxide::types::BotCommand::new("preferences", "Show your subscriptions"),
        ];
        if let Err(e) = self.bot.set_my_commands(commands).await {
            error!("Failed to set telegram bot commands: {}", e);
        }

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(on_message))
            .branch(Update::filter_callback_query().endpoint(on_callback));

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![self.router.clone()])
            .default_handler(|_| async {})
            .build();
        self.shutdown = Some(dispatcher.shutdown_token());

        tokio::spawn(async move {
            dispatcher.dispatch().await;
        });
        Ok(())
    }
}

#[async_trait]
impl LifecycleComponent for TelegramInterface {
    async fn on_init(&mut self) -> Result<()> {
        let me = self
            .bot
            .get_me()
            .await
            .context("Telegram getMe failed; check the bot token")?;
        info!("Telegram Interface initializing as @{}", me.username());
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        info!("Telegram Interface starting...");
        self.start_bot().await
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("Telegram Interface shutting down...");
        if let Some(token) = self.shutdown.take() {
            match token.shutdown() {
                Ok(done) => done.await,
                Err(e) => warn!("Dispatcher was not running: {}", e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::callback::CallbackAction;
    use crate::interfaces::keyboard::InlineButton;

    #[test]
    fn inline_keyboard_keeps_rows_and_callback_data() {
        let keyboard = InlineKeyboard {
            rows: vec![
                vec![InlineButton::new("a", &CallbackAction::Page(1))],
                vec![
                    InlineButton::new("b", &CallbackAction::ShowAll),
                    InlineButton::new("c", &CallbackAction::DoneChoosing),
                ],
            ],
        };
        let markup = inline_markup(&keyboard);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[1].len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "b");
    }

    #[test]
    fn reply_keyboard_has_one_button_per_row() {
        let keyboard = ReplyKeyboard {
            rows: vec![
                vec!["View web:api".to_string()],
                vec!["View web:worker".to_string()],
            ],
        };
        let markup = reply_markup(&keyboard);
        assert_eq!(markup.keyboard.len(), 2);
        assert_eq!(markup.keyboard[1][0].text, "View web:worker");
    }
}
