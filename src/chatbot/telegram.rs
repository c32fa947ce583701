//! Chat gateway seam and its Telegram implementation.

use async_trait::async_trait;
use serde::Deserialize;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, ReplyParameters};
use teloxide::{ApiError, RequestError};
use thiserror::Error;
use tracing::{info, warn};

use crate::chatbot::message::ChatMessage;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The recipient cannot be reached (DMs closed, bot blocked).
    #[error("recipient unreachable: {0}")]
    Unreachable(String),
    /// The bot may not perform this action (message already gone, no rights).
    #[error("not permitted: {0}")]
    NotPermitted(String),
    #[error("{0}")]
    Other(String),
}

/// How the status text is framed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceKind {
    #[default]
    Listening,
    Watching,
    Playing,
}

impl PresenceKind {
    pub fn render(self, text: &str) -> String {
        match self {
            Self::Listening => format!("🎧 Listening to {text}"),
            Self::Watching => format!("👀 Watching {text}"),
            Self::Playing => format!("🎮 Playing {text}"),
        }
    }
}

/// What the pipeline needs from a chat platform.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Reply to `to` in its chat. Returns the new message ID.
    async fn reply(&self, to: &ChatMessage, text: &str) -> Result<i64, GatewayError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), GatewayError>;

    /// Private message to a user.
    async fn send_direct(&self, user_id: i64, text: &str) -> Result<(), GatewayError>;

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<(), GatewayError>;

    async fn set_presence(&self, text: &str, kind: PresenceKind) -> Result<(), GatewayError>;
}

fn classify(e: RequestError) -> GatewayError {
    match e {
        RequestError::Api(
            ref api @ (ApiError::BotBlocked
            | ApiError::CantInitiateConversation
            | ApiError::CantTalkWithBots
            | ApiError::UserDeactivated
            | ApiError::ChatNotFound),
        ) => GatewayError::Unreachable(api.to_string()),
        RequestError::Api(
            ref api @ (ApiError::MessageToDeleteNotFound
            | ApiError::MessageCantBeDeleted
            | ApiError::MessageToEditNotFound
            | ApiError::MessageCantBeEdited),
        ) => GatewayError::NotPermitted(api.to_string()),
        other => GatewayError::Other(other.to_string()),
    }
}

fn is_parse_error(e: &RequestError) -> bool {
    matches!(e, RequestError::Api(ApiError::CantParseEntities(_)))
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatGateway for TelegramClient {
    async fn reply(&self, to: &ChatMessage, text: &str) -> Result<i64, GatewayError> {
        let chat_id = ChatId(to.chat_id);
        let reply_params = || ReplyParameters::new(MessageId(to.message_id as i32));

        let html = self
            .bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .reply_parameters(reply_params())
            .await;

        let sent = match html {
            Ok(msg) => Ok(msg),
            // Model output sometimes carries stray markup; resend verbatim
            Err(e) if is_parse_error(&e) => {
                warn!("HTML rejected, resending as plain text: {e}");
                self.bot
                    .send_message(chat_id, text)
                    .reply_parameters(reply_params())
                    .await
            }
            Err(e) => Err(e),
        };

        sent.map(|msg| msg.id.0 as i64).map_err(|e| {
            warn!("Failed to send reply: {e}");
            classify(e)
        })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), GatewayError> {
        info!("🗑️ Deleting message {} in chat {}", message_id, chat_id);

        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id as i32))
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn send_direct(&self, user_id: i64, text: &str) -> Result<(), GatewayError> {
        // A user's private chat shares the user's ID
        self.bot
            .send_message(ChatId(user_id), text)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<(), GatewayError> {
        let chat_id = ChatId(chat_id);
        let message_id = MessageId(message_id as i32);

        let html = self
            .bot
            .edit_message_text(chat_id, message_id, text)
            .parse_mode(ParseMode::Html)
            .await;

        let edited = match html {
            Ok(_) => Ok(()),
            Err(e) if is_parse_error(&e) => self
                .bot
                .edit_message_text(chat_id, message_id, text)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        edited.map_err(classify)
    }

    async fn set_presence(&self, text: &str, kind: PresenceKind) -> Result<(), GatewayError> {
        // Telegram has no presence; the short description is what users see on the bot's profile
        self.bot
            .set_my_short_description()
            .short_description(kind.render(text))
            .await
            .map(|_| ())
            .map_err(classify)
    }
}
