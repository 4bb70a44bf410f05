use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use teloxide::prelude::*;

use crate::error::NotifyError;
use crate::model::UserId;
use crate::notifier::Notifier;

/// Delivers messages to a user's private chat, whose id equals the user id.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, user_id: UserId, text: &str) -> BoxFuture<'_, Result<(), Report<NotifyError>>> {
        let text = text.to_string();
        Box::pin(async move {
            self.bot
                .send_message(ChatId(user_id), text)
                .await
                .change_context(NotifyError::Send { user_id })?;
            Ok(())
        })
    }
}
