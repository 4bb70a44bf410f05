//! Telegram transport: feeds private messages into the router.

use std::sync::Arc;

use error_stack::{Report, ResultExt};
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, Me};
use tracing::{info, warn};

use crate::conversation::ConversationRouter;

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("telegram bot rejected the token")]
pub struct InvalidToken;

/// Check the token with `getMe`.
pub async fn authenticate(bot: &Bot) -> Result<Me, Report<InvalidToken>> {
    let me = bot.get_me().await.change_context(InvalidToken)?;
    info!(username = %me.username(), "telegram bot authenticated");
    Ok(me)
}

/// Publish the command list shown in Telegram's menu. Failure is logged only.
pub async fn register_commands(bot: &Bot) {
    let commands = vec![
        BotCommand::new("help", "使用說明"),
        BotCommand::new("now", "查詢現有金價"),
        BotCommand::new("setbuy", "設定買入價格"),
        BotCommand::new("setsell", "設定賣出價格"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!(error = %e, "failed to register bot commands");
    }
}

async fn on_message(bot: Bot, msg: Message, router: Arc<ConversationRouter>) -> ResponseResult<()> {
    let (Some(user), Some(text)) = (msg.from.as_ref(), msg.text()) else {
        return Ok(());
    };
    let Ok(user_id) = i64::try_from(user.id.0) else {
        warn!(user_id = user.id.0, "user id out of range, ignoring message");
        return Ok(());
    };

    info!(
        user_id,
        username = user.username.as_deref().unwrap_or(""),
        text,
        "message received"
    );

    if let Some(reply) = router.handle(user_id, text).await {
        bot.send_message(msg.chat.id, reply).await?;
    }
    Ok(())
}

/// Dispatcher plus the token that stops it.
pub struct Transport {
    dispatcher: Dispatcher<Bot, teloxide::RequestError, teloxide::dispatching::DefaultKey>,
}

impl Transport {
    pub fn new(bot: Bot, router: Arc<ConversationRouter>) -> Self {
        let handler = Update::filter_message().endpoint(on_message);
        let dispatcher = Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![router])
            .default_handler(|update| async move {
                tracing::debug!(update_id = ?update.id, "ignoring unsupported update");
            })
            .build();
        Self { dispatcher }
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.dispatcher.shutdown_token()
    }

    /// Process updates until the shutdown token fires.
    pub async fn run(mut self) {
        self.dispatcher.dispatch().await;
    }
}
