use std::sync::Arc;

use dashmap::DashMap;
use error_stack::{Report, ResultExt};
use tracing::{info, warn};

use crate::error::ConversationError;
use crate::model::{Alert, Direction, UserId, parse_price};
use crate::source::PriceSource;
use crate::storage::AlertStore;

pub const HELP_TEXT: &str = "\n 這是玉山銀行金價查詢機器人，您可以照著指令設定 \n /setbuy - 設定買入價格(達到此價格會訊息通知)\n /setsell - 設定賣出價格(達到此價格會訊息通知)\n /now - 查詢現有金價";
const NOW_FAILED_TEXT: &str = "目前無法取得金價，請稍後再試";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Now,
    SetBuy,
    SetSell,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "/help" => Some(Self::Help),
            "/now" => Some(Self::Now),
            "/setbuy" => Some(Self::SetBuy),
            "/setsell" => Some(Self::SetSell),
            _ => None,
        }
    }
}

/// What a user's next message is expected to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInput {
    Price(Direction),
}

impl PendingInput {
    fn prompt(self) -> &'static str {
        match self {
            Self::Price(Direction::Buy) => "請輸入想要買入的數字",
            Self::Price(Direction::Sell) => "請輸入想要賣出的數字",
        }
    }
}

/// Per-user prompts awaiting an answer. In-memory only.
#[derive(Debug, Default)]
pub struct PendingInputs {
    inner: DashMap<UserId, PendingInput>,
}

impl PendingInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user_id: UserId, input: PendingInput) {
        self.inner.insert(user_id, input);
    }

    pub fn take(&self, user_id: UserId) -> Option<PendingInput> {
        self.inner.remove(&user_id).map(|(_, input)| input)
    }

    #[cfg(test)]
    pub fn get(&self, user_id: UserId) -> Option<PendingInput> {
        self.inner.get(&user_id).map(|entry| *entry)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Turns one inbound chat message into at most one reply.
pub struct ConversationRouter {
    store: Arc<dyn AlertStore>,
    source: Arc<dyn PriceSource>,
    pending: Arc<PendingInputs>,
}

impl ConversationRouter {
    pub fn new(
        store: Arc<dyn AlertStore>,
        source: Arc<dyn PriceSource>,
        pending: Arc<PendingInputs>,
    ) -> Self {
        Self {
            store,
            source,
            pending,
        }
    }

    /// Handle `text` from `user_id`. `None` means the message is ignored.
    ///
    /// A pending prompt consumes the message whatever it contains, commands
    /// included, and is cleared afterwards whether or not the answer was
    /// accepted. Re-sending a command after that starts a new prompt.
    pub async fn handle(&self, user_id: UserId, text: &str) -> Option<String> {
        if let Some(input) = self.pending.take(user_id) {
            return Some(self.answer(user_id, input, text).await);
        }

        let command = Command::parse(text)?;
        Some(self.execute(user_id, command).await)
    }

    async fn execute(&self, user_id: UserId, command: Command) -> String {
        match command {
            Command::Help => HELP_TEXT.to_string(),
            Command::Now => self.now().await,
            Command::SetBuy => self.prompt(user_id, PendingInput::Price(Direction::Buy)),
            Command::SetSell => self.prompt(user_id, PendingInput::Price(Direction::Sell)),
        }
    }

    fn prompt(&self, user_id: UserId, input: PendingInput) -> String {
        self.pending.set(user_id, input);
        input.prompt().to_string()
    }

    async fn now(&self) -> String {
        match self.source.fetch().await {
            Ok(pair) => format!("玉山買進:{} \n 玉山賣出:{}", pair.buy, pair.sell),
            Err(e) => {
                warn!(error = ?e, "price fetch for /now failed");
                NOW_FAILED_TEXT.to_string()
            }
        }
    }

    async fn answer(&self, user_id: UserId, input: PendingInput, text: &str) -> String {
        let PendingInput::Price(direction) = input;
        match self.register_alert(user_id, direction, text).await {
            Ok(threshold) => {
                info!(user_id, direction = %direction, threshold, "alert registered");
                match direction {
                    Direction::Buy => format!("設定的買價為 {threshold} 成功"),
                    Direction::Sell => format!("設定的賣價為 {threshold} 成功"),
                }
            }
            Err(e) => {
                match e.current_context() {
                    ConversationError::InvalidPriceInput { .. } => {
                        info!(user_id, direction = %direction, text, "rejected price input")
                    }
                    ConversationError::Store => {
                        warn!(error = ?e, user_id, "failed to store alert")
                    }
                }
                e.current_context().user_message().to_string()
            }
        }
    }

    async fn register_alert(
        &self,
        user_id: UserId,
        direction: Direction,
        text: &str,
    ) -> Result<i64, Report<ConversationError>> {
        let threshold = parse_price(text)
            .ok_or_else(|| Report::new(ConversationError::InvalidPriceInput { direction }))?;

        self.store
            .upsert(&Alert::new(user_id, direction, threshold))
            .await
            .change_context(ConversationError::Store)?;

        Ok(threshold)
    }
}
