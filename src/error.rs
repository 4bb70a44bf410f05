use derive_more::{Display, Error};

use crate::model::Direction;

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum FetchError {
    #[display("failed to build HTTP client")]
    Client,
    #[display("request to {url} failed")]
    Request { url: String },
    #[display("price page request timed out")]
    Timeout,
    #[display("failed to parse price page: {reason}")]
    Parse { reason: String },
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("failed to query data")]
    Query,
    #[display("failed to delete data")]
    Delete,
}

#[derive(Debug, Display, Error)]
pub enum ConversationError {
    #[display("invalid {direction} price input")]
    InvalidPriceInput { direction: Direction },
    #[display("failed to save alert")]
    Store,
}

impl ConversationError {
    /// Text sent back to the user when this error ends a conversation.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidPriceInput {
                direction: Direction::Buy,
            } => "請輸入要購買的數字",
            Self::InvalidPriceInput {
                direction: Direction::Sell,
            } => "請輸入要賣出的數字",
            Self::Store => "設定失敗，請稍後再試",
        }
    }
}

#[derive(Debug, Display, Error)]
pub enum NotifyError {
    #[display("failed to send message to user {user_id}")]
    Send { user_id: i64 },
}
