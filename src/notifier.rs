pub mod telegram;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::NotifyError;
use crate::model::UserId;

/// Sink for outbound plain-text messages.
pub trait Notifier: Send + Sync {
    fn send(&self, user_id: UserId, text: &str) -> BoxFuture<'_, Result<(), Report<NotifyError>>>;
}
