pub mod sqlite;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::{Alert, Direction, UserId};

/// Persistence for pending price alerts.
///
/// Alerts are keyed by `(user_id, direction, threshold)`.
pub trait AlertStore: Send + Sync {
    /// Insert the alert, replacing any row with the same key.
    fn upsert(&self, alert: &Alert) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// Return BUY alerts with `threshold <= sell_quote` and SELL alerts with
    /// `threshold >= buy_quote`.
    fn find_matching(
        &self,
        buy_quote: i64,
        sell_quote: i64,
    ) -> BoxFuture<'_, Result<Vec<Alert>, Report<StorageError>>>;

    /// Remove a single alert. Missing keys are not an error.
    fn delete(
        &self,
        user_id: UserId,
        direction: Direction,
        threshold: i64,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;
}
