pub mod esun;
pub mod retry;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::FetchError;
use crate::model::PricePair;

/// Provider of the current buy/sell quote.
///
/// Uses `BoxFuture` so the scheduler and the chat router can share one
/// `Arc<dyn PriceSource>`.
pub trait PriceSource: Send + Sync {
    /// Fetch a complete quote. Never yields a partially parsed pair.
    fn fetch(&self) -> BoxFuture<'_, Result<PricePair, Report<FetchError>>>;
}
