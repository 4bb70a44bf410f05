use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use futures::future::BoxFuture;
use tracing::warn;

use crate::error::FetchError;
use crate::model::PricePair;
use crate::source::PriceSource;

/// Bounds every fetch with a timeout and retries a failed fetch once after
/// `backoff`.
pub struct RetryingSource {
    inner: Arc<dyn PriceSource>,
    timeout: Duration,
    backoff: Duration,
}

impl RetryingSource {
    pub fn new(inner: Arc<dyn PriceSource>, timeout: Duration, backoff: Duration) -> Self {
        Self {
            inner,
            timeout,
            backoff,
        }
    }

    async fn attempt(&self) -> Result<PricePair, Report<FetchError>> {
        match tokio::time::timeout(self.timeout, self.inner.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(Report::new(FetchError::Timeout)
                .attach(format!("timeout: {:?}", self.timeout))),
        }
    }
}

impl PriceSource for RetryingSource {
    fn fetch(&self) -> BoxFuture<'_, Result<PricePair, Report<FetchError>>> {
        Box::pin(async move {
            match self.attempt().await {
                Ok(pair) => Ok(pair),
                Err(first) => {
                    warn!(error = ?first, backoff = ?self.backoff, "price fetch failed, retrying once");
                    tokio::time::sleep(self.backoff).await;
                    self.attempt().await
                }
            }
        })
    }
}
