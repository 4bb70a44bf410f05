use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::matcher;
use crate::model::{Alert, PricePair};
use crate::notifier::Notifier;
use crate::source::PriceSource;
use crate::storage::AlertStore;

/// Result of one fetch-compare-notify-consume cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No quote or no alert list was available; nothing was consumed.
    Skipped,
    Completed {
        matched: usize,
        notified: usize,
        removed: usize,
    },
}

pub struct Scheduler {
    source: Arc<dyn PriceSource>,
    store: Arc<dyn AlertStore>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn PriceSource>,
        store: Arc<dyn AlertStore>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            interval,
        }
    }

    /// Tick every `interval` until `cancel` fires. A slow tick delays the
    /// next one; ticks never overlap.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "price scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("price scheduler stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    debug!(?outcome, "tick finished");
                }
            }
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        let pair = match self.source.fetch().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = ?e, "price fetch failed, skipping tick");
                return TickOutcome::Skipped;
            }
        };

        let candidates = match self.store.find_matching(pair.buy, pair.sell).await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!(error = ?e, "failed to query alerts, skipping tick");
                return TickOutcome::Skipped;
            }
        };

        // `find_matching` is the authoritative filter; this re-check only
        // guards against a store that returns extra rows.
        let matched = matcher::satisfied(candidates, pair);
        self.consume(pair, matched).await
    }

    async fn consume(&self, pair: PricePair, matched: Vec<Alert>) -> TickOutcome {
        let mut notified = 0;
        for alert in &matched {
            let text = matcher::notification(alert, pair);
            match self.notifier.send(alert.user_id, &text).await {
                Ok(()) => notified += 1,
                Err(e) => warn!(error = ?e, user_id = alert.user_id, "failed to deliver alert"),
            }
        }

        let mut removed = 0;
        for alert in &matched {
            match self
                .store
                .delete(alert.user_id, alert.direction, alert.threshold)
                .await
            {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    error = ?e,
                    user_id = alert.user_id,
                    direction = %alert.direction,
                    threshold = alert.threshold,
                    "failed to remove fired alert"
                ),
            }
        }

        if !matched.is_empty() {
            info!(
                buy = pair.buy,
                sell = pair.sell,
                matched = matched.len(),
                notified,
                removed,
                "alerts fired"
            );
        }

        TickOutcome::Completed {
            matched: matched.len(),
            notified,
            removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ConversationRouter, PendingInputs};
    use crate::model::Direction;
    use crate::storage::sqlite::SqliteAlertStore;
    use crate::testing::{BrokenStore, MemoryStore, RecordingNotifier, StubSource};

    fn quote(sell: i64) -> PricePair {
        PricePair {
            buy: sell - 30,
            sell,
        }
    }

    fn scheduler(
        source: &Arc<StubSource>,
        store: Arc<dyn AlertStore>,
        notifier: &Arc<RecordingNotifier>,
    ) -> Scheduler {
        Scheduler::new(
            Arc::clone(source) as Arc<dyn PriceSource>,
            store,
            Arc::clone(notifier) as Arc<dyn Notifier>,
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn fetch_failure_skips_without_consuming() {
        let store = Arc::new(SqliteAlertStore::in_memory().await);
        store.upsert(&Alert::new(1, Direction::Buy, 1000)).await.unwrap();
        let source = Arc::new(StubSource::new(vec![Err(())]));
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = scheduler(&source, store.clone(), &notifier).tick().await;

        assert_eq!(outcome, TickOutcome::Skipped);
        assert!(notifier.sent().is_empty());
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn matched_alerts_are_notified_then_removed() {
        let store = Arc::new(SqliteAlertStore::in_memory().await);
        store.upsert(&Alert::new(1, Direction::Buy, 2000)).await.unwrap();
        store.upsert(&Alert::new(2, Direction::Sell, 1900)).await.unwrap();
        store.upsert(&Alert::new(3, Direction::Buy, 1500)).await.unwrap();
        let source = Arc::new(StubSource::new(vec![Ok(PricePair {
            buy: 1880,
            sell: 1910,
        })]));
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = scheduler(&source, store.clone(), &notifier).tick().await;

        assert_eq!(
            outcome,
            TickOutcome::Completed {
                matched: 2,
                notified: 2,
                removed: 2
            }
        );
        let mut users: Vec<_> = notifier.sent().into_iter().map(|(u, _)| u).collect();
        users.sort();
        assert_eq!(users, vec![2, 3]);
        assert_eq!(store.count().await, 1);
        assert_eq!(store.find_matching(0, i64::MAX).await.unwrap()[0].user_id, 1);
    }

    #[tokio::test]
    async fn notification_text_depends_on_direction() {
        let store = Arc::new(SqliteAlertStore::in_memory().await);
        store.upsert(&Alert::new(1, Direction::Sell, 1900)).await.unwrap();
        let source = Arc::new(StubSource::new(vec![Ok(PricePair {
            buy: 1880,
            sell: 1910,
        })]));
        let notifier = Arc::new(RecordingNotifier::default());

        scheduler(&source, store, &notifier).tick().await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "您設定的賣出為:1900\n 玉山買進價:1880");
    }

    #[tokio::test]
    async fn failed_delivery_still_consumes_alert() {
        let store = Arc::new(SqliteAlertStore::in_memory().await);
        store.upsert(&Alert::new(1, Direction::Buy, 1000)).await.unwrap();
        let source = Arc::new(StubSource::new(vec![Ok(quote(1000))]));
        let notifier = Arc::new(RecordingNotifier::failing());

        let outcome = scheduler(&source, store.clone(), &notifier).tick().await;

        assert_eq!(
            outcome,
            TickOutcome::Completed {
                matched: 1,
                notified: 0,
                removed: 1
            }
        );
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn delete_failure_is_tolerated() {
        let store = Arc::new(BrokenStore {
            alerts: vec![Alert::new(1, Direction::Buy, 1000)],
            fail_reads: false,
        });
        let source = Arc::new(StubSource::new(vec![Ok(quote(1000))]));
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = scheduler(&source, store, &notifier).tick().await;

        assert_eq!(
            outcome,
            TickOutcome::Completed {
                matched: 1,
                notified: 1,
                removed: 0
            }
        );
    }

    #[tokio::test]
    async fn query_failure_skips_tick() {
        let store = Arc::new(BrokenStore {
            alerts: Vec::new(),
            fail_reads: true,
        });
        let source = Arc::new(StubSource::new(vec![Ok(quote(1000))]));
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = scheduler(&source, store, &notifier).tick().await;
        assert_eq!(outcome, TickOutcome::Skipped);
    }

    #[tokio::test]
    async fn buy_alert_lifecycle_through_chat_and_ticks() {
        let store = Arc::new(SqliteAlertStore::in_memory().await);
        let source = Arc::new(StubSource::new(Vec::new()));
        let notifier = Arc::new(RecordingNotifier::default());
        let pending = Arc::new(PendingInputs::new());
        let router = ConversationRouter::new(
            store.clone(),
            Arc::clone(&source) as Arc<dyn PriceSource>,
            Arc::clone(&pending),
        );
        let scheduler = scheduler(&source, store.clone(), &notifier);

        assert_eq!(
            router.handle(42, "/setbuy").await.unwrap(),
            "請輸入想要買入的數字"
        );
        assert_eq!(router.handle(42, "abc").await.unwrap(), "請輸入要購買的數字");
        assert_eq!(store.count().await, 0);
        router.handle(42, "/setbuy").await.unwrap();
        assert_eq!(
            router.handle(42, "1000").await.unwrap(),
            "設定的買價為 1000 成功"
        );

        source.push(Ok(quote(950)));
        assert_eq!(
            scheduler.tick().await,
            TickOutcome::Completed {
                matched: 0,
                notified: 0,
                removed: 0
            }
        );
        assert!(notifier.sent().is_empty());
        assert_eq!(store.count().await, 1);

        source.push(Ok(quote(1050)));
        scheduler.tick().await;
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 42);
        assert!(sent[0].1.contains("1000"));
        assert!(sent[0].1.contains("1050"));
        assert_eq!(store.count().await, 0);

        // Fired once only.
        source.push(Ok(quote(1050)));
        scheduler.tick().await;
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn buy_alert_fires_at_exact_sell_quote() {
        let store = Arc::new(SqliteAlertStore::in_memory().await);
        store.upsert(&Alert::new(42, Direction::Buy, 1000)).await.unwrap();
        let source = Arc::new(StubSource::new(vec![Ok(quote(1000))]));
        let notifier = Arc::new(RecordingNotifier::default());

        scheduler(&source, store.clone(), &notifier).tick().await;

        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_ticking_after_fetch_failure() {
        let store = Arc::new(MemoryStore::default());
        store.upsert(&Alert::new(7, Direction::Sell, 1900)).await.unwrap();
        let source = Arc::new(StubSource::new(vec![
            Err(()),
            Ok(PricePair {
                buy: 1880,
                sell: 1910,
            }),
        ]));
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = Arc::new(scheduler(&source, store.clone(), &notifier));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            let cancel = cancel.clone();
            async move { scheduler.run(cancel).await }
        });

        // Nothing happens before the first interval elapses.
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(source.calls(), 0);

        tokio::time::sleep(Duration::from_secs(302)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(
            notifier.sent(),
            vec![(7, "您設定的賣出為:1900\n 玉山買進價:1880".to_string())]
        );
        assert_eq!(store.len(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
