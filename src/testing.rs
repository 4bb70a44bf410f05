//! Hand-written doubles for the trait seams.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::{FetchError, NotifyError, StorageError};
use crate::model::{Alert, Direction, PricePair, UserId};
use crate::notifier::Notifier;
use crate::source::PriceSource;
use crate::storage::AlertStore;

/// Replays scripted quotes; `Err(())` and an exhausted script both fail.
pub struct StubSource {
    script: Mutex<VecDeque<Result<PricePair, ()>>>,
    hang: bool,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn new(script: Vec<Result<PricePair, ()>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn push(&self, result: Result<PricePair, ()>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceSource for StubSource {
    fn fetch(&self) -> BoxFuture<'_, Result<PricePair, Report<FetchError>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let hang = self.hang;
        Box::pin(async move {
            if hang {
                futures::future::pending::<()>().await;
            }
            match next {
                Some(Ok(pair)) => Ok(pair),
                _ => Err(Report::new(FetchError::Request {
                    url: "stub://unreachable".into(),
                })),
            }
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, user_id: UserId, text: &str) -> BoxFuture<'_, Result<(), Report<NotifyError>>> {
        let text = text.to_string();
        Box::pin(async move {
            if self.fail {
                return Err(Report::new(NotifyError::Send { user_id }));
            }
            self.sent.lock().unwrap().push((user_id, text));
            Ok(())
        })
    }
}

/// Store whose writes always fail; reads return `alerts`.
#[derive(Default)]
pub struct BrokenStore {
    pub alerts: Vec<Alert>,
    pub fail_reads: bool,
}

impl AlertStore for BrokenStore {
    fn upsert(&self, _alert: &Alert) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        Box::pin(async { Err(Report::new(StorageError::Insert)) })
    }

    fn find_matching(
        &self,
        _buy_quote: i64,
        _sell_quote: i64,
    ) -> BoxFuture<'_, Result<Vec<Alert>, Report<StorageError>>> {
        Box::pin(async move {
            if self.fail_reads {
                Err(Report::new(StorageError::Query))
            } else {
                Ok(self.alerts.clone())
            }
        })
    }

    fn delete(
        &self,
        _user_id: UserId,
        _direction: Direction,
        _threshold: i64,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        Box::pin(async { Err(Report::new(StorageError::Delete)) })
    }
}

/// In-process store with the same key and matching rules as SQLite, for tests
/// that run on paused time. Matching defers to `matcher::satisfied`, which
/// follows the SQL filter in `SqliteAlertStore::find_matching`.
#[derive(Default)]
pub struct MemoryStore {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

impl AlertStore for MemoryStore {
    fn upsert(&self, alert: &Alert) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let alert = alert.clone();
        Box::pin(async move {
            let mut alerts = self.alerts.lock().unwrap();
            alerts.retain(|a| {
                (a.user_id, a.direction, a.threshold)
                    != (alert.user_id, alert.direction, alert.threshold)
            });
            alerts.push(alert);
            Ok(())
        })
    }

    fn find_matching(
        &self,
        buy_quote: i64,
        sell_quote: i64,
    ) -> BoxFuture<'_, Result<Vec<Alert>, Report<StorageError>>> {
        let pair = PricePair {
            buy: buy_quote,
            sell: sell_quote,
        };
        Box::pin(async move {
            let alerts = self.alerts.lock().unwrap().clone();
            Ok(crate::matcher::satisfied(alerts, pair))
        })
    }

    fn delete(
        &self,
        user_id: UserId,
        direction: Direction,
        threshold: i64,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        Box::pin(async move {
            self.alerts.lock().unwrap().retain(|a| {
                (a.user_id, a.direction, a.threshold) != (user_id, direction, threshold)
            });
            Ok(())
        })
    }
}
