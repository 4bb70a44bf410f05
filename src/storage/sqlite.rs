use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;
use crate::model::{Alert, Direction, UserId};
use crate::storage::AlertStore;

type AlertRow = (i64, String, i64, String);

pub struct SqliteAlertStore {
    pool: SqlitePool,
}

impl SqliteAlertStore {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory database; every pooled connection to
    /// `:memory:` would otherwise see its own empty schema.
    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Self { pool }
    }

    #[cfg(test)]
    pub async fn count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM alerts")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

fn row_to_alert((uid, kind, price, date): AlertRow) -> Option<Alert> {
    let Some(direction) = Direction::from_str(&kind) else {
        tracing::warn!(uid, kind = %kind, "skipping alert row with unknown type");
        return None;
    };
    let created_at = match DateTime::parse_from_rfc3339(&date) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!(uid, date = %date, error = %e, "alert row has unparsable date, using now");
            Utc::now()
        }
    };
    Some(Alert {
        user_id: uid,
        direction,
        threshold: price,
        created_at,
    })
}

impl AlertStore for SqliteAlertStore {
    fn upsert(&self, alert: &Alert) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let alert = alert.clone();
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .change_context(StorageError::Insert)?;

            sqlx::query("INSERT OR REPLACE INTO alerts (uid, type, price, date) VALUES (?, ?, ?, ?)")
                .bind(alert.user_id)
                .bind(alert.direction.as_str())
                .bind(alert.threshold)
                .bind(alert.created_at.to_rfc3339())
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Insert)
                .attach_with(|| {
                    format!(
                        "uid={} type={} price={}",
                        alert.user_id, alert.direction, alert.threshold
                    )
                })?;

            tx.commit().await.change_context(StorageError::Insert)?;
            Ok(())
        })
    }

    fn find_matching(
        &self,
        buy_quote: i64,
        sell_quote: i64,
    ) -> BoxFuture<'_, Result<Vec<Alert>, Report<StorageError>>> {
        Box::pin(async move {
            // Authoritative match rule; `matcher::is_satisfied` mirrors it.
            let rows: Vec<AlertRow> = sqlx::query_as(
                "SELECT uid, type, price, date FROM alerts \
                 WHERE (type = 'BUY' AND price <= ?) \
                 OR (type = 'SELL' AND price >= ?) \
                 ORDER BY date ASC",
            )
            .bind(sell_quote)
            .bind(buy_quote)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            Ok(rows.into_iter().filter_map(row_to_alert).collect())
        })
    }

    fn delete(
        &self,
        user_id: UserId,
        direction: Direction,
        threshold: i64,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM alerts WHERE uid = ? AND type = ? AND price = ?")
                .bind(user_id)
                .bind(direction.as_str())
                .bind(threshold)
                .execute(&self.pool)
                .await
                .change_context(StorageError::Delete)?;
            Ok(())
        })
    }
}
