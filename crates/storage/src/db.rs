//! SQLite database for price and opportunity history.

use arbitrage_core::{OpportunityRecord, Quote};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Invalid stored timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("Invalid retention period: {0} days")]
    InvalidRetention(i64),
}

/// Row counts of the history tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HistoryCounts {
    pub prices: i64,
    pub opportunities: i64,
}

/// Database connection for history.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

/// Timestamps are stored as fixed-width RFC3339 text so that string order
/// matches time order.
fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(raw.to_string()))
}

impl Database {
    /// Connect to the SQLite database at the given URL, creating it if needed.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        // Every pooled connection to `:memory:` would otherwise see its own
        // empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exchange TEXT NOT NULL,
                last REAL,
                bid REAL,
                ask REAL,
                observed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS opportunity_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exchange_from TEXT NOT NULL,
                exchange_to TEXT NOT NULL,
                buy_price REAL NOT NULL,
                sell_price REAL NOT NULL,
                gross_difference REAL NOT NULL,
                gross_percentage REAL NOT NULL,
                net_profit REAL NOT NULL,
                net_profit_percentage REAL NOT NULL,
                total_fees REAL NOT NULL,
                is_profitable INTEGER NOT NULL,
                observed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_price_history_time ON price_history(observed_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_opportunity_history_time \
             ON opportunity_history(observed_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert one cycle's quotes in a single transaction.
    pub async fn insert_quotes(&self, quotes: &[Quote]) -> Result<u64, StorageError> {
        if quotes.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for quote in quotes {
            let result = sqlx::query(
                "INSERT INTO price_history (exchange, last, bid, ask, observed_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(quote.exchange.as_str())
            .bind(quote.last)
            .bind(quote.bid)
            .bind(quote.ask)
            .bind(encode_timestamp(&quote.observed_at))
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        Ok(inserted)
    }

    /// Record a detected opportunity.
    pub async fn insert_opportunity(
        &self,
        record: &OpportunityRecord,
    ) -> Result<i64, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO opportunity_history (
                exchange_from, exchange_to, buy_price, sell_price,
                gross_difference, gross_percentage, net_profit, net_profit_percentage,
                total_fees, is_profitable, observed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.exchange_from)
        .bind(&record.exchange_to)
        .bind(record.buy_price)
        .bind(record.sell_price)
        .bind(record.gross_difference)
        .bind(record.gross_percentage)
        .bind(record.net_profit)
        .bind(record.net_profit_percentage)
        .bind(record.total_fees)
        .bind(record.is_profitable)
        .bind(encode_timestamp(&record.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent quotes, newest first.
    pub async fn recent_prices(&self, limit: i64) -> Result<Vec<Quote>, StorageError> {
        let rows = sqlx::query_as::<_, (String, Option<f64>, Option<f64>, Option<f64>, String)>(
            "SELECT exchange, last, bid, ask, observed_at FROM price_history \
             ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(exchange, last, bid, ask, observed_at)| {
                Ok(Quote::new(
                    exchange.as_str(),
                    last,
                    bid,
                    ask,
                    decode_timestamp(&observed_at)?,
                ))
            })
            .collect()
    }

    /// Most recent opportunities, newest first.
    pub async fn recent_opportunities(
        &self,
        limit: i64,
    ) -> Result<Vec<OpportunityRecord>, StorageError> {
        let rows = sqlx::query_as::<
            _,
            (String, String, f64, f64, f64, f64, f64, f64, f64, bool, String),
        >(
            r#"
            SELECT exchange_from, exchange_to, buy_price, sell_price,
                   gross_difference, gross_percentage, net_profit, net_profit_percentage,
                   total_fees, is_profitable, observed_at
            FROM opportunity_history
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(
                    exchange_from,
                    exchange_to,
                    buy_price,
                    sell_price,
                    gross_difference,
                    gross_percentage,
                    net_profit,
                    net_profit_percentage,
                    total_fees,
                    is_profitable,
                    observed_at,
                )| {
                    Ok(OpportunityRecord {
                        exchange_from,
                        exchange_to,
                        buy_price,
                        sell_price,
                        gross_difference,
                        gross_percentage,
                        net_profit,
                        net_profit_percentage,
                        total_fees,
                        is_profitable,
                        timestamp: decode_timestamp(&observed_at)?,
                    })
                },
            )
            .collect()
    }

    pub async fn history_counts(&self) -> Result<HistoryCounts, StorageError> {
        let (prices,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM price_history")
            .fetch_one(&self.pool)
            .await?;
        let (opportunities,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM opportunity_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(HistoryCounts {
            prices,
            opportunities,
        })
    }

    /// Delete history older than `days` days. Returns the number of rows removed.
    ///
    /// `days` must be positive and small enough for the cutoff to be a valid
    /// date.
    pub async fn cleanup_old_history(&self, days: i64) -> Result<u64, StorageError> {
        let cutoff = TimeDelta::try_days(days)
            .filter(|_| days >= 1)
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .ok_or(StorageError::InvalidRetention(days))?;
        let cutoff = encode_timestamp(&cutoff);

        let prices = sqlx::query("DELETE FROM price_history WHERE observed_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await?;
        let opportunities = sqlx::query("DELETE FROM opportunity_history WHERE observed_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await?;

        Ok(prices.rows_affected() + opportunities.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(
        from: &str,
        to: &str,
        net_profit: f64,
        timestamp: DateTime<Utc>,
    ) -> OpportunityRecord {
        OpportunityRecord {
            exchange_from: from.to_string(),
            exchange_to: to.to_string(),
            buy_price: 5_001_000.0,
            sell_price: 5_099_000.0,
            gross_difference: 98_000.0,
            gross_percentage: 1.9596,
            net_profit,
            net_profit_percentage: net_profit * 100.0 / 5_001_000.0,
            total_fees: 98_000.0 - net_profit,
            is_profitable: net_profit > 0.0,
            timestamp,
        }
    }

    fn millis(at: DateTime<Utc>) -> DateTime<Utc> {
        decode_timestamp(&encode_timestamp(&at)).unwrap()
    }

    #[tokio::test]
    async fn test_database_connect() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        assert_eq!(db.history_counts().await.unwrap(), HistoryCounts::default());
    }

    #[tokio::test]
    async fn test_insert_and_read_quotes() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let now = millis(Utc::now());
        let quotes = vec![
            Quote::new("bitflyer", Some(5_000_000.0), Some(4_999_000.0), Some(5_001_000.0), now),
            Quote::new("zaif", Some(5_010_000.0), None, Some(5_012_000.0), now),
        ];

        assert_eq!(db.insert_quotes(&quotes).await.unwrap(), 2);
        assert_eq!(db.insert_quotes(&[]).await.unwrap(), 0);

        let stored = db.recent_prices(10).await.unwrap();
        assert_eq!(stored.len(), 2);
        // Newest first.
        assert_eq!(stored[0], quotes[1]);
        assert_eq!(stored[1], quotes[0]);
        assert_eq!(stored[0].bid, None);
    }

    #[tokio::test]
    async fn test_insert_and_read_opportunities() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let now = millis(Utc::now());

        db.insert_opportunity(&record("bitflyer", "coincheck", 87_000.0, now))
            .await
            .unwrap();
        let id = db
            .insert_opportunity(&record("zaif", "bitbank", -1_200.0, now))
            .await
            .unwrap();
        assert_eq!(id, 2);

        let stored = db.recent_opportunities(1).await.unwrap();
        assert_eq!(stored, vec![record("zaif", "bitbank", -1_200.0, now)]);
        assert!(!stored[0].is_profitable);

        let counts = db.history_counts().await.unwrap();
        assert_eq!(counts.opportunities, 2);
    }

    #[tokio::test]
    async fn test_cleanup_old_history() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let old = now - TimeDelta::days(40);

        db.insert_quotes(&[
            Quote::new("bitflyer", None, Some(1.0), Some(2.0), old),
            Quote::new("bitflyer", None, Some(1.0), Some(2.0), now),
        ])
        .await
        .unwrap();
        db.insert_opportunity(&record("a", "b", 10.0, old)).await.unwrap();
        db.insert_opportunity(&record("a", "b", 10.0, now)).await.unwrap();

        let removed = db.cleanup_old_history(30).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            db.history_counts().await.unwrap(),
            HistoryCounts {
                prices: 1,
                opportunities: 1
            }
        );
    }

    #[tokio::test]
    async fn test_cleanup_rejects_invalid_retention() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.insert_quotes(&[Quote::with_bid_ask("bitflyer", 1.0, 2.0)])
            .await
            .unwrap();

        for days in [0, -1, i64::MAX / 1000, i64::MAX] {
            assert!(matches!(
                db.cleanup_old_history(days).await,
                Err(StorageError::InvalidRetention(d)) if d == days
            ));
        }
        assert_eq!(db.history_counts().await.unwrap().prices, 1);
    }

    #[test]
    fn test_timestamp_encoding_is_sortable() {
        let earlier = Utc::now();
        let later = earlier + TimeDelta::milliseconds(1_500);
        let (a, b) = (encode_timestamp(&earlier), encode_timestamp(&later));
        assert!(a < b);
        assert!(a.ends_with('Z'));
        assert!(decode_timestamp("not a date").is_err());
    }
}
