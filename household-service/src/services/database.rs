//! PostgreSQL store for household-service.

use super::{LedgerError, LedgerStore};
use crate::models::{ChainLink, EntryForm, JoinedEntry, LedgerEntry, NewEntry, Rebalanced};
use crate::services::metrics::{CASCADE_ROWS_TOTAL, DB_QUERY_DURATION};
use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument, warn};

const ENTRY_COLUMNS: &str = "id, created_at, updated_at, amount_money, remark, balance, genre";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    opening_balance: i64,
}

/// Row of the chain check query: an entry plus its predecessor by id.
#[derive(Debug, FromRow)]
struct ChainRow {
    id: i64,
    amount_money: i64,
    balance: i64,
    prev_id: Option<i64>,
    prev_balance: Option<i64>,
}

impl From<ChainRow> for ChainLink {
    fn from(row: ChainRow) -> Self {
        ChainLink {
            id: row.id,
            amount: row.amount_money,
            balance: row.balance,
            previous: row.prev_id.zip(row.prev_balance),
        }
    }
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "household-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        opening_balance: i64,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self::from_pool(pool, opening_balance))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, opening_balance: i64) -> Self {
        Self {
            pool,
            opening_balance,
        }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL connection pool closed");
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::from_sqlx("Failed to begin transaction", e))?;

        // Writers queue behind each other; readers are not blocked.
        sqlx::query("LOCK TABLE main_list IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::from_sqlx("Failed to lock main_list", e))?;

        Ok(tx)
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), LedgerError> {
        tx.commit()
            .await
            .map_err(|e| LedgerError::from_sqlx("Failed to commit transaction", e))
    }

    async fn find_entry(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {} FROM main_list WHERE id = $1 ORDER BY id DESC LIMIT 1",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(|e| LedgerError::from_sqlx("Failed to get entry", e))
    }

    /// Fail with `InvariantViolation` if any entry from `from_id` on disagrees
    /// with its predecessor.
    async fn verify_chain(conn: &mut PgConnection, from_id: i64) -> Result<(), LedgerError> {
        let rows = sqlx::query_as::<_, ChainRow>(
            r#"
            SELECT id, amount_money, balance, prev_id, prev_balance
            FROM (
                SELECT id, amount_money, balance,
                       LAG(id) OVER (ORDER BY id) AS prev_id,
                       LAG(balance) OVER (ORDER BY id) AS prev_balance
                FROM main_list
            ) chain
            WHERE id >= $1
            ORDER BY id
            "#,
        )
        .bind(from_id)
        .fetch_all(conn)
        .await
        .map_err(|e| LedgerError::from_sqlx("Failed to verify balance chain", e))?;

        match rows
            .into_iter()
            .map(ChainLink::from)
            .find_map(|link| link.check())
        {
            Some(broken) => {
                warn!(entry_id = broken.id(), error = %broken, "Balance chain check failed");
                Err(LedgerError::InvariantViolation(broken))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerStore for Database {
    #[instrument(skip(self))]
    async fn list_entries(&self) -> Result<Vec<JoinedEntry>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_entries"])
            .start_timer();

        let entries = sqlx::query_as::<_, JoinedEntry>(
            r#"
            SELECT m.id, m.created_at, m.updated_at, m.amount_money, m.remark, m.balance,
                   g.genre, m.genre AS genre_id
            FROM main_list m
            LEFT JOIN genre_list g ON m.genre = g.genre_id
            ORDER BY m.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::from_sqlx("Failed to list entries", e))?;

        timer.observe_duration();

        Ok(entries)
    }

    #[instrument(skip(self), fields(entry_id = id))]
    async fn get_entry(&self, id: i64) -> Result<LedgerEntry, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_entry"])
            .start_timer();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| LedgerError::from_sqlx("Failed to acquire connection", e))?;
        let entry = Self::find_entry(&mut conn, id)
            .await?
            .ok_or(LedgerError::NotFound(id))?;

        timer.observe_duration();

        Ok(entry)
    }

    #[instrument(skip(self, form), fields(amount = form.amount, genre = form.genre))]
    async fn create_entry(&self, form: &EntryForm) -> Result<LedgerEntry, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_entry"])
            .start_timer();

        let mut tx = self.begin().await?;

        let last = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {} FROM main_list ORDER BY id DESC LIMIT 1",
            ENTRY_COLUMNS
        ))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| LedgerError::from_sqlx("Failed to read last entry", e))?;

        if last.is_none() {
            info!(
                opening_balance = self.opening_balance,
                "Ledger is empty, seeding from opening balance"
            );
        }

        let new = NewEntry::after(last.as_ref(), self.opening_balance, form, Utc::now())?;

        let entry = sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            INSERT INTO main_list (id, created_at, updated_at, amount_money, remark, balance, genre)
            VALUES ($1, $2, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        ))
        .bind(new.id)
        .bind(new.created_at)
        .bind(new.amount)
        .bind(&new.body)
        .bind(new.balance)
        .bind(new.genre)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| LedgerError::from_sqlx("Failed to insert entry", e))?;

        Self::verify_chain(&mut tx, entry.id).await?;
        Self::commit(tx).await?;

        timer.observe_duration();

        info!(entry_id = entry.id, balance = entry.balance, "Entry created");

        Ok(entry)
    }

    #[instrument(skip(self, form), fields(entry_id = id, amount = form.amount))]
    async fn update_entry(&self, id: i64, form: &EntryForm) -> Result<Rebalanced, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_entry"])
            .start_timer();

        let mut tx = self.begin().await?;

        let existing = Self::find_entry(&mut tx, id)
            .await?
            .ok_or(LedgerError::NotFound(id))?;
        let rebalanced = existing.rebalance(form, Utc::now())?;

        let entry = sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            UPDATE main_list
            SET updated_at = $2, amount_money = $3, remark = $4, balance = $5, genre = $6
            WHERE id = $1
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        ))
        .bind(id)
        .bind(rebalanced.entry.updated_at)
        .bind(rebalanced.entry.amount)
        .bind(&rebalanced.entry.body)
        .bind(rebalanced.entry.balance)
        .bind(rebalanced.entry.genre)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| LedgerError::from_sqlx("Failed to update entry", e))?;

        if rebalanced.difference != 0 {
            let cascaded = sqlx::query("UPDATE main_list SET balance = balance - $1 WHERE id > $2")
                .bind(rebalanced.difference)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| LedgerError::from_sqlx("Failed to cascade balance", e))?
                .rows_affected();

            CASCADE_ROWS_TOTAL
                .with_label_values(&["update"])
                .inc_by(cascaded as f64);
        }

        Self::verify_chain(&mut tx, id).await?;
        Self::commit(tx).await?;

        timer.observe_duration();

        info!(
            entry_id = id,
            difference = rebalanced.difference,
            balance = entry.balance,
            "Entry updated"
        );

        Ok(Rebalanced {
            entry,
            difference: rebalanced.difference,
        })
    }

    #[instrument(skip(self), fields(entry_id = id))]
    async fn delete_entry(&self, id: i64) -> Result<LedgerEntry, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_entry"])
            .start_timer();

        let mut tx = self.begin().await?;

        // Renumbering checks uniqueness at commit, not per row.
        sqlx::query("SET CONSTRAINTS main_list_pkey DEFERRED")
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::from_sqlx("Failed to defer primary key", e))?;

        let removed = Self::find_entry(&mut tx, id)
            .await?
            .ok_or(LedgerError::NotFound(id))?;

        sqlx::query("DELETE FROM main_list WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::from_sqlx("Failed to delete entry", e))?;

        let cascaded = sqlx::query("UPDATE main_list SET balance = balance + $1 WHERE id > $2")
            .bind(removed.amount)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::from_sqlx("Failed to cascade balance", e))?
            .rows_affected();

        sqlx::query("UPDATE main_list SET id = id - 1 WHERE id > $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::from_sqlx("Failed to compact ids", e))?;

        Self::verify_chain(&mut tx, id).await?;
        Self::commit(tx).await?;

        CASCADE_ROWS_TOTAL
            .with_label_values(&["delete"])
            .inc_by(cascaded as f64);

        timer.observe_duration();

        info!(
            entry_id = id,
            amount = removed.amount,
            shifted = cascaded,
            "Entry deleted"
        );

        Ok(removed)
    }

    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::from_sqlx("Health check failed", e))?;
        Ok(())
    }
}
