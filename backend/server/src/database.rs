//! # SQLite
//!
//! Persistent order table.
//!
//! Core purpose is to hold every order that has not been completed yet. A completed
//! order is deleted, so the table only ever contains `Preparing` and `Ready` rows.
//!
//! ## Requirements
//!
//! - Small dataset, order numbers are reused and stay roughly within 100..999
//! - Fresh reads for every allocation, no counters cached in the process
//! - Order numbers unique among stored rows
//!
//! ## Implementation
//!
//! - Single `orders` table, `UNIQUE` on `number_order`
//! - Writes go through a transaction, dropped (rolled back) on failure
//! - New orders pick their number inside the `INSERT` statement. A write statement takes the
//!   database write lock before it reads, so concurrent inserts queue on the busy timeout
//!   instead of reading the same gap
//! - `order_time` written by the server in UTC
//! - Pool connections never idle out so `sqlite::memory:` databases survive between queries
use std::{collections::BTreeSet, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;

use crate::{
    models::{FIRST_ORDER_NUMBER, Order, OrderFilter, OrderStatus},
    store::{OrderStore, StoreError},
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS orders (
        number_order INTEGER NOT NULL UNIQUE,
        food TEXT NOT NULL,
        drink TEXT NOT NULL,
        status TEXT NOT NULL,
        order_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

// Must agree with `numbering::first_free`.
const INSERT_NEXT: &str = r#"
    INSERT INTO orders (number_order, food, drink, status, order_time)
    SELECT COALESCE(
        (SELECT 100 WHERE NOT EXISTS (SELECT 1 FROM orders WHERE number_order = 100)),
        (SELECT MIN(taken.number_order + 1) FROM orders taken
            WHERE taken.number_order >= 100
            AND NOT EXISTS (
                SELECT 1 FROM orders successor
                WHERE successor.number_order = taken.number_order + 1
            )),
        (SELECT MAX(number_order) + 1 FROM orders)
    ) AS number_order, ? AS food, ? AS drink, ? AS status, ? AS order_time
    RETURNING number_order
"#;

pub async fn init_database(
    database_url: &str,
    max_connections: u32,
) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url).map_err(StoreError::Connection)?;

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(StoreError::Connection)?;

    sqlx::query(SCHEMA)
        .execute(&pool)
        .await
        .map_err(StoreError::from_sqlx)?;

    info!("Orders table ready");

    Ok(pool)
}

#[derive(Clone)]
pub struct SqlOrderStore {
    pool: SqlitePool,
}

impl SqlOrderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for SqlOrderStore {
    async fn max_order_number(&self) -> Result<Option<i64>, StoreError> {
        sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(number_order) FROM orders")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn all_order_numbers(&self) -> Result<BTreeSet<i64>, StoreError> {
        let numbers = sqlx::query_scalar::<_, i64>("SELECT number_order FROM orders")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        Ok(numbers.into_iter().collect())
    }

    async fn insert(
        &self,
        number: i64,
        food: &str,
        drink: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        let result = sqlx::query(
            "INSERT INTO orders (number_order, food, drink, status, order_time) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(number)
        .bind(food)
        .bind(drink)
        .bind(status.as_str())
        .bind(Utc::now().naive_utc())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => tx.commit().await.map_err(StoreError::from_sqlx),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateNumber(number))
            }
            Err(e) => Err(StoreError::from_sqlx(e)),
        }
    }

    async fn insert_next(
        &self,
        food: &str,
        drink: &str,
        status: OrderStatus,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        let result = sqlx::query_scalar::<_, i64>(INSERT_NEXT)
            .bind(food)
            .bind(drink)
            .bind(status.as_str())
            .bind(Utc::now().naive_utc())
            .fetch_one(&mut *tx)
            .await;

        match result {
            Ok(number) => {
                tx.commit().await.map_err(StoreError::from_sqlx)?;
                Ok(number)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateNumber(FIRST_ORDER_NUMBER))
            }
            Err(e) => Err(StoreError::from_sqlx(e)),
        }
    }

    async fn update_status(&self, number: i64, status: OrderStatus) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        let rows = sqlx::query("UPDATE orders SET status = ? WHERE number_order = ?")
            .bind(status.as_str())
            .bind(number)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?
            .rows_affected();

        tx.commit().await.map_err(StoreError::from_sqlx)?;

        Ok(rows)
    }

    async fn delete(&self, number: i64) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        let rows = sqlx::query("DELETE FROM orders WHERE number_order = ?")
            .bind(number)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?
            .rows_affected();

        tx.commit().await.map_err(StoreError::from_sqlx)?;

        Ok(rows)
    }

    async fn list_all(&self, filter: OrderFilter) -> Result<Vec<Order>, StoreError> {
        let query = match filter {
            OrderFilter::All => sqlx::query_as::<Sqlite, Order>(
                "SELECT number_order, food, drink, status, order_time FROM orders ORDER BY number_order DESC",
            ),
            OrderFilter::Pending => sqlx::query_as::<Sqlite, Order>(
                "SELECT number_order, food, drink, status, order_time FROM orders WHERE status != ? ORDER BY order_time DESC, number_order DESC",
            )
            .bind(OrderStatus::Completed.as_str()),
        };

        query.fetch_all(&self.pool).await.map_err(StoreError::from_sqlx)
    }
}
