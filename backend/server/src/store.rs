//! # Order Store
//!
//! Contract between the handlers/allocator and whatever holds the `orders` table.
//!
//! The allocator only needs [`OrderStore::max_order_number`] and
//! [`OrderStore::all_order_numbers`]. [`OrderStore::insert_next`] runs the same gap search
//! inside the write itself, so concurrent submissions never read the same free number.
use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Order, OrderFilter, OrderStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Order number {0} is already taken")]
    DuplicateNumber(i64),

    #[error("Database error: {0}")]
    Operation(#[source] sqlx::Error),
}

impl StoreError {
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => StoreError::Connection(err),
            _ => StoreError::Operation(err),
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn max_order_number(&self) -> Result<Option<i64>, StoreError>;

    async fn all_order_numbers(&self) -> Result<BTreeSet<i64>, StoreError>;

    async fn insert(
        &self,
        number: i64,
        food: &str,
        drink: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError>;

    /// Stores the order under the smallest free number >= 100 in one atomic write and returns it.
    async fn insert_next(
        &self,
        food: &str,
        drink: &str,
        status: OrderStatus,
    ) -> Result<i64, StoreError>;

    /// Returns the number of rows touched.
    async fn update_status(&self, number: i64, status: OrderStatus) -> Result<u64, StoreError>;

    /// Returns the number of rows removed.
    async fn delete(&self, number: i64) -> Result<u64, StoreError>;

    async fn list_all(&self, filter: OrderFilter) -> Result<Vec<Order>, StoreError>;
}

/// Store whose every call fails as if the database were down.
#[cfg(test)]
pub(crate) struct Unreachable;

#[cfg(test)]
#[async_trait]
impl OrderStore for Unreachable {
    async fn max_order_number(&self) -> Result<Option<i64>, StoreError> {
        Err(StoreError::Connection(sqlx::Error::PoolTimedOut))
    }

    async fn all_order_numbers(&self) -> Result<BTreeSet<i64>, StoreError> {
        Err(StoreError::Connection(sqlx::Error::PoolTimedOut))
    }

    async fn insert(&self, _: i64, _: &str, _: &str, _: OrderStatus) -> Result<(), StoreError> {
        Err(StoreError::Connection(sqlx::Error::PoolTimedOut))
    }

    async fn insert_next(&self, _: &str, _: &str, _: OrderStatus) -> Result<i64, StoreError> {
        Err(StoreError::Connection(sqlx::Error::PoolTimedOut))
    }

    async fn update_status(&self, _: i64, _: OrderStatus) -> Result<u64, StoreError> {
        Err(StoreError::Connection(sqlx::Error::PoolTimedOut))
    }

    async fn delete(&self, _: i64) -> Result<u64, StoreError> {
        Err(StoreError::Connection(sqlx::Error::PoolTimedOut))
    }

    async fn list_all(&self, _: OrderFilter) -> Result<Vec<Order>, StoreError> {
        Err(StoreError::Connection(sqlx::Error::PoolTimedOut))
    }
}
