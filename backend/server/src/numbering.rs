//! # Order Numbers
//!
//! Numbers printed on the receipt and shown on the kitchen display. They start at 100
//! and a completed order gives its number back, so the visible sequence stays compact.
//!
//! Nothing is cached between calls. Every allocation reads the table again, which keeps
//! several server processes sharing one database in agreement.
//!
//! [`next_order_number`] only reports the number, two requests reading it at once see the same
//! value. [`place_order`] leaves the choice to [`OrderStore::insert_next`], which searches and
//! inserts in one write. The `UNIQUE` constraint stays underneath; should it still reject a
//! write, the order is retried after a short pause.
use std::{collections::BTreeSet, time::Duration};

use tokio::time::sleep;
use tracing::warn;

use crate::{
    models::{FIRST_ORDER_NUMBER, OrderStatus},
    store::{OrderStore, StoreError},
};

pub const PLACE_ATTEMPTS: u32 = 5;
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Smallest number >= 100 missing from `taken`. `None` only if the search runs off `i64`.
pub fn first_free(taken: &BTreeSet<i64>) -> Option<i64> {
    let mut candidate = FIRST_ORDER_NUMBER;

    for &number in taken.range(FIRST_ORDER_NUMBER..) {
        if number != candidate {
            break;
        }
        candidate = candidate.checked_add(1)?;
    }

    Some(candidate)
}

/// Never fails: storage errors fall back to 100.
pub async fn next_order_number(store: &dyn OrderStore) -> i64 {
    match try_next_order_number(store).await {
        Ok(number) => number,
        Err(e) => {
            warn!("Failed to compute next order number, using {FIRST_ORDER_NUMBER}: {e}");
            FIRST_ORDER_NUMBER
        }
    }
}

async fn try_next_order_number(store: &dyn OrderStore) -> Result<i64, StoreError> {
    let Some(max) = store.max_order_number().await? else {
        return Ok(FIRST_ORDER_NUMBER);
    };

    let taken = store.all_order_numbers().await?;

    Ok(first_free(&taken).unwrap_or_else(|| max.saturating_add(1)))
}

pub async fn place_order(
    store: &dyn OrderStore,
    food: &str,
    drink: &str,
) -> Result<i64, StoreError> {
    let mut attempt = 1;

    loop {
        match store.insert_next(food, drink, OrderStatus::Preparing).await {
            Err(StoreError::DuplicateNumber(taken)) if attempt < PLACE_ATTEMPTS => {
                warn!("Order number {taken} taken, attempt {attempt}/{PLACE_ATTEMPTS}");
                sleep(RETRY_BACKOFF * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        database::{SqlOrderStore, init_database},
        models::{Order, OrderFilter},
        store::Unreachable,
    };

    async fn store() -> SqlOrderStore {
        SqlOrderStore::new(init_database("sqlite::memory:", 1).await.unwrap())
    }

    /// Reports a conflict on the first `conflicts` inserts, then accepts.
    struct Contended {
        conflicts: Mutex<u32>,
        inserted: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl OrderStore for Contended {
        async fn max_order_number(&self) -> Result<Option<i64>, StoreError> {
            Ok(None)
        }

        async fn all_order_numbers(&self) -> Result<BTreeSet<i64>, StoreError> {
            Ok(BTreeSet::new())
        }

        async fn insert(
            &self,
            number: i64,
            _: &str,
            _: &str,
            _: OrderStatus,
        ) -> Result<(), StoreError> {
            let mut conflicts = self.conflicts.lock().unwrap();
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(StoreError::DuplicateNumber(number));
            }
            self.inserted.lock().unwrap().push(number);
            Ok(())
        }

        async fn insert_next(
            &self,
            food: &str,
            drink: &str,
            status: OrderStatus,
        ) -> Result<i64, StoreError> {
            self.insert(FIRST_ORDER_NUMBER, food, drink, status).await?;
            Ok(FIRST_ORDER_NUMBER)
        }

        async fn update_status(&self, _: i64, _: OrderStatus) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn delete(&self, _: i64) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn list_all(&self, _: OrderFilter) -> Result<Vec<Order>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_first_free() {
        assert_eq!(first_free(&BTreeSet::new()), Some(100));
        assert_eq!(first_free(&BTreeSet::from([100, 101, 102])), Some(103));
        assert_eq!(first_free(&BTreeSet::from([100, 102])), Some(101));
        assert_eq!(first_free(&BTreeSet::from([101, 102])), Some(100));
    }

    #[test]
    fn test_first_free_ignores_low_numbers() {
        assert_eq!(first_free(&BTreeSet::from([1, 50, 99])), Some(100));
        assert_eq!(first_free(&BTreeSet::from([7, 100])), Some(101));
    }

    #[tokio::test]
    async fn test_empty_store_starts_at_100() {
        let store = store().await;

        assert_eq!(next_order_number(&store).await, 100);
    }

    #[tokio::test]
    async fn test_strictly_increasing_without_deletes() {
        let store = store().await;
        let mut previous = None;

        for expected in 100..110 {
            let number = place_order(&store, "soup", "tea").await.unwrap();
            assert_eq!(number, expected);
            if let Some(previous) = previous {
                assert!(number > previous);
            }
            previous = Some(number);
        }
    }

    #[tokio::test]
    async fn test_reuses_deleted_gap() {
        let store = store().await;

        for _ in 0..3 {
            place_order(&store, "soup", "tea").await.unwrap();
        }
        store.delete(101).await.unwrap();

        assert_eq!(next_order_number(&store).await, 101);
        assert_eq!(place_order(&store, "soup", "tea").await.unwrap(), 101);
        assert_eq!(next_order_number(&store).await, 103);
    }

    #[tokio::test]
    async fn test_unreachable_store_degrades_to_100() {
        assert_eq!(next_order_number(&Unreachable).await, 100);
    }

    #[tokio::test]
    async fn test_place_order_retries_on_conflict() {
        let store = Contended {
            conflicts: Mutex::new(2),
            inserted: Mutex::new(Vec::new()),
        };

        assert_eq!(place_order(&store, "soup", "tea").await.unwrap(), 100);
        assert_eq!(*store.inserted.lock().unwrap(), vec![100]);
    }

    #[tokio::test]
    async fn test_place_order_gives_up() {
        let store = Contended {
            conflicts: Mutex::new(PLACE_ATTEMPTS),
            inserted: Mutex::new(Vec::new()),
        };

        let err = place_order(&store, "soup", "tea").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateNumber(100)));
        assert!(store.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orders_all_stored() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("orders.db").display());
        let store = Arc::new(SqlOrderStore::new(init_database(&url, 5).await.unwrap()));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { place_order(store.as_ref(), "soup", "tea").await })
            })
            .collect();

        let mut numbers = BTreeSet::new();
        for handle in handles {
            let number = handle.await.unwrap().unwrap();
            assert!(numbers.insert(number), "number {number} handed out twice");
        }

        assert_eq!(numbers, (100..120).collect::<BTreeSet<i64>>());
        assert_eq!(store.all_order_numbers().await.unwrap(), numbers);
    }
}
