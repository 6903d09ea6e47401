//! Advisory per-kind record counts.
//!
//! Each kind has a single counter record, `("COUNT", "COUNT#<KIND>")`, holding
//! an integer `Count`. Increments and decrements read the current value and
//! write it back; concurrent writers can lose updates, so the numbers are for
//! reporting only.

use grantstore_storage::{DynDocumentStore, Item, PrimaryKey};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::StoreResult;
use crate::models::{EntityKind, attributes};

const PARTITION_KEY: &str = "COUNT";

/// Reads and adjusts the counter records.
#[derive(Clone)]
pub struct CounterService {
    store: DynDocumentStore,
}

impl CounterService {
    #[must_use]
    pub fn new(store: DynDocumentStore) -> Self {
        Self { store }
    }

    fn key(kind: EntityKind) -> PrimaryKey {
        PrimaryKey::new(PARTITION_KEY, format!("COUNT#{}", kind.name()))
    }

    /// Current count for a kind, zero if never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    #[instrument(skip(self))]
    pub async fn count(&self, kind: EntityKind) -> StoreResult<i64> {
        let item = self.store.get_item(&Self::key(kind)).await?;
        Ok(item
            .as_ref()
            .and_then(|item| item.get(attributes::COUNT))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Overwrites the count. Negative values are stored as zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    #[instrument(skip(self))]
    pub async fn set(&self, kind: EntityKind, value: i64) -> StoreResult<()> {
        let key = Self::key(kind);
        let mut item = Item::new();
        item.insert(
            attributes::PARTITION_KEY.to_string(),
            Value::String(key.partition_key),
        );
        item.insert(attributes::SORT_KEY.to_string(), Value::String(key.sort_key));
        item.insert(attributes::KIND.to_string(), Value::from(kind.name()));
        item.insert(attributes::COUNT.to_string(), Value::from(value.max(0)));

        self.store.put_item(item, None).await?;
        debug!(count = value.max(0), "Counter written");
        Ok(())
    }

    /// Adds one and returns the new count.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read or write fails.
    pub async fn increment(&self, kind: EntityKind) -> StoreResult<i64> {
        let next = self.count(kind).await? + 1;
        self.set(kind, next).await?;
        Ok(next)
    }

    /// Subtracts one, not going below zero, and returns the new count.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read or write fails.
    pub async fn decrement(&self, kind: EntityKind) -> StoreResult<i64> {
        let next = (self.count(kind).await? - 1).max(0);
        self.set(kind, next).await?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreConfig;

    fn service() -> CounterService {
        let schema = StoreConfig::default().table_schema();
        CounterService::new(grantstore_db_memory::create_document_store(schema))
    }

    #[tokio::test]
    async fn test_absent_counter_is_zero() {
        let counters = service();
        assert_eq!(counters.count(EntityKind::Authorization).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_increment_and_decrement() {
        let counters = service();
        assert_eq!(counters.increment(EntityKind::Token).await.unwrap(), 1);
        assert_eq!(counters.increment(EntityKind::Token).await.unwrap(), 2);
        assert_eq!(counters.decrement(EntityKind::Token).await.unwrap(), 1);

        assert_eq!(counters.count(EntityKind::Token).await.unwrap(), 1);
        assert_eq!(counters.count(EntityKind::Authorization).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_never_negative() {
        let counters = service();
        assert_eq!(counters.decrement(EntityKind::Application).await.unwrap(), 0);

        counters.set(EntityKind::Application, -7).await.unwrap();
        assert_eq!(counters.count(EntityKind::Application).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counter_record_layout() {
        let schema = StoreConfig::default().table_schema();
        let store = grantstore_db_memory::create_document_store(schema);
        CounterService::new(store.clone())
            .set(EntityKind::Authorization, 3)
            .await
            .unwrap();

        let item = store
            .get_item(&PrimaryKey::new("COUNT", "COUNT#AUTHORIZATION"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item["Count"], 3);
        assert_eq!(item["Kind"], "AUTHORIZATION");
    }
}
