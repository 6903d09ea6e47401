//! Typed access to one entity kind of the shared table.
//!
//! [`DocumentTable`] wraps the raw [`DocumentStore`](grantstore_storage::DocumentStore)
//! calls every store needs: keyed reads and writes, paged queries exposed as
//! lazy streams, and the versioned update that guards writes with the
//! record's concurrency token.

use std::marker::PhantomData;

use async_stream::try_stream;
use futures_util::{Stream, TryStreamExt};
use grantstore_storage::{
    DynDocumentStore, KeyCondition, PutCondition, QueryRequest, string_attribute,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::{Document, attributes};
use crate::{StoreError, StoreResult};

/// Typed view of the records of kind `T::KIND`.
pub struct DocumentTable<T> {
    store: DynDocumentStore,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for DocumentTable<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Document> DocumentTable<T> {
    #[must_use]
    pub fn new(store: DynDocumentStore) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn store(&self) -> &DynDocumentStore {
        &self.store
    }

    /// Query walking the whole partition of this kind in sort-key order.
    #[must_use]
    pub fn partition_scan() -> QueryRequest {
        QueryRequest::table(
            KeyCondition::hash(T::KIND.partition_key()).begins_with(T::KIND.sort_key_prefix()),
        )
    }

    /// Query of a secondary index restricted to records of this kind.
    ///
    /// Indexes are shared by every kind carrying the hash attribute, so the
    /// partition filter keeps other kinds out of the results.
    #[must_use]
    pub fn index_query(index: &str, key: KeyCondition) -> QueryRequest {
        QueryRequest::index(index, key).with_filter(grantstore_storage::Filter::equals(
            attributes::PARTITION_KEY,
            T::KIND.partition_key(),
        ))
    }

    /// # Errors
    ///
    /// Returns an error if the read fails or the item cannot be decoded.
    pub async fn get(&self, id: &str) -> StoreResult<Option<T>> {
        let item = self.store.get_item(&T::KIND.key(id)).await?;
        item.map(T::from_item).transpose()
    }

    /// Writes the full record, replacing any stored version.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or the write fails.
    pub async fn put(&self, document: &T) -> StoreResult<()> {
        self.store.put_item(document.to_item()?, None).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, document: &T) -> StoreResult<()> {
        self.store.delete_item(&document.key()).await?;
        Ok(())
    }

    /// Streams every record matching the request, one backend page at a time.
    ///
    /// Cancellation is checked before each page; a cancelled stream ends
    /// without an error.
    pub fn stream(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StoreResult<T>> + Send + 'static {
        let store = self.store.clone();
        try_stream! {
            let mut request = request;
            loop {
                if cancel.is_cancelled() {
                    debug!(kind = %T::KIND, "Query cancelled between pages");
                    break;
                }

                let page = store.query(&request).await.map_err(StoreError::from)?;
                for item in page.items {
                    yield T::from_item(item)?;
                }

                match page.next {
                    Some(next) => request.start = Some(next),
                    None => break,
                }
            }
        }
    }

    /// Collects [`stream`](Self::stream) into a vector.
    ///
    /// # Errors
    ///
    /// Returns the first backend or decoding error.
    pub async fn collect(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> StoreResult<Vec<T>> {
        self.stream(request, cancel).try_collect().await
    }

    /// Returns `true` as soon as any item matches the request.
    ///
    /// # Errors
    ///
    /// Returns an error if a query page fails.
    pub async fn any(&self, request: QueryRequest) -> StoreResult<bool> {
        let mut request = request;
        loop {
            let page = self.store.query(&request).await?;
            if !page.items.is_empty() {
                return Ok(true);
            }
            match page.next {
                Some(next) => request.start = Some(next),
                None => return Ok(false),
            }
        }
    }

    /// Writes the next version of a record guarded by its concurrency token.
    ///
    /// The stored record must exist and carry the caller's token. The next
    /// version gets a fresh token and is shaped by `prepare`; it replaces the
    /// caller's copy only once the conditional write succeeded.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record is gone, `Conflict` if the caller's
    /// copy is stale, or the backend error.
    pub async fn update_versioned<F>(&self, document: &mut T, prepare: F) -> StoreResult<()>
    where
        F: FnOnce(&mut T) + Send,
    {
        let key = document.key();
        let current = self
            .store
            .get_item(&key)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("{} {}", T::KIND, document.id())))?;

        let expected = document.concurrency_token().to_string();
        if string_attribute(&current, attributes::CONCURRENCY_TOKEN) != Some(expected.as_str()) {
            return Err(StoreError::conflict(format!(
                "{} {} was modified since it was read",
                T::KIND,
                document.id()
            )));
        }

        let mut next = document.clone();
        next.renew_concurrency_token();
        prepare(&mut next);

        let condition =
            PutCondition::AttributeEquals(attributes::CONCURRENCY_TOKEN.to_string(), Value::String(expected));
        match self.store.put_item(next.to_item()?, Some(condition)).await {
            Ok(()) => {}
            Err(err) if err.is_condition_failed() => {
                return Err(StoreError::conflict(format!(
                    "{} {} was modified concurrently",
                    T::KIND,
                    document.id()
                )));
            }
            Err(err) => return Err(err.into()),
        }

        *document = next;
        Ok(())
    }
}
